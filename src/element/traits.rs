//! The element hook trait and capability flags.

use crate::buffer::Buffer;
use crate::clock::Clock;
use crate::element::ElementContext;
use crate::error::Result;
use crate::state::{StateChange, StateChangeReturn};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

/// Capabilities of an element, fixed at construction.
///
/// Whether a source is *live* is not a flag: it can change at runtime and
/// lives in a guarded field on the element (see
/// [`Element::set_live`](crate::element::Element::set_live)).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ElementFlags(u32);

impl ElementFlags {
    /// No capabilities.
    pub const NONE: Self = Self(0);
    /// Produces data; has only an output pad.
    pub const SOURCE: Self = Self(1 << 0);
    /// Consumes data; has only an input pad and prerolls.
    pub const SINK: Self = Self(1 << 1);
    /// Can supply a clock to the pipeline.
    pub const PROVIDES_CLOCK: Self = Self(1 << 2);
    /// Starts with its state locked: parent walks skip it.
    pub const LOCKED_STATE: Self = Self(1 << 3);

    /// Whether every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether no flag is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ElementFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for ElementFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::SOURCE, "SOURCE"),
            (Self::SINK, "SINK"),
            (Self::PROVIDES_CLOCK, "PROVIDES_CLOCK"),
            (Self::LOCKED_STATE, "LOCKED_STATE"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "ElementFlags({})", set.join(" | "))
    }
}

/// Element-specific behaviour, invoked by the state-change harness.
///
/// For every adjacent step the harness runs, in order:
///
/// 1. [`enter`](Self::enter): the element's own work for the step, before
///    the generic base behaviour (open devices on `NULL->READY`, start
///    threads on `READY->PAUSED`).
/// 2. The generic base step for the element's role: sinks go `ASYNC` until
///    prerolled, live sources report `NO_PREROLL`.
/// 3. [`leave`](Self::leave): work that must follow the base step, usually
///    the downward half (stop threads on `PAUSED->READY`, close devices on
///    `READY->NULL`).
///
/// Returning `Err` from either phase fails the step: the harness posts an
/// error message on the bus and the step returns
/// [`StateChangeReturn::Failure`]. `enter` may also return
/// [`StateChangeReturn::Async`] and finish the step later with
/// [`Element::commit_state`](crate::element::Element::commit_state).
///
/// # Example
///
/// ```rust
/// use parallax_state::element::{ElementContext, ElementImpl};
/// use parallax_state::error::{Error, Result};
/// use parallax_state::state::{StateChange, StateChangeReturn};
///
/// struct CdSource {
///     device: Option<u32>,
/// }
///
/// impl ElementImpl for CdSource {
///     fn enter(&mut self, ctx: &ElementContext, t: StateChange) -> Result<StateChangeReturn> {
///         if t == StateChange::NullToReady {
///             let fd = open_device().ok_or_else(|| {
///                 Error::state_change(ctx.name(), t, "cannot open device")
///             })?;
///             self.device = Some(fd);
///         }
///         Ok(StateChangeReturn::Success)
///     }
///
///     fn leave(&mut self, _ctx: &ElementContext, t: StateChange) -> Result<()> {
///         if t == StateChange::ReadyToNull {
///             self.device = None;
///         }
///         Ok(())
///     }
/// }
/// # fn open_device() -> Option<u32> { Some(3) }
/// ```
pub trait ElementImpl: Send + 'static {
    /// Work done before the base step.
    fn enter(
        &mut self,
        ctx: &ElementContext,
        transition: StateChange,
    ) -> Result<StateChangeReturn> {
        let _ = (ctx, transition);
        Ok(StateChangeReturn::Success)
    }

    /// Work done after the base step.
    fn leave(&mut self, ctx: &ElementContext, transition: StateChange) -> Result<()> {
        let _ = (ctx, transition);
        Ok(())
    }

    /// Handle a buffer arriving on the input pad.
    ///
    /// Called on the upstream streaming thread, only while the element is
    /// in or heading to PAUSED or PLAYING. The default drops the buffer.
    fn chain(&mut self, ctx: &ElementContext, buffer: Buffer) -> Result<()> {
        let _ = (ctx, buffer);
        Ok(())
    }

    /// A clock the pipeline may select.
    fn provide_clock(&self) -> Option<Arc<dyn Clock>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let flags = ElementFlags::SINK | ElementFlags::PROVIDES_CLOCK;
        assert!(flags.contains(ElementFlags::SINK));
        assert!(!flags.contains(ElementFlags::SOURCE));
        assert!(ElementFlags::NONE.is_empty());
        assert_eq!(format!("{:?}", flags), "ElementFlags(SINK | PROVIDES_CLOCK)");
    }
}
