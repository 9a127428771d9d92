//! Bins: containers that drive and aggregate the state of their children.
//!
//! A bin runs each step by setting every child to the step's target state,
//! sinks first and sources last (see [`Bin::iterate_sorted`]), and reduces
//! the returns:
//!
//! - `FAILURE` stops the walk; children not yet visited keep their state.
//! - `NO_PREROLL` from a live child outranks `ASYNC`: a bin with a live
//!   source never waits for preroll.
//! - `ASYNC` keeps the bin pending until every asynchronous child has
//!   posted `AsyncDone`; the bin then commits on a helper thread.
//!
//! Bins intercept their children's `AsyncStart`/`AsyncDone` messages and
//! forward everything else to their own parent or bus.

use crate::element::handle::ElementKind;
use crate::element::{Element, ElementFlags, ElementId};
use crate::error::{Error, Result};
use crate::message::{Message, MessageKind};
use crate::observability::span_bin_walk;
use crate::pipeline::graph;
use crate::pipeline::toplevel::{self, PipelineCore};
use crate::state::{State, StateChange, StateChangeReturn};
use crate::sync::lock;
use smallvec::SmallVec;
use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Mutex;

/// Children snapshot taken for one walk.
pub(crate) type ChildList = SmallVec<[Element; 8]>;

#[derive(Default)]
struct BinState {
    children: Vec<Element>,
    async_children: HashSet<ElementId>,
    no_preroll_children: HashSet<ElementId>,
    walking: bool,
    walk_error: bool,
}

/// Bin bookkeeping stored inside the element.
pub(crate) struct BinCore {
    state: Mutex<BinState>,
    pub(crate) pipeline: Option<PipelineCore>,
}

impl BinCore {
    pub(crate) fn new(pipeline: Option<PipelineCore>) -> Self {
        Self {
            state: Mutex::new(BinState::default()),
            pipeline,
        }
    }

    pub(crate) fn children(&self) -> Vec<Element> {
        lock(&self.state).children.clone()
    }

    /// No walk running and no child still completing asynchronously.
    pub(crate) fn all_committed(&self) -> bool {
        let st = lock(&self.state);
        !st.walking && st.async_children.is_empty()
    }
}

/// Children in walk order.
pub(crate) fn sorted_children(bin: &Element, core: &BinCore) -> ChildList {
    graph::sort_children(bin, &core.children())
}

/// The base step of a bin.
pub(crate) fn change_state(
    bin: &Element,
    core: &BinCore,
    transition: StateChange,
) -> Result<StateChangeReturn> {
    let span = span_bin_walk(bin.name(), transition);
    let _entered = span.enter();
    let target = transition.to();

    if let Some(pipeline) = &core.pipeline {
        toplevel::enter(bin, pipeline, transition)?;
    }

    let children = {
        let mut st = lock(&core.state);
        if target <= State::Ready {
            st.async_children.clear();
            st.no_preroll_children.clear();
        }
        st.walking = true;
        st.walk_error = false;
        st.children.clone()
    };
    let children = graph::sort_children(bin, &children);

    let mut ret = StateChangeReturn::Success;
    for child in &children {
        if child.is_locked_state() {
            tracing::debug!(bin = %bin.name(), child = %child.name(), "child state locked, skipping");
            continue;
        }

        let child_ret = child.set_state(target);
        tracing::trace!(bin = %bin.name(), child = %child.name(), %target, result = %child_ret, "child state change");
        {
            let mut st = lock(&core.state);
            match child_ret {
                StateChangeReturn::NoPreroll => {
                    st.no_preroll_children.insert(child.id());
                    st.async_children.remove(&child.id());
                }
                StateChangeReturn::Success | StateChangeReturn::Failure => {
                    st.async_children.remove(&child.id());
                }
                StateChangeReturn::Async => {}
            }
        }

        ret = ret.aggregate(child_ret);
        if ret.is_failure() {
            tracing::warn!(bin = %bin.name(), child = %child.name(), %transition, "child failed, aborting walk");
            break;
        }
    }

    let walk_error = {
        let mut st = lock(&core.state);
        st.walking = false;
        st.walk_error
    };
    if walk_error && ret == StateChangeReturn::Async {
        tracing::warn!(bin = %bin.name(), %transition, "child posted an error during the walk");
        ret = StateChangeReturn::Failure;
    }

    if !ret.is_failure() {
        if let Some(pipeline) = &core.pipeline {
            toplevel::leave(bin, pipeline, transition)?;
        }
    }
    Ok(ret)
}

/// Intercept or forward a message posted by a child.
pub(crate) fn handle_child_message(bin: &Element, child: &Element, message: Message) -> bool {
    let Some(core) = bin.bin_core() else {
        return false;
    };

    match message.kind() {
        MessageKind::AsyncStart => {
            let walking = {
                let mut st = lock(&core.state);
                st.async_children.insert(child.id());
                st.walking
            };
            tracing::trace!(bin = %bin.name(), child = %child.name(), "child started async state change");
            if !walking {
                let running = {
                    let rec = lock(&bin.inner.record);
                    rec.pending.is_none()
                        && rec.current >= State::Paused
                        && rec.last_return != StateChangeReturn::Failure
                };
                if running {
                    bin.lost_state();
                }
            }
            true
        }
        MessageKind::AsyncDone => {
            let settled = {
                let mut st = lock(&core.state);
                st.async_children.remove(&child.id());
                !st.walking && st.async_children.is_empty()
            };
            tracing::trace!(bin = %bin.name(), child = %child.name(), settled, "child finished async state change");
            if settled && lock(&bin.inner.record).is_async_pending() {
                schedule_continuation(bin);
            }
            true
        }
        MessageKind::Error { .. } => {
            let walking = {
                let mut st = lock(&core.state);
                if st.walking {
                    st.walk_error = true;
                }
                st.walking
            };
            if !walking && lock(&bin.inner.record).is_async_pending() {
                tracing::warn!(bin = %bin.name(), child = %child.name(), "error during async state change");
                bin.abort_state();
            }
            bin.post(message)
        }
        _ => bin.post(message),
    }
}

fn schedule_continuation(bin: &Element) {
    let weak = bin.downgrade();
    let cookie = bin.state_cookie();
    let spawned = std::thread::Builder::new()
        .name(format!("{}-continue", bin.name()))
        .spawn(move || {
            if let Some(bin) = weak.upgrade() {
                continue_async(&bin, cookie);
            }
        });
    if let Err(error) = spawned {
        tracing::error!(bin = %bin.name(), %error, "failed to spawn state continuation thread");
        bin.abort_state();
    }
}

/// Commit a bin whose asynchronous children have all completed.
///
/// Runs on its own thread: the `AsyncDone` that triggered it was posted
/// from a child's streaming thread, which must not drive other children.
fn continue_async(bin: &Element, cookie: u64) {
    let Some(core) = bin.bin_core() else {
        return;
    };
    {
        let _state = lock(&bin.inner.state_lock);
        if !core.all_committed() {
            return;
        }
        {
            let rec = lock(&bin.inner.record);
            if !rec.is_async_pending() {
                return;
            }
            if rec.cookie != cookie {
                tracing::debug!(bin = %bin.name(), pending = ?rec.pending, "target moved since children completed");
            }
        }
        tracing::debug!(bin = %bin.name(), "all children committed, continuing state change");
        if bin.continue_state(StateChangeReturn::Success).is_failure() {
            return;
        }
    }

    // A pipeline that lost PLAYING goes back to its target once prerolled.
    if core.pipeline.is_some() && bin.parent().is_none() {
        let (current, target, pending) = {
            let rec = lock(&bin.inner.record);
            (rec.current, rec.target, rec.pending)
        };
        if pending.is_none() && current < target {
            tracing::debug!(bin = %bin.name(), %target, "restoring target state after preroll");
            bin.set_state(target);
        }
    }
}

/// Re-evaluate the bin's return after a child left.
fn recalculate(bin: &Element, core: &BinCore) {
    let (async_left, live_left) = {
        let st = lock(&core.state);
        if st.walking {
            return;
        }
        (!st.async_children.is_empty(), !st.no_preroll_children.is_empty())
    };

    let (last_return, pending) = {
        let rec = lock(&bin.inner.record);
        (rec.last_return, rec.pending)
    };

    match last_return {
        StateChangeReturn::NoPreroll if !live_left && pending.is_none() => {
            if async_left {
                tracing::debug!(bin = %bin.name(), "last live child removed, waiting for preroll");
                bin.lost_state();
            } else {
                let mut rec = lock(&bin.inner.record);
                if rec.last_return == StateChangeReturn::NoPreroll && rec.pending.is_none() {
                    rec.last_return = StateChangeReturn::Success;
                }
            }
        }
        StateChangeReturn::Async if pending.is_some() && !async_left => {
            tracing::debug!(bin = %bin.name(), "last async child removed, committing");
            schedule_continuation(bin);
        }
        _ => {}
    }
}

/// A container element.
///
/// Dereferences to [`Element`], so state methods are called directly on
/// the bin.
///
/// # Example
///
/// ```rust
/// use parallax_state::element::{Element, ElementImpl};
/// use parallax_state::pipeline::Bin;
/// use parallax_state::state::{State, StateChangeReturn};
///
/// struct Plain;
/// impl ElementImpl for Plain {}
///
/// let bin = Bin::new("bin");
/// let filter = Element::builder("filter").build(Plain);
/// bin.add(&filter).unwrap();
///
/// assert_eq!(bin.set_state(State::Ready), StateChangeReturn::Success);
/// assert_eq!(filter.current_state(), State::Ready);
/// assert_eq!(bin.set_state(State::Null), StateChangeReturn::Success);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Bin(Element);

impl Bin {
    /// Create an empty bin.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Element::with_kind(
            name.into(),
            ElementFlags::NONE,
            ElementKind::Bin(Box::new(BinCore::new(None))),
        ))
    }

    pub(crate) fn from_core(name: String, core: BinCore) -> Self {
        Self(Element::with_kind(
            name,
            ElementFlags::NONE,
            ElementKind::Bin(Box::new(core)),
        ))
    }

    /// View an element as a bin, if it is one.
    pub fn from_element(element: &Element) -> Option<Self> {
        element.is_bin().then(|| Self(element.clone()))
    }

    /// The underlying element handle.
    pub fn as_element(&self) -> &Element {
        &self.0
    }

    fn core(&self) -> &BinCore {
        match &self.0.inner.kind {
            ElementKind::Bin(core) => core,
            ElementKind::Leaf(_) => unreachable!("Bin always wraps a bin element"),
        }
    }

    /// Add a child.
    ///
    /// The child keeps its current state; use
    /// [`Element::sync_state_with_parent`] to bring it along.
    pub fn add(&self, element: &Element) -> Result<()> {
        if self.0.is_within(element) {
            return Err(Error::AddSelf(element.name().to_string()));
        }

        let mut st = lock(&self.core().state);
        if st.children.iter().any(|c| c.name() == element.name()) {
            return Err(Error::NameInUse(element.name().to_string()));
        }
        {
            let mut parent = lock(&element.inner.parent);
            if parent.upgrade().is_some() {
                return Err(Error::AlreadyHasParent(element.name().to_string()));
            }
            *parent = std::sync::Arc::downgrade(&self.0.inner);
        }
        st.children.push(element.clone());
        drop(st);

        tracing::debug!(bin = %self.name(), child = %element.name(), "added element");
        Ok(())
    }

    /// Add several children.
    pub fn add_many(&self, elements: &[&Element]) -> Result<()> {
        elements.iter().try_for_each(|e| self.add(e))
    }

    /// Remove a child.
    ///
    /// The child keeps its state. Its pending asynchronous or live
    /// contribution is dropped and the bin re-evaluates its own return: a
    /// bin left with no live child but an unprerolled one goes `ASYNC`;
    /// a bin waiting only on the removed child commits.
    pub fn remove(&self, element: &Element) -> Result<()> {
        {
            let mut st = lock(&self.core().state);
            let pos = st
                .children
                .iter()
                .position(|c| c == element)
                .ok_or_else(|| Error::NotAChild(element.name().to_string()))?;
            let child = st.children.remove(pos);
            st.async_children.remove(&child.id());
            st.no_preroll_children.remove(&child.id());
            child.set_parent(None);
        }
        tracing::debug!(bin = %self.name(), child = %element.name(), "removed element");

        recalculate(&self.0, self.core());
        Ok(())
    }

    /// Direct children in insertion order.
    pub fn children(&self) -> Vec<Element> {
        self.core().children()
    }

    /// Number of direct children.
    pub fn num_children(&self) -> usize {
        lock(&self.core().state).children.len()
    }

    /// Find a descendant by name, searching child bins recursively.
    pub fn get_by_name(&self, name: &str) -> Option<Element> {
        let children = self.children();
        if let Some(found) = children.iter().find(|c| c.name() == name) {
            return Some(found.clone());
        }
        children
            .iter()
            .filter_map(Bin::from_element)
            .find_map(|bin| bin.get_by_name(name))
    }

    /// Children in state-change order: sinks first, then upstream in
    /// reverse data-flow order, sources last. Ties keep insertion order.
    pub fn iterate_sorted(&self) -> Vec<Element> {
        sorted_children(&self.0, self.core()).into_vec()
    }
}

impl Deref for Bin {
    type Target = Element;

    fn deref(&self) -> &Element {
        &self.0
    }
}

impl From<Bin> for Element {
    fn from(bin: Bin) -> Self {
        bin.0
    }
}

impl std::fmt::Debug for Bin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bin")
            .field("element", &self.0)
            .field("children", &self.num_children())
            .finish()
    }
}
