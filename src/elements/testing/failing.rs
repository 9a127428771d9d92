//! An element that refuses one transition.

use crate::element::{Element, ElementContext, ElementImpl};
use crate::error::{Error, Result};
use crate::state::{StateChange, StateChangeReturn};

/// A pass-through element whose `enter` fails a chosen transition.
///
/// Every other transition succeeds, so the element can be brought back
/// to NULL after the failure.
#[derive(Debug, Clone)]
pub struct FailingElement {
    fail_on: StateChange,
    reason: String,
}

impl FailingElement {
    /// Fail `fail_on` with a generic reason.
    pub fn new(fail_on: StateChange) -> Self {
        Self {
            fail_on,
            reason: "refused by element".to_string(),
        }
    }

    /// Set the reason reported in the error message.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Build the element.
    pub fn into_element(self, name: impl Into<String>) -> Element {
        Element::builder(name).build(self)
    }
}

impl ElementImpl for FailingElement {
    fn enter(
        &mut self,
        ctx: &ElementContext,
        transition: StateChange,
    ) -> Result<StateChangeReturn> {
        if transition == self.fail_on {
            return Err(Error::state_change(ctx.name(), transition, self.reason.clone()));
        }
        Ok(StateChangeReturn::Success)
    }
}
