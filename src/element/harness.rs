//! The state-change harness.
//!
//! `set_state` turns a target into a sequence of adjacent steps. Each step
//! runs the element's hooks, then either completes immediately
//! ([`continue_state`](Element::continue_state) commits it and drives the
//! next one on the same thread), fails ([`abort_state`](Element::abort_state))
//! or goes asynchronous and is completed later with
//! [`commit_state`](Element::commit_state), possibly on another thread.
//!
//! Locking: `state_lock` serializes everything that drives steps and is
//! held while state messages are posted; the record mutex only guards the
//! fields and is never held across a post, so bus sync handlers may read
//! the state of the posting element. A settled state is published only
//! after its messages are on the bus. State locks are taken parent before
//! child, record locks child before parent, and no record lock is held
//! while taking a state lock.

use crate::buffer::Buffer;
use crate::element::Element;
use crate::element::base::BaseBehaviour;
use crate::element::handle::ElementKind;
use crate::error::{Error, Result};
use crate::message::{Message, MessageKind};
use crate::observability::{
    span_state_change, trace_async_done, trace_lost_state, trace_state_change,
};
use crate::pipeline::bin;
use crate::state::{State, StateChange, StateChangeReturn};
use crate::sync::{lock, wait, wait_timeout};
use smallvec::SmallVec;
use std::time::{Duration, Instant};

impl Element {
    /// Request `target` and drive the element towards it.
    ///
    /// Returns `Success` when the target was reached synchronously,
    /// `Async` when completion happens later (see [`get_state`]),
    /// `NoPreroll` when a live element reached PAUSED or PLAYING and
    /// `Failure` when a step failed. Failed steps are not rolled back.
    ///
    /// A request made while an asynchronous transition is in flight only
    /// moves its pending target when the new target lies ahead of it.
    ///
    /// [`get_state`]: Element::get_state
    pub fn set_state(&self, target: State) -> StateChangeReturn {
        let _state = lock(&self.inner.state_lock);
        let transition = {
            let mut rec = lock(&self.inner.record);

            if rec.last_return == StateChangeReturn::Failure {
                rec.next = None;
                rec.pending = None;
                rec.last_return = StateChangeReturn::Success;
            }

            let mut current = rec.current;
            let old_next = rec.next;
            let old_pending = rec.pending;

            if rec.target != target {
                rec.target = target;
                rec.cookie = rec.cookie.wrapping_add(1);
            }
            rec.pending = Some(target);

            if let Some(old_pending) = old_pending {
                if old_pending <= target || old_next == Some(target) {
                    rec.last_return = StateChangeReturn::Async;
                    tracing::debug!(
                        element = %self.name(),
                        %target,
                        "busy with an async state change, updated pending state"
                    );
                    return StateChangeReturn::Async;
                }
                if let Some(next) = old_next {
                    if next > target && rec.last_return == StateChangeReturn::Async {
                        // Restart downwards from the state the async step aimed at.
                        current = next;
                    }
                }
            }

            let next = current.next_towards(target);
            rec.next = Some(next);
            if current != next {
                rec.last_return = StateChangeReturn::Async;
            }
            StateChange::step(current, target)
        };

        tracing::debug!(element = %self.name(), %target, %transition, "set_state");
        self.change_state(transition)
    }

    /// Query the state, waiting up to `timeout` for an asynchronous
    /// transition to settle.
    ///
    /// Returns `(result, current, pending)`. `Some(Duration::ZERO)` polls,
    /// `None` waits forever. A wait that times out returns `Async` with the
    /// pending target; it is not an error. Never changes the state.
    pub fn get_state(
        &self,
        timeout: Option<Duration>,
    ) -> (StateChangeReturn, State, Option<State>) {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut rec = lock(&self.inner.record);

        while rec.is_async_pending() {
            match deadline {
                None => rec = wait(&self.inner.state_cond, rec),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    rec = wait_timeout(&self.inner.state_cond, rec, remaining).0;
                }
            }
        }

        (rec.last_return, rec.current, rec.pending)
    }

    /// Run one step: hooks, then commit, abort or go asynchronous.
    pub(crate) fn change_state(&self, transition: StateChange) -> StateChangeReturn {
        let span = span_state_change(self.name(), transition);
        let _entered = span.enter();

        let ret = {
            let _timer = self.inner.metrics.start_timer();
            match self.run_hooks(transition) {
                Ok(ret) => ret,
                Err(error) => {
                    tracing::warn!(element = %self.name(), %transition, %error, "state change failed");
                    self.post(Message::error(self.name(), error));
                    StateChangeReturn::Failure
                }
            }
        };
        self.inner.metrics.record_step(transition, ret);
        trace_state_change(self.name(), transition, ret);

        match ret {
            StateChangeReturn::Failure => {
                self.abort_state();
                StateChangeReturn::Failure
            }
            StateChangeReturn::Async if transition.to() >= State::Paused => self.enter_async(),
            // Steps towards READY or NULL never wait.
            StateChangeReturn::Async => self.continue_state(StateChangeReturn::Success),
            StateChangeReturn::Success | StateChangeReturn::NoPreroll => self.continue_state(ret),
        }
    }

    fn run_hooks(&self, transition: StateChange) -> Result<StateChangeReturn> {
        match &self.inner.kind {
            ElementKind::Bin(core) => bin::change_state(self, core, transition),
            ElementKind::Leaf(leaf) => {
                let ctx = self.context();
                let mut imp = lock(&leaf.imp);
                let pre = imp.enter(&ctx, transition)?;
                if pre.is_failure() {
                    return Ok(pre);
                }
                let base = leaf.base.change_state(self, transition);
                if base.is_failure() {
                    return Ok(base);
                }
                imp.leave(&ctx, transition)?;
                Ok(pre.aggregate(base))
            }
        }
    }

    fn enter_async(&self) -> StateChangeReturn {
        let started = {
            let mut rec = lock(&self.inner.record);
            if rec.pending.is_none() {
                // Aborted by a child error after the walk.
                return rec.last_return;
            }
            rec.last_return = StateChangeReturn::Async;
            !std::mem::replace(&mut rec.async_started, true)
        };
        if started {
            self.post(Message::new(self.name(), MessageKind::AsyncStart));
        }

        if let Some(core) = self.bin_core() {
            if core.all_committed() {
                tracing::debug!(element = %self.name(), "all children committed during the walk");
                let ret = self.continue_state(StateChangeReturn::Success);
                return if ret.is_failure() {
                    StateChangeReturn::Failure
                } else {
                    StateChangeReturn::Async
                };
            }
        }

        tracing::debug!(element = %self.name(), "state change will complete asynchronously");
        StateChangeReturn::Async
    }

    /// Commit the step in flight with `ret` and drive the next one.
    ///
    /// When the pending state is reached the record is cleared, waiters
    /// are woken and the final state message is posted. Messages are
    /// posted with the record unlocked and before `pending` is cleared, so
    /// a woken waiter always finds them on the bus.
    pub(crate) fn continue_state(&self, ret: StateChangeReturn) -> StateChangeReturn {
        let mut messages: SmallVec<[Message; 2]> = SmallVec::new();
        let (pending, step) = {
            let mut rec = lock(&self.inner.record);
            let old_ret = rec.last_return;

            let Some(pending) = rec.pending else {
                rec.last_return = ret;
                return ret;
            };

            let old_state = rec.current;
            let old_next = rec.next.unwrap_or(old_state);
            rec.current = old_next;

            if pending == old_next {
                // `last_return` keeps waiters asleep until the record is settled.
                rec.next = None;
                if old_ret != StateChangeReturn::Async {
                    rec.last_return = ret;
                }
                if old_state != old_next || old_ret == StateChangeReturn::Async {
                    messages.push(Message::state_changed(self.name(), old_state, old_next, None));
                }
                if std::mem::take(&mut rec.async_started) && old_next >= State::Paused {
                    trace_async_done(self.name(), old_next);
                    messages.push(Message::new(self.name(), MessageKind::AsyncDone));
                }
                (pending, None)
            } else {
                rec.next = Some(old_next.next_towards(pending));
                rec.last_return = StateChangeReturn::Async;
                messages.push(Message::state_changed(
                    self.name(),
                    old_state,
                    old_next,
                    Some(pending),
                ));
                (pending, Some(StateChange::step(old_next, pending)))
            }
        };

        for message in messages {
            self.post(message);
        }

        let mut rec = lock(&self.inner.record);
        if rec.pending != Some(pending) || rec.last_return == StateChangeReturn::Failure {
            // Aborted while the messages were being posted.
            return rec.last_return;
        }
        if let Some(step) = step {
            drop(rec);
            return self.change_state(step);
        }
        rec.pending = None;
        rec.last_return = ret;
        self.inner.state_cond.notify_all();
        tracing::debug!(
            element = %self.name(),
            state = %pending,
            result = %ret,
            "completed state change"
        );
        ret
    }

    /// Complete the asynchronous step in flight.
    ///
    /// Used by elements whose `enter` returned `Async`. Must be called from
    /// a thread other than the one running the element's hooks; it waits
    /// for any `set_state` in progress on this element. Does nothing when
    /// no asynchronous step is pending.
    pub fn commit_state(&self) -> StateChangeReturn {
        let _state = lock(&self.inner.state_lock);
        {
            let rec = lock(&self.inner.record);
            if !rec.is_async_pending() {
                return rec.last_return;
            }
        }
        tracing::debug!(element = %self.name(), "committing async state change");
        self.continue_state(StateChangeReturn::Success)
    }

    /// Mark the transition in flight as failed and wake waiters.
    pub fn abort_state(&self) {
        let mut rec = lock(&self.inner.record);
        if rec.pending.is_none() || rec.last_return == StateChangeReturn::Failure {
            return;
        }
        tracing::info!(
            element = %self.name(),
            current = %rec.current,
            pending = ?rec.pending,
            "aborting state change"
        );
        rec.last_return = StateChangeReturn::Failure;
        rec.next = None;
        rec.pending = None;
        rec.async_started = false;
        self.inner.state_cond.notify_all();
    }

    /// Go back to an asynchronous transition towards the current state.
    ///
    /// Used when an element can no longer vouch for its state, such as a
    /// bin whose only live child left while another child still has to
    /// preroll. PLAYING is lost to PAUSED.
    pub fn lost_state(&self) {
        let mut messages: SmallVec<[Message; 2]> = SmallVec::new();
        {
            let mut rec = lock(&self.inner.record);
            if rec.last_return == StateChangeReturn::Failure {
                return;
            }
            if rec.pending.is_none() {
                if rec.current < State::Paused {
                    return;
                }
                let state = rec.current.min(State::Paused);
                trace_lost_state(self.name(), state);
                rec.current = state;
                rec.next = Some(state);
                rec.pending = Some(state);
                rec.last_return = StateChangeReturn::Async;
                messages.push(Message::state_changed(self.name(), state, state, Some(state)));
            }
            if !std::mem::replace(&mut rec.async_started, true) {
                messages.push(Message::new(self.name(), MessageKind::AsyncStart));
            }
        }
        for message in messages {
            self.post(message);
        }
    }

    /// Bring the element to its parent's current or pending state.
    ///
    /// Used for elements added to a bin that is already running.
    pub fn sync_state_with_parent(&self) -> Result<StateChangeReturn> {
        let parent = self.parent().ok_or_else(|| Error::InvalidState {
            state: self.current_state(),
            reason: format!("'{}' has no parent", self.name()),
        })?;
        let target = {
            let rec = lock(&parent.inner.record);
            rec.pending.unwrap_or(rec.current)
        };
        tracing::debug!(element = %self.name(), parent = %parent.name(), %target, "syncing state with parent");
        Ok(self.set_state(target))
    }

    /// Accept a buffer on the input pad.
    ///
    /// Refused with [`Error::Flushing`] unless the element is in or heading
    /// to PAUSED or PLAYING. The first buffer a sink accepts completes its
    /// preroll.
    pub fn chain(&self, buffer: Buffer) -> Result<()> {
        let ElementKind::Leaf(leaf) = &self.inner.kind else {
            return Err(Error::NotLinked(format!("{}:sink", self.name())));
        };
        if self.sink_pad().is_none() {
            return Err(Error::NotLinked(format!("'{}' has no input pad", self.name())));
        }
        if lock(&self.inner.record).heading() < State::Paused {
            return Err(Error::Flushing);
        }

        lock(&leaf.imp).chain(&self.context(), buffer)?;

        if let BaseBehaviour::Sink(preroll) = &leaf.base {
            if preroll.mark(&self.inner.record)? {
                let _state = lock(&self.inner.state_lock);
                if preroll.is_prerolled() && lock(&self.inner.record).is_async_pending() {
                    tracing::debug!(element = %self.name(), "prerolled");
                    self.continue_state(StateChangeReturn::Success);
                }
            }
        }
        Ok(())
    }
}
