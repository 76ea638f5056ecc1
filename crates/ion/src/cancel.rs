//! Cancellation tokens.
//!
//! A token is attached to one in-flight evaluation. The async bridge
//! consults it immediately before registering a callback, so a cancellation
//! request that arrives "too early" (before the callback exists) or "too
//! late" (after completion) is neither lost nor double-applied.
//!
//! Cancellation is cooperative: it prevents not-yet-started async work from
//! starting and runs the cancel action supplied for in-flight work (such as
//! cancelling a scheduled timer). It cannot interrupt a blocking synchronous
//! section; only the async boundary around it can be torn down.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::node::Node;
use crate::run;

const CANCELLED: u8 = 0b001;
const CANCELLING: u8 = 0b010;
const STARTING: u8 = 0b100;

/// Run state of one evaluation, shared between the run loop, the async
/// bridge, and the one external actor allowed to request cancellation.
pub(crate) struct CancelToken {
    cancellable: bool,
    state: AtomicU8,
    /// Cancel action for the async work currently in flight. The lock is
    /// never held across running the action.
    action: Mutex<Option<Node>>,
}

impl CancelToken {
    /// Fresh cancellable token, one per race participant.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            cancellable: true,
            state: AtomicU8::new(0),
            action: Mutex::new(None),
        })
    }

    /// Token for evaluations nobody can cancel (top-level runs, `seq`
    /// branches, cancel actions themselves).
    pub(crate) fn detached() -> Arc<Self> {
        Arc::new(Self {
            cancellable: false,
            state: AtomicU8::new(0),
            action: Mutex::new(None),
        })
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellable && self.state.load(Ordering::Acquire) & (CANCELLED | CANCELLING) != 0
    }

    /// Called by the bridge before invoking a registrar. Returns false when
    /// the evaluation is already being torn down, in which case the work
    /// must not start.
    pub(crate) fn try_begin(&self) -> bool {
        if !self.cancellable {
            return true;
        }
        loop {
            let state = self.state.load(Ordering::Acquire);
            if state & (CANCELLED | CANCELLING) != 0 {
                return false;
            }
            if self
                .state
                .compare_exchange(state, state | STARTING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Called by the bridge once the registrar returned its cancel action.
    /// A cancellation that raced with registration is applied here, exactly
    /// once.
    pub(crate) fn registered(&self, cancel_action: Node) {
        if !self.cancellable {
            return;
        }
        *self.action.lock() = Some(cancel_action);
        loop {
            let state = self.state.load(Ordering::Acquire);
            if state & CANCELLING != 0 {
                if self
                    .state
                    .compare_exchange(state, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.run_action();
                    return;
                }
            } else if self
                .state
                .compare_exchange(
                    state,
                    state & !STARTING,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return;
            }
        }
    }

    /// Request cancellation. Terminal: once a token is cancelled it stays
    /// cancelled, and later requests are no-ops.
    pub(crate) fn cancel(&self) {
        if !self.cancellable {
            return;
        }
        loop {
            let state = self.state.load(Ordering::Acquire);
            if state & CANCELLED != 0 {
                return;
            }
            if state & STARTING != 0 {
                // Registration in flight; leave a note for `registered`.
                if self
                    .state
                    .compare_exchange(
                        state,
                        state | CANCELLING,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    return;
                }
            } else if self
                .state
                .compare_exchange(state, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                tracing::trace!("cancellation requested");
                self.run_action();
                return;
            }
        }
    }

    fn run_action(&self) {
        let action = self.action.lock().take();
        if let Some(action) = action {
            run::fire_and_forget(action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_before_start_blocks_new_work() {
        let token = CancelToken::new();
        token.cancel();
        assert!(!token.try_begin());
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_is_terminal_and_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_during_registration_is_applied_by_registered() {
        use std::sync::atomic::AtomicU32;

        let fired = Arc::new(AtomicU32::new(0));
        let token = CancelToken::new();

        assert!(token.try_begin());
        // Cancellation arrives while the registrar is still running.
        token.cancel();
        assert!(token.is_cancelled());

        let fired_in_action = Arc::clone(&fired);
        token.registered(Node::Delay(Arc::new(move || {
            fired_in_action.fetch_add(1, Ordering::SeqCst);
            Ok(crate::value::erase(()))
        })));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!token.try_begin());
    }

    #[test]
    fn detached_tokens_ignore_cancellation() {
        let token = CancelToken::detached();
        token.cancel();
        assert!(token.try_begin());
        assert!(!token.is_cancelled());
    }
}
