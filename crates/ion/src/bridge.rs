//! The async bridge: callback boundaries as awaitable futures.
//!
//! An `Async` node hands the interpreter a registrar that will eventually
//! call a completion callback, possibly on another thread. [`execute`] turns
//! that into a disciplined handoff: the token is consulted before any work
//! starts, the continuation is armed inside the callback *before* the
//! registrar runs, and the registrar's cancel action is parked in the token.
//!
//! Arming the continuation first is a correctness requirement, not a detail:
//! a registrar that completes synchronously (or very fast on another thread)
//! must resume the interpreter on the callback's thread. If the continuation
//! were attached to an already-resolved future after the fact, it would run
//! on whichever thread happened to attach it.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::error::Outcome;
use crate::node::{NodeCallback, Register};
use crate::run::{guarded, Done};
use crate::value::{reify, BoxValue, Value};

type Waiter = Box<dyn FnOnce(Outcome<BoxValue>) + Send>;

enum State {
    Pending {
        callbacks: Vec<Waiter>,
        waker: Option<Waker>,
    },
    Done(Outcome<BoxValue>),
}

struct Shared {
    state: Mutex<State>,
}

/// Write end of one evaluation's result. Completion is idempotent; the first
/// writer wins.
#[derive(Clone)]
pub(crate) struct Promise {
    shared: Arc<Shared>,
}

impl Promise {
    pub(crate) fn complete(&self, outcome: Outcome<BoxValue>) {
        let (callbacks, waker) = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Pending { callbacks, waker } => {
                    let callbacks = std::mem::take(callbacks);
                    let waker = waker.take();
                    *state = State::Done(outcome.clone());
                    (callbacks, waker)
                }
                State::Done(_) => return,
            }
            // Lock released before any waiter runs.
        };
        for callback in callbacks {
            callback(outcome.clone());
        }
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Read end of one evaluation's result.
///
/// Implements [`Future`], so it can be awaited from any async context; the
/// runtime itself consumes it through `when_complete`, which runs the waiter
/// on the completer's thread. A settled future hands its outcome to any
/// number of late waiters.
pub struct IoFuture<T> {
    shared: Arc<Shared>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for IoFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _marker: PhantomData,
        }
    }
}

impl<T: Value> IoFuture<T> {
    /// Attach a waiter. Runs on the completer's thread, or immediately on
    /// the current one when the future is already settled.
    pub(crate) fn when_complete(&self, f: impl FnOnce(Outcome<T>) + Send + 'static) {
        let waiter: Waiter = Box::new(move |outcome| f(outcome.map(reify::<T>)));
        let settled = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Pending { callbacks, .. } => {
                    callbacks.push(waiter);
                    None
                }
                State::Done(outcome) => Some((waiter, outcome.clone())),
            }
        };
        if let Some((waiter, outcome)) = settled {
            waiter(outcome);
        }
    }
}

impl<T: Value> Future for IoFuture<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.state.lock();
        match &mut *state {
            State::Pending { waker, .. } => {
                *waker = Some(cx.waker().clone());
                Poll::Pending
            }
            State::Done(outcome) => Poll::Ready(outcome.clone().map(reify::<T>)),
        }
    }
}

/// Fresh promise/future pair for one evaluation.
pub(crate) fn promise<T>() -> (Promise, IoFuture<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::Pending {
            callbacks: Vec::new(),
            waker: None,
        }),
    });
    (
        Promise {
            shared: Arc::clone(&shared),
        },
        IoFuture {
            shared,
            _marker: PhantomData,
        },
    )
}

/// Drive one async boundary.
///
/// Consults the token first: work that is already doomed never starts and
/// the evaluation resolves as cancelled. Otherwise the registrar receives a
/// callback that forwards the (exactly one) completion to `done`, and its
/// cancel action is stored in the token, where a cancellation that raced
/// with registration is applied immediately.
pub(crate) fn execute(register: Register, token: &Arc<CancelToken>, done: Done) {
    if !token.try_begin() {
        tracing::trace!("async boundary skipped: evaluation already cancelled");
        done(Outcome::Canceled);
        return;
    }

    let slot = Arc::new(Mutex::new(Some(done)));
    let callback: NodeCallback = {
        let slot = Arc::clone(&slot);
        Box::new(move |result| {
            if let Some(done) = slot.lock().take() {
                match result {
                    Ok(value) => done(Outcome::Success(value)),
                    Err(error) => done(Outcome::Failure(error)),
                }
            }
        })
    };

    match guarded(|| register(callback)) {
        Ok(cancel_action) => token.registered(cancel_action),
        Err(error) => {
            // The registrar itself failed. If it had not yet completed the
            // callback, fail the evaluation with its error.
            if let Some(done) = slot.lock().take() {
                done(Outcome::Failure(error));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::erase;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn synchronous_completion_resumes_exactly_once() {
        let seen = Arc::new(AtomicU32::new(0));
        let seen_in_done = Arc::clone(&seen);

        let register: Register = Arc::new(|callback: NodeCallback| {
            callback(Ok(erase(5u8)));
            crate::node::Node::Pure(erase(()))
        });

        execute(
            register,
            &CancelToken::detached(),
            Box::new(move |outcome| {
                assert!(matches!(outcome, Outcome::Success(_)));
                seen_in_done.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_token_prevents_registration() {
        let started = Arc::new(AtomicU32::new(0));
        let started_in_register = Arc::clone(&started);

        let register: Register = Arc::new(move |_callback: NodeCallback| {
            started_in_register.fetch_add(1, Ordering::SeqCst);
            crate::node::Node::Pure(erase(()))
        });

        let token = CancelToken::new();
        token.cancel();

        let cancelled = Arc::new(AtomicU32::new(0));
        let cancelled_in_done = Arc::clone(&cancelled);
        execute(
            register,
            &token,
            Box::new(move |outcome| {
                assert!(outcome.is_canceled());
                cancelled_in_done.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn settled_future_serves_late_waiters() {
        let (promise, future) = promise::<u32>();
        promise.complete(Outcome::Success(erase(11u32)));

        let seen = Arc::new(AtomicU32::new(0));
        let seen_late = Arc::clone(&seen);
        future.when_complete(move |outcome| {
            if let Outcome::Success(value) = outcome {
                seen_late.store(value, Ordering::SeqCst);
            }
        });
        assert_eq!(seen.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn completion_is_first_writer_wins() {
        let (promise, future) = promise::<u32>();
        promise.complete(Outcome::Success(erase(1u32)));
        promise.complete(Outcome::Success(erase(2u32)));

        let seen = Arc::new(AtomicU32::new(0));
        let seen_once = Arc::clone(&seen);
        future.when_complete(move |outcome| {
            if let Outcome::Success(value) = outcome {
                seen_once.store(value, Ordering::SeqCst);
            }
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
