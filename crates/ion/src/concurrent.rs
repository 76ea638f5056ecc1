//! Concurrency combinators.
//!
//! Concurrency here is explicit: nothing runs in parallel unless a
//! description is handed to a pool through one of these combinators. All of
//! them start their branches with a pool handoff, so a synchronous prefix of
//! one branch cannot starve the other.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::data::Or;
use crate::exec::{Executor, Scheduler};
use crate::io::{Callback, IO};
use crate::value::Value;

/// A description that completes on one of `pool`'s threads. Everything
/// sequenced after it runs there; [`IO::fork`] is the usual entry point.
pub fn forked(pool: &Arc<dyn Executor>) -> IO<()> {
    let pool = Arc::clone(pool);
    IO::from_async(move |callback: Callback<()>| {
        pool.execute(Box::new(move || callback(Ok(()))));
    })
}

/// A description that completes after `duration`, without occupying a
/// thread while waiting. Cancellable: tearing it down cancels the timer.
pub fn sleep(scheduler: &Arc<dyn Scheduler>, duration: Duration) -> IO<()> {
    let scheduler = Arc::clone(scheduler);
    IO::cancellable(move |callback: Callback<()>| {
        let timer = scheduler.schedule(duration, Box::new(move || callback(Ok(()))));
        let slot = Mutex::new(Some(timer));
        IO::delay(move || {
            if let Some(cancel) = slot.lock().take() {
                cancel();
            }
            Ok(())
        })
    })
}

/// Run both descriptions on `pool` and complete with the first settled one,
/// cancelling the other. The loser's outcome is discarded, including a
/// failure that arrives after the winner.
pub fn race<L, R>(pool: &Arc<dyn Executor>, left: IO<L>, right: IO<R>) -> IO<Or<L, R>>
where
    L: Value,
    R: Value,
{
    let pool = Arc::clone(pool);
    IO::cancellable(move |callback: Callback<Or<L, R>>| {
        let left_token = CancelToken::new();
        let right_token = CancelToken::new();
        let slot = Arc::new(Mutex::new(Some(callback)));

        let left_future = forked(&pool)
            .chain(left.clone())
            .run_async_with(Arc::clone(&left_token));
        let right_future = forked(&pool)
            .chain(right.clone())
            .run_async_with(Arc::clone(&right_token));

        {
            let slot = Arc::clone(&slot);
            let loser = Arc::clone(&right_token);
            left_future.when_complete(move |outcome| {
                if let Some(callback) = slot.lock().take() {
                    tracing::trace!(winner = "left", "race settled");
                    loser.cancel();
                    callback(outcome.into_result().map(Or::Left));
                }
            });
        }
        {
            let slot = Arc::clone(&slot);
            let loser = Arc::clone(&left_token);
            right_future.when_complete(move |outcome| {
                if let Some(callback) = slot.lock().take() {
                    tracing::trace!(winner = "right", "race settled");
                    loser.cancel();
                    callback(outcome.into_result().map(Or::Right));
                }
            });
        }

        let cancel_left = Arc::clone(&left_token);
        let cancel_right = Arc::clone(&right_token);
        IO::delay(move || {
            cancel_left.cancel();
            cancel_right.cancel();
            Ok(())
        })
    })
}

/// Run both descriptions on `pool` and complete with the first settled one
/// plus a description that waits for the other. Neither branch is cancelled;
/// the returned handle observes the loser's own outcome. `Or::Left` means
/// `first` finished first.
pub fn seq<T, U>(
    pool: &Arc<dyn Executor>,
    first: IO<T>,
    second: IO<U>,
) -> IO<Or<(T, IO<U>), (U, IO<T>)>>
where
    T: Value,
    U: Value,
{
    let pool = Arc::clone(pool);
    IO::from_async(move |callback: Callback<Or<(T, IO<U>), (U, IO<T>)>>| {
        let slot = Arc::new(Mutex::new(Some(callback)));

        let first_future = forked(&pool)
            .chain(first.clone())
            .run_async_with(CancelToken::detached());
        let second_future = forked(&pool)
            .chain(second.clone())
            .run_async_with(CancelToken::detached());

        {
            let slot = Arc::clone(&slot);
            let loser = second_future.clone();
            first_future.when_complete(move |outcome| {
                if let Some(callback) = slot.lock().take() {
                    callback(
                        outcome
                            .into_result()
                            .map(|value| Or::Left((value, IO::from_future(loser.clone())))),
                    );
                }
            });
        }
        {
            let slot = Arc::clone(&slot);
            let loser = first_future.clone();
            second_future.when_complete(move |outcome| {
                if let Some(callback) = slot.lock().take() {
                    callback(
                        outcome
                            .into_result()
                            .map(|value| Or::Right((value, IO::from_future(loser.clone())))),
                    );
                }
            });
        }
    })
}

/// [`seq`] for two descriptions of the same type: first value in, plus a
/// handle to the straggler.
pub fn pair<T: Value>(pool: &Arc<dyn Executor>, first: IO<T>, second: IO<T>) -> IO<(T, IO<T>)> {
    seq(pool, first, second).map(Or::merge)
}

/// Run both descriptions on `pool` and wait for both results.
pub fn both<T, U>(pool: &Arc<dyn Executor>, first: IO<T>, second: IO<U>) -> IO<(T, U)>
where
    T: Value,
    U: Value,
{
    seq(pool, first, second).flat_map(|settled| match settled {
        Or::Left((first_value, rest)) => rest.map(move |second_value| (first_value.clone(), second_value)),
        Or::Right((second_value, rest)) => rest.map(move |first_value| (first_value, second_value.clone())),
    })
}
