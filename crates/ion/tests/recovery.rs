//! Scoped error recovery, including recovery that survives a thread handoff.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use ion::{Error, Panicked, IO};

#[derive(Debug, thiserror::Error)]
#[error("first: {0}")]
struct First(u32);

#[derive(Debug, thiserror::Error)]
#[error("second: {0}")]
struct Second(u32);

#[test]
fn recovery_on_success_is_inert() {
    let io = IO::pure(1u32).recover(|_| Some(99));
    assert_eq!(io.run().ok(), Some(1));
}

#[test]
fn failure_is_replaced_by_the_recovery_value() {
    let io: IO<u32> = IO::fail(Error::new(First(1))).recover(|_| Some(2));
    assert_eq!(io.run().ok(), Some(2));
}

#[test]
fn recovery_that_fails_again_surfaces_the_second_error() {
    let io: IO<u32> = IO::fail(Error::new(First(1)))
        .recover_with(|error| error.is::<First>().then(|| IO::fail(Error::new(Second(2)))));

    let error = io.run().unwrap_err();
    assert!(error.is::<Second>());
}

#[test]
fn second_failure_is_caught_by_the_enclosing_rule() {
    let io: IO<u32> = IO::fail(Error::new(First(1)))
        .recover_with(|error| error.is::<First>().then(|| IO::fail(Error::new(Second(2)))))
        .recover(|error| error.downcast_ref::<Second>().map(|second| second.0 * 10));

    assert_eq!(io.run().ok(), Some(20));
}

#[test]
fn unmatched_rules_pass_the_error_through() {
    let io: IO<u32> = IO::fail(Error::new(Second(5)))
        .recover(|error| error.is::<First>().then_some(1))
        .recover(|error| error.downcast_ref::<Second>().map(|second| second.0));

    assert_eq!(io.run().ok(), Some(5));
}

#[test]
fn innermost_rule_wins() {
    let io: IO<u32> = IO::fail(Error::new(First(1)))
        .recover(|_| Some(10))
        .recover(|_| Some(20));

    assert_eq!(io.run().ok(), Some(10));
}

#[test]
fn rule_scope_closes_with_its_source() {
    // The recover scope ends once its source succeeds; a failure later in
    // the chain must not reach the spent rule.
    let io: IO<u32> = IO::pure(1u32)
        .recover(|_| Some(99))
        .flat_map(|_| IO::fail(Error::new(Second(3))));

    let error = io.run().unwrap_err();
    assert!(error.is::<Second>());
}

#[test]
fn failure_inside_a_continuation_is_recoverable() {
    let io: IO<u32> = IO::pure(2u32)
        .flat_map(|n| {
            if n > 1 {
                IO::fail(Error::new(First(n)))
            } else {
                IO::pure(n)
            }
        })
        .recover(|error| error.downcast_ref::<First>().map(|first| first.0 + 100));

    assert_eq!(io.run().ok(), Some(102));
}

#[test]
fn rules_do_not_rearm_on_rerun_of_a_settled_failure_path() {
    let attempts = Arc::new(AtomicU32::new(0));
    let in_thunk = Arc::clone(&attempts);

    let io: IO<u32> = IO::delay(move || {
        let n = in_thunk.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            Err(Error::new(First(n)))
        } else {
            Ok(n)
        }
    })
    .recover(|_| Some(77));

    // Each run gets a fresh recovery scope.
    assert_eq!(io.run().ok(), Some(77));
    assert_eq!(io.run().ok(), Some(1));
}

#[test]
fn panics_are_caught_as_declared_failures() {
    let io: IO<u32> = IO::delay(|| panic!("thunk exploded"));
    let error = io.run().unwrap_err();
    let panicked = error.downcast_ref::<Panicked>().expect("panic marker");
    assert!(panicked.0.contains("thunk exploded"));
}

#[test]
fn panics_are_recoverable_like_failures() {
    let io: IO<u32> = IO::delay(|| panic!("boom"))
        .recover(|error| error.is::<Panicked>().then_some(8));
    assert_eq!(io.run().ok(), Some(8));
}

#[test]
fn attempt_captures_the_failure_without_consuming_outer_rules() {
    let io = IO::<u32>::fail(Error::new(First(4)))
        .attempt()
        .recover(|_| None);

    let or = io.run().expect("attempt never fails");
    assert!(or.left().is_some_and(|error| error.is::<First>()));
}

#[test]
fn recovery_survives_a_thread_handoff() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime");
    let pool = ion::pool(runtime.handle().clone());

    // The rule is installed on the launching thread; the failure happens on
    // a pool thread after the fork.
    let io: IO<u32> = IO::pure(3u32)
        .fork(&pool)
        .flat_map(|n| IO::fail(Error::new(First(n))))
        .recover(|error| error.downcast_ref::<First>().map(|first| first.0 * 2));

    assert_eq!(io.run().ok(), Some(6));
}

#[test]
fn unhandled_failure_crosses_the_handoff_intact() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime");
    let pool = ion::pool(runtime.handle().clone());

    let io: IO<u32> = IO::pure(())
        .fork(&pool)
        .flat_map(|_| IO::fail(Error::new(Second(9))));

    let error = io.run().unwrap_err();
    assert_eq!(error.downcast_ref::<Second>().map(|second| second.0), Some(9));
}
