//! Algebraic laws of sequential composition.
//!
//! Descriptions are compared by running them: two descriptions are
//! equivalent when they produce the same result from the same inputs.

use ion::{map2, Error, IO};
use proptest::prelude::*;

fn eval<T: ion::Value + PartialEq + std::fmt::Debug>(io: &IO<T>) -> T {
    io.run().expect("law programs do not fail")
}

#[test]
fn map_identity() {
    let io = IO::pure(41i64);
    assert_eq!(eval(&io.clone().map(|n| n)), eval(&io));
}

#[test]
fn map_composition() {
    let io = IO::delay(|| Ok(10i64));
    let fused = io.clone().map(|n| (n + 1) * 3);
    let staged = io.map(|n| n + 1).map(|n| n * 3);
    assert_eq!(eval(&fused), eval(&staged));
}

#[test]
fn flat_map_left_identity() {
    let f = |n: i64| IO::delay(move || Ok(n * 2));
    assert_eq!(eval(&IO::pure(21i64).flat_map(f)), eval(&f(21)));
}

#[test]
fn flat_map_right_identity() {
    let io = IO::delay(|| Ok(7i64));
    assert_eq!(eval(&io.clone().flat_map(IO::pure)), eval(&io));
}

#[test]
fn flat_map_associativity() {
    let io = IO::pure(3i64);
    let f = |n: i64| IO::delay(move || Ok(n + 10));
    let g = |n: i64| IO::pure(n * n);

    let left = io.clone().flat_map(f).flat_map(g);
    let right = io.flat_map(move |n| f(n).flat_map(g));
    assert_eq!(eval(&left), eval(&right));
}

#[test]
fn chain_discards_and_also_keeps() {
    let first = IO::pure(1u32);
    let second = IO::pure(2u32);
    assert_eq!(eval(&first.clone().chain(second.clone())), 2);
    assert_eq!(eval(&first.also(second)), 1);
}

#[test]
fn chain_still_runs_the_discarded_effect() {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    let counter = Arc::new(AtomicU32::new(0));
    let in_thunk = Arc::clone(&counter);
    let first = IO::delay(move || {
        in_thunk.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    assert_eq!(eval(&first.chain(IO::pure(5u32))), 5);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn map2_agrees_with_flat_map() {
    let a = IO::pure(6i64);
    let b = IO::delay(|| Ok(7i64));
    let via_map2 = map2(a.clone(), b.clone(), |x, y| x * y);
    let via_bind = a.flat_map(move |x| b.clone().map(move |y| x * y));
    assert_eq!(eval(&via_map2), eval(&via_bind));
}

#[test]
fn failure_short_circuits_later_binds() {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    let counter = Arc::new(AtomicU32::new(0));
    let in_cont = Arc::clone(&counter);

    let io: IO<u32> = IO::pure(1u32)
        .flat_map(|_| IO::fail(Error::msg("stop")))
        .map(move |n: u32| {
            in_cont.fetch_add(1, Ordering::SeqCst);
            n
        });

    assert!(io.run().is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

mod properties {
    use super::*;

    proptest! {
        #[test]
        fn map_composition_holds(n in any::<i64>(), add in -1000i64..1000, mul in -8i64..8) {
            let io = IO::pure(n);
            let fused = io.clone().map(move |x| (x.wrapping_add(add)).wrapping_mul(mul));
            let staged = io.map(move |x| x.wrapping_add(add)).map(move |x| x.wrapping_mul(mul));
            prop_assert_eq!(eval(&fused), eval(&staged));
        }

        #[test]
        fn associativity_holds(n in any::<i64>(), add in -1000i64..1000, mul in -8i64..8) {
            let io = IO::delay(move || Ok(n));
            let f = move |x: i64| IO::pure(x.wrapping_add(add));
            let g = move |x: i64| IO::delay(move || Ok(x.wrapping_mul(mul)));

            let left = io.clone().flat_map(f).flat_map(g);
            let right = io.flat_map(move |x| f(x).flat_map(g));
            prop_assert_eq!(eval(&left), eval(&right));
        }

        #[test]
        fn attempt_round_trips_success(n in any::<u32>()) {
            let or = IO::pure(n).attempt().run().expect("attempt never fails");
            prop_assert_eq!(or.right(), Some(n));
        }
    }
}
