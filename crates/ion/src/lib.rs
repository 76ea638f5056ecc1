//! A small runtime for composable IO effects.
//!
//! Programs are built as immutable descriptions ([`IO`]) that do nothing
//! until run. A trampolining interpreter evaluates them with bounded native
//! stack regardless of composition depth, carries scoped error recovery
//! across thread handoffs, and supports cooperative cancellation of
//! in-flight asynchronous work.
//!
//! The runtime owns no threads: pools and timers are supplied by the caller
//! as [`Executor`] and [`Scheduler`] implementations ([`TokioPool`] adapts a
//! tokio runtime).
//!
//! ```no_run
//! use std::time::Duration;
//! use ion::{race, sleep, IO};
//!
//! let runtime = tokio::runtime::Runtime::new().expect("runtime");
//! let pool = ion::pool(runtime.handle().clone());
//! let timer = ion::scheduler(runtime.handle().clone());
//!
//! let slow = sleep(&timer, Duration::from_millis(500)).map(|_| 1u8);
//! let fast = sleep(&timer, Duration::from_millis(100)).map(|_| "done");
//!
//! let winner = race(&pool, slow, fast).run().expect("race");
//! assert_eq!(winner.right(), Some("done"));
//! ```

mod bridge;
mod cancel;
mod concurrent;
mod data;
mod error;
mod exec;
mod io;
mod node;
mod run;
mod stack;
mod value;

pub use bridge::IoFuture;
pub use concurrent::{both, forked, pair, race, seq, sleep};
pub use data::Or;
pub use error::{Canceled, Error, Outcome, Panicked};
pub use exec::{pool, scheduler, CancelTimer, Executor, Job, Scheduler, TokioPool};
pub use io::{map2, Callback, IO};
pub use value::Value;
