//! Type erasure for values travelling through the interpreter.
//!
//! The run loop is monomorphic: intermediate results of `Bind` chains have
//! types the loop cannot name, so they travel as [`BoxValue`] — a cloneable,
//! sendable `Any` box. The typed [`crate::IO`] facade is the only writer and
//! reader of erased values, which is what keeps the downcasts total.

use std::any::Any;

/// Bound on every value an effect can produce.
///
/// `Clone` is what makes descriptions re-runnable and lets a settled future
/// hand its outcome to late waiters; `Send + Sync` is what lets descriptions
/// cross pool boundaries.
pub trait Value: Any + Send + Sync + Clone {}

impl<T: Any + Send + Sync + Clone> Value for T {}

/// Object-safe companion of [`Value`].
pub(crate) trait AnyValue: Any + Send + Sync {
    fn clone_boxed(&self) -> BoxValue;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Value> AnyValue for T {
    fn clone_boxed(&self) -> BoxValue {
        Box::new(self.clone())
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// An erased effect value.
pub(crate) type BoxValue = Box<dyn AnyValue>;

impl Clone for BoxValue {
    fn clone(&self) -> Self {
        // Explicit deref: auto-ref would resolve `clone_boxed` on the box
        // itself (which satisfies `AnyValue` via the blanket impl) and
        // recurse through this `Clone` forever.
        (**self).clone_boxed()
    }
}

pub(crate) fn erase<T: Value>(value: T) -> BoxValue {
    Box::new(value)
}

/// Recover the concrete type of an erased value.
///
/// Typed constructors are the only writers of erased values, so a mismatch
/// here means interpreter bookkeeping is broken, not user error.
pub(crate) fn reify<T: Value>(value: BoxValue) -> T {
    match value.into_any().downcast::<T>() {
        Ok(boxed) => *boxed,
        Err(_) => unreachable!("erased value carried an unexpected type"),
    }
}
