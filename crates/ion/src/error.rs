//! Error and outcome types for effect evaluation.
//!
//! User code can fail with any error type; the runtime carries failures as
//! cheaply cloneable [`Error`] values so that recovery rules can inspect them
//! with [`Error::downcast_ref`] and `run()` can surface the original error at
//! the end. Cancellation is not an error: it is a third resolution state of
//! [`Outcome`].

use std::fmt;
use std::sync::Arc;

/// A failure value flowing through the runtime.
///
/// Wraps [`anyhow::Error`] in an `Arc` so failures can be cloned into
/// recovery rules, `attempt` results, and late future waiters without losing
/// the original typed error underneath.
#[derive(Clone)]
pub struct Error {
    inner: Arc<anyhow::Error>,
}

impl Error {
    /// Wrap any error (or an existing `anyhow::Error`).
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: Arc::new(error.into()),
        }
    }

    /// Build an error from a display message.
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(anyhow::Error::msg(message)),
        }
    }

    /// Downcast to the original error type, if this failure carries one.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// True if the underlying error is of type `E`.
    pub fn is<E>(&self) -> bool
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.is::<E>()
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::new(Panicked(message))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

/// Marker error observed when a cancelled resolution crosses an error-shaped
/// boundary (for example a race branch that lost to outer cancellation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("evaluation was cancelled")]
pub struct Canceled;

/// Marker error wrapping a panic caught at the trampoline boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("effect panicked: {0}")]
pub struct Panicked(pub String);

/// The resolution of one evaluation.
///
/// `Canceled` is distinct from failure: a cancelled branch is torn down
/// rather than failed, and a successful-path continuation never observes it.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The evaluation produced a value.
    Success(T),
    /// The evaluation failed and no recovery rule matched.
    Failure(Error),
    /// The evaluation was cancelled before it could resolve.
    Canceled,
}

impl<T> Outcome<T> {
    /// True for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// True for `Canceled`.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Outcome::Canceled)
    }

    /// Convert into a `Result`, mapping cancellation to the [`Canceled`]
    /// marker error.
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(error) => Err(error),
            Outcome::Canceled => Err(Error::new(Canceled)),
        }
    }

    /// Map the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(error) => Outcome::Failure(error),
            Outcome::Canceled => Outcome::Canceled,
        }
    }
}
