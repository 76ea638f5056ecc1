//! A minimal two-case tagged union used at combinator boundaries.

/// One of two values, tagged by side.
///
/// Used where "which of the two finished first" matters — [`crate::race`]
/// and [`crate::seq`] report their winner as `Left`/`Right`. This is not a
/// general result type; failures travel as [`crate::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Or<L, R> {
    /// The left side.
    Left(L),
    /// The right side.
    Right(R),
}

impl<L, R> Or<L, R> {
    /// True if this is `Left`.
    pub fn is_left(&self) -> bool {
        matches!(self, Or::Left(_))
    }

    /// True if this is `Right`.
    pub fn is_right(&self) -> bool {
        matches!(self, Or::Right(_))
    }

    /// The left value, if present.
    pub fn left(self) -> Option<L> {
        match self {
            Or::Left(value) => Some(value),
            Or::Right(_) => None,
        }
    }

    /// The right value, if present.
    pub fn right(self) -> Option<R> {
        match self {
            Or::Left(_) => None,
            Or::Right(value) => Some(value),
        }
    }

    /// Collapse both sides into one result.
    pub fn fold<T>(self, left: impl FnOnce(L) -> T, right: impl FnOnce(R) -> T) -> T {
        match self {
            Or::Left(value) => left(value),
            Or::Right(value) => right(value),
        }
    }

    /// Transform the left value.
    pub fn map_left<T>(self, f: impl FnOnce(L) -> T) -> Or<T, R> {
        match self {
            Or::Left(value) => Or::Left(f(value)),
            Or::Right(value) => Or::Right(value),
        }
    }

    /// Transform the right value.
    pub fn map_right<T>(self, f: impl FnOnce(R) -> T) -> Or<L, T> {
        match self {
            Or::Left(value) => Or::Left(value),
            Or::Right(value) => Or::Right(f(value)),
        }
    }
}

impl<T> Or<T, T> {
    /// Collapse a symmetric `Or` into its value, forgetting the side.
    pub fn merge(self) -> T {
        self.fold(|value| value, |value| value)
    }
}
