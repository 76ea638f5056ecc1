//! The erased effect description tree.
//!
//! `Node` is the closed set of effect shapes the interpreter understands.
//! It is purely data: building a node performs no effect, and a node can be
//! evaluated any number of times. The typed [`crate::IO`] facade constructs
//! nodes; only the interpreter consumes them.
//!
//! Sequential composition produces long `Bind`/`Recover` spines (one node per
//! `flat_map`), so `Clone` and `Drop` walk the spine iteratively — a derived
//! implementation would recurse once per sequencing layer and overflow the
//! native stack on the chains the runtime exists to support.

use std::fmt;
use std::mem;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::Error;
use crate::value::BoxValue;

/// Synchronous fallible thunk (`Delay`).
pub(crate) type Thunk = Arc<dyn Fn() -> Result<BoxValue, Error> + Send + Sync>;
/// Deferred tree construction (`Suspend`).
pub(crate) type ResumeFn = Arc<dyn Fn() -> Node + Send + Sync>;
/// Partial recovery function (`Recover`).
pub(crate) type RescueFn = Arc<dyn Fn(&Error) -> Option<Node> + Send + Sync>;
/// Bind continuation: erased value to next description.
pub(crate) type Cont = Arc<dyn Fn(BoxValue) -> Node + Send + Sync>;
/// Completion callback handed to an async registrar. Must be invoked at most
/// once; dropping it unresolved models an effect that never completes.
pub(crate) type NodeCallback = Box<dyn FnOnce(Result<BoxValue, Error>) + Send>;
/// Async registrar: receives the completion callback, begins the work, and
/// returns the cancellation action for anything it scheduled.
pub(crate) type Register = Arc<dyn Fn(NodeCallback) -> Node + Send + Sync>;

/// One effect shape. The variant set is closed by design: the interpreter
/// matches exhaustively and there is no open extension point.
pub(crate) enum Node {
    /// Already-computed result.
    Pure(BoxValue),
    /// Side effect evaluated synchronously when reached.
    Delay(Thunk),
    /// Deferred construction of the next description.
    Suspend(ResumeFn),
    /// Immediate failure.
    Fail(Error),
    /// Recovery rule scoped to `source`.
    Recover {
        source: Box<Node>,
        rescue: RescueFn,
    },
    /// Sequential composition.
    Bind {
        source: Box<Node>,
        cont: Cont,
    },
    /// Asynchronous boundary.
    Async {
        register: Register,
    },
}

/// Placeholder left behind when a spine link is detached during drop.
static DETACHED: Lazy<Node> =
    Lazy::new(|| Node::Fail(Error::msg("effect detached from a dropped chain")));

impl Node {
    /// Sequence `cont` after this node.
    pub(crate) fn bind(self, cont: Cont) -> Node {
        Node::Bind {
            source: Box::new(self),
            cont,
        }
    }

    /// Clone a node that is not a spine link. Spine links are handled by the
    /// iterative `Clone` below.
    fn clone_leaf(&self) -> Node {
        match self {
            Node::Pure(value) => Node::Pure(value.clone()),
            Node::Delay(thunk) => Node::Delay(Arc::clone(thunk)),
            Node::Suspend(resume) => Node::Suspend(Arc::clone(resume)),
            Node::Fail(error) => Node::Fail(error.clone()),
            Node::Async { register } => Node::Async {
                register: Arc::clone(register),
            },
            Node::Recover { .. } | Node::Bind { .. } => {
                unreachable!("spine links are cloned iteratively")
            }
        }
    }

    /// Take the source link out of a `Bind`/`Recover`, leaving a placeholder.
    pub(crate) fn detach_source(&mut self) -> Option<Box<Node>> {
        match self {
            Node::Bind { source, .. } | Node::Recover { source, .. } => {
                Some(mem::replace(source, Box::new(DETACHED.clone_leaf())))
            }
            _ => None,
        }
    }

    fn fmt_at_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        if depth > 8 {
            return write!(f, "..");
        }
        match self {
            Node::Pure(_) => write!(f, "pure(..)"),
            Node::Delay(_) => write!(f, "delay(.)"),
            Node::Suspend(_) => write!(f, "suspend(.)"),
            Node::Fail(error) => write!(f, "fail({error})"),
            Node::Async { .. } => write!(f, "async(.)"),
            Node::Recover { source, .. } => {
                write!(f, "recover(")?;
                source.fmt_at_depth(f, depth + 1)?;
                write!(f, ")")
            }
            Node::Bind { source, .. } => {
                write!(f, "bind(")?;
                source.fmt_at_depth(f, depth + 1)?;
                write!(f, ", .)")
            }
        }
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        let mut spine: Vec<&Node> = Vec::new();
        let mut cursor = self;
        loop {
            match cursor {
                Node::Bind { source, .. } | Node::Recover { source, .. } => {
                    spine.push(cursor);
                    cursor = source;
                }
                _ => break,
            }
        }

        let mut cloned = cursor.clone_leaf();
        for link in spine.into_iter().rev() {
            cloned = match link {
                Node::Bind { cont, .. } => Node::Bind {
                    source: Box::new(cloned),
                    cont: Arc::clone(cont),
                },
                Node::Recover { rescue, .. } => Node::Recover {
                    source: Box::new(cloned),
                    rescue: Arc::clone(rescue),
                },
                _ => unreachable!("spine contains only Bind and Recover"),
            };
        }
        cloned
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        // Unlink the spine before the child boxes drop, so destruction of a
        // deep chain is a loop, not recursion.
        let mut next = self.detach_source();
        while let Some(mut node) = next {
            next = node.detach_source();
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_at_depth(f, 0)
    }
}
