//! The typed effect description.
//!
//! An `IO<T>` is an immutable value describing a computation that produces a
//! `T` and may perform side effects when — and only when — it is run.
//! Building and composing descriptions is free of effects and O(1) per
//! combinator; the same description can be run any number of times with
//! independent outcomes.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::bridge::{self, IoFuture};
use crate::cancel::CancelToken;
use crate::data::Or;
use crate::error::{Error, Outcome};
use crate::exec::Executor;
use crate::node::{Node, NodeCallback};
use crate::run;
use crate::value::{erase, reify, Value};

/// Completion callback injected into an async registrar. Call it exactly
/// once with the result of the asynchronous work.
pub type Callback<T> = Box<dyn FnOnce(Result<T, Error>) + Send>;

/// A description of a computation of `T`.
pub struct IO<T> {
    node: Node,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for IO<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for IO<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.node, f)
    }
}

impl<T: Value> IO<T> {
    pub(crate) fn from_node(node: Node) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    pub(crate) fn into_node(self) -> Node {
        self.node
    }

    /// Lift a pure value. Running it performs no effect.
    pub fn pure(value: T) -> Self {
        Self::from_node(Node::Pure(erase(value)))
    }

    /// Describe a synchronous action evaluated on the running thread each
    /// time the description is run.
    pub fn delay(thunk: impl Fn() -> Result<T, Error> + Send + Sync + 'static) -> Self {
        Self::from_node(Node::Delay(Arc::new(move || thunk().map(erase))))
    }

    /// Defer construction of a description. This is the recursion point:
    /// a recursive `suspend` builds its tree lazily inside the trampoline,
    /// so unbounded recursion depth costs no native stack.
    pub fn suspend(resume: impl Fn() -> IO<T> + Send + Sync + 'static) -> Self {
        Self::from_node(Node::Suspend(Arc::new(move || resume().into_node())))
    }

    /// A description that fails immediately.
    pub fn fail(error: impl Into<Error>) -> Self {
        Self::from_node(Node::Fail(error.into()))
    }

    /// Describe an asynchronous computation. The registrar receives a
    /// callback and must arrange for it to be called exactly once, on any
    /// thread, with the result.
    pub fn from_async(register: impl Fn(Callback<T>) + Send + Sync + 'static) -> Self {
        Self::from_node(Node::Async {
            register: Arc::new(move |callback: NodeCallback| {
                let typed: Callback<T> = Box::new(move |result| callback(result.map(erase)));
                register(typed);
                Node::Pure(erase(()))
            }),
        })
    }

    /// Like [`IO::from_async`], for work that can be torn down: the
    /// registrar returns the action that cancels whatever it scheduled.
    /// See [`crate::sleep`] for the canonical use.
    pub fn cancellable(register: impl Fn(Callback<T>) -> IO<()> + Send + Sync + 'static) -> Self {
        Self::from_node(Node::Async {
            register: Arc::new(move |callback: NodeCallback| {
                let typed: Callback<T> = Box::new(move |result| callback(result.map(erase)));
                register(typed).into_node()
            }),
        })
    }

    /// A description that never completes.
    pub fn never() -> Self {
        Self::from_async(|_callback| {})
    }

    /// Describe waiting on an already-running evaluation. Running the
    /// description again observes the same settled outcome.
    pub fn from_future(future: IoFuture<T>) -> Self {
        Self::from_async(move |callback| {
            future.when_complete(move |outcome| callback(outcome.into_result()));
        })
    }

    /// Apply a transformation to the result.
    pub fn map<U: Value>(self, f: impl Fn(T) -> U + Send + Sync + 'static) -> IO<U> {
        self.flat_map(move |value| IO::pure(f(value)))
    }

    /// Sequence another description that depends on this one's result. The
    /// fundamental combinator; everything sequential is built from it.
    pub fn flat_map<U: Value>(self, f: impl Fn(T) -> IO<U> + Send + Sync + 'static) -> IO<U> {
        IO::from_node(
            self.node
                .bind(Arc::new(move |value| f(reify::<T>(value)).into_node())),
        )
    }

    /// Sequence `next` after this description, discarding this result.
    pub fn chain<U: Value>(self, next: IO<U>) -> IO<U> {
        self.flat_map(move |_| next.clone())
    }

    /// Run `other` after this description and keep this description's
    /// result.
    pub fn also<U: Value>(self, other: IO<U>) -> IO<T> {
        self.flat_map(move |value| other.clone().map(move |_| value.clone()))
    }

    /// Discard the result.
    pub fn to_unit(self) -> IO<()> {
        self.map(|_| ())
    }

    /// Recover from a failure with a plain value. The rule is partial:
    /// return `None` to let the failure keep propagating.
    pub fn recover(self, rescue: impl Fn(&Error) -> Option<T> + Send + Sync + 'static) -> Self {
        self.recover_with(move |error| rescue(error).map(IO::pure))
    }

    /// Recover from a failure with another description, scoped to this one.
    pub fn recover_with(
        self,
        rescue: impl Fn(&Error) -> Option<IO<T>> + Send + Sync + 'static,
    ) -> Self {
        Self::from_node(Node::Recover {
            source: Box::new(self.node),
            rescue: Arc::new(move |error| rescue(error).map(IO::into_node)),
        })
    }

    /// Make failure a value: succeeds with `Or::Right` on success and
    /// `Or::Left` on failure. Total — never leaves an unhandled error.
    pub fn attempt(self) -> IO<Or<Error, T>> {
        self.map(Or::Right)
            .recover(move |error| Some(Or::Left(error.clone())))
    }

    /// Continue on the given pool: everything sequenced after this point
    /// runs on `pool` until the next handoff.
    pub fn fork(self, pool: &Arc<dyn Executor>) -> Self {
        self.also(crate::concurrent::forked(pool))
    }

    /// Insert an async boundary without changing threads. Useful as a
    /// cancellation point around otherwise-uncancellable blocking work.
    pub fn boundary(self) -> Self {
        self.also(IO::<()>::from_async(|callback| callback(Ok(()))))
    }

    /// Start evaluating immediately and return a handle to the eventual
    /// outcome. The synchronous prefix runs on the calling thread before
    /// this returns.
    pub fn run_async(&self) -> IoFuture<T> {
        self.run_async_with(CancelToken::detached())
    }

    pub(crate) fn run_async_with(&self, token: Arc<CancelToken>) -> IoFuture<T> {
        let (promise, future) = bridge::promise::<T>();
        run::evaluate(
            self.node.clone(),
            token,
            Box::new(move |outcome: Outcome<_>| promise.complete(outcome)),
        );
        future
    }

    /// Evaluate, blocking the calling thread across async parts, and return
    /// the value or the original error.
    pub fn run(&self) -> Result<T, Error> {
        futures::executor::block_on(self.run_async()).into_result()
    }
}

impl IO<()> {
    /// The no-op description.
    pub fn unit() -> IO<()> {
        IO::pure(())
    }
}

/// Combine the results of two descriptions, sequentially.
pub fn map2<T, U, V>(
    first: IO<T>,
    second: IO<U>,
    f: impl Fn(T, U) -> V + Send + Sync + 'static,
) -> IO<V>
where
    T: Value,
    U: Value,
    V: Value,
{
    let f = Arc::new(f);
    first.flat_map(move |t| {
        let f = Arc::clone(&f);
        second.clone().map(move |u| f(t.clone(), u))
    })
}
