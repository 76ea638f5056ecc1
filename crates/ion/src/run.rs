//! The interpreter: a trampolining run loop over effect descriptions.
//!
//! The loop never recurses for sequencing. Left-nested binds are flattened
//! with the standard rewrite `Bind(Bind(s, g), f) -> Bind(s, a -> Bind(g(a),
//! f))`, executed iteratively, which bounds native stack usage independent
//! of program size. Suspension happens only at `Async` nodes: the pending
//! continuation and the live recovery stack move into the completion
//! callback, so evaluation resumes — with recovery intact — on whatever
//! thread completes the boundary.
//!
//! Failures are ordinary values in here. The only genuine unwinds tolerated
//! are panics from user thunks, continuations, and registrars, which are
//! caught at this boundary and funneled back through the handler stack.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::error::{Error, Outcome};
use crate::node::{Cont, Node, Register};
use crate::stack::CallStack;
use crate::value::{erase, BoxValue};

/// Final continuation of one evaluation.
pub(crate) type Done = Box<dyn FnOnce(Outcome<BoxValue>) + Send>;

/// Run `f`, converting a panic into a declared failure.
pub(crate) fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, Error> {
    catch_unwind(AssertUnwindSafe(f)).map_err(Error::from_panic)
}

/// A description reduced to one of the three shapes the loop acts on.
enum Unwound {
    Pure(BoxValue),
    Bind(Box<Node>, Cont),
    Async(Register),
}

/// Reduce the head of a description: resolve `Suspend` and `Delay`, install
/// `Recover` rules, and surface `Fail` as an error for the caller's handler
/// stack. Rules installed here are composed with the pending bind
/// continuation `cont`, so a recovery produced later replaces the whole bind,
/// not just its source.
fn unwind(mut node: Node, stack: &mut CallStack, cont: Option<&Cont>) -> Result<Unwound, Error> {
    loop {
        // `Node` implements `Drop`, so its variants cannot be destructured by
        // move; fields are lifted out through `&mut` instead.
        let next = match &mut node {
            Node::Fail(error) => return Err(error.clone()),
            Node::Recover { rescue, .. } => {
                let rescue = Arc::clone(rescue);
                let composed = cont.map(Arc::clone);
                stack.add_rule(Box::new(move |error| {
                    rescue(error).map(|next| match &composed {
                        Some(cont) => next.bind(Arc::clone(cont)),
                        None => next,
                    })
                }));
                match node.detach_source() {
                    Some(source) => *source,
                    None => unreachable!("recover node has a source"),
                }
            }
            Node::Suspend(resume) => {
                let resume = Arc::clone(resume);
                guarded(|| resume())?
            }
            Node::Delay(thunk) => {
                let thunk = Arc::clone(thunk);
                return Ok(Unwound::Pure(guarded(|| thunk())??));
            }
            Node::Pure(value) => {
                return Ok(Unwound::Pure(std::mem::replace(value, erase(()))))
            }
            Node::Bind { cont, .. } => {
                let cont = Arc::clone(cont);
                match node.detach_source() {
                    Some(source) => return Ok(Unwound::Bind(source, cont)),
                    None => unreachable!("bind node has a source"),
                }
            }
            Node::Async { register } => return Ok(Unwound::Async(Arc::clone(register))),
        };
        node = next;
    }
}

enum Step {
    Continue(Node),
    Finished(BoxValue),
    Suspend(Register, Option<Cont>),
}

/// One iteration of the loop: unwind the head and, for a bind, its source.
fn step(node: Node, stack: &mut CallStack) -> Result<Step, Error> {
    match unwind(node, stack, None)? {
        Unwound::Pure(value) => Ok(Step::Finished(value)),
        Unwound::Async(register) => Ok(Step::Suspend(register, None)),
        Unwound::Bind(source, cont) => {
            stack.push();
            match unwind(*source, stack, Some(&cont))? {
                Unwound::Pure(value) => {
                    // The source's scope has closed; discard it before the
                    // continuation runs.
                    stack.pull();
                    Ok(Step::Continue(guarded(|| cont(value))?))
                }
                Unwound::Bind(inner_source, inner_cont) => {
                    // Left-association rewrite; this is the flattening that
                    // keeps the loop iterative.
                    let outer = cont;
                    let rebound: Cont = Arc::new(move |value| {
                        inner_cont(value).bind(Arc::clone(&outer))
                    });
                    Ok(Step::Continue(Node::Bind {
                        source: inner_source,
                        cont: rebound,
                    }))
                }
                Unwound::Async(register) => Ok(Step::Suspend(register, Some(cont))),
            }
        }
    }
}

/// Drive a description to completion or to its next async suspension.
///
/// Synchronous prefixes run entirely on the calling thread; at an `Async`
/// node the loop parks itself in the boundary's callback and returns.
pub(crate) fn run_loop(node: Node, stack: CallStack, token: Arc<CancelToken>, done: Done) {
    let mut node = node;
    let mut stack = stack;
    loop {
        match step(node, &mut stack) {
            Ok(Step::Continue(next)) => node = next,
            Ok(Step::Finished(value)) => return done(Outcome::Success(value)),
            Ok(Step::Suspend(register, cont)) => {
                return suspend(register, cont, stack, token, done)
            }
            Err(error) => match stack.try_handle(&error) {
                Some(next) => node = next,
                None => return done(Outcome::Failure(error)),
            },
        }
    }
}

/// Park the loop in an async boundary's completion callback.
fn suspend(
    register: Register,
    cont: Option<Cont>,
    mut stack: CallStack,
    token: Arc<CancelToken>,
    done: Done,
) {
    tracing::trace!("suspending at async boundary");
    let resume_token = Arc::clone(&token);
    crate::bridge::execute(
        register,
        &token,
        Box::new(move |outcome| match outcome {
            Outcome::Success(value) => {
                let next = match cont {
                    Some(cont) => {
                        stack.pull();
                        match guarded(|| cont(value)) {
                            Ok(next) => next,
                            Err(error) => match stack.try_handle(&error) {
                                Some(next) => next,
                                None => return done(Outcome::Failure(error)),
                            },
                        }
                    }
                    None => Node::Pure(value),
                };
                run_loop(next, stack, resume_token, done);
            }
            Outcome::Failure(error) => match stack.try_handle(&error) {
                Some(next) => run_loop(next, stack, resume_token, done),
                None => done(Outcome::Failure(error)),
            },
            Outcome::Canceled => done(Outcome::Canceled),
        }),
    );
}

/// Evaluate a description for its effects only, discarding the outcome.
/// Used for cancel actions, which must not be cancellable themselves.
pub(crate) fn fire_and_forget(node: Node) {
    run_loop(
        node,
        CallStack::new(),
        CancelToken::detached(),
        Box::new(|_| {}),
    );
}

/// Entry point: evaluate under a fresh recovery stack, delivering the
/// outcome to `done`.
pub(crate) fn evaluate(node: Node, token: Arc<CancelToken>, done: Done) {
    run_loop(node, CallStack::new(), token, done);
}
