//! The manually threaded call/recovery stack.
//!
//! Recovery rules have lexical scope: a rule installed by a `Recover` node is
//! active for exactly the bind chain it was installed under, not globally.
//! The interpreter cannot use the native call stack to express this (it never
//! recurses for sequencing), so scope is tracked here explicitly.
//!
//! Each frame counts the "transparent" bind layers passed through since the
//! frame was pushed and holds the rules contributed at that nesting depth.
//! Handling walks frames innermost-out and rules most-recently-added-first;
//! rules are consumed when tried, and exhausted frames are discarded.

use crate::error::Error;
use crate::node::Node;

/// A recovery rule: partial function from a failure to the next description.
/// Consumed when tried.
pub(crate) type Rule = Box<dyn FnOnce(&Error) -> Option<Node> + Send>;

#[derive(Default)]
struct Frame {
    /// Transparent bind layers entered while this frame was on top.
    bind_count: usize,
    /// Rules contributed at this depth, most recent last.
    rules: Vec<Rule>,
}

/// Per-evaluation recovery state. Never shared across concurrent
/// evaluations; each `race`/`seq` branch gets its own.
pub(crate) struct CallStack {
    frames: Vec<Frame>,
}

impl CallStack {
    pub(crate) fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    fn top(&mut self) -> &mut Frame {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
        }
        self.frames
            .last_mut()
            .unwrap_or_else(|| unreachable!("call stack keeps a base frame"))
    }

    /// Enter a transparent bind layer.
    pub(crate) fn push(&mut self) {
        self.top().bind_count += 1;
    }

    /// Leave a bind layer: decrement the count or, at zero, discard the
    /// current frame (its scope has closed) and resume the parent.
    pub(crate) fn pull(&mut self) {
        let top = self.top();
        if top.bind_count > 0 {
            top.bind_count -= 1;
        } else {
            self.frames.pop();
        }
    }

    /// Install a recovery rule.
    ///
    /// If bind layers are outstanding, the rule starts a new frame nested
    /// under the current one, so its scope does not leak into binds that
    /// preceded it.
    pub(crate) fn add_rule(&mut self, rule: Rule) {
        if self.top().bind_count > 0 {
            self.top().bind_count -= 1;
            self.frames.push(Frame::default());
        }
        self.top().rules.push(rule);
    }

    /// Find a recovery for `error`, walking frames innermost-out.
    ///
    /// Every rule tried is consumed, and every frame exhausted along the way
    /// is discarded. Returns the first description produced by a matching
    /// rule, or `None` when the error must propagate to the caller.
    pub(crate) fn try_handle(&mut self, error: &Error) -> Option<Node> {
        while let Some(frame) = self.frames.last_mut() {
            frame.bind_count = 0;

            let mut matched = None;
            while let Some(rule) = frame.rules.pop() {
                if let Some(next) = rule(error) {
                    matched = Some(next);
                    break;
                }
            }

            if self
                .frames
                .last()
                .is_some_and(|frame| frame.rules.is_empty())
            {
                self.frames.pop();
            }

            if matched.is_some() {
                return matched;
            }
        }
        None
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        self.frames.len()
    }
}
