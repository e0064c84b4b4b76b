//! Conversation history trimming.

use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::message::{Message, MessageKind};

/// Counts the tokens of a list of messages.
pub type TokenCounter = Arc<dyn Fn(&[Message]) -> usize + Send + Sync>;

/// Which end of the history to keep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TrimStrategy {
    /// Keep the most recent messages.
    #[default]
    Last,
    /// Keep the oldest messages.
    First,
}

/// Caps the history sent to the model.
///
/// The default trimmer keeps at most 10 messages (each message counts as
/// one token), keeps a leading system message, and makes sure the kept
/// history starts with a user message so that no tool result is sent without
/// the call that requested it.
///
/// Messages are never split.
#[derive(Clone)]
pub struct Trimmer {
    max_tokens: usize,
    strategy: TrimStrategy,
    token_counter: TokenCounter,
    include_system: bool,
    start_on: Option<MessageKind>,
    end_on: Option<MessageKind>,
}

impl Default for Trimmer {
    fn default() -> Self {
        Self {
            max_tokens: 10,
            strategy: TrimStrategy::Last,
            token_counter: Arc::new(count_messages),
            include_system: true,
            start_on: Some(MessageKind::Human),
            end_on: None,
        }
    }
}

impl Debug for Trimmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trimmer")
            .field("max_tokens", &self.max_tokens)
            .field("strategy", &self.strategy)
            .field("include_system", &self.include_system)
            .field("start_on", &self.start_on)
            .field("end_on", &self.end_on)
            .finish_non_exhaustive()
    }
}

/// A token counter that counts every message as one token.
#[inline]
pub fn count_messages(messages: &[Message]) -> usize {
    messages.len()
}

impl Trimmer {
    /// Creates a trimmer with the given budget and the default policy.
    #[inline]
    pub fn with_max_tokens(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            ..Default::default()
        }
    }

    /// Sets which end of the history to keep.
    #[inline]
    pub fn with_strategy(mut self, strategy: TrimStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the function used to measure messages against the budget.
    #[inline]
    pub fn with_token_counter(
        mut self,
        counter: impl Fn(&[Message]) -> usize + Send + Sync + 'static,
    ) -> Self {
        self.token_counter = Arc::new(counter);
        self
    }

    /// Sets whether a leading system message is always kept. Only applies to
    /// [`TrimStrategy::Last`].
    #[inline]
    pub fn with_include_system(mut self, include_system: bool) -> Self {
        self.include_system = include_system;
        self
    }

    /// Sets the kind of message the kept history must start with. Only
    /// applies to [`TrimStrategy::Last`].
    #[inline]
    pub fn with_start_on(mut self, kind: Option<MessageKind>) -> Self {
        self.start_on = kind;
        self
    }

    /// Sets the kind of message the kept history must end with.
    #[inline]
    pub fn with_end_on(mut self, kind: Option<MessageKind>) -> Self {
        self.end_on = kind;
        self
    }

    /// Returns the messages to send to the model.
    pub fn trim(&self, messages: &[Message]) -> Vec<Message> {
        match self.strategy {
            TrimStrategy::First => {
                self.first(messages, self.max_tokens).to_vec()
            }
            TrimStrategy::Last => self.last(messages),
        }
    }

    fn first<'a>(
        &self,
        messages: &'a [Message],
        max_tokens: usize,
    ) -> &'a [Message] {
        let mut len =
            self.longest_fitting(None, messages, max_tokens, false);
        if let Some(end_on) = self.end_on {
            while len > 0 && messages[len - 1].kind() != end_on {
                len -= 1;
            }
        }
        &messages[..len]
    }

    fn last(&self, messages: &[Message]) -> Vec<Message> {
        let mut messages = messages;
        if let Some(end_on) = self.end_on {
            while let Some((last, init)) = messages.split_last() {
                if last.kind() == end_on {
                    break;
                }
                messages = init;
            }
        }

        let (system, rest) = match messages.split_first() {
            Some((first, rest))
                if self.include_system
                    && first.kind() == MessageKind::System =>
            {
                (Some(first), rest)
            }
            _ => (None, messages),
        };
        if system.is_some() && self.cost(system, &[]) > self.max_tokens {
            return vec![];
        }

        let len = self.longest_fitting(system, rest, self.max_tokens, true);
        let mut kept = &rest[rest.len() - len..];
        if let Some(start_on) = self.start_on {
            while let Some((first, tail)) = kept.split_first() {
                if first.kind() == start_on {
                    break;
                }
                kept = tail;
            }
        }

        system.into_iter().chain(kept).cloned().collect()
    }

    /// Counts `window`, preceded by `head` if any, in a single counter call.
    fn cost(&self, head: Option<&Message>, window: &[Message]) -> usize {
        match head {
            Some(head) => {
                let mut all = Vec::with_capacity(window.len() + 1);
                all.push(head.clone());
                all.extend_from_slice(window);
                (self.token_counter)(&all)
            }
            None => (self.token_counter)(window),
        }
    }

    /// Returns the length of the longest prefix (or suffix, if `from_end`)
    /// of `messages` that fits the budget together with `head`. Token counts
    /// are assumed to grow with the window size.
    fn longest_fitting(
        &self,
        head: Option<&Message>,
        messages: &[Message],
        budget: usize,
        from_end: bool,
    ) -> usize {
        let total = messages.len();
        let fits = |n: usize| {
            let window = if from_end {
                &messages[total - n..]
            } else {
                &messages[..n]
            };
            self.cost(head, window) <= budget
        };
        if fits(total) {
            return total;
        }
        // Binary search for the boundary, `lo` always fits.
        let (mut lo, mut hi) = (0, total);
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if fits(mid) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }
}
