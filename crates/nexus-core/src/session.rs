use std::sync::Arc;

use crate::error::{InvariantViolation, Result};
use crate::turn::{ChatTurn, Role};

/// Ordered log of the turns in one conversation.
///
/// Turns are held behind `Arc` and never mutated in place: replacing the
/// in-flight turn swaps in a new `Arc`, so a cloned session keeps seeing
/// exactly the turns it was cloned with. Cloning is cheap (one refcount
/// bump per turn), which is what lets the controller publish a fresh
/// snapshot after every stream event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSession {
    turns: Vec<Arc<ChatTurn>>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session holding only the assistant greeting.
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            turns: vec![Arc::new(ChatTurn::assistant(greeting))],
        }
    }

    pub fn append(&mut self, turn: ChatTurn) {
        self.turns.push(Arc::new(turn));
    }

    /// Swap the trailing assistant turn for a newer snapshot of it.
    pub fn replace_last(&mut self, turn: Arc<ChatTurn>) -> Result<()> {
        let Some(last) = self.turns.last_mut() else {
            return Err(InvariantViolation::new("replace_last", "session is empty").into());
        };
        if last.role != Role::Assistant {
            return Err(InvariantViolation::new(
                "replace_last",
                format!("last turn is a {} turn", last.role),
            )
            .into());
        }
        if turn.role != Role::Assistant {
            return Err(InvariantViolation::new(
                "replace_last",
                format!("replacement is a {} turn", turn.role),
            )
            .into());
        }
        *last = turn;
        Ok(())
    }

    /// Replace the whole log, e.g. with persisted history.
    pub fn load_from(&mut self, turns: Vec<ChatTurn>) {
        self.turns = turns.into_iter().map(Arc::new).collect();
    }

    pub fn reset(&mut self, greeting: impl Into<String>) {
        *self = Self::with_greeting(greeting);
    }

    pub fn turns(&self) -> &[Arc<ChatTurn>] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Arc<ChatTurn>> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// True once the user has said anything. Sessions without a user turn
    /// are never persisted.
    pub fn has_conversation(&self) -> bool {
        self.turns.iter().any(|t| t.role == Role::User)
    }

    /// Owned copy of every turn, in order, for persistence.
    pub fn to_turns(&self) -> Vec<ChatTurn> {
        self.turns.iter().map(|t| t.as_ref().clone()).collect()
    }
}
