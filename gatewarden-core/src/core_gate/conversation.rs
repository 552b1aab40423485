//! Per-chat conversation state
//!
//! A chat is either idle or waiting for the user's support text. Modelled
//! as an explicit tagged state instead of an ad-hoc flag so transitions are
//! only possible through the methods below.

use super::types::UserId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingSupportText,
}

/// Tracks conversation mode per chat. Chats are keyed by the same identity
/// type as users since the gate only ever talks to direct chats.
#[derive(Debug, Default)]
pub struct Conversations {
    states: HashMap<UserId, ConversationState>,
}

impl Conversations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, chat: UserId) -> ConversationState {
        self.states.get(&chat).copied().unwrap_or_default()
    }

    /// Enter support mode; the next free-text message is treated as the
    /// support request body.
    pub fn await_support_text(&mut self, chat: UserId) {
        self.states.insert(chat, ConversationState::AwaitingSupportText);
    }

    /// Reset the chat to idle. Returns `true` if an interaction was active.
    pub fn clear(&mut self, chat: UserId) -> bool {
        self.states.remove(&chat).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        let convs = Conversations::new();
        assert_eq!(convs.state(UserId::new(1)), ConversationState::Idle);
    }

    #[test]
    fn test_support_transition_and_clear() {
        let mut convs = Conversations::new();
        convs.await_support_text(UserId::new(1));
        assert_eq!(
            convs.state(UserId::new(1)),
            ConversationState::AwaitingSupportText
        );

        assert!(convs.clear(UserId::new(1)));
        assert_eq!(convs.state(UserId::new(1)), ConversationState::Idle);

        // Clearing an idle chat reports no active interaction.
        assert!(!convs.clear(UserId::new(1)));
    }
}
