//! Caller-side conversation state.
//!
//! Messages are addressed by [`TurnId`], never by position, and only the
//! active turn may be updated. Progress arriving for a superseded turn is
//! rejected, so an abandoned stream cannot overwrite a newer answer.

use tracing::debug;

use crate::assembler::{SettledKind, TurnId, TurnSnapshot, TurnState};
use crate::error::TransportError;
use crate::orchestrator::TurnObserver;

pub const GREETING: &str =
    "Hello! I am your GDPR Assistant. Ask me anything about the regulation.";
pub const FAILURE_MESSAGE: &str = "Sorry, I encountered an error.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text(String),
    Turn(TurnSnapshot),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub body: MessageBody,
}

impl Message {
    fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            body: MessageBody::Text(text.into()),
        }
    }

    fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            body: MessageBody::Text(text.into()),
        }
    }

    pub fn text(&self) -> &str {
        match &self.body {
            MessageBody::Text(text) => text,
            MessageBody::Turn(turn) => &turn.text,
        }
    }

    pub fn turn(&self) -> Option<&TurnSnapshot> {
        match &self.body {
            MessageBody::Turn(turn) => Some(turn),
            MessageBody::Text(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("{0} is still streaming")]
    Busy(TurnId),
    #[error("query is empty")]
    EmptyQuery,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    active: Option<TurnId>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: vec![Message::assistant(GREETING)],
            active: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn active(&self) -> Option<TurnId> {
        self.active
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Record the user's query and an empty open answer for turn `id`.
    pub fn begin(&mut self, id: TurnId, query: &str) -> Result<(), ConversationError> {
        if let Some(active) = self.active {
            return Err(ConversationError::Busy(active));
        }
        let query = query.trim();
        if query.is_empty() {
            return Err(ConversationError::EmptyQuery);
        }
        self.messages.push(Message::user(query));
        self.messages.push(Message {
            role: Role::Assistant,
            body: MessageBody::Turn(TurnSnapshot::new(id)),
        });
        self.active = Some(id);
        Ok(())
    }

    /// Replace the stored answer for `turn.id`. Returns false if that turn is
    /// not the active one.
    pub fn apply_progress(&mut self, turn: &TurnSnapshot) -> bool {
        if self.active != Some(turn.id) {
            debug!(turn = %turn.id, active = ?self.active, "ignoring progress for inactive turn");
            return false;
        }
        match self.turn_mut(turn.id) {
            Some(slot) => {
                *slot = turn.clone();
                true
            }
            None => false,
        }
    }

    /// Transport failure: freeze the partial answer and append the failure notice.
    pub fn fail(&mut self, id: TurnId) -> bool {
        if !self.finish(id) {
            return false;
        }
        self.messages.push(Message::assistant(FAILURE_MESSAGE));
        true
    }

    /// Stream ended.
    pub fn complete(&mut self, id: TurnId) -> bool {
        self.finish(id)
    }

    /// Caller gave up on the turn; keep whatever arrived.
    pub fn abandon(&mut self, id: TurnId) -> bool {
        self.finish(id)
    }

    fn finish(&mut self, id: TurnId) -> bool {
        if self.active != Some(id) {
            return false;
        }
        self.active = None;
        if let Some(slot) = self.turn_mut(id)
            && slot.is_open()
        {
            slot.state = TurnState::Settled(SettledKind::None);
        }
        true
    }

    fn turn_mut(&mut self, id: TurnId) -> Option<&mut TurnSnapshot> {
        self.messages.iter_mut().rev().find_map(|m| match &mut m.body {
            MessageBody::Turn(turn) if turn.id == id => Some(turn),
            _ => None,
        })
    }
}

impl TurnObserver for Conversation {
    fn on_progress(&mut self, turn: &TurnSnapshot) {
        self.apply_progress(turn);
    }

    fn on_error(&mut self, turn: TurnId, error: TransportError) {
        debug!(turn = %turn, error = %error, "turn failed");
        self.fail(turn);
    }

    fn on_complete(&mut self, turn: TurnId) {
        self.complete(turn);
    }
}
