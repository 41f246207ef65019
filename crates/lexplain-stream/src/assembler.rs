//! Folds classified events into one assistant turn.
//!
//! ```text
//!            Token
//!           ┌─────┐
//!           ▼     │
//!         Open ───┘
//!           │ search_results ──▶ Settled(SearchResults)
//!           │ explanation ─────▶ Settled(Explanation)
//!           │ error ───────────▶ Settled(Error)
//!           │ close() ─────────▶ Settled(None)
//! ```
//!
//! No transition leaves a settled state. The assembler owns the only mutable
//! copy of the turn; observers receive snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use lexplain_core::{ArticleDetail, SearchResult};
use tracing::debug;

use crate::event::Event;

/// Identifies one turn. Issued by the orchestrator when a turn starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(u64);

impl TurnId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn-{}", self.0)
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettledKind {
    /// The stream ended without a terminal frame; accumulated tokens stand.
    None,
    SearchResults,
    Explanation,
    Error,
}

impl SettledKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SearchResults => "search_results",
            Self::Explanation => "explanation",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    Open,
    Settled(SettledKind),
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Settled(kind) => write!(f, "settled:{}", kind.as_str()),
        }
    }
}

/// Structured payload attached at settlement.
#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    SearchResults(Vec<SearchResult>),
    Article(Box<ArticleDetail>),
}

/// Immutable view of a turn at one point in its life.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSnapshot {
    pub id: TurnId,
    pub text: String,
    pub state: TurnState,
    pub attachment: Option<Attachment>,
    pub started_at: DateTime<Utc>,
}

impl TurnSnapshot {
    /// A fresh, empty, open turn.
    pub fn new(id: TurnId) -> Self {
        Self {
            id,
            text: String::new(),
            state: TurnState::Open,
            attachment: None,
            started_at: Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == TurnState::Open
    }

    /// `SettledKind::None` while open as well as after a plain close.
    pub fn settled_kind(&self) -> SettledKind {
        match self.state {
            TurnState::Open => SettledKind::None,
            TurnState::Settled(kind) => kind,
        }
    }

    pub fn search_results(&self) -> Option<&[SearchResult]> {
        match &self.attachment {
            Some(Attachment::SearchResults(results)) => Some(results),
            _ => None,
        }
    }

    pub fn article(&self) -> Option<&ArticleDetail> {
        match &self.attachment {
            Some(Attachment::Article(article)) => Some(article),
            _ => None,
        }
    }
}

/// Whether an event or close changed the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Ignored,
}

impl Applied {
    pub fn is_changed(self) -> bool {
        self == Self::Changed
    }
}

/// Per-turn state machine.
#[derive(Debug, Clone)]
pub struct MessageAssembler {
    turn: TurnSnapshot,
}

impl MessageAssembler {
    pub fn new(id: TurnId) -> Self {
        Self {
            turn: TurnSnapshot::new(id),
        }
    }

    pub fn snapshot(&self) -> &TurnSnapshot {
        &self.turn
    }

    pub fn into_snapshot(self) -> TurnSnapshot {
        self.turn
    }

    pub fn is_open(&self) -> bool {
        self.turn.is_open()
    }

    /// Fold one event into the turn.
    pub fn apply(&mut self, event: Event) -> Applied {
        if !self.turn.is_open() {
            debug!(turn = %self.turn.id, kind = event.kind(), "turn settled; dropping event");
            return Applied::Ignored;
        }

        match event {
            Event::Token { text } => {
                self.turn.text.push_str(&text);
                Applied::Changed
            }
            Event::SearchResults { summary, results } => self.settle(
                SettledKind::SearchResults,
                summary,
                Some(Attachment::SearchResults(results)),
            ),
            Event::Explanation { summary, article } => self.settle(
                SettledKind::Explanation,
                summary,
                Some(Attachment::Article(article)),
            ),
            // Partial tokens are replaced, not prefixed.
            Event::Error { message } => self.settle(SettledKind::Error, message, None),
            Event::Sources { .. } | Event::Passthrough { .. } => Applied::Ignored,
        }
    }

    /// The stream ended. An open turn settles as `None`, keeping its text.
    pub fn close(&mut self) -> Applied {
        if !self.turn.is_open() {
            return Applied::Ignored;
        }
        self.turn.state = TurnState::Settled(SettledKind::None);
        Applied::Changed
    }

    fn settle(
        &mut self,
        kind: SettledKind,
        text: String,
        attachment: Option<Attachment>,
    ) -> Applied {
        self.turn.text = text;
        self.turn.attachment = attachment;
        self.turn.state = TurnState::Settled(kind);
        Applied::Changed
    }
}
