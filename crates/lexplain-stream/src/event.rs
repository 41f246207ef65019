//! Frame classification by the `type` discriminant.

use lexplain_core::{ArticleDetail, SearchResult};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::decoder::Frame;

/// Frame kinds the server is known to emit.
pub const KNOWN_KINDS: &[&str] = &["token", "search_results", "explanation", "sources", "error"];

/// A classified stream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Incremental answer text.
    Token { text: String },
    SearchResults {
        summary: String,
        results: Vec<SearchResult>,
    },
    Explanation {
        summary: String,
        article: Box<ArticleDetail>,
    },
    /// Recognised but not folded into any turn state.
    Sources { payload: Frame },
    /// Server-signalled failure; the stream itself completed normally.
    Error { message: String },
    /// Unknown kind, missing kind, or a known kind with the wrong shape.
    Passthrough { kind: Option<String> },
}

impl Event {
    pub fn kind(&self) -> &str {
        match self {
            Self::Token { .. } => "token",
            Self::SearchResults { .. } => "search_results",
            Self::Explanation { .. } => "explanation",
            Self::Sources { .. } => "sources",
            Self::Error { .. } => "error",
            Self::Passthrough { kind } => kind.as_deref().unwrap_or("<none>"),
        }
    }
}

/// Why a frame could not be classified as one of [`KNOWN_KINDS`].
#[derive(Error, Debug)]
pub enum ClassifyIssue {
    #[error("frame has no string `type` field")]
    MissingKind,
    #[error("unrecognised frame kind {0:?}")]
    UnknownKind(String),
    #[error("`{kind}` frame has the wrong shape: {source}")]
    Shape {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClassifyIssue {
    fn kind(&self) -> Option<String> {
        match self {
            Self::MissingKind => None,
            Self::UnknownKind(kind) | Self::Shape { kind, .. } => Some(kind.clone()),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireFrame {
    Token {
        content: String,
    },
    SearchResults {
        #[serde(default)]
        content: String,
        results: Vec<SearchResult>,
    },
    Explanation {
        #[serde(default)]
        content: String,
        related_data: ArticleDetail,
    },
    Sources(Frame),
    Error {
        #[serde(default)]
        content: String,
    },
}

impl From<WireFrame> for Event {
    fn from(frame: WireFrame) -> Self {
        match frame {
            WireFrame::Token { content } => Event::Token { text: content },
            WireFrame::SearchResults { content, results } => Event::SearchResults {
                summary: content,
                results,
            },
            WireFrame::Explanation {
                content,
                related_data,
            } => Event::Explanation {
                summary: content,
                article: Box::new(related_data),
            },
            WireFrame::Sources(payload) => Event::Sources { payload },
            WireFrame::Error { content } => Event::Error { message: content },
        }
    }
}

/// Classify strictly, reporting why a frame is not a known event.
pub fn try_classify(frame: Frame) -> Result<Event, ClassifyIssue> {
    let kind = match frame.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_string(),
        None => return Err(ClassifyIssue::MissingKind),
    };
    if !KNOWN_KINDS.contains(&kind.as_str()) {
        return Err(ClassifyIssue::UnknownKind(kind));
    }
    serde_json::from_value::<WireFrame>(Value::Object(frame))
        .map(Event::from)
        .map_err(|source| ClassifyIssue::Shape { kind, source })
}

/// Classify a frame. Never fails: anything unrecognised becomes
/// [`Event::Passthrough`], which the assembler ignores.
pub fn classify(frame: Frame) -> Event {
    match try_classify(frame) {
        Ok(event) => event,
        Err(issue @ ClassifyIssue::Shape { .. }) => {
            warn!(error = %issue, "ignoring malformed frame");
            Event::Passthrough { kind: issue.kind() }
        }
        Err(issue) => {
            debug!(error = %issue, "passing through unrecognised frame");
            Event::Passthrough { kind: issue.kind() }
        }
    }
}
