//! Chat stream client: NDJSON frame decoding, event classification, turn
//! assembly and orchestration, plus the REST client behind the `http` feature.

pub mod article_view;
pub mod assembler;
pub mod cancel;
pub mod conversation;
pub mod decoder;
pub mod error;
pub mod event;
#[cfg(feature = "http")]
pub mod http;
pub mod orchestrator;

pub use article_view::{ArticleSource, ArticleView, EXPLANATION_UNAVAILABLE, load_article_view};
pub use assembler::{
    Applied, Attachment, MessageAssembler, SettledKind, TurnId, TurnSnapshot, TurnState,
};
pub use cancel::{CancellationToken, TurnHandle};
pub use conversation::{
    Conversation, ConversationError, FAILURE_MESSAGE, GREETING, Message, MessageBody, Role,
};
pub use decoder::{DecodeError, DecoderStats, Frame, FrameDecoder, TailPolicy};
pub use error::TransportError;
pub use event::{ClassifyIssue, Event, classify, try_classify};
#[cfg(feature = "http")]
pub use http::{ApiClient, DEFAULT_BASE_URL};
pub use orchestrator::{
    Callbacks, ChatTransport, ChunkStream, PendingTurn, StreamOrchestrator, TurnObserver,
    TurnOutcome,
};
