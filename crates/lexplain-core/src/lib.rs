//! Shared record types and the article graph builder for lexplain.

pub mod article;
pub mod chat;
pub mod graph;

pub use article::{
    ArticleDetail, ArticleRef, DefinedTerm, Explanation, Obligation, SearchResponse, SearchResult,
};
pub use chat::{ChatRequest, ModelParseError, ModelSelector};
pub use graph::{Edge, EdgeKind, Graph, Node, NodeKind};
