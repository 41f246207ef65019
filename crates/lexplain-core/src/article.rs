//! Regulation records exchanged with the lexplain backend.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One ranked hit from `GET /search` or a `search_results` stream frame.
///
/// Results arrive relevance-ordered; callers keep them in a `Vec` and never
/// re-sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub article_number: u32,
    pub title: String,
    pub text_snippet: String,
    pub score: f64,
}

/// A duty the article places on a role (e.g. "Data Controller").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    pub summary: String,
    pub role: String,
}

/// A term the article defines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinedTerm {
    pub term: String,
    pub definition: String,
}

/// A cross-reference to another article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRef {
    pub id: String,
    pub number: u32,
}

/// Full article record from `GET /articles/{id}`.
///
/// Owned by the backend; treated as an immutable value once fetched. List
/// fields default to empty so sparse records still decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDetail {
    pub id: String,
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub obligations: Vec<Obligation>,
    #[serde(default)]
    pub terms: Vec<DefinedTerm>,
    #[serde(default)]
    pub topics: BTreeSet<String>,
    #[serde(default)]
    pub references: Vec<ArticleRef>,
}

impl ArticleDetail {
    /// Heading in the form `Article 6: Lawfulness of processing`.
    pub fn heading(&self) -> String {
        format!("Article {}: {}", self.number, self.title)
    }
}

/// Generated plain-language explanation from `GET /explain/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub article_id: String,
    pub explanation: String,
    pub context: ArticleDetail,
}

/// Body of `GET /search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}
