//! Sequential article view: the article first, then its explanation.

use async_trait::async_trait;
use lexplain_core::{ArticleDetail, Explanation, Graph, graph};
use tracing::{info, warn};

use crate::error::TransportError;

/// Shown in place of the explanation when it could not be fetched.
pub const EXPLANATION_UNAVAILABLE: &str = "Failed to load explanation.";

/// Read-side article endpoints.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn article(&self, id: &str) -> Result<ArticleDetail, TransportError>;
    async fn explain(&self, id: &str) -> Result<Explanation, TransportError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArticleView {
    pub article: ArticleDetail,
    pub graph: Graph,
    /// `None` if the explanation request failed.
    pub explanation: Option<Explanation>,
}

impl ArticleView {
    pub fn explanation_text(&self) -> &str {
        self.explanation
            .as_ref()
            .map_or(EXPLANATION_UNAVAILABLE, |e| e.explanation.as_str())
    }
}

/// Fetch article `id`, hand it and its graph to `on_article`, then fetch the
/// explanation. The two requests are never issued concurrently.
pub async fn load_article_view<S, F>(
    source: &S,
    id: &str,
    on_article: F,
) -> Result<ArticleView, TransportError>
where
    S: ArticleSource + ?Sized,
    F: FnOnce(&ArticleDetail, &Graph),
{
    let article = source.article(id).await?;
    let graph = graph::build(&article);
    info!(
        article = %article.id,
        nodes = graph.nodes().len(),
        edges = graph.edges().len(),
        "article loaded"
    );
    on_article(&article, &graph);

    let explanation = match source.explain(id).await {
        Ok(explanation) => Some(explanation),
        Err(error) => {
            warn!(article = %id, error = %error, "explanation unavailable");
            None
        }
    };

    Ok(ArticleView {
        article,
        graph,
        explanation,
    })
}
