//! HTTP client for the knowledge-base REST endpoints and the chat stream.

use async_trait::async_trait;
use futures::StreamExt;
use lexplain_core::{ArticleDetail, ChatRequest, Explanation, SearchResponse, SearchResult};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::article_view::ArticleSource;
use crate::error::TransportError;
use crate::orchestrator::{ChatTransport, ChunkStream};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Client for the backend's `/search`, `/articles`, `/explain` and `/chat`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ApiClient {
    /// Create a client for the given API base URL, e.g. `http://localhost:8000/api`.
    /// A trailing slash is ignored.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `base_url` with `segments` appended, each percent-encoded as one path
    /// segment so ids cannot escape their endpoint.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, TransportError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Ranked articles matching `query`, in server order.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, TransportError> {
        let url = self.endpoint(&["search"])?;
        info!(url = %url, query = %query, "searching articles");
        let resp = self.client.get(url).query(&[("q", query)]).send().await?;
        let body: SearchResponse = read_json(resp).await?;
        info!(count = body.results.len(), "search complete");
        Ok(body.results)
    }

    pub async fn article(&self, id: &str) -> Result<ArticleDetail, TransportError> {
        let url = self.endpoint(&["articles", id])?;
        info!(url = %url, "fetching article");
        let resp = self.client.get(url).send().await?;
        read_json(resp).await
    }

    pub async fn explain(&self, id: &str) -> Result<Explanation, TransportError> {
        let url = self.endpoint(&["explain", id])?;
        info!(url = %url, "fetching explanation");
        let resp = self.client.get(url).send().await?;
        read_json(resp).await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TransportError::Server {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, TransportError> {
    let bytes = check_status(resp).await?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl ChatTransport for ApiClient {
    async fn open_chat(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError> {
        let url = self.endpoint(&["chat"])?;
        info!(url = %url, model = %request.model, "posting chat request");
        let resp = self.client.post(url).json(request).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(TransportError::from))
            .boxed())
    }
}

#[async_trait]
impl ArticleSource for ApiClient {
    async fn article(&self, id: &str) -> Result<ArticleDetail, TransportError> {
        ApiClient::article(self, id).await
    }

    async fn explain(&self, id: &str) -> Result<Explanation, TransportError> {
        ApiClient::explain(self, id).await
    }
}

#[cfg(test)]
mod tests {
    use lexplain_core::ModelSelector;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::article_view::load_article_view;
    use crate::assembler::SettledKind;
    use crate::orchestrator::StreamOrchestrator;

    /// Accept one connection, reply with `response` verbatim, and hand back
    /// the raw request text.
    async fn serve_once(response: Vec<u8>) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/api", listener.local_addr().unwrap());
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(&response).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });
        (base, task)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
        String::from_utf8(buf).unwrap()
    }

    fn json_response(status: &str, body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    fn chunked_response(chunks: &[&str]) -> Vec<u8> {
        let mut out = String::from(
            "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        );
        for chunk in chunks {
            out.push_str(&format!("{:x}\r\n{chunk}\r\n", chunk.len()));
        }
        out.push_str("0\r\n\r\n");
        out.into_bytes()
    }

    #[test]
    fn api_client_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:8000/api/");
        assert_eq!(client.base_url(), "http://localhost:8000/api");
        assert_eq!(ApiClient::default().base_url(), DEFAULT_BASE_URL);
    }

    #[tokio::test]
    async fn search_sends_query_and_keeps_order() {
        let (base, server) = serve_once(json_response(
            "200 OK",
            r#"{"results":[
                {"id":"a17","article_number":17,"title":"Right to erasure","text_snippet":"...","score":0.92},
                {"id":"a5","article_number":5,"title":"Principles","text_snippet":"...","score":0.41}
            ]}"#,
        ))
        .await;

        let results = ApiClient::new(base).search("right to be forgotten").await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/search?q=right+to+be+forgotten "));
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a17", "a5"]);
    }

    #[tokio::test]
    async fn article_fetch_decodes_sparse_record() {
        let (base, server) = serve_once(json_response(
            "200 OK",
            r#"{"id":"art-4","number":4,"title":"Definitions","terms":[{"term":"personal data","definition":"any information..."}]}"#,
        ))
        .await;

        let article = ApiClient::new(base).article("art-4").await.unwrap();

        assert!(server.await.unwrap().starts_with("GET /api/articles/art-4 "));
        assert_eq!(article.terms.len(), 1);
        assert!(article.obligations.is_empty());
    }

    #[tokio::test]
    async fn article_id_is_escaped_as_one_path_segment() {
        let (base, server) = serve_once(json_response(
            "200 OK",
            r#"{"id":"art 4/x?y","number":4,"title":"Definitions"}"#,
        ))
        .await;

        let article = ApiClient::new(base).article("art 4/x?y").await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/articles/art%204%2Fx%3Fy "), "{request}");
        assert_eq!(article.number, 4);
    }

    #[test]
    fn endpoint_appends_segments_to_base_path() {
        let client = ApiClient::new("http://localhost:8000/api/");
        let url = client.endpoint(&["explain", "art-6"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/explain/art-6");
        assert!(matches!(
            ApiClient::new("not a url").endpoint(&["chat"]),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn non_success_status_carries_body() {
        let (base, _server) =
            serve_once(json_response("404 Not Found", r#"{"detail":"Article not found"}"#)).await;

        let err = ApiClient::new(base).explain("art-999").await.unwrap_err();

        let TransportError::Server { status, body } = err else {
            panic!("expected server error, got {err:?}");
        };
        assert_eq!(status, 404);
        assert!(body.contains("Article not found"));
    }

    #[tokio::test]
    async fn malformed_body_is_a_json_error() {
        let (base, _server) = serve_once(json_response("200 OK", "not json")).await;
        let err = ApiClient::new(base).article("art-1").await.unwrap_err();
        assert!(matches!(err, TransportError::Json(_)));
    }

    #[tokio::test]
    async fn chat_posts_request_and_streams_chunks() {
        let (base, server) = serve_once(chunked_response(&[
            "{\"type\":\"token\",\"content\":\"Art. 6 \"}\n{\"type\":\"to",
            "ken\",\"content\":\"needs a lawful basis.\"}\n",
        ]))
        .await;
        let orchestrator = StreamOrchestrator::new(ApiClient::new(base));

        let turn = orchestrator
            .ask(ChatRequest::new("Explain Article 6", ModelSelector::Gemini))
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/chat "));
        assert!(request.ends_with(r#"{"query":"Explain Article 6","model":"gemini"}"#));
        assert_eq!(turn.text, "Art. 6 needs a lawful basis.");
        assert_eq!(turn.settled_kind(), SettledKind::None);
    }

    #[tokio::test]
    async fn chat_error_status_fails_before_streaming() {
        let (base, _server) = serve_once(json_response("500 Internal Server Error", "{}")).await;
        let orchestrator = StreamOrchestrator::new(ApiClient::new(base));

        let err = orchestrator
            .ask(ChatRequest::new("q", ModelSelector::OpenAi))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Server { status: 500, .. }));
    }

    #[tokio::test]
    async fn article_view_survives_missing_explanation() {
        // Each request gets its own connection; serve the article, then fail.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/api", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let replies = [
                json_response(
                    "200 OK",
                    r#"{"id":"art-6","number":6,"title":"Lawfulness of processing"}"#,
                ),
                json_response("503 Service Unavailable", "LLM offline"),
            ];
            let mut paths = Vec::new();
            for reply in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                paths.push(request.split_whitespace().nth(1).unwrap_or_default().to_string());
                socket.write_all(&reply).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            paths
        });

        let view = load_article_view(&ApiClient::new(base), "art-6", |_, _| {})
            .await
            .unwrap();

        assert_eq!(server.await.unwrap(), ["/api/articles/art-6", "/api/explain/art-6"]);
        assert_eq!(view.article.number, 6);
        assert!(view.explanation.is_none());
    }
}
