use thiserror::Error;

/// Failure of the transport underneath a request or chat stream.
///
/// The only error kind that crosses the client boundary. Malformed lines and
/// unrecognised frames are absorbed by the decoder and classifier, and an
/// `error` frame from the server is folded into the turn as its text.
#[derive(Error, Debug)]
pub enum TransportError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response body aborted: {0}")]
    Aborted(String),
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),
}
