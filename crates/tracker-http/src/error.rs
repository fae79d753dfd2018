//! Error taxonomy for the HTTP client.

/// Shape of a request, logged on every retryable failure without ever
/// including the bearer token or body contents that might carry secrets.
#[derive(Debug, Clone)]
pub struct RequestShape {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
}

impl std::fmt::Display for RequestShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.query {
            Some(q) => write!(f, "{} {}?{}", self.method, self.path, q),
            None => write!(f, "{} {}", self.method, self.path),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    /// A request failed with a 429 or 5xx and exhausted its retry budget.
    #[error("request to {shape} failed after {attempts} attempts: HTTP {status}")]
    RetriesExhausted {
        shape: RequestShape,
        attempts: u32,
        status: u16,
    },

    /// A 4xx (other than 429) or a malformed payload — not retried.
    #[error("request to {shape} failed permanently: {detail}")]
    Permanent { shape: RequestShape, detail: String },

    /// Underlying transport failure (DNS, TLS, connection reset, etc).
    #[error("transport error calling {shape}: {source}")]
    Transport {
        shape: RequestShape,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {shape} timed out")]
    Timeout { shape: RequestShape },

    #[error("failed to decode response body from {shape}: {source}")]
    Decode {
        shape: RequestShape,
        #[source]
        source: serde_json::Error,
    },
}

impl HttpClientError {
    /// Whether the server response that produced this error was the known
    /// "shrink the page size" hint.
    pub fn is_scroll_504(&self) -> bool {
        matches!(self, HttpClientError::RetriesExhausted { status: 504, .. })
    }
}
