use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Token cannot be sent as an Authorization header")]
    InvalidToken(#[source] reqwest::header::InvalidHeaderValue),

    #[error("Unsupported HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid response from {url}: {detail}")]
    InvalidResponse { url: String, detail: String },
}

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// A successful response whose body was not valid JSON.
    pub fn undecodable(url: &str, body: &str, err: &serde_json::Error) -> Self {
        ApiError::InvalidResponse {
            url: url.to_string(),
            detail: format!("{}: {}", err, Self::truncate_body(body)),
        }
    }

    /// True when the request never produced an HTTP response.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}
