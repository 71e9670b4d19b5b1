use thiserror::Error;

/// Application-specific error types.
///
/// `Clone` so a failed taxonomy resolution can be handed to every caller
/// waiting on the same in-flight fetch.
#[derive(Debug, Clone, Error)]
pub enum ScreenError {
    /// A call to the risk API failed, possibly after retries.
    #[error("{}", render_request_error(.status, .message))]
    Request {
        /// HTTP status, when the upstream answered at all.
        status: Option<u16>,
        /// Reason phrase, response body or transport error text.
        message: String,
        /// Whether another attempt may succeed (network failure, 429, 5xx).
        retryable: bool,
    },
    /// The category taxonomy could not be resolved.
    #[error("Cannot proceed without categories from API: {0}")]
    Taxonomy(String),
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),
    /// The batch was cancelled before it completed.
    #[error("Screening cancelled")]
    Cancelled,
    /// Unreadable or malformed address input.
    #[error("Invalid input: {0}")]
    Input(String),
    /// Results could not be written.
    #[error("Output error: {0}")]
    Output(String),
}

fn render_request_error(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("{} {}", code, message),
        None => message.to_string(),
    }
}

impl ScreenError {
    /// Builds a request error from an HTTP status, classifying it as
    /// transient for 429 and any 5xx.
    pub fn from_status(status: reqwest::StatusCode, message: impl Into<String>) -> Self {
        ScreenError::Request {
            status: Some(status.as_u16()),
            message: message.into(),
            retryable: status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status.is_server_error(),
        }
    }

    /// Whether the retry policy should attempt the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScreenError::Request {
                retryable: true,
                ..
            }
        )
    }
}

impl From<reqwest::Error> for ScreenError {
    /// Transport failures (connect, timeout, broken body) are transient;
    /// decoding failures are not.
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ScreenError::Request {
                status: err.status().map(|s| s.as_u16()),
                message: format!("Malformed response: {}", err),
                retryable: false,
            };
        }
        if let Some(status) = err.status() {
            return ScreenError::from_status(status, err.to_string());
        }
        let message = if err.is_timeout() {
            format!("Request timed out: {}", err)
        } else {
            format!("Request failed: {}", err)
        };
        ScreenError::Request {
            status: None,
            message,
            retryable: true,
        }
    }
}

impl From<csv::Error> for ScreenError {
    fn from(err: csv::Error) -> Self {
        ScreenError::Input(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScreenError>;
