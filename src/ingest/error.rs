use thiserror::Error;

/// Why a fetcher produced no usable records. Logged and folded into
/// `FetchResult`; never returned past the fetcher boundary.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no records: {0}")]
    Empty(String),
}

impl FetchError {
    /// Stable label for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidInput(_) => "invalid_input",
            FetchError::Network(_) => "network",
            FetchError::HttpStatus { .. } => "http_status",
            FetchError::Malformed(_) => "malformed",
            FetchError::Empty(_) => "empty",
        }
    }

    /// Empty result sets are not failures of the request itself.
    pub fn is_failure(&self) -> bool {
        !matches!(self, FetchError::Empty(_) | FetchError::InvalidInput(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Malformed(err.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("field `{field}` has unexpected type (expected {expected})")]
    UnexpectedType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("record has no identifier")]
    MissingId,
}
