use thiserror::Error;
use uuid::Uuid;

/// Misconfiguration detected before the ingestion loop starts.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid interval {0:?}: expected a positive duration such as 30s, 1m or 1h30m")]
    InvalidInterval(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("fetching {url} timed out")]
    Timeout { url: String },

    #[error("fetching {url} was cancelled")]
    Cancelled { url: String },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("document has no <channel> element")]
    MissingChannel,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-key conflict. For posts this means the link was already ingested.
    #[error("a record for {url} already exists")]
    Duplicate { url: String },

    #[error("feed {0} not found")]
    FeedNotFound(Uuid),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failure of a single scheduler tick. Logged by the loop, never fatal.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("could not parse {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: ParseError,
    },
}
