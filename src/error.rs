use std::path::PathBuf;

use thiserror::Error;

/// Failures a relay invocation can hit. None of these are recovered
/// internally: each one is reported to the operator and terminates the
/// process with a nonzero status.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Network failure, timeout, or a response body that is not the
    /// expected JSON envelope.
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Well-formed envelope with `ok: false`.
    #[error("telegram api error: {0}")]
    Api(String),

    /// The notifier could not resolve a chat id: nothing stored and the
    /// discovery fetch saw no message-bearing updates.
    #[error("no chat id found; message the bot first, or run `listen`")]
    NoDestination,

    #[error("failed to read chat store {path}")]
    StoreRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write chat store {path}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("chat store {path} is not valid JSON")]
    StoreParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, RelayError>;
