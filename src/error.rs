//! Crate error type
//!
//! One typed enum covering the failure classes of the client: configuration,
//! transport, protocol decoding, and non-success endpoint statuses. Running
//! out of pagination retries is deliberately not represented here — that
//! path returns a partial `Ok`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A cookie refill was required but no supplier is registered.
    #[error("cookie refill required but no cookie supplier is registered")]
    MissingCookieSupplier,

    /// The registered cookie supplier failed to produce a cookie set.
    #[error("cookie supplier failed: {0}")]
    CookieSupplier(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The configured base URL is not a valid origin.
    #[error("invalid base url `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Network-level failure issuing a request or reading a body.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A streamed line carried bytes that are not valid UTF-8.
    #[error("streamed line is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Malformed JSON in a response body or a streamed data line.
    #[error("failed to decode {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// An endpoint answered with a non-success status.
    #[error("{endpoint} returned status {status}: {body}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
        body: String,
    },

    /// The requested model slug is not in the account's model list.
    #[error("`{0}` is not a valid model")]
    UnknownModel(String),

    /// A conversation id was not found in the history, even after a reload.
    #[error("cannot find conversation with uuid {0}")]
    ConversationNotFound(String),
}

impl Error {
    pub(crate) fn decode(context: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { context, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
