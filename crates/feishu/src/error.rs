use thiserror::Error;

/// Failures talking to Feishu or preparing outbound media.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected before any I/O (blank target, blank locator, bad config).
    #[error("{message}")]
    InvalidInput { message: String },

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// Non-success HTTP status from the Open API.
    #[error("Feishu request failed ({status}): {body}")]
    Http { status: u16, body: String },

    /// The Open API answered with a non-zero business code.
    #[error("Feishu API error {code}: {msg}")]
    Api { code: i64, msg: String },

    /// The response did not carry the expected field. `raw` is the response
    /// body as received.
    #[error("{operation} failed: {raw}")]
    MissingField { operation: &'static str, raw: String },

    #[error(transparent)]
    Media(#[from] larkbot_media::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// The platform answered, but not with what the call needed.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Api { .. } | Self::MissingField { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Reqwest(e) if e.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
