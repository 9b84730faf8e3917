use std::error::Error as StdError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{message}")]
    InvalidInput { message: String },

    /// The remote host answered with a status that is neither success nor a
    /// followable redirect.
    #[error("failed to download: HTTP {status}")]
    Status { status: u16 },

    #[error("redirect without location header")]
    MissingLocation,

    #[error("too many redirects (limit {limit})")]
    TooManyRedirects { limit: usize },

    #[error("media exceeds size limit of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn external<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

impl larkbot_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

larkbot_common::impl_context!();
