//! Error taxonomy for the retrieval and generation pipeline.
//!
//! Every component returns [`Result`]. Gateway and storage failures are
//! wrapped in their own variant so the HTTP layer can report them uniformly
//! without guessing at message text. An empty retrieval is *not* an error;
//! see [`AssembledContext::no_context`](crate::models::AssembledContext).

use thiserror::Error;

/// Errors raised by the pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing identity fields, missing credentials, unreadable knowledge
    /// file. Fatal at startup; retrying will not help.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedding gateway was unreachable or rejected the input.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The generation gateway timed out, ran out of quota, or returned
    /// something unusable.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The vector index storage layer failed.
    #[error("index error: {0}")]
    Index(String),

    /// The caller passed an empty query or a zero `k`.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Stable machine-readable code for logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration_error",
            Error::Embedding(_) => "embedding_error",
            Error::Generation(_) => "generation_error",
            Error::Index(_) => "index_error",
            Error::InvalidInput(_) => "invalid_input",
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Index(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        assert_eq!(Error::Embedding("x".into()).kind(), "embedding_error");
        assert_eq!(Error::Generation("x".into()).kind(), "generation_error");
        assert_eq!(Error::Index("x".into()).kind(), "index_error");
        assert_eq!(
            Error::Configuration("x".into()).kind(),
            "configuration_error"
        );
    }

    #[test]
    fn test_sqlx_error_maps_to_index() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::Index(_)));
        assert!(err.to_string().starts_with("index error"));
    }
}
