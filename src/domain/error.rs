//! Pipeline error taxonomy.
//!
//! Every port and use case reports failures through `PipelineError`.
//! Each variant maps onto exactly one bus `Code`, which is how errors
//! travel back to the service that issued a request.

use thiserror::Error;

use super::message::Code;

/// Errors raised anywhere in the data plane.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The upstream game API answered with a non-200 status.
    #[error("upstream refused request with status {status}: {url}")]
    UpstreamRefused { status: u16, url: String },

    /// The upstream game API could not be reached at all.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The upstream body was not the JSON shape we expect.
    #[error("failed to parse upstream body: {0}")]
    UpstreamParse(String),

    /// An object that was expected to exist is absent.
    #[error("object {bucket}/{key} not found")]
    StorageMissing { bucket: String, key: String },

    /// Object storage transport or encoding failure.
    #[error("storage error: {0}")]
    StorageIo(String),

    /// A bus request did not receive its reply in time.
    #[error("bus request on {subject} timed out after {timeout_ms}ms")]
    BusTimeout { subject: String, timeout_ms: u64 },

    /// A bus payload could not be decoded.
    #[error("malformed bus message: {0}")]
    BusMalformed(String),

    /// A query failed validation.
    #[error("{0}")]
    UserInput(String),

    /// A region, realm or item referenced by a query is unknown.
    #[error("{0}")]
    NotFound(String),

    /// An item was filtered by the blacklist policy.
    #[error("item {0} is blacklisted")]
    Blacklisted(u64),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// The bus code a reply carrying this error is sent with.
    pub const fn code(&self) -> Code {
        match self {
            Self::UpstreamRefused { .. } | Self::UpstreamUnreachable(_) => Code::UpstreamError,
            Self::UpstreamParse(_) | Self::BusMalformed(_) => Code::ParseError,
            Self::StorageMissing { .. } | Self::NotFound(_) => Code::NotFound,
            Self::UserInput(_) => Code::UserError,
            Self::Blacklisted(_) => Code::Blacklisted,
            Self::StorageIo(_) | Self::BusTimeout { .. } | Self::Internal(_) => {
                Code::GenericError
            }
        }
    }

    /// Whether this error means "the object was not there".
    ///
    /// Cleanup treats these as no-ops.
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::StorageMissing { .. })
    }

    /// Shorthand for a missing object.
    pub fn missing(bucket: &str, key: &str) -> Self {
        Self::StorageMissing {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        Self::BusMalformed(e.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::StorageIo(e.to_string())
    }
}

/// Result alias used across ports and use cases.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            PipelineError::UserInput("bad".into()).code(),
            Code::UserError
        );
        assert_eq!(
            PipelineError::UpstreamRefused {
                status: 404,
                url: "x".into()
            }
            .code(),
            Code::UpstreamError
        );
        assert_eq!(PipelineError::missing("b", "k").code(), Code::NotFound);
        assert_eq!(PipelineError::Blacklisted(25).code(), Code::Blacklisted);
        assert_eq!(
            PipelineError::UpstreamParse("eof".into()).code(),
            Code::ParseError
        );
    }

    #[test]
    fn test_missing_is_detected() {
        assert!(PipelineError::missing("raw-auctions", "us/a/1.json.gz").is_missing());
        assert!(!PipelineError::StorageIo("disk".into()).is_missing());
    }
}
