//! Unified error types for tidyread.
//!
//! Every variant carries a stable machine-readable prefix in its `Display`
//! output and maps to a fixed JSON-RPC error code for the MCP surface.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Unified error type for the extraction pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Invalid request parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Malformed, unsupported, or SSRF-blocked URL. Raised before any I/O.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// DNS, connection, read, or non-success status failure.
    #[error("NETWORK_FAILURE: {0}")]
    NetworkFailure(String),

    /// A fetch or navigation deadline elapsed.
    #[error("TIMEOUT: {0}")]
    Timeout(String),

    /// Response body exceeded the configured byte cap.
    #[error("TOO_LARGE: {0}")]
    TooLarge(String),

    /// HTML could not be turned into a document tree.
    #[error("DOM_CONSTRUCTION: {0}")]
    DomConstruction(String),

    /// Readability extraction produced no article.
    #[error("EXTRACT_FAILED: {0}")]
    ExtractFailed(String),

    /// The URL safety provider positively flagged the URL.
    #[error("UNSAFE_URL: {0}")]
    UnsafeUrl(String),

    /// Headless rendering is disabled by configuration.
    #[error("RENDER_DISABLED")]
    RenderDisabled,

    /// Headless rendering failed.
    #[error("RENDER_FAILED: {0}")]
    RenderFailed(String),

    /// Persistence collaborator failure.
    #[error("PERSISTENCE: {0}")]
    Persistence(String),
}

impl Error {
    /// Whether the pipeline may fall through to the next strategy after this error.
    ///
    /// Input and safety errors end the request; everything else only ends the
    /// strategy that raised it.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::InvalidInput(_) | Error::InvalidUrl(_) | Error::UnsafeUrl(_))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::ExtractFailed(msg) => (-32000, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::UnsafeUrl(msg) => (-32004, msg.clone()),
            Error::Timeout(msg) => (-32006, msg.clone()),
            Error::TooLarge(msg) => (-32007, msg.clone()),
            Error::NetworkFailure(msg) => (-32008, msg.clone()),
            Error::DomConstruction(msg) => (-32009, msg.clone()),
            Error::RenderDisabled => (-32011, "Render mode is disabled".to_string()),
            Error::RenderFailed(msg) => (-32012, msg.clone()),
            Error::Persistence(msg) => (-32013, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
