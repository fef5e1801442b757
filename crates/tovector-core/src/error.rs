//! Error types for tovector.

use crate::ids::IdError;

/// Result type for tovector domain operations.
pub type Result<T> = std::result::Result<T, TovectorError>;

/// Errors raised by domain rules (ledger policy, upload validation).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TovectorError {
    /// Insufficient credits for the operation.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance in credits.
        balance: i64,
        /// Required amount in credits.
        required: i64,
    },

    /// Invalid amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Unknown credit log action.
    #[error("unknown action type: {0}")]
    UnknownAction(String),

    /// The uploaded file is not an accepted image type.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The uploaded file exceeds the byte limit.
    #[error("file too large: size={size}, max={max}")]
    FileTooLarge {
        /// Size of the upload in bytes.
        size: usize,
        /// Configured maximum in bytes.
        max: usize,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
