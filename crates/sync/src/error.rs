//! Error types for the sync manager.

use std::fmt;
use thiserror::Error;

/// Result type alias for sync manager operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Wire reject codes (BIP 61) surfaced to peers alongside a reason string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RejectCode {
    /// Message could not be decoded.
    Malformed = 0x01,
    /// Object failed a validity rule.
    Invalid = 0x10,
    /// Object version is no longer supported.
    Obsolete = 0x11,
    /// Object duplicates one already known.
    Duplicate = 0x12,
    /// Transaction does not meet standardness policy.
    Nonstandard = 0x40,
    /// Output value below the dust threshold.
    Dust = 0x41,
    /// Fee below the relay minimum.
    InsufficientFee = 0x42,
    /// Block conflicts with a hard-coded checkpoint.
    Checkpoint = 0x43,
}

impl RejectCode {
    /// Wire byte for this code.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.as_u8())
    }
}

/// Failure reported by a downstream validation callback.
///
/// A `Rejected` error maps onto a wire reject message for the sending peer;
/// anything else is an internal processing failure that is logged and never
/// propagated to peers.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProcessError {
    /// The object was rejected by consensus or policy rules.
    #[error("rejected ({code}): {reason}")]
    Rejected {
        /// Wire reject code.
        code: RejectCode,
        /// Human-readable reject reason.
        reason: String,
    },

    /// Validation failed for a reason with no wire mapping.
    #[error("processing failed: {0}")]
    Internal(String),
}

impl ProcessError {
    /// Create a rejection error.
    pub fn rejected(code: RejectCode, reason: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            reason: reason.into(),
        }
    }

    /// Create an internal processing error.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    /// The wire reject code and reason, if this failure maps to one.
    pub fn reject(&self) -> Option<(RejectCode, &str)> {
        match self {
            Self::Rejected { code, reason } => Some((*code, reason)),
            Self::Internal(_) => None,
        }
    }
}

/// Sync manager lifecycle errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The manager is already shutting down.
    #[error("sync manager is already in the process of shutting down")]
    ShuttingDown,

    /// The worker task terminated abnormally.
    #[error("sync worker terminated abnormally: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_accessor() {
        let err = ProcessError::rejected(RejectCode::Duplicate, "already have block");
        let (code, reason) = err.reject().expect("reject mapping");
        assert_eq!(code, RejectCode::Duplicate);
        assert_eq!(reason, "already have block");

        assert!(ProcessError::internal("db failure").reject().is_none());
    }

    #[test]
    fn test_reject_code_bytes() {
        assert_eq!(RejectCode::Malformed.as_u8(), 0x01);
        assert_eq!(RejectCode::Invalid.as_u8(), 0x10);
        assert_eq!(RejectCode::InsufficientFee.as_u8(), 0x42);
    }

    #[test]
    fn test_display() {
        let err = ProcessError::rejected(RejectCode::Nonstandard, "scriptpubkey");
        assert!(err.to_string().contains("0x40"));
        assert!(err.to_string().contains("scriptpubkey"));
    }
}
