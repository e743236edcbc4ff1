//! Store error types.
//!
//! Four error families matter to callers: out-of-range reads, illegal-state
//! misuse, unique violations and foreign-key violations. Unique and
//! illegal-state errors surface at the offending call; foreign-key
//! violations surface at commit.

use std::fmt;
use thiserror::Error;

use crate::types::{RowId, Version};

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0000,
    /// I/O error while loading configuration.
    Io = 0x0001,

    // Storage errors (0x0100 - 0x01FF)
    /// Row not visible at the requested version.
    OutOfRange = 0x0100,

    // Transaction errors (0x0200 - 0x02FF)
    /// Operation not legal in the current state.
    IllegalState = 0x0200,
    /// Another thread holds the editor role.
    EditorBusy = 0x0201,

    // Constraint errors (0x0300 - 0x03FF)
    /// Duplicate key in a unique index.
    UniqueViolation = 0x0300,
    /// Dangling reference or blocked restrict delete.
    ForeignKeyViolation = 0x0301,

    // Configuration errors (0x0400 - 0x04FF)
    /// Invalid configuration value.
    InvalidConfig = 0x0400,
    /// Configuration could not be parsed or written.
    ConfigFormat = 0x0401,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Storage",
            0x02 => "Transaction",
            0x03 => "Constraint",
            0x04 => "Config",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for Strata.
///
/// # Example
///
/// ```rust
/// use strata_common::error::{StoreError, StoreResult};
/// use strata_common::types::{RowId, Version};
///
/// fn read_row(row: RowId) -> StoreResult<()> {
///     Err(StoreError::OutOfRange {
///         table: "Person".into(),
///         row,
///         version: Version::INITIAL,
///     })
/// }
/// assert!(read_row(RowId::new(1)).unwrap_err().is_out_of_range());
/// ```
#[derive(Debug, Error)]
pub enum StoreError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - a structure reached a state it cannot be in.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    // ==========================================================================
    // Storage Errors
    // ==========================================================================
    /// Row is past the table bound or deleted at the addressed version.
    #[error("row {row} of table '{table}' is out of range at {version}")]
    OutOfRange {
        /// The table name.
        table: String,
        /// The addressed row.
        row: RowId,
        /// The addressed version.
        version: Version,
    },

    // ==========================================================================
    // Transaction Errors
    // ==========================================================================
    /// The operation is not legal in the current state.
    #[error("illegal state: {message}")]
    IllegalState {
        /// What was wrong.
        message: String,
    },

    /// The editor role is held by another transaction.
    #[error("editor role is already held by another transaction")]
    EditorBusy,

    // ==========================================================================
    // Constraint Errors
    // ==========================================================================
    /// A duplicate key was inserted into a unique index.
    #[error("unique index '{index}' already contains key {key}")]
    UniqueViolation {
        /// The unique index name.
        index: String,
        /// Debug rendering of the duplicate key.
        key: String,
    },

    /// A foreign key is dangling, or a restrict delete was blocked.
    #[error("foreign key '{constraint}' violated by row {row}: {reason}")]
    ForeignKeyViolation {
        /// The foreign key name.
        constraint: String,
        /// The offending row (child row for dangling references, parent row
        /// for blocked deletes).
        row: RowId,
        /// Description of the violation.
        reason: String,
    },

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// Configuration text could not be parsed.
    #[error("configuration parse error: {source}")]
    ConfigParse {
        /// The underlying TOML error.
        #[from]
        source: toml::de::Error,
    },

    /// Configuration could not be serialized.
    #[error("configuration serialize error: {source}")]
    ConfigSerialize {
        /// The underlying TOML error.
        #[from]
        source: toml::ser::Error,
    },
}

impl StoreError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::Io { .. } => ErrorCode::Io,
            Self::OutOfRange { .. } => ErrorCode::OutOfRange,
            Self::IllegalState { .. } => ErrorCode::IllegalState,
            Self::EditorBusy => ErrorCode::EditorBusy,
            Self::UniqueViolation { .. } => ErrorCode::UniqueViolation,
            Self::ForeignKeyViolation { .. } => ErrorCode::ForeignKeyViolation,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::ConfigParse { .. } | Self::ConfigSerialize { .. } => ErrorCode::ConfigFormat,
        }
    }

    /// Returns true for out-of-range errors.
    #[must_use]
    pub const fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OutOfRange { .. })
    }

    /// Returns true for illegal-state errors, including a busy editor role.
    #[must_use]
    pub const fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState { .. } | Self::EditorBusy)
    }

    /// Returns true for unique and foreign-key violations.
    #[must_use]
    pub const fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::UniqueViolation { .. } | Self::ForeignKeyViolation { .. }
        )
    }

    /// Creates an illegal-state error.
    #[must_use]
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an out-of-range error.
    #[must_use]
    pub fn out_of_range(table: impl Into<String>, row: RowId, version: Version) -> Self {
        Self::OutOfRange {
            table: table.into(),
            row,
            version,
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = StoreError::out_of_range("Person", RowId::new(4), Version::new(2));
        assert_eq!(err.code(), ErrorCode::OutOfRange);
        assert_eq!(err.code().category(), "Storage");
        assert_eq!(StoreError::EditorBusy.code().category(), "Transaction");
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::out_of_range("Person", RowId::new(4), Version::new(2));
        assert_eq!(err.to_string(), "row 4 of table 'Person' is out of range at v2");

        let err = StoreError::UniqueViolation {
            index: "PK_Person".into(),
            key: "1".into(),
        };
        assert_eq!(err.to_string(), "unique index 'PK_Person' already contains key 1");
    }

    #[test]
    fn test_predicates() {
        assert!(StoreError::EditorBusy.is_illegal_state());
        assert!(StoreError::illegal_state("frozen").is_illegal_state());
        let fk = StoreError::ForeignKeyViolation {
            constraint: "FK_Pin_Circuit".into(),
            row: RowId::new(0),
            reason: "missing parent".into(),
        };
        assert!(fk.is_constraint_violation());
        assert!(!fk.is_out_of_range());
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StoreError = io_err.into();
        assert_eq!(err.code(), ErrorCode::Io);
    }
}
