//! # Dispatch Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Dispatch Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Core (domain)  │  │    Storage      │  │     Configuration       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  TicketNotFound │  │  ConnectionFail │  │  InvalidConfig          │ │
//! │  │  InvalidTrans.  │  │  QueryFailed    │  │  ConfigLoadFailed       │ │
//! │  │  CounterBusy    │  │  PoolExhausted  │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rule violations the store detects arrive as `DbError::Domain` and are
//! lifted back into [`DispatchError::Core`], so callers match on one place.

use beacon_core::{CoreError, ValidationError};
use beacon_db::DbError;
use thiserror::Error;

/// Result type alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced by the dispatch engine, reconciler and configuration.
#[derive(Debug, Error)]
pub enum DispatchError {
    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// A queue rule was violated.
    #[error(transparent)]
    Core(CoreError),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// The database failed underneath an operation.
    #[error("Storage error: {0}")]
    Storage(DbError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read or parse the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),
}

/// Stable, machine-readable error categories.
///
/// The HTTP layer maps these to status codes; the string form is part of
/// the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidClass,
    Validation,
    DuplicateActiveTicket,
    NotFound,
    InvalidTransition,
    CounterBusy,
    CounterInactive,
    Database,
    Config,
}

impl ErrorKind {
    /// Wire code, e.g. `INVALID_TRANSITION`.
    pub const fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidClass => "INVALID_CLASS",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::DuplicateActiveTicket => "DUPLICATE_ACTIVE_TICKET",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidTransition => "INVALID_TRANSITION",
            ErrorKind::CounterBusy => "COUNTER_BUSY",
            ErrorKind::CounterInactive => "COUNTER_INACTIVE",
            ErrorKind::Database => "DATABASE_ERROR",
            ErrorKind::Config => "CONFIG_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl DispatchError {
    /// Categorizes the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Core(core) => match core {
                CoreError::InvalidClass(_) => ErrorKind::InvalidClass,
                CoreError::Validation(_) => ErrorKind::Validation,
                CoreError::DuplicateActiveTicket { .. } => ErrorKind::DuplicateActiveTicket,
                CoreError::TicketNotFound(_) | CoreError::CounterNotFound(_) => {
                    ErrorKind::NotFound
                }
                CoreError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
                CoreError::CounterBusy { .. } => ErrorKind::CounterBusy,
                CoreError::CounterInactive(_) => ErrorKind::CounterInactive,
            },
            DispatchError::Storage(_) => ErrorKind::Database,
            DispatchError::InvalidConfig(_) | DispatchError::ConfigLoadFailed(_) => {
                ErrorKind::Config
            }
        }
    }

    /// Shorthand for `self.kind().code()`.
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Returns the domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            DispatchError::Core(core) => Some(core),
            _ => None,
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for DispatchError {
    fn from(err: CoreError) -> Self {
        DispatchError::Core(err)
    }
}

impl From<ValidationError> for DispatchError {
    fn from(err: ValidationError) -> Self {
        DispatchError::Core(CoreError::Validation(err))
    }
}

impl From<DbError> for DispatchError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Domain(core) => DispatchError::Core(core),
            other => DispatchError::Storage(other),
        }
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        DispatchError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for DispatchError {
    fn from(err: toml::de::Error) -> Self {
        DispatchError::ConfigLoadFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::TicketStatus;

    #[test]
    fn test_db_domain_error_is_lifted() {
        let err: DispatchError = DbError::Domain(CoreError::TicketNotFound("t-1".into())).into();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::TicketNotFound(id)) if id == "t-1"
        ));
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_storage_error_stays_storage() {
        let err: DispatchError = DbError::PoolExhausted.into();
        assert!(err.as_core().is_none());
        assert_eq!(err.kind(), ErrorKind::Database);
    }

    #[test]
    fn test_error_codes() {
        let transition = DispatchError::Core(CoreError::InvalidTransition {
            ticket_id: "t-1".into(),
            from: TicketStatus::Completed,
            to: TicketStatus::Cancelled,
        });
        assert_eq!(transition.code(), "INVALID_TRANSITION");

        let busy = DispatchError::Core(CoreError::CounterBusy {
            counter_id: "c-1".into(),
            ticket_id: "t-1".into(),
        });
        assert_eq!(busy.code(), "COUNTER_BUSY");

        let validation: DispatchError = ValidationError::MustNotBeNegative {
            field: "duration".into(),
        }
        .into();
        assert_eq!(validation.code(), "VALIDATION_ERROR");
        assert_eq!(ErrorKind::CounterInactive.to_string(), "COUNTER_INACTIVE");
    }
}
