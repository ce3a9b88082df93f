//! Database error classification and the store-level error union.

use thiserror::Error;
use tokio_postgres::error::SqlState;

use sift_core::error::{ConfigError, OperationError, ValidationError};
use sift_embed::EmbedError;

/// Failure from the database layer, classified for the retry policy.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Could not obtain or keep a connection. Transient.
    #[error("database connection failed: {0}")]
    ConnectionFailed(String),

    /// A statement failed outside a transaction. Transient. The message
    /// carries the server's error, never the statement text.
    #[error("query failed during {operation}: {message}")]
    QueryFailed {
        operation: &'static str,
        message: String,
    },

    /// A transaction failed and was rolled back. Transient.
    #[error("transaction failed during {operation}: {message}")]
    TransactionFailed {
        operation: &'static str,
        message: String,
    },

    /// The configured table does not exist. Not transient; fix the DDL.
    #[error("table not found: {message}")]
    TableNotFound { message: String },

    /// A constraint rejected the data. Not transient.
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// The per-call timeout elapsed. Transient.
    #[error("database operation timed out during {operation}")]
    Timeout { operation: &'static str },

    /// The `vector` type is missing from `pg_type`. Not transient; the
    /// operator must `CREATE EXTENSION vector`.
    #[error("vector type is not available in this database; run CREATE EXTENSION vector")]
    VectorTypeUnavailable,
}

impl DatabaseError {
    /// Whether the pipeline's retry policy may re-attempt after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed(_)
            | Self::QueryFailed { .. }
            | Self::TransactionFailed { .. }
            | Self::Timeout { .. } => true,
            Self::TableNotFound { .. }
            | Self::ConstraintViolation { .. }
            | Self::VectorTypeUnavailable => false,
        }
    }

    /// Classify a driver error raised by a standalone statement.
    pub(crate) fn classify(operation: &'static str, error: &tokio_postgres::Error) -> Self {
        Self::classify_with(operation, error, |operation, message| Self::QueryFailed {
            operation,
            message,
        })
    }

    /// Classify a driver error raised inside a transaction.
    pub(crate) fn classify_in_transaction(
        operation: &'static str,
        error: &tokio_postgres::Error,
    ) -> Self {
        Self::classify_with(operation, error, |operation, message| {
            Self::TransactionFailed { operation, message }
        })
    }

    fn classify_with(
        operation: &'static str,
        error: &tokio_postgres::Error,
        fallback: fn(&'static str, String) -> Self,
    ) -> Self {
        if let Some(state) = error.code() {
            if *state == SqlState::UNDEFINED_TABLE {
                return Self::TableNotFound {
                    message: error.to_string(),
                };
            }
            // Class 23: integrity constraint violations.
            if state.code().starts_with("23") {
                return Self::ConstraintViolation {
                    message: error.to_string(),
                };
            }
        }
        if error.is_closed() {
            return Self::ConnectionFailed(error.to_string());
        }
        fallback(operation, error.to_string())
    }

    /// Classify a pool acquisition failure.
    pub(crate) fn from_pool(error: &deadpool_postgres::PoolError) -> Self {
        match error {
            deadpool_postgres::PoolError::Timeout(_) => Self::Timeout {
                operation: "acquire connection",
            },
            other => Self::ConnectionFailed(other.to_string()),
        }
    }
}

/// Union of everything a store or query operation can raise.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl StoreError {
    /// Whether the pipeline's retry policy may re-attempt after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Database(e) => e.is_transient(),
            Self::Embed(e) => e.is_transient(),
            Self::Validation(_) | Self::Config(_) | Self::Operation(_) => false,
        }
    }
}
