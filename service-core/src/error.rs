use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Failure taxonomy shared by every component in the workspace.
///
/// Domain variants carry the offending entity so a failure is always
/// traceable without parsing the message text. Infrastructure variants wrap
/// their cause as `anyhow::Error`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown SKU: {sku}")]
    SkuNotFound { sku: String },

    #[error("insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    #[error(
        "credit limit exceeded for account {account_id}: {balance} + {attempted} exceeds limit {limit}"
    )]
    CreditLimitExceeded {
        account_id: Uuid,
        balance: Decimal,
        attempted: Decimal,
        limit: Decimal,
    },

    /// Transient transport failure talking to the tax authority.
    #[error("tax authority unreachable: {0}")]
    AuthorityUnreachable(anyhow::Error),

    /// The authority processed the request and declined it. Not retryable
    /// with the same payload.
    #[error("tax authority rejected the request: {reason}")]
    AuthorityRejected { reason: String },

    #[error("invalid state for {entity} {id}: {current} (expected {expected})")]
    InvalidState {
        entity: &'static str,
        id: Uuid,
        current: String,
        expected: String,
    },

    #[error("not found: {0}")]
    NotFound(anyhow::Error),

    #[error("conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Stable label for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::SkuNotFound { .. } => "sku_not_found",
            AppError::InsufficientStock { .. } => "insufficient_stock",
            AppError::CreditLimitExceeded { .. } => "credit_limit_exceeded",
            AppError::AuthorityUnreachable(_) => "authority_unreachable",
            AppError::AuthorityRejected { .. } => "authority_rejected",
            AppError::InvalidState { .. } => "invalid_state",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::DatabaseError(_) => "db_error",
            AppError::ConfigError(_) => "config_error",
            AppError::InternalError(_) => "internal_error",
        }
    }

    /// Whether a caller may reasonably retry the same request unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::AuthorityUnreachable(_) | AppError::DatabaseError(_)
        )
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_labels() {
        let err = AppError::AuthorityRejected {
            reason: "10016: invalid voucher number".into(),
        };
        assert_eq!(err.kind(), "authority_rejected");
        assert!(!err.is_transient());

        let err = AppError::AuthorityUnreachable(anyhow::anyhow!("connect timeout"));
        assert!(err.is_transient());
    }
}
