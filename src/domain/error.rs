use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("charger not found: {0}")]
    ChargerNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(i32),

    #[error("transaction {0} is already closed")]
    TransactionAlreadyClosed(i32),

    #[error("charger {charge_point_id} already has open transaction {transaction_id}")]
    TransactionAlreadyOpen {
        charge_point_id: String,
        transaction_id: i32,
    },

    #[error("validation: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sea_orm::DbErr> for DomainError {
    fn from(e: sea_orm::DbErr) -> Self {
        Self::Storage(e.to_string())
    }
}
