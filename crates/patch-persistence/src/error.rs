//! Errores de persistencia.
//! Mapea errores de Diesel / r2d2 a variantes semánticas y éstas a la
//! taxonomía `StoreError` que ven los llamadores del core.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use patch_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("connection pool exhausted: {0}")]
    PoolExhausted(String),
    #[error("connection pool closed")]
    PoolClosed,
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not null violation: {0}")]
    NotNullViolation(String),
    #[error("not found")]
    NotFound,
    #[error("transient IO / driver error: {0}")]
    TransientIo(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("migration error: {0}")]
    Migration(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl PersistenceError {
    /// Errores de infraestructura que un llamador puede reintentar. El core
    /// no reintenta por sí mismo.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted(_) | Self::TransientIo(_))
    }
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::NotNullViolation => Self::NotNullViolation(info.message().to_string()),
                other => Self::TransientIo(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Corrupt(format!("deser: {e}")),
            DieselError::RollbackErrorOnCommit { rollback_error, commit_error } => {
                Self::TransientIo(format!("rollback={rollback_error}; commit={commit_error}"))
            }
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            other => Self::TransientIo(format!("diesel: {other}")),
        }
    }
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::PoolExhausted(m) => StoreError::PoolExhausted(m),
            PersistenceError::PoolClosed => StoreError::PoolClosed,
            PersistenceError::UniqueViolation(m)
            | PersistenceError::CheckViolation(m)
            | PersistenceError::ForeignKeyViolation(m)
            | PersistenceError::NotNullViolation(m) => StoreError::ConstraintViolation(m),
            PersistenceError::TransientIo(m) => StoreError::TransientIo(m),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
