use thiserror::Error;

/// Errores de validación del dominio.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unknown event state: {0}")]
    UnknownState(String),
    #[error("unknown resolution acceptance: {0}")]
    UnknownAcceptance(String),
}
