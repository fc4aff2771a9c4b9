//! Taxonomía de errores vista desde los contratos del core.
//!
//! `status_code` fija la traducción a códigos HTTP que aplica la frontera.
use patch_domain::{DomainError, EventId, EventState};
use thiserror::Error;

use crate::workflow::EventAction;

/// Fallos de un store. Nunca se enmascaran: el store revierte y propaga.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("connection pool exhausted: {0}")]
    PoolExhausted(String),
    #[error("connection pool closed")]
    PoolClosed,
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("transient io failure: {0}")]
    TransientIo(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Fallos de infraestructura que el llamador puede reintentar.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::PoolExhausted(_) | StoreError::PoolClosed | StoreError::TransientIo(_))
    }

    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::NotFound { .. } => 404,
            StoreError::ConstraintViolation(_) => 409,
            StoreError::PoolExhausted(_) | StoreError::PoolClosed => 503,
            StoreError::TransientIo(_) | StoreError::Backend(_) => 500,
        }
    }
}

impl From<DomainError> for StoreError {
    fn from(e: DomainError) -> Self {
        StoreError::ConstraintViolation(e.to_string())
    }
}

/// Fallos del workflow. `NotFound` e `IllegalTransition` son distinguibles:
/// "no existe" frente a "existe pero en otro estado".
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("error event {0} not found")]
    NotFound(EventId),
    #[error("cannot {action} error event {event_id} from state {from}")]
    IllegalTransition { event_id: EventId, from: EventState, action: EventAction },
    #[error("invalid input: {0}")]
    Invalid(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    pub fn status_code(&self) -> u16 {
        match self {
            WorkflowError::NotFound(_) => 404,
            WorkflowError::IllegalTransition { .. } => 409,
            WorkflowError::Invalid(_) => 400,
            WorkflowError::Store(e) => e.status_code(),
        }
    }
}
