//! Eventos de error reportados por las aplicaciones monitorizadas.
//!
//! Un `ErrorEvent` pertenece siempre a exactamente una `ApplicationConfig`
//! (`config_id`). El estado inicial lo fija el workflow al ingerir; el store
//! sólo lo persiste.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConfigId, DomainError, EventState, ResolutionAcceptance};

pub type EventId = i64;

fn default_occurrences() -> i32 {
    1
}

/// Datos del error tal como los envía la aplicación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub correlation_id: String,
    #[serde(default)]
    pub span_id: Option<String>,
    pub stack_trace: String,
    pub origin_method: String,
    #[serde(default)]
    pub origin_class: Option<String>,
    #[serde(default)]
    pub origin_line: Option<i32>,
    #[serde(default = "default_occurrences")]
    pub occurrence_count: i32,
    /// Momento en que ocurrió el error (no el de creación de la fila).
    pub error_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source_branch: Option<String>,
}

impl ErrorReport {
    pub fn new(correlation_id: impl Into<String>, stack_trace: impl Into<String>, origin_method: impl Into<String>, error_timestamp: DateTime<Utc>) -> Self {
        Self { correlation_id: correlation_id.into(),
               span_id: None,
               stack_trace: stack_trace.into(),
               origin_method: origin_method.into(),
               origin_class: None,
               origin_line: None,
               occurrence_count: 1,
               error_timestamp,
               source_branch: None }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.correlation_id.trim().is_empty() {
            return Err(DomainError::Validation("correlation_id is required".into()));
        }
        if self.stack_trace.trim().is_empty() {
            return Err(DomainError::Validation("stack_trace is required".into()));
        }
        if self.origin_method.trim().is_empty() {
            return Err(DomainError::Validation("origin_method is required".into()));
        }
        if self.occurrence_count < 1 {
            return Err(DomainError::Validation(format!("occurrence_count must be >= 1 (got {})", self.occurrence_count)));
        }
        Ok(())
    }
}

/// Evento listo para insertar: configuración y estado ya decididos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewErrorEvent {
    pub config_id: ConfigId,
    pub state: EventState,
    pub report: ErrorReport,
}

/// Resolución propuesta por el pipeline de remediación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub text: String,
    pub confidence: f64,
    pub pull_request_url: String,
}

impl Resolution {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.confidence.is_finite() {
            return Err(DomainError::Validation("confidence must be a finite number".into()));
        }
        Ok(())
    }
}

/// Evento persistido (fila de `error_events`).
///
/// `resolution`, `confidence` y `pull_request_url` sólo tienen sentido una vez
/// registrada una resolución.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub event_id: EventId,
    pub config_id: ConfigId,
    pub state: EventState,
    pub correlation_id: String,
    pub span_id: Option<String>,
    pub stack_trace: String,
    pub origin_method: String,
    pub origin_class: Option<String>,
    pub origin_line: Option<i32>,
    pub occurrence_count: i32,
    pub error_timestamp: DateTime<Utc>,
    pub resolution: Option<String>,
    pub confidence: Option<f64>,
    pub pull_request_url: Option<String>,
    pub acceptance: Option<ResolutionAcceptance>,
    pub user_feedback: Option<String>,
    pub source_branch: Option<String>,
    pub affected_issues: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ErrorEvent {
    /// Materializa un evento recién insertado con los valores asignados por
    /// el store.
    pub fn from_new(event_id: EventId, new: NewErrorEvent, created_at: DateTime<Utc>) -> Self {
        let NewErrorEvent { config_id, state, report } = new;
        Self { event_id,
               config_id,
               state,
               correlation_id: report.correlation_id,
               span_id: report.span_id,
               stack_trace: report.stack_trace,
               origin_method: report.origin_method,
               origin_class: report.origin_class,
               origin_line: report.origin_line,
               occurrence_count: report.occurrence_count,
               error_timestamp: report.error_timestamp,
               resolution: None,
               confidence: None,
               pull_request_url: None,
               acceptance: None,
               user_feedback: None,
               source_branch: report.source_branch,
               affected_issues: Vec::new(),
               created_at,
               updated_at: created_at }
    }

    pub fn has_resolution(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Serializa ids del issue tracker en la forma persistida (`A-1,B-2`).
/// Devuelve `None` si no queda ningún id tras descartar vacíos.
pub fn join_issue_ids(ids: &[String]) -> Option<String> {
    let cleaned: Vec<&str> = ids.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.join(","))
    }
}

pub fn split_issue_ids(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}
