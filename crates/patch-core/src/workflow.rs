//! Máquina de estados de `ErrorEvent`.
//!
//! Transiciones válidas (tabla `TRANSITIONS`):
//! - `PENDING_APPROVAL` --approve--> `PROCESSING` (y se encola)
//! - `PENDING_APPROVAL` --reject--> `REJECTED`
//!
//! El estado inicial se decide una sola vez al ingerir, a partir de
//! `auto_resolve` de la configuración dueña; no se re-evalúa si la
//! configuración cambia después.
//!
//! `record_resolution` no restringe el estado destino (decisión de política
//! del llamador); sólo garantiza la escritura atómica.
use std::fmt;

use log::{info, warn};
use patch_domain::{ErrorEvent, EventId, EventState, Resolution, ResolutionAcceptance};
use serde::{Deserialize, Serialize};

use crate::errors::{StoreError, WorkflowError};
use crate::queue::ProcessingQueue;
use crate::store::ErrorEventStore;

/// Acción solicitada sobre un evento existente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Approve,
    Reject,
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
                        EventAction::Approve => "approve",
                        EventAction::Reject => "reject",
                    })
    }
}

const TRANSITIONS: &[(EventState, EventAction, EventState)] =
    &[(EventState::PendingApproval, EventAction::Approve, EventState::Processing),
      (EventState::PendingApproval, EventAction::Reject, EventState::Rejected)];

/// `(estado actual, acción) -> estado nuevo`, o `None` si la acción no es
/// legal desde ese estado.
pub fn next_state(from: EventState, action: EventAction) -> Option<EventState> {
    TRANSITIONS.iter().find(|(f, a, _)| *f == from && *a == action).map(|(_, _, to)| *to)
}

pub struct ErrorEventWorkflow<S, Q> {
    events: S,
    queue: Q,
}

impl<S: ErrorEventStore, Q: ProcessingQueue> ErrorEventWorkflow<S, Q> {
    pub fn new(events: S, queue: Q) -> Self {
        Self { events, queue }
    }

    /// Colocación inicial: `auto_resolve` lleva directo a procesamiento, si no
    /// se requiere aprobación humana.
    pub fn initial_state(auto_resolve: bool) -> EventState {
        if auto_resolve {
            EventState::Processing
        } else {
            EventState::PendingApproval
        }
    }

    pub fn events(&self) -> &S {
        &self.events
    }

    /// Aprueba un evento pendiente y lo entrega a la cola de procesamiento.
    pub fn approve(&self, event_id: EventId) -> Result<EventState, WorkflowError> {
        let state = self.transition(event_id, EventAction::Approve)?;
        self.queue.submit(event_id);
        info!("approve:done event_id={event_id} submitted to processing queue");
        Ok(state)
    }

    pub fn reject(&self, event_id: EventId) -> Result<EventState, WorkflowError> {
        self.transition(event_id, EventAction::Reject)
    }

    /// Registra resolución, confianza, URL del PR y estado destino en una sola
    /// escritura.
    pub fn record_resolution(&self, event_id: EventId, resolution: &Resolution, target: EventState) -> Result<(), WorkflowError> {
        resolution.validate()?;
        if target == EventState::New {
            return Err(patch_domain::DomainError::Validation("NEW is not a persistable state".into()).into());
        }
        self.events
            .update_resolution(event_id, resolution, target)
            .map_err(|e| not_found_as_workflow(event_id, e))?;
        info!("record_resolution:done event_id={event_id} state={target} confidence={}", resolution.confidence);
        Ok(())
    }

    pub fn record_feedback(&self, event_id: EventId, acceptance: Option<ResolutionAcceptance>, feedback: Option<&str>) -> Result<(), WorkflowError> {
        self.events
            .update_user_feedback(event_id, acceptance, feedback)
            .map_err(|e| not_found_as_workflow(event_id, e))?;
        info!("record_feedback:done event_id={event_id} acceptance={acceptance:?}");
        Ok(())
    }

    pub fn record_affected_issues(&self, event_id: EventId, issue_ids: &[String]) -> Result<(), WorkflowError> {
        self.events
            .update_affected_issues(event_id, issue_ids)
            .map_err(|e| not_found_as_workflow(event_id, e))?;
        info!("record_affected_issues:done event_id={event_id} count={}", issue_ids.len());
        Ok(())
    }

    pub fn find(&self, event_id: EventId) -> Result<ErrorEvent, WorkflowError> {
        self.events.find_by_id(event_id)?.ok_or(WorkflowError::NotFound(event_id))
    }

    // Valida contra la tabla y escribe condicionado al estado leído; si otra
    // petición ganó la carrera la fila queda intacta y se informa el estado
    // vigente.
    fn transition(&self, event_id: EventId, action: EventAction) -> Result<EventState, WorkflowError> {
        let current = self.find(event_id)?;
        let Some(to) = next_state(current.state, action) else {
            warn!("{action}:rejected event_id={event_id} state={}", current.state);
            return Err(WorkflowError::IllegalTransition { event_id, from: current.state, action });
        };
        if self.events.update_state_if(event_id, current.state, to)? {
            info!("{action}:done event_id={event_id} {} -> {to}", current.state);
            return Ok(to);
        }
        let now = self.find(event_id)?;
        warn!("{action}:lost_race event_id={event_id} state={}", now.state);
        Err(WorkflowError::IllegalTransition { event_id, from: now.state, action })
    }
}

fn not_found_as_workflow(event_id: EventId, e: StoreError) -> WorkflowError {
    match e {
        StoreError::NotFound { .. } => WorkflowError::NotFound(event_id),
        other => WorkflowError::Store(other),
    }
}
