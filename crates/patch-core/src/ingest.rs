//! Orquestación de ingesta: resolver configuración, decidir estado inicial,
//! persistir y, si corresponde, encolar.
use log::{debug, info};
use patch_domain::{ErrorReport, EventId, EventState, NaturalKey, NewErrorEvent};
use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;
use crate::queue::ProcessingQueue;
use crate::store::{ApplicationConfigStore, ErrorEventStore};
use crate::workflow::ErrorEventWorkflow;

/// Resultado de una ingesta. `Skipped` no es un error: la aplicación no
/// está dada de alta y no se escribe nada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Skipped { key: NaturalKey },
    Created { event_id: EventId, state: EventState },
}

impl IngestOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, IngestOutcome::Skipped { .. })
    }
}

pub struct IngestionGateway<C, S, Q> {
    configs: C,
    events: S,
    queue: Q,
}

impl<C: ApplicationConfigStore, S: ErrorEventStore, Q: ProcessingQueue> IngestionGateway<C, S, Q> {
    pub fn new(configs: C, events: S, queue: Q) -> Self {
        Self { configs, events, queue }
    }

    /// Un fallo del store aborta todo: sin id asignado y sin envío a la cola
    /// (el envío depende de que el insert haya hecho commit).
    pub fn ingest(&self, report: ErrorReport, business_unit: &str, application: &str, environment: &str) -> Result<IngestOutcome, WorkflowError> {
        report.validate()?;
        let key = NaturalKey::new(business_unit, application, environment);
        let Some(config) = self.configs.find_by_key(&key)? else {
            info!("ingest:skipped no configuration for {key} correlation_id={}", report.correlation_id);
            return Ok(IngestOutcome::Skipped { key });
        };
        let state = ErrorEventWorkflow::<S, Q>::initial_state(config.auto_resolve);
        debug!("ingest:decided key={key} config_id={} auto_resolve={} state={state}", config.config_id, config.auto_resolve);
        let saved = self.events.insert(NewErrorEvent { config_id: config.config_id, state, report })?;
        if state == EventState::Processing {
            self.queue.submit(saved.event_id);
        }
        info!("ingest:created event_id={} state={state} key={key}", saved.event_id);
        Ok(IngestOutcome::Created { event_id: saved.event_id, state })
    }
}
