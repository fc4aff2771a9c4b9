//! Fachada de servicio: traduce resultados del core a respuestas
//! `Reply { status, body }` listas para una frontera HTTP.
//!
//! Cada operación registra entrada y resultado (`info!`), y `warn!` cuando
//! el recurso no existe.
use log::{info, warn};
use patch_core::{ApplicationConfigStore, ErrorEventStore, ErrorEventWorkflow, IngestOutcome, IngestionGateway, ProcessingQueue,
                 StoreError, WorkflowError};
use patch_domain::{ConfigId, ErrorReport, EventId, EventState, OnboardRequest, Resolution, ResolutionAcceptance};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self { status, body },
            Err(e) => Self::error(500, format!("serialization failed: {e}")),
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self { status,
               body: json!({ "error": message.into() }) }
    }
}

impl From<StoreError> for Reply {
    fn from(e: StoreError) -> Self {
        Reply::error(e.status_code(), e.to_string())
    }
}

impl From<WorkflowError> for Reply {
    fn from(e: WorkflowError) -> Self {
        Reply::error(e.status_code(), e.to_string())
    }
}

pub struct ApplicationService<C> {
    configs: C,
}

impl<C: ApplicationConfigStore> ApplicationService<C> {
    pub fn new(configs: C) -> Self {
        Self { configs }
    }

    pub fn onboard(&self, request: OnboardRequest) -> Reply {
        info!("onboard:start");
        let new = match request.into_new_config() {
            Ok(c) => c,
            Err(e) => return Reply::error(400, e.to_string()),
        };
        match self.configs.insert(new) {
            Ok(saved) => {
                info!("onboard:done config_id={} key={}", saved.config_id, saved.natural_key());
                Reply::json(201, &saved)
            }
            Err(e) => e.into(),
        }
    }

    pub fn get(&self, id: ConfigId) -> Reply {
        info!("get_config:start config_id={id}");
        match self.configs.find_by_id(id) {
            Ok(Some(c)) => Reply::json(200, &c),
            Ok(None) => {
                warn!("get_config:not_found config_id={id}");
                StoreError::NotFound { entity: "application_config", id }.into()
            }
            Err(e) => e.into(),
        }
    }

    pub fn list_by_business_unit(&self, business_unit: &str) -> Reply {
        info!("list_configs:start unit={business_unit}");
        match self.configs.find_by_business_unit(business_unit) {
            Ok(list) => {
                info!("list_configs:done unit={business_unit} count={}", list.len());
                Reply::json(200, &list)
            }
            Err(e) => e.into(),
        }
    }
}

pub struct ErrorEventService<C, S, Q> {
    gateway: IngestionGateway<C, S, Q>,
    workflow: ErrorEventWorkflow<S, Q>,
}

impl<C, S, Q> ErrorEventService<C, S, Q>
    where C: ApplicationConfigStore,
          S: ErrorEventStore + Clone,
          Q: ProcessingQueue + Clone
{
    pub fn new(configs: C, events: S, queue: Q) -> Self {
        Self { gateway: IngestionGateway::new(configs, events.clone(), queue.clone()),
               workflow: ErrorEventWorkflow::new(events, queue) }
    }

    /// `Skipped` → 200 con mensaje; `Created` → 201.
    pub fn ingest(&self, report: ErrorReport, business_unit: &str, application: &str, environment: &str) -> Reply {
        info!("ingest:start unit={business_unit} app={application} env={environment} correlation_id={}", report.correlation_id);
        match self.gateway.ingest(report, business_unit, application, environment) {
            Ok(IngestOutcome::Skipped { key }) => {
                warn!("ingest:skipped key={key}");
                Reply { status: 200,
                        body: json!({ "outcome": "skipped", "message": format!("no configuration for {key}") }) }
            }
            Ok(created @ IngestOutcome::Created { .. }) => Reply::json(201, &created),
            Err(e) => e.into(),
        }
    }

    pub fn get(&self, id: EventId) -> Reply {
        info!("get_event:start event_id={id}");
        match self.workflow.find(id) {
            Ok(ev) => Reply::json(200, &ev),
            Err(e) => {
                warn!("get_event:failed event_id={id} err={e}");
                e.into()
            }
        }
    }

    pub fn list_by_business_unit(&self, business_unit: &str) -> Reply {
        info!("list_events:start unit={business_unit}");
        match self.workflow.events().find_by_business_unit(business_unit) {
            Ok(list) => {
                info!("list_events:done unit={business_unit} count={}", list.len());
                Reply::json(200, &list)
            }
            Err(e) => e.into(),
        }
    }

    pub fn approve(&self, id: EventId) -> Reply {
        info!("approve:start event_id={id}");
        state_reply(id, self.workflow.approve(id))
    }

    pub fn reject(&self, id: EventId) -> Reply {
        info!("reject:start event_id={id}");
        state_reply(id, self.workflow.reject(id))
    }

    pub fn resolve(&self, id: EventId, resolution: &Resolution, target: EventState) -> Reply {
        info!("resolve:start event_id={id} target={target}");
        ack(id, self.workflow.record_resolution(id, resolution, target))
    }

    pub fn feedback(&self, id: EventId, acceptance: Option<ResolutionAcceptance>, feedback: Option<&str>) -> Reply {
        info!("feedback:start event_id={id}");
        ack(id, self.workflow.record_feedback(id, acceptance, feedback))
    }

    pub fn affected_issues(&self, id: EventId, issue_ids: &[String]) -> Reply {
        info!("affected_issues:start event_id={id} count={}", issue_ids.len());
        ack(id, self.workflow.record_affected_issues(id, issue_ids))
    }
}

fn state_reply(id: EventId, res: Result<EventState, WorkflowError>) -> Reply {
    match res {
        Ok(state) => Reply { status: 200,
                             body: json!({ "event_id": id, "state": state }) },
        Err(e) => e.into(),
    }
}

fn ack(id: EventId, res: Result<(), WorkflowError>) -> Reply {
    match res {
        Ok(()) => Reply { status: 200,
                          body: json!({ "event_id": id, "updated": true }) },
        Err(e) => e.into(),
    }
}
