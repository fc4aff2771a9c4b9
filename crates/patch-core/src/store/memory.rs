//! Backend en memoria con la misma semántica observable que Postgres
//! (unicidad de clave natural, FK, orden de listados, timestamps).
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use patch_domain::error_event::{join_issue_ids, split_issue_ids};
use patch_domain::{ApplicationConfig, ConfigId, ErrorEvent, EventId, EventState, NaturalKey, NewApplicationConfig, NewErrorEvent,
                   Resolution, ResolutionAcceptance};

use super::{ApplicationConfigStore, ErrorEventStore};
use crate::errors::StoreError;

#[derive(Default)]
struct Tables {
    configs: BTreeMap<ConfigId, ApplicationConfig>,
    events: BTreeMap<EventId, ErrorEvent>,
    next_config_id: ConfigId,
    next_event_id: EventId,
    last_ts: Option<DateTime<Utc>>,
}

impl Tables {
    // Reloj monótono: dos inserts seguidos nunca comparten timestamp.
    fn tick(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_ts {
            if now <= last {
                now = last + chrono::Duration::microseconds(1);
            }
        }
        self.last_ts = Some(now);
        now
    }

    fn config_mut(&mut self, id: ConfigId) -> Result<&mut ApplicationConfig, StoreError> {
        self.configs.get_mut(&id).ok_or(StoreError::NotFound { entity: "application_config", id })
    }

    fn event_mut(&mut self, id: EventId) -> Result<&mut ErrorEvent, StoreError> {
        self.events.get_mut(&id).ok_or(StoreError::NotFound { entity: "error_event", id })
    }
}

/// Implementa ambos stores sobre un único mutex; clonar comparte el estado.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Backend("in-memory store poisoned".into()))
    }

    pub fn event_count(&self) -> usize {
        self.tables().map(|t| t.events.len()).unwrap_or(0)
    }

    /// Cambia el flag `auto_resolve` de una configuración ya registrada.
    /// Sólo afecta a los eventos que se ingieran después.
    pub fn set_auto_resolve(&self, id: ConfigId, auto_resolve: bool) -> Result<ApplicationConfig, StoreError> {
        let mut t = self.tables()?;
        let now = t.tick();
        let cfg = t.config_mut(id)?;
        cfg.auto_resolve = auto_resolve;
        cfg.updated_at = now;
        Ok(cfg.clone())
    }
}

// `New` es un estado transitorio: como el CHECK de `error_events`, nunca se
// persiste.
fn persistable(state: EventState) -> Result<(), StoreError> {
    if state == EventState::New {
        return Err(StoreError::ConstraintViolation("event_state NEW cannot be stored".into()));
    }
    Ok(())
}

impl ApplicationConfigStore for InMemoryStore {
    fn insert(&self, config: NewApplicationConfig) -> Result<ApplicationConfig, StoreError> {
        config.validate()?;
        let mut t = self.tables()?;
        let key = config.natural_key();
        if t.configs.values().any(|c| c.natural_key() == key) {
            return Err(StoreError::ConstraintViolation(format!("duplicate natural key {key}")));
        }
        t.next_config_id += 1;
        let id = t.next_config_id;
        let now = t.tick();
        let saved = ApplicationConfig { config_id: id,
                                        business_unit: config.business_unit,
                                        application_name: config.application_name,
                                        environment: config.environment,
                                        auto_resolve: config.auto_resolve,
                                        git_remote_url: config.git_remote_url,
                                        lookup_branch_pattern: config.lookup_branch_pattern,
                                        filter_pii: config.filter_pii,
                                        notification_target: config.notification_target,
                                        issue_tracker_url: config.issue_tracker_url,
                                        app_info_url: config.app_info_url,
                                        monitoring_url: config.monitoring_url,
                                        created_at: now,
                                        updated_at: now };
        t.configs.insert(id, saved.clone());
        Ok(saved)
    }

    fn find_by_id(&self, id: ConfigId) -> Result<Option<ApplicationConfig>, StoreError> {
        Ok(self.tables()?.configs.get(&id).cloned())
    }

    fn find_by_business_unit(&self, business_unit: &str) -> Result<Vec<ApplicationConfig>, StoreError> {
        let t = self.tables()?;
        let mut out: Vec<ApplicationConfig> = t.configs.values().filter(|c| c.business_unit == business_unit).cloned().collect();
        out.sort_by(|a, b| (&a.application_name, &a.environment).cmp(&(&b.application_name, &b.environment)));
        Ok(out)
    }

    fn find_by_key(&self, key: &NaturalKey) -> Result<Option<ApplicationConfig>, StoreError> {
        Ok(self.tables()?.configs.values().find(|c| &c.natural_key() == key).cloned())
    }
}

impl ErrorEventStore for InMemoryStore {
    fn insert(&self, event: NewErrorEvent) -> Result<ErrorEvent, StoreError> {
        event.report.validate()?;
        persistable(event.state)?;
        let mut t = self.tables()?;
        if !t.configs.contains_key(&event.config_id) {
            return Err(StoreError::ConstraintViolation(format!("unknown config_id {}", event.config_id)));
        }
        t.next_event_id += 1;
        let id = t.next_event_id;
        let now = t.tick();
        let saved = ErrorEvent::from_new(id, event, now);
        t.events.insert(id, saved.clone());
        Ok(saved)
    }

    fn find_by_id(&self, id: EventId) -> Result<Option<ErrorEvent>, StoreError> {
        Ok(self.tables()?.events.get(&id).cloned())
    }

    fn find_by_business_unit(&self, business_unit: &str) -> Result<Vec<ErrorEvent>, StoreError> {
        let t = self.tables()?;
        let mut out: Vec<ErrorEvent> = t.events
                                        .values()
                                        .filter(|e| t.configs.get(&e.config_id).is_some_and(|c| c.business_unit == business_unit))
                                        .cloned()
                                        .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.event_id.cmp(&a.event_id)));
        Ok(out)
    }

    fn update_state(&self, id: EventId, new_state: EventState) -> Result<(), StoreError> {
        persistable(new_state)?;
        let mut t = self.tables()?;
        let now = t.tick();
        let ev = t.event_mut(id)?;
        ev.state = new_state;
        ev.updated_at = now;
        Ok(())
    }

    fn update_state_if(&self, id: EventId, expected: EventState, new_state: EventState) -> Result<bool, StoreError> {
        persistable(new_state)?;
        let mut t = self.tables()?;
        match t.events.get(&id) {
            Some(ev) if ev.state == expected => {}
            _ => return Ok(false),
        }
        let now = t.tick();
        let ev = t.event_mut(id)?;
        ev.state = new_state;
        ev.updated_at = now;
        Ok(true)
    }

    fn update_resolution(&self, id: EventId, resolution: &Resolution, new_state: EventState) -> Result<(), StoreError> {
        persistable(new_state)?;
        let mut t = self.tables()?;
        let now = t.tick();
        let ev = t.event_mut(id)?;
        ev.resolution = Some(resolution.text.clone());
        ev.confidence = Some(resolution.confidence);
        ev.pull_request_url = Some(resolution.pull_request_url.clone());
        ev.state = new_state;
        ev.updated_at = now;
        Ok(())
    }

    fn update_user_feedback(&self, id: EventId, acceptance: Option<ResolutionAcceptance>, feedback: Option<&str>) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        let now = t.tick();
        let ev = t.event_mut(id)?;
        ev.acceptance = acceptance;
        ev.user_feedback = feedback.map(str::to_string);
        ev.updated_at = now;
        Ok(())
    }

    fn update_affected_issues(&self, id: EventId, issue_ids: &[String]) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        let now = t.tick();
        let ev = t.event_mut(id)?;
        ev.affected_issues = split_issue_ids(&join_issue_ids(issue_ids).unwrap_or_default());
        ev.updated_at = now;
        Ok(())
    }
}
