use std::sync::Arc;

use diesel::prelude::*;
use log::{debug, info, warn};
use patch_core::{ErrorEventStore, StoreError};
use patch_domain::{ErrorEvent, EventId, EventState, NewErrorEvent, Resolution, ResolutionAcceptance};

use super::rows::{ErrorEventRow, NewErrorEventRow};
use super::statements;
use crate::cursor::TransactionalCursor;
use crate::error::PersistenceError;
use crate::pool::PgConnectionPool;
use crate::schema::{error_events, lob_applications};

/// `ErrorEventStore` sobre `error_events` (join con `lob_applications` para
/// los listados por unidad de negocio).
#[derive(Clone)]
pub struct PgErrorEventStore {
    pool: Arc<PgConnectionPool>,
}

impl PgErrorEventStore {
    pub fn new(pool: Arc<PgConnectionPool>) -> Self {
        Self { pool }
    }

    /// Ejecuta una sentencia de actualización; 0 filas = el evento no existe.
    fn update<F>(&self, operation: &'static str, id: EventId, stmt: F) -> Result<(), StoreError>
        where F: FnOnce(&mut PgConnection) -> Result<usize, PersistenceError>
    {
        let affected = TransactionalCursor::new(&self.pool, operation).run(stmt)?;
        if affected == 0 {
            warn!("{operation}:not_found event_id={id}");
            return Err(StoreError::NotFound { entity: "error_event", id });
        }
        info!("{operation}:done event_id={id}");
        Ok(())
    }
}

impl ErrorEventStore for PgErrorEventStore {
    fn insert(&self, event: NewErrorEvent) -> Result<ErrorEvent, StoreError> {
        event.report.validate()?;
        let row: ErrorEventRow = TransactionalCursor::new(&self.pool, "insert_event").run(|conn| {
                                     Ok(diesel::insert_into(error_events::table)
                                         .values(NewErrorEventRow::from(&event))
                                         .returning(ErrorEventRow::as_returning())
                                         .get_result(conn)?)
                                 })?;
        info!("insert_event:done event_id={} config_id={} state={}", row.event_id, row.lob_app_id, row.event_state);
        Ok(ErrorEvent::try_from(row)?)
    }

    fn find_by_id(&self, id: EventId) -> Result<Option<ErrorEvent>, StoreError> {
        let row = TransactionalCursor::read_only(&self.pool, "find_event_by_id").run(|conn| {
                      error_events::table.find(id)
                                         .select(ErrorEventRow::as_select())
                                         .first(conn)
                                         .optional()
                                         .map_err(PersistenceError::from)
                  })?;
        Ok(row.map(ErrorEvent::try_from).transpose()?)
    }

    fn find_by_business_unit(&self, business_unit: &str) -> Result<Vec<ErrorEvent>, StoreError> {
        let rows: Vec<ErrorEventRow> =
            TransactionalCursor::read_only(&self.pool, "find_events_by_unit").run(|conn| {
                Ok(error_events::table.inner_join(lob_applications::table)
                                      .filter(lob_applications::lob.eq(business_unit))
                                      .order((error_events::created_ts.desc(), error_events::event_id.desc()))
                                      .select(ErrorEventRow::as_select())
                                      .load(conn)?)
            })?;
        debug!("find_events_by_unit:done unit={business_unit} count={}", rows.len());
        rows.into_iter()
            .map(|r| ErrorEvent::try_from(r).map_err(StoreError::from))
            .collect()
    }

    fn update_state(&self, id: EventId, new_state: EventState) -> Result<(), StoreError> {
        self.update("update_state", id, |conn| statements::set_state(conn, id, new_state))
    }

    fn update_state_if(&self, id: EventId, expected: EventState, new_state: EventState) -> Result<bool, StoreError> {
        let affected = TransactionalCursor::new(&self.pool, "update_state_if").run(|conn| {
                           statements::set_state_if(conn, id, expected, new_state)
                       })?;
        debug!("update_state_if:done event_id={id} expected={expected} new={new_state} applied={}", affected > 0);
        Ok(affected > 0)
    }

    fn update_resolution(&self, id: EventId, resolution: &Resolution, new_state: EventState) -> Result<(), StoreError> {
        self.update("update_resolution", id, |conn| statements::set_resolution(conn, id, resolution, new_state))
    }

    fn update_user_feedback(&self, id: EventId, acceptance: Option<ResolutionAcceptance>, feedback: Option<&str>) -> Result<(), StoreError> {
        self.update("update_user_feedback", id, |conn| statements::set_user_feedback(conn, id, acceptance, feedback))
    }

    fn update_affected_issues(&self, id: EventId, issue_ids: &[String]) -> Result<(), StoreError> {
        self.update("update_affected_issues", id, |conn| statements::set_affected_issues(conn, id, issue_ids))
    }
}
