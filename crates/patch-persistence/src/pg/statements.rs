//! Sentencias de escritura sobre `error_events`.
//!
//! Cada una actualiza `updated_ts` en la misma sentencia y devuelve el
//! número de filas afectadas; el llamador decide qué significa 0. Se
//! ejecutan sobre la conexión de una unidad de trabajo abierta, de modo que
//! varias pueden componerse en una sola transacción.

use diesel::dsl::now;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use patch_domain::error_event::join_issue_ids;
use patch_domain::{EventId, EventState, Resolution, ResolutionAcceptance};

use crate::error::PersistenceError;
use crate::schema::error_events;

pub fn set_state(conn: &mut PgConnection, id: EventId, new_state: EventState) -> Result<usize, PersistenceError> {
    Ok(diesel::update(error_events::table.find(id)).set((error_events::event_state.eq(new_state.as_str()),
                                                        error_events::updated_ts.eq(now)))
                                                   .execute(conn)?)
}

/// Escritura condicional: sólo afecta a la fila si su estado actual es
/// `expected`. Dos llamadas concurrentes con el mismo `expected` no pueden
/// afectar ambas a la fila.
pub fn set_state_if(conn: &mut PgConnection, id: EventId, expected: EventState, new_state: EventState)
                    -> Result<usize, PersistenceError> {
    Ok(diesel::update(error_events::table.find(id).filter(error_events::event_state.eq(expected.as_str())))
        .set((error_events::event_state.eq(new_state.as_str()), error_events::updated_ts.eq(now)))
        .execute(conn)?)
}

pub fn set_resolution(conn: &mut PgConnection, id: EventId, resolution: &Resolution, new_state: EventState)
                      -> Result<usize, PersistenceError> {
    Ok(diesel::update(error_events::table.find(id)).set((error_events::resolution.eq(&resolution.text),
                                                        error_events::confidence.eq(resolution.confidence),
                                                        error_events::pull_request_url.eq(&resolution.pull_request_url),
                                                        error_events::event_state.eq(new_state.as_str()),
                                                        error_events::updated_ts.eq(now)))
                                                   .execute(conn)?)
}

pub fn set_user_feedback(conn: &mut PgConnection, id: EventId, acceptance: Option<ResolutionAcceptance>, feedback: Option<&str>)
                         -> Result<usize, PersistenceError> {
    Ok(diesel::update(error_events::table.find(id)).set((error_events::resolution_acceptance_state.eq(acceptance.map(|a| a.as_str())),
                                                        error_events::user_feedback.eq(feedback),
                                                        error_events::updated_ts.eq(now)))
                                                   .execute(conn)?)
}

pub fn set_affected_issues(conn: &mut PgConnection, id: EventId, issue_ids: &[String]) -> Result<usize, PersistenceError> {
    Ok(diesel::update(error_events::table.find(id)).set((error_events::jira_ids.eq(join_issue_ids(issue_ids)),
                                                        error_events::updated_ts.eq(now)))
                                                   .execute(conn)?)
}
