//! Filas Diesel y su conversión a tipos de dominio.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use patch_domain::error_event::split_issue_ids;
use patch_domain::{ApplicationConfig, ErrorEvent, EventState, NewApplicationConfig, NewErrorEvent, ResolutionAcceptance};

use crate::error::PersistenceError;
use crate::schema::{error_events, lob_applications};

/// Fila de `lob_applications`. Los nombres de columna son los heredados del
/// esquema (`lob` = unidad de negocio, `notification_dls` = destino de
/// notificaciones, `jira_projects_url` = issue tracker, `app_dynamics_url`
/// = monitorización).
#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = lob_applications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ApplicationConfigRow {
    pub lob_app_id: i64,
    pub application_name: String,
    pub lob: String,
    pub auto_resolve: bool,
    pub environment: String,
    pub git_remote_url: String,
    pub lookup_branch_pattern: String,
    pub filter_pii: bool,
    pub notification_dls: String,
    pub app_info_actuator_url: Option<String>,
    pub jira_projects_url: Option<String>,
    pub app_dynamics_url: Option<String>,
    pub created_ts: DateTime<Utc>,
    pub updated_ts: DateTime<Utc>,
}

impl From<ApplicationConfigRow> for ApplicationConfig {
    fn from(row: ApplicationConfigRow) -> Self {
        ApplicationConfig { config_id: row.lob_app_id,
                            business_unit: row.lob,
                            application_name: row.application_name,
                            environment: row.environment,
                            auto_resolve: row.auto_resolve,
                            git_remote_url: row.git_remote_url,
                            lookup_branch_pattern: row.lookup_branch_pattern,
                            filter_pii: row.filter_pii,
                            notification_target: row.notification_dls,
                            issue_tracker_url: row.jira_projects_url,
                            app_info_url: row.app_info_actuator_url,
                            monitoring_url: row.app_dynamics_url,
                            created_at: row.created_ts,
                            updated_at: row.updated_ts }
    }
}

/// Inserción en `lob_applications`; id y timestamps los asigna la base.
#[derive(Insertable, Debug)]
#[diesel(table_name = lob_applications)]
pub struct NewApplicationRow<'a> {
    pub application_name: &'a str,
    pub lob: &'a str,
    pub auto_resolve: bool,
    pub environment: &'a str,
    pub git_remote_url: &'a str,
    pub lookup_branch_pattern: &'a str,
    pub filter_pii: bool,
    pub notification_dls: &'a str,
    pub app_info_actuator_url: Option<&'a str>,
    pub jira_projects_url: Option<&'a str>,
    pub app_dynamics_url: Option<&'a str>,
}

impl<'a> From<&'a NewApplicationConfig> for NewApplicationRow<'a> {
    fn from(c: &'a NewApplicationConfig) -> Self {
        NewApplicationRow { application_name: &c.application_name,
                            lob: &c.business_unit,
                            auto_resolve: c.auto_resolve,
                            environment: &c.environment,
                            git_remote_url: &c.git_remote_url,
                            lookup_branch_pattern: &c.lookup_branch_pattern,
                            filter_pii: c.filter_pii,
                            notification_dls: &c.notification_target,
                            app_info_actuator_url: c.app_info_url.as_deref(),
                            jira_projects_url: c.issue_tracker_url.as_deref(),
                            app_dynamics_url: c.monitoring_url.as_deref() }
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = error_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ErrorEventRow {
    pub event_id: i64,
    pub lob_app_id: i64,
    pub event_state: String,
    pub correlation_id: String,
    pub span_id: Option<String>,
    pub stacktrace: String,
    pub origin_method: String,
    pub origin_class: Option<String>,
    pub origin_line: Option<i32>,
    pub occurrence_count: i32,
    pub error_ts: DateTime<Utc>,
    pub resolution: Option<String>,
    pub confidence: Option<f64>,
    pub pull_request_url: Option<String>,
    pub resolution_acceptance_state: Option<String>,
    pub user_feedback: Option<String>,
    pub source_branch: Option<String>,
    pub jira_ids: Option<String>,
    pub created_ts: DateTime<Utc>,
    pub updated_ts: DateTime<Utc>,
}

impl TryFrom<ErrorEventRow> for ErrorEvent {
    type Error = PersistenceError;

    fn try_from(row: ErrorEventRow) -> Result<Self, Self::Error> {
        let state = EventState::from_str(&row.event_state).map_err(|e| {
                                                                 PersistenceError::Corrupt(format!("event {}: {e}", row.event_id))
                                                             })?;
        let acceptance = row.resolution_acceptance_state
                            .as_deref()
                            .map(ResolutionAcceptance::from_str)
                            .transpose()
                            .map_err(|e| PersistenceError::Corrupt(format!("event {}: {e}", row.event_id)))?;
        Ok(ErrorEvent { event_id: row.event_id,
                        config_id: row.lob_app_id,
                        state,
                        correlation_id: row.correlation_id,
                        span_id: row.span_id,
                        stack_trace: row.stacktrace,
                        origin_method: row.origin_method,
                        origin_class: row.origin_class,
                        origin_line: row.origin_line,
                        occurrence_count: row.occurrence_count,
                        error_timestamp: row.error_ts,
                        resolution: row.resolution,
                        confidence: row.confidence,
                        pull_request_url: row.pull_request_url,
                        acceptance,
                        user_feedback: row.user_feedback,
                        source_branch: row.source_branch,
                        affected_issues: row.jira_ids.as_deref().map(split_issue_ids).unwrap_or_default(),
                        created_at: row.created_ts,
                        updated_at: row.updated_ts })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = error_events)]
pub struct NewErrorEventRow<'a> {
    pub lob_app_id: i64,
    pub event_state: &'a str,
    pub correlation_id: &'a str,
    pub span_id: Option<&'a str>,
    pub stacktrace: &'a str,
    pub origin_method: &'a str,
    pub origin_class: Option<&'a str>,
    pub origin_line: Option<i32>,
    pub occurrence_count: i32,
    pub error_ts: DateTime<Utc>,
    pub source_branch: Option<&'a str>,
}

impl<'a> From<&'a NewErrorEvent> for NewErrorEventRow<'a> {
    fn from(e: &'a NewErrorEvent) -> Self {
        let r = &e.report;
        NewErrorEventRow { lob_app_id: e.config_id,
                           event_state: e.state.as_str(),
                           correlation_id: &r.correlation_id,
                           span_id: r.span_id.as_deref(),
                           stacktrace: &r.stack_trace,
                           origin_method: &r.origin_method,
                           origin_class: r.origin_class.as_deref(),
                           origin_line: r.origin_line,
                           occurrence_count: r.occurrence_count,
                           error_ts: r.error_timestamp,
                           source_branch: r.source_branch.as_deref() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(state: &str, acceptance: Option<&str>, jira: Option<&str>) -> ErrorEventRow {
        let ts = Utc::now();
        ErrorEventRow { event_id: 3,
                        lob_app_id: 1,
                        event_state: state.into(),
                        correlation_id: "c".into(),
                        span_id: None,
                        stacktrace: "t".into(),
                        origin_method: "m".into(),
                        origin_class: None,
                        origin_line: Some(42),
                        occurrence_count: 1,
                        error_ts: ts,
                        resolution: None,
                        confidence: None,
                        pull_request_url: None,
                        resolution_acceptance_state: acceptance.map(str::to_string),
                        user_feedback: None,
                        source_branch: None,
                        jira_ids: jira.map(str::to_string),
                        created_ts: ts,
                        updated_ts: ts }
    }

    #[test]
    fn row_maps_to_event() {
        let ev = ErrorEvent::try_from(row("PENDING_APPROVAL", Some("LIKE"), Some("OPS-1,OPS-2"))).expect("valid row");
        assert_eq!(ev.state, EventState::PendingApproval);
        assert_eq!(ev.acceptance, Some(ResolutionAcceptance::Like));
        assert_eq!(ev.affected_issues, vec!["OPS-1".to_string(), "OPS-2".to_string()]);
        assert_eq!(ev.origin_line, Some(42));
    }

    #[test]
    fn unknown_state_is_corrupt() {
        let err = ErrorEvent::try_from(row("ARCHIVED", None, None)).unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt(m) if m.contains("event 3")));
    }

    #[test]
    fn unknown_acceptance_is_corrupt() {
        assert!(matches!(ErrorEvent::try_from(row("RESOLVED", Some("MEH"), None)),
                         Err(PersistenceError::Corrupt(_))));
    }
}
