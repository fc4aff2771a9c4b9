//! Estados del ciclo de vida de un `ErrorEvent` y aceptación de la resolución.
//!
//! La representación textual (`as_str`) es la que se persiste en la columna
//! `event_state`; cambiarla rompe filas existentes.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Estado de un evento de error.
///
/// `New` es transitorio: existe sólo mientras el gateway decide el estado
/// inicial y nunca se persiste.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventState {
    New,
    PendingApproval,
    Processing,
    Approved,
    Resolved,
    Rejected,
}

impl EventState {
    pub const ALL: [EventState; 6] = [EventState::New,
                                      EventState::PendingApproval,
                                      EventState::Processing,
                                      EventState::Approved,
                                      EventState::Resolved,
                                      EventState::Rejected];

    pub fn as_str(self) -> &'static str {
        match self {
            EventState::New => "NEW",
            EventState::PendingApproval => "PENDING_APPROVAL",
            EventState::Processing => "PROCESSING",
            EventState::Approved => "APPROVED",
            EventState::Resolved => "RESOLVED",
            EventState::Rejected => "REJECTED",
        }
    }

    /// Estados sin salida en la tabla de transiciones.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventState::Approved | EventState::Resolved | EventState::Rejected)
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventState::ALL.iter()
                       .copied()
                       .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
                       .ok_or_else(|| DomainError::UnknownState(s.to_string()))
    }
}

/// Valoración del usuario sobre la resolución propuesta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionAcceptance {
    Like,
    Dislike,
}

impl ResolutionAcceptance {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionAcceptance::Like => "LIKE",
            ResolutionAcceptance::Dislike => "DISLIKE",
        }
    }
}

impl fmt::Display for ResolutionAcceptance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionAcceptance {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIKE" => Ok(ResolutionAcceptance::Like),
            "DISLIKE" => Ok(ResolutionAcceptance::Dislike),
            _ => Err(DomainError::UnknownAcceptance(s.to_string())),
        }
    }
}
