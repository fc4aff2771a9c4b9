//! patch-domain
//!
//! Tipos de valor del dominio: configuración por aplicación
//! (`ApplicationConfig`), eventos de error (`ErrorEvent`) y su estado.
//! No conoce la base de datos ni el motor de workflow; sólo valida forma.
pub mod application;
pub mod error;
pub mod error_event;
pub mod state;

pub use application::{ApplicationConfig, ConfigId, NaturalKey, NewApplicationConfig, OnboardRequest, DEFAULT_BRANCH_PATTERN};
pub use error::DomainError;
pub use error_event::{ErrorEvent, ErrorReport, EventId, NewErrorEvent, Resolution};
pub use state::{EventState, ResolutionAcceptance};
