//! Contratos de acceso a datos.
//!
//! Todas las lecturas devuelven valores materializados; ningún cursor
//! perezoso cruza esta frontera. Las escrituras son atómicas: o se aplican
//! completas (incluido el `updated_at`) o no se aplican.
mod memory;

pub use memory::InMemoryStore;

use patch_domain::{ApplicationConfig, ConfigId, ErrorEvent, EventId, EventState, NaturalKey, NewApplicationConfig, NewErrorEvent,
                   Resolution, ResolutionAcceptance};

use crate::errors::StoreError;

/// CRUD de configuraciones por aplicación (`lob_applications`).
pub trait ApplicationConfigStore: Send + Sync {
    /// Inserta y asigna id y timestamps. `ConstraintViolation` si la clave
    /// natural ya existe o falta un campo obligatorio.
    fn insert(&self, config: NewApplicationConfig) -> Result<ApplicationConfig, StoreError>;
    fn find_by_id(&self, id: ConfigId) -> Result<Option<ApplicationConfig>, StoreError>;
    /// Ordenado por nombre de aplicación y luego entorno.
    fn find_by_business_unit(&self, business_unit: &str) -> Result<Vec<ApplicationConfig>, StoreError>;
    /// Coincidencia exacta sobre la clave natural.
    fn find_by_key(&self, key: &NaturalKey) -> Result<Option<ApplicationConfig>, StoreError>;
}

/// CRUD y primitivas de estado de `error_events`.
///
/// La legalidad de las transiciones no se valida aquí; es responsabilidad de
/// `ErrorEventWorkflow`.
pub trait ErrorEventStore: Send + Sync {
    /// Inserta con `config_id` y estado ya decididos por el llamador.
    fn insert(&self, event: NewErrorEvent) -> Result<ErrorEvent, StoreError>;
    fn find_by_id(&self, id: EventId) -> Result<Option<ErrorEvent>, StoreError>;
    /// Join con la configuración dueña; más recientes primero.
    fn find_by_business_unit(&self, business_unit: &str) -> Result<Vec<ErrorEvent>, StoreError>;
    /// Escritura incondicional de estado. `NotFound` si no hay fila.
    fn update_state(&self, id: EventId, new_state: EventState) -> Result<(), StoreError>;
    /// Escribe `new_state` sólo si el estado actual es `expected`.
    /// Devuelve `false` si ninguna fila cumplió la condición.
    fn update_state_if(&self, id: EventId, expected: EventState, new_state: EventState) -> Result<bool, StoreError>;
    fn update_resolution(&self, id: EventId, resolution: &Resolution, new_state: EventState) -> Result<(), StoreError>;
    fn update_user_feedback(&self, id: EventId, acceptance: Option<ResolutionAcceptance>, feedback: Option<&str>) -> Result<(), StoreError>;
    fn update_affected_issues(&self, id: EventId, issue_ids: &[String]) -> Result<(), StoreError>;
}
