//! patchflow
//!
//! Cableado de la aplicación: configuración, runner de trabajos y fachada de
//! servicio sobre los stores Postgres de `patch-persistence`.

pub mod config;
pub mod service;
pub mod tasks;

use std::sync::Arc;

use patch_persistence::{shared_pool, PgApplicationConfigStore, PgConnectionPool, PgErrorEventStore};
use tokio::runtime::Handle;

pub use config::{AppConfig, ConfigError, JobConfig};
pub use service::{ApplicationService, ErrorEventService, Reply};
pub use tasks::TokioJobRunner;

pub type PgEventService = ErrorEventService<PgApplicationConfigStore, PgErrorEventStore, TokioJobRunner>;

/// Servicios listos para usar sobre un único pool compartido.
pub struct Services {
    pub pool: Arc<PgConnectionPool>,
    pub applications: ApplicationService<PgApplicationConfigStore>,
    pub events: PgEventService,
}

impl Services {
    /// Usa el pool único del proceso (la primera configuración registrada
    /// gana). No abre conexiones: el pool se construye en la primera
    /// operación.
    pub fn postgres(cfg: &AppConfig, handle: Handle) -> Self {
        let pool = shared_pool(&cfg.database);
        let configs = PgApplicationConfigStore::new(Arc::clone(&pool));
        let events = PgErrorEventStore::new(Arc::clone(&pool));
        let runner = TokioJobRunner::new(handle, cfg.jobs);
        Self { applications: ApplicationService::new(configs.clone()),
               events: ErrorEventService::new(configs, events, runner),
               pool }
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}
