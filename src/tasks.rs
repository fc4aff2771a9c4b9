//! Runner de trabajos en segundo plano sobre tokio.
//!
//! El procesamiento real (análisis y parche) aún no existe: cada trabajo
//! duerme por pasos y registra el progreso. Sin reintentos ni garantía de
//! entrega; el core no observa su finalización.
use log::info;
use patch_core::ProcessingQueue;
use patch_domain::EventId;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::JobConfig;

#[derive(Clone)]
pub struct TokioJobRunner {
    handle: Handle,
    config: JobConfig,
}

impl TokioJobRunner {
    pub fn new(handle: Handle, config: JobConfig) -> Self {
        Self { handle, config }
    }

    /// Lanza el trabajo y devuelve su handle (la cola lo descarta).
    pub fn spawn(&self, event_id: EventId) -> JoinHandle<u32> {
        self.handle.spawn(run_job(event_id, self.config))
    }
}

impl ProcessingQueue for TokioJobRunner {
    fn submit(&self, event_id: EventId) {
        info!("job:submitted event_id={event_id}");
        drop(self.spawn(event_id));
    }
}

/// Devuelve el número de pasos completados.
pub async fn run_job(event_id: EventId, config: JobConfig) -> u32 {
    info!("job:start event_id={event_id} steps={}", config.steps);
    for step in 1..=config.steps {
        tokio::time::sleep(config.step_delay).await;
        info!("job:step event_id={event_id} step={step}/{}", config.steps);
    }
    info!("job:done event_id={event_id}");
    config.steps
}
