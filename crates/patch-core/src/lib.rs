//! patch-core: ciclo de vida de eventos de error.
//!
//! - `store`: contratos de acceso a datos (`ApplicationConfigStore`,
//!   `ErrorEventStore`) y una implementación en memoria.
//! - `workflow`: tabla de transiciones y `ErrorEventWorkflow`.
//! - `ingest`: `IngestionGateway` (config -> estado inicial -> insert -> cola).
//! - `queue`: punto de entrega al runner de trabajos en segundo plano.
pub mod errors;
pub mod ingest;
pub mod queue;
pub mod store;
pub mod workflow;

pub use errors::{StoreError, WorkflowError};
pub use ingest::{IngestOutcome, IngestionGateway};
pub use queue::{InMemoryQueue, ProcessingQueue};
pub use store::{ApplicationConfigStore, ErrorEventStore, InMemoryStore};
pub use workflow::{next_state, ErrorEventWorkflow, EventAction};
