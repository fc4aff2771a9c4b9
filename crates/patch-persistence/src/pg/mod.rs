//! Implementaciones Postgres (Diesel) de los stores del core.
//!
//! - Toda operación pasa por `TransactionalCursor`: las lecturas en
//!   transacción de solo lectura, las escrituras en lectura-escritura.
//! - El mapeo filas ↔ dominio vive en `rows`; las sentencias de escritura en
//!   `statements` (reutilizables dentro de una misma unidad de trabajo).
//! - Los errores de Diesel se traducen a `PersistenceError` y de ahí a
//!   `StoreError` en la frontera del trait.

mod application_store;
mod event_store;
pub mod rows;
pub mod statements;

pub use application_store::PgApplicationConfigStore;
pub use event_store::PgErrorEventStore;
