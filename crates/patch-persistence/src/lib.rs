//! patch-persistence
//!
//! Backend Postgres (Diesel + r2d2) de los stores de `patch-core`.
//!
//! Módulos:
//! - `pool`: pool de conexiones perezoso, compartido y con cierre explícito.
//! - `cursor`: unidad de trabajo transaccional (commit/rollback + devolución
//!   garantizada de la conexión).
//! - `pg`: `PgApplicationConfigStore` y `PgErrorEventStore`.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env / entorno.
//! - `schema`: tablas Diesel.

pub mod config;
pub mod cursor;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod pool;
pub mod schema;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{init_dotenv, DbConfig};
pub use cursor::{AccessMode, Transactional, TransactionalCursor};
pub use error::PersistenceError;
pub use pg::{PgApplicationConfigStore, PgErrorEventStore};
pub use pool::{shared_pool, shared_pool_from_env, ConnectionPool, PgConnectionPool, PoolSettings, PoolStats, PooledConn};
