//! Migraciones embebidas (`migrations/` de este crate).
//! Se ejecutan una sola vez, al construir el pool, si la configuración lo
//! habilita.

use crate::error::PersistenceError;
use diesel::pg::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn run_pending_migrations(conn: &mut PgConnection) -> Result<(), PersistenceError> {
    let applied = conn.run_pending_migrations(MIGRATIONS)
                      .map_err(|e| PersistenceError::Migration(e.to_string()))?;
    info!("migrations:done applied={}", applied.len());
    Ok(())
}
