//! Unidad de trabajo transaccional sobre una conexión prestada por el pool.
//!
//! `TransactionalCursor::run` es la única vía por la que los stores hacen
//! I/O: adquiere, abre la transacción, ejecuta el cierre, confirma si
//! devolvió `Ok` y revierte si devolvió `Err`, y devuelve la conexión al
//! pool en todos los casos (incluido un pánico dentro del cierre, en cuyo
//! caso la conexión se descarta en lugar de reciclarse).

use diesel::pg::PgConnection;
use log::{debug, error};
use r2d2::ManageConnection;

use crate::error::PersistenceError;
use crate::pool::ConnectionPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// Conexión capaz de ejecutar un cierre dentro de una transacción.
pub trait Transactional {
    fn in_transaction<T, E, F>(&mut self, mode: AccessMode, f: F) -> Result<T, E>
        where F: FnOnce(&mut Self) -> Result<T, E>,
              E: From<diesel::result::Error>;
}

impl Transactional for PgConnection {
    fn in_transaction<T, E, F>(&mut self, mode: AccessMode, f: F) -> Result<T, E>
        where F: FnOnce(&mut Self) -> Result<T, E>,
              E: From<diesel::result::Error>
    {
        match mode {
            AccessMode::ReadWrite => self.build_transaction().read_write().run(f),
            AccessMode::ReadOnly => self.build_transaction().read_only().run(f),
        }
    }
}

pub struct TransactionalCursor<'p, M: ManageConnection> {
    pool: &'p ConnectionPool<M>,
    operation: &'static str,
    mode: AccessMode,
}

impl<'p, M> TransactionalCursor<'p, M>
    where M: ManageConnection,
          M::Connection: Transactional
{
    pub fn new(pool: &'p ConnectionPool<M>, operation: &'static str) -> Self {
        Self { pool, operation, mode: AccessMode::ReadWrite }
    }

    /// Lecturas: misma disciplina de adquisición, transacción de solo lectura.
    pub fn read_only(pool: &'p ConnectionPool<M>, operation: &'static str) -> Self {
        Self { pool, operation, mode: AccessMode::ReadOnly }
    }

    pub fn run<T, F>(self, f: F) -> Result<T, PersistenceError>
        where F: FnOnce(&mut M::Connection) -> Result<T, PersistenceError>
    {
        let op = self.operation;
        debug!("{op}:begin mode={:?}", self.mode);
        let mut conn = self.pool.acquire()?;
        let outcome = conn.in_transaction(self.mode, f);
        self.pool.release(conn);
        match &outcome {
            Ok(_) => debug!("{op}:commit"),
            Err(e) => error!("{op}:rollback err={e}"),
        }
        outcome
    }
}
