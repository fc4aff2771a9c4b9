//! Dobles de prueba para el pool y el cursor: un manager r2d2 sin base de
//! datos que cuenta aperturas/cierres y registra transacciones.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use r2d2::ManageConnection;

use crate::cursor::{AccessMode, Transactional};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxEvent {
    Begin(AccessMode),
    Commit,
    Rollback,
}

#[derive(Clone, Default)]
pub struct FakeManager {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<TxEvent>>>,
    alive: Arc<()>,
}

impl FakeManager {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Acquire)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::Acquire)
    }

    /// Clones vivos de este manager (incluido el que lo consulta).
    pub fn instances(&self) -> usize {
        Arc::strong_count(&self.alive)
    }

    pub fn tx_log(&self) -> Vec<TxEvent> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

pub struct FakeConn {
    closed: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<TxEvent>>>,
    in_tx: AtomicBool,
}

impl FakeConn {
    fn record(&self, ev: TxEvent) {
        if let Ok(mut l) = self.log.lock() {
            l.push(ev);
        }
    }
}

impl Drop for FakeConn {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::AcqRel);
    }
}

impl Transactional for FakeConn {
    fn in_transaction<T, E, F>(&mut self, mode: AccessMode, f: F) -> Result<T, E>
        where F: FnOnce(&mut Self) -> Result<T, E>,
              E: From<diesel::result::Error>
    {
        self.record(TxEvent::Begin(mode));
        self.in_tx.store(true, Ordering::Release);
        let out = f(self);
        self.record(if out.is_ok() { TxEvent::Commit } else { TxEvent::Rollback });
        self.in_tx.store(false, Ordering::Release);
        out
    }
}

impl ManageConnection for FakeManager {
    type Connection = FakeConn;
    type Error = io::Error;

    fn connect(&self) -> Result<FakeConn, io::Error> {
        self.opened.fetch_add(1, Ordering::AcqRel);
        Ok(FakeConn { closed: Arc::clone(&self.closed),
                      log: Arc::clone(&self.log),
                      in_tx: AtomicBool::new(false) })
    }

    fn is_valid(&self, _conn: &mut FakeConn) -> Result<(), io::Error> {
        Ok(())
    }

    // Como el manager de diesel: una conexión devuelta a mitad de
    // transacción (pánico dentro del cierre) no se recicla.
    fn has_broken(&self, conn: &mut FakeConn) -> bool {
        conn.in_tx.load(Ordering::Acquire)
    }
}

/// Manager cuyo backend nunca acepta conexiones.
pub struct FailingManager;

impl ManageConnection for FailingManager {
    type Connection = FakeConn;
    type Error = io::Error;

    fn connect(&self) -> Result<FakeConn, io::Error> {
        Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
    }

    fn is_valid(&self, _conn: &mut FakeConn) -> Result<(), io::Error> {
        Ok(())
    }

    fn has_broken(&self, _conn: &mut FakeConn) -> bool {
        true
    }
}
