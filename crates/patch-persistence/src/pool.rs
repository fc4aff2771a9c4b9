//! Pool de conexiones compartido por todo el proceso.
//!
//! - Construcción perezosa e idempotente: el primer `acquire()` construye el
//!   pool r2d2 bajo un `RwLock`; llamadas concurrentes esperan a esa única
//!   construcción. Después sólo se toma el lock de lectura para clonar el
//!   handle; el préstamo/devolución lo gestiona r2d2.
//! - `acquire()` espera mientras el pool esté ocupado y el backend responda;
//!   sólo falla con `PoolExhausted` cuando el driver no logra crear
//!   conexiones.
//! - Cada `acquire()` exitoso produce un `PooledConn` cuya destrucción es la
//!   devolución; `stats()` expone ambos contadores.
//! - `shutdown()` marca el pool como cerrado y suelta el pool r2d2: las
//!   conexiones inactivas se descartan, las prestadas se cierran al
//!   devolverse, la reposición de `min_idle` se detiene y todo `acquire()`
//!   posterior falla con `PoolClosed`.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use r2d2::{HandleError, ManageConnection};
use thiserror::Error;

use crate::config::DbConfig;
use crate::error::PersistenceError;

pub type PgConnectionPool = ConnectionPool<ConnectionManager<PgConnection>>;

/// Tamaños y timeout del pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    min_idle: u32,
    max_size: u32,
    connect_timeout: Duration,
}

impl PoolSettings {
    /// Valida y ajusta tamaños: ceros suben a 1 y si `min > max` se usa
    /// `min = max`.
    pub fn new(min_idle: u32, max_size: u32) -> Self {
        let validated_min = min_idle.max(1);
        let validated_max = max_size.max(1);
        if validated_min > validated_max {
            warn!("pool:settings min_idle > max_size ({validated_min} > {validated_max}), clamping min=max");
        }
        Self { min_idle: validated_min.min(validated_max),
               max_size: validated_max,
               connect_timeout: Duration::from_secs(30) }
    }

    /// Espera máxima de cada intento de checkout. Con el pool ocupado y el
    /// backend sano `acquire()` reintenta en lugar de fallar.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.connect_timeout = timeout;
        }
        self
    }

    pub fn min_idle(&self) -> u32 {
        self.min_idle
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }
}

/// Error del manager envuelto: el cierre del pool se reporta como fallo de
/// conexión/validación.
#[derive(Debug, Error)]
pub enum ManagerError<E: std::error::Error + 'static> {
    #[error("pool closed")]
    Closed,
    #[error("{0}")]
    Backend(E),
}

/// Manager que respeta la bandera de cierre compartida con el pool y anota
/// si el último intento de conexión contra el backend falló.
pub struct ClosableManager<M> {
    inner: M,
    closed: Arc<AtomicBool>,
    backend_down: Arc<AtomicBool>,
}

impl<M: ManageConnection> ManageConnection for ClosableManager<M> {
    type Connection = M::Connection;
    type Error = ManagerError<M::Error>;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ManagerError::Closed);
        }
        match self.inner.connect() {
            Ok(conn) => {
                self.backend_down.store(false, Ordering::Release);
                Ok(conn)
            }
            Err(e) => {
                self.backend_down.store(true, Ordering::Release);
                Err(ManagerError::Backend(e))
            }
        }
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ManagerError::Closed);
        }
        self.inner.is_valid(conn).map_err(ManagerError::Backend)
    }

    // Conexiones devueltas tras el cierre, o dentro de una transacción rota
    // (pánico a mitad de una unidad de trabajo), no se reciclan.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        self.closed.load(Ordering::Acquire) || self.inner.has_broken(conn)
    }
}

/// Los rechazos por cierre son esperables durante el apagado; sólo los
/// fallos del backend se reportan como error.
#[derive(Debug)]
struct LogErrorHandler;

impl<E: std::error::Error + 'static> HandleError<ManagerError<E>> for LogErrorHandler {
    fn handle_error(&self, err: ManagerError<E>) {
        match err {
            ManagerError::Closed => debug!("pool:connect skipped, pool closed"),
            ManagerError::Backend(e) => error!("pool:connect failed: {e}"),
        }
    }
}

#[derive(Default)]
struct Counters {
    constructions: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl Counters {
    fn in_use(&self) -> u64 {
        let acquired = self.acquired.load(Ordering::Acquire);
        acquired.saturating_sub(self.released.load(Ordering::Acquire))
    }
}

/// Foto de los contadores del pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub constructions: u64,
    pub acquired: u64,
    pub released: u64,
    pub connections: u32,
    pub idle_connections: u32,
    pub closed: bool,
}

type ManagerFactory<M> = Box<dyn Fn() -> M + Send + Sync>;
type Initializer<C> = Box<dyn Fn(&mut C) -> Result<(), PersistenceError> + Send + Sync>;

pub struct ConnectionPool<M: ManageConnection> {
    settings: PoolSettings,
    factory: ManagerFactory<M>,
    initializer: Option<Initializer<M::Connection>>,
    pool: RwLock<Option<r2d2::Pool<ClosableManager<M>>>>,
    closed: Arc<AtomicBool>,
    backend_down: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl<M: ManageConnection> ConnectionPool<M> {
    /// No abre conexiones: eso ocurre en el primer `acquire()`.
    pub fn new<F>(settings: PoolSettings, factory: F) -> Self
        where F: Fn() -> M + Send + Sync + 'static
    {
        Self { settings,
               factory: Box::new(factory),
               initializer: None,
               pool: RwLock::new(None),
               closed: Arc::new(AtomicBool::new(false)),
               backend_down: Arc::new(AtomicBool::new(false)),
               counters: Arc::new(Counters::default()) }
    }

    /// Hook que corre una vez sobre la primera conexión tras construir el
    /// pool (p. ej. migraciones). Si falla, la construcción falla y el
    /// siguiente `acquire()` lo reintenta.
    pub fn with_initializer<F>(mut self, init: F) -> Self
        where F: Fn(&mut M::Connection) -> Result<(), PersistenceError> + Send + Sync + 'static
    {
        self.initializer = Some(Box::new(init));
        self
    }

    pub fn settings(&self) -> PoolSettings {
        self.settings
    }

    /// Bloquea hasta que haya conexión libre. Si vence el timeout de
    /// checkout con conexiones prestadas y el backend respondiendo, vuelve a
    /// esperar.
    ///
    /// Errores:
    /// - `PoolClosed` tras `shutdown()`.
    /// - `PoolExhausted` si el driver no logra crear conexiones.
    pub fn acquire(&self) -> Result<PooledConn<M>, PersistenceError> {
        let pool = self.handle()?;
        loop {
            match pool.get() {
                Ok(conn) => {
                    self.counters.acquired.fetch_add(1, Ordering::AcqRel);
                    return Ok(PooledConn { conn, counters: Arc::clone(&self.counters) });
                }
                Err(_) if self.closed.load(Ordering::Acquire) => return Err(PersistenceError::PoolClosed),
                Err(e) if self.is_busy() => {
                    debug!("pool:busy in_use={} ({e}), waiting again", self.counters.in_use());
                }
                Err(e) => return Err(PersistenceError::PoolExhausted(format!("pool get: {e}"))),
            }
        }
    }

    /// Devuelve la conexión. Equivale a soltar el `PooledConn`.
    pub fn release(&self, conn: PooledConn<M>) {
        drop(conn);
    }

    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let taken = self.pool.write().unwrap_or_else(PoisonError::into_inner).take();
        match taken {
            Some(pool) => {
                // Con el pool cerrado cada conexión inactiva falla la
                // validación de checkout y r2d2 la descarta.
                let idle = pool.state().idle_connections;
                for _ in 0..=idle {
                    match pool.try_get() {
                        Some(conn) => drop(conn),
                        None => break,
                    }
                }
                let state = pool.state();
                info!("pool:shutdown connections={} idle={} in_use={}",
                      state.connections,
                      state.idle_connections,
                      self.counters.in_use());
                // Las conexiones prestadas retienen el pool r2d2 hasta
                // devolverse; con el último handle se detienen sus tareas.
                drop(pool);
            }
            None => info!("pool:shutdown (never constructed)"),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let (connections, idle_connections) = self.pool
                                                  .read()
                                                  .unwrap_or_else(PoisonError::into_inner)
                                                  .as_ref()
                                                  .map(|p| {
                                                      let s = p.state();
                                                      (s.connections, s.idle_connections)
                                                  })
                                                  .unwrap_or((0, 0));
        PoolStats { constructions: self.counters.constructions.load(Ordering::Acquire),
                    acquired: self.counters.acquired.load(Ordering::Acquire),
                    released: self.counters.released.load(Ordering::Acquire),
                    connections,
                    idle_connections,
                    closed: self.is_closed() }
    }

    fn is_busy(&self) -> bool {
        self.counters.in_use() > 0 && !self.backend_down.load(Ordering::Acquire)
    }

    /// Handle del pool r2d2, construyéndolo la primera vez.
    fn handle(&self) -> Result<r2d2::Pool<ClosableManager<M>>, PersistenceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PersistenceError::PoolClosed);
        }
        if let Some(pool) = self.pool.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(pool.clone());
        }
        let mut slot = self.pool.write().unwrap_or_else(PoisonError::into_inner);
        // `shutdown()` pudo ganar el lock de escritura antes que nosotros.
        if self.closed.load(Ordering::Acquire) {
            return Err(PersistenceError::PoolClosed);
        }
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }
        let pool = self.construct()?;
        *slot = Some(pool.clone());
        Ok(pool)
    }

    fn construct(&self) -> Result<r2d2::Pool<ClosableManager<M>>, PersistenceError> {
        debug!("pool:construct min_idle={} max_size={}", self.settings.min_idle, self.settings.max_size);
        let manager = ClosableManager { inner: (self.factory)(),
                                        closed: Arc::clone(&self.closed),
                                        backend_down: Arc::clone(&self.backend_down) };
        let pool = r2d2::Pool::builder().min_idle(Some(self.settings.min_idle))
                                        .max_size(self.settings.max_size)
                                        .connection_timeout(self.settings.connect_timeout)
                                        .test_on_check_out(true)
                                        .error_handler(Box::new(LogErrorHandler))
                                        .build(manager)
                                        .map_err(|e| PersistenceError::PoolExhausted(format!("pool build: {e}")))?;
        if let Some(init) = &self.initializer {
            let mut conn = pool.get()
                               .map_err(|e| PersistenceError::PoolExhausted(format!("pool get for initializer: {e}")))?;
            init(&mut conn)?;
        }
        self.counters.constructions.fetch_add(1, Ordering::AcqRel);
        info!("pool:constructed min_idle={} max_size={}", self.settings.min_idle, self.settings.max_size);
        Ok(pool)
    }
}

impl PgConnectionPool {
    /// Pool Postgres perezoso; corre las migraciones embebidas al
    /// construirse si `cfg.run_migrations`.
    pub fn postgres(cfg: &DbConfig) -> Self {
        let url = cfg.url.clone();
        let pool = ConnectionPool::new(cfg.pool_settings(), move || ConnectionManager::<PgConnection>::new(url.clone()));
        if cfg.run_migrations {
            pool.with_initializer(crate::migrations::run_pending_migrations)
        } else {
            pool
        }
    }
}

static SHARED: OnceCell<Arc<PgConnectionPool>> = OnceCell::new();

/// Pool único del proceso. La primera llamada fija la configuración; las
/// siguientes devuelven la misma instancia e ignoran `cfg`.
pub fn shared_pool(cfg: &DbConfig) -> Arc<PgConnectionPool> {
    Arc::clone(SHARED.get_or_init(|| {
                         info!("pool:shared registered max_size={}", cfg.pool_settings().max_size());
                         Arc::new(PgConnectionPool::postgres(cfg))
                     }))
}

/// `shared_pool` configurado desde el entorno.
pub fn shared_pool_from_env() -> Result<Arc<PgConnectionPool>, PersistenceError> {
    if let Some(pool) = SHARED.get() {
        return Ok(Arc::clone(pool));
    }
    let cfg = DbConfig::from_env()?;
    Ok(shared_pool(&cfg))
}

/// Conexión prestada. Soltarla la devuelve al pool (en cualquier salida:
/// retorno normal, error o pánico).
pub struct PooledConn<M: ManageConnection> {
    conn: r2d2::PooledConnection<ClosableManager<M>>,
    counters: Arc<Counters>,
}

impl<M: ManageConnection> Deref for PooledConn<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<M: ManageConnection> DerefMut for PooledConn<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl<M: ManageConnection> Drop for PooledConn<M> {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingManager, FakeManager};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Instant;

    fn fake_pool(min: u32, max: u32) -> (Arc<ConnectionPool<FakeManager>>, FakeManager) {
        let manager = FakeManager::default();
        let m = manager.clone();
        let pool = ConnectionPool::new(PoolSettings::new(min, max).with_connect_timeout(Duration::from_secs(5)), move || m.clone());
        (Arc::new(pool), manager)
    }

    #[test]
    fn settings_are_validated() {
        let s = PoolSettings::new(0, 0);
        assert_eq!((s.min_idle(), s.max_size()), (1, 1));
        let s = PoolSettings::new(8, 2);
        assert_eq!((s.min_idle(), s.max_size()), (2, 2));
    }

    #[test]
    fn construction_is_lazy() {
        let (pool, manager) = fake_pool(1, 2);
        assert_eq!(pool.stats().constructions, 0);
        assert_eq!(manager.opened(), 0);
        let conn = pool.acquire().expect("conn");
        pool.release(conn);
        assert_eq!(pool.stats().constructions, 1);
        assert!(manager.opened() >= 1);
    }

    #[test]
    fn concurrent_first_use_constructs_exactly_one_pool() {
        let (pool, _) = fake_pool(1, 4);
        let n = 16;
        let barrier = Arc::new(Barrier::new(n));
        let handles: Vec<_> = (0..n).map(|_| {
                                        let pool = Arc::clone(&pool);
                                        let barrier = Arc::clone(&barrier);
                                        thread::spawn(move || {
                                            barrier.wait();
                                            let conn = pool.acquire()?;
                                            thread::sleep(Duration::from_millis(5));
                                            pool.release(conn);
                                            Ok::<(), PersistenceError>(())
                                        })
                                    })
                                    .collect();
        for h in handles {
            h.join().expect("thread").expect("acquire");
        }
        let stats = pool.stats();
        assert_eq!(stats.constructions, 1);
        assert_eq!(stats.acquired, n as u64);
        assert_eq!(stats.acquired, stats.released);
        assert!(stats.connections <= 4);
    }

    #[test]
    fn release_happens_on_panic() {
        let (pool, _) = fake_pool(1, 1);
        let p = Arc::clone(&pool);
        let res = thread::spawn(move || {
                      let _conn = p.acquire().expect("conn");
                      panic!("handler aborted mid-flight");
                  }).join();
        assert!(res.is_err());
        let stats = pool.stats();
        assert_eq!(stats.acquired, 1);
        assert_eq!(stats.released, 1);
        // un pool de tamaño 1 sigue entregando conexiones
        let conn = pool.acquire().expect("conn after panic");
        pool.release(conn);
    }

    #[test]
    fn shutdown_drains_and_rejects_new_acquires() {
        let (pool, manager) = fake_pool(2, 4);
        let held = pool.acquire().expect("conn");
        let idle = pool.acquire().expect("conn");
        pool.release(idle);

        pool.shutdown();
        assert!(pool.is_closed());
        assert!(matches!(pool.acquire(), Err(PersistenceError::PoolClosed)));
        assert_eq!(pool.stats().idle_connections, 0);

        // la conexión prestada se cierra al devolverse
        pool.release(held);
        let stats = pool.stats();
        assert_eq!(stats.idle_connections, 0);
        assert!(manager.closed() >= 2);
        assert_eq!(stats.acquired, stats.released);
    }

    #[test]
    fn busy_pool_waits_past_checkout_timeout() {
        let manager = FakeManager::default();
        let m = manager.clone();
        let pool = Arc::new(ConnectionPool::new(PoolSettings::new(1, 1).with_connect_timeout(Duration::from_millis(200)),
                                                move || m.clone()));
        let held = pool.acquire().expect("conn");

        let p = Arc::clone(&pool);
        let waiter = thread::spawn(move || {
                         let conn = p.acquire()?;
                         p.release(conn);
                         Ok::<(), PersistenceError>(())
                     });
        thread::sleep(Duration::from_millis(500));
        assert!(!waiter.is_finished());
        pool.release(held);

        waiter.join().expect("thread").expect("acquire after release");
        let stats = pool.stats();
        assert_eq!(stats.acquired, 2);
        assert_eq!(stats.acquired, stats.released);
        assert_eq!(manager.opened(), 1);
    }

    #[test]
    fn shutdown_stops_background_work() {
        let manager = FakeManager::default();
        let m = manager.clone();
        let pool = ConnectionPool::new(PoolSettings::new(2, 4).with_connect_timeout(Duration::from_millis(200)),
                                       move || m.clone());
        let held = pool.acquire().expect("conn");
        let other = pool.acquire().expect("conn");
        pool.release(other);
        // el de la prueba, el de la factoría y el del pool r2d2
        assert_eq!(manager.instances(), 3);

        pool.shutdown();
        pool.release(held);

        // Soltada la última conexión, el pool r2d2 se destruye con su manager.
        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.instances() > 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(manager.instances(), 2);
        assert_eq!(manager.opened(), manager.closed());

        let opened = manager.opened();
        thread::sleep(Duration::from_millis(300));
        assert_eq!(manager.opened(), opened);
        let stats = pool.stats();
        assert_eq!((stats.connections, stats.idle_connections), (0, 0));
        assert!(matches!(pool.acquire(), Err(PersistenceError::PoolClosed)));
    }

    #[test]
    fn shared_pool_is_one_instance_per_process() {
        let cfg = DbConfig::new("postgres://localhost/unused");
        let n = 8;
        let barrier = Arc::new(Barrier::new(n));
        let handles: Vec<_> = (0..n).map(|_| {
                                        let cfg = cfg.clone();
                                        let barrier = Arc::clone(&barrier);
                                        thread::spawn(move || {
                                            barrier.wait();
                                            shared_pool(&cfg)
                                        })
                                    })
                                    .collect();
        let pools: Vec<_> = handles.into_iter().map(|h| h.join().expect("thread")).collect();
        assert!(pools.iter().all(|p| Arc::ptr_eq(p, &pools[0])));
        assert!(Arc::ptr_eq(&pools[0], &shared_pool_from_env().expect("already registered")));
        // perezoso: nadie pidió conexión todavía
        assert_eq!(pools[0].stats().constructions, 0);
    }

    #[test]
    fn shutdown_before_first_use() {
        let (pool, manager) = fake_pool(1, 1);
        pool.shutdown();
        assert!(matches!(pool.acquire(), Err(PersistenceError::PoolClosed)));
        assert_eq!(pool.stats().constructions, 0);
        assert_eq!(manager.opened(), 0);
    }

    #[test]
    fn unreachable_backend_is_pool_exhausted_and_retried_later() {
        let pool = ConnectionPool::new(PoolSettings::new(1, 1).with_connect_timeout(Duration::from_millis(100)),
                                       || FailingManager);
        assert!(matches!(pool.acquire(), Err(PersistenceError::PoolExhausted(_))));
        assert!(matches!(pool.acquire(), Err(PersistenceError::PoolExhausted(_))));
        assert_eq!(pool.stats().constructions, 0);
    }

    #[test]
    fn initializer_runs_once() {
        let manager = FakeManager::default();
        let runs = Arc::new(AtomicU64::new(0));
        let r = Arc::clone(&runs);
        let m = manager.clone();
        let pool = ConnectionPool::new(PoolSettings::new(1, 2), move || m.clone()).with_initializer(move |_conn| {
                                                                                        r.fetch_add(1, Ordering::AcqRel);
                                                                                        Ok(())
                                                                                    });
        for _ in 0..3 {
            let c = pool.acquire().expect("conn");
            pool.release(c);
        }
        assert_eq!(runs.load(Ordering::Acquire), 1);
    }
}
