//! Carga de configuración de conexión desde variables de entorno.
//!
//! `DATABASE_URL` tiene prioridad; si falta se compone con `DB_HOST`,
//! `DB_PORT`, `DB_NAME`, `DB_USER` y `DB_PASSWORD`.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;
use crate::pool::PoolSettings;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(),
               min_connections: 1,
               max_connections: 10,
               connect_timeout: Duration::from_secs(30),
               run_migrations: true }
    }

    pub fn from_env() -> Result<Self, PersistenceError> {
        Lazy::force(&DOTENV_LOADED);
        let url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                let name = env::var("DB_NAME").map_err(|_| PersistenceError::Config("DATABASE_URL or DB_NAME must be set".into()))?;
                compose_url(&env::var("DB_HOST").unwrap_or_else(|_| "localhost".into()),
                            &env::var("DB_PORT").unwrap_or_else(|_| "5432".into()),
                            &name,
                            &env::var("DB_USER").unwrap_or_else(|_| "postgres".into()),
                            &env::var("DB_PASSWORD").unwrap_or_default())
            }
        };
        Ok(Self { url,
                  min_connections: env_or("DATABASE_MIN_CONNECTIONS", 1)?,
                  max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
                  connect_timeout: Duration::from_secs(env_or("DATABASE_CONNECT_TIMEOUT_SECS", 30)?),
                  run_migrations: env_or("DATABASE_RUN_MIGRATIONS", true)? })
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings::new(self.min_connections, self.max_connections).with_connect_timeout(self.connect_timeout)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, PersistenceError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| PersistenceError::Config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

pub fn compose_url(host: &str, port: &str, database: &str, user: &str, password: &str) -> String {
    if password.is_empty() {
        format!("postgres://{user}@{host}:{port}/{database}")
    } else {
        format!("postgres://{user}:{password}@{host}:{port}/{database}")
    }
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
