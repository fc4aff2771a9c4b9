//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) y agrupa las secciones de base de datos y
//! del runner de trabajos en segundo plano.
use std::env;
use std::str::FromStr;
use std::time::Duration;

use patch_persistence::{DbConfig, PersistenceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
    #[error(transparent)]
    Database(#[from] PersistenceError),
}

/// Configuración global de la aplicación.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Conexión y pool.
    pub database: DbConfig,
    /// Trabajo de procesamiento (stub).
    pub jobs: JobConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self { database: DbConfig::from_env()?,
                  jobs: JobConfig::from_env()? })
    }
}

/// Parámetros del trabajo de procesamiento: duerme `steps` veces
/// `step_delay`, registrando cada paso.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobConfig {
    pub steps: u32,
    pub step_delay: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self { steps: 5,
               step_delay: Duration::from_millis(1000) }
    }
}

impl JobConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        patch_persistence::init_dotenv();
        let defaults = Self::default();
        Ok(Self { steps: env_or("JOB_STEPS", defaults.steps)?,
                  step_delay: Duration::from_millis(env_or("JOB_STEP_MILLIS", defaults.step_delay.as_millis() as u64)?) })
    }
}

fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_defaults() {
        let cfg = JobConfig::default();
        assert_eq!(cfg.steps, 5);
        assert_eq!(cfg.step_delay, Duration::from_secs(1));
    }

    #[test]
    fn invalid_value_names_the_variable() {
        let err = env_or::<u32>("PATCHFLOW_TEST_UNSET_VAR", 3).map(|v| v == 3);
        assert!(matches!(err, Ok(true)));
        let e = ConfigError::Invalid { name: "JOB_STEPS", value: "many".into() };
        assert_eq!(e.to_string(), "JOB_STEPS has an invalid value: many");
    }
}
