//! Configuración por (unidad de negocio, aplicación, entorno).
//!
//! Es dato de referencia casi append-only: se crea en el onboarding y el core
//! no lo modifica después. La terna (`business_unit`, `application_name`,
//! `environment`) es la clave natural y debe ser única.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DomainError;

pub type ConfigId = i64;

/// Patrón de rama usado cuando el onboarding no indica uno.
pub const DEFAULT_BRANCH_PATTERN: &str = "LATEST_RELEASE";

/// Clave natural de una configuración.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub business_unit: String,
    pub application_name: String,
    pub environment: String,
}

impl NaturalKey {
    pub fn new(business_unit: impl Into<String>, application_name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self { business_unit: business_unit.into(),
               application_name: application_name.into(),
               environment: environment.into() }
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.business_unit, self.application_name, self.environment)
    }
}

/// Configuración persistida (fila de `lob_applications`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub config_id: ConfigId,
    pub business_unit: String,
    pub application_name: String,
    pub environment: String,
    pub auto_resolve: bool,
    pub git_remote_url: String,
    pub lookup_branch_pattern: String,
    pub filter_pii: bool,
    pub notification_target: String,
    pub issue_tracker_url: Option<String>,
    pub app_info_url: Option<String>,
    pub monitoring_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationConfig {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.business_unit, &self.application_name, &self.environment)
    }
}

/// Configuración aún no persistida; el store asigna id y timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewApplicationConfig {
    pub business_unit: String,
    pub application_name: String,
    pub environment: String,
    pub auto_resolve: bool,
    pub git_remote_url: String,
    pub lookup_branch_pattern: String,
    pub filter_pii: bool,
    pub notification_target: String,
    pub issue_tracker_url: Option<String>,
    pub app_info_url: Option<String>,
    pub monitoring_url: Option<String>,
}

impl NewApplicationConfig {
    /// Construye una configuración con los valores por defecto del onboarding.
    pub fn new(key: NaturalKey, git_remote_url: impl Into<String>, notification_target: impl Into<String>) -> Self {
        Self { business_unit: key.business_unit,
               application_name: key.application_name,
               environment: key.environment,
               auto_resolve: true,
               git_remote_url: git_remote_url.into(),
               lookup_branch_pattern: DEFAULT_BRANCH_PATTERN.to_string(),
               filter_pii: false,
               notification_target: notification_target.into(),
               issue_tracker_url: None,
               app_info_url: None,
               monitoring_url: None }
    }

    pub fn with_auto_resolve(mut self, auto_resolve: bool) -> Self {
        self.auto_resolve = auto_resolve;
        self
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.business_unit, &self.application_name, &self.environment)
    }

    /// Verifica campos obligatorios (equivalente a NOT NULL en el esquema).
    ///
    /// # Errores
    /// `DomainError::Validation` con el nombre del primer campo vacío.
    pub fn validate(&self) -> Result<(), DomainError> {
        let required = [("business_unit", &self.business_unit),
                        ("application_name", &self.application_name),
                        ("environment", &self.environment),
                        ("git_remote_url", &self.git_remote_url),
                        ("lookup_branch_pattern", &self.lookup_branch_pattern),
                        ("notification_target", &self.notification_target)];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(DomainError::Validation(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_branch_pattern() -> String {
    DEFAULT_BRANCH_PATTERN.to_string()
}

/// Petición de onboarding tal como llega por la frontera.
///
/// Unidad de negocio y nombre de aplicación son opcionales en el payload,
/// pero `into_new_config` los exige.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardRequest {
    #[serde(default)]
    pub business_unit: Option<String>,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default = "default_true")]
    pub auto_resolve: bool,
    pub environment: String,
    pub git_remote_url: String,
    #[serde(default = "default_branch_pattern")]
    pub lookup_branch_pattern: String,
    #[serde(default)]
    pub filter_pii: bool,
    pub notification_target: String,
    #[serde(default)]
    pub issue_tracker_url: Option<String>,
    #[serde(default)]
    pub app_info_url: Option<String>,
    #[serde(default)]
    pub monitoring_url: Option<String>,
}

impl OnboardRequest {
    pub fn into_new_config(self) -> Result<NewApplicationConfig, DomainError> {
        let business_unit = self.business_unit
                                .ok_or_else(|| DomainError::Validation("business_unit is required".into()))?;
        let application_name = self.application_name
                                   .ok_or_else(|| DomainError::Validation("application_name is required".into()))?;
        let config = NewApplicationConfig { business_unit,
                                            application_name,
                                            environment: self.environment,
                                            auto_resolve: self.auto_resolve,
                                            git_remote_url: self.git_remote_url,
                                            lookup_branch_pattern: self.lookup_branch_pattern,
                                            filter_pii: self.filter_pii,
                                            notification_target: self.notification_target,
                                            issue_tracker_url: blank_to_none(self.issue_tracker_url),
                                            app_info_url: blank_to_none(self.app_info_url),
                                            monitoring_url: blank_to_none(self.monitoring_url) };
        config.validate()?;
        Ok(config)
    }
}

fn blank_to_none(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> NaturalKey {
        NaturalKey::new("RETAIL", "checkout", "prod")
    }

    #[test]
    fn new_config_uses_onboarding_defaults() {
        let cfg = NewApplicationConfig::new(key(), "git@example.com:retail/checkout.git", "team@example.com");
        assert!(cfg.auto_resolve);
        assert!(!cfg.filter_pii);
        assert_eq!(cfg.lookup_branch_pattern, DEFAULT_BRANCH_PATTERN);
        assert_eq!(cfg.natural_key(), key());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn blank_required_field_fails_validation() {
        let cfg = NewApplicationConfig::new(key(), "  ", "team@example.com");
        assert_eq!(cfg.validate(), Err(DomainError::Validation("git_remote_url is required".into())));
    }

    #[test]
    fn onboard_request_applies_serde_defaults() {
        let req: OnboardRequest = serde_json::from_value(json!({
            "business_unit": "RETAIL",
            "application_name": "checkout",
            "environment": "prod",
            "git_remote_url": "git@example.com:retail/checkout.git",
            "notification_target": "team@example.com",
            "monitoring_url": ""
        })).unwrap();
        let cfg = req.into_new_config().unwrap();
        assert!(cfg.auto_resolve);
        assert_eq!(cfg.lookup_branch_pattern, "LATEST_RELEASE");
        assert_eq!(cfg.monitoring_url, None);
    }

    #[test]
    fn onboard_request_without_business_unit_is_rejected() {
        let req: OnboardRequest = serde_json::from_value(json!({
            "application_name": "checkout",
            "environment": "prod",
            "git_remote_url": "git@example.com:retail/checkout.git",
            "notification_target": "team@example.com"
        })).unwrap();
        assert!(matches!(req.into_new_config(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn natural_key_display() {
        assert_eq!(key().to_string(), "RETAIL/checkout/prod");
    }
}
