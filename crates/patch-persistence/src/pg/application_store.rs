use std::sync::Arc;

use diesel::prelude::*;
use log::{debug, info};
use patch_core::{ApplicationConfigStore, StoreError};
use patch_domain::{ApplicationConfig, ConfigId, NaturalKey, NewApplicationConfig};

use super::rows::{ApplicationConfigRow, NewApplicationRow};
use crate::cursor::TransactionalCursor;
use crate::error::PersistenceError;
use crate::pool::PgConnectionPool;
use crate::schema::lob_applications;

/// `ApplicationConfigStore` sobre `lob_applications`.
#[derive(Clone)]
pub struct PgApplicationConfigStore {
    pool: Arc<PgConnectionPool>,
}

impl PgApplicationConfigStore {
    pub fn new(pool: Arc<PgConnectionPool>) -> Self {
        Self { pool }
    }
}

impl ApplicationConfigStore for PgApplicationConfigStore {
    fn insert(&self, config: NewApplicationConfig) -> Result<ApplicationConfig, StoreError> {
        config.validate()?;
        let row: ApplicationConfigRow = TransactionalCursor::new(&self.pool, "insert_config").run(|conn| {
                                            Ok(diesel::insert_into(lob_applications::table)
                                                .values(NewApplicationRow::from(&config))
                                                .returning(ApplicationConfigRow::as_returning())
                                                .get_result(conn)?)
                                        })?;
        info!("insert_config:done config_id={} key={}", row.lob_app_id, config.natural_key());
        Ok(row.into())
    }

    fn find_by_id(&self, id: ConfigId) -> Result<Option<ApplicationConfig>, StoreError> {
        let row = TransactionalCursor::read_only(&self.pool, "find_config_by_id").run(|conn| {
                      lob_applications::table.find(id)
                                             .select(ApplicationConfigRow::as_select())
                                             .first(conn)
                                             .optional()
                                             .map_err(PersistenceError::from)
                  })?;
        Ok(row.map(ApplicationConfig::from))
    }

    fn find_by_business_unit(&self, business_unit: &str) -> Result<Vec<ApplicationConfig>, StoreError> {
        let rows: Vec<ApplicationConfigRow> =
            TransactionalCursor::read_only(&self.pool, "find_configs_by_unit").run(|conn| {
                Ok(lob_applications::table.filter(lob_applications::lob.eq(business_unit))
                                          .order((lob_applications::application_name.asc(), lob_applications::environment.asc()))
                                          .select(ApplicationConfigRow::as_select())
                                          .load(conn)?)
            })?;
        debug!("find_configs_by_unit:done unit={business_unit} count={}", rows.len());
        Ok(rows.into_iter().map(ApplicationConfig::from).collect())
    }

    fn find_by_key(&self, key: &NaturalKey) -> Result<Option<ApplicationConfig>, StoreError> {
        let row = TransactionalCursor::read_only(&self.pool, "find_config_by_key").run(|conn| {
                      lob_applications::table.filter(lob_applications::lob.eq(&key.business_unit))
                                             .filter(lob_applications::application_name.eq(&key.application_name))
                                             .filter(lob_applications::environment.eq(&key.environment))
                                             .select(ApplicationConfigRow::as_select())
                                             .first(conn)
                                             .optional()
                                             .map_err(PersistenceError::from)
                  })?;
        Ok(row.map(ApplicationConfig::from))
    }
}
