//! Configuration loading.
//!
//! Layers, later wins:
//! 1. Defaults in code
//! 2. `config/{STOCKLEDGER_ENVIRONMENT}.toml` (optional, default `development`)
//! 3. `STOCKLEDGER__SECTION__KEY` environment variables
//!
//! Loading `.env` is the binary's job; this module only reads the process
//! environment.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use uuid::Uuid;

use stockledger_core::WarehouseId;
use stockledger_observability::LogFormat;

use crate::engine::CoreSettings;
use crate::reconciliation::SweepOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub environment: String,
    pub database: DatabaseSettings,
    pub inventory: InventorySettings,
    pub reconciliation: ReconciliationSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL connection URL.
    pub url: String,
    pub max_connections: u32,
    /// Create missing tables on startup.
    pub apply_schema: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventorySettings {
    /// Warehouse used by the purchase/outflow/adjustment module.
    pub default_warehouse_id: Uuid,
    /// Movements returned alongside a stock read.
    pub recent_movements_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationSettings {
    pub expired_sweep_interval_secs: u64,
    pub batch_limit: usize,
    /// TTL applied to reservations created without `expires_at`.
    pub default_ttl_hours: i64,
    /// Report what the expired sweep would release without mutating.
    pub dry_run: bool,
    pub low_stock_interval_secs: u64,
    pub alert_recipients: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub format: LogFormat,
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset.
    pub filter: String,
}

impl Settings {
    /// Load configuration from files and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("STOCKLEDGER_ENVIRONMENT").unwrap_or_else(|_| "development".into());
        Self::resolve(Self::builder(&environment)?.add_source(
            Environment::with_prefix("STOCKLEDGER")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("reconciliation.alert_recipients")
                .try_parsing(true),
        ))
    }

    fn resolve(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the worker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let reconciliation = &self.reconciliation;
        if reconciliation.expired_sweep_interval_secs == 0 {
            return Err(invalid("reconciliation.expired_sweep_interval_secs must be > 0"));
        }
        if reconciliation.low_stock_interval_secs == 0 {
            return Err(invalid("reconciliation.low_stock_interval_secs must be > 0"));
        }
        if !(1..=SweepOptions::MAX_TTL_HOURS).contains(&reconciliation.default_ttl_hours) {
            return Err(invalid(format!(
                "reconciliation.default_ttl_hours must be between 1 and {} (got {})",
                SweepOptions::MAX_TTL_HOURS,
                reconciliation.default_ttl_hours
            )));
        }
        if reconciliation.batch_limit == 0 {
            return Err(invalid("reconciliation.batch_limit must be > 0"));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections must be > 0"));
        }
        Ok(())
    }

    fn builder(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(config::Config::builder()
            .set_default("environment", environment)?
            .set_default("database.url", "postgres://localhost/stockledger")?
            .set_default("database.max_connections", 10)?
            .set_default("database.apply_schema", true)?
            .set_default("inventory.default_warehouse_id", Uuid::nil().to_string())?
            .set_default("inventory.recent_movements_limit", 20)?
            .set_default("reconciliation.expired_sweep_interval_secs", 3600)?
            .set_default("reconciliation.batch_limit", 500)?
            .set_default("reconciliation.default_ttl_hours", 24)?
            .set_default("reconciliation.dry_run", false)?
            .set_default("reconciliation.low_stock_interval_secs", 21600)?
            .set_default("reconciliation.alert_recipients", Vec::<String>::new())?
            .set_default("logging.format", "json")?
            .set_default("logging.filter", "info")?
            .add_source(File::with_name(&format!("config/{environment}")).required(false)))
    }

    /// Values the inventory engine needs; the engine never reads config itself.
    pub fn core_settings(&self) -> CoreSettings {
        CoreSettings {
            default_warehouse_id: WarehouseId::from_uuid(self.inventory.default_warehouse_id),
            recent_movements_limit: self.inventory.recent_movements_limit,
            alert_recipients: self.reconciliation.alert_recipients.clone(),
        }
    }

    pub fn sweep_options(&self) -> SweepOptions {
        SweepOptions {
            batch_limit: self.reconciliation.batch_limit,
            ttl_hours: self.reconciliation.default_ttl_hours,
            dry_run: self.reconciliation.dry_run,
        }
    }

    pub fn expired_sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reconciliation.expired_sweep_interval_secs)
    }

    pub fn low_stock_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reconciliation.low_stock_interval_secs)
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Message(message.into())
}
