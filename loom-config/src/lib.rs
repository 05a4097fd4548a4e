//! Layered configuration for the Loom ledger.
//!
//! Sources are applied in order, later ones overriding earlier ones:
//! built-in defaults, `config/default.toml`, `config/<env>.toml`, then
//! `LOOM__SECTION__KEY` environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const CONFIG_DIR: &str = "config";
pub const DEFAULT_ENV: &str = "default";
const ENV_PREFIX: &str = "LOOM";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoomConfig {
    pub database: DatabaseConfig,
    pub sales: SalesConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// How long a writer waits for a competing transaction to finish.
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SalesConfig {
    /// Fraction applied to taxed sales, `0.18` for 18%.
    pub default_tax_rate: Decimal,
    pub apply_tax: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
    /// Daily-rolled log file; stderr only when absent.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoomConfig {
    fn validate(&self) -> Result<()> {
        let rate = self.sales.default_tax_rate;
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            bail!("sales.default_tax_rate must be between 0 and 1 (got {rate})");
        }
        if self.database.path.as_os_str().is_empty() {
            bail!("database.path must not be empty");
        }
        Ok(())
    }
}

/// Load configuration for `env` from `./config` and the process environment.
pub fn load_config(env: Option<&str>) -> Result<LoomConfig> {
    load_config_from(Path::new(CONFIG_DIR), env.unwrap_or(DEFAULT_ENV), None)
}

/// Load configuration rooted at `dir`.
///
/// `vars` replaces the process environment as the source of `LOOM__*`
/// overrides when given.
pub fn load_config_from(
    dir: &Path,
    env: &str,
    vars: Option<HashMap<String, String>>,
) -> Result<LoomConfig> {
    let settings = Config::builder()
        .set_default("database.path", "data/fabric.db")?
        .set_default("database.busy_timeout_ms", 5_000)?
        .set_default("sales.default_tax_rate", "0.18")?
        .set_default("sales.apply_tax", true)?
        .set_default("logging.level", "info")?
        .set_default("logging.json", false)?
        .add_source(File::with_name(&dir.join(DEFAULT_ENV).to_string_lossy()).required(false))
        .add_source(File::with_name(&dir.join(env).to_string_lossy()).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(vars),
        )
        .build()
        .with_context(|| format!("failed to load configuration for environment '{env}'"))?;

    let config: LoomConfig = settings
        .try_deserialize()
        .context("configuration has invalid values")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::fs;
    use tempfile::tempdir;

    fn no_env() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn defaults_apply_without_files() {
        let dir = tempdir().unwrap();
        let config = load_config_from(dir.path(), "default", no_env()).unwrap();
        assert_eq!(config.database.path, PathBuf::from("data/fabric.db"));
        assert_eq!(config.database.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.sales.default_tax_rate, dec!(0.18));
        assert!(config.sales.apply_tax);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn environment_file_overrides_default_file() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[database]\npath = \"base.db\"\n[sales]\ndefault_tax_rate = 0.17\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("shop.toml"),
            "[database]\npath = \"shop.db\"\n[logging]\njson = true\nfile = \"logs/loom.log\"\n",
        )
        .unwrap();
        let config = load_config_from(dir.path(), "shop", no_env()).unwrap();
        assert_eq!(config.database.path, PathBuf::from("shop.db"));
        assert_eq!(config.sales.default_tax_rate, dec!(0.17));
        assert!(config.logging.json);
        assert_eq!(config.logging.file, Some(PathBuf::from("logs/loom.log")));
    }

    #[test]
    fn variables_override_files() {
        let dir = tempdir().unwrap();
        let vars = HashMap::from([
            ("LOOM__DATABASE__PATH".to_string(), "env.db".to_string()),
            ("LOOM__SALES__APPLY_TAX".to_string(), "false".to_string()),
        ]);
        let config = load_config_from(dir.path(), "default", Some(vars)).unwrap();
        assert_eq!(config.database.path, PathBuf::from("env.db"));
        assert!(!config.sales.apply_tax);
    }

    #[test]
    fn rejects_out_of_range_tax_rate() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("default.toml"), "[sales]\ndefault_tax_rate = \"1.5\"\n").unwrap();
        let err = load_config_from(dir.path(), "default", no_env()).unwrap_err();
        assert!(err.to_string().contains("default_tax_rate"));
    }
}
