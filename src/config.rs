use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use crate::error::{ReportError, Result};

const CONFIG_ENV: &str = "RAIL_REPORT_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "rail_report.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub currency_prefix: String,
    /// Stored tonnage is divided by this for the "MT" columns.
    pub tonnage_divisor: f64,
    pub top_n: usize,
    pub default_window_days: u32,
    pub refresh_interval_secs: u64,
    pub loading_csv: PathBuf,
    pub detention_csv: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            currency_prefix: "₹".into(),
            tonnage_divisor: 1_000_000.0,
            top_n: 5,
            default_window_days: 30,
            refresh_interval_secs: 30,
            loading_csv: PathBuf::from("loading_records.csv"),
            detention_csv: PathBuf::from("detention_records.csv"),
            output_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load from `$RAIL_REPORT_CONFIG`, then `./rail_report.json`, then defaults.
    pub fn load() -> Result<Self> {
        if let Some(custom) = env::var_os(CONFIG_ENV) {
            return Self::from_path(Path::new(&custom));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::from_path(local);
        }
        debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&data)?;
        config.validate()?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tonnage_divisor.is_nan() || self.tonnage_divisor <= 0.0 {
            return Err(ReportError::Config(
                "tonnage_divisor must be positive".into(),
            ));
        }
        if self.default_window_days == 0 {
            return Err(ReportError::Config(
                "default_window_days must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn display(&self) -> DisplayConfig {
        DisplayConfig {
            currency_prefix: self.currency_prefix.clone(),
            tonnage_divisor: self.tonnage_divisor,
        }
    }
}

/// The subset of configuration the table renderers need.
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub currency_prefix: String,
    pub tonnage_divisor: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Config::default().display()
    }
}
