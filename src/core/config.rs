use crate::core::locale::DEFAULT_EXCHANGE_CURRENCY;
use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};
use tracing::debug;

/// How a conversion provider encodes its price.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversionResponseFormat {
    /// Body is the decimal price itself.
    BareNumber,
    /// Body is a JSON object holding the price in `field`.
    NestedField { field: String },
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConversionProviderConfig {
    pub name: String,
    pub url: String,
    pub format: ConversionResponseFormat,
    /// Shown as the source of the synthetic milli-unit rate.
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FiatProviderConfig {
    pub name: String,
    pub url: String,
    /// Ticker fields to try per currency, highest priority first.
    pub fields: Vec<String>,
}

fn default_conversion_providers() -> Vec<ConversionProviderConfig> {
    vec![
        ConversionProviderConfig {
            name: "leafpool".to_string(),
            url: "http://leafco.in/last".to_string(),
            format: ConversionResponseFormat::BareNumber,
            source: "http://www.cryptsy.com".to_string(),
        },
        ConversionProviderConfig {
            name: "vircurex".to_string(),
            url: "https://api.vircurex.com/api/get_last_trade.json?base=LEAF&alt=BTC".to_string(),
            format: ConversionResponseFormat::NestedField {
                field: "value".to_string(),
            },
            source: "http://www.vircurex.com".to_string(),
        },
    ]
}

fn default_fiat_providers() -> Vec<FiatProviderConfig> {
    vec![
        FiatProviderConfig {
            name: "bitcoinaverage".to_string(),
            url: "https://api.bitcoinaverage.com/ticker/global/all".to_string(),
            fields: vec!["24h_avg".to_string(), "last".to_string()],
        },
        FiatProviderConfig {
            name: "blockchain.info".to_string(),
            url: "https://blockchain.info/ticker".to_string(),
            fields: vec!["15m".to_string()],
        },
    ]
}

fn default_currency() -> String {
    DEFAULT_EXCHANGE_CURRENCY.to_string()
}

fn default_synthetic_currency() -> String {
    "mBTC".to_string()
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_refresh_interval_secs() -> u64 {
    600
}

fn default_user_agent() -> String {
    format!("leafrates/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Selected by index through the `exchange_provider` preference.
    #[serde(default = "default_conversion_providers")]
    pub conversion_providers: Vec<ConversionProviderConfig>,
    /// Tried in order until one returns rates.
    #[serde(default = "default_fiat_providers")]
    pub fiat_providers: Vec<FiatProviderConfig>,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    /// Overrides the currency derived from the process locale.
    pub locale_currency: Option<String>,
    #[serde(default = "default_synthetic_currency")]
    pub synthetic_currency: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            conversion_providers: default_conversion_providers(),
            fiat_providers: default_fiat_providers(),
            default_currency: default_currency(),
            locale_currency: None,
            synthetic_currency: default_synthetic_currency(),
            http_timeout_secs: default_http_timeout_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            user_agent: default_user_agent(),
            data_path: None,
        }
    }
}

impl AppConfig {
    /// Loads the default config file, or built-in defaults when it doesn't exist.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "leafco", "leafrates")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("in", "leafco", "leafrates")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Result<chrono::Duration> {
        i64::try_from(self.refresh_interval_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                anyhow!(
                    "Invalid refresh_interval_secs: {}",
                    self.refresh_interval_secs
                )
            })
    }
}
