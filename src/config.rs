use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Optional settings file, looked up in the working directory
pub const SETTINGS_FILE: &str = "sweep-backtest";
/// Prefix for environment overrides, e.g. `SWEEP_MARKET_DATA__API_KEY`
pub const ENV_PREFIX: &str = "SWEEP";

/// What a run does when live data cannot be obtained
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DataPolicy {
    /// Try live data, fall back to tagged synthetic data on any failure
    #[default]
    Fallback,
    /// Propagate acquisition failures to the caller
    LiveOnly,
    /// Never touch the network
    SyntheticOnly,
}

impl fmt::Display for DataPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataPolicy::Fallback => f.write_str("fallback"),
            DataPolicy::LiveOnly => f.write_str("live-only"),
            DataPolicy::SyntheticOnly => f.write_str("synthetic-only"),
        }
    }
}

impl FromStr for DataPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(DataPolicy::Fallback),
            "live-only" | "live" | "strict" => Ok(DataPolicy::LiveOnly),
            "synthetic-only" | "synthetic" => Ok(DataPolicy::SyntheticOnly),
            other => Err(format!(
                "unknown data policy '{}' (expected fallback, live-only or synthetic-only)",
                other
            )),
        }
    }
}

/// Market-data provider connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketDataSettings {
    pub base_url: String,
    /// No key means no live provider
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub requests_per_minute: u32,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.polygon.io".to_string(),
            api_key: None,
            timeout_secs: 30,
            requests_per_minute: 60,
            max_retries: 3,
            retry_backoff_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BacktestSettings {
    pub data_policy: DataPolicy,
    /// Upper bound on the whole live acquisition step
    pub acquisition_timeout_secs: u64,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            data_policy: DataPolicy::Fallback,
            acquisition_timeout_secs: 60,
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub log_filter: String,
    pub backtest: BacktestSettings,
    pub market_data: MarketDataSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "sweep_backtest=info".to_string(),
            backtest: BacktestSettings::default(),
            market_data: MarketDataSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings: defaults, then `sweep-backtest.toml` if present, then
    /// `SWEEP_*` environment variables (`__` separates nested keys).
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(SETTINGS_FILE)
    }

    pub fn load_from(file_stem: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(file_stem).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Settings>()?;

        Ok(settings)
    }
}
