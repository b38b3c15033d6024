use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{fs, path::PathBuf};
use tracing::debug;

use crate::core::portfolio::{Holding, WatchlistEntry};
use crate::core::strategy::StrategyConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExchangeProviderConfig {
    pub base_url: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Credentials for the authenticated exchange API. Environment variables
/// take precedence over the config file so tokens stay out of it.
#[derive(Debug, Clone)]
pub struct ExchangeCredentials {
    pub email: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
}

impl ExchangeCredentials {
    pub fn usable(&self) -> bool {
        self.refresh_token.is_some() || (self.email.is_some() && self.password.is_some())
    }
}

impl ExchangeProviderConfig {
    pub fn resolve_credentials(&self) -> Option<ExchangeCredentials> {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let credentials = ExchangeCredentials {
            email: env("STOCKWATCH_EXCHANGE_EMAIL").or_else(|| self.email.clone()),
            password: env("STOCKWATCH_EXCHANGE_PASSWORD").or_else(|| self.password.clone()),
            refresh_token: env("STOCKWATCH_REFRESH_TOKEN").or_else(|| self.refresh_token.clone()),
        };
        credentials.usable().then_some(credentials)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FinanceProviderConfig {
    pub base_url: String,
    /// Suffix appended to domestic numeric codes (e.g. "7203" -> "7203.T").
    #[serde(default = "default_exchange_suffix")]
    pub exchange_suffix: String,
}

fn default_exchange_suffix() -> String {
    ".T".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RssProviderConfig {
    #[serde(default)]
    pub feed_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub exchange: Option<ExchangeProviderConfig>,
    pub finance: Option<FinanceProviderConfig>,
    #[serde(default)]
    pub rss: Option<RssProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            exchange: Some(ExchangeProviderConfig {
                base_url: "https://api.jquants.com/v1".to_string(),
                email: None,
                password: None,
                refresh_token: None,
            }),
            finance: Some(FinanceProviderConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
                exchange_suffix: default_exchange_suffix(),
            }),
            rss: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TradingSessionConfig {
    pub open: String,
    pub close: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_hours: u64,
    /// When false, cycles run regardless of market hours.
    #[serde(default = "default_market_hours_only")]
    pub market_hours_only: bool,
    #[serde(default = "default_sessions")]
    pub sessions: Vec<TradingSessionConfig>,
}

fn default_check_interval() -> u64 {
    1800
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_alert_cooldown() -> u64 {
    24
}

fn default_market_hours_only() -> bool {
    true
}

fn default_sessions() -> Vec<TradingSessionConfig> {
    vec![
        TradingSessionConfig {
            open: "09:00".to_string(),
            close: "11:30".to_string(),
        },
        TradingSessionConfig {
            open: "12:30".to_string(),
            close: "15:00".to_string(),
        },
    ]
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            check_interval_secs: default_check_interval(),
            cache_ttl_secs: default_cache_ttl(),
            alert_cooldown_hours: default_alert_cooldown(),
            market_hours_only: default_market_hours_only(),
            sessions: default_sessions(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub watchlist: Vec<WatchlistEntry>,
    #[serde(default)]
    pub strategies: HashMap<String, StrategyConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "stockwatch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
