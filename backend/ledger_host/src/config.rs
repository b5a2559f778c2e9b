//! Application configuration loaded from environment variables.

use crowdfund_hook::{HookConfig, DEFAULT_CREATE_CAMPAIGN_DEPOSIT, DEFAULT_FUND_CAMPAIGN_DEPOSIT};

use crate::errors::{HostError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Maximum number of hook state entries across all campaigns
    pub hook_state_capacity: usize,
    /// Deposit withheld from a create-campaign payment, in drops
    pub create_campaign_deposit_drops: u64,
    /// Deposit withheld from every pledge, in drops
    pub fund_campaign_deposit_drops: u64,
    /// Honour the dev-mode timestamp override in payloads
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./crowdfund_ledger.db".to_string()),
            api_port: parse_var("API_PORT", "3001")?,
            hook_state_capacity: parse_var("HOOK_STATE_CAPACITY", "256")?,
            create_campaign_deposit_drops: parse_var(
                "CREATE_CAMPAIGN_DEPOSIT_DROPS",
                &DEFAULT_CREATE_CAMPAIGN_DEPOSIT.to_string(),
            )?,
            fund_campaign_deposit_drops: parse_var(
                "FUND_CAMPAIGN_DEPOSIT_DROPS",
                &DEFAULT_FUND_CAMPAIGN_DEPOSIT.to_string(),
            )?,
            dev_mode: parse_bool(&env_var("DEV_MODE").unwrap_or_else(|_| "false".to_string()))?,
        })
    }

    pub fn hook_config(&self) -> HookConfig {
        HookConfig {
            create_campaign_deposit: self.create_campaign_deposit_drops,
            fund_campaign_deposit: self.fund_campaign_deposit_drops,
            dev_mode: self.dev_mode,
        }
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| HostError::Config(format!("Missing env var: {key}")))
}

fn parse_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    env_var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| HostError::Config(format!("Invalid {key}")))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(HostError::Config(format!("Invalid DEV_MODE: {other}"))),
    }
}
