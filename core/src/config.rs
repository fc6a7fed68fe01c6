use anyhow::{Context, Result};
use ethereum_types::Address;
use serde::Deserialize;
use std::time::Duration;

use crate::abi::parse_address;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Deserialize, Clone)]
pub struct ExtensionConfig {
    pub network: NetworkConfig,
    pub token: TokenConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: String,
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub explorer_url: Option<String>,
}

impl NetworkConfig {
    /// Chain id as the `0x`-prefixed hex string wallets report
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    /// Compare against a wallet-reported chain id ("0x14a34", "0x14A34", ...)
    pub fn matches(&self, reported: &str) -> bool {
        let digits = reported.trim().trim_start_matches("0x");
        u64::from_str_radix(digits, 16)
            .map(|id| id == self.chain_id)
            .unwrap_or(false)
    }

    pub fn tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), tx_hash))
    }
}

fn default_native_symbol() -> String {
    "ETH".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenConfig {
    pub symbol: String,
    pub contract: String,
    pub decimals: u8,
    #[serde(default)]
    pub faucet_url: Option<String>,
}

impl TokenConfig {
    pub fn contract_address(&self) -> Result<Address> {
        parse_address(&self.contract).context(format!("Invalid token contract: {}", self.contract))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    #[serde(default = "default_recipient")]
    pub default_recipient: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_max_polls")]
    pub receipt_max_polls: u32,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            default_recipient: default_recipient(),
            gas_limit: default_gas_limit(),
            receipt_poll_interval_ms: default_poll_interval_ms(),
            receipt_max_polls: default_max_polls(),
        }
    }
}

impl PaymentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

fn default_recipient() -> String {
    "0x0000000000000000000000000000000000000402".to_string()
}

fn default_gas_limit() -> u64 {
    100_000
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_polls() -> u32 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutConfig {
    #[serde(default = "default_status_ms")]
    pub bridge_status_ms: u64,
    #[serde(default = "default_diagnostic_ms")]
    pub bridge_diagnostic_ms: u64,
    #[serde(default = "default_connect_ms")]
    pub bridge_connect_ms: u64,
    #[serde(default = "default_payment_ms")]
    pub bridge_payment_ms: u64,
    #[serde(default = "default_popup_ms")]
    pub popup_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            bridge_status_ms: default_status_ms(),
            bridge_diagnostic_ms: default_diagnostic_ms(),
            bridge_connect_ms: default_connect_ms(),
            bridge_payment_ms: default_payment_ms(),
            popup_ms: default_popup_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn bridge_status(&self) -> Duration {
        Duration::from_millis(self.bridge_status_ms)
    }

    pub fn bridge_diagnostic(&self) -> Duration {
        Duration::from_millis(self.bridge_diagnostic_ms)
    }

    pub fn bridge_connect(&self) -> Duration {
        Duration::from_millis(self.bridge_connect_ms)
    }

    pub fn bridge_payment(&self) -> Duration {
        Duration::from_millis(self.bridge_payment_ms)
    }

    pub fn popup(&self) -> Duration {
        Duration::from_millis(self.popup_ms)
    }

    /// The popup waits on the relay, which itself waits on the bridge
    pub fn popup_for(&self, bridge_timeout: Duration) -> Duration {
        bridge_timeout + self.popup()
    }
}

fn default_status_ms() -> u64 {
    2000
}

fn default_diagnostic_ms() -> u64 {
    5000
}

fn default_connect_ms() -> u64 {
    10_000
}

fn default_payment_ms() -> u64 {
    180_000
}

fn default_popup_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_wait_attempts")]
    pub wait_attempts: u32,
    #[serde(default = "default_wait_interval_ms")]
    pub wait_interval_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            wait_attempts: default_wait_attempts(),
            wait_interval_ms: default_wait_interval_ms(),
        }
    }
}

impl ProviderConfig {
    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }
}

fn default_wait_attempts() -> u32 {
    20
}

fn default_wait_interval_ms() -> u64 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_cap")]
    pub cap: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            cap: default_history_cap(),
        }
    }
}

fn default_history_cap() -> usize {
    10
}

impl ExtensionConfig {
    /// Configuration bundled into the extension
    pub fn bundled() -> Result<Self> {
        let config = Self::from_toml_str(DEFAULT_CONFIG).context("Failed to parse bundled config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.chain_id == 0 {
            anyhow::bail!("network.chain_id must be non-zero");
        }
        if self.token.decimals > 36 {
            anyhow::bail!(
                "token.decimals = {} is out of range (max 36)",
                self.token.decimals
            );
        }
        self.token.contract_address()?;
        parse_address(&self.payment.default_recipient).context(format!(
            "Invalid payment.default_recipient: {}",
            self.payment.default_recipient
        ))?;
        if self.history.cap == 0 {
            anyhow::bail!("history.cap must be at least 1");
        }
        if self.provider.wait_attempts == 0 || self.payment.receipt_max_polls == 0 {
            anyhow::bail!("polling limits must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_config_is_valid() {
        let config = ExtensionConfig::bundled().unwrap();
        assert_eq!(config.network.chain_id_hex(), "0x14a34");
        assert_eq!(config.token.symbol, "USDC");
        assert_eq!(config.token.decimals, 6);
        assert_eq!(config.history.cap, 10);
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = ExtensionConfig::from_toml_str(
            r#"
            [network]
            chain_id = 1
            name = "Ethereum Mainnet"

            [token]
            symbol = "USDC"
            contract = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
            decimals = 6
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.payment.gas_limit, 100_000);
        assert_eq!(config.timeouts.popup_ms, 5000);
        assert_eq!(config.provider.wait_attempts, 20);
    }

    #[test]
    fn test_validate_rejects_bad_contract() {
        let mut config = ExtensionConfig::bundled().unwrap();
        config.token.contract = "0x1234".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chain_id_matching_ignores_case() {
        let config = ExtensionConfig::bundled().unwrap();
        assert!(config.network.matches("0x14A34"));
        assert!(!config.network.matches("0x1"));
        assert!(!config.network.matches("garbage"));
    }
}
