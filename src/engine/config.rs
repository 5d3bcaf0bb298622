// Keyhost Engine — Host Configuration
//
// TOML document, every field defaulted so an empty file (or no file) yields
// a working host. `validate()` rejects combinations the engine cannot honor.

use crate::atoms::constants::{
    DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_MAX_RETRIES, DEFAULT_MAX_TOTAL_SLIPPAGE_BPS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_REQUIRED_CONFIRMATIONS, DEFAULT_RETRY_DELAY_MS, DEFAULT_RPC_TIMEOUT_MS, DEFAULT_SLIPPAGE_INCREMENT_BPS,
};
use crate::atoms::error::{EngineError, EngineResult};
use crate::engine::aggregator::ProviderSettings;
use crate::engine::chains::ChainFamily;
use crate::engine::lifecycle::{ChannelSettings, LifecycleConfig, RetryPolicy};
use crate::engine::peer::RpcOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub host: HostSection,
    pub chains: Vec<ChainConfig>,
    pub providers: Vec<ProviderConfig>,
    pub retry: RetrySection,
    pub confirmation: ConfirmationSection,
    pub broadcast: BroadcastSection,
    pub peer: PeerSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSection {
    pub data_dir: Option<PathBuf>,
    /// Expose the agent tool surface.
    pub agent_surface: bool,
}

impl Default for HostSection {
    fn default() -> Self {
        HostSection { data_dir: None, agent_surface: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub family: ChainFamily,
    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u64,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

fn default_required_confirmations() -> u64 {
    DEFAULT_REQUIRED_CONFIRMATIONS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    /// Contract / mint address; `None` for the native asset.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub slippage_increment_bps: u32,
    pub max_total_slippage_bps: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        RetrySection {
            max_retries: DEFAULT_MAX_RETRIES,
            slippage_increment_bps: DEFAULT_SLIPPAGE_INCREMENT_BPS,
            max_total_slippage_bps: DEFAULT_MAX_TOTAL_SLIPPAGE_BPS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationSection {
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ConfirmationSection {
    fn default() -> Self {
        ConfirmationSection {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastSection {
    pub channels: Vec<ChannelSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerSection {
    pub rpc_timeout_secs: u64,
}

impl Default for PeerSection {
    fn default() -> Self {
        PeerSection { rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_MS / 1000 }
    }
}

impl HostConfig {
    /// Read, parse and validate a TOML config file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> EngineResult<Self> {
        let config: HostConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.confirmation.poll_interval_ms == 0 {
            return Err(EngineError::Config("confirmation.poll_interval_ms must be > 0".into()));
        }
        if self.confirmation.timeout_secs == 0 {
            return Err(EngineError::Config("confirmation.timeout_secs must be > 0".into()));
        }
        if self.retry.slippage_increment_bps > self.retry.max_total_slippage_bps {
            return Err(EngineError::Config(format!(
                "retry.slippage_increment_bps ({}) exceeds retry.max_total_slippage_bps ({})",
                self.retry.slippage_increment_bps, self.retry.max_total_slippage_bps
            )));
        }
        if self.retry.max_total_slippage_bps > 10_000 {
            return Err(EngineError::Config("retry.max_total_slippage_bps cannot exceed 10000".into()));
        }
        if self.peer.rpc_timeout_secs == 0 {
            return Err(EngineError::Config("peer.rpc_timeout_secs must be > 0".into()));
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if chain.id.trim().is_empty() {
                return Err(EngineError::Config("chain id cannot be empty".into()));
            }
            if !seen.insert(chain.id.as_str()) {
                return Err(EngineError::Config(format!("duplicate chain id '{}'", chain.id)));
            }
            if chain.required_confirmations == 0 {
                return Err(EngineError::Config(format!(
                    "chain '{}': required_confirmations must be >= 1",
                    chain.id
                )));
            }
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name.as_str()) {
                return Err(EngineError::Config(format!("duplicate provider '{}'", provider.name)));
            }
        }

        let mut seen = HashSet::new();
        for channel in &self.broadcast.channels {
            if !seen.insert(channel.name.as_str()) {
                return Err(EngineError::Config(format!("duplicate broadcast channel '{}'", channel.name)));
            }
        }
        Ok(())
    }

    /// Configured data dir, else the platform data dir, else `./.keyhost`.
    pub fn data_dir(&self) -> PathBuf {
        self.host
            .data_dir
            .clone()
            .or_else(|| dirs::data_local_dir().map(|d| d.join("keyhost")))
            .unwrap_or_else(|| PathBuf::from(".keyhost"))
    }

    pub fn chain(&self, id: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.id == id)
    }

    /// Registry settings for a provider; unlisted providers get the defaults.
    pub fn provider_settings(&self, name: &str) -> ProviderSettings {
        self.providers
            .iter()
            .find(|p| p.name == name)
            .map(|p| ProviderSettings { priority: p.priority, enabled: p.enabled })
            .unwrap_or_default()
    }

    pub fn channel_settings(&self, name: &str) -> ChannelSettings {
        self.broadcast
            .channels
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .unwrap_or_else(|| ChannelSettings::new(name, 0))
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            poll_interval: Duration::from_millis(self.confirmation.poll_interval_ms),
            confirmation_timeout: Duration::from_secs(self.confirmation.timeout_secs),
            retry: RetryPolicy {
                max_retries: self.retry.max_retries,
                slippage_increment_bps: self.retry.slippage_increment_bps,
                max_total_slippage_bps: self.retry.max_total_slippage_bps,
                retry_delay: Duration::from_millis(self.retry.retry_delay_ms),
            },
        }
    }

    pub fn rpc_options(&self) -> RpcOptions {
        RpcOptions::with_timeout(Duration::from_secs(self.peer.rpc_timeout_secs))
    }
}
