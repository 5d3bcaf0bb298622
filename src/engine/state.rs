// engine/state.rs — Shared host state.
// Canonical home for HostState: the aggregator, the lifecycle engine, the
// wallet vault and the unlocked-session table, wired from one HostConfig.
// Both peer surfaces (extension RPC, agent tools) operate on this.

use crate::atoms::constants::{DEFAULT_SWAP_SLIPPAGE, HOST_VERSION};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{Approver, BroadcastChannel, ChainClient, DexProvider};
use crate::atoms::types::{ApprovalDecision, ApprovalRequest, SigningKey, SwapParams, TransferDraft};
use crate::engine::aggregator::{DexAggregator, ProviderStatus};
use crate::engine::chains::ChainFamily;
use crate::engine::config::{ChainConfig, HostConfig};
use crate::engine::context::RequestContext;
use crate::engine::lifecycle::{LifecycleStats, SwapExecutor, TransactionEngine, TransferRequest};
use crate::engine::vault::{WalletInfo, WalletStore};
use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

/// Snapshot returned by the `status` RPC and the `wallet_status` resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostStatus {
    pub version: String,
    pub pid: u32,
    pub initialized: bool,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub wallets: usize,
    pub unlocked_wallets: Vec<String>,
    pub chains: Vec<String>,
    pub providers: Vec<ProviderStatus>,
    pub transactions: LifecycleStats,
}

/// A swap as requested by a peer. Tokens are symbols or contract addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapIntent {
    pub wallet: String,
    pub token_in: String,
    pub token_out: String,
    #[serde(default)]
    pub amount_in: Option<String>,
    #[serde(default)]
    pub amount_out: Option<String>,
    /// Fraction; defaults to 0.5%.
    #[serde(default)]
    pub slippage: Option<f64>,
    /// Pin a provider instead of taking the best quote.
    #[serde(default)]
    pub provider: Option<String>,
}

/// A transfer as requested by a peer, before signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferIntent {
    pub wallet: String,
    pub to: String,
    pub amount: String,
    #[serde(default)]
    pub token: Option<String>,
}

pub struct HostState {
    config: HostConfig,
    data_dir: PathBuf,
    pub aggregator: Arc<DexAggregator>,
    pub lifecycle: TransactionEngine,
    pub wallets: WalletStore,
    /// Decrypted keys of unlocked wallets, keyed by wallet name.
    sessions: Mutex<HashMap<String, SigningKey>>,
    approver: RwLock<Option<Arc<dyn Approver>>>,
    shutdown: CancellationToken,
    started_at: DateTime<Utc>,
    initialized: AtomicBool,
}

impl HostState {
    pub fn new(config: HostConfig) -> EngineResult<Arc<Self>> {
        let data_dir = config.data_dir();
        Self::with_data_dir(config, &data_dir)
    }

    pub fn with_data_dir(config: HostConfig, data_dir: &Path) -> EngineResult<Arc<Self>> {
        config.validate()?;
        let wallets = WalletStore::open(data_dir)?;
        let aggregator = Arc::new(DexAggregator::new());
        let executor: Arc<dyn SwapExecutor> = aggregator.clone();
        let lifecycle = TransactionEngine::new(executor, config.lifecycle_config());
        info!(
            "[host] State ready: data dir {}, {} chain(s) configured",
            data_dir.display(),
            config.chains.len()
        );
        Ok(Arc::new(HostState {
            config,
            data_dir: data_dir.to_path_buf(),
            aggregator,
            lifecycle,
            wallets,
            sessions: Mutex::new(HashMap::new()),
            approver: RwLock::new(None),
            shutdown: CancellationToken::new(),
            started_at: Utc::now(),
            initialized: AtomicBool::new(false),
        }))
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // ── Collaborators ──────────────────────────────────────────────────────

    /// Register a DEX provider with the priority/enabled flag from config.
    pub fn register_provider(&self, provider: Arc<dyn DexProvider>) -> EngineResult<()> {
        let settings = self.config.provider_settings(provider.name());
        self.aggregator.register_provider(provider, settings)
    }

    /// Register a chain client. The chain must be declared in the config.
    pub fn register_chain(&self, client: Arc<dyn ChainClient>) -> EngineResult<()> {
        let chain = self.chain_config(client.chain_id())?;
        self.lifecycle.register_chain(Arc::clone(&client), chain.required_confirmations);
        Ok(())
    }

    pub fn register_channel(&self, channel: Arc<dyn BroadcastChannel>) {
        let settings = self.config.channel_settings(channel.name());
        self.lifecycle.register_channel(channel, settings);
    }

    pub fn set_approver(&self, approver: Arc<dyn Approver>) {
        *self.approver.write() = Some(approver);
    }

    // ── Chains ─────────────────────────────────────────────────────────────

    pub fn chain_config(&self, chain_id: &str) -> EngineResult<&ChainConfig> {
        self.config
            .chain(chain_id)
            .ok_or_else(|| EngineError::invalid("chain_id", format!("chain '{}' is not configured", chain_id)))
    }

    pub fn chain_family(&self, chain_id: &str) -> EngineResult<ChainFamily> {
        self.chain_config(chain_id).map(|c| c.family)
    }

    /// Family format check, then the chain client's own check if one is registered.
    pub fn validate_address(&self, chain_id: &str, address: &str) -> EngineResult<()> {
        let family = self.chain_family(chain_id)?;
        let client_ok = self
            .lifecycle
            .chain_client(chain_id)
            .map_or(true, |c| c.validate_address(address));
        if address.trim().is_empty() || !family.validate_address(address) || !client_ok {
            return Err(EngineError::InvalidAddress(address.to_string()));
        }
        Ok(())
    }

    /// Resolve a token symbol or contract address for `chain_id`. `None`
    /// means the chain's native asset.
    pub fn resolve_token(&self, chain_id: &str, token: Option<&str>) -> EngineResult<String> {
        let chain = self.chain_config(chain_id)?;
        let token = match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => t,
            None => {
                return Ok(chain
                    .tokens
                    .iter()
                    .find(|t| t.address.is_none())
                    .map(|t| t.symbol.clone())
                    .unwrap_or_else(|| "native".to_string()))
            }
        };
        if let Some(known) = chain.tokens.iter().find(|t| t.symbol.eq_ignore_ascii_case(token)) {
            return Ok(known.symbol.clone());
        }
        let looks_like_address = token.starts_with("0x") || token.len() >= 32;
        if !looks_like_address {
            return Err(EngineError::TokenNotSupported(format!("{} on {}", token, chain_id)));
        }
        let client_ok = self
            .lifecycle
            .chain_client(chain_id)
            .map_or(true, |c| c.validate_token_address(token));
        if !chain.family.validate_token_address(token) || !client_ok {
            return Err(EngineError::InvalidTokenAddress(token.to_string()));
        }
        Ok(token.to_string())
    }

    pub fn derive_address(&self, chain_id: &str, secret: &SigningKey) -> EngineResult<String> {
        match self.lifecycle.chain_client(chain_id) {
            Some(client) => client.derive_address(secret),
            None => self.chain_family(chain_id)?.derive_address(secret),
        }
    }

    pub async fn get_balance(&self, wallet: &str, token: Option<&str>) -> EngineResult<(WalletInfo, String, String)> {
        let info = self.wallets.info(wallet)?;
        let token = self.resolve_token(&info.chain_id, token)?;
        let client = self.require_client(&info.chain_id)?;
        let balance = client.get_balance(&info.address, &token).await?;
        Ok((info, token, balance))
    }

    fn require_client(&self, chain_id: &str) -> EngineResult<Arc<dyn ChainClient>> {
        self.lifecycle.chain_client(chain_id).ok_or_else(|| {
            EngineError::invalid("chain_id", format!("no chain client registered for '{}'", chain_id))
        })
    }

    // ── Wallets ────────────────────────────────────────────────────────────

    /// Generate a fresh key, store it encrypted and unlock it.
    pub async fn create_wallet(
        &self,
        name: &str,
        chain_id: &str,
        password: Zeroizing<String>,
    ) -> EngineResult<WalletInfo> {
        if password.is_empty() {
            return Err(EngineError::MissingRequiredField("password".into()));
        }
        let secret = self.chain_family(chain_id)?.generate_secret();
        let key = SigningKey::new(secret.as_bytes().to_vec());
        let address = self.derive_address(chain_id, &key)?;
        let info = self.wallets.save(name, chain_id, &address, secret, password, false).await?;
        self.sessions.lock().insert(name.to_string(), key);
        info!("[host] Created wallet '{}' on {}", name, chain_id);
        Ok(info)
    }

    /// Store an existing secret. The derived address must be valid for the chain.
    pub async fn import_wallet(
        &self,
        name: &str,
        chain_id: &str,
        secret: Zeroizing<String>,
        password: Zeroizing<String>,
    ) -> EngineResult<WalletInfo> {
        if secret.trim().is_empty() {
            return Err(EngineError::MissingRequiredField("secret".into()));
        }
        if password.is_empty() {
            return Err(EngineError::MissingRequiredField("password".into()));
        }
        let key = SigningKey::new(secret.trim().as_bytes().to_vec());
        let address = self.derive_address(chain_id, &key)?;
        self.validate_address(chain_id, &address)?;
        let info = self.wallets.save(name, chain_id, &address, secret, password, false).await?;
        self.sessions.lock().insert(name.to_string(), key);
        info!("[host] Imported wallet '{}' on {}", name, chain_id);
        Ok(info)
    }

    /// Decrypt a wallet without keeping it unlocked.
    pub async fn open_wallet(&self, name: &str, password: Zeroizing<String>) -> EngineResult<SigningKey> {
        if password.is_empty() {
            return Err(EngineError::MissingRequiredField("password".into()));
        }
        self.wallets.unlock(name, password).await
    }

    // ── Sessions ───────────────────────────────────────────────────────────

    pub async fn unlock_wallet(&self, name: &str, password: Zeroizing<String>) -> EngineResult<WalletInfo> {
        let key = self.open_wallet(name, password).await?;
        let info = self.wallets.info(name)?;
        self.sessions.lock().insert(name.to_string(), key);
        info!("[host] Wallet '{}' unlocked", name);
        Ok(info)
    }

    /// Returns whether a session existed.
    pub fn lock_wallet(&self, name: &str) -> bool {
        let removed = self.sessions.lock().remove(name).is_some();
        if removed {
            info!("[host] Wallet '{}' locked", name);
        }
        removed
    }

    pub fn lock_all(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let n = sessions.len();
        sessions.clear();
        n
    }

    pub fn is_unlocked(&self, name: &str) -> bool {
        self.sessions.lock().contains_key(name)
    }

    pub fn unlocked_wallets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Key of an unlocked wallet. Cloned out so the lock is not held across awaits.
    pub fn session_key(&self, name: &str) -> EngineResult<SigningKey> {
        if !self.wallets.exists(name) {
            return Err(EngineError::WalletNotFound(name.to_string()));
        }
        self.sessions
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::Unauthorized(format!("wallet '{}' is locked", name)))
    }

    // ── Approval ───────────────────────────────────────────────────────────

    /// Ask the user through the attached approver. A decline, or having no
    /// approver at all, is `Unauthorized`.
    pub async fn request_approval(
        &self,
        ctx: &RequestContext,
        request: ApprovalRequest,
    ) -> EngineResult<ApprovalDecision> {
        let approver = self
            .approver
            .read()
            .clone()
            .ok_or_else(|| EngineError::Unauthorized("no approval channel is attached".into()))?;
        info!("[host] Requesting approval for {}: {}", request.action, request.summary);
        let decision = ctx.run(approver.approve(&request)).await?;
        if !decision.approved {
            warn!("[host] User declined {}", request.action);
            return Err(EngineError::Unauthorized(format!("{} was declined by the user", request.action)));
        }
        Ok(decision)
    }

    // ── Actions ────────────────────────────────────────────────────────────

    pub fn sign_message(&self, wallet: &WalletInfo, key: &SigningKey, message: &str) -> EngineResult<String> {
        if message.is_empty() {
            return Err(EngineError::MissingRequiredField("message".into()));
        }
        match self.lifecycle.chain_client(&wallet.chain_id) {
            Some(client) => client.sign_message(key, message.as_bytes()),
            None => self.chain_family(&wallet.chain_id)?.sign_message(key, message.as_bytes()),
        }
    }

    /// Validate, sign through the chain client and hand to the lifecycle engine.
    pub async fn send_transfer(
        &self,
        ctx: &RequestContext,
        key: &SigningKey,
        intent: &TransferIntent,
    ) -> EngineResult<String> {
        let wallet = self.wallets.info(&intent.wallet)?;
        validate_amount(&intent.amount)?;
        self.validate_address(&wallet.chain_id, &intent.to)?;
        let token = self.resolve_token(&wallet.chain_id, intent.token.as_deref())?;
        let client = self.require_client(&wallet.chain_id)?;

        let draft = TransferDraft {
            chain_id: wallet.chain_id.clone(),
            from: wallet.address.clone(),
            to: intent.to.trim().to_string(),
            amount: intent.amount.trim().to_string(),
            token,
        };
        let raw_tx = ctx.run(client.sign_transfer(key, &draft)).await?;
        self.lifecycle
            .submit_transfer(
                ctx,
                TransferRequest {
                    chain_id: draft.chain_id,
                    from: draft.from,
                    to: draft.to,
                    amount: draft.amount,
                    token: draft.token,
                    raw_tx,
                },
            )
            .await
    }

    /// Swap params for `wallet`, sending proceeds back to the same address.
    pub fn swap_params(&self, wallet: &WalletInfo, key: SigningKey, intent: &SwapIntent) -> EngineResult<SwapParams> {
        for amount in intent.amount_in.iter().chain(intent.amount_out.iter()) {
            validate_amount(amount)?;
        }
        let params = SwapParams {
            token_in: self.resolve_token(&wallet.chain_id, Some(&intent.token_in))?,
            token_out: self.resolve_token(&wallet.chain_id, Some(&intent.token_out))?,
            amount_in: intent.amount_in.clone(),
            amount_out: intent.amount_out.clone(),
            slippage: intent.slippage.unwrap_or(DEFAULT_SWAP_SLIPPAGE),
            from_address: wallet.address.clone(),
            to_address: wallet.address.clone(),
            chain_id: wallet.chain_id.clone(),
            signing_key: Some(key),
        };
        params.validate()?;
        Ok(params)
    }

    // ── Lifecycle of the host itself ───────────────────────────────────────

    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn status(&self) -> EngineResult<HostStatus> {
        let mut chains: Vec<String> = self.config.chains.iter().map(|c| c.id.clone()).collect();
        chains.sort();
        Ok(HostStatus {
            version: HOST_VERSION.to_string(),
            pid: std::process::id(),
            initialized: self.initialized.load(Ordering::SeqCst),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            wallets: self.wallets.list()?.len(),
            unlocked_wallets: self.unlocked_wallets(),
            chains,
            providers: self.aggregator.list_providers(),
            transactions: self.lifecycle.stats(),
        })
    }

    /// Stop monitors, drop every session and wake whoever waits on shutdown.
    pub fn request_shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("[host] Shutdown requested");
        self.lifecycle.shutdown();
        let locked = self.lock_all();
        if locked > 0 {
            info!("[host] Locked {} wallet session(s)", locked);
        }
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Positive, finite decimal.
pub fn validate_amount(amount: &str) -> EngineResult<()> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(EngineError::MissingRequiredField("amount".into()));
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(()),
        _ => Err(EngineError::invalid("amount", format!("'{}' is not a positive decimal", trimmed))),
    }
}
