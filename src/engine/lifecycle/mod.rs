// Keyhost Engine — Transaction Lifecycle
//
// Owns every transaction the host has broadcast, from submission until a
// terminal state:
//
//   pending ──► confirmed
//      │  └───► failed     (retry bounds exhausted)
//      └──────► rejected   (explicit user/agent rejection)
//
// Each pending record has exactly one monitor task. The monitor polls chain
// state, and on a revert or a confirmation timeout resubmits within the
// retry policy. Rejection is the only other writer.
//
//   retry     — retry bounds and slippage escalation
//   broadcast — broadcast channel selection
//   rejection — batch rejection with notification + audit
//   monitor   — per-transaction polling task

pub mod broadcast;
mod monitor;
pub mod rejection;
pub mod retry;

pub use broadcast::ChannelSettings;
pub use rejection::{RejectRequest, RejectionOutcome, RejectionReport};
pub use retry::RetryPolicy;

use crate::atoms::constants::{DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_MS};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{AuditSink, BroadcastChannel, ChainClient, UserNotifier};
use crate::atoms::types::{PendingTransaction, SwapParams, SwapResult, SwapStatus, TxKind, TxStatus};
use crate::engine::context::RequestContext;
use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Something that can execute swaps on behalf of the lifecycle engine.
/// Implemented by the aggregator.
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    /// `provider` pins a provider; `None` executes with the best quote.
    async fn execute(
        &self,
        ctx: &RequestContext,
        provider: Option<&str>,
        params: &SwapParams,
    ) -> EngineResult<SwapResult>;
}

// ── Configuration ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub poll_interval: Duration,
    /// How long a broadcast may stay unconfirmed before it is resubmitted.
    pub confirmation_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        LifecycleConfig {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

// ── Requests / queries ─────────────────────────────────────────────────────

/// A transfer that has already been signed by the chain client.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub chain_id: String,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub token: String,
    pub raw_tx: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxFilter {
    #[serde(default)]
    pub status: Option<TxStatus>,
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleStats {
    pub pending: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub rejected: usize,
}

/// What a monitor needs to resubmit its transaction.
pub(crate) enum Resubmit {
    Swap { provider: Option<String>, params: SwapParams },
    Transfer { raw_tx: Vec<u8> },
}

struct ChainEntry {
    client: Arc<dyn ChainClient>,
    required_confirmations: u64,
}

// ── Engine ─────────────────────────────────────────────────────────────────

struct Inner {
    executor: Arc<dyn SwapExecutor>,
    config: LifecycleConfig,
    chains: RwLock<HashMap<String, ChainEntry>>,
    channels: RwLock<HashMap<String, Arc<dyn BroadcastChannel>>>,
    channel_settings: RwLock<Vec<ChannelSettings>>,
    pending: Mutex<HashMap<String, PendingTransaction>>,
    notifier: RwLock<Option<Arc<dyn UserNotifier>>>,
    audit: RwLock<Option<Arc<dyn AuditSink>>>,
    /// Parent of every monitor's context; cancelled on shutdown.
    root: RequestContext,
}

#[derive(Clone)]
pub struct TransactionEngine {
    inner: Arc<Inner>,
}

impl TransactionEngine {
    pub fn new(executor: Arc<dyn SwapExecutor>, config: LifecycleConfig) -> Self {
        TransactionEngine {
            inner: Arc::new(Inner {
                executor,
                config,
                chains: RwLock::new(HashMap::new()),
                channels: RwLock::new(HashMap::new()),
                channel_settings: RwLock::new(Vec::new()),
                pending: Mutex::new(HashMap::new()),
                notifier: RwLock::new(None),
                audit: RwLock::new(None),
                root: RequestContext::new(),
            }),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.config
    }

    pub fn register_chain(&self, client: Arc<dyn ChainClient>, required_confirmations: u64) {
        let chain_id = client.chain_id().to_string();
        info!("[lifecycle] Chain '{}' registered ({} confirmation(s) required)", chain_id, required_confirmations);
        self.inner.chains.write().insert(
            chain_id,
            ChainEntry { client, required_confirmations: required_confirmations.max(1) },
        );
    }

    pub fn chain_client(&self, chain_id: &str) -> Option<Arc<dyn ChainClient>> {
        self.inner.chain_client(chain_id)
    }

    /// Chain ids with a registered client, sorted.
    pub fn chain_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.chains.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Register a relay. `settings.name` is replaced by the channel's own name.
    pub fn register_channel(&self, channel: Arc<dyn BroadcastChannel>, mut settings: ChannelSettings) {
        let name = channel.name().to_string();
        settings.name = name.clone();
        {
            let mut all = self.inner.channel_settings.write();
            all.retain(|s| s.name != name);
            all.push(settings);
        }
        self.inner.channels.write().insert(name.clone(), channel);
        info!("[lifecycle] Broadcast channel '{}' registered", name);
    }

    pub fn set_notifier(&self, notifier: Arc<dyn UserNotifier>) {
        *self.inner.notifier.write() = Some(notifier);
    }

    pub fn set_audit_sink(&self, sink: Arc<dyn AuditSink>) {
        *self.inner.audit.write() = Some(sink);
    }

    /// Highest-priority enabled, registered channel serving `chain_id`.
    pub fn select_channel(&self, chain_id: &str) -> Option<String> {
        self.inner.select_channel(chain_id)
    }

    /// Stop every monitor. Records stay as they are.
    pub fn shutdown(&self) {
        info!("[lifecycle] Shutting down transaction monitors");
        self.inner.root.cancel();
    }

    // ── Submission ─────────────────────────────────────────────────────────

    /// Execute a swap and start tracking it. Execution failures before the
    /// first successful broadcast are retried inline; if none succeeds the
    /// last error is returned and nothing is tracked.
    pub async fn submit_swap(
        &self,
        ctx: &RequestContext,
        provider: Option<&str>,
        params: SwapParams,
    ) -> EngineResult<String> {
        params.validate()?;
        let required = self.inner.required_confirmations(&params.chain_id)?;
        let policy = &self.inner.config.retry;

        let mut attempts = 0u32;
        let mut bps = 0u32;
        let result = loop {
            match self.inner.execute_swap_once(ctx, provider, &params, bps).await {
                Ok(result) => break result,
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => match policy.next_slippage_bps(attempts, bps) {
                    Some(next) => {
                        warn!(
                            "[lifecycle] Swap execution failed ({}), retrying with +{} bps slippage",
                            e, next
                        );
                        attempts += 1;
                        bps = next;
                        ctx.sleep(policy.retry_delay).await?;
                    }
                    None => {
                        warn!("[lifecycle] Swap execution failed after {} retr(ies): {}", attempts, e);
                        return Err(e);
                    }
                },
            }
        };

        let tx = PendingTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            hash: result.tx_hash,
            chain_id: params.chain_id.clone(),
            from: params.from_address.clone(),
            to: params.to_address.clone(),
            amount: params.amount().to_string(),
            token: format!("{}->{}", params.token_in, params.token_out),
            kind: TxKind::Swap,
            status: TxStatus::Pending,
            confirmations: 0,
            required_confirmations: required,
            submitted_at: Utc::now(),
            last_checked: None,
            attempts,
            slippage_increase_bps: bps,
            last_error: None,
            rejection: None,
        };
        info!(
            "[lifecycle] Swap {} broadcast via '{}' as {}",
            tx.id, result.provider, tx.hash
        );
        Ok(self.track(tx, Resubmit::Swap { provider: provider.map(str::to_string), params }))
    }

    /// Broadcast a signed transfer through the selected channel and start
    /// tracking it. Resubmission re-broadcasts the same bytes.
    pub async fn submit_transfer(&self, ctx: &RequestContext, req: TransferRequest) -> EngineResult<String> {
        for (field, value) in [
            ("chain_id", &req.chain_id),
            ("from", &req.from),
            ("to", &req.to),
            ("amount", &req.amount),
            ("token", &req.token),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::MissingRequiredField(field.into()));
            }
        }
        if req.raw_tx.is_empty() {
            return Err(EngineError::MissingRequiredField("raw_tx".into()));
        }
        let required = self.inner.required_confirmations(&req.chain_id)?;
        if let Some(client) = self.inner.chain_client(&req.chain_id) {
            if !client.validate_address(&req.to) {
                return Err(EngineError::InvalidAddress(req.to.clone()));
            }
        }

        let policy = &self.inner.config.retry;
        let mut attempts = 0u32;
        let hash = loop {
            match self.inner.broadcast_once(ctx, &req.chain_id, &req.raw_tx).await {
                Ok(hash) => break hash,
                Err(e) if !e.is_retryable() || !policy.allows_attempt(attempts) => return Err(e),
                Err(e) => {
                    warn!("[lifecycle] Broadcast failed ({}), retrying", e);
                    attempts += 1;
                    ctx.sleep(policy.retry_delay).await?;
                }
            }
        };

        let tx = PendingTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            hash,
            chain_id: req.chain_id.clone(),
            from: req.from,
            to: req.to,
            amount: req.amount,
            token: req.token,
            kind: TxKind::Transfer,
            status: TxStatus::Pending,
            confirmations: 0,
            required_confirmations: required,
            submitted_at: Utc::now(),
            last_checked: None,
            attempts,
            slippage_increase_bps: 0,
            last_error: None,
            rejection: None,
        };
        info!("[lifecycle] Transfer {} broadcast on {} as {}", tx.id, tx.chain_id, tx.hash);
        Ok(self.track(tx, Resubmit::Transfer { raw_tx: req.raw_tx }))
    }

    fn track(&self, tx: PendingTransaction, plan: Resubmit) -> String {
        let id = tx.id.clone();
        self.inner.pending.lock().insert(id.clone(), tx);
        let inner = Arc::clone(&self.inner);
        let monitor_id = id.clone();
        tokio::spawn(async move { inner.monitor(monitor_id, plan).await });
        id
    }

    // ── Queries ────────────────────────────────────────────────────────────

    pub fn get_transaction(&self, id: &str) -> EngineResult<PendingTransaction> {
        self.inner
            .pending
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::TransactionNotFound(id.to_string()))
    }

    /// Newest first.
    pub fn list_transactions(&self, filter: &TxFilter) -> Vec<PendingTransaction> {
        let mut out: Vec<PendingTransaction> = self
            .inner
            .pending
            .lock()
            .values()
            .filter(|tx| filter.status.map_or(true, |s| tx.status == s))
            .filter(|tx| filter.chain_id.as_deref().map_or(true, |c| tx.chain_id == c))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        out
    }

    pub fn stats(&self) -> LifecycleStats {
        let mut stats = LifecycleStats::default();
        for tx in self.inner.pending.lock().values() {
            match tx.status {
                TxStatus::Pending => stats.pending += 1,
                TxStatus::Confirmed => stats.confirmed += 1,
                TxStatus::Failed => stats.failed += 1,
                TxStatus::Rejected => stats.rejected += 1,
            }
        }
        stats
    }
}

// ── Internals shared with monitor / rejection ──────────────────────────────

impl Inner {
    fn chain_client(&self, chain_id: &str) -> Option<Arc<dyn ChainClient>> {
        self.chains.read().get(chain_id).map(|c| Arc::clone(&c.client))
    }

    fn required_confirmations(&self, chain_id: &str) -> EngineResult<u64> {
        self.chains
            .read()
            .get(chain_id)
            .map(|c| c.required_confirmations)
            .ok_or_else(|| EngineError::invalid("chain_id", format!("chain '{}' is not configured", chain_id)))
    }

    fn select_channel(&self, chain_id: &str) -> Option<String> {
        let registered: HashSet<String> = self.channels.read().keys().cloned().collect();
        let settings = self.channel_settings.read();
        broadcast::select_channel(&settings, &registered, chain_id).map(str::to_string)
    }

    async fn execute_swap_once(
        &self,
        ctx: &RequestContext,
        provider: Option<&str>,
        base: &SwapParams,
        increase_bps: u32,
    ) -> EngineResult<SwapResult> {
        let params = retry::escalate(base, increase_bps);
        let result = ctx.run(self.executor.execute(ctx, provider, &params)).await?;
        if result.status == SwapStatus::Failed {
            return Err(EngineError::provider(
                &result.provider,
                format!("swap {} failed on submission", result.tx_hash),
            ));
        }
        Ok(result)
    }

    async fn broadcast_once(&self, ctx: &RequestContext, chain_id: &str, raw_tx: &[u8]) -> EngineResult<String> {
        let name = self.select_channel(chain_id).ok_or_else(|| {
            EngineError::invalid("chain_id", format!("no broadcast channel serves '{}'", chain_id))
        })?;
        let channel = self
            .channels
            .read()
            .get(&name)
            .cloned()
            .ok_or_else(|| EngineError::Internal(format!("channel '{}' vanished", name)))?;
        ctx.run(channel.broadcast(chain_id, raw_tx)).await
    }

    /// Apply `f` to a record that is still pending. Returns false when the
    /// record is gone or already terminal, in which case nothing changes.
    fn update_pending<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut PendingTransaction),
    {
        let mut table = self.pending.lock();
        match table.get_mut(id) {
            Some(tx) if tx.status == TxStatus::Pending => {
                f(tx);
                true
            }
            _ => false,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::TxInclusion;
    use crate::engine::testing::{swap_params, MockChain, MockChannel};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails its first `failures` calls with a retryable error, then succeeds.
    /// Records the slippage it was asked to use.
    pub(super) struct ScriptedExecutor {
        failures: usize,
        calls: AtomicUsize,
        pub(super) slippages: Mutex<Vec<f64>>,
    }

    impl ScriptedExecutor {
        pub(super) fn new(failures: usize) -> Self {
            ScriptedExecutor { failures, calls: AtomicUsize::new(0), slippages: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl SwapExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            _ctx: &RequestContext,
            _provider: Option<&str>,
            params: &SwapParams,
        ) -> EngineResult<SwapResult> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.slippages.lock().push(params.slippage);
            if n < self.failures {
                return Err(EngineError::NetworkTimeout("rpc stalled".into()));
            }
            Ok(SwapResult {
                tx_hash: format!("0xswap{}", n),
                status: SwapStatus::Pending,
                gas_used: 100_000,
                provider: "mock".into(),
                executed_at: Utc::now(),
            })
        }
    }

    pub(super) fn fast_config(max_retries: u32, inc: u32, cap: u32) -> LifecycleConfig {
        LifecycleConfig {
            poll_interval: Duration::from_millis(10),
            confirmation_timeout: Duration::from_secs(30),
            retry: RetryPolicy {
                max_retries,
                slippage_increment_bps: inc,
                max_total_slippage_bps: cap,
                retry_delay: Duration::from_millis(1),
            },
        }
    }

    pub(super) async fn wait_for_status(engine: &TransactionEngine, id: &str, status: TxStatus) -> PendingTransaction {
        for _ in 0..300 {
            let tx = engine.get_transaction(id).unwrap();
            if tx.status == status {
                return tx;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("transaction {} never reached {}", id, status);
    }

    #[tokio::test]
    async fn test_swap_confirms() {
        let engine = TransactionEngine::new(Arc::new(ScriptedExecutor::new(0)), fast_config(3, 50, 200));
        engine.register_chain(
            Arc::new(MockChain::new("ethereum").with_default(TxInclusion::Included { confirmations: 3 })),
            2,
        );
        let id = engine.submit_swap(&RequestContext::new(), None, swap_params("ethereum")).await.unwrap();
        let tx = wait_for_status(&engine, &id, TxStatus::Confirmed).await;
        assert_eq!(tx.confirmations, 3);
        assert_eq!(tx.required_confirmations, 2);
        assert_eq!(tx.kind, TxKind::Swap);
        assert!(tx.last_checked.is_some());
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_inline_retry_before_first_broadcast() {
        let exec = Arc::new(ScriptedExecutor::new(2));
        let engine = TransactionEngine::new(exec.clone(), fast_config(3, 50, 200));
        engine.register_chain(Arc::new(MockChain::new("ethereum")), 1);

        let id = engine.submit_swap(&RequestContext::new(), None, swap_params("ethereum")).await.unwrap();
        let tx = engine.get_transaction(&id).unwrap();
        assert_eq!(tx.attempts, 2);
        assert_eq!(tx.slippage_increase_bps, 100);
        assert_eq!(tx.hash, "0xswap2");

        let seen = exec.slippages.lock().clone();
        assert_eq!(seen.len(), 3);
        assert!((seen[2] - 0.015).abs() < 1e-9);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_all_attempts_fail_returns_error_without_record() {
        let engine = TransactionEngine::new(Arc::new(ScriptedExecutor::new(100)), fast_config(2, 50, 200));
        engine.register_chain(Arc::new(MockChain::new("ethereum")), 1);
        let err = engine.submit_swap(&RequestContext::new(), None, swap_params("ethereum")).await.unwrap_err();
        assert!(matches!(err, EngineError::NetworkTimeout(_)));
        assert!(engine.list_transactions(&TxFilter::default()).is_empty());
    }

    #[tokio::test]
    async fn test_revert_retries_until_slippage_cap() {
        let exec = Arc::new(ScriptedExecutor::new(0));
        let engine = TransactionEngine::new(exec.clone(), fast_config(10, 50, 120));
        engine.register_chain(
            Arc::new(MockChain::new("ethereum").with_default(TxInclusion::Reverted { reason: "slippage".into() })),
            1,
        );

        let id = engine.submit_swap(&RequestContext::new(), None, swap_params("ethereum")).await.unwrap();
        let tx = wait_for_status(&engine, &id, TxStatus::Failed).await;
        assert_eq!(tx.attempts, 2);
        assert_eq!(tx.slippage_increase_bps, 100);
        assert!(tx.slippage_increase_bps <= 120);
        assert!(tx.last_error.as_deref().unwrap_or_default().contains("reverted"));
        assert_eq!(exec.slippages.lock().len(), 3);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_confirmation_timeout_triggers_retry() {
        let mut config = fast_config(1, 50, 200);
        config.confirmation_timeout = Duration::from_millis(30);
        let engine = TransactionEngine::new(Arc::new(ScriptedExecutor::new(0)), config);
        engine.register_chain(Arc::new(MockChain::new("ethereum")), 1);

        let id = engine.submit_swap(&RequestContext::new(), None, swap_params("ethereum")).await.unwrap();
        let tx = wait_for_status(&engine, &id, TxStatus::Failed).await;
        assert_eq!(tx.attempts, 1);
        assert!(tx.last_error.unwrap().contains("not confirmed"));
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_resubmission_changes_hash_not_id() {
        let chain = Arc::new(MockChain::new("ethereum"));
        chain.set_inclusion("0xswap0", TxInclusion::Reverted { reason: "out of gas".into() });
        chain.set_inclusion("0xswap1", TxInclusion::Included { confirmations: 1 });
        let engine = TransactionEngine::new(Arc::new(ScriptedExecutor::new(0)), fast_config(3, 50, 200));
        engine.register_chain(chain, 1);

        let id = engine.submit_swap(&RequestContext::new(), None, swap_params("ethereum")).await.unwrap();
        let tx = wait_for_status(&engine, &id, TxStatus::Confirmed).await;
        assert_eq!(tx.id, id);
        assert_eq!(tx.hash, "0xswap1");
        assert_eq!(tx.attempts, 1);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_unconfigured_chain_rejected() {
        let engine = TransactionEngine::new(Arc::new(ScriptedExecutor::new(0)), fast_config(1, 50, 200));
        let err = engine.submit_swap(&RequestContext::new(), None, swap_params("base")).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_transfer_through_selected_channel() {
        let engine = TransactionEngine::new(Arc::new(ScriptedExecutor::new(0)), fast_config(1, 50, 200));
        engine.register_chain(
            Arc::new(MockChain::new("solana").with_default(TxInclusion::Included { confirmations: 1 })),
            1,
        );
        let rpc = Arc::new(MockChannel::new("rpc"));
        let jito = Arc::new(MockChannel::new("jito"));
        engine.register_channel(rpc.clone(), ChannelSettings::new("rpc", 1));
        engine.register_channel(jito.clone(), ChannelSettings::new("jito", 5));
        assert_eq!(engine.select_channel("solana").as_deref(), Some("jito"));

        let id = engine
            .submit_transfer(
                &RequestContext::new(),
                TransferRequest {
                    chain_id: "solana".into(),
                    from: "A".into(),
                    to: "B".into(),
                    amount: "1.5".into(),
                    token: "SOL".into(),
                    raw_tx: b"signed".to_vec(),
                },
            )
            .await
            .unwrap();
        let tx = wait_for_status(&engine, &id, TxStatus::Confirmed).await;
        assert_eq!(tx.kind, TxKind::Transfer);
        assert!(tx.hash.starts_with("0xjito-"));
        assert_eq!(jito.sent(), 1);
        assert_eq!(rpc.sent(), 0);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_transfer_without_channel_fails() {
        let engine = TransactionEngine::new(Arc::new(ScriptedExecutor::new(0)), fast_config(1, 50, 200));
        engine.register_chain(Arc::new(MockChain::new("solana")), 1);
        let err = engine
            .submit_transfer(
                &RequestContext::new(),
                TransferRequest {
                    chain_id: "solana".into(),
                    from: "A".into(),
                    to: "B".into(),
                    amount: "1".into(),
                    token: "SOL".into(),
                    raw_tx: vec![1],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let engine = TransactionEngine::new(Arc::new(ScriptedExecutor::new(0)), fast_config(1, 50, 200));
        engine.register_chain(
            Arc::new(MockChain::new("ethereum").with_default(TxInclusion::Included { confirmations: 5 })),
            1,
        );
        engine.register_chain(Arc::new(MockChain::new("bsc")), 1);
        let eth = engine.submit_swap(&RequestContext::new(), None, swap_params("ethereum")).await.unwrap();
        engine.submit_swap(&RequestContext::new(), None, swap_params("bsc")).await.unwrap();
        wait_for_status(&engine, &eth, TxStatus::Confirmed).await;

        let confirmed = engine.list_transactions(&TxFilter { status: Some(TxStatus::Confirmed), ..Default::default() });
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].id, eth);

        let bsc = engine.list_transactions(&TxFilter { chain_id: Some("bsc".into()), ..Default::default() });
        assert_eq!(bsc.len(), 1);
        assert_eq!(engine.list_transactions(&TxFilter { limit: Some(1), ..Default::default() }).len(), 1);
        assert!(matches!(engine.get_transaction("nope"), Err(EngineError::TransactionNotFound(_))));
        assert_eq!(engine.stats().confirmed, 1);
        engine.shutdown();
    }
}
