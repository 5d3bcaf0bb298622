// Keyhost Engine — In-memory collaborators for unit tests.

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{Approver, AuditSink, BroadcastChannel, ChainClient, DexProvider, UserNotifier};
use crate::atoms::types::{
    ApprovalDecision, ApprovalRequest, GasEstimate, SigningKey, SwapParams, SwapQuote, SwapResult, SwapStatus, TransferDraft, TxInclusion,
};
use crate::engine::config::HostConfig;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn swap_params(chain_id: &str) -> SwapParams {
    SwapParams {
        token_in: "ETH".into(),
        token_out: "USDC".into(),
        amount_in: Some("1".into()),
        amount_out: None,
        slippage: 0.005,
        from_address: "0x1111111111111111111111111111111111111111".into(),
        to_address: "0x2222222222222222222222222222222222222222".into(),
        chain_id: chain_id.into(),
        signing_key: None,
    }
}

/// Two chains (EVM "ethereum", Solana "solana"), one provider, fast polling.
pub fn host_config() -> HostConfig {
    HostConfig::parse(
        r#"
[[chains]]
id = "ethereum"
name = "Ethereum"
family = "evm"
tokens = [
  { symbol = "ETH", decimals = 18 },
  { symbol = "USDC", address = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", decimals = 6 },
]

[[chains]]
id = "solana"
name = "Solana"
family = "solana"
tokens = [{ symbol = "SOL", decimals = 9 }]

[[providers]]
name = "uniswap"
priority = 10

[retry]
retry_delay_ms = 10

[confirmation]
poll_interval_ms = 20
timeout_secs = 60
"#,
    )
    .expect("test config parses")
}

// ── DEX provider ───────────────────────────────────────────────────────────

pub struct MockProvider {
    name: String,
    chains: Vec<String>,
    amount_out: String,
    delay_ms: u64,
    fail: bool,
    expired: bool,
    valid_for_ms: Option<u64>,
    quotes: AtomicUsize,
    swaps: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: &str, chains: &[&str], amount_out: &str) -> Self {
        MockProvider {
            name: name.into(),
            chains: chains.iter().map(|c| c.to_string()).collect(),
            amount_out: amount_out.into(),
            delay_ms: 0,
            fail: false,
            expired: false,
            valid_for_ms: None,
            quotes: AtomicUsize::new(0),
            swaps: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn expired(mut self) -> Self {
        self.expired = true;
        self
    }

    /// Quotes stay valid for `ms` instead of 30 s.
    pub fn with_validity(mut self, ms: u64) -> Self {
        self.valid_for_ms = Some(ms);
        self
    }

    pub fn quote_calls(&self) -> usize {
        self.quotes.load(Ordering::SeqCst)
    }

    pub fn swap_calls(&self) -> usize {
        self.swaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DexProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_supported(&self, chain_id: &str) -> bool {
        self.chains.iter().any(|c| c == chain_id)
    }

    async fn get_quote(&self, params: &SwapParams) -> EngineResult<SwapQuote> {
        self.quotes.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail {
            return Err(EngineError::provider(&self.name, "mock failure"));
        }
        let valid_until = match (self.expired, self.valid_for_ms) {
            (true, _) => Utc::now() - chrono::Duration::seconds(5),
            (false, Some(ms)) => Utc::now() + chrono::Duration::milliseconds(ms as i64),
            (false, None) => Utc::now() + chrono::Duration::seconds(30),
        };
        Ok(SwapQuote {
            amount_in: params.amount().to_string(),
            amount_out: self.amount_out.clone(),
            price_impact: 0.1,
            provider: String::new(),
            route: vec![params.token_in.clone(), params.token_out.clone()],
            valid_until,
        })
    }

    async fn execute_swap(&self, _params: &SwapParams) -> EngineResult<SwapResult> {
        if self.fail {
            return Err(EngineError::provider(&self.name, "mock failure"));
        }
        let n = self.swaps.fetch_add(1, Ordering::SeqCst);
        Ok(SwapResult {
            tx_hash: format!("0x{}{:04}", self.name, n),
            status: SwapStatus::Pending,
            gas_used: 21_000,
            provider: self.name.clone(),
            executed_at: Utc::now(),
        })
    }

    async fn estimate_gas(&self, _params: &SwapParams) -> EngineResult<GasEstimate> {
        Ok(GasEstimate { gas_limit: 150_000, gas_price: "20".into() })
    }
}

// ── Chain client ───────────────────────────────────────────────────────────

/// Reports whatever inclusion state a test scripted for each hash, falling
/// back to `default_inclusion`.
pub struct MockChain {
    chain_id: String,
    default_inclusion: Mutex<TxInclusion>,
    inclusions: Mutex<HashMap<String, TxInclusion>>,
}

impl MockChain {
    pub fn new(chain_id: &str) -> Self {
        MockChain {
            chain_id: chain_id.into(),
            default_inclusion: Mutex::new(TxInclusion::NotFound),
            inclusions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default(self, inclusion: TxInclusion) -> Self {
        *self.default_inclusion.lock() = inclusion;
        self
    }

    pub fn set_inclusion(&self, hash: &str, inclusion: TxInclusion) {
        self.inclusions.lock().insert(hash.to_string(), inclusion);
    }
}

fn digest_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

#[async_trait]
impl ChainClient for MockChain {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    fn validate_address(&self, address: &str) -> bool {
        !address.trim().is_empty()
    }

    fn validate_token_address(&self, token: &str) -> bool {
        !token.trim().is_empty()
    }

    async fn get_balance(&self, _address: &str, _token: &str) -> EngineResult<String> {
        Ok("42.5".into())
    }

    async fn get_confirmations(&self, tx_hash: &str) -> EngineResult<TxInclusion> {
        let scripted = self.inclusions.lock().get(tx_hash).cloned();
        Ok(scripted.unwrap_or_else(|| self.default_inclusion.lock().clone()))
    }

    fn derive_address(&self, secret: &SigningKey) -> EngineResult<String> {
        Ok(format!("0x{}", &digest_hex(&[secret.as_bytes()])[..40]))
    }

    fn sign_message(&self, secret: &SigningKey, message: &[u8]) -> EngineResult<String> {
        Ok(digest_hex(&[secret.as_bytes(), message]))
    }

    async fn sign_transfer(&self, secret: &SigningKey, draft: &TransferDraft) -> EngineResult<Vec<u8>> {
        let body = serde_json::to_vec(draft)?;
        Ok(digest_hex(&[secret.as_bytes(), &body]).into_bytes())
    }
}

// ── Broadcast channel ──────────────────────────────────────────────────────

pub struct MockChannel {
    name: String,
    sent: AtomicUsize,
}

impl MockChannel {
    pub fn new(name: &str) -> Self {
        MockChannel { name: name.into(), sent: AtomicUsize::new(0) }
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BroadcastChannel for MockChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn broadcast(&self, _chain_id: &str, raw_tx: &[u8]) -> EngineResult<String> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0x{}-{}-{}", self.name, &digest_hex(&[raw_tx])[..8], n))
    }
}

// ── Notification / audit sinks ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl UserNotifier for RecordingNotifier {
    async fn notify(&self, title: &str, body: &str) -> EngineResult<()> {
        self.sent.lock().push((title.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAudit {
    pub entries: Mutex<Vec<(String, serde_json::Value)>>,
}

#[async_trait]
impl AuditSink for MemoryAudit {
    async fn record(&self, action: &str, entry: serde_json::Value) -> EngineResult<String> {
        let mut entries = self.entries.lock();
        entries.push((action.to_string(), entry));
        Ok(format!("audit-{}", entries.len()))
    }
}

// ── Approval ───────────────────────────────────────────────────────────────

pub struct ScriptedApprover {
    approve: bool,
    password: Option<String>,
    delay_ms: u64,
    requests: Mutex<Vec<ApprovalRequest>>,
}

impl ScriptedApprover {
    pub fn approving(password: Option<&str>) -> Self {
        ScriptedApprover {
            approve: true,
            password: password.map(str::to_string),
            delay_ms: 0,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn declining() -> Self {
        ScriptedApprover { approve: false, password: None, delay_ms: 0, requests: Mutex::new(Vec::new()) }
    }

    /// The user takes `ms` to answer.
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Approver for ScriptedApprover {
    async fn approve(&self, request: &ApprovalRequest) -> EngineResult<ApprovalDecision> {
        self.requests.lock().push(request.clone());
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        Ok(ApprovalDecision { approved: self.approve, password: self.password.clone() })
    }
}
