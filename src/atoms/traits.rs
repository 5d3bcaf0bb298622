// ── Keyhost Atoms: Capability Traits ───────────────────────────────────────
// The seams between the core and its external collaborators. Concrete DEX
// clients, chain clients and relays implement these; the core only ever
// holds `Arc<dyn Trait>`.

use crate::atoms::error::EngineResult;
use crate::atoms::types::{
    ApprovalDecision, ApprovalRequest, GasEstimate, SigningKey, SwapParams, SwapQuote, SwapResult, TransferDraft, TxInclusion,
};
use async_trait::async_trait;

/// A DEX / liquidity-source integration.
#[async_trait]
pub trait DexProvider: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &str;

    fn is_supported(&self, chain_id: &str) -> bool;

    async fn get_quote(&self, params: &SwapParams) -> EngineResult<SwapQuote>;

    async fn execute_swap(&self, params: &SwapParams) -> EngineResult<SwapResult>;

    async fn estimate_gas(&self, params: &SwapParams) -> EngineResult<GasEstimate>;
}

/// A per-chain client. Validation methods are synchronous format checks.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> &str;

    fn validate_address(&self, address: &str) -> bool;

    fn validate_token_address(&self, token: &str) -> bool;

    /// Balance as a decimal string.
    async fn get_balance(&self, address: &str, token: &str) -> EngineResult<String>;

    async fn get_confirmations(&self, tx_hash: &str) -> EngineResult<TxInclusion>;

    /// Public address for a secret.
    fn derive_address(&self, secret: &SigningKey) -> EngineResult<String>;

    /// Chain-native message signature, hex or base58 as the chain prefers.
    fn sign_message(&self, secret: &SigningKey, message: &[u8]) -> EngineResult<String>;

    /// Build and sign a transfer; returns raw transaction bytes ready to broadcast.
    async fn sign_transfer(&self, secret: &SigningKey, draft: &TransferDraft) -> EngineResult<Vec<u8>>;
}

/// A named relay that submits signed transactions (direct RPC, MEV-protected
/// relay, exchange relay...).
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the transaction hash.
    async fn broadcast(&self, chain_id: &str, raw_tx: &[u8]) -> EngineResult<String>;
}

/// User-facing notification sink (the extension channel in production).
#[async_trait]
pub trait UserNotifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> EngineResult<()>;
}

/// Append-only audit log. Returns the entry's correlation id.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, action: &str, entry: serde_json::Value) -> EngineResult<String>;
}

/// Asks the user to approve an agent-initiated action.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(&self, request: &ApprovalRequest) -> EngineResult<ApprovalDecision>;
}
