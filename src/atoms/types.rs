// ── Keyhost Atoms: Domain Types ────────────────────────────────────────────
// Plain data shared by the aggregator, the lifecycle engine, the vault and
// the peer surfaces. No I/O here.

use crate::atoms::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

// ═════════════════════════════════════════════════════════════════════════════
// Key material
// ═════════════════════════════════════════════════════════════════════════════

/// Raw signing key bytes. Zeroized on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        SigningKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey([REDACTED; {}])", self.0.len())
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Swaps
// ═════════════════════════════════════════════════════════════════════════════

/// An immutable swap request. Exactly one of `amount_in` / `amount_out` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapParams {
    pub token_in: String,
    pub token_out: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_out: Option<String>,
    /// Fraction in [0, 1].
    pub slippage: f64,
    pub from_address: String,
    pub to_address: String,
    pub chain_id: String,
    #[serde(skip)]
    pub signing_key: Option<SigningKey>,
}

impl SwapParams {
    /// Reject malformed requests before any side effect.
    pub fn validate(&self) -> EngineResult<()> {
        for (field, value) in [
            ("token_in", &self.token_in),
            ("token_out", &self.token_out),
            ("from_address", &self.from_address),
            ("to_address", &self.to_address),
            ("chain_id", &self.chain_id),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::MissingRequiredField(field.into()));
            }
        }

        match (&self.amount_in, &self.amount_out) {
            (Some(_), Some(_)) => {
                return Err(EngineError::invalid(
                    "amount",
                    "amount_in and amount_out are mutually exclusive",
                ))
            }
            (None, None) => return Err(EngineError::MissingRequiredField("amount_in".into())),
            (Some(a), None) | (None, Some(a)) if a.trim().is_empty() => {
                return Err(EngineError::MissingRequiredField("amount".into()))
            }
            _ => {}
        }

        if !self.slippage.is_finite() || !(0.0..=1.0).contains(&self.slippage) {
            return Err(EngineError::invalid(
                "slippage",
                format!("{} is outside [0, 1]", self.slippage),
            ));
        }
        Ok(())
    }

    /// The one amount that is set.
    pub fn amount(&self) -> &str {
        self.amount_in
            .as_deref()
            .or(self.amount_out.as_deref())
            .unwrap_or_default()
    }

    pub fn is_exact_in(&self) -> bool {
        self.amount_in.is_some()
    }

    /// Copy of the request with a different slippage tolerance, capped at 1.
    pub fn with_slippage(&self, slippage: f64) -> Self {
        let mut next = self.clone();
        next.slippage = slippage.clamp(0.0, 1.0);
        next
    }
}

/// A provider's priced, time-bounded offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub amount_in: String,
    pub amount_out: String,
    /// Percent.
    pub price_impact: f64,
    pub provider: String,
    pub route: Vec<String>,
    pub valid_until: DateTime<Utc>,
}

impl SwapQuote {
    pub fn is_expired(&self) -> bool {
        self.valid_until <= Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Outcome of one execution attempt. A retry yields a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapResult {
    pub tx_hash: String,
    pub status: SwapStatus,
    pub gas_used: u64,
    pub provider: String,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasEstimate {
    pub gas_limit: u64,
    /// Decimal string in the chain's native fee unit.
    pub gas_price: String,
}

// ═════════════════════════════════════════════════════════════════════════════
// Transactions
// ═════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Transfer,
    Swap,
    Contract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
    Rejected,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Failed => write!(f, "failed"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionInfo {
    pub reason: String,
    pub details: String,
    pub rejected_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,
}

/// The lifecycle engine's canonical record of a submitted transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Stable identifier handed to callers; survives resubmission.
    pub id: String,
    /// Hash of the latest broadcast.
    pub hash: String,
    pub chain_id: String,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub token: String,
    pub kind: TxKind,
    pub status: TxStatus,
    pub confirmations: u64,
    pub required_confirmations: u64,
    pub submitted_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
    /// Resubmissions performed so far.
    pub attempts: u32,
    /// Cumulative slippage escalation applied by retries.
    pub slippage_increase_bps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionInfo>,
}

/// Chain-reported state of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxInclusion {
    /// Not (yet) in a block.
    NotFound,
    Included { confirmations: u64 },
    /// Included but execution failed on chain.
    Reverted { reason: String },
}

/// Unsigned transfer handed to a chain client for signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferDraft {
    pub chain_id: String,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub token: String,
}

// ═════════════════════════════════════════════════════════════════════════════
// User approval
// ═════════════════════════════════════════════════════════════════════════════

/// What the user is asked to approve before an agent-initiated action runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<String>,
    /// One-line human summary shown in the prompt.
    pub summary: String,
    #[serde(default)]
    pub details: serde_json::Value,
    /// Ask the user for a new password (wallet creation).
    #[serde(default)]
    pub needs_password: bool,
}

#[derive(Clone, Default, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for ApprovalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalDecision")
            .field("approved", &self.approved)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Drop for ApprovalDecision {
    fn drop(&mut self) {
        if let Some(p) = self.password.as_mut() {
            p.zeroize();
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Crypto-at-rest envelope
// ═════════════════════════════════════════════════════════════════════════════

/// `ciphertext` is base64(nonce || ciphertext || tag); `salt` is base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub ciphertext: String,
    pub salt: String,
}
