// ── Keyhost Atoms: Error Types ─────────────────────────────────────────────
// Single canonical error enum for the host, built with `thiserror`.
//
// Design rules:
//   • Variants follow the user-facing taxonomy (validation, network, domain,
//     authorization) plus one variant per component failure mode.
//   • Every variant maps to a stable `code()` that peers can match on; the
//     `Display` text is for humans and may change.
//   • No variant carries secret material (keys, passwords, plaintext).

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    // ── Caller input ──
    /// A parameter is present but malformed.
    #[error("Invalid parameter '{field}': {message}")]
    InvalidParameter { field: String, message: String },

    /// A required field is absent or empty.
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    // ── External dependencies ──
    #[error("Network connection failed: {0}")]
    NetworkConnection(String),

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    #[error("RPC failure: {0}")]
    RpcFailure(String),

    // ── Domain validation ──
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Token not supported: {0}")]
    TokenNotSupported(String),

    #[error("Invalid token address: {0}")]
    InvalidTokenAddress(String),

    /// Authorization boundary violation (locked wallet, missing confirmation).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // ── Aggregator ──
    #[error("Provider already registered: {0}")]
    DuplicateProvider(String),

    #[error("No enabled provider supports chain {0}")]
    NoSupportedProvider(String),

    #[error("No provider returned a valid quote ({0} attempted)")]
    NoValidQuote(usize),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider {provider} does not support chain {chain_id}")]
    UnsupportedChain { provider: String, chain_id: String },

    /// Provider-side failure, surfaced verbatim.
    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Quote from {0} has expired")]
    QuoteExpired(String),

    // ── Lifecycle ──
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    // ── Peer protocol ──
    #[error("Write error: {0}")]
    WriteError(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Application error carried back in an RPC response.
    #[error("Remote error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Peer channel closed")]
    ChannelClosed,

    #[error("Operation cancelled")]
    Cancelled,

    // ── Crypto-at-rest ──
    #[error("Plaintext and password must be non-empty")]
    EmptyInput,

    #[error("Invalid encrypted data: {0}")]
    InvalidInput(String),

    /// Wrong password or tampered envelope. Deliberately carries no detail.
    #[error("Decryption failed: authentication tag mismatch")]
    AuthenticationFailed,

    // ── Ambient ──
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected defect; the original cause is kept in the message.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter { field: field.into(), message: message.into() }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::MissingRequiredField(_) => "MISSING_REQUIRED_FIELD",
            Self::NetworkConnection(_) => "NETWORK_CONNECTION",
            Self::NetworkTimeout(_) => "NETWORK_TIMEOUT",
            Self::RpcFailure(_) => "RPC_FAILURE",
            Self::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            Self::InvalidAddress(_) => "INVALID_ADDRESS",
            Self::WalletNotFound(_) => "WALLET_NOT_FOUND",
            Self::TokenNotSupported(_) => "TOKEN_NOT_SUPPORTED",
            Self::InvalidTokenAddress(_) => "INVALID_TOKEN_ADDRESS",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::DuplicateProvider(_) => "DUPLICATE_PROVIDER",
            Self::NoSupportedProvider(_) => "NO_SUPPORTED_PROVIDER",
            Self::NoValidQuote(_) => "NO_VALID_QUOTE",
            Self::ProviderNotFound(_) => "PROVIDER_NOT_FOUND",
            Self::UnsupportedChain { .. } => "UNSUPPORTED_CHAIN",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::QuoteExpired(_) => "QUOTE_EXPIRED",
            Self::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            Self::WriteError(_) => "WRITE_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::MethodNotFound(_) => "METHOD_NOT_FOUND",
            Self::Remote { .. } => "REMOTE_ERROR",
            Self::ChannelClosed => "CHANNEL_CLOSED",
            Self::Cancelled => "CANCELLED",
            Self::EmptyInput => "EMPTY_INPUT",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Remediation hint shown next to the message, where one exists.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidParameter { .. } | Self::MissingRequiredField(_) => {
                Some("Check the request parameters and try again.")
            }
            Self::NetworkConnection(_) | Self::NetworkTimeout(_) | Self::RpcFailure(_) => {
                Some("Check your network connection or RPC endpoint and retry.")
            }
            Self::InsufficientBalance(_) => Some("Top up the wallet or reduce the amount."),
            Self::InvalidAddress(_) => Some("Verify the address format for the selected chain."),
            Self::WalletNotFound(_) => Some("Create or import a wallet first."),
            Self::TokenNotSupported(_) | Self::InvalidTokenAddress(_) => {
                Some("Use a supported token symbol or a valid contract address.")
            }
            Self::Unauthorized(_) => Some("Unlock the wallet from the browser extension."),
            Self::NoSupportedProvider(_) | Self::UnsupportedChain { .. } => {
                Some("Enable a DEX provider for this chain in the host configuration.")
            }
            Self::NoValidQuote(_) | Self::QuoteExpired(_) => Some("Request a fresh quote."),
            Self::Timeout(_) => Some("The peer did not answer in time; retry the request."),
            Self::AuthenticationFailed => Some("Check the password."),
            Self::Config(_) => Some("Fix the configuration file and restart the host."),
            _ => None,
        }
    }

    /// JSON-RPC style numeric code used on the extension channel.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParameter { .. } | Self::MissingRequiredField(_) => -32602,
            Self::Remote { code, .. } => *code,
            Self::Unauthorized(_) | Self::AuthenticationFailed => -32001,
            Self::Timeout(_) | Self::NetworkTimeout(_) => -32002,
            _ => -32000,
        }
    }

    /// True for transient failures a retry policy may absorb.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkConnection(_)
                | Self::NetworkTimeout(_)
                | Self::RpcFailure(_)
                | Self::Provider { .. }
                | Self::QuoteExpired(_)
                | Self::Timeout(_)
        )
    }
}

// ── Serializable user view ─────────────────────────────────────────────────

/// What a peer sees when an operation fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&EngineError> for ErrorInfo {
    fn from(e: &EngineError) -> Self {
        ErrorInfo {
            code: e.code().to_string(),
            message: e.to_string(),
            suggestion: e.suggestion().map(str::to_string),
        }
    }
}

// ── Migration bridge: String → EngineError ─────────────────────────────────

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Internal(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Internal(s.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(e: toml::de::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All host operations return this type.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<EngineError> for String {
    fn from(e: EngineError) -> Self {
        e.to_string()
    }
}
