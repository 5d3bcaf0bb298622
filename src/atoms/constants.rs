// ── Keyhost Atoms: Constants ───────────────────────────────────────────────
// All named constants for the crate live here.

// ── Crypto-at-rest ─────────────────────────────────────────────────────────
// Changing any of these makes existing wallet envelopes undecryptable.
// Treat as stable format identifiers.
pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const SALT_LEN: usize = 32;
pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;

// ── Quote selection ────────────────────────────────────────────────────────
/// Two output amounts closer than this (relative to the larger) are a tie,
/// resolved by provider priority.
pub const QUOTE_TIE_THRESHOLD: f64 = 0.001;
/// Slippage tolerance for peer swaps that do not name one (0.5%).
pub const DEFAULT_SWAP_SLIPPAGE: f64 = 0.005;

// ── Framed peer protocol ───────────────────────────────────────────────────
pub const FRAME_HEADER_LEN: usize = 4;
/// Inbound frames above this size mean the stream is corrupt.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;
pub const READ_CHUNK_LEN: usize = 8 * 1024;
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 30_000;

pub const MSG_RPC_REQUEST: &str = "rpc_request";
pub const MSG_RPC_RESPONSE: &str = "rpc_response";
pub const MSG_ERROR: &str = "error";
pub const MSG_EVENT: &str = "event";
pub const MSG_PING: &str = "ping";
pub const MSG_PONG: &str = "pong";

// ── Transaction lifecycle defaults ─────────────────────────────────────────
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SLIPPAGE_INCREMENT_BPS: u32 = 50;
pub const DEFAULT_MAX_TOTAL_SLIPPAGE_BPS: u32 = 200;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;
pub const DEFAULT_REQUIRED_CONFIRMATIONS: u64 = 1;

// ── Host process ───────────────────────────────────────────────────────────
pub const PID_FILE_NAME: &str = "keyhost.pid";
pub const WALLETS_DIR: &str = "wallets";
/// Set to "1" to skip the single-instance guard (parallel test hosts).
pub const ISOLATED_ENV_VAR: &str = "KEYHOST_ISOLATED";
pub const HOST_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Time given to in-flight replies (the `shutdown` answer itself) before exit.
pub const SHUTDOWN_GRACE_MS: u64 = 250;
