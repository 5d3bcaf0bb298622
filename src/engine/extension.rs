// Keyhost Engine — Browser Extension Surface
//
// RPC methods the extension calls over the framed peer channel, plus the
// reverse direction: approval prompts and notifications the host pushes to
// the extension.
//
// The extension is the user's own UI, so it may move funds and export keys,
// but only with the wallet password in hand; export and send also need an
// explicit `confirmed: true`.

use crate::atoms::constants::HOST_VERSION;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{Approver, UserNotifier};
use crate::atoms::types::{ApprovalDecision, ApprovalRequest};
use crate::engine::context::RequestContext;
use crate::engine::lifecycle::{RejectRequest, RejectionReport};
use crate::engine::peer::{PeerChannel, RpcOptions};
use crate::engine::state::{HostState, HostStatus, TransferIntent};
use crate::engine::vault::WalletInfo;
use async_trait::async_trait;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, Weak};
use zeroize::Zeroizing;

pub const METHOD_INIT: &str = "init";
pub const METHOD_STATUS: &str = "status";
pub const METHOD_SHUTDOWN: &str = "shutdown";
pub const METHOD_IMPORT_WALLET: &str = "import_wallet";
pub const METHOD_EXPORT_WALLET: &str = "export_wallet";
pub const METHOD_GET_WALLET_INFO: &str = "get_wallet_info";
pub const METHOD_SEND_TRANSACTION: &str = "send_transaction";
pub const METHOD_UNLOCK_WALLET: &str = "unlock_wallet";
pub const METHOD_LOCK_WALLET: &str = "lock_wallet";
pub const METHOD_LIST_WALLETS: &str = "list_wallets";
pub const METHOD_REJECT_TRANSACTIONS: &str = "reject_transactions";

/// Host → extension.
pub const METHOD_APPROVE_ACTION: &str = "approve_action";

// ── Parameters ─────────────────────────────────────────────────────────────

/// Password or secret text from the wire. Zeroized on drop, never printed.
#[derive(Clone, Default)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    fn into_inner(self) -> Zeroizing<String> {
        self.0
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| Secret(Zeroizing::new(s)))
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InitParams {
    extension_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NoParams {}

#[derive(Debug, Deserialize)]
struct ImportParams {
    name: String,
    chain_id: String,
    secret: Secret,
    #[serde(default)]
    password: Secret,
}

#[derive(Debug, Deserialize)]
struct PasswordParams {
    name: String,
    #[serde(default)]
    password: Secret,
}

#[derive(Debug, Deserialize)]
struct ExportParams {
    name: String,
    #[serde(default)]
    password: Secret,
    #[serde(default)]
    confirmed: bool,
}

#[derive(Debug, Deserialize)]
struct SendParams {
    #[serde(flatten)]
    intent: TransferIntent,
    #[serde(default)]
    password: Secret,
    #[serde(default)]
    confirmed: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LockParams {
    /// `None` locks every wallet.
    name: Option<String>,
}

// ── Results ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct InitResult {
    host_version: String,
    pid: u32,
    wallets: Vec<WalletView>,
    chains: Vec<String>,
    agent_surface: bool,
}

#[derive(Debug, Serialize)]
struct WalletView {
    #[serde(flatten)]
    info: WalletInfo,
    unlocked: bool,
}

#[derive(Serialize)]
struct ExportResult {
    name: String,
    chain_id: String,
    address: String,
    secret: Zeroizing<String>,
}

#[derive(Debug, Serialize)]
struct SendResult {
    transaction_id: String,
    hash: String,
    status: String,
}

// ── Registration ───────────────────────────────────────────────────────────

fn parse_params<P: DeserializeOwned>(params: Value) -> EngineResult<P> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| EngineError::invalid("params", e.to_string()))
}

/// Typed wrapper over `register_rpc_method`: parse params, run, serialize.
fn register<P, R, F, Fut>(channel: &PeerChannel, state: &Arc<HostState>, name: &str, method: F)
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(Arc<HostState>, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EngineResult<R>> + Send + 'static,
{
    let state = Arc::clone(state);
    let name_owned = name.to_string();
    channel.register_rpc_method(name, move |params: Value| {
        let call = parse_params::<P>(params).map(|p| method(Arc::clone(&state), p));
        let name = name_owned.clone();
        async move {
            let result = match call {
                Ok(fut) => fut.await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                warn!("[host] Extension call '{}' failed: {}", name, e);
            }
            let value = result?;
            serde_json::to_value(value).map_err(EngineError::from)
        }
    });
}

fn require_confirmed(confirmed: bool, action: &str) -> EngineResult<()> {
    if confirmed {
        Ok(())
    } else {
        Err(EngineError::Unauthorized(format!("{} requires explicit user confirmation", action)))
    }
}

fn wallet_views(state: &HostState) -> EngineResult<Vec<WalletView>> {
    Ok(state
        .wallets
        .list()?
        .into_iter()
        .map(|info| {
            let unlocked = state.is_unlocked(&info.name);
            WalletView { info, unlocked }
        })
        .collect())
}

// ── Methods ────────────────────────────────────────────────────────────────

async fn init(state: Arc<HostState>, p: InitParams) -> EngineResult<InitResult> {
    state.mark_initialized();
    info!(
        "[host] Extension connected (version {})",
        p.extension_version.as_deref().unwrap_or("unknown")
    );
    let mut chains: Vec<String> = state.config().chains.iter().map(|c| c.id.clone()).collect();
    chains.sort();
    Ok(InitResult {
        host_version: HOST_VERSION.to_string(),
        pid: std::process::id(),
        wallets: wallet_views(&state)?,
        chains,
        agent_surface: state.config().host.agent_surface,
    })
}

async fn status(state: Arc<HostState>, _: NoParams) -> EngineResult<HostStatus> {
    state.status()
}

async fn shutdown(state: Arc<HostState>, _: NoParams) -> EngineResult<Value> {
    state.request_shutdown();
    Ok(json!({ "shutting_down": true }))
}

async fn list_wallets(state: Arc<HostState>, _: NoParams) -> EngineResult<Vec<WalletView>> {
    wallet_views(&state)
}

async fn import_wallet(state: Arc<HostState>, p: ImportParams) -> EngineResult<WalletInfo> {
    state
        .import_wallet(&p.name, &p.chain_id, p.secret.into_inner(), p.password.into_inner())
        .await
}

async fn export_wallet(state: Arc<HostState>, p: ExportParams) -> EngineResult<ExportResult> {
    require_confirmed(p.confirmed, METHOD_EXPORT_WALLET)?;
    let key = state.open_wallet(&p.name, p.password.into_inner()).await?;
    let info = state.wallets.info(&p.name)?;
    let secret = String::from_utf8(key.as_bytes().to_vec())
        .map(Zeroizing::new)
        .map_err(|_| EngineError::Internal("stored secret is not UTF-8".into()))?;
    warn!("[host] Wallet '{}' exported to the extension", p.name);
    Ok(ExportResult { name: info.name, chain_id: info.chain_id, address: info.address, secret })
}

async fn get_wallet_info(state: Arc<HostState>, p: PasswordParams) -> EngineResult<WalletView> {
    // Decrypting proves the password; the key is dropped right away.
    drop(state.open_wallet(&p.name, p.password.into_inner()).await?);
    let info = state.wallets.info(&p.name)?;
    let unlocked = state.is_unlocked(&p.name);
    Ok(WalletView { info, unlocked })
}

async fn unlock_wallet(state: Arc<HostState>, p: PasswordParams) -> EngineResult<WalletView> {
    let info = state.unlock_wallet(&p.name, p.password.into_inner()).await?;
    Ok(WalletView { info, unlocked: true })
}

async fn lock_wallet(state: Arc<HostState>, p: LockParams) -> EngineResult<Value> {
    let locked = match p.name {
        Some(name) => usize::from(state.lock_wallet(&name)),
        None => state.lock_all(),
    };
    Ok(json!({ "locked": locked }))
}

async fn send_transaction(state: Arc<HostState>, p: SendParams) -> EngineResult<SendResult> {
    require_confirmed(p.confirmed, METHOD_SEND_TRANSACTION)?;
    let key = state.open_wallet(&p.intent.wallet, p.password.into_inner()).await?;
    let id = state.send_transfer(&RequestContext::new(), &key, &p.intent).await?;
    let tx = state.lifecycle.get_transaction(&id)?;
    Ok(SendResult { transaction_id: id, hash: tx.hash, status: tx.status.to_string() })
}

async fn reject_transactions(state: Arc<HostState>, req: RejectRequest) -> EngineResult<RejectionReport> {
    state.lifecycle.reject_transactions(req).await
}

/// Expose the host on `channel` and route approvals and notifications back
/// through it.
pub fn attach(channel: &Arc<PeerChannel>, state: &Arc<HostState>, options: RpcOptions) {
    register(channel, state, METHOD_INIT, init);
    register(channel, state, METHOD_STATUS, status);
    register(channel, state, METHOD_SHUTDOWN, shutdown);
    register(channel, state, METHOD_LIST_WALLETS, list_wallets);
    register(channel, state, METHOD_IMPORT_WALLET, import_wallet);
    register(channel, state, METHOD_EXPORT_WALLET, export_wallet);
    register(channel, state, METHOD_GET_WALLET_INFO, get_wallet_info);
    register(channel, state, METHOD_UNLOCK_WALLET, unlock_wallet);
    register(channel, state, METHOD_LOCK_WALLET, lock_wallet);
    register(channel, state, METHOD_SEND_TRANSACTION, send_transaction);
    register(channel, state, METHOD_REJECT_TRANSACTIONS, reject_transactions);

    let weak = Arc::downgrade(channel);
    state.set_approver(Arc::new(PeerApprover { channel: weak.clone(), options }));
    state.lifecycle.set_notifier(Arc::new(PeerNotifier { channel: weak }));
    info!("[host] Extension surface attached");
}

// ── Host → extension ───────────────────────────────────────────────────────

fn upgrade(channel: &Weak<PeerChannel>) -> EngineResult<Arc<PeerChannel>> {
    channel.upgrade().ok_or(EngineError::ChannelClosed)
}

/// Approval prompts answered by the user in the extension.
pub struct PeerApprover {
    channel: Weak<PeerChannel>,
    options: RpcOptions,
}

#[async_trait]
impl Approver for PeerApprover {
    async fn approve(&self, request: &ApprovalRequest) -> EngineResult<ApprovalDecision> {
        let channel = upgrade(&self.channel)?;
        let answer = channel
            .rpc_request(
                &RequestContext::new(),
                METHOD_APPROVE_ACTION,
                serde_json::to_value(request)?,
                self.options,
            )
            .await?;
        Ok(serde_json::from_value(answer)?)
    }
}

/// Notifications delivered as `event` messages.
pub struct PeerNotifier {
    channel: Weak<PeerChannel>,
}

#[async_trait]
impl UserNotifier for PeerNotifier {
    async fn notify(&self, title: &str, body: &str) -> EngineResult<()> {
        upgrade(&self.channel)?
            .send_event(json!({ "kind": "notification", "title": title, "body": body }))
            .await
    }
}
