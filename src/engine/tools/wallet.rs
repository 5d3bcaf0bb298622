// Keyhost Engine — Wallet tools (create_wallet, get_balance, sign_message)

use super::{parse_args, to_value, AgentSurface, Security, ToolSpec};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::ApprovalRequest;
use crate::engine::context::RequestContext;
use log::info;
use serde::Deserialize;
use serde_json::{json, Value};
use zeroize::Zeroizing;

pub fn definitions() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "create_wallet",
            "Create a new self-custody wallet on a configured chain. REQUIRES USER APPROVAL: the user picks the wallet password in the extension. The key is generated and encrypted inside the host; only the address is returned.",
            Security::AuthorizationRequired,
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Wallet name (letters, digits, '-' and '_')" },
                    "chain_id": { "type": "string", "description": "Chain id from the supported_chains resource" }
                },
                "required": ["name", "chain_id"]
            }),
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "chain_id": { "type": "string" },
                    "address": { "type": "string" },
                    "created_at": { "type": "string", "format": "date-time" }
                },
                "required": ["name", "chain_id", "address"]
            }),
            &["INVALID_PARAMETER", "MISSING_REQUIRED_FIELD", "UNAUTHORIZED", "INTERNAL"],
        ),
        ToolSpec::new(
            "get_balance",
            "Check the balance of a wallet. Omit token for the chain's native asset.",
            Security::Public,
            json!({
                "type": "object",
                "properties": {
                    "wallet": { "type": "string", "description": "Wallet name" },
                    "token": { "type": "string", "description": "Token symbol (e.g. 'USDC') or contract/mint address" }
                },
                "required": ["wallet"]
            }),
            json!({
                "type": "object",
                "properties": {
                    "wallet": { "type": "string" },
                    "address": { "type": "string" },
                    "chain_id": { "type": "string" },
                    "token": { "type": "string" },
                    "balance": { "type": "string", "description": "Decimal amount" }
                },
                "required": ["wallet", "address", "chain_id", "token", "balance"]
            }),
            &[
                "WALLET_NOT_FOUND",
                "TOKEN_NOT_SUPPORTED",
                "INVALID_TOKEN_ADDRESS",
                "INVALID_PARAMETER",
                "NETWORK_CONNECTION",
                "NETWORK_TIMEOUT",
                "RPC_FAILURE",
            ],
        ),
        ToolSpec::new(
            "sign_message",
            "Sign a text message with an unlocked wallet (EIP-191 personal_sign on EVM chains, ed25519 on Solana). REQUIRES USER APPROVAL.",
            Security::AuthorizationRequired,
            json!({
                "type": "object",
                "properties": {
                    "wallet": { "type": "string", "description": "Wallet name" },
                    "message": { "type": "string", "description": "UTF-8 message to sign" }
                },
                "required": ["wallet", "message"]
            }),
            json!({
                "type": "object",
                "properties": {
                    "wallet": { "type": "string" },
                    "address": { "type": "string" },
                    "signature": { "type": "string" }
                },
                "required": ["wallet", "address", "signature"]
            }),
            &["WALLET_NOT_FOUND", "UNAUTHORIZED", "MISSING_REQUIRED_FIELD", "INVALID_PARAMETER"],
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct CreateWalletArgs {
    name: String,
    chain_id: String,
}

#[derive(Debug, Deserialize)]
struct BalanceArgs {
    wallet: String,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignArgs {
    wallet: String,
    message: String,
}

pub async fn execute(
    surface: &AgentSurface,
    ctx: &RequestContext,
    name: &str,
    args: &Value,
) -> Option<EngineResult<Value>> {
    Some(match name {
        "create_wallet" => create_wallet(surface, ctx, args).await,
        "get_balance" => get_balance(surface, ctx, args).await,
        "sign_message" => sign_message(surface, ctx, args).await,
        _ => return None,
    })
}

async fn create_wallet(surface: &AgentSurface, ctx: &RequestContext, args: &Value) -> EngineResult<Value> {
    let args: CreateWalletArgs = parse_args(args)?;
    let state = surface.state();
    if args.name.trim().is_empty() {
        return Err(EngineError::MissingRequiredField("name".into()));
    }
    let family = state.chain_family(&args.chain_id)?;
    if state.wallets.exists(&args.name) {
        return Err(EngineError::invalid("name", format!("wallet '{}' already exists", args.name)));
    }

    let mut decision = state
        .request_approval(
            ctx,
            ApprovalRequest {
                action: "create_wallet".into(),
                wallet: Some(args.name.clone()),
                summary: format!("Create {} wallet '{}' on {}", family, args.name, args.chain_id),
                details: json!({ "chain_id": args.chain_id }),
                needs_password: true,
            },
        )
        .await?;
    let password = decision
        .password
        .take()
        .filter(|p| !p.is_empty())
        .map(Zeroizing::new)
        .ok_or_else(|| EngineError::Unauthorized("approval did not include a wallet password".into()))?;

    let info = state.create_wallet(&args.name, &args.chain_id, password).await?;
    info!("[host] Agent created wallet '{}' ({})", info.name, info.address);
    to_value(info)
}

async fn get_balance(surface: &AgentSurface, ctx: &RequestContext, args: &Value) -> EngineResult<Value> {
    let args: BalanceArgs = parse_args(args)?;
    let (info, token, balance) = ctx.run(surface.state().get_balance(&args.wallet, args.token.as_deref())).await?;
    Ok(json!({
        "wallet": info.name,
        "address": info.address,
        "chain_id": info.chain_id,
        "token": token,
        "balance": balance,
    }))
}

async fn sign_message(surface: &AgentSurface, ctx: &RequestContext, args: &Value) -> EngineResult<Value> {
    let args: SignArgs = parse_args(args)?;
    if args.message.is_empty() {
        return Err(EngineError::MissingRequiredField("message".into()));
    }
    let preview: String = args.message.chars().take(120).collect();
    let (info, key) = surface
        .authorize(
            ctx,
            "sign_message",
            &args.wallet,
            format!("Sign a message with '{}'", args.wallet),
            json!({ "message": preview, "length": args.message.len() }),
        )
        .await?;
    let signature = surface.state().sign_message(&info, &key, &args.message)?;
    Ok(json!({ "wallet": info.name, "address": info.address, "signature": signature }))
}
