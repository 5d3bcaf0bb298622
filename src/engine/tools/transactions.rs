// Keyhost Engine — Transaction tools
// send_transaction, swap_tokens, confirm_transaction, get_transactions,
// reject_transaction.

use super::{parse_args, to_value, AgentSurface, Security, ToolSpec};
use crate::atoms::error::{EngineError, EngineResult};
use crate::engine::context::RequestContext;
use crate::engine::lifecycle::{RejectRequest, TxFilter};
use crate::engine::state::{SwapIntent, TransferIntent};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};

fn transaction_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "hash": { "type": "string" },
            "chain_id": { "type": "string" },
            "from": { "type": "string" },
            "to": { "type": "string" },
            "amount": { "type": "string" },
            "token": { "type": "string" },
            "kind": { "type": "string", "enum": ["transfer", "swap", "contract"] },
            "status": { "type": "string", "enum": ["pending", "confirmed", "failed", "rejected"] },
            "confirmations": { "type": "integer" },
            "required_confirmations": { "type": "integer" },
            "attempts": { "type": "integer" },
            "slippage_increase_bps": { "type": "integer" },
            "last_error": { "type": "string" }
        },
        "required": ["id", "hash", "chain_id", "status"]
    })
}

pub fn definitions() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "send_transaction",
            "Send native currency or a token from an unlocked wallet. REQUIRES USER APPROVAL. Returns a transaction id to follow with confirm_transaction.",
            Security::AuthorizationRequired,
            json!({
                "type": "object",
                "properties": {
                    "wallet": { "type": "string", "description": "Wallet name" },
                    "to": { "type": "string", "description": "Recipient address" },
                    "amount": { "type": "string", "description": "Decimal amount (e.g. '0.1')" },
                    "token": { "type": "string", "description": "Token symbol or contract/mint address; omit for native" },
                    "reason": { "type": "string", "description": "Shown to the user in the approval prompt" }
                },
                "required": ["wallet", "to", "amount"]
            }),
            json!({
                "type": "object",
                "properties": {
                    "transaction_id": { "type": "string" },
                    "hash": { "type": "string" },
                    "status": { "type": "string" }
                },
                "required": ["transaction_id", "hash", "status"]
            }),
            &[
                "WALLET_NOT_FOUND",
                "UNAUTHORIZED",
                "INVALID_ADDRESS",
                "INVALID_PARAMETER",
                "MISSING_REQUIRED_FIELD",
                "TOKEN_NOT_SUPPORTED",
                "INVALID_TOKEN_ADDRESS",
                "INSUFFICIENT_BALANCE",
                "NETWORK_CONNECTION",
                "NETWORK_TIMEOUT",
                "RPC_FAILURE",
            ],
        ),
        ToolSpec::new(
            "swap_tokens",
            "Swap tokens through the best-priced DEX provider for the wallet's chain. REQUIRES USER APPROVAL. The quote is shown to the user before execution; give exactly one of amount_in or amount_out.",
            Security::AuthorizationRequired,
            json!({
                "type": "object",
                "properties": {
                    "wallet": { "type": "string", "description": "Wallet name" },
                    "token_in": { "type": "string", "description": "Token to sell (symbol or address)" },
                    "token_out": { "type": "string", "description": "Token to buy (symbol or address)" },
                    "amount_in": { "type": "string", "description": "Exact amount of token_in to sell" },
                    "amount_out": { "type": "string", "description": "Exact amount of token_out to buy" },
                    "slippage": { "type": "number", "minimum": 0, "maximum": 1, "description": "Tolerance as a fraction. Default 0.005" },
                    "provider": { "type": "string", "description": "Pin a provider instead of taking the best quote" },
                    "reason": { "type": "string", "description": "Shown to the user in the approval prompt" }
                },
                "required": ["wallet", "token_in", "token_out"]
            }),
            json!({
                "type": "object",
                "properties": {
                    "transaction_id": { "type": "string" },
                    "hash": { "type": "string" },
                    "provider": { "type": "string" },
                    "quote": { "type": "object" }
                },
                "required": ["transaction_id", "hash"]
            }),
            &[
                "WALLET_NOT_FOUND",
                "UNAUTHORIZED",
                "INVALID_PARAMETER",
                "MISSING_REQUIRED_FIELD",
                "TOKEN_NOT_SUPPORTED",
                "INVALID_TOKEN_ADDRESS",
                "NO_SUPPORTED_PROVIDER",
                "NO_VALID_QUOTE",
                "PROVIDER_NOT_FOUND",
                "UNSUPPORTED_CHAIN",
                "PROVIDER_ERROR",
                "QUOTE_EXPIRED",
            ],
        ),
        ToolSpec::new(
            "confirm_transaction",
            "Check whether a submitted transaction has reached its required confirmations.",
            Security::Public,
            json!({
                "type": "object",
                "properties": {
                    "transaction_id": { "type": "string" }
                },
                "required": ["transaction_id"]
            }),
            json!({
                "type": "object",
                "properties": {
                    "confirmed": { "type": "boolean" },
                    "transaction": transaction_schema()
                },
                "required": ["confirmed", "transaction"]
            }),
            &["TRANSACTION_NOT_FOUND", "INVALID_PARAMETER"],
        ),
        ToolSpec::new(
            "get_transactions",
            "List transactions the host is tracking, newest first.",
            Security::Public,
            json!({
                "type": "object",
                "properties": {
                    "status": { "type": "string", "enum": ["pending", "confirmed", "failed", "rejected"] },
                    "chain_id": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1 }
                }
            }),
            json!({
                "type": "object",
                "properties": {
                    "transactions": { "type": "array", "items": transaction_schema() }
                },
                "required": ["transactions"]
            }),
            &["INVALID_PARAMETER"],
        ),
        ToolSpec::new(
            "reject_transaction",
            "Reject one or more pending transactions. The user is notified and the rejection is written to the audit log. Needs at least one unlocked wallet.",
            Security::AuthorizationRequired,
            json!({
                "type": "object",
                "properties": {
                    "transaction_ids": { "type": "array", "items": { "type": "string" }, "minItems": 1 },
                    "reason": { "type": "string" },
                    "details": { "type": "string" }
                },
                "required": ["transaction_ids", "reason"]
            }),
            json!({
                "type": "object",
                "properties": {
                    "results": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": { "type": "string" },
                                "success": { "type": "boolean" },
                                "error": { "type": "string" }
                            }
                        }
                    },
                    "total_processed": { "type": "integer" },
                    "succeeded": { "type": "integer" },
                    "failed": { "type": "integer" },
                    "audit_id": { "type": "string" }
                },
                "required": ["results", "total_processed", "succeeded", "failed"]
            }),
            &["UNAUTHORIZED", "MISSING_REQUIRED_FIELD", "INVALID_PARAMETER"],
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct SendArgs {
    #[serde(flatten)]
    intent: TransferIntent,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SwapArgs {
    #[serde(flatten)]
    intent: SwapIntent,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfirmArgs {
    transaction_id: String,
}

#[derive(Debug, Deserialize)]
struct RejectArgs {
    transaction_ids: Vec<String>,
    reason: String,
    #[serde(default)]
    details: String,
}

pub async fn execute(
    surface: &AgentSurface,
    ctx: &RequestContext,
    name: &str,
    args: &Value,
) -> Option<EngineResult<Value>> {
    Some(match name {
        "send_transaction" => send_transaction(surface, ctx, args).await,
        "swap_tokens" => swap_tokens(surface, ctx, args).await,
        "confirm_transaction" => confirm_transaction(surface, args),
        "get_transactions" => get_transactions(surface, args),
        "reject_transaction" => reject_transaction(surface, args).await,
        _ => return None,
    })
}

async fn send_transaction(surface: &AgentSurface, ctx: &RequestContext, args: &Value) -> EngineResult<Value> {
    let SendArgs { intent, reason } = parse_args(args)?;
    let state = surface.state();
    let wallet = state.wallets.info(&intent.wallet)?;
    // Reject malformed requests before bothering the user.
    crate::engine::state::validate_amount(&intent.amount)?;
    state.validate_address(&wallet.chain_id, &intent.to)?;
    let token = state.resolve_token(&wallet.chain_id, intent.token.as_deref())?;

    let (_, key) = surface
        .authorize(
            ctx,
            "send_transaction",
            &intent.wallet,
            format!("Send {} {} to {}", intent.amount.trim(), token, intent.to.trim()),
            json!({
                "chain_id": wallet.chain_id,
                "to": intent.to,
                "amount": intent.amount,
                "token": token,
                "reason": reason,
            }),
        )
        .await?;
    let id = state.send_transfer(ctx, &key, &intent).await?;
    let tx = state.lifecycle.get_transaction(&id)?;
    info!("[host] Agent transfer {} submitted from '{}'", id, intent.wallet);
    Ok(json!({ "transaction_id": id, "hash": tx.hash, "status": tx.status }))
}

async fn swap_tokens(surface: &AgentSurface, ctx: &RequestContext, args: &Value) -> EngineResult<Value> {
    let SwapArgs { intent, reason } = parse_args(args)?;
    let state = surface.state();
    let wallet = state.wallets.info(&intent.wallet)?;
    let key = state.session_key(&intent.wallet)?;
    let params = state.swap_params(&wallet, key, &intent)?;

    // Price it first so the user approves a concrete offer, then execute with
    // that provider.
    let quote = match &intent.provider {
        Some(_) => None,
        None => Some(state.aggregator.get_best_quote(ctx, &params).await?),
    };
    let provider = intent.provider.clone().or_else(|| quote.as_ref().map(|q| q.provider.clone()));
    let summary = match &quote {
        Some(q) => format!(
            "Swap {} {} for ~{} {} via {}",
            q.amount_in, params.token_in, q.amount_out, params.token_out, q.provider
        ),
        None => format!(
            "Swap {} {} for {} via {}",
            params.amount(),
            params.token_in,
            params.token_out,
            provider.as_deref().unwrap_or("best provider")
        ),
    };
    surface
        .authorize(
            ctx,
            "swap_tokens",
            &intent.wallet,
            summary,
            json!({ "params": params, "quote": quote, "reason": reason }),
        )
        .await?;

    // The user may take longer to answer than the offer lives.
    if let Some(q) = quote.as_ref().filter(|q| q.is_expired()) {
        warn!("[host] Quote from {} expired during approval; swap not executed", q.provider);
        return Err(EngineError::QuoteExpired(q.provider.clone()));
    }

    let id = state.lifecycle.submit_swap(ctx, provider.as_deref(), params).await?;
    let tx = state.lifecycle.get_transaction(&id)?;
    info!("[host] Agent swap {} submitted from '{}'", id, intent.wallet);
    Ok(json!({ "transaction_id": id, "hash": tx.hash, "provider": provider, "quote": quote }))
}

fn confirm_transaction(surface: &AgentSurface, args: &Value) -> EngineResult<Value> {
    let args: ConfirmArgs = parse_args(args)?;
    if args.transaction_id.trim().is_empty() {
        return Err(EngineError::MissingRequiredField("transaction_id".into()));
    }
    let tx = surface.state().lifecycle.get_transaction(&args.transaction_id)?;
    let confirmed = tx.status == crate::atoms::types::TxStatus::Confirmed;
    Ok(json!({ "confirmed": confirmed, "transaction": to_value(tx)? }))
}

fn get_transactions(surface: &AgentSurface, args: &Value) -> EngineResult<Value> {
    let filter: TxFilter = parse_args(args)?;
    if filter.limit == Some(0) {
        return Err(EngineError::invalid("limit", "must be at least 1"));
    }
    Ok(json!({ "transactions": surface.state().lifecycle.list_transactions(&filter) }))
}

async fn reject_transaction(surface: &AgentSurface, args: &Value) -> EngineResult<Value> {
    let args: RejectArgs = parse_args(args)?;
    let state = surface.state();
    if state.unlocked_wallets().is_empty() {
        return Err(EngineError::Unauthorized("unlock a wallet before rejecting transactions".into()));
    }
    let report = state
        .lifecycle
        .reject_transactions(RejectRequest {
            ids: args.transaction_ids,
            reason: args.reason,
            details: args.details,
            notify_user: true,
            audit_log: true,
        })
        .await?;
    to_value(report)
}
