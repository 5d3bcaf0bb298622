// Keyhost Engine — Agent resources (read-only views of host state)

use crate::atoms::error::{EngineError, EngineResult};
use crate::engine::state::HostState;
use serde::Serialize;
use serde_json::{json, Value};

pub const WALLET_STATUS: &str = "keyhost://wallet_status";
pub const SUPPORTED_CHAINS: &str = "keyhost://supported_chains";
pub const SUPPORTED_TOKENS: &str = "keyhost://supported_tokens";

#[derive(Debug, Clone, Serialize)]
pub struct ResourceSpec {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

fn spec(uri: &str, description: &str) -> ResourceSpec {
    ResourceSpec {
        uri: uri.into(),
        name: uri.trim_start_matches("keyhost://").into(),
        description: description.into(),
        mime_type: "application/json".into(),
    }
}

pub fn definitions() -> Vec<ResourceSpec> {
    vec![
        spec(WALLET_STATUS, "Wallets known to the host, their addresses and whether each is unlocked."),
        spec(SUPPORTED_CHAINS, "Configured chains with their family, confirmation depth and DEX providers."),
        spec(SUPPORTED_TOKENS, "Tokens configured per chain."),
    ]
}

/// Accepts the full URI or the bare resource name.
pub fn read(state: &HostState, uri: &str) -> EngineResult<Value> {
    let name = uri.trim().trim_start_matches("keyhost://");
    match name {
        "wallet_status" => wallet_status(state),
        "supported_chains" => Ok(supported_chains(state)),
        "supported_tokens" => Ok(supported_tokens(state)),
        _ => Err(EngineError::invalid("uri", format!("unknown resource '{}'", uri))),
    }
}

fn wallet_status(state: &HostState) -> EngineResult<Value> {
    let wallets: Vec<Value> = state
        .wallets
        .list()?
        .into_iter()
        .map(|w| {
            json!({
                "name": w.name,
                "chain_id": w.chain_id,
                "address": w.address,
                "unlocked": state.is_unlocked(&w.name),
            })
        })
        .collect();
    let stats = state.lifecycle.stats();
    Ok(json!({ "wallets": wallets, "pending_transactions": stats.pending }))
}

fn supported_chains(state: &HostState) -> Value {
    let chains: Vec<Value> = state
        .config()
        .chains
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.name,
                "family": c.family,
                "required_confirmations": c.required_confirmations,
                "client_registered": state.lifecycle.chain_client(&c.id).is_some(),
                "providers": state.aggregator.get_supported_providers(&c.id),
            })
        })
        .collect();
    json!({ "chains": chains })
}

fn supported_tokens(state: &HostState) -> Value {
    let tokens: Vec<Value> = state
        .config()
        .chains
        .iter()
        .flat_map(|c| {
            c.tokens.iter().map(move |t| {
                json!({
                    "chain_id": c.id,
                    "symbol": t.symbol,
                    "address": t.address,
                    "decimals": t.decimals,
                    "native": t.address.is_none(),
                })
            })
        })
        .collect();
    json!({ "tokens": tokens })
}
