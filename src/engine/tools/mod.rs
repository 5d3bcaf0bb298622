// Keyhost Engine — Agent Tool Surface
// Tools and resources exposed to the AI agent. Each tool group is a
// self-contained module with definitions + executor; this file holds the
// registry, the authorization gate and the dispatcher.
//
// The agent is untrusted. Tools marked `AuthorizationRequired` only run
// against a wallet the user has unlocked, and value-moving ones also wait
// for the user's approval in the extension. There is deliberately no tool
// that returns key material.

use crate::atoms::error::{EngineError, EngineResult, ErrorInfo};
use crate::atoms::types::{ApprovalRequest, SigningKey};
use crate::engine::context::RequestContext;
use crate::engine::state::HostState;
use crate::engine::vault::WalletInfo;
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub mod resources;
pub mod transactions;
pub mod wallet;

pub use resources::ResourceSpec;

/// Security classification carried by every tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Security {
    /// Read-only; no wallet session needed.
    Public,
    /// Needs an unlocked wallet session (and, for value-moving tools, user approval).
    AuthorizationRequired,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub security: Security,
    pub input_schema: Value,
    pub output_schema: Value,
    pub error_schema: Value,
}

impl ToolSpec {
    pub(crate) fn new(
        name: &str,
        description: &str,
        security: Security,
        input_schema: Value,
        output_schema: Value,
        errors: &[&str],
    ) -> Self {
        ToolSpec {
            name: name.into(),
            description: description.into(),
            security,
            input_schema,
            output_schema,
            error_schema: error_schema(errors),
        }
    }

    pub fn requires_authorization(&self) -> bool {
        self.security == Security::AuthorizationRequired
    }
}

/// Error shape shared by every tool; `code` is narrowed to what the tool can return.
fn error_schema(codes: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": {
            "code": { "type": "string", "enum": codes },
            "message": { "type": "string" },
            "suggestion": { "type": "string" }
        },
        "required": ["code", "message"]
    })
}

/// Wire form of a tool call's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResponse {
    Ok { result: Value },
    Error { error: ErrorInfo },
}

/// Every tool, in catalog order.
pub fn definitions() -> Vec<ToolSpec> {
    let mut tools = Vec::new();
    tools.extend(wallet::definitions());
    tools.extend(transactions::definitions());
    tools
}

pub(crate) fn parse_args<A: DeserializeOwned>(args: &Value) -> EngineResult<A> {
    let args = if args.is_null() { json!({}) } else { args.clone() };
    serde_json::from_value(args).map_err(|e| EngineError::invalid("arguments", e.to_string()))
}

pub(crate) fn to_value<T: Serialize>(value: T) -> EngineResult<Value> {
    Ok(serde_json::to_value(value)?)
}

// ── Surface ────────────────────────────────────────────────────────────────

pub struct AgentSurface {
    state: Arc<HostState>,
    tools: Vec<ToolSpec>,
}

impl AgentSurface {
    pub fn new(state: Arc<HostState>) -> Self {
        AgentSurface { state, tools: definitions() }
    }

    pub fn state(&self) -> &Arc<HostState> {
        &self.state
    }

    pub fn list_tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn list_resources(&self) -> Vec<ResourceSpec> {
        resources::definitions()
    }

    fn ensure_enabled(&self) -> EngineResult<()> {
        if self.state.config().host.agent_surface {
            Ok(())
        } else {
            Err(EngineError::Unauthorized("the agent surface is disabled".into()))
        }
    }

    pub async fn call_tool(&self, ctx: &RequestContext, name: &str, args: &Value) -> EngineResult<Value> {
        self.ensure_enabled()?;
        ctx.check()?;
        if !self.tools.iter().any(|t| t.name == name) {
            return Err(EngineError::MethodNotFound(name.to_string()));
        }
        info!("[host] Agent tool call: {}", name);
        if let Some(result) = wallet::execute(self, ctx, name, args).await {
            return result;
        }
        if let Some(result) = transactions::execute(self, ctx, name, args).await {
            return result;
        }
        Err(EngineError::MethodNotFound(name.to_string()))
    }

    /// `call_tool` folded into the serializable response envelope.
    pub async fn respond(&self, ctx: &RequestContext, name: &str, args: &Value) -> ToolResponse {
        match self.call_tool(ctx, name, args).await {
            Ok(result) => ToolResponse::Ok { result },
            Err(e) => {
                log::warn!("[host] Agent tool '{}' failed: {}", name, e);
                ToolResponse::Error { error: ErrorInfo::from(&e) }
            }
        }
    }

    pub async fn read_resource(&self, uri: &str) -> EngineResult<Value> {
        self.ensure_enabled()?;
        resources::read(&self.state, uri)
    }

    // ── Authorization gate ─────────────────────────────────────────────────

    /// The wallet must exist and be unlocked; then the user approves `summary`.
    pub(crate) async fn authorize(
        &self,
        ctx: &RequestContext,
        action: &str,
        wallet: &str,
        summary: String,
        details: Value,
    ) -> EngineResult<(WalletInfo, SigningKey)> {
        let info = self.state.wallets.info(wallet)?;
        let key = self.state.session_key(wallet)?;
        self.state
            .request_approval(
                ctx,
                ApprovalRequest {
                    action: action.to_string(),
                    wallet: Some(wallet.to_string()),
                    summary,
                    details,
                    needs_password: false,
                },
            )
            .await?;
        Ok((info, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::host_config;

    fn surface(agent_surface: bool) -> (AgentSurface, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = host_config();
        config.host.agent_surface = agent_surface;
        let state = HostState::with_data_dir(config, dir.path()).unwrap();
        (AgentSurface::new(state), dir)
    }

    #[test]
    fn test_catalog_is_complete() {
        let names: Vec<String> = definitions().into_iter().map(|t| t.name).collect();
        for expected in [
            "create_wallet",
            "get_balance",
            "send_transaction",
            "confirm_transaction",
            "get_transactions",
            "sign_message",
            "swap_tokens",
            "reject_transaction",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn test_static_catalog_matches_surface() {
        let (surface, _dir) = surface(true);
        assert_eq!(definitions().len(), surface.list_tools().len());
        assert_eq!(resources::definitions().len(), surface.list_resources().len());
        assert_eq!(resources::definitions().len(), 3);
    }

    #[test]
    fn test_no_key_export_is_reachable() {
        for tool in definitions() {
            assert!(!tool.name.contains("export"), "{}", tool.name);
            let schemas = format!("{} {}", tool.input_schema, tool.output_schema);
            for banned in ["private_key", "secret", "mnemonic", "seed"] {
                assert!(!schemas.contains(banned), "{} exposes '{}'", tool.name, banned);
            }
        }
    }

    #[test]
    fn test_every_tool_has_schemas_and_classification() {
        for tool in definitions() {
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
            assert_eq!(tool.output_schema["type"], "object", "{}", tool.name);
            assert!(tool.error_schema["properties"]["code"]["enum"].as_array().is_some_and(|c| !c.is_empty()));
        }
        let value_moving = ["create_wallet", "send_transaction", "sign_message", "swap_tokens", "reject_transaction"];
        for tool in definitions() {
            assert_eq!(tool.requires_authorization(), value_moving.contains(&tool.name.as_str()), "{}", tool.name);
        }
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (surface, _dir) = surface(true);
        let err = surface.call_tool(&RequestContext::new(), "export_wallet", &json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::MethodNotFound(_)));
    }

    #[tokio::test]
    async fn test_disabled_surface_refuses_everything() {
        let (surface, _dir) = surface(false);
        let err = surface.call_tool(&RequestContext::new(), "get_transactions", &json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));
        assert!(surface.read_resource("keyhost://wallet_status").await.is_err());
    }

    #[tokio::test]
    async fn test_respond_wraps_errors() {
        let (surface, _dir) = surface(true);
        let response = surface
            .respond(&RequestContext::new(), "get_balance", &json!({ "wallet": "ghost" }))
            .await;
        match response {
            ToolResponse::Error { error } => assert_eq!(error.code, "WALLET_NOT_FOUND"),
            other => panic!("unexpected: {:?}", other),
        }
        let wire = serde_json::to_value(surface.respond(&RequestContext::new(), "get_transactions", &json!({})).await)
            .unwrap();
        assert_eq!(wire["status"], "ok");
        assert_eq!(wire["result"]["transactions"], json!([]));
    }
}
