// Keyhost Engine — DEX Aggregator
//
// Holds the provider registry, fans quote requests out to every eligible
// provider concurrently, and ranks the answers with a deterministic rule
// (see selection.rs). Execution can be pinned to a named provider or routed
// through the best quote.
//
//   selection — best-quote ranking

pub mod selection;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::DexProvider;
use crate::atoms::types::{GasEstimate, SwapParams, SwapQuote, SwapResult};
use crate::engine::context::RequestContext;
use crate::engine::lifecycle::SwapExecutor;
use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use parking_lot::RwLock;
use selection::{select_best, Candidate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry data attached to a provider at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub priority: i32,
    pub enabled: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        ProviderSettings { priority: 0, enabled: true }
    }
}

/// Snapshot row for status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub name: String,
    pub priority: i32,
    pub enabled: bool,
}

#[derive(Clone)]
struct RegisteredProvider {
    provider: Arc<dyn DexProvider>,
    settings: ProviderSettings,
}

#[derive(Default)]
pub struct DexAggregator {
    providers: RwLock<HashMap<String, RegisteredProvider>>,
}

impl DexAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name. The first registration wins.
    pub fn register_provider(&self, provider: Arc<dyn DexProvider>, settings: ProviderSettings) -> EngineResult<()> {
        let name = provider.name().to_string();
        if name.trim().is_empty() {
            return Err(EngineError::MissingRequiredField("provider name".into()));
        }

        let mut map = self.providers.write();
        if map.contains_key(&name) {
            return Err(EngineError::DuplicateProvider(name));
        }
        info!(
            "[aggregator] Registered provider '{}' (priority {}, {})",
            name,
            settings.priority,
            if settings.enabled { "enabled" } else { "disabled" }
        );
        map.insert(name, RegisteredProvider { provider, settings });
        Ok(())
    }

    pub fn set_provider_enabled(&self, name: &str, enabled: bool) -> EngineResult<()> {
        let mut map = self.providers.write();
        let entry = map.get_mut(name).ok_or_else(|| EngineError::ProviderNotFound(name.to_string()))?;
        entry.settings.enabled = enabled;
        info!("[aggregator] Provider '{}' {}", name, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn list_providers(&self) -> Vec<ProviderStatus> {
        let mut out: Vec<ProviderStatus> = self
            .providers
            .read()
            .iter()
            .map(|(name, p)| ProviderStatus {
                name: name.clone(),
                priority: p.settings.priority,
                enabled: p.settings.enabled,
            })
            .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        out
    }

    /// Enabled providers supporting `chain_id`, priority descending.
    fn eligible(&self, chain_id: &str) -> Vec<(String, RegisteredProvider)> {
        let mut out: Vec<(String, RegisteredProvider)> = self
            .providers
            .read()
            .iter()
            .filter(|(_, p)| p.settings.enabled && p.provider.is_supported(chain_id))
            .map(|(name, p)| (name.clone(), p.clone()))
            .collect();
        out.sort_by(|a, b| b.1.settings.priority.cmp(&a.1.settings.priority).then_with(|| a.0.cmp(&b.0)));
        out
    }

    pub fn get_supported_providers(&self, chain_id: &str) -> Vec<String> {
        self.eligible(chain_id).into_iter().map(|(name, _)| name).collect()
    }

    /// Ask every eligible provider for a quote at once and return the best.
    pub async fn get_best_quote(&self, ctx: &RequestContext, params: &SwapParams) -> EngineResult<SwapQuote> {
        params.validate()?;
        ctx.check()?;

        let eligible = self.eligible(&params.chain_id);
        if eligible.is_empty() {
            return Err(EngineError::NoSupportedProvider(params.chain_id.clone()));
        }
        let attempted = eligible.len();

        // One future per provider; dropping them on cancellation abandons
        // whatever is still in flight.
        let calls = eligible.into_iter().map(|(name, entry)| async move {
            let outcome = entry.provider.get_quote(params).await;
            (name, entry.settings.priority, outcome)
        });
        let outcomes = ctx.run(async { Ok(join_all(calls).await) }).await?;

        let mut candidates = Vec::with_capacity(outcomes.len());
        for (name, priority, outcome) in outcomes {
            match outcome {
                Ok(quote) if quote.is_expired() => {
                    warn!("[aggregator] Discarding expired quote from '{}'", name);
                }
                Ok(quote) => {
                    debug!("[aggregator] '{}' quoted {} → {}", name, quote.amount_in, quote.amount_out);
                    candidates.push(Candidate { provider: name, priority, quote });
                }
                Err(e) => warn!("[aggregator] Quote from '{}' failed: {}", name, e),
            }
        }

        let best = select_best(candidates).ok_or(EngineError::NoValidQuote(attempted))?;
        info!(
            "[aggregator] Best quote for {} → {} on {}: {} via '{}'",
            params.token_in, params.token_out, params.chain_id, best.quote.amount_out, best.provider
        );
        Ok(best.quote)
    }

    fn lookup_for(&self, name: &str, chain_id: &str) -> EngineResult<Arc<dyn DexProvider>> {
        let entry = self
            .providers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::ProviderNotFound(name.to_string()))?;
        if !entry.settings.enabled {
            return Err(EngineError::provider(name, "provider is disabled"));
        }
        if !entry.provider.is_supported(chain_id) {
            return Err(EngineError::UnsupportedChain {
                provider: name.to_string(),
                chain_id: chain_id.to_string(),
            });
        }
        Ok(entry.provider)
    }

    /// Execute on a named provider; provider errors come back unchanged.
    pub async fn execute_swap_with_provider(
        &self,
        ctx: &RequestContext,
        provider_name: &str,
        params: &SwapParams,
    ) -> EngineResult<SwapResult> {
        params.validate()?;
        let provider = self.lookup_for(provider_name, &params.chain_id)?;
        info!(
            "[aggregator] Executing {} {} → {} on {} via '{}'",
            params.amount(),
            params.token_in,
            params.token_out,
            params.chain_id,
            provider_name
        );
        ctx.run(provider.execute_swap(params)).await
    }

    /// Quote across all providers, then execute with the winner.
    pub async fn execute_best_swap(&self, ctx: &RequestContext, params: &SwapParams) -> EngineResult<SwapResult> {
        let quote = self.get_best_quote(ctx, params).await?;
        if quote.is_expired() {
            return Err(EngineError::QuoteExpired(quote.provider));
        }
        self.execute_swap_with_provider(ctx, &quote.provider, params).await
    }

    pub async fn estimate_gas(
        &self,
        ctx: &RequestContext,
        provider_name: &str,
        params: &SwapParams,
    ) -> EngineResult<GasEstimate> {
        params.validate()?;
        let provider = self.lookup_for(provider_name, &params.chain_id)?;
        ctx.run(provider.estimate_gas(params)).await
    }
}

#[async_trait]
impl SwapExecutor for DexAggregator {
    async fn execute(
        &self,
        ctx: &RequestContext,
        provider: Option<&str>,
        params: &SwapParams,
    ) -> EngineResult<SwapResult> {
        match provider {
            Some(name) => self.execute_swap_with_provider(ctx, name, params).await,
            None => self.execute_best_swap(ctx, params).await,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
