// Keyhost Engine — Confirmation Monitor
//
// One task per pending transaction. The task is the record's only writer
// apart from rejection, and exits as soon as the record is no longer
// pending or the engine shuts down.

use super::{Inner, Resubmit};
use crate::atoms::error::EngineError;
use crate::atoms::types::{TxInclusion, TxStatus};
use crate::engine::context::RequestContext;
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::time::Instant;

/// The fields a poll needs, copied out under the lock.
struct Snapshot {
    hash: String,
    chain_id: String,
    required: u64,
    attempts: u32,
    bps: u32,
}

impl Inner {
    fn snapshot(&self, id: &str) -> Option<Snapshot> {
        let table = self.pending.lock();
        let tx = table.get(id).filter(|tx| tx.status == TxStatus::Pending)?;
        Some(Snapshot {
            hash: tx.hash.clone(),
            chain_id: tx.chain_id.clone(),
            required: tx.required_confirmations,
            attempts: tx.attempts,
            bps: tx.slippage_increase_bps,
        })
    }

    fn fail(&self, id: &str, error: String) {
        warn!("[lifecycle] Transaction {} failed: {}", id, error);
        self.update_pending(id, |tx| {
            tx.status = TxStatus::Failed;
            tx.last_error = Some(error);
            tx.last_checked = Some(Utc::now());
        });
    }

    pub(super) async fn monitor(self: Arc<Self>, id: String, plan: Resubmit) {
        let ctx = self.root.child();
        let poll = self.config.poll_interval;
        let timeout = self.config.confirmation_timeout;
        let mut broadcast_at = Instant::now();

        loop {
            if ctx.sleep(poll).await.is_err() {
                debug!("[lifecycle] Monitor for {} stopped", id);
                return;
            }
            let Some(snap) = self.snapshot(&id) else {
                debug!("[lifecycle] {} is no longer pending, monitor exiting", id);
                return;
            };
            let Some(client) = self.chain_client(&snap.chain_id) else {
                self.fail(&id, format!("chain '{}' is no longer configured", snap.chain_id));
                return;
            };

            let trouble = match ctx.run(client.get_confirmations(&snap.hash)).await {
                Ok(TxInclusion::Included { confirmations }) => {
                    let confirmed = confirmations >= snap.required;
                    let still_ours = self.update_pending(&id, |tx| {
                        tx.confirmations = confirmations;
                        tx.last_checked = Some(Utc::now());
                        if confirmed {
                            tx.status = TxStatus::Confirmed;
                        }
                    });
                    if !still_ours {
                        return;
                    }
                    if confirmed {
                        info!(
                            "[lifecycle] {} confirmed ({}/{}) as {}",
                            id, confirmations, snap.required, snap.hash
                        );
                        return;
                    }
                    None
                }
                Ok(TxInclusion::NotFound) => {
                    if !self.update_pending(&id, |tx| tx.last_checked = Some(Utc::now())) {
                        return;
                    }
                    None
                }
                Ok(TxInclusion::Reverted { reason }) => Some(format!("reverted on chain: {}", reason)),
                Err(EngineError::Cancelled) => return,
                Err(e) => {
                    // Transient: keep polling until the confirmation timeout decides.
                    warn!("[lifecycle] Status query for {} failed: {}", id, e);
                    let msg = e.to_string();
                    self.update_pending(&id, |tx| {
                        tx.last_checked = Some(Utc::now());
                        tx.last_error = Some(msg);
                    });
                    None
                }
            };

            let trouble = trouble.or_else(|| {
                (broadcast_at.elapsed() >= timeout).then(|| format!("not confirmed within {:?}", timeout))
            });
            let Some(reason) = trouble else { continue };

            if !self.resubmit(&ctx, &id, &plan, snap, reason).await {
                return;
            }
            broadcast_at = Instant::now();
        }
    }

    /// Resubmit within the retry bounds. Returns true once a new broadcast is
    /// recorded; false when the record went terminal (here or elsewhere).
    async fn resubmit(
        &self,
        ctx: &RequestContext,
        id: &str,
        plan: &Resubmit,
        snap: Snapshot,
        mut last_error: String,
    ) -> bool {
        let policy = &self.config.retry;
        let mut attempts = snap.attempts;
        let mut bps = snap.bps;

        loop {
            let next_bps = match plan {
                Resubmit::Swap { .. } => policy.next_slippage_bps(attempts, bps),
                Resubmit::Transfer { .. } => policy.allows_attempt(attempts).then_some(bps),
            };
            let Some(next_bps) = next_bps else {
                self.fail(id, format!("{} (gave up after {} resubmission(s))", last_error, attempts));
                return false;
            };

            if ctx.sleep(policy.retry_delay).await.is_err() || self.snapshot(id).is_none() {
                return false;
            }
            attempts += 1;
            bps = next_bps;
            info!("[lifecycle] Resubmitting {} (attempt {}, +{} bps): {}", id, attempts, bps, last_error);

            let outcome = match plan {
                Resubmit::Swap { provider, params } => self
                    .execute_swap_once(ctx, provider.as_deref(), params, bps)
                    .await
                    .map(|r| r.tx_hash),
                Resubmit::Transfer { raw_tx } => self.broadcast_once(ctx, &snap.chain_id, raw_tx).await,
            };

            match outcome {
                Ok(hash) => {
                    let reason = last_error;
                    return self.update_pending(id, |tx| {
                        tx.hash = hash;
                        tx.attempts = attempts;
                        tx.slippage_increase_bps = bps;
                        tx.confirmations = 0;
                        tx.last_error = Some(reason);
                    });
                }
                Err(EngineError::Cancelled) => return false,
                Err(e) if !e.is_retryable() => {
                    self.update_pending(id, |tx| {
                        tx.attempts = attempts;
                        tx.slippage_increase_bps = bps;
                    });
                    self.fail(id, e.to_string());
                    return false;
                }
                Err(e) => {
                    warn!("[lifecycle] Resubmission of {} failed: {}", id, e);
                    self.update_pending(id, |tx| {
                        tx.attempts = attempts;
                        tx.slippage_increase_bps = bps;
                    });
                    last_error = e.to_string();
                }
            }
        }
    }
}
