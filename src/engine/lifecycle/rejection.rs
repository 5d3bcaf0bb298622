// Keyhost Engine — Transaction Rejection
//
// Batch rejection of pending transactions. Each id is handled on its own:
// one unknown or already-final id never blocks the rest of the batch.

use super::TransactionEngine;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{RejectionInfo, TxStatus};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectRequest {
    pub ids: Vec<String>,
    pub reason: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub notify_user: bool,
    #[serde(default)]
    pub audit_log: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionOutcome {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionReport {
    pub results: Vec<RejectionOutcome>,
    pub total_processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,
}

impl TransactionEngine {
    pub async fn reject_transactions(&self, req: RejectRequest) -> EngineResult<RejectionReport> {
        if req.ids.is_empty() {
            return Err(EngineError::MissingRequiredField("ids".into()));
        }
        if req.reason.trim().is_empty() {
            return Err(EngineError::MissingRequiredField("reason".into()));
        }

        let now = Utc::now();
        let results: Vec<RejectionOutcome> =
            req.ids.iter().map(|id| self.reject_one(id, &req.reason, &req.details, now)).collect();
        let rejected: Vec<&str> = results.iter().filter(|r| r.success).map(|r| r.id.as_str()).collect();
        let succeeded = rejected.len();
        let failed = results.len() - succeeded;
        info!(
            "[lifecycle] Rejection batch: {} processed, {} rejected, {} failed ({})",
            results.len(),
            succeeded,
            failed,
            req.reason
        );

        let audit_id = if req.audit_log {
            let entry = json!({
                "requested": req.ids,
                "rejected": rejected,
                "reason": req.reason,
                "details": req.details,
                "at": now.to_rfc3339(),
            });
            self.write_audit("reject_transactions", entry).await
        } else {
            None
        };

        if let Some(audit_id) = &audit_id {
            let mut table = self.inner.pending.lock();
            for id in &rejected {
                if let Some(info) = table.get_mut(*id).and_then(|tx| tx.rejection.as_mut()) {
                    info.audit_id = Some(audit_id.clone());
                }
            }
        }

        if req.notify_user && succeeded > 0 {
            self.notify_rejection(succeeded, &req.reason).await;
        }

        Ok(RejectionReport {
            total_processed: results.len(),
            succeeded,
            failed,
            audit_id,
            results,
        })
    }

    fn reject_one(&self, id: &str, reason: &str, details: &str, at: DateTime<Utc>) -> RejectionOutcome {
        let mut table = self.inner.pending.lock();
        let error = match table.get_mut(id) {
            None => Some(format!("transaction {} not found", id)),
            Some(tx) if tx.status != TxStatus::Pending => {
                Some(format!("transaction {} is {}; only pending transactions can be rejected", id, tx.status))
            }
            Some(tx) => {
                tx.status = TxStatus::Rejected;
                tx.rejection = Some(RejectionInfo {
                    reason: reason.to_string(),
                    details: details.to_string(),
                    rejected_at: at,
                    audit_id: None,
                });
                None
            }
        };
        RejectionOutcome { id: id.to_string(), success: error.is_none(), error }
    }

    async fn write_audit(&self, action: &str, entry: serde_json::Value) -> Option<String> {
        let sink = self.inner.audit.read().clone();
        match sink {
            Some(sink) => match sink.record(action, entry).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("[lifecycle] Audit entry for {} could not be written: {}", action, e);
                    None
                }
            },
            None => {
                // No sink configured: the log is the audit trail.
                let id = uuid::Uuid::new_v4().to_string();
                info!("[audit] {} {} {}", id, action, entry);
                Some(id)
            }
        }
    }

    async fn notify_rejection(&self, count: usize, reason: &str) {
        let notifier = self.inner.notifier.read().clone();
        let Some(notifier) = notifier else {
            warn!("[lifecycle] User notification requested but no notifier is attached");
            return;
        };
        let body = format!("{} transaction(s) rejected: {}", count, reason);
        if let Err(e) = notifier.notify("Transactions rejected", &body).await {
            warn!("[lifecycle] Rejection notification failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{fast_config, ScriptedExecutor};
    use super::*;
    use crate::engine::context::RequestContext;
    use crate::engine::testing::{swap_params, MemoryAudit, MockChain, RecordingNotifier};
    use crate::atoms::types::TxInclusion;
    use std::sync::Arc;

    fn engine() -> TransactionEngine {
        let engine = TransactionEngine::new(Arc::new(ScriptedExecutor::new(0)), fast_config(3, 50, 200));
        engine.register_chain(Arc::new(MockChain::new("ethereum")), 1);
        engine
    }

    fn request(ids: Vec<String>) -> RejectRequest {
        RejectRequest {
            ids,
            reason: "suspicious recipient".into(),
            details: "flagged by agent".into(),
            notify_user: false,
            audit_log: false,
        }
    }

    #[tokio::test]
    async fn test_batch_with_unknown_id() {
        let engine = engine();
        let id = engine.submit_swap(&RequestContext::new(), None, swap_params("ethereum")).await.unwrap();

        let report = engine.reject_transactions(request(vec![id.clone(), "missing".into()])).await.unwrap();
        assert_eq!(report.total_processed, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(report.results[0].success);
        assert!(!report.results[1].success);
        assert!(!report.results[1].error.as_deref().unwrap_or_default().is_empty());

        let tx = engine.get_transaction(&id).unwrap();
        assert_eq!(tx.status, TxStatus::Rejected);
        assert_eq!(tx.rejection.unwrap().reason, "suspicious recipient");
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_terminal_transaction_cannot_be_rejected() {
        let engine = TransactionEngine::new(Arc::new(ScriptedExecutor::new(0)), fast_config(3, 50, 200));
        engine.register_chain(
            Arc::new(MockChain::new("ethereum").with_default(TxInclusion::Included { confirmations: 1 })),
            1,
        );
        let id = engine.submit_swap(&RequestContext::new(), None, swap_params("ethereum")).await.unwrap();
        super::super::tests::wait_for_status(&engine, &id, TxStatus::Confirmed).await;

        let report = engine.reject_transactions(request(vec![id.clone()])).await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(report.results[0].error.as_deref().unwrap_or_default().contains("confirmed"));
        assert_eq!(engine.get_transaction(&id).unwrap().status, TxStatus::Confirmed);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_rejecting_twice_fails_second_time() {
        let engine = engine();
        let id = engine.submit_swap(&RequestContext::new(), None, swap_params("ethereum")).await.unwrap();
        let report = engine.reject_transactions(request(vec![id.clone(), id.clone()])).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_audit_and_notification() {
        let engine = engine();
        let audit = Arc::new(MemoryAudit::default());
        let notifier = Arc::new(RecordingNotifier::default());
        engine.set_audit_sink(audit.clone());
        engine.set_notifier(notifier.clone());

        let id = engine.submit_swap(&RequestContext::new(), None, swap_params("ethereum")).await.unwrap();
        let mut req = request(vec![id.clone()]);
        req.audit_log = true;
        req.notify_user = true;
        let report = engine.reject_transactions(req).await.unwrap();

        assert_eq!(report.audit_id.as_deref(), Some("audit-1"));
        let tx = engine.get_transaction(&id).unwrap();
        assert_eq!(tx.rejection.unwrap().audit_id.as_deref(), Some("audit-1"));

        let entries = audit.entries.lock();
        assert_eq!(entries[0].0, "reject_transactions");
        assert_eq!(entries[0].1["reason"], "suspicious recipient");
        assert_eq!(notifier.sent.lock().len(), 1);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let engine = engine();
        assert!(matches!(
            engine.reject_transactions(request(vec![])).await,
            Err(EngineError::MissingRequiredField(_))
        ));
    }
}
