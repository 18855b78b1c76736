//! Side effects of a scoring decision.
//!
//! Applied in order: transaction fraud fields, alert (when warranted), user
//! trust adjustment, account lock. Each effect is independent — a failed
//! alert write never rolls back the transaction write; failures are logged
//! and the remaining effects still run. Re-applying the same decision to the
//! same transaction is idempotent: the keyed alert is replaced, not
//! duplicated, and the trust delta is not applied twice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};
use uuid::Uuid;

use payguard_common::{
    clamp, generate_id, now_utc, TRUST_PENALTY_FRAUD, TRUST_PENALTY_SUSPICIOUS,
    TRUST_REWARD_CLEAN, TRUST_SCORE_MAX, TRUST_SCORE_MIN,
};

use crate::decision::{Decision, ScoringPhase, StatusUpdate};
use crate::models::{AlertAction, AlertSeverity, FraudAlert, Transaction};
use crate::store::Store;

/// Keyed async mutexes serializing trust updates per user. Two concurrent
/// scorings for the same user cannot interleave their read-modify-write of
/// the trust fields.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user_id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut registry = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            registry
                .entry(user_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Alert severity and action bands for a combined score
pub fn alert_severity(fraud_score: f64) -> (AlertSeverity, AlertAction) {
    if fraud_score >= 0.9 {
        (AlertSeverity::Critical, AlertAction::Block)
    } else if fraud_score >= 0.7 {
        (AlertSeverity::High, AlertAction::Review)
    } else if fraud_score >= 0.5 {
        (AlertSeverity::Medium, AlertAction::Review)
    } else {
        (AlertSeverity::Low, AlertAction::AllowWithWarning)
    }
}

/// Combined score at or above which an alert is persisted
pub const ALERT_THRESHOLD: f64 = 0.4;

/// Applies the side effects of a decision to the store
pub struct FeedbackApplier {
    store: Arc<dyn Store>,
    user_locks: UserLocks,
}

impl FeedbackApplier {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            user_locks: UserLocks::new(),
        }
    }

    /// Apply the decision's side effects. Mutates `transaction` in place with
    /// the final fraud fields and status. Never propagates persistence
    /// failures — the caller still returns the computed decision and an
    /// operator reconciles.
    pub async fn apply(&self, transaction: &mut Transaction, decision: &Decision) {
        let _guard = self.user_locks.acquire(transaction.user_id).await;

        let expected_status = match decision.status_update {
            StatusUpdate::Set(status) => status,
            StatusUpdate::Keep => transaction.status,
        };

        // A decision already present on the stored transaction is a replay;
        // the writes below stay (they are idempotent) but trust and counters
        // must not move twice.
        let replay = match self
            .store
            .find_transaction_by_id(transaction.transaction_id)
            .await
        {
            Ok(Some(stored)) => {
                stored.fraud_status == decision.fraud_status
                    && stored.status == expected_status
                    && (stored.fraud_score - decision.fraud_score).abs() < f64::EPSILON
            }
            Ok(None) => false,
            Err(e) => {
                warn!(
                    "Replay probe failed for transaction {}: {}",
                    transaction.transaction_id, e
                );
                false
            }
        };

        // 1. Transaction fraud fields
        transaction.fraud_score = decision.fraud_score;
        transaction.fraud_status = decision.fraud_status;
        transaction.fraud_reason = Some(decision.primary_reason.clone());
        transaction.status = expected_status;
        transaction.unusual_amount = decision.flags.unusual_amount;
        transaction.unusual_time = decision.flags.unusual_time;
        transaction.unusual_location = decision.flags.unusual_location;
        transaction.unusual_device = decision.flags.unusual_device;
        transaction.updated_at = now_utc();

        if let Err(e) = self.store.save_transaction(transaction).await {
            error!(
                "Failed to persist scored transaction {}: {}",
                transaction.transaction_id, e
            );
        }

        // 2. Alert, keyed by transaction id
        if decision.fraud_score >= ALERT_THRESHOLD {
            let (severity, action) = alert_severity(decision.fraud_score);
            let now = now_utc();
            let alert = FraudAlert {
                alert_id: generate_id(),
                transaction_id: transaction.transaction_id,
                user_id: transaction.user_id,
                alert_type: decision.detection_method,
                severity,
                fraud_score: decision.fraud_score,
                reason: decision.primary_reason.clone(),
                rules_fired: decision.triggered_rules.clone(),
                ml_features: decision.ml_features.clone(),
                action,
                reviewed: false,
                reviewed_by: None,
                reviewed_at: None,
                review_notes: None,
                confirmed_fraud: false,
                detected_at: now,
                created_at: now,
            };
            if let Err(e) = self.store.save_fraud_alert(&alert).await {
                warn!(
                    "Failed to persist fraud alert for transaction {}: {}",
                    transaction.transaction_id, e
                );
            } else {
                info!(
                    "Fraud alert raised for transaction {} at severity {:?}",
                    transaction.transaction_id, severity
                );
            }
        }

        // 3 + 4. Trust adjustment and account lock, one user write
        match self.store.find_user_by_id(transaction.user_id).await {
            Ok(Some(mut user)) => {
                if !replay {
                    if decision.fraud_score >= 0.7 {
                        user.trust_score = clamp(
                            user.trust_score - TRUST_PENALTY_FRAUD,
                            TRUST_SCORE_MIN,
                            TRUST_SCORE_MAX,
                        );
                        user.fraud_count += 1;
                    } else if decision.fraud_score >= 0.4 {
                        user.trust_score = clamp(
                            user.trust_score - TRUST_PENALTY_SUSPICIOUS,
                            TRUST_SCORE_MIN,
                            TRUST_SCORE_MAX,
                        );
                    } else {
                        user.trust_score = clamp(
                            user.trust_score + TRUST_REWARD_CLEAN,
                            TRUST_SCORE_MIN,
                            TRUST_SCORE_MAX,
                        );
                    }
                    if decision.phase == ScoringPhase::PreTransaction {
                        user.total_transactions += 1;
                    }
                }

                if decision.lock_account {
                    user.account_locked = true;
                    user.enabled = false;
                }
                if user.account_locked {
                    user.enabled = false;
                }
                user.updated_at = now_utc();

                if let Err(e) = self.store.save_user(&user).await {
                    error!("Failed to persist user {} after feedback: {}", user.user_id, e);
                }
            }
            Ok(None) => {
                warn!(
                    "User {} vanished before feedback could be applied",
                    transaction.user_id
                );
            }
            Err(e) => {
                error!(
                    "Failed to load user {} for trust adjustment: {}",
                    transaction.user_id, e
                );
            }
        }
    }
}
