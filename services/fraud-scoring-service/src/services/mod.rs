//! Transaction processing coordination.
//!
//! `FraudScoringService` is the entry point of the scoring pipeline: it loads
//! the inputs, enriches the transaction with velocity and behavioral
//! features, runs the rule engine and the model scorer, combines both through
//! the decider, applies the feedback side effects, and schedules the
//! asynchronous behavior re-aggregation. A failure anywhere inside the
//! pipeline yields the error decision — the transaction is never left
//! PENDING.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use payguard_common::seconds_between;
use payguard_config::FraudScoringConfig;
use payguard_errors::{not_found_error, validation_error, PayGuardError, Result};
use validator::Validate;

use crate::behavior::{BehaviorAggregator, BehaviorUpdateQueue};
use crate::decision::{Decider, Decision, ScoringPhase};
use crate::feedback::FeedbackApplier;
use crate::ml::{FeatureVector, ModelScorer};
use crate::models::{
    status_message, BehaviorAnalysis, FraudAnalysis, QrVerificationRequest, Transaction,
    TransactionRequest, TransactionResponse, TransactionStatus, TransactionType, User,
    UserBehavior, UserFraudStatistics,
};
use crate::rules::{behavior_deviation, RuleContext, RuleEngine};
use crate::store::Store;

/// Read-only context assembled during enrichment and handed to the scorers
struct ScoringContext {
    behavior: UserBehavior,
    known_devices: HashSet<String>,
    transactions_last_hour: u64,
    transactions_last_day: u64,
}

/// The fraud scoring pipeline coordinator
pub struct FraudScoringService {
    store: Arc<dyn Store>,
    rule_engine: RuleEngine,
    model_scorer: Arc<dyn ModelScorer>,
    feedback: FeedbackApplier,
    behavior_queue: BehaviorUpdateQueue,
    config: FraudScoringConfig,
}

impl FraudScoringService {
    /// Wire the pipeline. The model scorer is an explicit dependency so a
    /// deterministic double can stand in for the network during tests.
    pub fn new(
        store: Arc<dyn Store>,
        model_scorer: Arc<dyn ModelScorer>,
        config: FraudScoringConfig,
    ) -> Self {
        let aggregator = Arc::new(BehaviorAggregator::new(store.clone()));
        let behavior_queue = BehaviorUpdateQueue::start(aggregator, config.behavior_queue_capacity);
        Self {
            rule_engine: RuleEngine::new(&config),
            feedback: FeedbackApplier::new(store.clone()),
            store,
            model_scorer,
            behavior_queue,
            config,
        }
    }

    /// Score an incoming transaction and commit the decision
    pub async fn process_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionResponse> {
        self.validate_request(&request)?;

        let user = self
            .store
            .find_user_by_id(request.user_id)
            .await?
            .ok_or_else(|| not_found_error!("User", request.user_id))?;

        if user.account_locked {
            info!(
                "Rejecting transaction for locked account {}",
                user.user_id
            );
            return Err(PayGuardError::AccountLocked {
                user_id: user.user_id.to_string(),
                code: "ACCOUNT_LOCKED".to_string(),
            });
        }

        let mut transaction = Transaction::from_request(&request);
        info!(
            "Processing transaction {} for user {} ({} {})",
            transaction.transaction_id, user.user_id, transaction.amount, transaction.currency
        );

        let decision = match self.run_pre_transaction_pipeline(&mut transaction, &user).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(
                    "Scoring pipeline failed for transaction {}: {}",
                    transaction.transaction_id, e
                );
                Decider::error_decision(ScoringPhase::PreTransaction)
            }
        };

        self.feedback.apply(&mut transaction, &decision).await;
        self.behavior_queue.enqueue(user.user_id);

        Ok(build_response(&transaction, &decision))
    }

    /// QR entry point: same pipeline behind stricter request validation
    pub async fn process_qr_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionResponse> {
        if request.transaction_type != TransactionType::QrCode {
            return Err(validation_error!(
                "QR processing requires a QR_CODE transaction",
                "transaction_type"
            ));
        }
        match request.qr_code_id.as_deref() {
            Some(qr) if !qr.is_empty() => {}
            _ => return Err(validation_error!("QR code id is required", "qr_code_id")),
        }
        self.process_transaction(request).await
    }

    /// Re-score the most recent transaction carrying this QR code in
    /// post-transaction mode. Unlike the pre-transaction path this can hold
    /// the payment or block it outright and lock the account.
    pub async fn verify_qr_transaction(
        &self,
        request: QrVerificationRequest,
    ) -> Result<TransactionResponse> {
        request
            .validate()
            .map_err(|e| validation_error!(format!("{}", e)))?;

        let user = self
            .store
            .find_user_by_id(request.user_id)
            .await?
            .ok_or_else(|| not_found_error!("User", request.user_id))?;

        let mut transaction = self
            .store
            .find_by_user_id_order_by_time_desc(user.user_id)
            .await?
            .into_iter()
            .find(|t| t.qr_code_id.as_deref() == Some(request.qr_code_id.as_str()))
            .ok_or_else(|| not_found_error!("Transaction", request.qr_code_id))?;

        info!(
            "Re-verifying QR transaction {} for user {}",
            transaction.transaction_id, user.user_id
        );

        let decision = match self.assemble_context(&user, payguard_common::now_utc()).await {
            Ok(ctx) => {
                self.score(&transaction, &user, &ctx, ScoringPhase::PostTransaction)
                    .await
            }
            Err(e) => {
                error!(
                    "Verification pipeline failed for transaction {}: {}",
                    transaction.transaction_id, e
                );
                Decider::error_decision(ScoringPhase::PostTransaction)
            }
        };

        self.feedback.apply(&mut transaction, &decision).await;
        self.behavior_queue.enqueue(user.user_id);

        Ok(build_response(&transaction, &decision))
    }

    /// Per-user fraud exposure summary
    pub async fn user_fraud_statistics(&self, user_id: Uuid) -> Result<UserFraudStatistics> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| not_found_error!("User", user_id))?;

        let alerts = self.store.find_alerts_by_user_id(user_id).await?;
        let fraudulent = self.store.count_fraudulent_transactions(user_id).await?;

        Ok(UserFraudStatistics {
            user_id,
            trust_score: user.trust_score,
            total_fraud_alerts: alerts.len() as u64,
            fraudulent_transactions: fraudulent,
            account_locked: user.account_locked,
        })
    }

    fn validate_request(&self, request: &TransactionRequest) -> Result<()> {
        request
            .validate()
            .map_err(|e| validation_error!(format!("{}", e)))?;
        if request.amount <= 0.0 {
            return Err(validation_error!("Amount must be positive", "amount"));
        }
        Ok(())
    }

    /// Enrich, persist the initial PENDING row, and score
    async fn run_pre_transaction_pipeline(
        &self,
        transaction: &mut Transaction,
        user: &User,
    ) -> Result<Decision> {
        let ctx = self.enrich(transaction, user).await?;
        self.store.save_transaction(transaction).await?;
        Ok(self
            .score(transaction, user, &ctx, ScoringPhase::PreTransaction)
            .await)
    }

    /// Load the user's recent history once and derive the velocity and
    /// behavioral features the scorers read.
    async fn enrich(&self, transaction: &mut Transaction, user: &User) -> Result<ScoringContext> {
        let history = self
            .store
            .find_by_user_id_order_by_time_desc(user.user_id)
            .await?;

        if let Some(latest) = history.first() {
            transaction.time_since_last_transaction = Some(seconds_between(
                latest.transaction_time,
                transaction.transaction_time,
            ));
        }

        let accepted: Vec<&Transaction> = history.iter().filter(|t| t.is_accepted()).collect();
        transaction.avg_transaction_amount = if accepted.is_empty() {
            transaction.amount
        } else {
            accepted.iter().map(|t| t.amount).sum::<f64>() / accepted.len() as f64
        };

        let ctx = self
            .assemble_context(user, transaction.transaction_time)
            .await?;
        transaction.transactions_in_last_hour = ctx.transactions_last_hour;
        transaction.transactions_in_last_day = ctx.transactions_last_day;
        transaction.velocity_score = ctx.behavior.velocity_pattern;

        Ok(ctx)
    }

    /// Velocity read-out plus the behavioral profile (materialized with
    /// neutral defaults on first reference).
    async fn assemble_context(
        &self,
        user: &User,
        as_of: chrono::DateTime<chrono::Utc>,
    ) -> Result<ScoringContext> {
        let transactions_last_hour = self
            .store
            .count_transactions_since(user.user_id, as_of - chrono::Duration::hours(1))
            .await?;
        let transactions_last_day = self
            .store
            .count_transactions_since(user.user_id, as_of - chrono::Duration::hours(24))
            .await?;

        let behavior = match self.store.find_behavior_by_user_id(user.user_id).await? {
            Some(behavior) => behavior,
            None => {
                let behavior = UserBehavior::neutral(user.user_id);
                self.store.save_behavior(&behavior).await?;
                behavior
            }
        };

        let known_devices: HashSet<String> = self
            .store
            .find_distinct_devices_by_user_id(user.user_id)
            .await?
            .into_iter()
            .collect();

        Ok(ScoringContext {
            behavior,
            known_devices,
            transactions_last_hour,
            transactions_last_day,
        })
    }

    /// Rule engine and model scorer over the same enriched context, fused by
    /// the decider. The model runs under its soft time budget; on expiry or
    /// error the decision degrades to rule-only scoring.
    async fn score(
        &self,
        transaction: &Transaction,
        user: &User,
        ctx: &ScoringContext,
        phase: ScoringPhase,
    ) -> Decision {
        let rule_eval = self.rule_engine.evaluate(&RuleContext {
            transaction,
            user: Some(user),
            behavior: Some(&ctx.behavior),
            transactions_last_hour: ctx.transactions_last_hour,
            transactions_last_day: ctx.transactions_last_day,
            known_devices: &ctx.known_devices,
        });

        let features = FeatureVector::extract(transaction, Some(&ctx.behavior));
        let budget = Duration::from_millis(self.config.model_timeout_ms);
        let model_score = match timeout(budget, self.model_scorer.score(&features)).await {
            Ok(Ok(score)) => Some(score),
            Ok(Err(e)) => {
                warn!(
                    "Model scorer failed for transaction {}: {}; using rule-only score",
                    transaction.transaction_id, e
                );
                None
            }
            Err(_) => {
                warn!(
                    "Model scorer exceeded {}ms budget for transaction {}; using rule-only score",
                    self.config.model_timeout_ms, transaction.transaction_id
                );
                None
            }
        };

        let deviation = behavior_deviation(transaction, Some(&ctx.behavior));
        Decider::decide(
            phase,
            &rule_eval,
            model_score,
            deviation,
            Some(features.to_vec()),
        )
    }
}

fn build_response(transaction: &Transaction, decision: &Decision) -> TransactionResponse {
    TransactionResponse {
        transaction_id: transaction.transaction_id,
        user_id: transaction.user_id,
        amount: transaction.amount,
        currency: transaction.currency.clone(),
        transaction_type: transaction.transaction_type,
        status: transaction.status,
        fraud_status: transaction.fraud_status,
        fraud_score: transaction.fraud_score,
        fraud_reason: transaction.fraud_reason.clone(),
        approved: transaction.status == TransactionStatus::Approved,
        message: status_message(transaction.status).to_string(),
        transaction_time: transaction.transaction_time,
        fraud_analysis: Some(FraudAnalysis {
            ml_score: decision.model_score,
            rule_based_score: decision.rule_score,
            risk_level: decision.risk_level,
            triggered_rules: decision.triggered_rules.clone(),
            recommendation: decision.recommendation,
            behavior_analysis: BehaviorAnalysis {
                unusual_amount: decision.flags.unusual_amount,
                unusual_time: decision.flags.unusual_time,
                unusual_location: decision.flags.unusual_location,
                unusual_device: decision.flags.unusual_device,
                high_velocity: decision.flags.high_velocity,
                deviation_from_normal: decision.behavior_deviation,
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::FixedScorer;
    use crate::models::FraudStatus;
    use crate::store::MemoryStore;
    use payguard_common::generate_id;

    fn service_with(store: Arc<MemoryStore>, model: f64) -> FraudScoringService {
        FraudScoringService::new(
            store,
            Arc::new(FixedScorer::new(model)),
            FraudScoringConfig::default(),
        )
    }

    fn request_for(user_id: Uuid, amount: f64) -> TransactionRequest {
        TransactionRequest {
            user_id,
            amount,
            currency: "USD".to_string(),
            transaction_type: TransactionType::Card,
            merchant_name: Some("Corner Grocery".to_string()),
            merchant_id: None,
            merchant_category: Some("grocery".to_string()),
            ip_address: Some("203.0.113.7".to_string()),
            country: Some("US".to_string()),
            city: Some("Portland".to_string()),
            latitude: None,
            longitude: None,
            device_id: "device-1".to_string(),
            device_type: None,
            device_fingerprint: None,
            user_agent: None,
            qr_code_id: None,
            qr_merchant_id: None,
        }
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, 0.1);

        let result = service
            .process_transaction(request_for(generate_id(), 50.0))
            .await;
        assert!(matches!(result, Err(PayGuardError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_invalid_amount_is_rejected_before_scoring() {
        let store = Arc::new(MemoryStore::new());
        let user = User::new("a@example.com", "+14155552671", "Alex", "opaque");
        store.save_user(&user).await.unwrap();
        let service = service_with(store.clone(), 0.1);

        let result = service
            .process_transaction(request_for(user.user_id, -5.0))
            .await;
        assert!(matches!(result, Err(PayGuardError::Validation { .. })));

        // Nothing reached the store
        let history = store
            .find_by_user_id_order_by_time_desc(user.user_id)
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_locked_account_short_circuits() {
        let store = Arc::new(MemoryStore::new());
        let mut user = User::new("a@example.com", "+14155552671", "Alex", "opaque");
        user.account_locked = true;
        user.enabled = false;
        store.save_user(&user).await.unwrap();
        let service = service_with(store.clone(), 0.1);

        let result = service
            .process_transaction(request_for(user.user_id, 50.0))
            .await;
        assert!(matches!(result, Err(PayGuardError::AccountLocked { .. })));

        // No scoring side effects: no transaction, no alert, trust unchanged
        let history = store
            .find_by_user_id_order_by_time_desc(user.user_id)
            .await
            .unwrap();
        assert!(history.is_empty());
        let alerts = store.find_alerts_by_user_id(user.user_id).await.unwrap();
        assert!(alerts.is_empty());
        let unchanged = store.find_user_by_id(user.user_id).await.unwrap().unwrap();
        assert_eq!(unchanged.trust_score, 100.0);
    }

    #[tokio::test]
    async fn test_clean_transaction_approves_and_enriches() {
        let store = Arc::new(MemoryStore::new());
        let user = User::new("a@example.com", "+14155552671", "Alex", "opaque");
        store.save_user(&user).await.unwrap();
        let service = service_with(store.clone(), 0.1);

        let response = service
            .process_transaction(request_for(user.user_id, 50.0))
            .await
            .unwrap();

        assert_eq!(response.status, TransactionStatus::Approved);
        assert!(response.approved);
        assert_eq!(response.fraud_status, FraudStatus::Safe);
        assert_eq!(response.message, "Transaction approved");

        let stored = store
            .find_transaction_by_id(response.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored.status, TransactionStatus::Pending);
        // First transaction: no prior history
        assert_eq!(stored.time_since_last_transaction, None);
        assert_eq!(stored.avg_transaction_amount, 50.0);

        // Neutral profile was materialized on first reference
        assert!(store
            .find_behavior_by_user_id(user.user_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_qr_entry_requires_qr_fields() {
        let store = Arc::new(MemoryStore::new());
        let user = User::new("a@example.com", "+14155552671", "Alex", "opaque");
        store.save_user(&user).await.unwrap();
        let service = service_with(store, 0.1);

        let mut request = request_for(user.user_id, 50.0);
        request.transaction_type = TransactionType::QrCode;
        let result = service.process_qr_transaction(request.clone()).await;
        assert!(matches!(result, Err(PayGuardError::Validation { .. })));

        request.qr_code_id = Some("qr-123".to_string());
        assert!(service.process_qr_transaction(request).await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_unknown_qr_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let user = User::new("a@example.com", "+14155552671", "Alex", "opaque");
        store.save_user(&user).await.unwrap();
        let service = service_with(store, 0.1);

        let result = service
            .verify_qr_transaction(QrVerificationRequest {
                qr_code_id: "missing".to_string(),
                user_id: user.user_id,
            })
            .await;
        assert!(matches!(result, Err(PayGuardError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_fraud_statistics_roll_up() {
        let store = Arc::new(MemoryStore::new());
        let user = User::new("a@example.com", "+14155552671", "Alex", "opaque");
        store.save_user(&user).await.unwrap();
        let service = service_with(store.clone(), 0.95);

        // High model score drives a declined transaction and an alert
        let response = service
            .process_transaction(request_for(user.user_id, 9_999.0))
            .await
            .unwrap();
        assert_eq!(response.status, TransactionStatus::Declined);

        let stats = service.user_fraud_statistics(user.user_id).await.unwrap();
        assert_eq!(stats.total_fraud_alerts, 1);
        assert_eq!(stats.fraudulent_transactions, 1);
        assert!(stats.trust_score < 100.0);
    }
}
