//! Score combination and risk banding.
//!
//! The decider fuses the rule and model scores into the final fraud score,
//! classifies it into risk/status/recommendation bands, and determines what
//! happens to the transaction. Pre-transaction scoring can approve, review,
//! or decline; post-transaction re-verification can additionally hold or
//! block (and lock the account).

use payguard_common::clamp01;

use crate::models::{DetectionMethod, FraudStatus, Recommendation, RiskLevel, TransactionStatus};
use crate::rules::{BehaviorFlags, RuleEvaluation};

/// Contribution of the model score to the combined score
pub const MODEL_WEIGHT: f64 = 0.6;
/// Contribution of the rule score to the combined score
pub const RULE_WEIGHT: f64 = 0.4;

/// Whether the transaction is being scored before commitment or re-verified
/// after settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringPhase {
    PreTransaction,
    PostTransaction,
}

/// What the decision does to the transaction's status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Set(TransactionStatus),
    Keep,
}

/// Complete outcome of a scoring pass
#[derive(Debug, Clone)]
pub struct Decision {
    pub phase: ScoringPhase,
    pub fraud_score: f64,
    pub model_score: f64,
    pub rule_score: f64,
    pub risk_level: RiskLevel,
    pub fraud_status: FraudStatus,
    pub recommendation: Recommendation,
    pub detection_method: DetectionMethod,
    pub status_update: StatusUpdate,
    pub lock_account: bool,
    pub primary_reason: String,
    pub reasons: Vec<String>,
    pub triggered_rules: Vec<String>,
    pub flags: BehaviorFlags,
    pub behavior_deviation: f64,
    pub ml_features: Option<Vec<f64>>,
}

pub struct Decider;

impl Decider {
    /// Weighted combination of model and rule scores, clamped to [0, 1]
    pub fn combine(model_score: f64, rule_score: f64) -> f64 {
        clamp01(MODEL_WEIGHT * model_score + RULE_WEIGHT * rule_score)
    }

    /// Band a combined score (lower bounds inclusive)
    pub fn band(fraud_score: f64) -> (RiskLevel, FraudStatus, Recommendation) {
        if fraud_score >= 0.9 {
            (RiskLevel::Critical, FraudStatus::Fraud, Recommendation::Decline)
        } else if fraud_score >= 0.7 {
            (RiskLevel::High, FraudStatus::Fraud, Recommendation::Decline)
        } else if fraud_score >= 0.4 {
            (RiskLevel::Medium, FraudStatus::Suspicious, Recommendation::Review)
        } else {
            (RiskLevel::Low, FraudStatus::Safe, Recommendation::Approve)
        }
    }

    /// Terminal status before commitment. BLOCKED is never produced here.
    pub fn pre_transaction_status(fraud_score: f64) -> TransactionStatus {
        if fraud_score >= 0.7 {
            TransactionStatus::Declined
        } else if fraud_score >= 0.4 {
            TransactionStatus::Review
        } else {
            TransactionStatus::Approved
        }
    }

    /// Status change on re-verification, plus whether the account locks.
    /// Below the hold band the transaction keeps its settled status.
    pub fn post_transaction_update(fraud_score: f64) -> (StatusUpdate, bool) {
        if fraud_score >= 0.9 {
            (StatusUpdate::Set(TransactionStatus::Blocked), true)
        } else if fraud_score >= 0.7 {
            (StatusUpdate::Set(TransactionStatus::Hold), false)
        } else {
            (StatusUpdate::Keep, false)
        }
    }

    /// Fuse a rule evaluation with the model outcome. `model_score` is `None`
    /// when the model was unavailable or exceeded its time budget, in which
    /// case the decision degrades to rule-only scoring.
    pub fn decide(
        phase: ScoringPhase,
        rule_eval: &RuleEvaluation,
        model_score: Option<f64>,
        behavior_deviation: f64,
        ml_features: Option<Vec<f64>>,
    ) -> Decision {
        let (effective_model, detection_method, fraud_score) = match model_score {
            Some(score) => (
                clamp01(score),
                DetectionMethod::Hybrid,
                Self::combine(score, rule_eval.rule_score),
            ),
            None => (0.0, DetectionMethod::RuleBased, rule_eval.rule_score),
        };

        let (risk_level, fraud_status, recommendation) = Self::band(fraud_score);
        let (status_update, lock_account) = match phase {
            ScoringPhase::PreTransaction => (
                StatusUpdate::Set(Self::pre_transaction_status(fraud_score)),
                false,
            ),
            ScoringPhase::PostTransaction => Self::post_transaction_update(fraud_score),
        };

        let primary_reason = Self::primary_reason(rule_eval, effective_model);

        Decision {
            phase,
            fraud_score,
            model_score: effective_model,
            rule_score: rule_eval.rule_score,
            risk_level,
            fraud_status,
            recommendation,
            detection_method,
            status_update,
            lock_account,
            primary_reason,
            reasons: rule_eval.reasons.clone(),
            triggered_rules: rule_eval.rule_names(),
            flags: rule_eval.flags,
            behavior_deviation,
            ml_features,
        }
    }

    /// Fallback decision when the pipeline fails: neutral score, manual
    /// review, no verdict on fraud status.
    pub fn error_decision(phase: ScoringPhase) -> Decision {
        Decision {
            phase,
            fraud_score: 0.5,
            model_score: 0.5,
            rule_score: 0.5,
            risk_level: RiskLevel::Medium,
            fraud_status: FraudStatus::Unknown,
            recommendation: Recommendation::Review,
            detection_method: DetectionMethod::Error,
            status_update: StatusUpdate::Set(TransactionStatus::Review),
            lock_account: false,
            primary_reason: "Fraud evaluation failed; routed to manual review".to_string(),
            reasons: Vec::new(),
            triggered_rules: Vec::new(),
            flags: BehaviorFlags::default(),
            behavior_deviation: 0.0,
            ml_features: None,
        }
    }

    fn primary_reason(rule_eval: &RuleEvaluation, model_score: f64) -> String {
        if let Some(reason) = rule_eval.reasons.first() {
            reason.clone()
        } else if model_score >= 0.7 {
            "ML model detected suspicious patterns".to_string()
        } else {
            "Transaction appears normal".to_string()
        }
    }
}
