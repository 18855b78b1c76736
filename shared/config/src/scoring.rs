//! Fraud scoring configuration

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Fraud scoring service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FraudScoringConfig {
    /// Transactions above this amount trigger the AMOUNT_LIMIT_EXCEEDED rule
    #[validate(range(min = 0.0))]
    pub max_transaction_amount: f64,

    /// Per-user velocity ceiling for the trailing hour
    #[validate(range(min = 1))]
    pub max_transactions_per_hour: u32,

    /// Per-user velocity ceiling for the trailing day
    #[validate(range(min = 1))]
    pub max_transactions_per_day: u32,

    /// Path the model scorer loads weights from and persists them to.
    /// When absent or unreadable a freshly initialized model is used.
    pub model_path: Option<String>,

    /// Reserved: minimum model confidence before its score is trusted
    #[validate(range(min = 0.0, max = 1.0))]
    pub model_confidence_threshold: f64,

    /// Soft time budget for a single model inference; on expiry the
    /// pipeline degrades to rule-only scoring
    #[validate(range(min = 10, max = 60000))]
    pub model_timeout_ms: u64,

    /// Capacity of the behavior re-aggregation queue
    #[validate(range(min = 1, max = 65536))]
    pub behavior_queue_capacity: usize,
}

impl Default for FraudScoringConfig {
    fn default() -> Self {
        Self {
            max_transaction_amount: 10_000.0,
            max_transactions_per_hour: 10,
            max_transactions_per_day: 50,
            model_path: None,
            model_confidence_threshold: 0.7,
            model_timeout_ms: 250,
            behavior_queue_capacity: 256,
        }
    }
}
