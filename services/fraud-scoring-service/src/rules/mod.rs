//! Deterministic weighted rule engine.
//!
//! A pure function of the transaction, the user, the behavioral profile, and
//! a velocity read-out. Each fired rule adds its weight to an accumulator
//! clamped to 1.0. Triggered rules are always reported in the fixed table
//! order below, never in evaluation order.

use std::collections::HashSet;

use chrono::Timelike;

use payguard_common::{clamp01, NEW_ACCOUNT_WINDOW_DAYS};
use payguard_config::FraudScoringConfig;

use crate::models::{Transaction, User, UserBehavior};

/// Rule identifiers in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RuleId {
    HighAmount,
    HighVelocity,
    UnusualTime,
    UnusualLocation,
    NewDevice,
    LowTrustScore,
    NewAccount,
    MultipleFailedAttempts,
    RoundAmount,
    AmountLimitExceeded,
}

impl RuleId {
    /// Canonical evaluation and reporting order
    pub const ALL: [RuleId; 10] = [
        RuleId::HighAmount,
        RuleId::HighVelocity,
        RuleId::UnusualTime,
        RuleId::UnusualLocation,
        RuleId::NewDevice,
        RuleId::LowTrustScore,
        RuleId::NewAccount,
        RuleId::MultipleFailedAttempts,
        RuleId::RoundAmount,
        RuleId::AmountLimitExceeded,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RuleId::HighAmount => "HIGH_AMOUNT",
            RuleId::HighVelocity => "HIGH_VELOCITY",
            RuleId::UnusualTime => "UNUSUAL_TIME",
            RuleId::UnusualLocation => "UNUSUAL_LOCATION",
            RuleId::NewDevice => "NEW_DEVICE",
            RuleId::LowTrustScore => "LOW_TRUST_SCORE",
            RuleId::NewAccount => "NEW_ACCOUNT",
            RuleId::MultipleFailedAttempts => "MULTIPLE_FAILED_ATTEMPTS",
            RuleId::RoundAmount => "ROUND_AMOUNT",
            RuleId::AmountLimitExceeded => "AMOUNT_LIMIT_EXCEEDED",
        }
    }

    pub fn weight(self) -> f64 {
        match self {
            RuleId::HighAmount => 0.30,
            RuleId::HighVelocity => 0.25,
            RuleId::UnusualTime => 0.15,
            RuleId::UnusualLocation => 0.20,
            RuleId::NewDevice => 0.15,
            RuleId::LowTrustScore => 0.20,
            RuleId::NewAccount => 0.10,
            RuleId::MultipleFailedAttempts => 0.15,
            RuleId::RoundAmount => 0.05,
            RuleId::AmountLimitExceeded => 0.40,
        }
    }

    fn reason(self) -> &'static str {
        match self {
            RuleId::HighAmount => "Transaction amount is unusually high for this user",
            RuleId::HighVelocity => "Unusually high transaction velocity",
            RuleId::UnusualTime => "Transaction initiated at an unusual hour",
            RuleId::UnusualLocation => "Transaction from an unusual location",
            RuleId::NewDevice => "Transaction from a previously unseen device",
            RuleId::LowTrustScore => "User trust score is low",
            RuleId::NewAccount => "Account was registered within the last week",
            RuleId::MultipleFailedAttempts => "Multiple failed attempts on record",
            RuleId::RoundAmount => "Suspiciously round transaction amount",
            RuleId::AmountLimitExceeded => "Amount exceeds the configured transaction limit",
        }
    }
}

/// Inputs the rule engine evaluates against
pub struct RuleContext<'a> {
    pub transaction: &'a Transaction,
    pub user: Option<&'a User>,
    pub behavior: Option<&'a UserBehavior>,
    /// Velocity read-out from the store
    pub transactions_last_hour: u64,
    pub transactions_last_day: u64,
    /// Devices this user has transacted from before
    pub known_devices: &'a HashSet<String>,
}

/// Behavioral flags mirroring the rule firings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BehaviorFlags {
    pub unusual_amount: bool,
    pub unusual_time: bool,
    pub unusual_location: bool,
    pub unusual_device: bool,
    pub high_velocity: bool,
    pub new_device: bool,
}

/// Result of a rule engine pass
#[derive(Debug, Clone)]
pub struct RuleEvaluation {
    /// Sum of fired weights, clamped to [0, 1]
    pub rule_score: f64,
    /// Fired rules in the canonical table order
    pub triggered_rules: Vec<RuleId>,
    /// Human-readable reasons; the first entry is the primary reason
    pub reasons: Vec<String>,
    pub flags: BehaviorFlags,
    /// Rule-only verdict
    pub is_fraud: bool,
}

impl RuleEvaluation {
    pub fn rule_names(&self) -> Vec<String> {
        self.triggered_rules
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }
}

/// Weighted rule engine with configurable thresholds
#[derive(Debug, Clone)]
pub struct RuleEngine {
    max_transaction_amount: f64,
    max_transactions_per_hour: u64,
    max_transactions_per_day: u64,
}

impl RuleEngine {
    pub fn new(config: &FraudScoringConfig) -> Self {
        Self {
            max_transaction_amount: config.max_transaction_amount,
            max_transactions_per_hour: config.max_transactions_per_hour as u64,
            max_transactions_per_day: config.max_transactions_per_day as u64,
        }
    }

    /// Evaluate every rule against the context
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleEvaluation {
        let mut score = 0.0;
        let mut triggered = Vec::new();
        let mut reasons = Vec::new();
        let mut flags = BehaviorFlags::default();

        for rule in RuleId::ALL {
            if !self.fires(rule, ctx) {
                continue;
            }
            score += rule.weight();
            triggered.push(rule);
            reasons.push(rule.reason().to_string());
            match rule {
                RuleId::HighAmount | RuleId::AmountLimitExceeded => flags.unusual_amount = true,
                RuleId::HighVelocity => flags.high_velocity = true,
                RuleId::UnusualTime => flags.unusual_time = true,
                RuleId::UnusualLocation => flags.unusual_location = true,
                RuleId::NewDevice => {
                    flags.new_device = true;
                    flags.unusual_device = true;
                }
                _ => {}
            }
        }

        let rule_score = clamp01(score);
        RuleEvaluation {
            rule_score,
            triggered_rules: triggered,
            reasons,
            flags,
            is_fraud: rule_score >= 0.7,
        }
    }

    fn fires(&self, rule: RuleId, ctx: &RuleContext<'_>) -> bool {
        let t = ctx.transaction;
        match rule {
            RuleId::HighAmount => match ctx.behavior {
                Some(b) if b.has_amount_history() => {
                    let std_dev = if b.std_dev_transaction_amount > 0.0 {
                        b.std_dev_transaction_amount
                    } else {
                        b.avg_transaction_amount * 0.5
                    };
                    t.amount > b.avg_transaction_amount + 3.0 * std_dev
                }
                _ => t.amount > 5_000.0,
            },
            RuleId::HighVelocity => {
                ctx.transactions_last_hour > self.max_transactions_per_hour
                    || ctx.transactions_last_day > self.max_transactions_per_day
            }
            RuleId::UnusualTime => {
                let hour = t.transaction_time.hour();
                (2..6).contains(&hour)
            }
            RuleId::UnusualLocation => match (&t.country, ctx.behavior) {
                (Some(country), Some(b)) => !b.frequent_countries.contains(country),
                _ => false,
            },
            RuleId::NewDevice => match &t.device_id {
                Some(device_id) => !ctx.known_devices.contains(device_id),
                None => false,
            },
            RuleId::LowTrustScore => ctx.user.map(|u| u.trust_score < 50.0).unwrap_or(false),
            RuleId::NewAccount => ctx
                .user
                .map(|u| {
                    (t.transaction_time - u.registration_date).num_days() < NEW_ACCOUNT_WINDOW_DAYS
                })
                .unwrap_or(false),
            RuleId::MultipleFailedAttempts => ctx
                .behavior
                .map(|b| b.failed_attempts > 3)
                .unwrap_or(false),
            RuleId::RoundAmount => {
                t.amount >= 500.0 && (t.amount % 1_000.0 == 0.0 || t.amount % 500.0 == 0.0)
            }
            RuleId::AmountLimitExceeded => t.amount > self.max_transaction_amount,
        }
    }
}

/// Distance of the amount from the profile mean, in standard deviations.
/// Zero when the profile is missing or degenerate.
pub fn behavior_deviation(transaction: &Transaction, behavior: Option<&UserBehavior>) -> f64 {
    match behavior {
        Some(b) if b.has_amount_history() && b.std_dev_transaction_amount > 0.0 => {
            (transaction.amount - b.avg_transaction_amount).abs() / b.std_dev_transaction_amount
        }
        _ => 0.0,
    }
}
