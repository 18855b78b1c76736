//! Shared constants for PayGuard services

/// Bounded sizes of the encoded behavior-profile sets
pub const TOP_HOURS: usize = 3;
pub const TOP_WEEKDAYS: usize = 3;
pub const TOP_CITIES: usize = 5;
pub const TOP_MERCHANTS: usize = 10;
pub const TOP_CATEGORIES: usize = 5;

/// Minimum accepted-transaction sample before the consistency score is trusted
pub const CONSISTENCY_MIN_SAMPLES: usize = 10;

/// Normalization divisors for behavioral scores
pub const DIVERSITY_MERCHANT_SCALE: f64 = 20.0;
pub const DIVERSITY_CATEGORY_SCALE: f64 = 10.0;
pub const SECONDS_PER_WEEK: f64 = 604_800.0;
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Trust score bounds
pub const TRUST_SCORE_MIN: f64 = 0.0;
pub const TRUST_SCORE_MAX: f64 = 100.0;
pub const TRUST_SCORE_INITIAL: f64 = 100.0;

/// Trust score deltas applied by the feedback loop
pub const TRUST_PENALTY_FRAUD: f64 = 20.0;
pub const TRUST_PENALTY_SUSPICIOUS: f64 = 5.0;
pub const TRUST_REWARD_CLEAN: f64 = 0.5;

/// Days a freshly registered account is treated as new by the rule engine
pub const NEW_ACCOUNT_WINDOW_DAYS: i64 = 7;
