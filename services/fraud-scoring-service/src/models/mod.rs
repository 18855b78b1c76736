//! Data models for the PayGuard fraud scoring service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use payguard_common::{generate_id, now_utc, TRUST_SCORE_INITIAL};

/// Payment rails a transaction can arrive on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    QrCode,
    Upi,
    Card,
    Wallet,
}

/// Terminal and intermediate transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Review,
    Hold,
    Declined,
    Blocked,
}

/// Fraud classification of a scored transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudStatus {
    Unknown,
    Safe,
    Suspicious,
    Fraud,
}

/// Coarse risk classification of a fraud score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Action recommended to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Approve,
    Review,
    Decline,
}

/// How a decision was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionMethod {
    RuleBased,
    MlBased,
    Hybrid,
    Error,
}

/// Alert severity bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Action attached to an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertAction {
    Block,
    Review,
    AllowWithWarning,
}

/// A registered account. The core never inspects `password`; it is opaque
/// credential material owned by the (external) identity surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub phone_number: String,
    pub name: String,
    pub password: String,
    pub trust_score: f64,
    pub account_locked: bool,
    pub enabled: bool,
    pub total_transactions: u64,
    pub fraud_count: u64,
    pub registration_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A freshly registered account: full trust, unlocked, enabled.
    pub fn new(email: &str, phone_number: &str, name: &str, password: &str) -> Self {
        let now = now_utc();
        Self {
            user_id: generate_id(),
            email: email.to_string(),
            phone_number: phone_number.to_string(),
            name: name.to_string(),
            password: password.to_string(),
            trust_score: TRUST_SCORE_INITIAL,
            account_locked: false,
            enabled: true,
            total_transactions: 0,
            fraud_count: 0,
            registration_date: now,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A payment transaction moving through the scoring pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub transaction_type: TransactionType,
    pub transaction_time: DateTime<Utc>,

    // Merchant info
    pub merchant_name: Option<String>,
    pub merchant_id: Option<String>,
    pub merchant_category: Option<String>,

    // Location
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    // Device info
    pub device_id: Option<String>,
    pub device_type: Option<String>,
    pub device_fingerprint: Option<String>,
    pub user_agent: Option<String>,

    // QR fields
    pub qr_code_id: Option<String>,
    pub qr_merchant_id: Option<String>,

    // Scoring outcome
    pub status: TransactionStatus,
    pub fraud_status: FraudStatus,
    pub fraud_score: f64,
    pub fraud_reason: Option<String>,

    // Enrichment fields, populated before scoring
    pub time_since_last_transaction: Option<i64>,
    pub transactions_in_last_hour: u64,
    pub transactions_in_last_day: u64,
    pub avg_transaction_amount: f64,
    pub unusual_amount: bool,
    pub unusual_time: bool,
    pub unusual_location: bool,
    pub unusual_device: bool,
    pub velocity_score: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Build a PENDING transaction from an incoming request
    pub fn from_request(request: &TransactionRequest) -> Self {
        let now = now_utc();
        Self {
            transaction_id: generate_id(),
            user_id: request.user_id,
            amount: request.amount,
            currency: request.currency.clone(),
            transaction_type: request.transaction_type,
            transaction_time: now,
            merchant_name: request.merchant_name.clone(),
            merchant_id: request.merchant_id.clone(),
            merchant_category: request.merchant_category.clone(),
            ip_address: request.ip_address.clone(),
            country: request.country.clone(),
            city: request.city.clone(),
            latitude: request.latitude,
            longitude: request.longitude,
            device_id: Some(request.device_id.clone()),
            device_type: request.device_type.clone(),
            device_fingerprint: request.device_fingerprint.clone(),
            user_agent: request.user_agent.clone(),
            qr_code_id: request.qr_code_id.clone(),
            qr_merchant_id: request.qr_merchant_id.clone(),
            status: TransactionStatus::Pending,
            fraud_status: FraudStatus::Unknown,
            fraud_score: 0.0,
            fraud_reason: None,
            time_since_last_transaction: None,
            transactions_in_last_hour: 0,
            transactions_in_last_day: 0,
            avg_transaction_amount: 0.0,
            unusual_amount: false,
            unusual_time: false,
            unusual_location: false,
            unusual_device: false,
            velocity_score: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// A transaction counts toward behavioral history once it is accepted
    pub fn is_accepted(&self) -> bool {
        self.fraud_status == FraudStatus::Safe || self.status == TransactionStatus::Approved
    }
}

/// Per-user behavioral profile, rewritten wholesale by the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBehavior {
    pub user_id: Uuid,

    // Amount statistics over accepted transactions
    pub avg_transaction_amount: f64,
    pub max_transaction_amount: f64,
    pub min_transaction_amount: f64,
    pub std_dev_transaction_amount: f64,

    // Frequency windows
    pub transactions_per_day: u64,
    pub transactions_per_week: u64,
    pub transactions_per_month: u64,

    // Encoded sets, ordered by frequency, bounded sizes
    pub preferred_hours: Vec<u32>,
    pub preferred_days: Vec<u32>,
    pub frequent_cities: Vec<String>,
    pub frequent_countries: Vec<String>,
    pub known_devices: Vec<String>,
    pub known_ips: Vec<String>,
    pub frequent_merchants: Vec<String>,
    pub frequent_categories: Vec<String>,

    // Behavioral scores, all in [0, 1]
    pub consistency_score: f64,
    pub diversity_score: f64,
    pub velocity_pattern: f64,

    // Counters
    pub failed_attempts: u64,
    pub chargebacks: u64,
    pub disputed_transactions: u64,
    pub data_points_count: u64,

    pub last_updated: DateTime<Utc>,
}

impl UserBehavior {
    /// Neutral profile used on first reference: scores 0.5, empty sets
    pub fn neutral(user_id: Uuid) -> Self {
        Self {
            user_id,
            avg_transaction_amount: 0.0,
            max_transaction_amount: 0.0,
            min_transaction_amount: 0.0,
            std_dev_transaction_amount: 0.0,
            transactions_per_day: 0,
            transactions_per_week: 0,
            transactions_per_month: 0,
            preferred_hours: Vec::new(),
            preferred_days: Vec::new(),
            frequent_cities: Vec::new(),
            frequent_countries: Vec::new(),
            known_devices: Vec::new(),
            known_ips: Vec::new(),
            frequent_merchants: Vec::new(),
            frequent_categories: Vec::new(),
            consistency_score: 0.5,
            diversity_score: 0.5,
            velocity_pattern: 0.5,
            failed_attempts: 0,
            chargebacks: 0,
            disputed_transactions: 0,
            data_points_count: 0,
            last_updated: now_utc(),
        }
    }

    /// Whether the profile carries usable amount statistics
    pub fn has_amount_history(&self) -> bool {
        self.data_points_count > 0
    }
}

/// Persisted record of a scoring outcome subject to human review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    pub alert_id: Uuid,
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub alert_type: DetectionMethod,
    pub severity: AlertSeverity,
    pub fraud_score: f64,
    pub reason: String,
    pub rules_fired: Vec<String>,
    pub ml_features: Option<Vec<f64>>,
    pub action: AlertAction,
    pub reviewed: bool,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub confirmed_fraud: bool,
    pub detected_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// REQUEST / RESPONSE CONTRACTS
// =============================================================================

/// Incoming transaction to score
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransactionRequest {
    pub user_id: Uuid,

    pub amount: f64,

    #[validate(length(min = 3, max = 3))]
    pub currency: String,

    pub transaction_type: TransactionType,

    pub merchant_name: Option<String>,
    pub merchant_id: Option<String>,
    pub merchant_category: Option<String>,

    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    #[validate(length(min = 1))]
    pub device_id: String,
    pub device_type: Option<String>,
    pub device_fingerprint: Option<String>,
    pub user_agent: Option<String>,

    pub qr_code_id: Option<String>,
    pub qr_merchant_id: Option<String>,
}

/// Re-verification request for a settled QR transaction
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QrVerificationRequest {
    #[validate(length(min = 1))]
    pub qr_code_id: String,
    pub user_id: Uuid,
}

/// Scoring outcome returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub fraud_status: FraudStatus,
    pub fraud_score: f64,
    pub fraud_reason: Option<String>,
    pub approved: bool,
    pub message: String,
    pub transaction_time: DateTime<Utc>,
    pub fraud_analysis: Option<FraudAnalysis>,
}

/// Score breakdown attached to a response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAnalysis {
    pub ml_score: f64,
    pub rule_based_score: f64,
    pub risk_level: RiskLevel,
    pub triggered_rules: Vec<String>,
    pub recommendation: Recommendation,
    pub behavior_analysis: BehaviorAnalysis,
}

/// Behavioral flags mirrored from the rule engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorAnalysis {
    pub unusual_amount: bool,
    pub unusual_time: bool,
    pub unusual_location: bool,
    pub unusual_device: bool,
    pub high_velocity: bool,
    pub deviation_from_normal: f64,
}

/// Per-user fraud exposure summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFraudStatistics {
    pub user_id: Uuid,
    pub trust_score: f64,
    pub total_fraud_alerts: u64,
    pub fraudulent_transactions: u64,
    pub account_locked: bool,
}

impl TransactionResponse {
    /// Declined response for a locked account; nothing was scored or stored.
    pub fn account_locked(request: &TransactionRequest) -> Self {
        Self {
            transaction_id: generate_id(),
            user_id: request.user_id,
            amount: request.amount,
            currency: request.currency.clone(),
            transaction_type: request.transaction_type,
            status: TransactionStatus::Declined,
            fraud_status: FraudStatus::Unknown,
            fraud_score: 0.0,
            fraud_reason: Some("Account is locked".to_string()),
            approved: false,
            message: "Account is locked".to_string(),
            transaction_time: now_utc(),
            fraud_analysis: None,
        }
    }
}

/// Human message for each terminal status
pub fn status_message(status: TransactionStatus) -> &'static str {
    match status {
        TransactionStatus::Pending => "Transaction is pending",
        TransactionStatus::Approved => "Transaction approved",
        TransactionStatus::Review => "Transaction flagged for manual review",
        TransactionStatus::Hold => "Transaction held pending verification",
        TransactionStatus::Declined => "Transaction declined due to fraud risk",
        TransactionStatus::Blocked => "Transaction blocked and account locked",
    }
}
