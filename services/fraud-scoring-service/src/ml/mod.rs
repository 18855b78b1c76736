//! Statistical model scoring.
//!
//! The scorer is a pluggable component behind the `ModelScorer` trait: any
//! deterministic function of the 20-dimensional feature vector satisfies the
//! contract. The default implementation is a small feed-forward classifier
//! (two ReLU hidden layers, softmax output) whose weights can be persisted to
//! and reloaded from disk. Internal failures never surface as errors; the
//! scorer degrades to the neutral 0.5.

use std::path::Path;

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use payguard_errors::{PayGuardError, Result};

use crate::models::{Transaction, TransactionType, UserBehavior};

/// Dimensionality of the model input
pub const FEATURE_COUNT: usize = 20;

const HIDDEN_1: usize = 64;
const HIDDEN_2: usize = 32;
const OUTPUTS: usize = 2;

/// Seed for freshly initialized weights so a missing model file still yields
/// reproducible scores.
const INIT_SEED: u64 = 0x70617967_75617264;

/// Fixed-width feature vector derived from an enriched transaction and the
/// user's behavioral profile.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    /// Derive the 20 model features. The transaction is expected to carry its
    /// enrichment fields (velocity counts, time since last, velocity score).
    pub fn extract(transaction: &Transaction, behavior: Option<&UserBehavior>) -> Self {
        let t = transaction;
        let hour = t.transaction_time.hour() as f64;
        let day_of_week = t.transaction_time.weekday().num_days_from_monday() as f64;

        let amount_vs_avg = match behavior {
            Some(b) if b.has_amount_history() && b.avg_transaction_amount > 0.0 => {
                t.amount / b.avg_transaction_amount
            }
            _ => 1.0,
        };

        let unusual_time = (2..6).contains(&t.transaction_time.hour());
        let unusual_location = match (&t.country, behavior) {
            (Some(country), Some(b)) => !b.frequent_countries.contains(country),
            _ => false,
        };
        let unusual_device = match (&t.device_id, behavior) {
            (Some(device), Some(b)) => !b.known_devices.contains(device),
            _ => false,
        };

        let values = vec![
            (t.amount.ln_1p() / 100_000f64.ln()).min(1.0),
            amount_vs_avg,
            hour / 24.0,
            day_of_week / 7.0,
            flag(unusual_time),
            (t.transactions_in_last_hour as f64 / 10.0).min(1.0),
            (t.transactions_in_last_day as f64 / 50.0).min(1.0),
            t.velocity_score,
            flag(unusual_location),
            t.latitude.map(|lat| (lat + 180.0) / 360.0).unwrap_or(0.0),
            t.longitude.map(|lon| (lon + 180.0) / 360.0).unwrap_or(0.0),
            flag(unusual_device),
            flag(t.device_type.as_deref() == Some("MOBILE")),
            flag(t.transaction_type == TransactionType::QrCode),
            flag(t.transaction_type == TransactionType::Upi),
            behavior.map(|b| b.consistency_score).unwrap_or(0.5),
            behavior
                .map(|b| (b.failed_attempts as f64 / 10.0).min(1.0))
                .unwrap_or(0.0),
            behavior
                .map(|b| (b.chargebacks as f64 / 5.0).min(1.0))
                .unwrap_or(0.0),
            t.time_since_last_transaction
                .map(|seconds| (seconds as f64 / 86_400.0).min(1.0))
                .unwrap_or(1.0),
            flag(t.merchant_category.is_some()),
        ];

        Self { values }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.clone()
    }
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

/// Pluggable fraud probability model.
///
/// `score` returns the fraud probability in [0, 1] and must be deterministic
/// for a given (feature vector, model state). `fit` is optional; the default
/// implementation is a no-op that keeps the scoring contract intact.
#[async_trait]
pub trait ModelScorer: Send + Sync {
    async fn score(&self, features: &FeatureVector) -> Result<f64>;

    async fn fit(&self, features: &[FeatureVector], labels: &[bool]) -> Result<()> {
        let _ = (features, labels);
        Ok(())
    }
}

/// Deterministic test double returning a constant probability
#[derive(Debug, Clone, Copy)]
pub struct FixedScorer {
    pub value: f64,
}

impl FixedScorer {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

#[async_trait]
impl ModelScorer for FixedScorer {
    async fn score(&self, _features: &FeatureVector) -> Result<f64> {
        Ok(self.value)
    }
}

/// Serialized form of the network weights (row-major matrices)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NetworkWeights {
    w1: Vec<f64>,
    b1: Vec<f64>,
    w2: Vec<f64>,
    b2: Vec<f64>,
    w3: Vec<f64>,
    b3: Vec<f64>,
}

/// Default model: dense 20 -> 64 -> 32 -> 2 with ReLU hidden activations and
/// a softmax output; the fraud component is returned.
pub struct NeuralScorer {
    w1: DMatrix<f64>,
    b1: DVector<f64>,
    w2: DMatrix<f64>,
    b2: DVector<f64>,
    w3: DMatrix<f64>,
    b3: DVector<f64>,
}

impl NeuralScorer {
    /// Load weights from `model_path` when present; otherwise initialize a
    /// fresh network. A corrupt or unreadable file logs and falls back the
    /// same way — scoring must never be blocked on model state.
    pub fn load_or_init(model_path: Option<&str>) -> Self {
        if let Some(path) = model_path {
            match Self::load(path) {
                Ok(scorer) => {
                    info!("Loaded model weights from {}", path);
                    return scorer;
                }
                Err(e) => {
                    warn!("Could not load model from {}: {}; using fresh weights", path, e);
                }
            }
        }
        Self::fresh()
    }

    /// Freshly initialized network with seeded uniform weights
    pub fn fresh() -> Self {
        let mut rng = StdRng::seed_from_u64(INIT_SEED);
        Self {
            w1: init_matrix(&mut rng, HIDDEN_1, FEATURE_COUNT),
            b1: DVector::zeros(HIDDEN_1),
            w2: init_matrix(&mut rng, HIDDEN_2, HIDDEN_1),
            b2: DVector::zeros(HIDDEN_2),
            w3: init_matrix(&mut rng, OUTPUTS, HIDDEN_2),
            b3: DVector::zeros(OUTPUTS),
        }
    }

    /// Read weights from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| PayGuardError::Persistence {
            operation: "model_load".to_string(),
            message: e.to_string(),
            code: "MODEL_LOAD_FAILED".to_string(),
        })?;
        let weights: NetworkWeights =
            serde_json::from_str(&raw).map_err(|e| PayGuardError::Serialization {
                message: e.to_string(),
                field: Some("model_weights".to_string()),
                code: "MODEL_DECODE_FAILED".to_string(),
            })?;
        Self::from_weights(weights)
    }

    /// Persist the current weights as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let weights = NetworkWeights {
            w1: self.w1.transpose().as_slice().to_vec(),
            b1: self.b1.as_slice().to_vec(),
            w2: self.w2.transpose().as_slice().to_vec(),
            b2: self.b2.as_slice().to_vec(),
            w3: self.w3.transpose().as_slice().to_vec(),
            b3: self.b3.as_slice().to_vec(),
        };
        let encoded =
            serde_json::to_string(&weights).map_err(|e| PayGuardError::Serialization {
                message: e.to_string(),
                field: Some("model_weights".to_string()),
                code: "MODEL_ENCODE_FAILED".to_string(),
            })?;
        std::fs::write(path.as_ref(), encoded).map_err(|e| PayGuardError::Persistence {
            operation: "model_save".to_string(),
            message: e.to_string(),
            code: "MODEL_SAVE_FAILED".to_string(),
        })
    }

    fn from_weights(weights: NetworkWeights) -> Result<Self> {
        let expect = |name: &str, got: usize, want: usize| -> Result<()> {
            if got == want {
                Ok(())
            } else {
                Err(PayGuardError::Serialization {
                    message: format!("{} has {} values, expected {}", name, got, want),
                    field: Some(name.to_string()),
                    code: "MODEL_SHAPE_MISMATCH".to_string(),
                })
            }
        };
        expect("w1", weights.w1.len(), HIDDEN_1 * FEATURE_COUNT)?;
        expect("b1", weights.b1.len(), HIDDEN_1)?;
        expect("w2", weights.w2.len(), HIDDEN_2 * HIDDEN_1)?;
        expect("b2", weights.b2.len(), HIDDEN_2)?;
        expect("w3", weights.w3.len(), OUTPUTS * HIDDEN_2)?;
        expect("b3", weights.b3.len(), OUTPUTS)?;

        Ok(Self {
            w1: DMatrix::from_row_slice(HIDDEN_1, FEATURE_COUNT, &weights.w1),
            b1: DVector::from_row_slice(&weights.b1),
            w2: DMatrix::from_row_slice(HIDDEN_2, HIDDEN_1, &weights.w2),
            b2: DVector::from_row_slice(&weights.b2),
            w3: DMatrix::from_row_slice(OUTPUTS, HIDDEN_2, &weights.w3),
            b3: DVector::from_row_slice(&weights.b3),
        })
    }

    fn forward(&self, input: DVector<f64>) -> f64 {
        let h1 = (&self.w1 * input + &self.b1).map(relu);
        let h2 = (&self.w2 * h1 + &self.b2).map(relu);
        let logits = &self.w3 * h2 + &self.b3;
        softmax_fraud_component(logits[0], logits[1])
    }
}

#[async_trait]
impl ModelScorer for NeuralScorer {
    async fn score(&self, features: &FeatureVector) -> Result<f64> {
        let slice = features.as_slice();
        if slice.len() != FEATURE_COUNT {
            warn!(
                "Feature vector has {} dimensions, expected {}; returning neutral score",
                slice.len(),
                FEATURE_COUNT
            );
            return Ok(0.5);
        }

        let probability = self.forward(DVector::from_row_slice(slice));
        if probability.is_finite() {
            Ok(probability.clamp(0.0, 1.0))
        } else {
            warn!("Model produced a non-finite probability; returning neutral score");
            Ok(0.5)
        }
    }
}

fn relu(value: f64) -> f64 {
    value.max(0.0)
}

/// Numerically stable two-class softmax, returning the fraud class
fn softmax_fraud_component(not_fraud: f64, fraud: f64) -> f64 {
    let max = not_fraud.max(fraud);
    let e0 = (not_fraud - max).exp();
    let e1 = (fraud - max).exp();
    e1 / (e0 + e1)
}

fn init_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> DMatrix<f64> {
    // Xavier-style uniform bound
    let bound = (6.0 / (rows + cols) as f64).sqrt();
    DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-bound..bound))
}
