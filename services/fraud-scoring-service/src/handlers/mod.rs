//! HTTP handlers for the fraud scoring API endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use payguard_errors::PayGuardError;

use crate::models::{
    QrVerificationRequest, TransactionRequest, TransactionResponse, UserFraudStatistics,
};
use crate::services::FraudScoringService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub scoring_service: Arc<FraudScoringService>,
}

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

/// Score a payment transaction
pub async fn process_transaction(
    State(state): State<AppState>,
    Json(request): Json<TransactionRequest>,
) -> Result<Json<ApiResponse<TransactionResponse>>, PayGuardError> {
    info!("Scoring transaction request for user {}", request.user_id);

    match state.scoring_service.process_transaction(request.clone()).await {
        Ok(response) => Ok(Json(ApiResponse::success(response))),
        // A locked account is a declined decision, not an error page
        Err(PayGuardError::AccountLocked { .. }) => Ok(Json(ApiResponse::success(
            TransactionResponse::account_locked(&request),
        ))),
        Err(e) => Err(e),
    }
}

/// Score a QR payment transaction
pub async fn process_qr_transaction(
    State(state): State<AppState>,
    Json(request): Json<TransactionRequest>,
) -> Result<Json<ApiResponse<TransactionResponse>>, PayGuardError> {
    info!("Scoring QR transaction request for user {}", request.user_id);

    match state
        .scoring_service
        .process_qr_transaction(request.clone())
        .await
    {
        Ok(response) => Ok(Json(ApiResponse::success(response))),
        Err(PayGuardError::AccountLocked { .. }) => Ok(Json(ApiResponse::success(
            TransactionResponse::account_locked(&request),
        ))),
        Err(e) => Err(e),
    }
}

/// Re-verify a settled QR transaction in post-transaction mode
pub async fn verify_qr_transaction(
    State(state): State<AppState>,
    Json(request): Json<QrVerificationRequest>,
) -> Result<Json<ApiResponse<TransactionResponse>>, PayGuardError> {
    info!(
        "Re-verifying QR code {} for user {}",
        request.qr_code_id, request.user_id
    );

    let response = state.scoring_service.verify_qr_transaction(request).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Per-user fraud exposure summary
pub async fn user_fraud_statistics(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<UserFraudStatistics>>, PayGuardError> {
    info!("Fetching fraud statistics for user {}", user_id);

    let statistics = state.scoring_service.user_fraud_statistics(user_id).await?;
    Ok(Json(ApiResponse::success(statistics)))
}

/// Health check handler
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "fraud-scoring",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now(),
        "capabilities": {
            "transaction_scoring": true,
            "qr_verification": true,
            "behavioral_profiling": true,
            "rule_engine": true,
            "model_scoring": true,
            "fraud_alerts": true
        }
    }))
}
