//! PayGuard Fraud Scoring Service binary.
//!
//! Wires configuration, telemetry, the store, and the scoring pipeline into
//! an axum router. The registration/login and alert-review surfaces live in
//! their own services; this binary exposes only the scoring endpoints.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use payguard_config::AppSettings;
use payguard_logging::init_telemetry;
use payguard_scoring_service::handlers::{self, AppState};
use payguard_scoring_service::ml::NeuralScorer;
use payguard_scoring_service::services::FraudScoringService;
use payguard_scoring_service::store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = payguard_config::dotenv();
    init_telemetry("payguard_scoring_service");

    info!("Starting PayGuard Fraud Scoring Service");

    let settings = AppSettings::load()?;
    let scoring_config = settings.scoring.clone();

    let store = Arc::new(MemoryStore::new());
    let model_scorer = Arc::new(NeuralScorer::load_or_init(
        scoring_config.model_path.as_deref(),
    ));
    let scoring_service = Arc::new(FraudScoringService::new(
        store,
        model_scorer,
        scoring_config,
    ));

    let state = AppState { scoring_service };
    let app = create_router(state);

    let bind_address = settings.bind_address();
    info!("Fraud scoring service listening on {}", bind_address);

    let listener = TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(handlers::health_check))
        // Scoring endpoints
        .route(
            "/api/v1/transactions/process",
            post(handlers::process_transaction),
        )
        .route(
            "/api/v1/transactions/qr/process",
            post(handlers::process_qr_transaction),
        )
        .route(
            "/api/v1/transactions/qr/verify",
            post(handlers::verify_qr_transaction),
        )
        // Fraud exposure reporting
        .route(
            "/api/v1/users/:id/fraud-statistics",
            get(handlers::user_fraud_statistics),
        )
        // Apply middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
