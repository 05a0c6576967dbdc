// Main entry point for the classify-and-translate workflow service

use translens::{
    core::{Config, TerminalCondition},
    services::classifier::ClassifierProvider,
    services::translation::{TranslationGateway, Translator},
    session::WorkflowSession,
    utils::Metrics,
};

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    session: Arc<WorkflowSession>,
    metrics: Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().expect("Failed to load configuration"));

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "translens={}",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== CLASSIFY-AND-TRANSLATE WORKFLOW ===");
    info!(
        "Config: target_lang={} delay={}ms forbidden_words={:?}",
        config.target_lang(),
        config.translation.artificial_delay_ms,
        config.forbidden_words(),
    );

    // Initialize metrics
    let metrics = Metrics::new();

    // Translation gateway (degrades to fallbacks when unconfigured)
    let translator: Arc<dyn Translator> = Arc::new(TranslationGateway::new(config.clone())?);

    // Classifier backend
    #[cfg(feature = "onnx")]
    let provider: Arc<dyn ClassifierProvider> = Arc::new(
        translens::services::classifier::onnx::OnnxClassifierProvider::new(
            config.classifier.clone(),
        ),
    );
    #[cfg(not(feature = "onnx"))]
    let provider: Arc<dyn ClassifierProvider> =
        Arc::new(translens::services::classifier::UnavailableClassifierProvider);

    // Mount the workflow session (kicks off the classifier load)
    let session = WorkflowSession::mount(config.clone(), translator, provider, metrics.clone());
    let state = AppState { session, metrics };

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/state", get(state_endpoint))
        .route("/select", post(select_image))
        .route("/classify", post(classify))
        .route("/reset", post(reset_app))
        .route("/reset/page", post(reset_page))
        .with_state(state)
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB uploads
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /            - Root endpoint");
    info!("  GET  /health      - Health check");
    info!("  GET  /metrics     - Prometheus metrics");
    info!("  GET  /state       - Workflow state snapshot");
    info!("  POST /select      - Select an image (multipart/form-data)");
    info!("  POST /classify    - Classify and translate the selection");
    info!("  POST /reset       - App-level reset (reloads classifier)");
    info!("  POST /reset/page  - Page-level reset (keeps classifier)");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Classify-and-Translate Workflow"
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Workflow state snapshot (includes the fallback view while failed)
async fn state_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session.snapshot())
}

/// Map a terminal condition to the fallback response
fn terminal_response(state: &AppState, condition: TerminalCondition) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::CONFLICT,
        Json(serde_json::json!({
            "error": condition.to_string(),
            "state": state.session.snapshot(),
        })),
    )
}

/// Select an image for classification
///
/// # Request Format:
/// - multipart/form-data
/// - Field "image": one image file
async fn select_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        bad_request(format!("Multipart error: {}", e))
    })? {
        if field.name() == Some("image") {
            let filename = field.file_name().unwrap_or("unknown").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("Read error: {}", e)))?;
            upload = Some((filename, data.to_vec()));
        }
    }

    let Some((filename, bytes)) = upload else {
        return Err(bad_request("No image provided".to_string()));
    };

    // The extension gate runs before decoding: a vector image would not
    // decode as a raster anyway, and the rejection is the point
    if translens::session::is_vector_image(&filename) {
        return match state.session.select_input(&filename, bytes, 0, 0) {
            Ok(()) => Ok(Json(serde_json::json!({ "state": state.session.snapshot() }))),
            Err(condition) => Err(terminal_response(&state, condition)),
        };
    }

    // Decode to validate the upload and learn its dimensions
    let img = image::load_from_memory(&bytes)
        .map_err(|e| bad_request(format!("Invalid image: {}", e)))?;
    let (width, height) = (img.width(), img.height());

    match state.session.select_input(&filename, bytes, width, height) {
        Ok(()) => Ok(Json(serde_json::json!({ "state": state.session.snapshot() }))),
        Err(condition) => Err(terminal_response(&state, condition)),
    }
}

/// Run the classify-and-translate pipeline on the current selection
async fn classify(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state.session.classify_and_translate().await {
        Ok(()) => Ok(Json(serde_json::json!({ "state": state.session.snapshot() }))),
        Err(condition) => Err(terminal_response(&state, condition)),
    }
}

/// App-level reset: discards everything and reloads the classifier
async fn reset_app(State(state): State<AppState>) -> impl IntoResponse {
    state.session.reset_app();
    Json(serde_json::json!({ "state": state.session.snapshot() }))
}

/// Page-level reset: recovers the input subtree, classifier retained
async fn reset_page(State(state): State<AppState>) -> impl IntoResponse {
    state.session.reset_page();
    Json(serde_json::json!({ "state": state.session.snapshot() }))
}

fn bad_request(message: String) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
}
