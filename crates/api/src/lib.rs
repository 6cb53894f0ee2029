//! Machine Failure Explainer Server
//!
//! Web form that predicts machine failure from five sensor readings and
//! explains the prediction with a SHAP waterfall chart.

use anyhow::Context;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use inference_engine::InferenceEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use waterfall_chart::WaterfallChart;

pub mod config;
pub mod error;
pub mod page;
pub mod routes;

pub use crate::config::AppConfig;
pub use crate::error::ApiError;

/// Immutable state shared across handlers
pub struct AppState {
    /// Classifier and explainer
    pub engine: InferenceEngine,
    /// Chart renderer
    pub chart: WaterfallChart,
    /// Prometheus handle when metrics are enabled
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create application state from loaded artifacts
    pub fn new(engine: InferenceEngine, chart: WaterfallChart) -> Self {
        Self {
            engine,
            chart,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    /// Load the model artifacts and chart renderer named in the config
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let engine = InferenceEngine::load(&config.models.classifier_path, &config.models.explainer_path)
            .with_context(|| {
                format!(
                    "loading model artifacts {} and {}",
                    config.models.classifier_path.display(),
                    config.models.explainer_path.display()
                )
            })?;
        let chart = WaterfallChart::new(config.chart.clone()).context("creating chart renderer")?;

        Ok(Self::new(engine, chart))
    }

    /// Attach a Prometheus handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
    pub model: ModelInfo,
}

/// Component status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub classifier: ComponentHealth,
    pub chart: ComponentHealth,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub detail: Option<String>,
}

/// Loaded model summary
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub tree_count: usize,
    pub expected_value: f64,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::predict::show_form).post(routes::predict::submit))
        .route("/api/v1/health", get(health_handler))
        .route("/metrics", get(routes::metrics::get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let chart_detail = if state.chart.has_labels() {
        "labels enabled"
    } else {
        "no font, labels disabled"
    };

    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus {
            classifier: ComponentHealth {
                status: "ok".to_string(),
                detail: None,
            },
            chart: ComponentHealth {
                status: "ok".to_string(),
                detail: Some(chart_detail.to_string()),
            },
        },
        model: ModelInfo {
            tree_count: state.engine.tree_count(),
            expected_value: state.engine.expected_value(),
        },
    };

    Json(response)
}

/// Initialize logging
pub fn init_logging(config: &crate::config::LoggingConfig) {
    let parsed = config.level.parse::<Level>();
    let level = parsed.as_ref().copied().unwrap_or(Level::INFO);

    let installed = if config.json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    };

    if installed.is_err() {
        debug!("Tracing subscriber already installed");
    }
    if parsed.is_err() {
        warn!("Unknown log level {:?}, using info", config.level);
    }
}

/// Run the server until it is stopped
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let mut state = AppState::from_config(&config)?;
    if config.metrics.enabled {
        state = state.with_metrics(routes::metrics::install_recorder()?);
    }

    let app = create_router(Arc::new(state));

    info!("Starting server on {}", config.server.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
