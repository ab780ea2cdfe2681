//! HTTP backend for the plugbridge frontend
//!
//! Exposes login, OAuth, device listing and toggle routes on top of a shared
//! [`CloudClient`], and optionally serves the static frontend.

mod api;
mod error;

pub use error::ApiError;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use plugbridge_cloud::CloudClient;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{info, warn};

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// CORS origins; empty allows any origin
    pub allowed_origins: Vec<String>,
    /// Directory with the static frontend
    pub static_dir: Option<PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            allowed_origins: Vec::new(),
            static_dir: None,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub cloud: Arc<CloudClient>,
}

/// Build the application router
pub fn router(config: &WebConfig, cloud: Arc<CloudClient>) -> Router {
    let state = Arc::new(AppState { cloud });

    let app = Router::new()
        .route("/api/login", post(api::login))
        .route("/api/devices", get(api::get_devices))
        .route("/api/toggle", post(api::toggle))
        .route("/api/toggle-multi", post(api::toggle_multi))
        .route("/api/session", get(api::get_session))
        .route("/api/health", get(api::health_check))
        .route("/login", get(api::authorize))
        .route("/oauth/callback", get(api::oauth_callback))
        .route("/logout", post(api::logout));

    let app = match &config.static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    };

    app.layer(cors_layer(&config.allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the web server
pub async fn start_server(config: WebConfig, cloud: Arc<CloudClient>) -> anyhow::Result<()> {
    let app = router(&config, cloud);

    let addr = format!("{}:{}", config.host, config.port);
    info!("plugbridge listening on http://{}", addr);
    info!("  - API at /api/*");
    info!("  - OAuth login at /login");
    if let Some(dir) = &config.static_dir {
        info!("  - Frontend from {}", dir.display());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("plugbridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
