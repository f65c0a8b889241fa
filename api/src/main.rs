use std::path::PathBuf;
use std::sync::Arc;

use snapcam_api::credentials::Credentials;
use snapcam_api::vision::VisionClient;
use snapcam_api::{router, AppState};
use snapcam_common::config::Config;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let mut config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };
    if let Err(e) = config.apply_env() {
        eprintln!("Invalid environment: {e}");
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    // Missing credentials are fatal at startup.
    let credentials = match Credentials::load(&config.server.credentials_path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "cannot start without vision credentials");
            std::process::exit(1);
        }
    };

    let credential_kind = credentials.kind();
    let vision = match VisionClient::new(&config.server.vision_endpoint, credentials) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "failed to build vision client");
            std::process::exit(1);
        }
    };

    info!(
        credentials = %config.server.credentials_path.display(),
        credential_kind,
        vision_endpoint = config.server.vision_endpoint,
        "vision client ready"
    );

    let app = router(Arc::new(AppState { vision }));

    let addr = format!("0.0.0.0:{}", config.server.port);
    info!(addr, "snapcam analysis server starting");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}
