use std::path::PathBuf;

use snapcam_client::analysis::AnalysisClient;
use snapcam_client::dispatch::{parse_command, UiEvent};
use snapcam_client::feedback::{TerminalFeedback, HELP};
use snapcam_client::media::SystemDevices;
use snapcam_client::recorder::check_ffmpeg_available;
use snapcam_client::App;
use snapcam_common::config::Config;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

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
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        camera = config.camera.source,
        analysis_url = config.client.analysis_url,
        output_dir = %config.client.output_dir.display(),
        "snapcam client starting"
    );

    if let Err(e) = tokio::fs::create_dir_all(&config.client.output_dir).await {
        error!(error = %e, dir = %config.client.output_dir.display(), "cannot create output directory");
        std::process::exit(1);
    }

    check_ffmpeg_available(&config.recording.ffmpeg).await;

    let devices = match SystemDevices::from_config(&config) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "invalid camera configuration");
            std::process::exit(1);
        }
    };
    let analysis = match AnalysisClient::new(&config.client.analysis_url) {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "failed to build analysis client");
            std::process::exit(1);
        }
    };

    let (tx, rx) = mpsc::channel(32);

    let quit = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, shutting down");
            let _ = quit.send(UiEvent::Quit).await;
        }
    });

    // Keyboard: one command per stdin line.
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_command(&line) {
                    Some(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    None => warn!(input = line, "unknown command, type `settings` for help"),
                },
                Ok(None) => {
                    debug!("stdin closed");
                    let _ = tx.send(UiEvent::Quit).await;
                    break;
                }
                Err(e) => {
                    error!(error = %e, "failed to read stdin");
                    let _ = tx.send(UiEvent::Quit).await;
                    break;
                }
            }
        }
    });

    println!("{HELP}");
    App::new(&config, devices, TerminalFeedback::default(), analysis)
        .run(rx)
        .await;
}
