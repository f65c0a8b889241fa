use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Shared configuration for the analysis server and the capture client.
///
/// Every section is optional so an empty `config.toml` yields a usable
/// local setup (server on :3000, client posting to it).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_vision_endpoint")]
    pub vision_endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_analysis_url")]
    pub analysis_url: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_render_fps")]
    pub render_fps: f64,
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u32,
    #[serde(default)]
    pub flash: bool,
    #[serde(default = "default_true")]
    pub audio: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// `http(s)://` still-frame endpoint, or a path to a JPEG/PNG file.
    #[serde(default = "default_camera_source")]
    pub source: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_facing")]
    pub facing: String,
    /// Zoom range the camera accepts in hardware, e.g. `[1.0, 3.0]`.
    #[serde(default)]
    pub hardware_zoom: Option<(f64, f64)>,
    #[serde(default)]
    pub hardware_torch: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    /// ffmpeg audio input as `<format>:<device>`, e.g. `pulse:default`.
    #[serde(default)]
    pub microphone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            credentials_path: default_credentials_path(),
            vision_endpoint: default_vision_endpoint(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            analysis_url: default_analysis_url(),
            output_dir: default_output_dir(),
            render_fps: default_render_fps(),
            countdown_secs: default_countdown_secs(),
            flash: false,
            audio: true,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: default_camera_source(),
            width: default_width(),
            height: default_height(),
            facing: default_facing(),
            hardware_zoom: None,
            hardware_torch: false,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            microphone: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply process environment overrides. `PORT` always wins over the file.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_port(std::env::var("PORT").ok().as_deref())
    }

    fn apply_port(&mut self, port: Option<&str>) -> Result<(), ConfigError> {
        if let Some(raw) = port {
            self.server.port = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw.to_string()))?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid PORT value {0:?}")]
    InvalidPort(String),
}

// Default value functions
fn default_port() -> u16 {
    3000
}
fn default_credentials_path() -> PathBuf {
    "credentials.json".into()
}
fn default_vision_endpoint() -> String {
    "https://vision.googleapis.com".into()
}
fn default_analysis_url() -> String {
    "http://localhost:3000/analyze-image".into()
}
fn default_output_dir() -> PathBuf {
    ".".into()
}
fn default_render_fps() -> f64 {
    30.0
}
fn default_countdown_secs() -> u32 {
    3
}
fn default_true() -> bool {
    true
}
fn default_camera_source() -> String {
    "http://localhost:8080/frame".into()
}
fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_facing() -> String {
    "environment".into()
}
fn default_ffmpeg() -> String {
    "ffmpeg".into()
}
fn default_log_level() -> String {
    "info".into()
}
