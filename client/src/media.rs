use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use snapcam_common::config::{CameraConfig, Config};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub type Frame = Arc<RgbImage>;

// ---------------------------------------------------------------------------
// Constraints & capabilities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FromStr for Resolution {
    type Err = MediaError;

    /// Parses `WxH`, e.g. `1920x1080`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MediaError::InvalidResolution(s.to_string());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Requested stream shape. Sizes are ideals; the source may deliver others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraints {
    pub resolution: Resolution,
    pub facing: String,
}

impl Constraints {
    pub fn from_config(camera: &CameraConfig) -> Self {
        Self {
            resolution: Resolution::new(camera.width, camera.height),
            facing: camera.facing.clone(),
        }
    }

    pub fn with_resolution(&self, resolution: Resolution) -> Self {
        Self {
            resolution,
            facing: self.facing.clone(),
        }
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackCapabilities {
    /// Hardware zoom range, if the camera has one.
    pub zoom: Option<(f64, f64)>,
    pub torch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSettings {
    pub zoom: f64,
    pub torch: bool,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            torch: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tracks
// ---------------------------------------------------------------------------

/// The video component of a stream. Frames are published on a watch
/// channel by the source; the track only ever sees the latest one.
pub struct VideoTrack {
    label: String,
    capabilities: TrackCapabilities,
    settings: watch::Sender<TrackSettings>,
    frames: watch::Receiver<Option<Frame>>,
    live: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl VideoTrack {
    /// A track that always shows the same frame.
    pub fn still(label: impl Into<String>, frame: RgbImage) -> Self {
        let (_, frames) = watch::channel(Some(Arc::new(frame)));
        Self {
            label: label.into(),
            capabilities: TrackCapabilities::default(),
            settings: watch::channel(TrackSettings::default()).0,
            frames,
            live: Arc::new(AtomicBool::new(true)),
            task: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: TrackCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capabilities(&self) -> TrackCapabilities {
        self.capabilities
    }

    pub fn settings(&self) -> TrackSettings {
        *self.settings.borrow()
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        if !self.is_live() {
            return None;
        }
        self.frames.borrow().clone()
    }

    pub fn apply_zoom(&self, level: f64) -> Result<(), MediaError> {
        let (min, max) = self
            .capabilities
            .zoom
            .ok_or(MediaError::Unsupported("zoom"))?;
        if !(min..=max).contains(&level) {
            return Err(MediaError::OutOfRange { value: level, min, max });
        }
        self.settings.send_modify(|s| s.zoom = level);
        Ok(())
    }

    pub fn apply_torch(&self, on: bool) -> Result<(), MediaError> {
        if !self.capabilities.torch {
            return Err(MediaError::Unsupported("torch"));
        }
        self.settings.send_modify(|s| s.torch = on);
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.live.swap(false, Ordering::SeqCst) {
            debug!(label = self.label, "video track stopped");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn live_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.live)
    }
}

impl Drop for VideoTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Microphone input, handed to the encoder as an ffmpeg input device.
#[derive(Debug)]
pub struct AudioTrack {
    format: String,
    device: String,
    live: AtomicBool,
}

impl AudioTrack {
    /// Parses `<format>:<device>`, e.g. `pulse:default` or `alsa:hw:0`.
    pub fn from_spec(spec: &str) -> Result<Self, MediaError> {
        match spec.split_once(':') {
            Some((format, device)) if !format.is_empty() && !device.is_empty() => Ok(Self {
                format: format.to_string(),
                device: device.to_string(),
                live: AtomicBool::new(true),
            }),
            _ => Err(MediaError::InvalidMicrophone(spec.to_string())),
        }
    }

    pub fn ffmpeg_input_args(&self) -> [&str; 4] {
        ["-f", &self.format, "-i", &self.device]
    }

    pub fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            debug!(format = self.format, device = self.device, "audio track stopped");
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

pub struct MediaStream {
    pub video: VideoTrack,
    pub resolution: Resolution,
}

impl MediaStream {
    pub fn new(video: VideoTrack, resolution: Resolution) -> Self {
        Self { video, resolution }
    }

    pub fn stop_all(&mut self) {
        self.video.stop();
    }
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

/// Where streams come from.
pub trait MediaDevices {
    fn get_user_media(
        &mut self,
        constraints: &Constraints,
    ) -> impl Future<Output = Result<MediaStream, MediaError>>;

    fn get_microphone(&mut self) -> impl Future<Output = Result<AudioTrack, MediaError>>;
}

/// Camera exposing single frames over HTTP, polled at the render rate.
pub struct HttpCamera {
    url: String,
    client: reqwest::Client,
    poll_interval: Duration,
    capabilities: TrackCapabilities,
}

impl HttpCamera {
    pub fn new(url: &str, fps: f64, capabilities: TrackCapabilities) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MediaError::Acquire(e.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            client,
            poll_interval: Duration::from_secs_f64(1.0 / fps.max(1.0)),
            capabilities,
        })
    }

    pub async fn acquire(&self, constraints: &Constraints) -> Result<MediaStream, MediaError> {
        let settings = TrackSettings::default();
        let request = frame_request(&self.client, &self.url, constraints, settings, self.capabilities);
        let first = fetch_frame(request).await?;
        let resolution = Resolution::new(first.width(), first.height());
        info!(url = self.url, %resolution, "camera stream acquired");

        let (frames_tx, frames_rx) = watch::channel(Some(Arc::new(first)));
        let (settings_tx, settings_rx) = watch::channel(settings);
        let live = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(poll_frames(
            self.client.clone(),
            self.url.clone(),
            constraints.clone(),
            self.capabilities,
            self.poll_interval,
            frames_tx,
            settings_rx,
            Arc::clone(&live),
        ));

        let video = VideoTrack {
            label: self.url.clone(),
            capabilities: self.capabilities,
            settings: settings_tx,
            frames: frames_rx,
            live,
            task: Some(task),
        };
        Ok(MediaStream::new(video, resolution))
    }
}

#[allow(clippy::too_many_arguments)]
async fn poll_frames(
    client: reqwest::Client,
    base: String,
    constraints: Constraints,
    capabilities: TrackCapabilities,
    interval: Duration,
    frames: watch::Sender<Option<Frame>>,
    settings: watch::Receiver<TrackSettings>,
    live: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if !live.load(Ordering::SeqCst) {
            break;
        }
        let current = *settings.borrow();
        let request = frame_request(&client, &base, &constraints, current, capabilities);
        match fetch_frame(request).await {
            Ok(frame) => {
                if frames.send(Some(Arc::new(frame))).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch camera frame");
            }
        }
    }
    debug!(url = base, "camera poll loop ended");
}

/// Frame GET for the current constraints. Hardware settings are only sent
/// when the camera reports the capability.
fn frame_request(
    client: &reqwest::Client,
    base: &str,
    constraints: &Constraints,
    settings: TrackSettings,
    capabilities: TrackCapabilities,
) -> reqwest::RequestBuilder {
    let mut query = vec![
        ("width", constraints.resolution.width.to_string()),
        ("height", constraints.resolution.height.to_string()),
        ("facing", constraints.facing.clone()),
    ];
    if capabilities.zoom.is_some() {
        query.push(("zoom", format!("{:.1}", settings.zoom)));
    }
    if capabilities.torch {
        query.push(("torch", if settings.torch { "1" } else { "0" }.to_string()));
    }
    client.get(base).query(&query)
}

async fn fetch_frame(request: reqwest::RequestBuilder) -> Result<RgbImage, MediaError> {
    let resp = request
        .send()
        .await
        .map_err(|e| MediaError::Acquire(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(MediaError::Status(resp.status().as_u16()));
    }
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| MediaError::Acquire(e.to_string()))?;
    decode_frame(&bytes)
}

fn decode_frame(bytes: &[u8]) -> Result<RgbImage, MediaError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| MediaError::Decode(e.to_string()))
}

/// A still image on disk standing in for a camera.
pub struct FileCamera {
    path: PathBuf,
}

impl FileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn acquire(&self) -> Result<MediaStream, MediaError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| MediaError::Acquire(format!("{}: {e}", self.path.display())))?;
        let frame = decode_frame(&bytes)?;
        let resolution = Resolution::new(frame.width(), frame.height());
        info!(path = %self.path.display(), %resolution, "still-image camera opened");
        let video = VideoTrack::still(self.path.display().to_string(), frame);
        Ok(MediaStream::new(video, resolution))
    }
}

pub enum Camera {
    Http(HttpCamera),
    File(FileCamera),
}

/// The devices configured for this process.
pub struct SystemDevices {
    camera: Camera,
    microphone: Option<String>,
}

impl SystemDevices {
    pub fn from_config(config: &Config) -> Result<Self, MediaError> {
        let source = config.camera.source.trim();
        let camera = if source.starts_with("http://") || source.starts_with("https://") {
            let capabilities = TrackCapabilities {
                zoom: config.camera.hardware_zoom,
                torch: config.camera.hardware_torch,
            };
            Camera::Http(HttpCamera::new(
                source,
                config.client.render_fps,
                capabilities,
            )?)
        } else {
            Camera::File(FileCamera::new(source))
        };
        Ok(Self {
            camera,
            microphone: config.recording.microphone.clone(),
        })
    }
}

impl MediaDevices for SystemDevices {
    async fn get_user_media(&mut self, constraints: &Constraints) -> Result<MediaStream, MediaError> {
        match &self.camera {
            Camera::Http(cam) => cam.acquire(constraints).await,
            Camera::File(cam) => cam.acquire().await,
        }
    }

    async fn get_microphone(&mut self) -> Result<AudioTrack, MediaError> {
        match &self.microphone {
            Some(spec) => AudioTrack::from_spec(spec),
            None => Err(MediaError::NoMicrophone),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("failed to acquire media: {0}")]
    Acquire(String),
    #[error("camera returned HTTP {0}")]
    Status(u16),
    #[error("failed to decode camera frame: {0}")]
    Decode(String),
    #[error("invalid resolution {0:?}, expected WxH")]
    InvalidResolution(String),
    #[error("track does not support {0}")]
    Unsupported(&'static str),
    #[error("value {value} outside supported range {min}..={max}")]
    OutOfRange { value: f64, min: f64, max: f64 },
    #[error("no microphone configured")]
    NoMicrophone,
    #[error("invalid microphone spec {0:?}, expected <format>:<device>")]
    InvalidMicrophone(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(w, h, Rgb([30, 60, 90]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    async fn serve(app: Router) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn parses_resolution() {
        assert_eq!("1920x1080".parse::<Resolution>().unwrap(), Resolution::new(1920, 1080));
        assert_eq!(" 640X480 ".parse::<Resolution>().unwrap(), Resolution::new(640, 480));
        assert!("1920".parse::<Resolution>().is_err());
        assert!("0x480".parse::<Resolution>().is_err());
        assert!("axb".parse::<Resolution>().is_err());
    }

    fn frame_url(
        base: &str,
        c: &Constraints,
        settings: TrackSettings,
        caps: TrackCapabilities,
    ) -> String {
        frame_request(&reqwest::Client::new(), base, c, settings, caps)
            .build()
            .unwrap()
            .url()
            .to_string()
    }

    #[test]
    fn frame_request_encodes_facing() {
        let c = Constraints {
            facing: "user & rear".into(),
            ..Constraints::default()
        };
        let url = frame_url("http://cam/frame", &c, TrackSettings::default(), TrackCapabilities::default());
        assert_eq!(
            url,
            "http://cam/frame?width=1280&height=720&facing=user+%26+rear"
        );
    }

    #[test]
    fn frame_url_carries_constraints_and_hardware_settings() {
        let c = Constraints::default();
        let plain = frame_url("http://cam/frame", &c, TrackSettings::default(), TrackCapabilities::default());
        assert_eq!(plain, "http://cam/frame?width=1280&height=720&facing=environment");

        let caps = TrackCapabilities {
            zoom: Some((1.0, 3.0)),
            torch: true,
        };
        let settings = TrackSettings {
            zoom: 1.5,
            torch: true,
        };
        let url = frame_url("http://cam/frame?quality=80", &c, settings, caps);
        assert!(url.starts_with("http://cam/frame?quality=80&width=1280"));
        assert!(url.ends_with("&zoom=1.5&torch=1"));
    }

    #[test]
    fn still_track_stops() {
        let mut track = VideoTrack::still("test", RgbImage::new(4, 4));
        assert!(track.is_live());
        assert!(track.latest_frame().is_some());
        track.stop();
        assert!(!track.is_live());
        assert!(track.latest_frame().is_none());
    }

    #[test]
    fn zoom_and_torch_need_capabilities() {
        let track = VideoTrack::still("test", RgbImage::new(4, 4));
        assert!(matches!(track.apply_zoom(1.5), Err(MediaError::Unsupported("zoom"))));
        assert!(matches!(track.apply_torch(true), Err(MediaError::Unsupported("torch"))));

        let track = track.with_capabilities(TrackCapabilities {
            zoom: Some((1.0, 2.0)),
            torch: true,
        });
        track.apply_zoom(1.5).unwrap();
        track.apply_torch(true).unwrap();
        assert_eq!(track.settings(), TrackSettings { zoom: 1.5, torch: true });
        assert!(matches!(track.apply_zoom(2.5), Err(MediaError::OutOfRange { .. })));
    }

    #[test]
    fn microphone_spec() {
        let mic = AudioTrack::from_spec("alsa:hw:0").unwrap();
        assert_eq!(mic.ffmpeg_input_args(), ["-f", "alsa", "-i", "hw:0"]);
        mic.stop();
        assert!(!mic.is_live());
        assert!(AudioTrack::from_spec("default").is_err());
        assert!(AudioTrack::from_spec(":x").is_err());
    }

    #[tokio::test]
    async fn file_camera_reads_still() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        std::fs::write(&path, png_bytes(32, 18)).unwrap();

        let stream = FileCamera::new(&path).acquire().await.unwrap();
        assert_eq!(stream.resolution, Resolution::new(32, 18));
        assert_eq!(stream.video.latest_frame().unwrap().dimensions(), (32, 18));
    }

    #[tokio::test]
    async fn file_camera_missing_file_fails() {
        let err = FileCamera::new("/nonexistent/still.jpg").acquire().await;
        assert!(matches!(err, Err(MediaError::Acquire(_))));
    }

    #[tokio::test]
    async fn http_camera_polls_frames() {
        let png = png_bytes(16, 9);
        let app = Router::new().route(
            "/frame",
            get(move || {
                let png = png.clone();
                async move { ([(header::CONTENT_TYPE, "image/png")], png).into_response() }
            }),
        );
        let addr = serve(app).await;

        let cam = HttpCamera::new(
            &format!("http://{addr}/frame"),
            30.0,
            TrackCapabilities::default(),
        )
        .unwrap();
        let mut stream = cam.acquire(&Constraints::default()).await.unwrap();
        assert_eq!(stream.resolution, Resolution::new(16, 9));
        assert!(stream.video.latest_frame().is_some());

        stream.stop_all();
        assert!(!stream.video.is_live());
    }

    #[tokio::test]
    async fn http_camera_error_status_fails_acquire() {
        let app = Router::new().route("/frame", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let addr = serve(app).await;

        let cam = HttpCamera::new(
            &format!("http://{addr}/frame"),
            30.0,
            TrackCapabilities::default(),
        )
        .unwrap();
        let err = cam.acquire(&Constraints::default()).await;
        assert!(matches!(err, Err(MediaError::Status(503))));
    }
}
