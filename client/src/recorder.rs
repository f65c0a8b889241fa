use bytes::{Bytes, BytesMut};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::media::AudioTrack;

/// Canvas capture rate while recording.
pub const RECORD_FPS: u32 = 30;

const CHUNK_CAPACITY: usize = 64 * 1024;

/// Video/audio codecs the local ffmpeg can produce for WebM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebmCodecs {
    pub video: &'static str,
    pub audio: &'static str,
}

impl WebmCodecs {
    /// Pick codecs from `ffmpeg -encoders` output: VP9/Opus when present,
    /// otherwise whatever WebM encoders exist.
    pub fn select(encoders: &str) -> Option<Self> {
        let has = |name: &str| encoders.split_whitespace().any(|tok| tok == name);
        let video = if has("libvpx-vp9") {
            "libvpx-vp9"
        } else if has("libvpx") {
            "libvpx"
        } else {
            return None;
        };
        let audio = if has("libopus") {
            "libopus"
        } else if has("libvorbis") {
            "libvorbis"
        } else {
            "opus"
        };
        Some(Self { video, audio })
    }

    pub fn mime_type(&self, with_audio: bool) -> String {
        let video = if self.video == "libvpx-vp9" { "vp9" } else { "vp8" };
        if with_audio {
            let audio = if self.audio == "libvorbis" { "vorbis" } else { "opus" };
            format!("video/webm;codecs={video},{audio}")
        } else {
            format!("video/webm;codecs={video}")
        }
    }
}

/// Streams canvas frames into an ffmpeg WebM encoder and collects the
/// encoded output as it arrives.
pub struct Recorder {
    child: Child,
    stdin: ChildStdin,
    reader: JoinHandle<std::io::Result<Vec<Bytes>>>,
    size: (u32, u32),
    frame_count: u32,
    audio: Option<AudioTrack>,
    mime_type: String,
}

pub struct FinishedRecording {
    pub chunks: Vec<Bytes>,
    pub frame_count: u32,
    pub mime_type: String,
}

impl FinishedRecording {
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("recording unavailable: {0}")]
    Unavailable(String),
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(String),
    #[error("failed to write frame to ffmpeg stdin: {0}")]
    Write(String),
    #[error("failed to wait for ffmpeg: {0}")]
    Wait(String),
    #[error("ffmpeg exited with non-zero status: {0}")]
    FfmpegFailed(String),
    #[error("failed to read ffmpeg output: {0}")]
    ReadOutput(String),
}

/// Ask ffmpeg which WebM codecs it can encode with.
pub async fn detect_codecs(ffmpeg: &str) -> Result<WebmCodecs, RecorderError> {
    let out = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .output()
        .await
        .map_err(|e| RecorderError::Unavailable(format!("{ffmpeg}: {e}")))?;
    if !out.status.success() {
        return Err(RecorderError::Unavailable(format!(
            "{ffmpeg} -encoders exited with {}",
            out.status
        )));
    }
    WebmCodecs::select(&String::from_utf8_lossy(&out.stdout))
        .ok_or_else(|| RecorderError::Unavailable("ffmpeg has no WebM video encoder".into()))
}

impl Recorder {
    /// Spawn an ffmpeg subprocess that reads raw RGB frames on stdin and
    /// writes WebM to stdout. The microphone, if given, is muxed in and
    /// released when the recording finishes or fails to start.
    pub async fn start(
        ffmpeg: &str,
        size: (u32, u32),
        audio: Option<AudioTrack>,
    ) -> Result<Self, RecorderError> {
        let codecs = match detect_codecs(ffmpeg).await {
            Ok(c) => c,
            Err(e) => {
                release(&audio);
                return Err(e);
            }
        };
        let (w, h) = size;
        if w == 0 || h == 0 {
            release(&audio);
            return Err(RecorderError::Unavailable("canvas has no frame yet".into()));
        }

        let dims = format!("{w}x{h}");
        let fps = RECORD_FPS.to_string();

        let mut cmd = Command::new(ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostats"]);
        cmd.args([
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
            "-s", &dims,
            "-r", &fps,
            "-i", "pipe:0",
        ]);
        if let Some(track) = &audio {
            cmd.args(track.ffmpeg_input_args());
            cmd.args(["-c:a", codecs.audio, "-shortest"]);
        }
        cmd.args([
            "-c:v", codecs.video,
            "-deadline", "realtime",
            "-b:v", "2M",
            "-pix_fmt", "yuv420p",
            "-f", "webm",
            "pipe:1",
        ])
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                release(&audio);
                return Err(RecorderError::Spawn(e.to_string()));
            }
        };

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(i), Some(o)) => (i, o),
            _ => {
                release(&audio);
                return Err(RecorderError::Spawn("could not get stdio handles".into()));
            }
        };

        let reader = tokio::spawn(async move {
            let mut stdout = stdout;
            let mut chunks = Vec::new();
            loop {
                let mut buf = BytesMut::with_capacity(CHUNK_CAPACITY);
                let n = stdout.read_buf(&mut buf).await?;
                if n == 0 {
                    break;
                }
                chunks.push(buf.freeze());
            }
            Ok(chunks)
        });

        let mime_type = codecs.mime_type(audio.is_some());
        info!(size = dims, mime_type, audio = audio.is_some(), "recording started");

        Ok(Self {
            child,
            stdin,
            reader,
            size,
            frame_count: 0,
            audio,
            mime_type,
        })
    }

    /// Write one canvas frame. Frames of another size (after a resolution
    /// change) are scaled to the recording size.
    pub async fn push_frame(&mut self, frame: &RgbImage) -> Result<(), RecorderError> {
        let (w, h) = self.size;
        let write = if frame.dimensions() == self.size {
            self.stdin.write_all(frame.as_raw()).await
        } else {
            let scaled = imageops::resize(frame, w, h, FilterType::Triangle);
            self.stdin.write_all(scaled.as_raw()).await
        };
        write.map_err(|e| RecorderError::Write(e.to_string()))?;
        self.frame_count += 1;
        Ok(())
    }

    /// Close the input, wait for ffmpeg, and hand back the collected chunks.
    pub async fn finish(self) -> Result<FinishedRecording, RecorderError> {
        let Recorder {
            child,
            stdin,
            reader,
            frame_count,
            audio,
            mime_type,
            ..
        } = self;

        // Closing stdin ends the video input.
        drop(stdin);

        let output = child.wait_with_output().await;
        release(&audio);
        let output = output.map_err(|e| RecorderError::Wait(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(stderr = %stderr, "ffmpeg exited with error");
            return Err(RecorderError::FfmpegFailed(stderr.into_owned()));
        }

        let chunks = reader
            .await
            .map_err(|e| RecorderError::ReadOutput(e.to_string()))?
            .map_err(|e| RecorderError::ReadOutput(e.to_string()))?;

        let recording = FinishedRecording {
            chunks,
            frame_count,
            mime_type,
        };
        info!(
            frame_count,
            chunks = recording.chunks.len(),
            bytes = recording.len(),
            "recording finished"
        );
        Ok(recording)
    }
}

fn release(audio: &Option<AudioTrack>) {
    if let Some(track) = audio {
        track.stop();
    }
}

/// Check whether ffmpeg is usable for recording. Logs a warning if not.
pub async fn check_ffmpeg_available(ffmpeg: &str) {
    match detect_codecs(ffmpeg).await {
        Ok(codecs) => {
            debug!(video = codecs.video, audio = codecs.audio, "ffmpeg is available");
        }
        Err(e) => {
            warn!(
                error = %e,
                "recording will be unavailable. Install ffmpeg with libvpx support."
            );
        }
    }
}
