use std::future::pending;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, Utc};
use snapcam_common::analysis::AnalysisResult;
use snapcam_common::config::Config;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::analysis::{self, AnalysisClient, Reveal};
use crate::canvas::{Canvas, ANALYSIS_QUALITY, SNAPSHOT_QUALITY};
use crate::countdown::CountdownAction;
use crate::dispatch::{dispatch, Command, UiEvent};
use crate::feedback::{Feedback, Tone};
use crate::media::{Constraints, MediaDevices, MediaStream};
use crate::pipeline;
use crate::recorder::{Recorder, RECORD_FPS};
use crate::session::{SessionState, ZOOM_MIN};

pub const CAMERA_ALERT: &str = "Could not access camera. Check permissions.";
pub const RECORDING_ALERT: &str = "Recording unavailable";

const FLASH: Duration = Duration::from_millis(120);
const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);

enum Flow {
    Continue,
    Exit,
}

/// The capture client's event loop. Owns the session state, the live
/// stream, the canvas and any running recording.
pub struct App<D, F> {
    devices: D,
    feedback: F,
    state: SessionState,
    stream: Option<MediaStream>,
    canvas: Canvas,
    recorder: Option<Recorder>,
    analysis: AnalysisClient,
    output_dir: PathBuf,
    ffmpeg: String,
    render_period: Duration,
    results_tx: mpsc::Sender<AnalysisResult>,
    results_rx: mpsc::Receiver<AnalysisResult>,
    reveal: Option<Reveal>,
}

impl<D: MediaDevices, F: Feedback> App<D, F> {
    pub fn new(config: &Config, devices: D, feedback: F, analysis: AnalysisClient) -> Self {
        let (results_tx, results_rx) = mpsc::channel(8);
        let fps = if config.client.render_fps > 0.0 {
            config.client.render_fps
        } else {
            30.0
        };
        Self {
            devices,
            feedback,
            state: SessionState::new(
                Constraints::from_config(&config.camera),
                config.client.countdown_secs,
                config.client.flash,
                config.client.audio,
            ),
            stream: None,
            canvas: Canvas::new(),
            recorder: None,
            analysis,
            output_dir: config.client.output_dir.clone(),
            ffmpeg: config.recording.ffmpeg.clone(),
            render_period: Duration::from_secs_f64(1.0 / fps),
            results_tx,
            results_rx,
            reveal: None,
        }
    }

    /// Run until `Quit` arrives or the event channel closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<UiEvent>) {
        self.start_camera().await;
        self.feedback.controls(self.state.controls());

        let mut render = time::interval(self.render_period);
        render.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut record = time::interval(Duration::from_secs(1) / RECORD_FPS);
        record.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut countdown: Option<Interval> = None;

        loop {
            let flow = tokio::select! {
                _ = render.tick() => {
                    self.render();
                    Flow::Continue
                }
                _ = next_tick(&mut countdown) => self.handle(UiEvent::CountdownTick).await,
                _ = record.tick(), if self.recorder.is_some() => {
                    self.record_frame().await;
                    Flow::Continue
                }
                Some(result) = self.results_rx.recv() => {
                    self.show_results(&result);
                    Flow::Continue
                }
                _ = until(self.reveal.as_ref().and_then(Reveal::next_at)) => {
                    self.advance_reveal();
                    Flow::Continue
                }
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => Flow::Exit,
                },
            };
            if let Flow::Exit = flow {
                break;
            }

            // The 1 s timer exists exactly while a countdown is running.
            match (self.state.countdown.is_counting(), countdown.is_some()) {
                (true, false) => {
                    countdown = Some(time::interval_at(
                        Instant::now() + COUNTDOWN_PERIOD,
                        COUNTDOWN_PERIOD,
                    ))
                }
                (false, true) => countdown = None,
                _ => {}
            }
        }

        self.shutdown().await;
    }

    async fn handle(&mut self, event: UiEvent) -> Flow {
        debug!(?event, "ui event");
        for command in dispatch(&mut self.state, event) {
            if let Flow::Exit = self.execute(command).await {
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    async fn execute(&mut self, command: Command) -> Flow {
        match command {
            Command::Tone(tone) => self.feedback.tone(tone),
            Command::ShowCountdown(remaining) => self.feedback.countdown(remaining),
            Command::UpdateControls(controls) => self.feedback.controls(controls),
            Command::ShowSettings(visible) => self.feedback.settings_panel(visible),
            Command::Perform(CountdownAction::Snapshot) => self.take_snapshot().await,
            Command::Perform(CountdownAction::StartRecording) => self.start_recording().await,
            Command::StopRecording => self.stop_recording().await,
            Command::HardwareZoom(level) => self.apply_hardware_zoom(level),
            Command::SetTorch(on) => self.set_torch(on),
            Command::PulseTorch => self.pulse_torch().await,
            Command::Reacquire(resolution) => {
                info!(%resolution, "changing resolution");
                self.start_camera().await;
            }
            Command::Shutdown => return Flow::Exit,
        }
        Flow::Continue
    }

    /// Stop whatever stream is live, then acquire one for the current
    /// constraints. Failure leaves the session without a stream.
    async fn start_camera(&mut self) {
        if let Some(mut old) = self.stream.take() {
            old.stop_all();
        }
        match self.devices.get_user_media(&self.state.constraints).await {
            Ok(stream) => {
                let capabilities = stream.video.capabilities();
                self.state.set_capabilities(capabilities);
                if self.state.zoom.hardware && stream.video.apply_zoom(self.state.zoom.level).is_err() {
                    self.state.zoom.level = ZOOM_MIN;
                }
                info!(
                    label = stream.video.label(),
                    resolution = %stream.resolution,
                    hardware_zoom = capabilities.zoom.is_some(),
                    torch = capabilities.torch,
                    "camera started"
                );
                self.stream = Some(stream);
            }
            Err(e) => {
                error!(error = %e, "camera acquisition failed");
                self.feedback.alert(CAMERA_ALERT);
            }
        }
    }

    fn render(&mut self) {
        let Some(frame) = self.stream.as_ref().and_then(|s| s.video.latest_frame()) else {
            return;
        };
        let stamp = Local::now().format("%H:%M:%S").to_string();
        self.canvas.draw(
            &frame,
            self.state.filter,
            self.state.zoom.software_scale(),
            &stamp,
        );
    }

    fn cue(&mut self, tone: Tone) {
        if self.state.toggles.audio {
            self.feedback.tone(tone);
        }
    }

    async fn take_snapshot(&mut self) {
        self.render();
        if self.state.toggles.flash {
            self.feedback.flash(FLASH);
            time::sleep(FLASH).await;
        }
        match self.canvas.to_jpeg(SNAPSHOT_QUALITY) {
            Ok(jpeg) => {
                if let Err(e) = pipeline::save_snapshot(&self.output_dir, &jpeg, Utc::now()).await {
                    error!(error = %e, "failed to save snapshot");
                }
            }
            Err(e) => warn!(error = %e, "no frame to snapshot"),
        }
        self.cue(Tone::SNAPSHOT);
        self.analyze();
    }

    /// Analysis runs in the background; its result comes back through
    /// `results_rx` on the loop.
    fn analyze(&self) {
        let image = self.canvas.to_data_url(ANALYSIS_QUALITY);
        let client = self.analysis.clone();
        let tx = self.results_tx.clone();
        tokio::spawn(async move {
            let result = match image {
                Ok(image) => client.analyze(&image).await,
                Err(e) => {
                    warn!(error = %e, "could not encode frame for analysis, showing placeholder");
                    AnalysisResult::placeholder()
                }
            };
            if tx.send(result).await.is_err() {
                debug!("analysis result dropped, client is shutting down");
            }
        });
    }

    /// Replace whatever is on the result panel and start revealing `result`.
    fn show_results(&mut self, result: &AnalysisResult) {
        self.feedback.clear_results();
        self.reveal = Some(Reveal::new(analysis::render(result), Instant::now()));
        self.advance_reveal();
    }

    fn advance_reveal(&mut self) {
        let Some(reveal) = self.reveal.as_mut() else {
            return;
        };
        for step in reveal.due(Instant::now()) {
            self.feedback.reveal(&step);
        }
        if reveal.is_done() {
            self.reveal = None;
        }
    }

    async fn start_recording(&mut self) {
        if self.recorder.is_some() {
            return;
        }
        let audio = if self.state.toggles.audio {
            match self.devices.get_microphone().await {
                Ok(track) => Some(track),
                Err(e) => {
                    info!(error = %e, "recording without audio");
                    None
                }
            }
        } else {
            None
        };

        self.render();
        match Recorder::start(&self.ffmpeg, self.canvas.dimensions(), audio).await {
            Ok(recorder) => {
                self.recorder = Some(recorder);
                self.state.recording = true;
                self.cue(Tone::RECORD_START);
                self.feedback.controls(self.state.controls());
            }
            Err(e) => {
                error!(error = %e, "could not start recording");
                self.feedback.alert(RECORDING_ALERT);
            }
        }
    }

    async fn record_frame(&mut self) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        if self.canvas.is_empty() {
            return;
        }
        if let Err(e) = recorder.push_frame(self.canvas.image()).await {
            error!(error = %e, "encoder stopped accepting frames");
            self.stop_recording().await;
        }
    }

    async fn stop_recording(&mut self) {
        let Some(recorder) = self.recorder.take() else {
            return;
        };
        self.state.recording = false;
        match recorder.finish().await {
            Ok(recording) if recording.is_empty() => {
                warn!(frames = recording.frame_count, "recording produced no data");
            }
            Ok(recording) => {
                match pipeline::save_recording(&self.output_dir, &recording.chunks, Utc::now()).await {
                    Ok(path) => info!(
                        path = %path.display(),
                        mime_type = %recording.mime_type,
                        frames = recording.frame_count,
                        "recording finished"
                    ),
                    Err(e) => error!(error = %e, "failed to save recording"),
                }
            }
            Err(e) => error!(error = %e, "recording failed"),
        }
        self.feedback.controls(self.state.controls());
    }

    fn apply_hardware_zoom(&mut self, level: f64) {
        let Some(stream) = &self.stream else {
            return;
        };
        match stream.video.apply_zoom(level) {
            Ok(()) => self.state.zoom.level = level,
            Err(e) => warn!(error = %e, level, "zoom rejected"),
        }
    }

    fn set_torch(&mut self, on: bool) {
        let Some(stream) = &self.stream else {
            return;
        };
        match stream.video.apply_torch(on) {
            Ok(()) => self.state.torch_on = on,
            Err(e) => debug!(error = %e, "torch unavailable"),
        }
    }

    async fn pulse_torch(&mut self) {
        let previous = self.state.torch_on;
        self.set_torch(true);
        time::sleep(FLASH).await;
        self.set_torch(previous);
    }

    async fn shutdown(&mut self) {
        self.state.countdown.cancel();
        self.stop_recording().await;
        if let Some(mut stream) = self.stream.take() {
            stream.stop_all();
        }
        info!("capture client stopped");
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending().await,
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => pending().await,
    }
}
