use std::io::Write;
use std::time::Duration;

use tracing::{debug, warn};

use crate::analysis::RevealStep;

/// A short sine cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub freq_hz: u32,
    pub duration_ms: u32,
}

impl Tone {
    pub const fn new(freq_hz: u32, duration_ms: u32) -> Self {
        Self {
            freq_hz,
            duration_ms,
        }
    }

    pub const COUNTDOWN_TICK: Tone = Tone::new(880, 120);
    pub const COUNTDOWN_FIRE: Tone = Tone::new(880, 260);
    pub const SNAPSHOT: Tone = Tone::new(660, 240);
    pub const RECORD_START: Tone = Tone::new(520, 200);
    pub const ZOOM_IN: Tone = Tone::new(523, 160);
    pub const ZOOM_OUT: Tone = Tone::new(392, 160);
    pub const FILTER: Tone = Tone::new(440, 160);
    pub const RESOLUTION: Tone = Tone::new(494, 200);
    pub const SETTINGS: Tone = Tone::new(330, 120);
}

/// Which controls are usable / visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub snapshot_enabled: bool,
    pub record_enabled: bool,
    pub settings_enabled: bool,
    pub record_visible: bool,
    pub stop_visible: bool,
}

/// Everything the capture client shows or plays to the user.
pub trait Feedback {
    fn tone(&mut self, tone: Tone);
    fn alert(&mut self, message: &str);
    fn flash(&mut self, duration: Duration);
    /// `None` hides the countdown overlay.
    fn countdown(&mut self, remaining: Option<u32>);
    fn controls(&mut self, controls: Controls);
    fn settings_panel(&mut self, visible: bool);
    /// A new analysis result is about to be revealed.
    fn clear_results(&mut self);
    fn reveal(&mut self, step: &RevealStep);
}

/// Feedback on the controlling terminal: text on stdout, bell for tones.
#[derive(Debug, Default)]
pub struct TerminalFeedback {
    last_controls: Option<Controls>,
}

impl TerminalFeedback {
    fn line(&self, text: &str) {
        emit(std::io::stdout().lock(), format!("{text}\n").as_bytes());
    }
}

/// Write and flush, logging a failure. Returns whether the bytes went out.
fn emit<W: Write>(mut out: W, bytes: &[u8]) -> bool {
    match out.write_all(bytes).and_then(|_| out.flush()) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "failed to write to terminal");
            false
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// One status line summarising which controls are usable.
fn controls_line(c: Controls) -> String {
    let record = match (c.record_visible, c.stop_visible) {
        (_, true) => "[recording] press `s` to stop".to_string(),
        (true, false) => format!("record {}", on_off(c.record_enabled)),
        (false, false) => "record hidden".to_string(),
    };
    format!(
        "snapshot {} | {record} | settings {}",
        on_off(c.snapshot_enabled),
        on_off(c.settings_enabled)
    )
}

impl Feedback for TerminalFeedback {
    fn tone(&mut self, tone: Tone) {
        debug!(freq_hz = tone.freq_hz, duration_ms = tone.duration_ms, "tone");
        emit(std::io::stderr().lock(), b"\x07");
    }

    fn alert(&mut self, message: &str) {
        self.line(&format!("!! {message}"));
    }

    fn flash(&mut self, duration: Duration) {
        debug!(duration_ms = duration.as_millis() as u64, "flash");
        self.line("* flash *");
    }

    fn countdown(&mut self, remaining: Option<u32>) {
        if let Some(n) = remaining {
            self.line(&format!("  {n}..."));
        }
    }

    fn controls(&mut self, controls: Controls) {
        if self.last_controls == Some(controls) {
            return;
        }
        self.last_controls = Some(controls);
        self.line(&controls_line(controls));
    }

    fn settings_panel(&mut self, visible: bool) {
        if visible {
            self.line(HELP);
        }
    }

    fn clear_results(&mut self) {
        self.line("Results:");
    }

    fn reveal(&mut self, step: &RevealStep) {
        match step {
            RevealStep::Object(text) => self.line(&format!("  object: {text}")),
            RevealStep::Label(text) => self.line(&format!("  label:  {text}")),
            RevealStep::Scroll => debug!("result panel in view"),
        }
    }
}

pub const HELP: &str = "\
commands:
  <enter> | space   snapshot (3s countdown; again to cancel)
  r                 record (3s countdown; again to cancel)
  s                 stop recording
  c                 cancel countdown
  + / -             zoom in / out
  f <name>          filter: none grayscale sepia invert blur
  res <W>x<H>       change resolution
  t                 toggle torch
  flash             toggle flash
  audio             toggle sounds
  settings          show this panel
  q                 quit";

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn emit_reports_write_failure() {
        assert!(!emit(Broken, b"\x07"));

        let mut buf = Vec::new();
        assert!(emit(&mut buf, b"\x07"));
        assert_eq!(buf, b"\x07");
    }

    #[test]
    fn controls_line_reflects_every_control() {
        let idle = Controls {
            snapshot_enabled: true,
            record_enabled: true,
            settings_enabled: true,
            record_visible: true,
            stop_visible: false,
        };
        assert_eq!(controls_line(idle), "snapshot on | record on | settings on");

        let counting = Controls {
            snapshot_enabled: false,
            record_enabled: false,
            settings_enabled: false,
            ..idle
        };
        assert_eq!(controls_line(counting), "snapshot off | record off | settings off");

        let recording = Controls {
            record_visible: false,
            stop_visible: true,
            ..idle
        };
        assert_eq!(
            controls_line(recording),
            "snapshot on | [recording] press `s` to stop | settings on"
        );
    }
}
