use crate::countdown::Countdown;
use crate::feedback::Controls;
use crate::filter::FilterState;
use crate::media::{Constraints, TrackCapabilities};

pub const ZOOM_MIN: f64 = 1.0;
pub const ZOOM_MAX: f64 = 3.0;
pub const ZOOM_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zoom {
    pub level: f64,
    /// Camera applies zoom itself; otherwise the canvas crops.
    pub hardware: bool,
}

impl Default for Zoom {
    fn default() -> Self {
        Self {
            level: ZOOM_MIN,
            hardware: false,
        }
    }
}

impl Zoom {
    pub fn stepped_in(&self) -> f64 {
        clamp_zoom(self.level + ZOOM_STEP)
    }

    pub fn stepped_out(&self) -> f64 {
        clamp_zoom(self.level - ZOOM_STEP)
    }

    /// Scale the compositor applies; 1.0 when the camera zooms in hardware.
    pub fn software_scale(&self) -> f64 {
        if self.hardware {
            1.0
        } else {
            self.level
        }
    }
}

fn clamp_zoom(level: f64) -> f64 {
    ((level * 10.0).round() / 10.0).clamp(ZOOM_MIN, ZOOM_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggles {
    pub flash: bool,
    pub audio: bool,
    pub settings_open: bool,
}

/// Everything the UI knows about the capture session. Handlers in
/// `dispatch` read and update this; the stream handles themselves live
/// in the app loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub constraints: Constraints,
    pub filter: FilterState,
    pub zoom: Zoom,
    pub capabilities: TrackCapabilities,
    pub torch_on: bool,
    pub countdown: Countdown,
    pub countdown_secs: u32,
    pub recording: bool,
    pub toggles: Toggles,
}

impl SessionState {
    pub fn new(constraints: Constraints, countdown_secs: u32, flash: bool, audio: bool) -> Self {
        Self {
            constraints,
            filter: FilterState::default(),
            zoom: Zoom::default(),
            capabilities: TrackCapabilities::default(),
            torch_on: false,
            countdown: Countdown::default(),
            countdown_secs,
            recording: false,
            toggles: Toggles {
                flash,
                audio,
                settings_open: false,
            },
        }
    }

    /// Adopt the capabilities of a freshly acquired video track.
    pub fn set_capabilities(&mut self, capabilities: TrackCapabilities) {
        self.capabilities = capabilities;
        self.zoom.hardware = capabilities.zoom.is_some();
        if !capabilities.torch {
            self.torch_on = false;
        }
    }

    pub fn controls(&self) -> Controls {
        let idle = !self.countdown.is_counting();
        Controls {
            snapshot_enabled: idle,
            record_enabled: idle,
            settings_enabled: idle,
            record_visible: !self.recording,
            stop_visible: self.recording,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(Constraints::default(), 3, false, true)
    }
}
