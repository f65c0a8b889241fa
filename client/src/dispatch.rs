use crate::countdown::{CountdownAction, StartOutcome, Tick};
use crate::feedback::{Controls, Tone};
use crate::filter::FilterState;
use crate::media::Resolution;
use crate::session::SessionState;
use tracing::info;

/// User input and timer events, all funneled through [`dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    SnapshotPressed,
    RecordPressed,
    StopRecordPressed,
    CountdownClicked,
    CountdownTick,
    ZoomIn,
    ZoomOut,
    SelectFilter(FilterState),
    ChangeResolution(Resolution),
    FlashToggled,
    AudioToggled,
    SettingsPressed,
    TorchToggled,
    Quit,
}

/// Side effects for the app loop to carry out, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Tone(Tone),
    ShowCountdown(Option<u32>),
    UpdateControls(Controls),
    ShowSettings(bool),
    Perform(CountdownAction),
    StopRecording,
    HardwareZoom(f64),
    SetTorch(bool),
    PulseTorch,
    Reacquire(Resolution),
    Shutdown,
}

/// Apply one event to the session state and return the effects it calls for.
pub fn dispatch(state: &mut SessionState, event: UiEvent) -> Vec<Command> {
    let mut out = Vec::new();
    match event {
        UiEvent::SnapshotPressed => toggle_countdown(state, CountdownAction::Snapshot, &mut out),
        UiEvent::RecordPressed => {
            if state.countdown.is_counting() {
                cancel_countdown(state, &mut out);
            } else if !state.recording {
                toggle_countdown(state, CountdownAction::StartRecording, &mut out);
            }
        }
        UiEvent::CountdownClicked => cancel_countdown(state, &mut out),
        UiEvent::CountdownTick => match state.countdown.tick() {
            Some(Tick::Count { remaining, cue }) => {
                out.push(Command::ShowCountdown(Some(remaining)));
                tone(state, cue, &mut out);
            }
            Some(Tick::Fire { cue, .. }) => {
                out.push(Command::ShowCountdown(None));
                if let Some(action) = state.countdown.complete() {
                    out.push(Command::UpdateControls(state.controls()));
                    tone(state, cue, &mut out);
                    out.push(Command::Perform(action));
                }
            }
            None => {}
        },
        UiEvent::StopRecordPressed => {
            if state.recording {
                out.push(Command::StopRecording);
            }
        }
        UiEvent::ZoomIn => {
            let level = state.zoom.stepped_in();
            zoom_to(state, level, Tone::ZOOM_IN, &mut out);
        }
        UiEvent::ZoomOut => {
            let level = state.zoom.stepped_out();
            zoom_to(state, level, Tone::ZOOM_OUT, &mut out);
        }
        UiEvent::SelectFilter(filter) => {
            info!(filter = filter.name(), expression = filter.expression(), "filter selected");
            state.filter = filter;
            tone(state, Tone::FILTER, &mut out);
        }
        UiEvent::ChangeResolution(resolution) => {
            state.constraints = state.constraints.with_resolution(resolution);
            out.push(Command::Reacquire(resolution));
            tone(state, Tone::RESOLUTION, &mut out);
        }
        UiEvent::FlashToggled => {
            state.toggles.flash = !state.toggles.flash;
            if state.toggles.flash && state.capabilities.torch {
                out.push(Command::PulseTorch);
            }
        }
        UiEvent::AudioToggled => state.toggles.audio = !state.toggles.audio,
        UiEvent::SettingsPressed => {
            if !state.countdown.is_counting() {
                state.toggles.settings_open = !state.toggles.settings_open;
                out.push(Command::ShowSettings(state.toggles.settings_open));
                tone(state, Tone::SETTINGS, &mut out);
            }
        }
        UiEvent::TorchToggled => {
            if state.capabilities.torch {
                out.push(Command::SetTorch(!state.torch_on));
            }
        }
        UiEvent::Quit => {
            state.countdown.cancel();
            out.push(Command::Shutdown);
        }
    }
    out
}

fn toggle_countdown(state: &mut SessionState, action: CountdownAction, out: &mut Vec<Command>) {
    match state.countdown.start(state.countdown_secs, action) {
        StartOutcome::Started { remaining } => out.push(Command::ShowCountdown(Some(remaining))),
        StartOutcome::Cancelled => out.push(Command::ShowCountdown(None)),
    }
    out.push(Command::UpdateControls(state.controls()));
}

fn cancel_countdown(state: &mut SessionState, out: &mut Vec<Command>) {
    if state.countdown.cancel() {
        out.push(Command::ShowCountdown(None));
        out.push(Command::UpdateControls(state.controls()));
    }
}

fn zoom_to(state: &mut SessionState, level: f64, cue: Tone, out: &mut Vec<Command>) {
    if state.zoom.hardware {
        // Level is committed once the camera accepts it.
        out.push(Command::HardwareZoom(level));
    } else {
        state.zoom.level = level;
    }
    tone(state, cue, out);
}

fn tone(state: &SessionState, cue: Tone, out: &mut Vec<Command>) {
    if state.toggles.audio {
        out.push(Command::Tone(cue));
    }
}

/// Map a line typed on the terminal to an event. An empty line or a
/// single space is the spacebar, which triggers the snapshot control.
pub fn parse_command(line: &str) -> Option<UiEvent> {
    if line.trim().is_empty() {
        return Some(UiEvent::SnapshotPressed);
    }
    let mut words = line.split_whitespace();
    let head = words.next()?.to_ascii_lowercase();
    let arg = words.next();
    let event = match head.as_str() {
        "snap" | "snapshot" => UiEvent::SnapshotPressed,
        "r" | "record" => UiEvent::RecordPressed,
        "s" | "stop" => UiEvent::StopRecordPressed,
        "c" | "cancel" => UiEvent::CountdownClicked,
        "+" | "zoom+" => UiEvent::ZoomIn,
        "-" | "zoom-" => UiEvent::ZoomOut,
        "f" | "filter" => UiEvent::SelectFilter(FilterState::from_name(arg.unwrap_or("none"))),
        "res" | "resolution" => UiEvent::ChangeResolution(arg?.parse().ok()?),
        "flash" => UiEvent::FlashToggled,
        "audio" => UiEvent::AudioToggled,
        "settings" | "?" | "help" => UiEvent::SettingsPressed,
        "t" | "torch" => UiEvent::TorchToggled,
        "q" | "quit" | "exit" => UiEvent::Quit,
        _ => return None,
    };
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::countdown::Countdown;
    use crate::media::TrackCapabilities;

    fn state() -> SessionState {
        SessionState::default()
    }

    fn performed(cmds: &[Command]) -> Option<CountdownAction> {
        cmds.iter().find_map(|c| match c {
            Command::Perform(a) => Some(*a),
            _ => None,
        })
    }

    #[test]
    fn snapshot_runs_after_three_ticks() {
        let mut s = state();
        let cmds = dispatch(&mut s, UiEvent::SnapshotPressed);
        assert!(cmds.contains(&Command::ShowCountdown(Some(3))));
        assert!(!s.controls().snapshot_enabled);

        let mut ticks = 0;
        let action = loop {
            ticks += 1;
            let cmds = dispatch(&mut s, UiEvent::CountdownTick);
            if let Some(a) = performed(&cmds) {
                assert!(cmds.contains(&Command::Tone(Tone::COUNTDOWN_FIRE)));
                break a;
            }
            assert!(cmds.contains(&Command::Tone(Tone::COUNTDOWN_TICK)));
        };
        assert_eq!(ticks, 3);
        assert_eq!(action, CountdownAction::Snapshot);
        assert_eq!(s.countdown, Countdown::Idle);
        assert!(s.controls().snapshot_enabled);
    }

    #[test]
    fn second_press_cancels_and_nothing_fires() {
        let mut s = state();
        dispatch(&mut s, UiEvent::SnapshotPressed);
        dispatch(&mut s, UiEvent::CountdownTick);
        let cmds = dispatch(&mut s, UiEvent::SnapshotPressed);
        assert!(cmds.contains(&Command::ShowCountdown(None)));
        for _ in 0..5 {
            assert!(performed(&dispatch(&mut s, UiEvent::CountdownTick)).is_none());
        }
    }

    #[test]
    fn record_press_cancels_snapshot_countdown() {
        let mut s = state();
        dispatch(&mut s, UiEvent::SnapshotPressed);
        dispatch(&mut s, UiEvent::RecordPressed);
        assert_eq!(s.countdown, Countdown::Idle);
    }

    #[test]
    fn clicking_countdown_cancels() {
        let mut s = state();
        dispatch(&mut s, UiEvent::RecordPressed);
        dispatch(&mut s, UiEvent::CountdownClicked);
        assert_eq!(s.countdown, Countdown::Idle);
        assert!(dispatch(&mut s, UiEvent::CountdownClicked).is_empty());
    }

    #[test]
    fn record_ignored_while_recording() {
        let mut s = state();
        s.recording = true;
        assert!(dispatch(&mut s, UiEvent::RecordPressed).is_empty());
        assert_eq!(dispatch(&mut s, UiEvent::StopRecordPressed), vec![Command::StopRecording]);
    }

    #[test]
    fn tones_respect_audio_toggle() {
        let mut s = state();
        dispatch(&mut s, UiEvent::AudioToggled);
        let cmds = dispatch(&mut s, UiEvent::SelectFilter(FilterState::Sepia));
        assert!(cmds.is_empty());
        assert_eq!(s.filter, FilterState::Sepia);
    }

    #[test]
    fn software_zoom_updates_level_directly() {
        let mut s = state();
        let cmds = dispatch(&mut s, UiEvent::ZoomIn);
        assert_eq!(s.zoom.level, 1.1);
        assert_eq!(cmds, vec![Command::Tone(Tone::ZOOM_IN)]);
        dispatch(&mut s, UiEvent::ZoomOut);
        dispatch(&mut s, UiEvent::ZoomOut);
        assert_eq!(s.zoom.level, 1.0);
    }

    #[test]
    fn hardware_zoom_is_requested_not_committed() {
        let mut s = state();
        s.set_capabilities(TrackCapabilities {
            zoom: Some((1.0, 3.0)),
            torch: false,
        });
        let cmds = dispatch(&mut s, UiEvent::ZoomIn);
        assert_eq!(cmds[0], Command::HardwareZoom(1.1));
        assert_eq!(s.zoom.level, 1.0);
    }

    #[test]
    fn torch_is_noop_without_capability() {
        let mut s = state();
        assert!(dispatch(&mut s, UiEvent::TorchToggled).is_empty());
        let cmds = dispatch(&mut s, UiEvent::FlashToggled);
        assert!(s.toggles.flash);
        assert!(!cmds.contains(&Command::PulseTorch));

        s.set_capabilities(TrackCapabilities {
            zoom: None,
            torch: true,
        });
        assert_eq!(dispatch(&mut s, UiEvent::TorchToggled), vec![Command::SetTorch(true)]);
        dispatch(&mut s, UiEvent::FlashToggled);
        assert!(dispatch(&mut s, UiEvent::FlashToggled).contains(&Command::PulseTorch));
    }

    #[test]
    fn resolution_change_reacquires_then_chimes() {
        let mut s = state();
        let res = Resolution::new(1920, 1080);
        let cmds = dispatch(&mut s, UiEvent::ChangeResolution(res));
        assert_eq!(cmds, vec![Command::Reacquire(res), Command::Tone(Tone::RESOLUTION)]);
        assert_eq!(s.constraints.resolution, res);
    }

    #[test]
    fn settings_toggle() {
        let mut s = state();
        let cmds = dispatch(&mut s, UiEvent::SettingsPressed);
        assert_eq!(cmds[0], Command::ShowSettings(true));
        let cmds = dispatch(&mut s, UiEvent::SettingsPressed);
        assert_eq!(cmds[0], Command::ShowSettings(false));
    }

    #[test]
    fn keyboard_mapping() {
        assert_eq!(parse_command(""), Some(UiEvent::SnapshotPressed));
        assert_eq!(parse_command(" "), Some(UiEvent::SnapshotPressed));
        assert_eq!(parse_command("r"), Some(UiEvent::RecordPressed));
        assert_eq!(
            parse_command("f grayscale"),
            Some(UiEvent::SelectFilter(FilterState::Grayscale))
        );
        assert_eq!(parse_command("f"), Some(UiEvent::SelectFilter(FilterState::None)));
        assert_eq!(
            parse_command("res 640x480"),
            Some(UiEvent::ChangeResolution(Resolution::new(640, 480)))
        );
        assert_eq!(parse_command("res big"), None);
        assert_eq!(parse_command("Q"), Some(UiEvent::Quit));
        assert_eq!(parse_command("dance"), None);
    }
}
