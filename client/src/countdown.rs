use crate::feedback::Tone;

/// What runs when a countdown reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownAction {
    Snapshot,
    StartRecording,
}

/// Cancellable timed delay before a snapshot or recording.
///
/// `Idle --start--> Counting(n) --tick--> ... --tick--> Fired --complete--> Idle`.
/// `cancel` from `Counting` goes straight back to `Idle` and the action is
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Countdown {
    #[default]
    Idle,
    Counting {
        remaining: u32,
        action: CountdownAction,
    },
    Fired {
        action: CountdownAction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { remaining: u32 },
    /// A start while counting toggles the countdown off.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still counting; `remaining` is the new value to display.
    Count { remaining: u32, cue: Tone },
    Fire { action: CountdownAction, cue: Tone },
}

impl Countdown {
    pub fn start(&mut self, secs: u32, action: CountdownAction) -> StartOutcome {
        if self.cancel() {
            return StartOutcome::Cancelled;
        }
        let remaining = secs.max(1);
        *self = Countdown::Counting { remaining, action };
        StartOutcome::Started { remaining }
    }

    /// Advance by one second. Returns `None` when no countdown is running.
    pub fn tick(&mut self) -> Option<Tick> {
        let Countdown::Counting { remaining, action } = *self else {
            return None;
        };
        let remaining = remaining - 1;
        if remaining > 0 {
            *self = Countdown::Counting { remaining, action };
            Some(Tick::Count {
                remaining,
                cue: Tone::COUNTDOWN_TICK,
            })
        } else {
            *self = Countdown::Fired { action };
            Some(Tick::Fire {
                action,
                cue: Tone::COUNTDOWN_FIRE,
            })
        }
    }

    /// Acknowledge a fired countdown once its action has been dispatched.
    pub fn complete(&mut self) -> Option<CountdownAction> {
        match *self {
            Countdown::Fired { action } => {
                *self = Countdown::Idle;
                Some(action)
            }
            _ => None,
        }
    }

    /// Returns `true` if a running countdown was stopped.
    pub fn cancel(&mut self) -> bool {
        if self.is_counting() {
            *self = Countdown::Idle;
            true
        } else {
            false
        }
    }

    pub fn is_counting(&self) -> bool {
        matches!(self, Countdown::Counting { .. })
    }

    pub fn remaining(&self) -> Option<u32> {
        match self {
            Countdown::Counting { remaining, .. } => Some(*remaining),
            _ => None,
        }
    }
}
