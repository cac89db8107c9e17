//! Alert debouncer.
//!
//! Two independent timers, one per alert condition. A condition has to be seen
//! in every evaluated frame for its whole threshold before an alert fires; a
//! single frame without it drops the timer back to idle.
//!
//! ```text
//! Idle --present--> Tracking(since) --present, elapsed >= threshold--> emit, Idle
//!   ^                    |
//!   +------absent--------+
//! ```

use std::time::{Duration, Instant};

use crate::detect::{DetectionFrame, PostureClass, DEFAULT_MIN_CONFIDENCE};

pub const DEFAULT_SITTING_THRESHOLD: Duration = Duration::from_secs(300);
pub const DEFAULT_FALLING_THRESHOLD: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlertCondition {
    Sitting,
    Falling,
}

impl AlertCondition {
    pub fn all() -> &'static [AlertCondition] {
        &[Self::Sitting, Self::Falling]
    }

    /// Posture whose presence drives this condition.
    pub fn posture(&self) -> PostureClass {
        match self {
            Self::Sitting => PostureClass::Sitting,
            Self::Falling => PostureClass::Falling,
        }
    }
}

/// A fired alert for one condition at one instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlertEvent {
    pub condition: AlertCondition,
    pub at: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Tracking { since: Instant },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DebounceSettings {
    pub sitting_threshold: Duration,
    pub falling_threshold: Duration,
    /// Detections below this confidence are ignored.
    pub min_confidence: f32,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            sitting_threshold: DEFAULT_SITTING_THRESHOLD,
            falling_threshold: DEFAULT_FALLING_THRESHOLD,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl DebounceSettings {
    pub fn threshold(&self, condition: AlertCondition) -> Duration {
        match condition {
            AlertCondition::Sitting => self.sitting_threshold,
            AlertCondition::Falling => self.falling_threshold,
        }
    }
}

#[derive(Debug)]
struct AlertTimer {
    condition: AlertCondition,
    threshold: Duration,
    started_at: Option<Instant>,
}

impl AlertTimer {
    fn new(condition: AlertCondition, threshold: Duration) -> Self {
        Self {
            condition,
            threshold,
            started_at: None,
        }
    }

    fn observe(&mut self, present: bool, now: Instant) -> Option<AlertEvent> {
        if !present {
            self.started_at = None;
            return None;
        }
        match self.started_at {
            None => {
                self.started_at = Some(now);
                None
            }
            Some(start) if now.saturating_duration_since(start) >= self.threshold => {
                // Restarts only when the condition shows up in a later frame.
                self.started_at = None;
                Some(AlertEvent {
                    condition: self.condition,
                    at: now,
                })
            }
            Some(_) => None,
        }
    }

    fn state(&self) -> TimerState {
        match self.started_at {
            Some(since) => TimerState::Tracking { since },
            None => TimerState::Idle,
        }
    }
}

/// Per-session debounce state machine.
#[derive(Debug)]
pub struct AlertDebouncer {
    settings: DebounceSettings,
    sitting: AlertTimer,
    falling: AlertTimer,
}

impl AlertDebouncer {
    pub fn new(settings: DebounceSettings) -> Self {
        Self {
            sitting: AlertTimer::new(AlertCondition::Sitting, settings.sitting_threshold),
            falling: AlertTimer::new(AlertCondition::Falling, settings.falling_threshold),
            settings,
        }
    }

    pub fn settings(&self) -> &DebounceSettings {
        &self.settings
    }

    /// Feed one frame's detections. Returns the alerts fired by this frame.
    pub fn evaluate(&mut self, detections: &DetectionFrame, now: Instant) -> Vec<AlertEvent> {
        let min = self.settings.min_confidence;
        AlertCondition::all()
            .iter()
            .filter_map(|&condition| {
                let present = detections.contains(condition.posture(), min);
                self.timer_mut(condition).observe(present, now)
            })
            .collect()
    }

    fn timer_mut(&mut self, condition: AlertCondition) -> &mut AlertTimer {
        match condition {
            AlertCondition::Sitting => &mut self.sitting,
            AlertCondition::Falling => &mut self.falling,
        }
    }

    /// Clear both timers.
    pub fn reset(&mut self) {
        self.sitting.started_at = None;
        self.falling.started_at = None;
    }

    pub fn state(&self, condition: AlertCondition) -> TimerState {
        match condition {
            AlertCondition::Sitting => self.sitting.state(),
            AlertCondition::Falling => self.falling.state(),
        }
    }
}

impl Default for AlertDebouncer {
    fn default() -> Self {
        Self::new(DebounceSettings::default())
    }
}
