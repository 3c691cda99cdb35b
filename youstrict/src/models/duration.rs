//! Watch-time budgets the parent can pick.

use serde::{Deserialize, Serialize};

/// Preset budgets offered on the selection screen.
pub const PRESET_MINUTES: [u32; 3] = [15, 30, 60];

/// Budget selected when the screen opens.
pub const DEFAULT_MINUTES: u32 = 30;

/// Smallest custom budget.
pub const CUSTOM_MIN_MINUTES: u32 = 5;

/// Largest custom budget.
pub const CUSTOM_MAX_MINUTES: u32 = 180;

/// Custom budgets move in steps of this many minutes.
pub const CUSTOM_STEP_MINUTES: u32 = 5;

/// Reasons a budget is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("duration must be positive")]
    NotPositive,

    #[error("{0} minutes is outside {min}..={max}", min = CUSTOM_MIN_MINUTES, max = CUSTOM_MAX_MINUTES)]
    OutOfRange(u32),

    #[error("{0} minutes is not a multiple of {step}", step = CUSTOM_STEP_MINUTES)]
    OffStep(u32),
}

/// A budget that is either a preset or a valid custom value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct WatchDuration(u32);

impl WatchDuration {
    /// Validate a budget against the presets and the custom range.
    pub const fn new(minutes: u32) -> Result<Self, DurationError> {
        if minutes == 0 {
            return Err(DurationError::NotPositive);
        }
        if Self::is_preset(minutes) {
            return Ok(Self(minutes));
        }
        if minutes < CUSTOM_MIN_MINUTES || minutes > CUSTOM_MAX_MINUTES {
            return Err(DurationError::OutOfRange(minutes));
        }
        if minutes % CUSTOM_STEP_MINUTES != 0 {
            return Err(DurationError::OffStep(minutes));
        }
        Ok(Self(minutes))
    }

    const fn is_preset(minutes: u32) -> bool {
        let mut i = 0;
        while i < PRESET_MINUTES.len() {
            if PRESET_MINUTES[i] == minutes {
                return true;
            }
            i += 1;
        }
        false
    }

    pub const fn minutes(self) -> u32 {
        self.0
    }
}

impl Default for WatchDuration {
    fn default() -> Self {
        Self(DEFAULT_MINUTES)
    }
}

impl TryFrom<u32> for WatchDuration {
    type Error = DurationError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Self::new(minutes)
    }
}

impl From<WatchDuration> for u32 {
    fn from(duration: WatchDuration) -> Self {
        duration.0
    }
}

impl std::fmt::Display for WatchDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} min", self.0)
    }
}

/// State of the duration selection screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationPicker {
    selected: u32,
    custom: u32,
    show_custom: bool,
}

impl Default for DurationPicker {
    fn default() -> Self {
        Self {
            selected: DEFAULT_MINUTES,
            custom: DEFAULT_MINUTES,
            show_custom: false,
        }
    }
}

impl DurationPicker {
    /// Pick a preset; leaves custom mode. Non-preset values are ignored.
    pub fn select_preset(&mut self, minutes: u32) {
        if PRESET_MINUTES.contains(&minutes) {
            self.selected = minutes;
            self.show_custom = false;
        }
    }

    pub fn toggle_custom(&mut self) {
        self.show_custom = !self.show_custom;
    }

    pub const fn is_custom(&self) -> bool {
        self.show_custom
    }

    pub fn increment(&mut self) {
        self.custom = (self.custom + CUSTOM_STEP_MINUTES).min(CUSTOM_MAX_MINUTES);
    }

    pub fn decrement(&mut self) {
        self.custom = self
            .custom
            .saturating_sub(CUSTOM_STEP_MINUTES)
            .max(CUSTOM_MIN_MINUTES);
    }

    /// The budget that "Start Watching" would commit.
    pub const fn current(&self) -> WatchDuration {
        if self.show_custom {
            WatchDuration(self.custom)
        } else {
            WatchDuration(self.selected)
        }
    }
}
