//! Defines the configuration structure and tempo bounds for the clock.
//!
//! `ClockConfig` is designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`, so a clock's name and initial tempo can
//! be defined externally from the application code. Values outside the legal
//! tempo bounds are clamped, never rejected.

use serde::Deserialize;

/// Lowest accepted beats-per-minute.
pub const MIN_BPM: u16 = 20;
/// Highest accepted beats-per-minute.
pub const MAX_BPM: u16 = 300;
/// Lowest accepted pulses-per-quarter-note.
pub const MIN_PPQN: u16 = 1;
/// Highest accepted pulses-per-quarter-note.
pub const MAX_PPQN: u16 = 192;

/// Default tempo of a freshly created clock.
pub const DEFAULT_BPM: u16 = 120;
/// Default pulse subdivision of a freshly created clock. 24 PPQN is the
/// classic MIDI clock resolution.
pub const DEFAULT_PPQN: u16 = 24;

/// The configuration for a [`TempoClock`](crate::clock::TempoClock).
///
/// Typically loaded from a TOML file or environment at application startup
/// via [`ClockConfig::load`], or constructed directly. Every field has a
/// default, so an empty file yields a valid config.
#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    /// A human-readable label for logging purposes. Cosmetic only.
    #[serde(default = "default_name")]
    pub name: String,

    /// Initial beats per minute. Clamped to `[MIN_BPM, MAX_BPM]`.
    #[serde(default = "default_bpm")]
    pub bpm: u16,

    /// Initial pulses per quarter note. Clamped to `[MIN_PPQN, MAX_PPQN]`.
    #[serde(default = "default_ppqn")]
    pub ppqn: u16,
}

impl ClockConfig {
    /// Loads a configuration from an optional file (any format the `config`
    /// crate understands, e.g. `clock.toml`) merged with `TEMPOCLOCK_*`
    /// environment variable overrides. Missing file and missing fields fall
    /// back to defaults.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(name).required(false))
            .add_source(config::Environment::with_prefix("TEMPOCLOCK").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            bpm: default_bpm(),
            ppqn: default_ppqn(),
        }
    }
}

/// Clamps a BPM value into the legal range. Out-of-range input is not an
/// error; clamping is the defined policy.
pub(crate) fn clamp_bpm(bpm: u16) -> u16 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// Clamps a PPQN value into the legal range.
pub(crate) fn clamp_ppqn(ppqn: u16) -> u16 {
    ppqn.clamp(MIN_PPQN, MAX_PPQN)
}

// --- Default value functions for serde ---

fn default_name() -> String {
    "clock".to_string()
}

fn default_bpm() -> u16 {
    DEFAULT_BPM
}

fn default_ppqn() -> u16 {
    DEFAULT_PPQN
}
