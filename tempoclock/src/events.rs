//! Defines the public event types broadcast by a clock.
//!
//! These streams are a lossy, best-effort mirror of the synchronous callback
//! dispatch: lagging subscribers may miss events, and only the callback lists
//! carry the ordering guarantee. Subscribe via the `subscribe_*` methods on
//! [`TempoClock`](crate::clock::TempoClock).

use tokio::time::Instant;

/// Fired for every pulse while the clock is running.
#[derive(Debug, Clone)]
pub struct PulseEvent {
    /// The value of the pulse counter for this pulse (1-based).
    pub pulse_count: u64,
    /// When the pulse was dispatched.
    pub timestamp: Instant,
}

/// Fired for every pulse that starts a new beat, i.e. every `ppqn`-th pulse.
#[derive(Debug, Clone)]
pub struct BeatEvent {
    /// The value of the beat counter for this beat (1-based).
    pub beat_count: u64,
    /// The pulse counter at the moment the beat fired.
    pub pulse_count: u64,
    /// When the beat was dispatched.
    pub timestamp: Instant,
}

/// Events related to the transport and configuration of the clock itself.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The clock transitioned from paused to running.
    Started,
    /// The clock transitioned from running to paused.
    Paused,
    /// Both counters were reset to zero.
    CountersReset,
    /// The tempo parameters changed (values are post-clamping).
    TempoChanged { bpm: u16, ppqn: u16 },
    /// The tick loop observed the shutdown signal and exited.
    Stopped,
}
