//! The core tempo clock: scheduling state, tick loop, and control surface.

use crate::common::{CallbackId, TransportState};
use crate::config::{clamp_bpm, clamp_ppqn, ClockConfig};
use crate::events::{BeatEvent, PulseEvent, TransportEvent};
use crate::registry::{BeatCallback, CallbackRegistry, PulseCallback};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// All scheduling state, guarded by a single mutex.
///
/// Both the tick loop and caller contexts go through this lock; critical
/// sections are short and never held across an `.await`.
struct ClockCore {
    name: String,
    state: TransportState,
    bpm: u16,
    ppqn: u16,
    pulse_count: u64,
    beat_count: u64,
    /// Fixed origin of the current tempo epoch. `None` until the loop's
    /// first iteration.
    anchor: Option<Instant>,
    /// Loop iterations since `anchor` was last set. Advances while paused
    /// too, so it must not be narrower than the pulse counters: a clock left
    /// running at maximum tempo for weeks would overflow a u32.
    ticks_since_anchor: u64,
    pulse_callbacks: CallbackRegistry<PulseCallback>,
    beat_callbacks: CallbackRegistry<BeatCallback>,
}

impl ClockCore {
    /// The instantaneous pulse period, `60 / (ppqn * bpm)` seconds,
    /// recomputed from the current tempo parameters.
    fn pulse_period(&self) -> Duration {
        Duration::from_secs_f64(60.0 / (self.ppqn as f64 * self.bpm as f64))
    }

    /// Restarts the timing epoch at `now`. Must only be called with the
    /// clock lock already held; public setters acquire the lock once and
    /// call this, so no reentrant locking is ever needed.
    fn reanchor(&mut self, now: Instant) {
        self.anchor = Some(now);
        self.ticks_since_anchor = 0;
    }

    /// The absolute timestamp of the next tick, extrapolated from the fixed
    /// anchor. `fallback` stands in for an unset anchor; the loop always
    /// anchors before calling this.
    fn next_target(&self, fallback: Instant) -> Instant {
        let anchor = self.anchor.unwrap_or(fallback);
        anchor + self.pulse_period().mul_f64(self.ticks_since_anchor as f64)
    }
}

/// A musical tempo clock.
///
/// A `TempoClock` fires two nested families of timing events: a fine-grained
/// *pulse* for every PPQN tick, and a *beat* for every `ppqn`-th pulse. The
/// tick loop runs on its own spawned task from the moment the clock is
/// created; the transport state only gates whether pulses are counted and
/// dispatched. Tempo parameters may be retuned live from any task, and the
/// clock re-anchors its schedule so that scheduling error never accumulates.
///
/// The handle is cheap to clone and all methods take `&self`, so a clock can
/// be shared freely across tasks. Configuration setters return `&Self` for
/// fluent chaining:
///
/// ```rust,no_run
/// # use tempoclock::prelude::*;
/// # #[tokio::main] async fn main() {
/// let clock = TempoClock::new(ClockConfig::default());
/// clock.set_bpm(60).set_ppqn(4).start();
/// # }
/// ```
#[derive(Clone)]
pub struct TempoClock {
    core: Arc<Mutex<ClockCore>>,
    pulse_sender: broadcast::Sender<PulseEvent>,
    beat_sender: broadcast::Sender<BeatEvent>,
    transport_sender: broadcast::Sender<TransportEvent>,
    shutdown_sender: broadcast::Sender<()>,
    /// Flipped to `true` by the tick loop as its final act; `join` waits on
    /// it, so every handle's `join` observes the same exit.
    done: watch::Receiver<bool>,
}

impl TempoClock {
    /// Creates a new clock in the paused state and spawns its tick loop.
    ///
    /// Out-of-range `bpm`/`ppqn` in the config are clamped. The loop task
    /// runs until [`shutdown`](Self::shutdown) is called or every handle to
    /// the clock has been dropped.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime, since the tick loop is
    /// spawned immediately.
    pub fn new(config: ClockConfig) -> Self {
        let (pulse_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (beat_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (transport_sender, _) = broadcast::channel(64);
        let (shutdown_sender, shutdown_rx) = broadcast::channel(1);
        let (done_sender, done) = watch::channel(false);

        let core = Arc::new(Mutex::new(ClockCore {
            name: config.name,
            state: TransportState::Paused,
            bpm: clamp_bpm(config.bpm),
            ppqn: clamp_ppqn(config.ppqn),
            pulse_count: 0,
            beat_count: 0,
            anchor: None,
            ticks_since_anchor: 0,
            pulse_callbacks: CallbackRegistry::new(),
            beat_callbacks: CallbackRegistry::new(),
        }));

        tokio::spawn(tick_loop(
            core.clone(),
            pulse_sender.clone(),
            beat_sender.clone(),
            transport_sender.clone(),
            shutdown_rx,
            done_sender,
        ));

        Self {
            core,
            pulse_sender,
            beat_sender,
            transport_sender,
            shutdown_sender,
            done,
        }
    }

    fn lock_core(&self) -> MutexGuard<'_, ClockCore> {
        // A panicking callback poisons the lock; the state itself is still
        // consistent because counters are updated before dispatch.
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- Configuration surface ---

    /// Sets the tempo in beats per minute, clamped to `[20, 300]`.
    ///
    /// Re-anchors the schedule: the new pulse period applies from now, not
    /// retroactively to already-elapsed ticks. Observed by the tick loop no
    /// later than its next iteration boundary.
    pub fn set_bpm(&self, bpm: u16) -> &Self {
        let mut core = self.lock_core();
        core.bpm = clamp_bpm(bpm);
        core.reanchor(Instant::now());
        debug!(clock = %core.name, bpm = core.bpm, "bpm changed");
        let event = TransportEvent::TempoChanged {
            bpm: core.bpm,
            ppqn: core.ppqn,
        };
        drop(core);
        self.transport_sender.send(event).ok();
        self
    }

    /// Sets the pulse subdivision in pulses per quarter note, clamped to
    /// `[1, 192]`. Re-anchors the schedule like [`set_bpm`](Self::set_bpm).
    pub fn set_ppqn(&self, ppqn: u16) -> &Self {
        let mut core = self.lock_core();
        core.ppqn = clamp_ppqn(ppqn);
        core.reanchor(Instant::now());
        debug!(clock = %core.name, ppqn = core.ppqn, "ppqn changed");
        let event = TransportEvent::TempoChanged {
            bpm: core.bpm,
            ppqn: core.ppqn,
        };
        drop(core);
        self.transport_sender.send(event).ok();
        self
    }

    /// Sets the display label. Cosmetic; no effect on scheduling.
    pub fn set_name(&self, name: impl Into<String>) -> &Self {
        self.lock_core().name = name.into();
        self
    }

    // --- Transport ---

    /// Starts counting and dispatching pulses. Idempotent; does not reset
    /// the counters or the timing anchor.
    pub fn start(&self) -> &Self {
        let mut core = self.lock_core();
        if core.state == TransportState::Running {
            return self;
        }
        core.state = TransportState::Running;
        info!(clock = %core.name, "starting clock");
        drop(core);
        self.transport_sender.send(TransportEvent::Started).ok();
        self
    }

    /// Stops counting and dispatching pulses. Idempotent. The tick loop
    /// keeps running so a later [`start`](Self::start) resumes on the same
    /// timing grid.
    pub fn pause(&self) -> &Self {
        let mut core = self.lock_core();
        if core.state == TransportState::Paused {
            return self;
        }
        core.state = TransportState::Paused;
        info!(clock = %core.name, "pausing clock");
        drop(core);
        self.transport_sender.send(TransportEvent::Paused).ok();
        self
    }

    /// Resets both counters to zero.
    ///
    /// Does not re-anchor the schedule; re-anchoring is tied to tempo
    /// parameter changes only, so the pulse grid is unaffected.
    pub fn reset_counts(&self) -> &Self {
        let mut core = self.lock_core();
        core.pulse_count = 0;
        core.beat_count = 0;
        debug!(clock = %core.name, "counters reset");
        drop(core);
        self.transport_sender
            .send(TransportEvent::CountersReset)
            .ok();
        self
    }

    // --- Callbacks ---

    /// Registers a callback invoked on every pulse with the current pulse
    /// count, synchronously on the tick loop's task in registration order.
    ///
    /// A slow callback delays all subsequent ticks of this clock; callbacks
    /// must not block indefinitely, and must not call back into the same
    /// clock's control surface.
    pub fn add_pulse_callback(
        &self,
        callback: impl FnMut(u64) + Send + Sync + 'static,
    ) -> CallbackId {
        self.lock_core().pulse_callbacks.insert(Box::new(callback))
    }

    /// Registers a callback invoked on every beat with the current beat and
    /// pulse counts. Same dispatch contract as
    /// [`add_pulse_callback`](Self::add_pulse_callback).
    pub fn add_beat_callback(
        &self,
        callback: impl FnMut(u64, u64) + Send + Sync + 'static,
    ) -> CallbackId {
        self.lock_core().beat_callbacks.insert(Box::new(callback))
    }

    /// Removes a pulse callback. Returns `true` if it was registered.
    pub fn remove_pulse_callback(&self, id: CallbackId) -> bool {
        self.lock_core().pulse_callbacks.remove(id)
    }

    /// Removes a beat callback. Returns `true` if it was registered.
    pub fn remove_beat_callback(&self, id: CallbackId) -> bool {
        self.lock_core().beat_callbacks.remove(id)
    }

    // --- Event streams ---

    /// Subscribes to the [`PulseEvent`] stream.
    pub fn subscribe_pulse_events(&self) -> broadcast::Receiver<PulseEvent> {
        self.pulse_sender.subscribe()
    }

    /// Subscribes to the [`BeatEvent`] stream.
    pub fn subscribe_beat_events(&self) -> broadcast::Receiver<BeatEvent> {
        self.beat_sender.subscribe()
    }

    /// Subscribes to the [`TransportEvent`] stream.
    pub fn subscribe_transport_events(&self) -> broadcast::Receiver<TransportEvent> {
        self.transport_sender.subscribe()
    }

    // --- Observers ---

    /// The current beats per minute (post-clamping).
    pub fn bpm(&self) -> u16 {
        self.lock_core().bpm
    }

    /// The current pulses per quarter note (post-clamping).
    pub fn ppqn(&self) -> u16 {
        self.lock_core().ppqn
    }

    /// The number of pulses dispatched since creation or the last reset.
    pub fn pulse_count(&self) -> u64 {
        self.lock_core().pulse_count
    }

    /// The number of beats dispatched since creation or the last reset.
    pub fn beat_count(&self) -> u64 {
        self.lock_core().beat_count
    }

    /// The current transport state.
    pub fn transport_state(&self) -> TransportState {
        self.lock_core().state
    }

    /// The display label.
    pub fn name(&self) -> String {
        self.lock_core().name.clone()
    }

    /// The number of registered pulse and beat callbacks.
    pub fn callback_counts(&self) -> (usize, usize) {
        let core = self.lock_core();
        (core.pulse_callbacks.len(), core.beat_callbacks.len())
    }

    // --- Lifecycle ---

    /// Signals the tick loop to exit at its next iteration boundary.
    /// Idempotent; [`join`](Self::join) unblocks once the loop has observed
    /// the signal.
    pub fn shutdown(&self) {
        info!(clock = %self.lock_core().name, "shutdown requested");
        self.shutdown_sender.send(()).ok();
    }

    /// Waits for the tick loop to exit.
    ///
    /// Without a prior [`shutdown`](Self::shutdown) this never returns, as
    /// the loop is designed to run for the lifetime of the host program.
    /// Any number of handles may join concurrently; all of them unblock
    /// once the loop exits, and joining an already-exited clock returns
    /// immediately.
    pub async fn join(&self) {
        let mut done = self.done.clone();
        // Err means the loop task is gone, which also counts as exited.
        done.wait_for(|finished| *finished).await.ok();
    }
}

/// The tick loop. Runs on its own task for the lifetime of the clock.
///
/// Each iteration computes an absolute target timestamp from the fixed
/// anchor (`anchor + ticks_since_anchor * pulse_period`) and sleeps until
/// it, so one iteration's scheduling imprecision never propagates into the
/// next: individual ticks may be locally late, but the schedule does not
/// drift relative to the anchor.
async fn tick_loop(
    core: Arc<Mutex<ClockCore>>,
    pulse_sender: broadcast::Sender<PulseEvent>,
    beat_sender: broadcast::Sender<BeatEvent>,
    transport_sender: broadcast::Sender<TransportEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
    done_sender: watch::Sender<bool>,
) {
    loop {
        let target = {
            let mut core = core.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let now = Instant::now();
            if core.anchor.is_none() {
                core.reanchor(now);
            }

            if core.state == TransportState::Running {
                core.pulse_count += 1;
                let pulse = core.pulse_count;
                trace!(clock = %core.name, pulse, "pulse");
                core.pulse_callbacks.for_each_mut(|callback| callback(pulse));
                pulse_sender
                    .send(PulseEvent {
                        pulse_count: pulse,
                        timestamp: now,
                    })
                    .ok();

                if (pulse - 1) % core.ppqn as u64 == 0 {
                    core.beat_count += 1;
                    let beat = core.beat_count;
                    trace!(clock = %core.name, beat, pulse, "beat");
                    core.beat_callbacks
                        .for_each_mut(|callback| callback(beat, pulse));
                    beat_sender
                        .send(BeatEvent {
                            beat_count: beat,
                            pulse_count: pulse,
                            timestamp: now,
                        })
                        .ok();
                }
            }

            core.ticks_since_anchor += 1;
            core.next_target(now)
        };

        let now = Instant::now();
        if target <= now {
            // The tick is already late (a callback blocked too long, or the
            // host is overloaded). Skip the sleep and proceed; future
            // targets still derive from the fixed anchor. Yielding keeps a
            // persistently-behind clock from starving the runtime.
            trace!(late = ?now.duration_since(target), "tick overrun, skipping sleep");
            use tokio::sync::broadcast::error::TryRecvError;
            if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                break;
            }
            tokio::task::yield_now().await;
            continue;
        }

        tokio::select! {
            biased;
            // Completes on an explicit shutdown, or with a channel error
            // once every clock handle has been dropped. Either way the loop
            // is done.
            _ = shutdown_rx.recv() => break,
            _ = time::sleep_until(target) => {}
        }
    }

    let name = core
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .name
        .clone();
    info!(clock = %name, "clock loop exited");
    transport_sender.send(TransportEvent::Stopped).ok();
    done_sender.send(true).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_with(bpm: u16, ppqn: u16) -> ClockCore {
        ClockCore {
            name: "test".to_string(),
            state: TransportState::Paused,
            bpm,
            ppqn,
            pulse_count: 0,
            beat_count: 0,
            anchor: None,
            ticks_since_anchor: 0,
            pulse_callbacks: CallbackRegistry::new(),
            beat_callbacks: CallbackRegistry::new(),
        }
    }

    #[test]
    fn target_math_survives_tick_counts_beyond_u32() {
        // ~960 Hz at maximum tempo; a clock left running for weeks pushes
        // the tick counter past u32::MAX without ever re-anchoring.
        let mut core = core_with(300, 192);
        let anchor = Instant::now();
        core.reanchor(anchor);

        core.ticks_since_anchor = u64::from(u32::MAX) + 1;
        let target = core.next_target(anchor);
        core.ticks_since_anchor += 1;
        let next = core.next_target(anchor);

        assert!(target > anchor);
        assert!(next > target);

        // Consecutive targets stay one pulse period apart.
        let step = next.duration_since(target);
        let period = core.pulse_period();
        let tolerance = Duration::from_micros(1);
        let deviation = if step > period { step - period } else { period - step };
        assert!(deviation <= tolerance, "step was {:?}", step);
    }
}
