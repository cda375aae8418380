//! # Tempoclock
//!
//! A drift-free, live-tunable musical tempo clock for Tokio.
//!
//! A [`TempoClock`](clock::TempoClock) fires two nested families of timing
//! events: fine-grained *pulses* (PPQN ticks) and *beats* (every `ppqn`-th
//! pulse), at a rate computed from two live-tunable parameters — beats per
//! minute and pulses per quarter note. Consumers such as a sequencer engine
//! register callbacks that are invoked at the scheduled instants without
//! cumulative drift, even while the tempo is being retuned from another task.
//!
//! ## Core Concepts
//!
//! - **Anchored scheduling**: every tick targets an absolute timestamp
//!   computed from a fixed anchor, so scheduling jitter never compounds.
//!   Changing the tempo re-anchors the schedule from "now".
//! - **Transport gating**: the tick loop runs from creation until shutdown;
//!   pausing only stops pulses from being counted and dispatched.
//! - **Two dispatch paths**: synchronous callback lists with a strict
//!   registration-order guarantee, plus lossy broadcast event streams for
//!   decoupled subscribers.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use tempoclock::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let clock = TempoClock::new(ClockConfig::default());
//!
//!     clock.add_beat_callback(|beat, pulse| {
//!         println!("beat {beat} (pulse {pulse})");
//!     });
//!
//!     // Configure fluently and start counting.
//!     clock.set_bpm(60).set_ppqn(4).start();
//!
//!     tokio::signal::ctrl_c().await?;
//!     clock.shutdown();
//!     clock.join().await;
//!     Ok(())
//! }
//! ```

pub const LIB_NAME: &str = "Tempoclock";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod clock;
pub mod common;
pub mod config;
pub mod events;
mod registry;

pub use registry::{BeatCallback, PulseCallback};

/// A prelude module for easy importing of the most common tempoclock types.
pub mod prelude {
    pub use crate::clock::TempoClock;
    pub use crate::common::{CallbackId, TransportState};
    pub use crate::config::ClockConfig;
    pub use crate::events::{BeatEvent, PulseEvent, TransportEvent};
}
