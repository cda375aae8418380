//! Contains common, primitive types shared across the tempoclock crate.
//!
//! This module defines the basic ID and state types used throughout the
//! clock. Using distinct types improves type safety and code clarity.

use slotmap::new_key_type;

new_key_type! {
    /// Uniquely and safely identifies a registered callback within a clock.
    ///
    /// This key is returned when a pulse or beat callback is added. It is
    /// guaranteed to be unique and will not be reused, preventing stale ID
    /// bugs when callbacks are removed and others added later.
    pub struct CallbackId;
}

/// The transport state of a [`TempoClock`](crate::clock::TempoClock).
///
/// The background tick loop runs in both states; `Paused` only gates whether
/// pulses are counted and dispatched, so a later `start` resumes on the same
/// timing grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Ticks are neither counted nor dispatched.
    Paused,
    /// Every tick increments the pulse counter and fires callbacks.
    Running,
}
