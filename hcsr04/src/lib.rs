//! Measurement pipeline for HC-SR04 style ultrasonic rangers.
//!
//! The sensor is started with a short pulse on its trigger line and answers
//! with a pulse on its echo line whose width is the round-trip time of the
//! sound burst. The pipeline has three parts:
//!
//! - [`PulseTimer`] runs in the echo interrupt and turns a rising/falling edge
//!   pair into a [`Duration`].
//! - [`SampleStore`] keeps the last [`SAMPLE_SIZE`] durations and reduces them
//!   with a trimmed mean that throws away stray echoes.
//! - [`Scheduler`] is polled from the main loop. It fires the trigger on a
//!   fixed grid, picks up finished pulses and publishes a [`Distance`].
//!
//! Nothing here allocates or blocks, apart from the few microseconds the
//! trigger line is held high.
#![cfg_attr(not(test), no_std)]

mod pulse;
mod scheduler;
mod store;

pub use pulse::{PulseSource, PulseTimer, SharedPulseTimer};
pub use scheduler::{sound_speed, Clock, Config, Distance, Scheduler, TriggerWindow};
pub use store::{Sample, SampleStore, SamplesCsv, SAMPLE_COUNT, SAMPLE_SIZE};

/// Tick rate of the timestamp source, 1 MHz.
pub const TIMER_HZ: u32 = 1_000_000;

/// A reading of the free-running 32-bit microsecond counter.
pub type Instant = fugit::TimerInstantU32<TIMER_HZ>;

/// A span of microseconds, computed with wrapping subtraction.
pub type Duration = fugit::TimerDurationU32<TIMER_HZ>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// No sample has been stored yet.
    InsufficientData,
}
