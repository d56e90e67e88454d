use core::cell::RefCell;

use critical_section::Mutex;

use crate::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Edge {
    AwaitingStart,
    AwaitingEnd { start: Instant },
}

/// Echo pulse timer driven from the echo line interrupt.
///
/// Every edge on the echo line is fed to [`PulseTimer::on_edge`] with the
/// time it was seen. The first edge of a pair starts the capture, the second
/// one completes it and publishes the pulse width. The published width stays
/// in place until [`PulseTimer::take_if_ready`] picks it up, or a newer pulse
/// replaces it.
///
/// The timer itself does no locking. Share it between the interrupt and the
/// main loop through a lock that masks the interrupt, e.g. an RTIC resource or
/// [`SharedPulseTimer`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseTimer {
    edge: Edge,
    ready: Option<Duration>,
}

impl PulseTimer {
    pub const fn new() -> Self {
        Self {
            edge: Edge::AwaitingStart,
            ready: None,
        }
    }

    /// Records one edge of the echo pulse. Runs to completion, never blocks.
    pub fn on_edge(&mut self, now: Instant) {
        self.edge = match self.edge {
            Edge::AwaitingStart => Edge::AwaitingEnd { start: now },
            Edge::AwaitingEnd { start } => match now.checked_duration_since(start) {
                Some(width) => {
                    self.ready = Some(width);
                    Edge::AwaitingStart
                }
                None => {
                    // An edge from before the stored start can only come from a
                    // malformed sequence. Restart the capture from here.
                    #[cfg(feature = "defmt")]
                    defmt::warn!("echo edge out of order, restarting capture");
                    Edge::AwaitingEnd { start: now }
                }
            },
        };
    }

    /// Hands out the last completed pulse width, at most once.
    pub fn take_if_ready(&mut self) -> Option<Duration> {
        self.ready.take()
    }

    /// Drops a half-captured pulse and waits for a fresh start edge.
    ///
    /// A completed width that was not consumed yet is kept.
    pub fn reset(&mut self) {
        self.edge = Edge::AwaitingStart;
    }

    /// `true` while a start edge has been seen but its end has not.
    pub fn is_capturing(&self) -> bool {
        matches!(self.edge, Edge::AwaitingEnd { .. })
    }
}

impl Default for PulseTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`PulseTimer`] behind a critical section, for use from a `static`.
///
/// ```ignore
/// static ECHO: SharedPulseTimer = SharedPulseTimer::new();
///
/// #[interrupt]
/// fn GPIOTE() {
///     ECHO.on_edge(now());
/// }
/// ```
pub struct SharedPulseTimer {
    inner: Mutex<RefCell<PulseTimer>>,
}

impl SharedPulseTimer {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(PulseTimer::new())),
        }
    }

    pub fn on_edge(&self, now: Instant) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).on_edge(now))
    }

    pub fn take_if_ready(&self) -> Option<Duration> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).take_if_ready())
    }

    pub fn reset(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).reset())
    }
}

impl Default for SharedPulseTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the [`Scheduler`](crate::Scheduler) picks up finished pulses.
///
/// Implementations must make `take_if_ready` a single read-and-clear that the
/// echo interrupt cannot tear.
pub trait PulseSource {
    fn take_if_ready(&mut self) -> Option<Duration>;

    fn reset(&mut self);
}

impl PulseSource for PulseTimer {
    fn take_if_ready(&mut self) -> Option<Duration> {
        PulseTimer::take_if_ready(self)
    }

    fn reset(&mut self) {
        PulseTimer::reset(self)
    }
}

impl PulseSource for &SharedPulseTimer {
    fn take_if_ready(&mut self) -> Option<Duration> {
        SharedPulseTimer::take_if_ready(*self)
    }

    fn reset(&mut self) {
        SharedPulseTimer::reset(*self)
    }
}
