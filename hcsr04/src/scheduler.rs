use embedded_hal::{blocking::delay::DelayUs, digital::v2::OutputPin};

use crate::{Duration, Instant, PulseSource, Sample, SampleStore, SamplesCsv, SAMPLE_SIZE};

/// Reads the free-running microsecond counter.
pub trait Clock {
    fn now(&mut self) -> Instant;
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Spacing of trigger pulses.
    pub interval: Duration,
    /// How long the trigger line is held high.
    pub trigger_width: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: Duration::from_ticks(30_000),
            trigger_width: Duration::from_ticks(10),
        }
    }
}

/// When the trigger line was actually raised and lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TriggerWindow {
    pub start: Instant,
    pub end: Instant,
}

impl TriggerWindow {
    pub fn width(&self) -> Duration {
        self.end
            .checked_duration_since(self.start)
            .unwrap_or(Duration::from_ticks(0))
    }
}

/// A published range estimate.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Distance(f64);

impl Distance {
    pub fn inches(&self) -> f64 {
        self.0
    }

    pub fn cm(&self) -> f64 {
        self.0 * 2.54
    }
}

/// Distance sound covers per microsecond of echo, in inches.
///
/// `(331.3 + 0.606 * Tc)` m/s, scaled to inch/µs and halved because the echo
/// covers the path twice.
pub fn sound_speed(ambient_celsius: f64) -> f64 {
    (331.3 + 0.606 * ambient_celsius) / 1_000_000.0 * 100.0 / 2.54 / 2.0
}

/// Polled measurement loop.
///
/// [`Scheduler::tick`] is called as often as the main loop can. It raises the
/// trigger on a fixed grid of [`Config::interval`], collects whatever pulse the
/// echo interrupt has finished, and keeps the trimmed-mean distance up to date.
/// If no echo comes back the last distance is kept.
pub struct Scheduler<P, D, C> {
    trigger: P,
    delay: D,
    clock: C,
    config: Config,
    deadline: Option<Instant>,
    last_trigger: Option<TriggerWindow>,
    store: SampleStore,
    distance: Option<Distance>,
}

impl<P, D, C> Scheduler<P, D, C>
where
    P: OutputPin,
    D: DelayUs<u32>,
    C: Clock,
{
    pub fn new(mut trigger: P, delay: D, clock: C, config: Config) -> Self {
        trigger.set_low().ok();
        Self {
            trigger,
            delay,
            clock,
            config,
            deadline: None,
            last_trigger: None,
            store: SampleStore::new(),
            distance: None,
        }
    }

    /// Runs one scheduling step. Returns the new estimate when a pulse was
    /// consumed during this step.
    pub fn tick<S>(&mut self, now: Instant, ambient_celsius: f64, echo: &mut S) -> Option<Distance>
    where
        S: PulseSource,
    {
        if self.due(now) {
            // Whatever the interrupt half-captured belongs to the previous cycle.
            echo.reset();
            let window = self.fire();
            #[cfg(feature = "defmt")]
            defmt::trace!("trigger {} us", window.width().ticks());
            self.last_trigger = Some(window);
        }

        let width = echo.take_if_ready()?;
        self.store.insert(width);
        let mean = self.store.aggregate().ok()?;
        let distance = Distance(mean * sound_speed(ambient_celsius));
        #[cfg(feature = "defmt")]
        defmt::debug!("echo {} us, mean {} us", width.ticks(), mean);
        self.distance = Some(distance);
        Some(distance)
    }

    /// Last published estimate, kept while no echo arrives.
    pub fn distance(&self) -> Option<Distance> {
        self.distance
    }

    pub fn most_recent(&self) -> Option<Duration> {
        self.store.most_recent()
    }

    pub fn samples(&self) -> &[Sample; SAMPLE_SIZE] {
        self.store.samples()
    }

    pub fn samples_csv(&self) -> SamplesCsv<'_> {
        self.store.csv()
    }

    pub fn last_trigger(&self) -> Option<TriggerWindow> {
        self.last_trigger
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gives back the trigger pin, delay and clock.
    pub fn release(self) -> (P, D, C) {
        (self.trigger, self.delay, self.clock)
    }

    fn due(&mut self, now: Instant) -> bool {
        let deadline = match self.deadline {
            Some(deadline) => deadline,
            None => {
                self.deadline = Some(now + self.config.interval);
                return true;
            }
        };

        if now >= deadline {
            // from the old deadline, never from `now`
            self.deadline = Some(deadline + self.config.interval);
            true
        } else {
            false
        }
    }

    fn fire(&mut self) -> TriggerWindow {
        let start = self.clock.now();
        if self.trigger.set_high().is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("trigger line could not be raised");
        }
        self.delay.delay_us(self.config.trigger_width.ticks());
        if self.trigger.set_low().is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("trigger line could not be lowered");
        }
        let end = self.clock.now();
        TriggerWindow { start, end }
    }
}
