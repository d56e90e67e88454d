use core::fmt;

use crate::{Duration, Error};

/// Number of pulse widths kept by a [`SampleStore`].
pub const SAMPLE_SIZE: usize = 16;

/// Number of central values averaged by [`SampleStore::aggregate`].
pub const SAMPLE_COUNT: usize = 6;

const MAX_RECENCY: i32 = SAMPLE_SIZE as i32 - 1;

/// One stored pulse width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    pub duration: Duration,
    /// `SAMPLE_SIZE - 1` for the newest sample, one less for every insert since.
    pub recency: i32,
}

impl Sample {
    const EMPTY: Self = Self {
        duration: Duration::from_ticks(0),
        recency: 0,
    };
}

/// Fixed ring of the last [`SAMPLE_SIZE`] pulse widths.
#[derive(Debug, Clone)]
pub struct SampleStore {
    samples: [Sample; SAMPLE_SIZE],
    cursor: usize,
    len: usize,
}

impl SampleStore {
    pub const fn new() -> Self {
        Self {
            samples: [Sample::EMPTY; SAMPLE_SIZE],
            cursor: 0,
            len: 0,
        }
    }

    /// Overwrites the oldest slot with `duration` and ages every other slot.
    pub fn insert(&mut self, duration: Duration) {
        for (index, sample) in self.samples.iter_mut().enumerate() {
            if index == self.cursor {
                *sample = Sample {
                    duration,
                    recency: MAX_RECENCY,
                };
            } else {
                sample.recency = sample.recency.saturating_sub(1);
            }
        }
        self.cursor = (self.cursor + 1) % SAMPLE_SIZE;
        self.len = (self.len + 1).min(SAMPLE_SIZE);
    }

    /// Trimmed mean of the stored widths, in ticks.
    ///
    /// The widths are sorted and only the central [`SAMPLE_COUNT`] are
    /// averaged, so up to five stray echoes on either side are ignored. Until
    /// the ring has filled up, the same trim runs over the samples written so
    /// far. The stored samples are left untouched.
    pub fn aggregate(&self) -> Result<f64, Error> {
        if self.is_empty() {
            return Err(Error::InsufficientData);
        }

        let mut sorted = [Duration::from_ticks(0); SAMPLE_SIZE];
        let sorted = &mut sorted[..self.len];
        for (slot, sample) in sorted.iter_mut().zip(&self.samples[..self.len]) {
            *slot = sample.duration;
        }
        sorted.sort_unstable();

        let keep = self.len.min(SAMPLE_COUNT);
        let skip = (self.len - keep) / 2;
        let sum: u64 = sorted[skip..skip + keep]
            .iter()
            .map(|duration| u64::from(duration.ticks()))
            .sum();

        Ok(sum as f64 / keep as f64)
    }

    /// The width inserted last.
    pub fn most_recent(&self) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }
        self.samples
            .iter()
            .find(|sample| sample.recency == MAX_RECENCY)
            .map(|sample| sample.duration)
    }

    /// All slots in storage order, written or not.
    pub fn samples(&self) -> &[Sample; SAMPLE_SIZE] {
        &self.samples
    }

    pub fn get(&self, index: usize) -> Option<Sample> {
        self.samples.get(index).copied()
    }

    /// Number of slots written so far, saturating at [`SAMPLE_SIZE`].
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Comma separated widths in storage order, for log lines.
    pub fn csv(&self) -> SamplesCsv<'_> {
        SamplesCsv(&self.samples)
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders stored widths as `w0,w1,...,w15`.
pub struct SamplesCsv<'a>(&'a [Sample; SAMPLE_SIZE]);

impl fmt::Display for SamplesCsv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, sample) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", sample.duration.ticks())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us(ticks: u32) -> Duration {
        Duration::from_ticks(ticks)
    }

    #[test]
    fn empty_store_has_no_aggregate() {
        let store = SampleStore::new();
        assert_eq!(store.aggregate(), Err(Error::InsufficientData));
        assert_eq!(store.most_recent(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn newest_sample_is_unique_max_recency() {
        let mut store = SampleStore::new();
        for (i, width) in (100..140).enumerate() {
            store.insert(us(width));
            if i + 1 >= SAMPLE_SIZE {
                let newest = store
                    .samples()
                    .iter()
                    .filter(|sample| sample.recency == MAX_RECENCY)
                    .count();
                assert_eq!(newest, 1);
            }
            assert_eq!(store.most_recent(), Some(us(width)));
        }
        assert_eq!(store.len(), SAMPLE_SIZE);
    }

    #[test]
    fn insert_replaces_slots_round_robin() {
        let mut store = SampleStore::new();
        for width in 0..SAMPLE_SIZE as u32 {
            store.insert(us(width));
        }
        store.insert(us(1_000));
        store.insert(us(2_000));

        assert_eq!(store.get(0).map(|s| s.duration), Some(us(1_000)));
        assert_eq!(store.get(1).map(|s| s.duration), Some(us(2_000)));
        assert_eq!(store.get(2).map(|s| s.duration), Some(us(2)));
        assert_eq!(store.get(1).map(|s| s.recency), Some(MAX_RECENCY));
        assert_eq!(store.get(0).map(|s| s.recency), Some(MAX_RECENCY - 1));
        assert_eq!(store.get(SAMPLE_SIZE), None);
    }

    #[test]
    fn aggregate_rejects_outliers() {
        let mut store = SampleStore::new();
        let widths = [
            3, 40_000, 580, 1, 38_000, 582, 2, 579, 37_500, 581, 4, 39_000, 578, 5, 36_000, 580,
        ];
        for &width in widths.iter() {
            store.insert(us(width));
        }
        let mean = store.aggregate().unwrap();
        assert!((mean - 580.0).abs() < 1.5, "mean = {}", mean);
    }

    #[test]
    fn aggregate_leaves_recency_intact() {
        let mut store = SampleStore::new();
        for &width in [900, 100, 500, 300].iter() {
            store.insert(us(width));
        }
        let before = store.samples().clone();
        store.aggregate().unwrap();
        assert_eq!(store.samples(), &before);
        assert_eq!(store.most_recent(), Some(us(300)));
    }

    #[test]
    fn aggregate_on_partial_store_uses_written_samples() {
        let mut store = SampleStore::new();
        store.insert(us(1_200));
        assert_eq!(store.aggregate(), Ok(1_200.0));

        // 8 samples: keep the central 6 of the sorted widths
        for &width in [10, 20, 30, 40, 50, 60, 5_000].iter() {
            store.insert(us(width));
        }
        assert_eq!(store.aggregate(), Ok((20.0 + 30.0 + 40.0 + 50.0 + 60.0 + 1_200.0) / 6.0));
    }

    #[test]
    fn csv_lists_widths_in_slot_order() {
        let mut store = SampleStore::new();
        store.insert(us(7));
        store.insert(us(42));
        let line = format!("{}", store.csv());
        assert!(line.starts_with("7,42,0,"));
        assert_eq!(line.split(',').count(), SAMPLE_SIZE);
    }
}
