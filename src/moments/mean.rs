use crate::traits::{Persist, StateKind, WindowStatistic};
use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::ensure_same_len;
use crate::{StatsError, StatsResult};

/// # Window Mean
///
/// Incremental arithmetic mean of an externally managed window.
///
/// Inserts apply `mean += (x - mean) / n` after incrementing `n`; deletions apply the exact
/// reverse. Evicted values are removed before new values are added. When the window empties the
/// mean returns to zero.
#[derive(Debug, Clone, Default)]
pub struct Mean {
    count: u64,
    mean: f64,
    timestamp: u64,
}

impl Mean {
    /// Creates an empty mean
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the running mean (zero when empty)
    #[inline]
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// Returns the number of live values
    #[inline]
    pub const fn count(&self) -> u64 {
        self.count
    }

    #[inline]
    fn insert(&mut self, x: f64) {
        self.count += 1;
        self.mean += (x - self.mean) / self.count as f64;
    }

    #[inline]
    fn delete(&mut self, x: f64) {
        self.count -= 1;
        if self.count == 0 {
            self.mean = 0.0;
        } else {
            self.mean -= (x - self.mean) / self.count as f64;
        }
    }
}

impl WindowStatistic for Mean {
    fn update_batch(
        &mut self,
        values: &[f64],
        timestamps: &[u64],
        evicted_values: &[f64],
        _evicted_timestamps: &[u64],
    ) -> StatsResult<&mut Self> {
        ensure_same_len("values/timestamps", values.len(), timestamps.len())?;
        if (evicted_values.len() as u64) > self.count {
            return Err(StatsError::EmptyAggregate("mean"));
        }
        evicted_values.iter().for_each(|&x| self.delete(x));
        values.iter().for_each(|&x| self.insert(x));
        if let Some(&ts) = timestamps.iter().max() {
            self.timestamp = self.timestamp.max(ts);
        }
        Ok(self)
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Persist for Mean {
    const KIND: StateKind = StateKind::Mean;

    /// Field order: count, mean, timestamp
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u64(self.count);
        enc.put_f64(self.mean);
        enc.put_u64(self.timestamp);
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        Ok(Self {
            count: dec.get_u64()?,
            mean: dec.get_f64()?,
            timestamp: dec.get_u64()?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    #[test]
    fn mean_works() {
        let mut stats = Mean::new();
        let inputs = [25.4, 26.2, 26.0, 26.1, 25.8, 25.9, 26.3, 26.2, 26.5];
        let mut results = vec![];
        for (i, &v) in inputs.iter().enumerate() {
            let evicted = if i >= 3 { vec![inputs[i - 3]] } else { vec![] };
            stats.update(v, i as u64, &evicted, &[]).unwrap();
            if i >= 2 {
                results.push(stats.value().unwrap());
            }
        }
        let expected = [25.8667, 26.1, 25.9667, 25.9333, 26.0, 26.1333, 26.3333];
        for (e, r) in expected.iter().zip(&results) {
            assert_approx_eq!(e, r, 0.0001);
        }
    }

    #[test]
    fn deleting_to_zero_resets_to_identity() {
        let mut stats = Mean::new();
        stats.update_batch(&[2.0, 4.0], &[1, 2], &[], &[]).unwrap();
        assert_eq!(stats.value(), Some(3.0));
        stats.update_batch(&[], &[], &[4.0, 2.0], &[]).unwrap();
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.value(), None);

        stats.update(7.5, 3, &[], &[]).unwrap();
        assert_eq!(stats.value(), Some(7.5));
    }

    #[test]
    fn deleting_from_empty_is_rejected() {
        let mut stats = Mean::new();
        assert_eq!(
            stats.update(1.0, 1, &[1.0], &[]).unwrap_err(),
            StatsError::EmptyAggregate("mean")
        );
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.timestamp(), 0);
    }
}
