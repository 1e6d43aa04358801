use crate::traits::{Persist, StateKind, WindowStatistic};
use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::ensure_same_len;
use crate::{StatsError, StatsResult};

/// # Window Sum
///
/// Adds values entering the window and subtracts values leaving it.
#[derive(Debug, Clone, Default)]
pub struct Sum {
    /// Running sum
    sum: f64,
    /// Number of live values
    count: u64,
    /// Newest timestamp seen
    timestamp: u64,
}

impl Sum {
    /// Creates an empty sum
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sum of the live window (zero when empty)
    #[inline]
    pub const fn sum(&self) -> f64 {
        self.sum
    }

    /// Returns the number of live values
    #[inline]
    pub const fn count(&self) -> u64 {
        self.count
    }
}

impl WindowStatistic for Sum {
    fn update_batch(
        &mut self,
        values: &[f64],
        timestamps: &[u64],
        evicted_values: &[f64],
        _evicted_timestamps: &[u64],
    ) -> StatsResult<&mut Self> {
        ensure_same_len("values/timestamps", values.len(), timestamps.len())?;
        if (evicted_values.len() as u64) > self.count {
            return Err(StatsError::EmptyAggregate("sum"));
        }
        evicted_values.iter().for_each(|v| self.sum -= v);
        values.iter().for_each(|v| self.sum += v);
        self.count = self.count - evicted_values.len() as u64 + values.len() as u64;
        if let Some(&ts) = timestamps.iter().max() {
            self.timestamp = self.timestamp.max(ts);
        }
        Ok(self)
    }

    fn value(&self) -> Option<f64> {
        Some(self.sum)
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Persist for Sum {
    const KIND: StateKind = StateKind::Sum;

    /// Field order: sum, count, timestamp
    fn encode(&self, enc: &mut Encoder) {
        enc.put_f64(self.sum);
        enc.put_u64(self.count);
        enc.put_u64(self.timestamp);
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        Ok(Self {
            sum: dec.get_f64()?,
            count: dec.get_u64()?,
            timestamp: dec.get_u64()?,
        })
    }
}
