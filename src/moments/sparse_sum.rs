use serde_json::{Value, json};

use crate::traits::{Persist, StateKind};
use crate::utils::SparseVector;
use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::ensure_same_len;
use crate::{StatsError, StatsResult};

/// # Window Sum of Sparse Vectors
///
/// Coordinate-wise sum of the sparse vectors in an externally managed window. Coordinates that
/// cancel to exactly zero are dropped.
#[derive(Debug, Clone, Default)]
pub struct SparseSum {
    sum: SparseVector,
    count: u64,
    timestamp: u64,
}

impl SparseSum {
    /// Creates an empty sum
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a batch of window changes
    ///
    /// # Arguments
    ///
    /// * `values` - Vectors entering the window
    /// * `timestamps` - Timestamps of the entering vectors
    /// * `evicted` - Vectors leaving the window
    ///
    /// # Returns
    ///
    /// * `StatsResult<&mut Self>` - The statistics object, unchanged on error
    pub fn update_batch(
        &mut self,
        values: &[SparseVector],
        timestamps: &[u64],
        evicted: &[SparseVector],
    ) -> StatsResult<&mut Self> {
        ensure_same_len("values/timestamps", values.len(), timestamps.len())?;
        let live = self.count + values.len() as u64;
        if (evicted.len() as u64) > live {
            return Err(StatsError::EmptyAggregate("sparse sum"));
        }
        for value in values {
            self.sum = SparseVector::lin_comb(1.0, &self.sum, 1.0, value);
        }
        for value in evicted {
            self.sum = SparseVector::lin_comb(1.0, &self.sum, -1.0, value);
        }
        self.sum.prune(f64::MIN_POSITIVE);
        self.count = live - evicted.len() as u64;
        if let Some(&ts) = timestamps.iter().max() {
            self.timestamp = self.timestamp.max(ts);
        }
        Ok(self)
    }

    /// Applies one new vector together with the vectors that left the window
    pub fn update(
        &mut self,
        value: &SparseVector,
        timestamp: u64,
        evicted: &[SparseVector],
    ) -> StatsResult<&mut Self> {
        self.update_batch(std::slice::from_ref(value), &[timestamp], evicted)
    }

    /// Returns the current sum
    #[inline]
    pub fn sum(&self) -> &SparseVector {
        &self.sum
    }

    /// Returns the number of live vectors
    #[inline]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Returns the newest timestamp seen
    #[inline]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Returns the aggregate to its empty state
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Projects the sum as `{"value": [{index, value}], "timestamp": ts}`
    pub fn to_json(&self) -> Value {
        json!({
            "value": self.sum.to_json(),
            "timestamp": self.timestamp,
        })
    }
}

impl Persist for SparseSum {
    const KIND: StateKind = StateKind::SparseSum;

    /// Field order: sum, count, timestamp
    fn encode(&self, enc: &mut Encoder) {
        self.sum.encode(enc);
        enc.put_u64(self.count);
        enc.put_u64(self.timestamp);
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        Ok(Self {
            sum: SparseVector::decode(dec)?,
            count: dec.get_u64()?,
            timestamp: dec.get_u64()?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sv(pairs: &[(u32, f64)]) -> SparseVector {
        SparseVector::from_pairs(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn sum_adds_and_subtracts_coordinates() {
        let a = sv(&[(0, 1.0), (3, 2.0)]);
        let b = sv(&[(3, 1.5), (5, -1.0)]);
        let mut stats = SparseSum::new();
        stats.update(&a, 10, &[]).unwrap();
        stats.update(&b, 20, &[]).unwrap();
        assert_eq!(stats.sum().get(3), 3.5);
        assert_eq!(stats.count(), 2);

        stats.update_batch(&[], &[], &[a]).unwrap();
        assert_eq!(
            stats.sum().iter().copied().collect::<Vec<_>>(),
            vec![(3, 1.5), (5, -1.0)]
        );
        assert_eq!(stats.timestamp(), 20);
    }

    #[test]
    fn json_projection() {
        let mut stats = SparseSum::new();
        stats.update(&sv(&[(2, 4.0)]), 7, &[]).unwrap();
        assert_eq!(
            stats.to_json(),
            json!({"value": [{"index": 2, "value": 4.0}], "timestamp": 7})
        );
    }

    #[test]
    fn over_eviction_is_rejected() {
        let mut stats = SparseSum::new();
        assert!(stats.update_batch(&[], &[], &[sv(&[(1, 1.0)])]).is_err());
        assert!(stats.sum().is_empty());
    }
}
