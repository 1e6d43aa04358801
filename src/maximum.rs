use crate::StatsResult;
use crate::extremum::Extremum;
use crate::traits::{Persist, StateKind, WindowStatistic};
use crate::utils::Max;
use crate::utils::codec::{Decoder, Encoder};

/// # Window Maximum
///
/// Tracks the maximum of an externally managed window of timestamped values.
///
/// Mirror image of [`crate::Minimum`]: the monotonic queue keeps non-increasing candidates and its
/// front is the maximum of the live window.
#[derive(Debug, Clone)]
pub struct Maximum(Extremum<Max>);

impl Maximum {
    /// Creates an empty maximum tracker
    pub fn new() -> Self {
        Self(Extremum::new("maximum"))
    }

    /// Returns the maximum of the live window
    ///
    /// # Returns
    ///
    /// * `Option<f64>` - `None` if the window holds no value
    #[inline]
    pub fn get(&self) -> Option<f64> {
        self.0.value()
    }

    /// Returns the number of retained candidates
    #[inline]
    pub fn candidates(&self) -> usize {
        self.0.candidates()
    }
}

impl Default for Maximum {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowStatistic for Maximum {
    fn update_batch(
        &mut self,
        values: &[f64],
        timestamps: &[u64],
        _evicted_values: &[f64],
        evicted_timestamps: &[u64],
    ) -> StatsResult<&mut Self> {
        self.0.update_batch(values, timestamps, evicted_timestamps)?;
        Ok(self)
    }

    fn value(&self) -> Option<f64> {
        self.get()
    }

    fn timestamp(&self) -> u64 {
        self.0.timestamp()
    }

    fn reset(&mut self) {
        self.0.reset();
    }
}

impl Persist for Maximum {
    const KIND: StateKind = StateKind::Maximum;

    fn encode(&self, enc: &mut Encoder) {
        self.0.encode(enc);
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        Extremum::decode("maximum", dec).map(Self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::StatsError;

    #[test]
    fn max_works() {
        let mut stats = Maximum::new();
        let inputs = [25.4, 26.2, 26.0, 26.1, 25.8, 25.9, 26.3, 26.2, 26.5];
        let mut results = vec![];
        for (i, &v) in inputs.iter().enumerate() {
            let ts = 100 + i as u64;
            let evicted = if i >= 3 { vec![ts - 3] } else { vec![] };
            stats.update(v, ts, &[], &evicted).unwrap();
            if i >= 2 {
                results.push(stats.value().unwrap());
            }
        }
        assert_eq!(results, vec![26.2, 26.2, 26.1, 26.1, 26.3, 26.3, 26.5]);
    }

    #[test]
    fn matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut stats = Maximum::new();
        let mut live: Vec<(u64, f64)> = vec![];
        let mut ts = 1_000;
        for _ in 0..2_000 {
            // several points may share a timestamp
            ts += rng.gen_range(0..3);
            let v = rng.gen_range(-1.0..1.0);
            live.push((ts, v));
            let mut evicted = vec![];
            while let Some(&(oldest, _)) = live.first() {
                if oldest + 20 < ts {
                    evicted.push(oldest);
                    live.remove(0);
                } else {
                    break;
                }
            }
            stats.update(v, ts, &[], &evicted).unwrap();
            let expected = live.iter().map(|&(_, v)| v).fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(stats.value(), Some(expected));
        }
    }

    #[test]
    fn ties_expire_the_older_value_first() {
        let mut stats = Maximum::new();
        stats.update(5.0, 1, &[], &[]).unwrap();
        stats.update(5.0, 2, &[], &[]).unwrap();
        assert_eq!(stats.candidates(), 1);
        stats.update(4.0, 3, &[], &[1]).unwrap();
        assert_eq!(stats.value(), Some(5.0));
        stats.update(3.0, 4, &[], &[2]).unwrap();
        assert_eq!(stats.value(), Some(4.0));
    }

    #[test]
    fn empty_eviction_is_rejected() {
        let mut stats = Maximum::new();
        assert_eq!(
            stats.update_batch(&[], &[], &[], &[1]).unwrap_err(),
            StatsError::EmptyAggregate("maximum")
        );
        assert_eq!(stats.value(), None);
    }
}
