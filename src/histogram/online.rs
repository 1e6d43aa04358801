use ahash::RandomState;
use hashbrown::HashMap;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{HistogramParams, parse};
use crate::traits::{Persist, StateKind};
use crate::utils::codec::{Decoder, Encoder};
use crate::{StatsError, StatsResult};

/// # Online Histogram
///
/// Counts values into fixed, equally wide bins between a lower and an upper bound.
///
/// Bins are closed on the left and open on the right, except the last finite bin which also
/// holds the upper bound. Optional open-ended bins catch values below the lower bound and above
/// the upper bound; without them such values are ignored.
#[derive(Debug, Clone)]
pub struct OnlineHistogram {
    params: HistogramParams,
    /// `bins + 1` finite bounds, plus the infinite sentinels when enabled
    bounds: Vec<f64>,
    counts: Vec<u64>,
    total: u64,
}

impl OnlineHistogram {
    /// Creates a histogram of `bins` equally wide bins over `[lower, upper]`
    ///
    /// # Arguments
    ///
    /// * `lower` - Lower bound of the first bin
    /// * `upper` - Upper bound of the last bin
    /// * `bins` - Number of bins
    ///
    /// # Returns
    ///
    /// * `StatsResult<Self>` - The histogram, or `InvalidConfig`
    pub fn new(lower: f64, upper: f64, bins: usize) -> StatsResult<Self> {
        Self::from_params(&HistogramParams {
            lower_bound: lower,
            upper_bound: upper,
            bins,
            add_neg_inf: false,
            add_pos_inf: false,
        })
    }

    /// Creates a histogram from typed parameters
    pub fn from_params(params: &HistogramParams) -> StatsResult<Self> {
        let (lower, upper) = (params.lower_bound, params.upper_bound);
        if !(lower.is_finite() && upper.is_finite() && lower < upper) {
            return Err(StatsError::config(format!(
                "histogram bounds must be finite with lower < upper, got [{lower}, {upper}]"
            )));
        }
        if params.bins == 0 {
            return Err(StatsError::config("histogram needs at least one bin"));
        }

        let mut bounds = Vec::with_capacity(params.bins + 3);
        if params.add_neg_inf {
            bounds.push(f64::NEG_INFINITY);
        }
        let width = (upper - lower) / params.bins as f64;
        bounds.extend((0..params.bins).map(|i| lower + i as f64 * width));
        bounds.push(upper);
        if params.add_pos_inf {
            bounds.push(f64::INFINITY);
        }
        let counts = vec![0; bounds.len() - 1];
        Ok(Self {
            params: params.clone(),
            bounds,
            counts,
            total: 0,
        })
    }

    /// Creates a histogram from a JSON object such as
    /// `{"lowerBound": 0, "upperBound": 10, "bins": 5, "addPosInf": true}`
    pub fn from_json(params: &Value) -> StatsResult<Self> {
        let params: HistogramParams = parse(params)?;
        debug!(?params, "histogram from json");
        Self::from_params(&params)
    }

    /// Returns the construction parameters
    #[inline]
    pub fn params(&self) -> &HistogramParams {
        &self.params
    }

    /// Returns the bin bounds, including infinite sentinels
    #[inline]
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Returns the count of every bin
    #[inline]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Returns the number of bins, including open-ended ones
    #[inline]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns the number of counted values
    #[inline]
    pub const fn total(&self) -> u64 {
        self.total
    }

    #[inline]
    fn last_finite_bin(&self) -> usize {
        self.params.bins - 1 + usize::from(self.params.add_neg_inf)
    }

    /// Finds the bin holding `value`
    ///
    /// # Returns
    ///
    /// * `Option<usize>` - The bin index, or `None` if the value is NaN or outside every bin
    pub fn find_bin(&self, value: f64) -> Option<usize> {
        let n = self.counts.len();
        if value.is_nan() || value < self.bounds[0] || value > self.bounds[n] {
            return None;
        }
        if value == self.params.upper_bound {
            return Some(self.last_finite_bin());
        }
        let idx = self.bounds.partition_point(|&b| b <= value) - 1;
        Some(idx.min(n - 1))
    }

    /// Returns the count of the bin holding `value`, or `None` outside every bin
    pub fn count_at(&self, value: f64) -> Option<u64> {
        self.find_bin(value).map(|bin| self.counts[bin])
    }

    /// Counts `value`; values outside every bin are ignored
    pub fn increment(&mut self, value: f64) -> &mut Self {
        if let Some(bin) = self.find_bin(value) {
            self.counts[bin] += 1;
            self.total += 1;
        }
        self
    }

    /// Uncounts `value`; values outside every bin are ignored
    ///
    /// # Returns
    ///
    /// * `StatsResult<&mut Self>` - `EmptyAggregate` if the bin is already empty
    pub fn decrement(&mut self, value: f64) -> StatsResult<&mut Self> {
        if let Some(bin) = self.find_bin(value) {
            if self.counts[bin] == 0 {
                return Err(StatsError::EmptyAggregate("histogram bin"));
            }
            self.counts[bin] -= 1;
            self.total -= 1;
        }
        Ok(self)
    }

    /// Counts `added` and uncounts `removed`
    ///
    /// The batch is validated as a whole before any bin changes.
    ///
    /// # Returns
    ///
    /// * `StatsResult<&mut Self>` - `EmptyAggregate` if a bin would go below zero
    pub fn update(&mut self, added: &[f64], removed: &[f64]) -> StatsResult<&mut Self> {
        let deltas = self.deltas(added, removed);
        if deltas
            .iter()
            .any(|(&bin, &delta)| (self.counts[bin] as i64) + delta < 0)
        {
            return Err(StatsError::EmptyAggregate("histogram bin"));
        }
        self.apply(&deltas);
        Ok(self)
    }

    /// Net count change per touched bin
    pub(crate) fn deltas(
        &self,
        added: &[f64],
        removed: &[f64],
    ) -> HashMap<usize, i64, RandomState> {
        let mut deltas = HashMap::with_hasher(RandomState::new());
        for bin in added.iter().filter_map(|&v| self.find_bin(v)) {
            *deltas.entry(bin).or_insert(0) += 1;
        }
        for bin in removed.iter().filter_map(|&v| self.find_bin(v)) {
            *deltas.entry(bin).or_insert(0) -= 1;
        }
        deltas
    }

    /// Applies validated deltas
    pub(crate) fn apply(&mut self, deltas: &HashMap<usize, i64, RandomState>) {
        for (&bin, &delta) in deltas {
            self.counts[bin] = (self.counts[bin] as i64 + delta) as u64;
            self.total = (self.total as i64 + delta) as u64;
        }
    }

    /// Sets every count to zero
    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.total = 0;
    }

    /// Projects the histogram as `{"bounds": [...], "counts": [...]}`
    ///
    /// Infinite bounds project as `null`.
    pub fn to_json(&self) -> Value {
        let bounds: Vec<Value> = self
            .bounds
            .iter()
            .map(|&b| if b.is_finite() { json!(b) } else { Value::Null })
            .collect();
        json!({
            "bounds": bounds,
            "counts": self.counts,
        })
    }
}

impl Persist for OnlineHistogram {
    const KIND: StateKind = StateKind::Histogram;

    /// Field order: lower bound, upper bound, bins, negative sentinel, positive sentinel,
    /// counts, total
    fn encode(&self, enc: &mut Encoder) {
        enc.put_f64(self.params.lower_bound);
        enc.put_f64(self.params.upper_bound);
        enc.put_u64(self.params.bins as u64);
        enc.put_bool(self.params.add_neg_inf);
        enc.put_bool(self.params.add_pos_inf);
        enc.put_u64s(&self.counts);
        enc.put_u64(self.total);
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        let lower_bound = dec.get_f64()?;
        let upper_bound = dec.get_f64()?;
        let bins = dec.get_u64()?;
        let add_neg_inf = dec.get_bool()?;
        let add_pos_inf = dec.get_bool()?;
        let counts = dec.get_u64s()?;
        let total = dec.get_u64()?;

        let expected = usize::try_from(bins)
            .ok()
            .and_then(|b| b.checked_add(usize::from(add_neg_inf) + usize::from(add_pos_inf)));
        if expected != Some(counts.len()) {
            return Err(StatsError::Decode(format!(
                "{bins} bins do not match {} bin counts",
                counts.len()
            )));
        }
        let counted = counts.iter().try_fold(0u64, |acc, &c| acc.checked_add(c));
        if counted != Some(total) {
            return Err(StatsError::Decode(format!(
                "total {total} does not match the bin counts"
            )));
        }

        let params = HistogramParams {
            lower_bound,
            upper_bound,
            bins: counts.len() - usize::from(add_neg_inf) - usize::from(add_pos_inf),
            add_neg_inf,
            add_pos_inf,
        };
        let mut hist =
            Self::from_params(&params).map_err(|e| StatsError::Decode(e.to_string()))?;
        hist.counts = counts;
        hist.total = total;
        Ok(hist)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use test_case::test_case;

    use super::*;

    fn scan(hist: &OnlineHistogram, value: f64) -> Option<usize> {
        let b = hist.bounds();
        if value == hist.params().upper_bound {
            return b.iter().position(|&x| x == value).map(|i| i - 1);
        }
        (0..hist.len()).find(|&i| b[i] <= value && value < b[i + 1])
    }

    #[test_case(0.0, 10.0, 5, false, false)]
    #[test_case(-3.5, 7.25, 13, true, false)]
    #[test_case(1.0, 2.0, 1, false, true)]
    #[test_case(-100.0, 100.0, 7, true, true)]
    fn find_bin_matches_linear_scan(lower: f64, upper: f64, bins: usize, neg: bool, pos: bool) {
        let hist = OnlineHistogram::from_params(&HistogramParams {
            lower_bound: lower,
            upper_bound: upper,
            bins,
            add_neg_inf: neg,
            add_pos_inf: pos,
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(bins as u64);
        let span = upper - lower;
        for _ in 0..1_000 {
            let v = rng.gen_range(lower - span..upper + span);
            assert_eq!(hist.find_bin(v), scan(&hist, v), "value {v}");
        }
        for &b in hist.bounds().iter().filter(|b| b.is_finite()) {
            assert_eq!(hist.find_bin(b), scan(&hist, b), "bound {b}");
        }
    }

    #[test]
    fn upper_bound_maps_to_last_finite_bin() {
        let hist = OnlineHistogram::new(0.0, 10.0, 5).unwrap();
        assert_eq!(hist.find_bin(10.0), Some(4));
        assert_eq!(hist.find_bin(0.0), Some(0));
        assert_eq!(hist.find_bin(2.0), Some(1));
        assert_eq!(hist.find_bin(10.5), None);
        assert_eq!(hist.find_bin(-0.5), None);
        assert_eq!(hist.find_bin(f64::NAN), None);

        let open = OnlineHistogram::from_json(&serde_json::json!({
            "lowerBound": 0.0, "upperBound": 10.0, "addNegInf": true, "addPosInf": true
        }))
        .unwrap();
        assert_eq!(open.len(), 7);
        assert_eq!(open.find_bin(10.0), Some(5));
        assert_eq!(open.find_bin(10.5), Some(6));
        assert_eq!(open.find_bin(-1e300), Some(0));
        assert_eq!(open.find_bin(0.0), Some(1));
    }

    #[test]
    fn counting_works() {
        let mut hist = OnlineHistogram::new(0.0, 10.0, 5).unwrap();
        hist.increment(1.0).increment(1.5).increment(9.0).increment(42.0);
        assert_eq!(hist.counts(), &[2, 0, 0, 0, 1]);
        assert_eq!(hist.total(), 3);
        assert_eq!(hist.count_at(1.9), Some(2));
        assert_eq!(hist.count_at(42.0), None);

        hist.decrement(1.0).unwrap().decrement(-5.0).unwrap();
        assert_eq!(hist.counts(), &[1, 0, 0, 0, 1]);
        assert_eq!(
            hist.decrement(5.0).unwrap_err(),
            StatsError::EmptyAggregate("histogram bin")
        );
        assert_eq!(hist.total(), 2);
    }

    #[test]
    fn batch_update_is_all_or_nothing() {
        let mut hist = OnlineHistogram::new(0.0, 10.0, 5).unwrap();
        hist.update(&[1.0, 3.0, 3.5], &[]).unwrap();
        assert!(hist.update(&[9.0], &[3.0, 3.1, 3.2]).is_err());
        assert_eq!(hist.counts(), &[1, 2, 0, 0, 0]);

        // removal of a value added in the same batch is fine
        hist.update(&[7.0], &[7.0, 1.0]).unwrap();
        assert_eq!(hist.counts(), &[0, 2, 0, 0, 0]);
        assert_eq!(hist.total(), 2);
        hist.reset();
        assert_eq!(hist.total(), 0);
    }

    #[test]
    fn json_projection_nulls_infinite_bounds() {
        let hist = OnlineHistogram::from_params(&HistogramParams {
            lower_bound: 0.0,
            upper_bound: 2.0,
            bins: 2,
            add_neg_inf: true,
            add_pos_inf: false,
        })
        .unwrap();
        assert_eq!(
            hist.to_json(),
            json!({"bounds": [null, 0.0, 1.0, 2.0], "counts": [0, 0, 0]})
        );
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        assert!(OnlineHistogram::new(1.0, 1.0, 5).is_err());
        assert!(OnlineHistogram::new(2.0, 1.0, 5).is_err());
        assert!(OnlineHistogram::new(0.0, 1.0, 0).is_err());
        assert!(OnlineHistogram::new(f64::NEG_INFINITY, 1.0, 3).is_err());
    }
}
