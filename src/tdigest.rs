use core::f64::consts::PI;

use ordered_float::OrderedFloat;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::config::{TDigestParams, parse};
use crate::traits::{Persist, StateKind};
use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::{bisect, ensure_same_len};
use crate::{StatsError, StatsResult};

#[derive(Serialize)]
struct Centroid {
    mean: f64,
    weight: f64,
}

/// # T-Digest
///
/// Merging t-digest quantile sketch.
///
/// Points are staged in a small buffer; when it fills up (or before a query) they are sorted and
/// swept together with the existing centroids. A point is absorbed into the current centroid
/// while the scale function
///
/// ```text
/// k(q) = compression * (asin(2q - 1) + pi / 2) / pi
/// ```
///
/// advances by at most one across the centroid, otherwise it opens a new centroid. The scale
/// function is flat at the tails, so centroids near the extremes stay small and tail quantiles
/// stay accurate. The digest only grows; there is no deletion.
#[derive(Debug, Clone)]
pub struct TDigest {
    compression: f64,
    means: Vec<f64>,
    weights: Vec<f64>,
    /// Cumulative weight up to and including each centroid
    cumulative: Vec<f64>,
    /// Weight of the merged centroids
    total: f64,
    staged: Vec<(f64, f64)>,
    staged_weight: f64,
    capacity: usize,
    min: f64,
    max: f64,
}

/// Smallest `n` with `n * log2(n) >= target`
fn staging_capacity(target: usize) -> usize {
    let (mut lo, mut hi) = (1usize, target.max(1));
    while lo < hi {
        let mid = (lo + hi) / 2;
        if (target as f64) > mid as f64 * (mid as f64).log2() {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo.max(1)
}

impl TDigest {
    /// Creates an empty digest
    ///
    /// # Arguments
    ///
    /// * `compression` - Scale of the clustering function, at least one; the digest keeps on
    ///   the order of `compression` centroids
    ///
    /// # Returns
    ///
    /// * `StatsResult<Self>` - The digest, or `InvalidConfig`
    pub fn new(compression: f64) -> StatsResult<Self> {
        if !(compression.is_finite() && compression >= 1.0) {
            return Err(StatsError::config(format!(
                "compression must be at least 1, got {compression}"
            )));
        }
        Ok(Self {
            compression,
            means: Vec::new(),
            weights: Vec::new(),
            cumulative: Vec::new(),
            total: 0.0,
            staged: Vec::new(),
            staged_weight: 0.0,
            capacity: staging_capacity(compression.ceil() as usize),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        })
    }

    /// Creates a digest from typed parameters
    pub fn from_params(params: &TDigestParams) -> StatsResult<Self> {
        Self::new(params.compression)
    }

    /// Creates a digest from a JSON object such as `{"compression": 200}`
    pub fn from_json(params: &Value) -> StatsResult<Self> {
        let params: TDigestParams = parse(params)?;
        debug!(?params, "t-digest from json");
        Self::from_params(&params)
    }

    /// Returns the compression
    #[inline]
    pub const fn compression(&self) -> f64 {
        self.compression
    }

    /// Returns the total weight inserted, merged or not
    #[inline]
    pub fn count(&self) -> f64 {
        self.total + self.staged_weight
    }

    /// Returns the number of merged centroids
    #[inline]
    pub fn cluster_count(&self) -> usize {
        self.means.len()
    }

    /// Returns the smallest value inserted
    pub fn min(&self) -> Option<f64> {
        (self.count() > 0.0).then_some(self.min)
    }

    /// Returns the largest value inserted
    pub fn max(&self) -> Option<f64> {
        (self.count() > 0.0).then_some(self.max)
    }

    /// Inserts one value with unit weight
    pub fn update(&mut self, value: f64) -> StatsResult<&mut Self> {
        self.update_weighted(value, 1.0)
    }

    /// Inserts a value with the given weight
    ///
    /// # Arguments
    ///
    /// * `value` - The value, not NaN
    /// * `weight` - Its weight, finite and positive
    ///
    /// # Returns
    ///
    /// * `StatsResult<&mut Self>` - The digest, unchanged on error
    pub fn update_weighted(&mut self, value: f64, weight: f64) -> StatsResult<&mut Self> {
        if value.is_nan() {
            return Err(StatsError::NanValue("t-digest"));
        }
        if !(weight.is_finite() && weight > 0.0) {
            return Err(StatsError::config(format!(
                "weight must be finite and positive, got {weight}"
            )));
        }
        self.staged.push((value, weight));
        self.staged_weight += weight;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        if self.staged.len() >= self.capacity {
            self.flush();
        }
        Ok(self)
    }

    #[inline]
    fn scale(&self, q: f64) -> f64 {
        self.compression * ((2.0 * q - 1.0).clamp(-1.0, 1.0).asin() + PI / 2.0) / PI
    }

    /// Merges the staged points into the centroids
    pub fn flush(&mut self) -> &mut Self {
        if self.staged.is_empty() {
            return self;
        }
        self.staged.sort_by_key(|&(v, _)| OrderedFloat(v));
        let total = self.total + self.staged_weight;

        let mut means = Vec::with_capacity(self.means.len() + self.staged.len());
        let mut weights: Vec<f64> = Vec::with_capacity(means.capacity());
        let (mut sum, mut k1) = (0.0, 0.0);
        let (mut i, mut j) = (0, 0);
        while i < self.staged.len() || j < self.means.len() {
            let take_staged =
                j >= self.means.len() || (i < self.staged.len() && self.staged[i].0 <= self.means[j]);
            let (u, w) = if take_staged {
                i += 1;
                self.staged[i - 1]
            } else {
                j += 1;
                (self.means[j - 1], self.weights[j - 1])
            };
            sum += w;
            let k2 = self.scale(sum / total);
            if let (Some(m), Some(cw)) = (means.last_mut(), weights.last_mut())
                && k2 - k1 <= 1.0
            {
                *cw += w;
                *m += (u - *m) * w / *cw;
            } else {
                means.push(u);
                weights.push(w);
                k1 = self.scale((sum - w) / total);
            }
        }
        trace!(
            staged = self.staged.len(),
            clusters = means.len(),
            total,
            "t-digest merge"
        );

        self.means = means;
        self.weights = weights;
        self.total = total;
        self.staged.clear();
        self.staged_weight = 0.0;
        self.rebuild_cumulative();
        self
    }

    fn rebuild_cumulative(&mut self) {
        self.cumulative = self
            .weights
            .iter()
            .scan(0.0, |acc, &w| {
                *acc += w;
                Some(*acc)
            })
            .collect();
    }

    #[inline]
    fn boundary(&self, i: usize, j: usize) -> f64 {
        let (u, w) = (&self.means, &self.weights);
        u[i] + (u[j] - u[i]) * w[i] / (w[i] + w[j])
    }

    /// Estimates the `q`-quantile, merging staged points first
    ///
    /// # Arguments
    ///
    /// * `q` - Quantile in `[0, 1]`; values outside are clamped to the extremes
    ///
    /// # Returns
    ///
    /// * `Option<f64>` - `None` if the digest is empty
    pub fn quantile(&mut self, q: f64) -> Option<f64> {
        self.flush();
        if self.total <= 0.0 {
            return None;
        }
        if q <= 0.0 {
            return Some(self.min);
        }
        if q >= 1.0 {
            return Some(self.max);
        }
        let last = self.means.len().checked_sub(1)?;
        if last == 0 {
            return Some(self.means[0]);
        }

        let qsum = q * self.total;
        let i = bisect(&self.cumulative, &qsum).min(last);
        let left = if i > 0 { self.boundary(i - 1, i) } else { self.min };
        let right = if i < last {
            self.boundary(i, i + 1)
        } else {
            self.max
        };
        let before = if i > 0 { self.cumulative[i - 1] } else { 0.0 };
        Some(left + (right - left) * (qsum - before) / self.weights[i])
    }

    /// Drops every point
    pub fn reset(&mut self) {
        self.means.clear();
        self.weights.clear();
        self.cumulative.clear();
        self.staged.clear();
        self.total = 0.0;
        self.staged_weight = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
    }

    /// Projects the merged centroids as
    /// `{"compression", "count", "min", "max", "centroids": [{mean, weight}]}`
    pub fn to_json(&self) -> Value {
        let centroids: Vec<Centroid> = self
            .means
            .iter()
            .zip(&self.weights)
            .map(|(&mean, &weight)| Centroid { mean, weight })
            .collect();
        json!({
            "compression": self.compression,
            "count": self.count(),
            "min": self.min(),
            "max": self.max(),
            "centroids": centroids,
        })
    }
}

impl Default for TDigest {
    fn default() -> Self {
        Self {
            compression: 100.0,
            means: Vec::new(),
            weights: Vec::new(),
            cumulative: Vec::new(),
            total: 0.0,
            staged: Vec::new(),
            staged_weight: 0.0,
            capacity: staging_capacity(100),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Persist for TDigest {
    const KIND: StateKind = StateKind::TDigest;

    /// Field order: compression, min, max, merged weight, centroid means, centroid weights,
    /// staged weight, staged values, staged weights
    fn encode(&self, enc: &mut Encoder) {
        enc.put_f64(self.compression);
        enc.put_f64(self.min);
        enc.put_f64(self.max);
        enc.put_f64(self.total);
        enc.put_f64s(&self.means);
        enc.put_f64s(&self.weights);
        enc.put_f64(self.staged_weight);
        let (values, weights): (Vec<f64>, Vec<f64>) = self.staged.iter().copied().unzip();
        enc.put_f64s(&values);
        enc.put_f64s(&weights);
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        let compression = dec.get_f64()?;
        let mut digest = Self::new(compression).map_err(|e| StatsError::Decode(e.to_string()))?;
        digest.min = dec.get_f64()?;
        digest.max = dec.get_f64()?;
        digest.total = dec.get_f64()?;
        digest.means = dec.get_f64s()?;
        digest.weights = dec.get_f64s()?;
        digest.staged_weight = dec.get_f64()?;
        let values = dec.get_f64s()?;
        let weights = dec.get_f64s()?;
        let corrupt = |e: StatsError| StatsError::Decode(e.to_string());
        ensure_same_len("centroid means/weights", digest.means.len(), digest.weights.len())
            .map_err(corrupt)?;
        ensure_same_len("staged values/weights", values.len(), weights.len()).map_err(corrupt)?;
        validate_weights("centroid", &digest.means, &digest.weights, digest.total)?;
        validate_weights("staged", &values, &weights, digest.staged_weight)?;
        if digest.total + digest.staged_weight > 0.0
            && (digest.min.is_nan() || digest.max.is_nan() || digest.min > digest.max)
        {
            return Err(StatsError::Decode(format!(
                "range [{}, {}] is empty",
                digest.min, digest.max
            )));
        }
        digest.staged = values.into_iter().zip(weights).collect();
        digest.rebuild_cumulative();
        Ok(digest)
    }
}

/// Points must be present exactly when `total` is positive, with weights adding up to it
fn validate_weights(what: &str, values: &[f64], weights: &[f64], total: f64) -> StatsResult<()> {
    if values.iter().any(|v| v.is_nan()) {
        return Err(StatsError::Decode(format!("NaN {what} value")));
    }
    if weights.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
        return Err(StatsError::Decode(format!("non-positive {what} weight")));
    }
    let sum: f64 = weights.iter().sum();
    if !total.is_finite() || (weights.is_empty() != (total == 0.0)) {
        return Err(StatsError::Decode(format!(
            "{what} weight {total} with {} points",
            weights.len()
        )));
    }
    if (sum - total).abs() > 1e-9 * total.max(1.0) {
        return Err(StatsError::Decode(format!(
            "{what} weights add up to {sum}, expected {total}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn staging_capacity_matches_threshold() {
        assert_eq!(staging_capacity(100), 23);
        assert_eq!(staging_capacity(1), 1);
        assert_eq!(staging_capacity(2), 2);
    }

    #[test]
    fn empty_digest_has_no_quantile() {
        let mut td = TDigest::default();
        assert_eq!(td.quantile(0.5), None);
        assert_eq!(td.min(), None);
    }

    #[test]
    fn uniform_sample_median() {
        let mut rng = StdRng::seed_from_u64(2024);
        let mut td = TDigest::new(100.0).unwrap();
        for _ in 0..100_000 {
            td.update(rng.gen_range(0.0..1.0)).unwrap();
        }
        assert_approx_eq!(td.quantile(0.5).unwrap(), 0.5, 0.01);
        assert_approx_eq!(td.quantile(0.1).unwrap(), 0.1, 0.01);
        assert_approx_eq!(td.quantile(0.99).unwrap(), 0.99, 0.005);
        assert_eq!(td.quantile(0.0), td.min());
        assert_eq!(td.quantile(1.0), td.max());
        assert_eq!(td.count(), 100_000.0);
        assert!(td.cluster_count() <= 200);
    }

    #[test]
    fn quantiles_are_monotonic() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut td = TDigest::new(50.0).unwrap();
        for _ in 0..10_000 {
            let x: f64 = rng.gen_range(-3.0..3.0);
            td.update(x * x * x).unwrap();
        }
        let mut prev = f64::NEG_INFINITY;
        for i in 0..=100 {
            let q = td.quantile(i as f64 / 100.0).unwrap();
            assert!(q >= prev, "quantile {i} went backwards");
            prev = q;
        }
    }

    #[test]
    fn single_point() {
        let mut td = TDigest::default();
        td.update(4.0).unwrap();
        assert_eq!(td.quantile(0.3), Some(4.0));
        assert_eq!(td.cluster_count(), 1);
    }

    #[test]
    fn weighted_points_shift_the_median() {
        let mut td = TDigest::new(100.0).unwrap();
        td.update_weighted(1.0, 1.0).unwrap();
        td.update_weighted(10.0, 99.0).unwrap();
        assert!(td.quantile(0.5).unwrap() > 5.0);
        assert_eq!(td.count(), 100.0);
    }

    #[test]
    fn invalid_input_is_rejected() {
        assert!(TDigest::new(0.5).is_err());
        let mut td = TDigest::default();
        assert!(td.update(f64::NAN).is_err());
        assert!(td.update_weighted(1.0, 0.0).is_err());
        assert_eq!(td.count(), 0.0);
    }

    #[test]
    fn json_projection() {
        let mut td = TDigest::from_json(&json!({})).unwrap();
        td.update(2.0).unwrap().flush();
        assert_eq!(
            td.to_json(),
            json!({
                "compression": 100.0,
                "count": 1.0,
                "min": 2.0,
                "max": 2.0,
                "centroids": [{"mean": 2.0, "weight": 1.0}],
            })
        );
    }
}
