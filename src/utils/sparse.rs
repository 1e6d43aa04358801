use serde::Serialize;
use serde_json::Value;

use crate::utils::codec::{Decoder, Encoder};
use crate::{StatsError, StatsResult};

/// A sparse vector stored as `(index, value)` pairs sorted by index
///
/// Indices are unique; missing indices are implicit zeros.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(u32, f64)>,
}

#[derive(Serialize)]
struct SparseEntry {
    index: u32,
    value: f64,
}

impl SparseVector {
    /// Creates an empty sparse vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a sparse vector from `(index, value)` pairs in any order
    ///
    /// # Arguments
    ///
    /// * `entries` - The non-zero coordinates
    ///
    /// # Returns
    ///
    /// * `StatsResult<Self>` - The vector, or `InvalidConfig` if an index repeats or a value is NaN
    pub fn from_pairs(entries: impl IntoIterator<Item = (u32, f64)>) -> StatsResult<Self> {
        let mut entries: Vec<_> = entries.into_iter().collect();
        if entries.iter().any(|(_, v)| v.is_nan()) {
            return Err(StatsError::NanValue("sparse vector"));
        }
        entries.sort_unstable_by_key(|&(idx, _)| idx);
        if let Some(w) = entries.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(StatsError::config(format!(
                "duplicate sparse index {}",
                w[0].0
            )));
        }
        Ok(Self { entries })
    }

    /// Returns the number of stored coordinates
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no coordinate is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value at `index` (zero if not stored)
    pub fn get(&self, index: u32) -> f64 {
        self.entries
            .binary_search_by_key(&index, |&(idx, _)| idx)
            .map_or(0.0, |pos| self.entries[pos].1)
    }

    /// Iterates over the stored coordinates in index order
    pub fn iter(&self) -> impl Iterator<Item = &(u32, f64)> {
        self.entries.iter()
    }

    /// Returns the largest stored index, if any
    pub fn max_index(&self) -> Option<u32> {
        self.entries.last().map(|&(idx, _)| idx)
    }

    /// Computes `a * x + b * y` by merging the two index lists
    ///
    /// # Arguments
    ///
    /// * `a` - Scale of `x`
    /// * `x` - First vector
    /// * `b` - Scale of `y`
    /// * `y` - Second vector
    ///
    /// # Returns
    ///
    /// * `SparseVector` - The linear combination; coordinates present in either input are kept
    pub fn lin_comb(a: f64, x: &SparseVector, b: f64, y: &SparseVector) -> SparseVector {
        let (xs, ys) = (&x.entries, &y.entries);
        let mut entries = Vec::with_capacity(xs.len() + ys.len());
        let (mut i, mut j) = (0, 0);
        while i < xs.len() && j < ys.len() {
            let (xi, xv) = xs[i];
            let (yi, yv) = ys[j];
            if xi < yi {
                entries.push((xi, a * xv));
                i += 1;
            } else if yi < xi {
                entries.push((yi, b * yv));
                j += 1;
            } else {
                entries.push((xi, a * xv + b * yv));
                i += 1;
                j += 1;
            }
        }
        entries.extend(xs[i..].iter().map(|&(idx, v)| (idx, a * v)));
        entries.extend(ys[j..].iter().map(|&(idx, v)| (idx, b * v)));
        SparseVector { entries }
    }

    /// Drops every coordinate whose magnitude is below `cutoff`
    pub fn prune(&mut self, cutoff: f64) {
        self.entries.retain(|&(_, v)| v.abs() >= cutoff);
    }

    /// Returns true if any stored coordinate is NaN
    pub fn has_nan(&self) -> bool {
        self.entries.iter().any(|(_, v)| v.is_nan())
    }

    /// Projects the vector as a JSON array of `{index, value}` objects
    pub fn to_json(&self) -> Value {
        let entries: Vec<_> = self
            .entries
            .iter()
            .map(|&(index, value)| SparseEntry { index, value })
            .collect();
        serde_json::to_value(entries).unwrap_or(Value::Null)
    }

    pub(crate) fn encode(&self, enc: &mut Encoder) {
        enc.put_len(self.entries.len());
        for &(idx, v) in &self.entries {
            enc.put_u32(idx);
            enc.put_f64(v);
        }
    }

    pub(crate) fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        let len = dec.get_len(12)?;
        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
            entries.push((dec.get_u32()?, dec.get_f64()?));
        }
        if entries.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(StatsError::Decode(
                "sparse indices are not strictly increasing".to_string(),
            ));
        }
        Ok(Self { entries })
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
    fn from_pairs_sorts_and_rejects_duplicates() {
        let v = sv(&[(5, 1.0), (1, 2.0)]);
        assert_eq!(v.iter().copied().collect::<Vec<_>>(), vec![(1, 2.0), (5, 1.0)]);
        assert!(SparseVector::from_pairs([(1, 1.0), (1, 2.0)]).is_err());
        assert!(SparseVector::from_pairs([(1, f64::NAN)]).is_err());
    }

    #[test]
    fn lin_comb_merges_indices() {
        let x = sv(&[(0, 1.0), (2, 2.0), (7, 4.0)]);
        let y = sv(&[(2, 1.0), (3, 3.0)]);
        let z = SparseVector::lin_comb(2.0, &x, -1.0, &y);
        assert_eq!(
            z.iter().copied().collect::<Vec<_>>(),
            vec![(0, 2.0), (2, 3.0), (3, -3.0), (7, 8.0)]
        );
        assert_eq!(z.get(3), -3.0);
        assert_eq!(z.get(4), 0.0);
    }

    #[test]
    fn prune_drops_small_coordinates() {
        let mut v = sv(&[(0, 0.5), (1, -0.00001), (2, 0.0001)]);
        v.prune(0.0001);
        assert_eq!(v.iter().copied().collect::<Vec<_>>(), vec![(0, 0.5), (2, 0.0001)]);
    }

    #[test]
    fn json_projection_lists_pairs() {
        let v = sv(&[(3, 1.5)]);
        assert_eq!(v.to_json(), serde_json::json!([{"index": 3, "value": 1.5}]));
    }
}
