use ahash::RandomState;
use hashbrown::HashMap;
use serde_json::{Value, json};
use tracing::debug;

use super::OnlineHistogram;
use crate::config::{HistogramParams, SlottedHistogramParams, parse};
use crate::traits::{Persist, StateKind};
use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::ensure_same_len;
use crate::{StatsError, StatsResult};

/// # Slotted Histogram
///
/// A repeating period (for example one day) split into equal time slots, each counting its
/// values in an independent [`OnlineHistogram`]. A value observed at `t` lands in slot
/// `(t / slot) % (period / slot)`, so the same time of every period shares one histogram.
#[derive(Debug, Clone)]
pub struct SlottedHistogram {
    period: u64,
    slot: u64,
    slots: Vec<OnlineHistogram>,
}

impl SlottedHistogram {
    /// Creates a slotted histogram from typed parameters
    ///
    /// # Arguments
    ///
    /// * `params` - Period and slot width in milliseconds, bin count and optional bounds
    ///
    /// # Returns
    ///
    /// * `StatsResult<Self>` - The histogram, or `InvalidConfig` if the slot width is zero or
    ///   does not divide the period
    pub fn from_params(params: &SlottedHistogramParams) -> StatsResult<Self> {
        if params.period == 0 || params.slot == 0 {
            return Err(StatsError::config("period and slot must be positive"));
        }
        if params.period % params.slot != 0 {
            return Err(StatsError::config(format!(
                "slot {} does not divide period {}",
                params.slot, params.period
            )));
        }
        let hist = OnlineHistogram::from_params(&HistogramParams {
            lower_bound: params.lower_bound.unwrap_or(0.0),
            upper_bound: params.upper_bound.unwrap_or(params.bins as f64),
            bins: params.bins,
            add_neg_inf: false,
            add_pos_inf: false,
        })?;
        let slots = vec![hist; (params.period / params.slot) as usize];
        Ok(Self {
            period: params.period,
            slot: params.slot,
            slots,
        })
    }

    /// Creates a slotted histogram from a JSON object such as
    /// `{"period": 86400000, "slot": 3600000, "bins": 10}`
    pub fn from_json(params: &Value) -> StatsResult<Self> {
        let params: SlottedHistogramParams = parse(params)?;
        debug!(?params, "slotted histogram from json");
        Self::from_params(&params)
    }

    /// Returns the period in milliseconds
    #[inline]
    pub const fn period(&self) -> u64 {
        self.period
    }

    /// Returns the slot width in milliseconds
    #[inline]
    pub const fn slot(&self) -> u64 {
        self.slot
    }

    /// Returns the histogram of every slot
    #[inline]
    pub fn slots(&self) -> &[OnlineHistogram] {
        &self.slots
    }

    #[inline]
    fn slot_index(&self, timestamp: u64) -> usize {
        ((timestamp / self.slot) % self.slots.len() as u64) as usize
    }

    /// Counts `value` in the slot of `timestamp`
    pub fn add(&mut self, value: f64, timestamp: u64) -> &mut Self {
        let idx = self.slot_index(timestamp);
        self.slots[idx].increment(value);
        self
    }

    /// Uncounts `value` from the slot of `timestamp`
    ///
    /// # Returns
    ///
    /// * `StatsResult<&mut Self>` - `EmptyAggregate` if the bin is already empty
    pub fn remove(&mut self, value: f64, timestamp: u64) -> StatsResult<&mut Self> {
        let idx = self.slot_index(timestamp);
        self.slots[idx].decrement(value)?;
        Ok(self)
    }

    /// Applies a batch of window changes, validated as a whole before any slot changes
    ///
    /// # Arguments
    ///
    /// * `values` - Values entering the window
    /// * `timestamps` - Timestamps of the entering values
    /// * `evicted_values` - Values leaving the window
    /// * `evicted_timestamps` - Timestamps of the leaving values
    pub fn update(
        &mut self,
        values: &[f64],
        timestamps: &[u64],
        evicted_values: &[f64],
        evicted_timestamps: &[u64],
    ) -> StatsResult<&mut Self> {
        ensure_same_len("values/timestamps", values.len(), timestamps.len())?;
        ensure_same_len(
            "evicted values/timestamps",
            evicted_values.len(),
            evicted_timestamps.len(),
        )?;

        let mut per_slot: HashMap<usize, (Vec<f64>, Vec<f64>), RandomState> =
            HashMap::with_hasher(RandomState::new());
        for (&v, &ts) in values.iter().zip(timestamps) {
            per_slot.entry(self.slot_index(ts)).or_default().0.push(v);
        }
        for (&v, &ts) in evicted_values.iter().zip(evicted_timestamps) {
            per_slot.entry(self.slot_index(ts)).or_default().1.push(v);
        }

        let mut planned = Vec::with_capacity(per_slot.len());
        for (idx, (added, removed)) in &per_slot {
            let hist = &self.slots[*idx];
            let deltas = hist.deltas(added, removed);
            if deltas
                .iter()
                .any(|(&bin, &delta)| (hist.counts()[bin] as i64) + delta < 0)
            {
                return Err(StatsError::EmptyAggregate("histogram bin"));
            }
            planned.push((*idx, deltas));
        }
        for (idx, deltas) in &planned {
            self.slots[*idx].apply(deltas);
        }
        Ok(self)
    }

    /// Sums the bin counts of every slot touched by `[from, to]`
    ///
    /// Both ends are aligned down to their slot; each slot contributes once even when the range
    /// wraps onto it twice.
    ///
    /// # Returns
    ///
    /// * `StatsResult<Vec<u64>>` - Count per bin, or `InvalidRange` if `to < from` or the range
    ///   spans a full period
    pub fn get_stats(&self, from: u64, to: u64) -> StatsResult<Vec<u64>> {
        if to < from || to - from >= self.period {
            return Err(StatsError::InvalidRange {
                from,
                to,
                period: self.period,
            });
        }
        let mut seen = vec![false; self.slots.len()];
        let mut counts = vec![0; self.slots[0].len()];
        for k in (from / self.slot)..=(to / self.slot) {
            let idx = (k % self.slots.len() as u64) as usize;
            if std::mem::replace(&mut seen[idx], true) {
                continue;
            }
            for (c, &n) in counts.iter_mut().zip(self.slots[idx].counts()) {
                *c += n;
            }
        }
        Ok(counts)
    }

    /// Sets every count of every slot to zero
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(OnlineHistogram::reset);
    }

    /// Projects the histogram as `{"period", "slot", "slots": [{"bounds", "counts"}]}`
    pub fn to_json(&self) -> Value {
        let slots: Vec<Value> = self.slots.iter().map(OnlineHistogram::to_json).collect();
        json!({
            "period": self.period,
            "slot": self.slot,
            "slots": slots,
        })
    }
}

impl Persist for SlottedHistogram {
    const KIND: StateKind = StateKind::SlottedHistogram;

    /// Field order: period, slot width, slot count, then every slot histogram body
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u64(self.period);
        enc.put_u64(self.slot);
        enc.put_len(self.slots.len());
        self.slots.iter().for_each(|h| h.encode(enc));
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        let period = dec.get_u64()?;
        let slot = dec.get_u64()?;
        if slot == 0 || period == 0 || period % slot != 0 {
            return Err(StatsError::Decode(format!(
                "invalid period {period} with slot {slot}"
            )));
        }
        let len = dec.get_len(1)?;
        if len as u64 != period / slot {
            return Err(StatsError::Decode(format!(
                "expected {} slots, got {len}",
                period / slot
            )));
        }
        let mut slots = Vec::with_capacity(len);
        for _ in 0..len {
            slots.push(OnlineHistogram::decode(dec)?);
        }
        Ok(Self {
            period,
            slot,
            slots,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    // a period of 40 ms split into four 10 ms slots, bins [0, 1), [1, 2), [2, 3], over [0, 3]
    fn hist() -> SlottedHistogram {
        SlottedHistogram::from_json(&json!({"period": 40, "slot": 10, "bins": 3})).unwrap()
    }

    #[test]
    fn values_land_in_their_slot() {
        let mut sh = hist();
        sh.add(0.5, 3).add(1.5, 12).add(2.5, 45).add(9.0, 20);
        assert_eq!(sh.slots()[0].counts(), &[1, 0, 1]);
        assert_eq!(sh.slots()[1].counts(), &[0, 1, 0]);
        assert_eq!(sh.slots()[2].total(), 0);

        sh.remove(2.5, 5).unwrap();
        assert_eq!(sh.slots()[0].counts(), &[1, 0, 0]);
        assert!(sh.remove(2.5, 5).is_err());
    }

    #[test]
    fn range_wider_than_period_is_rejected() {
        let sh = hist();
        assert_eq!(
            sh.get_stats(0, 40).unwrap_err(),
            StatsError::InvalidRange {
                from: 0,
                to: 40,
                period: 40
            }
        );
        assert!(sh.get_stats(20, 10).is_err());
        assert!(sh.get_stats(0, 39).is_ok());
    }

    #[test]
    fn range_query_sums_covered_slots() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut sh = hist();
        for _ in 0..500 {
            sh.add(rng.gen_range(0.0..3.0), rng.gen_range(0..400));
        }
        for _ in 0..200 {
            let from = rng.gen_range(0..400u64);
            let to = from + rng.gen_range(0..40u64);
            let expected = if to - from >= 40 {
                None
            } else {
                let mut slots: Vec<usize> = ((from / 10)..=(to / 10))
                    .map(|k| (k % 4) as usize)
                    .collect();
                slots.sort_unstable();
                slots.dedup();
                let mut counts = vec![0u64; 3];
                for s in slots {
                    for (c, n) in counts.iter_mut().zip(sh.slots()[s].counts()) {
                        *c += n;
                    }
                }
                Some(counts)
            };
            assert_eq!(sh.get_stats(from, to).ok(), expected);
        }
    }

    #[test]
    fn wrapped_range_counts_each_slot_once() {
        let mut sh = hist();
        sh.add(0.5, 0);
        // slots 0, 1, 2, 3 and 0 again
        assert_eq!(sh.get_stats(5, 44).unwrap(), vec![1, 0, 0]);
    }

    #[test]
    fn batch_update_is_all_or_nothing() {
        let mut sh = hist();
        sh.update(&[0.5, 1.5], &[1, 11], &[], &[]).unwrap();
        assert!(sh.update(&[2.5], &[21], &[0.5, 0.5], &[1, 2]).is_err());
        assert_eq!(sh.slots()[2].total(), 0);
        sh.update(&[2.5], &[21], &[0.5], &[41]).unwrap();
        assert_eq!(sh.slots()[0].total(), 0);
        assert_eq!(sh.slots()[2].total(), 1);
    }

    #[test]
    fn configuration_is_validated() {
        assert!(SlottedHistogram::from_json(&json!({"period": 40, "slot": 15, "bins": 3})).is_err());
        assert!(SlottedHistogram::from_json(&json!({"period": 40, "slot": 0, "bins": 3})).is_err());
        let sh = SlottedHistogram::from_json(
            &json!({"period": 20, "slot": 10, "bins": 2, "lowerBound": -1.0, "upperBound": 1.0}),
        )
        .unwrap();
        assert_eq!(sh.slots()[0].bounds(), &[-1.0, 0.0, 1.0]);
        assert_eq!(
            sh.to_json()["slots"].as_array().map(Vec::len),
            Some(2)
        );
    }
}
