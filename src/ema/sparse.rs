use serde_json::{Value, json};
use tracing::debug;

use super::Decay;
use crate::config::{SparseEmaParams, parse};
use crate::traits::{Persist, StateKind};
use crate::utils::SparseVector;
use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::ensure_same_len;
use crate::{StatsError, StatsResult};

/// # Sparse Exponential Moving Average
///
/// The [`crate::Ema`] recurrence applied coordinate-wise to sparse vectors. After every update
/// coordinates whose magnitude falls below `cutoff` are dropped, which bounds the size of the
/// average when the active coordinates drift.
#[derive(Debug, Clone)]
pub struct SparseEma {
    decay: Decay,
    cutoff: f64,
    dimension: Option<usize>,
    initialized: bool,
    ema: SparseVector,
    last_value: SparseVector,
    timestamp: u64,
    init_values: Vec<SparseVector>,
    init_times: Vec<u64>,
}

impl SparseEma {
    /// Creates a new sparse average from typed parameters
    ///
    /// # Arguments
    ///
    /// * `params` - Policy, interval, decay, warm-up span, cutoff and optional dimension
    ///
    /// # Returns
    ///
    /// * `StatsResult<Self>` - The average, or `InvalidConfig` / `UnknownType`
    pub fn from_params(params: &SparseEmaParams) -> StatsResult<Self> {
        let decay = Decay::from_params(&params.ema)?;
        if !(params.cutoff.is_finite() && params.cutoff >= 0.0) {
            return Err(StatsError::config(format!(
                "cutoff must be a non-negative number, got {}",
                params.cutoff
            )));
        }
        if params.dimension == Some(0) {
            return Err(StatsError::config("dimension must be positive"));
        }
        Ok(Self {
            decay,
            cutoff: params.cutoff,
            dimension: params.dimension,
            initialized: false,
            ema: SparseVector::new(),
            last_value: SparseVector::new(),
            timestamp: 0,
            init_values: Vec::new(),
            init_times: Vec::new(),
        })
    }

    /// Creates a new sparse average from a JSON object such as
    /// `{"emaType": "next", "interval": 1000, "cutoff": 0.001}`
    pub fn from_json(params: &Value) -> StatsResult<Self> {
        let params: SparseEmaParams = parse(params)?;
        debug!(?params, "sparse ema from json");
        Self::from_params(&params)
    }

    /// Returns the pruning threshold
    #[inline]
    pub const fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Returns the current average
    ///
    /// # Returns
    ///
    /// * `Option<&SparseVector>` - `None` while warming up
    pub fn value(&self) -> Option<&SparseVector> {
        self.initialized.then_some(&self.ema)
    }

    /// Returns the timestamp of the newest point
    #[inline]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Returns true if any coordinate of the average diverged to NaN
    pub fn has_nan(&self) -> bool {
        self.ema.has_nan() || self.last_value.has_nan()
    }

    fn check_dimension(&self, value: &SparseVector) -> StatsResult<()> {
        match (self.dimension, value.max_index()) {
            (Some(dim), Some(idx)) if idx as usize >= dim => Err(StatsError::DimensionMismatch {
                expected: dim,
                actual: idx as usize + 1,
            }),
            _ => Ok(()),
        }
    }

    /// Applies a batch of new vectors
    ///
    /// # Arguments
    ///
    /// * `values` - Vectors entering the window
    /// * `timestamps` - Their timestamps, in any order
    ///
    /// # Returns
    ///
    /// * `StatsResult<&mut Self>` - The statistics object, unchanged on error
    pub fn update_batch(
        &mut self,
        values: &[SparseVector],
        timestamps: &[u64],
    ) -> StatsResult<&mut Self> {
        ensure_same_len("values/timestamps", values.len(), timestamps.len())?;
        for value in values {
            self.check_dimension(value)?;
        }
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by_key(|&i| timestamps[i]);
        let started = self.initialized || !self.init_times.is_empty();
        if let Some(&oldest) = order.first()
            && started
            && timestamps[oldest] < self.timestamp
        {
            return Err(StatsError::OutOfOrderPoint {
                timestamp: timestamps[oldest],
                last: self.timestamp,
            });
        }
        for i in order {
            self.push_point(&values[i], timestamps[i]);
        }
        Ok(self)
    }

    /// Applies one new vector
    pub fn update(&mut self, value: &SparseVector, timestamp: u64) -> StatsResult<&mut Self> {
        self.update_batch(std::slice::from_ref(value), &[timestamp])
    }

    fn push_point(&mut self, value: &SparseVector, timestamp: u64) {
        if self.initialized {
            let (mi, ni) = self.decay.coefficients(timestamp - self.timestamp);
            let carried = SparseVector::lin_comb(mi, &self.ema, ni - mi, &self.last_value);
            self.ema = SparseVector::lin_comb(1.0, &carried, 1.0 - ni, value);
            self.ema.prune(self.cutoff);
        } else {
            self.init_values.push(value.clone());
            self.init_times.push(timestamp);
            let first = self.init_times[0];
            if self.decay.init_window == 0
                || timestamp.saturating_sub(first) > self.decay.init_window
            {
                let weights = self.decay.seed_weights(&self.init_times, timestamp);
                let mut seed = SparseVector::new();
                for (w, v) in weights.iter().zip(&self.init_values) {
                    seed = SparseVector::lin_comb(1.0, &seed, *w, v);
                }
                seed.prune(self.cutoff);
                debug!(
                    points = self.init_values.len(),
                    coordinates = seed.len(),
                    "sparse ema warm-up complete"
                );
                self.ema = seed;
                self.init_values.clear();
                self.init_times.clear();
                self.initialized = true;
            }
        }
        self.last_value = value.clone();
        self.timestamp = timestamp;
    }

    /// Returns the average to its freshly constructed state
    pub fn reset(&mut self) {
        self.initialized = false;
        self.ema = SparseVector::new();
        self.last_value = SparseVector::new();
        self.timestamp = 0;
        self.init_values.clear();
        self.init_times.clear();
    }

    /// Projects the average as `{"value": [{index, value}], "timestamp": ts}`
    pub fn to_json(&self) -> Value {
        json!({
            "value": self.ema.to_json(),
            "timestamp": self.timestamp,
        })
    }
}

impl Persist for SparseEma {
    const KIND: StateKind = StateKind::SparseEma;

    /// Field order: policy tag, interval, decay, init window, cutoff, has dimension, dimension,
    /// initialized, ema, last value, timestamp, buffered vector count, buffered vectors,
    /// buffered timestamps
    fn encode(&self, enc: &mut Encoder) {
        self.decay.encode(enc);
        enc.put_f64(self.cutoff);
        enc.put_bool(self.dimension.is_some());
        enc.put_u64(self.dimension.unwrap_or_default() as u64);
        enc.put_bool(self.initialized);
        self.ema.encode(enc);
        self.last_value.encode(enc);
        enc.put_u64(self.timestamp);
        enc.put_len(self.init_values.len());
        self.init_values.iter().for_each(|v| v.encode(enc));
        enc.put_u64s(&self.init_times);
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        let decay = Decay::decode(dec)?;
        let cutoff = dec.get_f64()?;
        let has_dimension = dec.get_bool()?;
        let dimension = dec.get_u64()? as usize;
        let initialized = dec.get_bool()?;
        let ema = SparseVector::decode(dec)?;
        let last_value = SparseVector::decode(dec)?;
        let timestamp = dec.get_u64()?;
        let len = dec.get_len(8)?;
        let mut init_values = Vec::with_capacity(len);
        for _ in 0..len {
            init_values.push(SparseVector::decode(dec)?);
        }
        let init_times = dec.get_u64s()?;
        ensure_same_len("buffered values/timestamps", init_values.len(), init_times.len())
            .map_err(|e| StatsError::Decode(e.to_string()))?;
        Ok(Self {
            decay,
            cutoff,
            dimension: has_dimension.then_some(dimension),
            initialized,
            ema,
            last_value,
            timestamp,
            init_values,
            init_times,
        })
    }
}
