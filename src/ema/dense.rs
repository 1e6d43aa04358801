use serde_json::Value;
use tracing::debug;

use super::{Decay, EmaKind};
use crate::config::{EmaParams, parse};
use crate::traits::{Persist, StateKind, WindowStatistic};
use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::{dot, ensure_same_len};
use crate::{StatsError, StatsResult};

/// # Exponential Moving Average
///
/// Irregularly sampled exponential moving average.
///
/// Each new observation at `t` blends the previous average with the previous and the new raw
/// value:
///
/// ```text
/// alpha = (t - t_prev) / interval * -ln(decay)      (or (t - t_prev) / interval when decay is 0)
/// mi    = exp(-alpha)
/// ema   = mi * ema + (ni - mi) * last + (1 - ni) * value
/// ```
///
/// where `ni` depends on the [`EmaKind`]. Points are buffered until one arrives more than
/// `init_window` milliseconds after the first; the average is then seeded with their
/// exponentially weighted mean. Evictions are ignored: the average forgets through decay only.
#[derive(Debug, Clone)]
pub struct Ema {
    decay: Decay,
    initialized: bool,
    ema: f64,
    last_value: f64,
    timestamp: u64,
    init_values: Vec<f64>,
    init_times: Vec<u64>,
}

impl Ema {
    /// Creates a new average
    ///
    /// # Arguments
    ///
    /// * `kind` - Interpolation policy between observations
    /// * `interval` - Averaging interval in milliseconds, positive
    /// * `decay` - Decay per interval in `[0, 1)`
    /// * `init_window` - Warm-up span in milliseconds
    ///
    /// # Returns
    ///
    /// * `StatsResult<Self>` - The average, or `InvalidConfig`
    pub fn new(kind: EmaKind, interval: f64, decay: f64, init_window: u64) -> StatsResult<Self> {
        Ok(Self::with_decay(Decay::new(kind, interval, decay, init_window)?))
    }

    fn with_decay(decay: Decay) -> Self {
        Self {
            decay,
            initialized: false,
            ema: 0.0,
            last_value: 0.0,
            timestamp: 0,
            init_values: Vec::new(),
            init_times: Vec::new(),
        }
    }

    /// Creates a new average from typed parameters
    pub fn from_params(params: &EmaParams) -> StatsResult<Self> {
        Decay::from_params(params).map(Self::with_decay)
    }

    /// Creates a new average from a JSON object such as
    /// `{"emaType": "linear", "interval": 60000, "initWindow": 10000}`
    pub fn from_json(params: &Value) -> StatsResult<Self> {
        let params: EmaParams = parse(params)?;
        debug!(?params, "ema from json");
        Self::from_params(&params)
    }

    /// Returns the interpolation policy
    #[inline]
    pub const fn kind(&self) -> EmaKind {
        self.decay.kind
    }

    /// Returns the current average
    ///
    /// # Returns
    ///
    /// * `Option<f64>` - `None` while warming up
    #[inline]
    pub fn ema(&self) -> Option<f64> {
        self.initialized.then_some(self.ema)
    }

    /// Returns true once the warm-up is over
    #[inline]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns true if the average diverged to NaN
    pub fn has_nan(&self) -> bool {
        self.ema.is_nan() || self.last_value.is_nan()
    }

    #[inline]
    fn started(&self) -> bool {
        self.initialized || !self.init_times.is_empty()
    }

    fn push_point(&mut self, value: f64, timestamp: u64) {
        if self.initialized {
            let (mi, ni) = self.decay.coefficients(timestamp - self.timestamp);
            self.ema = mi * self.ema + (ni - mi) * self.last_value + (1.0 - ni) * value;
        } else {
            self.init_values.push(value);
            self.init_times.push(timestamp);
            let first = self.init_times[0];
            if self.decay.init_window == 0
                || timestamp.saturating_sub(first) > self.decay.init_window
            {
                let weights = self.decay.seed_weights(&self.init_times, timestamp);
                self.ema = dot(&weights, &self.init_values);
                debug!(
                    points = self.init_values.len(),
                    ema = self.ema,
                    "ema warm-up complete"
                );
                self.init_values.clear();
                self.init_times.clear();
                self.initialized = true;
            }
        }
        self.last_value = value;
        self.timestamp = timestamp;
    }
}

impl WindowStatistic for Ema {
    fn update_batch(
        &mut self,
        values: &[f64],
        timestamps: &[u64],
        _evicted_values: &[f64],
        _evicted_timestamps: &[u64],
    ) -> StatsResult<&mut Self> {
        ensure_same_len("values/timestamps", values.len(), timestamps.len())?;
        let mut points: Vec<(u64, f64)> = timestamps
            .iter()
            .copied()
            .zip(values.iter().copied())
            .collect();
        points.sort_by_key(|&(ts, _)| ts);
        if let Some(&(oldest, _)) = points.first()
            && self.started()
            && oldest < self.timestamp
        {
            return Err(StatsError::OutOfOrderPoint {
                timestamp: oldest,
                last: self.timestamp,
            });
        }
        for (ts, value) in points {
            self.push_point(value, ts);
        }
        Ok(self)
    }

    fn value(&self) -> Option<f64> {
        self.ema()
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn reset(&mut self) {
        *self = Self::with_decay(self.decay);
    }
}

impl Persist for Ema {
    const KIND: StateKind = StateKind::Ema;

    /// Field order: policy tag, interval, decay, init window, initialized, ema, last value,
    /// timestamp, buffered values, buffered timestamps
    fn encode(&self, enc: &mut Encoder) {
        self.decay.encode(enc);
        enc.put_bool(self.initialized);
        enc.put_f64(self.ema);
        enc.put_f64(self.last_value);
        enc.put_u64(self.timestamp);
        enc.put_f64s(&self.init_values);
        enc.put_u64s(&self.init_times);
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        let decay = Decay::decode(dec)?;
        let initialized = dec.get_bool()?;
        let ema = dec.get_f64()?;
        let last_value = dec.get_f64()?;
        let timestamp = dec.get_u64()?;
        let init_values = dec.get_f64s()?;
        let init_times = dec.get_u64s()?;
        ensure_same_len("buffered values/timestamps", init_values.len(), init_times.len())
            .map_err(|e| StatsError::Decode(e.to_string()))?;
        Ok(Self {
            decay,
            initialized,
            ema,
            last_value,
            timestamp,
            init_values,
            init_times,
        })
    }
}
