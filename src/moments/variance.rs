use crate::traits::{Persist, StateKind, WindowStatistic};
use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::ensure_same_len;
use crate::{StatsError, StatsResult};

/// # Window Variance
///
/// One-pass Welford variance of an externally managed window with exact reverse updates.
///
/// The state is the live count, the running mean and `M2`, the sum of squared deviations from
/// the mean. An insert of `x` performs
///
/// ```text
/// n += 1; d = x - mean; mean += d / n; M2 += d * (x - mean)
/// ```
///
/// and a delete retraces the same steps backwards. The reported variance is derived on demand
/// from `M2`, so the population and sample forms share one state.
#[derive(Debug, Clone, Default)]
pub struct Variance {
    count: u64,
    mean: f64,
    m2: f64,
    /// Delta Degrees of Freedom
    ddof: bool,
    timestamp: u64,
}

impl Variance {
    /// Creates an empty variance reporting the population form
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the Delta Degrees of Freedom
    ///
    /// # Returns
    ///
    /// * `bool` - True if the sample form (`M2 / (n - 1)`) is reported
    #[inline]
    pub const fn ddof(&self) -> bool {
        self.ddof
    }

    /// Sets the Delta Degrees of Freedom
    ///
    /// # Arguments
    ///
    /// * `ddof` - True for the sample form, false for the population form
    ///
    /// # Returns
    ///
    /// * `&mut Self` - The statistics object
    #[inline]
    pub fn set_ddof(&mut self, ddof: bool) -> &mut Self {
        self.ddof = ddof;
        self
    }

    /// Returns the number of live values
    #[inline]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Returns the running mean (zero when empty)
    #[inline]
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// Returns the running sum of squared deviations
    #[inline]
    pub const fn m2(&self) -> f64 {
        self.m2
    }

    /// Returns the variance of the live window
    ///
    /// # Returns
    ///
    /// * `Option<f64>` - `None` if the window is empty, or holds a single value with `ddof` set
    pub fn variance(&self) -> Option<f64> {
        let n = self.count.saturating_sub(u64::from(self.ddof));
        (self.count > 0 && n > 0).then(|| self.m2 / n as f64)
    }

    /// Returns the standard deviation of the live window
    ///
    /// # Returns
    ///
    /// * `Option<f64>` - Square root of [`Variance::variance`]
    pub fn stddev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    #[inline]
    fn insert(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    #[inline]
    fn delete(&mut self, x: f64) {
        self.count -= 1;
        if self.count == 0 {
            self.mean = 0.0;
            self.m2 = 0.0;
        } else {
            let delta = x - self.mean;
            self.mean -= delta / self.count as f64;
            self.m2 -= delta * (x - self.mean);
        }
    }
}

impl WindowStatistic for Variance {
    fn update_batch(
        &mut self,
        values: &[f64],
        timestamps: &[u64],
        evicted_values: &[f64],
        _evicted_timestamps: &[u64],
    ) -> StatsResult<&mut Self> {
        ensure_same_len("values/timestamps", values.len(), timestamps.len())?;
        if (evicted_values.len() as u64) > self.count {
            return Err(StatsError::EmptyAggregate("variance"));
        }
        evicted_values.iter().for_each(|&x| self.delete(x));
        values.iter().for_each(|&x| self.insert(x));
        if let Some(&ts) = timestamps.iter().max() {
            self.timestamp = self.timestamp.max(ts);
        }
        Ok(self)
    }

    fn value(&self) -> Option<f64> {
        self.variance()
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn reset(&mut self) {
        let ddof = self.ddof;
        *self = Self::default();
        self.ddof = ddof;
    }
}

impl Persist for Variance {
    const KIND: StateKind = StateKind::Variance;

    /// Field order: count, mean, M2, ddof, timestamp
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u64(self.count);
        enc.put_f64(self.mean);
        enc.put_f64(self.m2);
        enc.put_bool(self.ddof);
        enc.put_u64(self.timestamp);
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        Ok(Self {
            count: dec.get_u64()?,
            mean: dec.get_f64()?,
            m2: dec.get_f64()?,
            ddof: dec.get_bool()?,
            timestamp: dec.get_u64()?,
        })
    }
}
