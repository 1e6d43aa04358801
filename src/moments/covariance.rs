use crate::traits::{Persist, StateKind};
use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::ensure_same_len;
use crate::{StatsError, StatsResult};

/// # Window Covariance
///
/// Co-moment of two paired series over an externally managed window.
///
/// The state is the live count, the running sums `Sx`, `Sy` and the co-moment
/// `C = Σ (x - mean_x)(y - mean_y)`. With `n` the count after the insert and the sums already
/// including the new pair, an insert adds
///
/// ```text
/// n / (n - 1) * (x - Sx / n) * (y - Sy / n)
/// ```
///
/// A delete evaluates the same expression with the count and sums from before the removal
/// (`n = count + 1` relative to the state it leaves behind) and subtracts it, which retraces
/// the insert exactly.
#[derive(Debug, Clone, Default)]
pub struct Covariance {
    count: u64,
    sum_x: f64,
    sum_y: f64,
    m2: f64,
    /// Delta Degrees of Freedom
    ddof: bool,
    timestamp: u64,
}

impl Covariance {
    /// Creates an empty covariance reporting the population form
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Delta Degrees of Freedom
    ///
    /// # Arguments
    ///
    /// * `ddof` - True for the sample form (`C / (n - 1)`), false for the population form
    ///
    /// # Returns
    ///
    /// * `&mut Self` - The statistics object
    #[inline]
    pub fn set_ddof(&mut self, ddof: bool) -> &mut Self {
        self.ddof = ddof;
        self
    }

    /// Returns the Delta Degrees of Freedom
    #[inline]
    pub const fn ddof(&self) -> bool {
        self.ddof
    }

    /// Returns the number of live pairs
    #[inline]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Returns the running co-moment
    #[inline]
    pub const fn m2(&self) -> f64 {
        self.m2
    }

    /// Returns the mean of the first series
    pub fn mean_x(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum_x / self.count as f64)
    }

    /// Returns the mean of the second series
    pub fn mean_y(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum_y / self.count as f64)
    }

    /// Returns the covariance of the live window
    ///
    /// # Returns
    ///
    /// * `Option<f64>` - `None` if the window is empty, or holds a single pair with `ddof` set
    pub fn covariance(&self) -> Option<f64> {
        let n = self.count.saturating_sub(u64::from(self.ddof));
        (self.count > 0 && n > 0).then(|| self.m2 / n as f64)
    }

    /// Returns the newest timestamp seen
    #[inline]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[inline]
    fn co_moment_delta(n: u64, sum_x: f64, sum_y: f64, x: f64, y: f64) -> f64 {
        if n < 2 {
            return 0.0;
        }
        let n = n as f64;
        n / (n - 1.0) * (x - sum_x / n) * (y - sum_y / n)
    }

    fn insert(&mut self, x: f64, y: f64) {
        self.count += 1;
        self.sum_x += x;
        self.sum_y += y;
        self.m2 += Self::co_moment_delta(self.count, self.sum_x, self.sum_y, x, y);
    }

    fn delete(&mut self, x: f64, y: f64) {
        self.m2 -= Self::co_moment_delta(self.count, self.sum_x, self.sum_y, x, y);
        self.count -= 1;
        if self.count == 0 {
            self.sum_x = 0.0;
            self.sum_y = 0.0;
            self.m2 = 0.0;
        } else {
            self.sum_x -= x;
            self.sum_y -= y;
        }
    }

    /// Applies a batch of paired window changes
    ///
    /// Evicted pairs are removed before new pairs are added.
    ///
    /// # Arguments
    ///
    /// * `xs` - First coordinates entering the window
    /// * `ys` - Second coordinates entering the window
    /// * `timestamps` - Timestamps of the entering pairs
    /// * `evicted_xs` - First coordinates leaving the window
    /// * `evicted_ys` - Second coordinates leaving the window
    ///
    /// # Returns
    ///
    /// * `StatsResult<&mut Self>` - The statistics object, unchanged on error
    pub fn update_batch(
        &mut self,
        xs: &[f64],
        ys: &[f64],
        timestamps: &[u64],
        evicted_xs: &[f64],
        evicted_ys: &[f64],
    ) -> StatsResult<&mut Self> {
        ensure_same_len("xs/ys", xs.len(), ys.len())?;
        ensure_same_len("xs/timestamps", xs.len(), timestamps.len())?;
        ensure_same_len("evicted xs/ys", evicted_xs.len(), evicted_ys.len())?;
        if (evicted_xs.len() as u64) > self.count {
            return Err(StatsError::EmptyAggregate("covariance"));
        }
        for (&x, &y) in evicted_xs.iter().zip(evicted_ys) {
            self.delete(x, y);
        }
        for (&x, &y) in xs.iter().zip(ys) {
            self.insert(x, y);
        }
        if let Some(&ts) = timestamps.iter().max() {
            self.timestamp = self.timestamp.max(ts);
        }
        Ok(self)
    }

    /// Applies one new pair together with the pairs that left the window
    pub fn update(
        &mut self,
        x: f64,
        y: f64,
        timestamp: u64,
        evicted_xs: &[f64],
        evicted_ys: &[f64],
    ) -> StatsResult<&mut Self> {
        self.update_batch(&[x], &[y], &[timestamp], evicted_xs, evicted_ys)
    }

    /// Returns the aggregate to its empty state, keeping `ddof`
    pub fn reset(&mut self) -> &mut Self {
        let ddof = self.ddof;
        *self = Self::default();
        self.ddof = ddof;
        self
    }
}

impl Persist for Covariance {
    const KIND: StateKind = StateKind::Covariance;

    /// Field order: count, sum x, sum y, co-moment, ddof, timestamp
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u64(self.count);
        enc.put_f64(self.sum_x);
        enc.put_f64(self.sum_y);
        enc.put_f64(self.m2);
        enc.put_bool(self.ddof);
        enc.put_u64(self.timestamp);
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        Ok(Self {
            count: dec.get_u64()?,
            sum_x: dec.get_f64()?,
            sum_y: dec.get_f64()?,
            m2: dec.get_f64()?,
            ddof: dec.get_bool()?,
            timestamp: dec.get_u64()?,
        })
    }
}
