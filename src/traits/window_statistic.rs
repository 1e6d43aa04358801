use crate::StatsResult;

/// Update contract for scalar aggregates driven by an external window
///
/// The window manager decides which values enter and leave; the aggregate only receives the
/// deltas. Every implementor accepts a batch of new values together with the values (and their
/// timestamps) that left the window since the previous call, and reports its statistic in
/// bounded time independent of the window length.
pub trait WindowStatistic {
    /// Applies a batch of window changes
    ///
    /// `values` and `timestamps` are parallel slices of the points entering the window.
    /// `evicted_values` and `evicted_timestamps` describe the points that left it; each
    /// aggregate consumes the half it needs (extremum trackers use the timestamps, moment
    /// trackers the values).
    ///
    /// # Arguments
    ///
    /// * `values` - Values entering the window
    /// * `timestamps` - Timestamps of the entering values, in milliseconds
    /// * `evicted_values` - Values leaving the window
    /// * `evicted_timestamps` - Timestamps of the leaving values
    ///
    /// # Returns
    ///
    /// * `StatsResult<&mut Self>` - The updated aggregate, or the violated precondition. On
    ///   error the aggregate is unchanged.
    fn update_batch(
        &mut self,
        values: &[f64],
        timestamps: &[u64],
        evicted_values: &[f64],
        evicted_timestamps: &[u64],
    ) -> StatsResult<&mut Self>
    where
        Self: Sized;

    /// Applies a single new value together with the values that left the window
    ///
    /// Equivalent to [`WindowStatistic::update_batch`] with one-element slices, so the scalar
    /// and batch paths always produce identical state.
    ///
    /// # Examples
    ///
    /// ```
    /// # use stream_stats::{Mean, WindowStatistic};
    /// let mut mean = Mean::new();
    /// mean.update(1.0, 10, &[], &[]).unwrap();
    /// mean.update(3.0, 20, &[], &[]).unwrap();
    /// assert_eq!(mean.value(), Some(2.0));
    ///
    /// // 1.0 leaves the window as 5.0 enters
    /// mean.update(5.0, 30, &[1.0], &[10]).unwrap();
    /// assert_eq!(mean.value(), Some(4.0));
    /// ```
    fn update(
        &mut self,
        value: f64,
        timestamp: u64,
        evicted_values: &[f64],
        evicted_timestamps: &[u64],
    ) -> StatsResult<&mut Self>
    where
        Self: Sized,
    {
        self.update_batch(&[value], &[timestamp], evicted_values, evicted_timestamps)
    }

    /// Returns the current statistic, or `None` when it is undefined (e.g. an empty extremum)
    fn value(&self) -> Option<f64>;

    /// Returns the newest timestamp seen by the aggregate
    fn timestamp(&self) -> u64;

    /// Returns the aggregate to its freshly constructed state
    fn reset(&mut self);
}
