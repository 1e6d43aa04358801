use crate::extremum::Extremum;
use crate::traits::{Persist, StateKind, WindowStatistic};
use crate::utils::Min;
use crate::utils::codec::{Decoder, Encoder};
use crate::StatsResult;

/// # Window Minimum
///
/// Tracks the minimum of an externally managed window of timestamped values.
///
/// Candidates are held in a monotonic queue whose front is always the minimum of the live
/// window, giving constant-time lookups and amortized constant-time updates. The caller reports
/// which timestamps left the window; every candidate at or before the newest evicted timestamp
/// is dropped. Equal values collapse onto the newest one, so ties always expire the older
/// value first.
#[derive(Debug, Clone)]
pub struct Minimum(Extremum<Min>);

impl Minimum {
    /// Creates an empty minimum tracker
    pub fn new() -> Self {
        Self(Extremum::new("minimum"))
    }

    /// Returns the minimum of the live window
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

impl Default for Minimum {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowStatistic for Minimum {
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

impl Persist for Minimum {
    const KIND: StateKind = StateKind::Minimum;

    fn encode(&self, enc: &mut Encoder) {
        self.0.encode(enc);
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        Extremum::decode("minimum", dec).map(Self)
    }
}
