mod dense;
mod sparse;

pub use dense::Ema;
pub use sparse::SparseEma;

use crate::config::EmaParams;
use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::normalize_l1;
use crate::{StatsError, StatsResult};

/// How the signal is assumed to move between two observations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmaKind {
    /// The previous value holds until the next observation
    Previous,
    /// The signal moves linearly between observations
    Linear,
    /// The next value already holds since the previous observation
    Next,
}

impl EmaKind {
    /// Resolves a policy name (`previous`, `linear`, `next`)
    ///
    /// # Returns
    ///
    /// * `StatsResult<Self>` - `UnknownType` for any other name
    pub fn from_name(name: &str) -> StatsResult<Self> {
        match name {
            "previous" => Ok(Self::Previous),
            "linear" => Ok(Self::Linear),
            "next" => Ok(Self::Next),
            _ => Err(StatsError::unknown("ema type", name)),
        }
    }

    /// Returns the policy name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Previous => "previous",
            Self::Linear => "linear",
            Self::Next => "next",
        }
    }

    pub(crate) const fn tag(self) -> u8 {
        match self {
            Self::Previous => 0,
            Self::Linear => 1,
            Self::Next => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> StatsResult<Self> {
        match tag {
            0 => Ok(Self::Previous),
            1 => Ok(Self::Linear),
            2 => Ok(Self::Next),
            _ => Err(StatsError::Decode(format!("unknown ema type tag {tag}"))),
        }
    }
}

/// Structural parameters shared by the dense and sparse averages
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Decay {
    pub(crate) kind: EmaKind,
    pub(crate) interval: f64,
    pub(crate) decay: f64,
    pub(crate) init_window: u64,
}

impl Decay {
    pub(crate) fn new(
        kind: EmaKind,
        interval: f64,
        decay: f64,
        init_window: u64,
    ) -> StatsResult<Self> {
        if !(interval.is_finite() && interval > 0.0) {
            return Err(StatsError::config(format!(
                "ema interval must be positive, got {interval}"
            )));
        }
        if !(0.0..1.0).contains(&decay) {
            return Err(StatsError::config(format!(
                "ema decay must lie in [0, 1), got {decay}"
            )));
        }
        Ok(Self {
            kind,
            interval,
            decay,
            init_window,
        })
    }

    pub(crate) fn from_params(params: &EmaParams) -> StatsResult<Self> {
        let kind = EmaKind::from_name(&params.ema_type)?;
        Self::new(kind, params.interval, params.decay, params.init_window)
    }

    /// `dt / interval`, scaled by `-ln(decay)` unless the decay is zero
    #[inline]
    pub(crate) fn alpha(&self, dt: f64) -> f64 {
        let alpha = dt / self.interval;
        if self.decay == 0.0 {
            alpha
        } else {
            alpha * -self.decay.ln()
        }
    }

    /// Blend coefficients `(mi, ni)` for a step of `dt` milliseconds
    ///
    /// A zero step counts as one millisecond.
    pub(crate) fn coefficients(&self, dt: u64) -> (f64, f64) {
        let alpha = self.alpha(dt.max(1) as f64);
        let mi = (-alpha).exp();
        let ni = match self.kind {
            EmaKind::Previous => 1.0,
            EmaKind::Linear => (1.0 - mi) / alpha,
            EmaKind::Next => mi,
        };
        (mi, ni)
    }

    /// Normalised warm-up weights `exp(-alpha(now - t_i))` of buffered points
    pub(crate) fn seed_weights(&self, times: &[u64], now: u64) -> Vec<f64> {
        let mut weights: Vec<f64> = times
            .iter()
            .map(|&ts| (-self.alpha(now.saturating_sub(ts) as f64)).exp())
            .collect();
        normalize_l1(&mut weights);
        weights
    }

    pub(crate) fn encode(&self, enc: &mut Encoder) {
        enc.put_u8(self.kind.tag());
        enc.put_f64(self.interval);
        enc.put_f64(self.decay);
        enc.put_u64(self.init_window);
    }

    pub(crate) fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        let kind = EmaKind::from_tag(dec.get_u8()?)?;
        let interval = dec.get_f64()?;
        let decay = dec.get_f64()?;
        let init_window = dec.get_u64()?;
        Self::new(kind, interval, decay, init_window)
            .map_err(|e| StatsError::Decode(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use test_case::test_case;

    use super::*;

    #[test_case("previous", EmaKind::Previous)]
    #[test_case("linear", EmaKind::Linear)]
    #[test_case("next", EmaKind::Next)]
    fn names_resolve(name: &str, kind: EmaKind) {
        assert_eq!(EmaKind::from_name(name), Ok(kind));
        assert_eq!(kind.name(), name);
        assert_eq!(EmaKind::from_tag(kind.tag()), Ok(kind));
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(
            EmaKind::from_name("cubic"),
            Err(StatsError::UnknownType {
                kind: "ema type",
                name: "cubic".to_string()
            })
        );
    }

    #[test_case(EmaKind::Previous, 1.0)]
    #[test_case(EmaKind::Linear, 1.0 - (-1.0f64).exp())]
    #[test_case(EmaKind::Next, (-1.0f64).exp())]
    fn coefficients_per_policy(kind: EmaKind, ni: f64) {
        let decay = Decay::new(kind, 10.0, 0.0, 0).unwrap();
        let (mi, got) = decay.coefficients(10);
        assert_approx_eq!(mi, (-1.0f64).exp(), 1e-15);
        assert_approx_eq!(got, ni, 1e-15);
    }

    #[test]
    fn decay_scales_alpha() {
        let decay = Decay::new(EmaKind::Next, 10.0, 0.5, 0).unwrap();
        assert_approx_eq!(decay.alpha(10.0), 2.0f64.ln(), 1e-15);
        // zero step counts as one millisecond
        assert_eq!(decay.coefficients(0), decay.coefficients(1));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(Decay::new(EmaKind::Next, 0.0, 0.0, 0).is_err());
        assert!(Decay::new(EmaKind::Next, 1.0, 1.0, 0).is_err());
        assert!(Decay::new(EmaKind::Next, 1.0, -0.1, 0).is_err());
    }
}
