use serde_json::{Value, json};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::{debug, trace};

use crate::config::{ChiSquareParams, parse};
use crate::traits::{Persist, StateKind};
use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::ensure_same_len;
use crate::{Kbn, StatsError, StatsResult};

/// # Chi-Square Test
///
/// Goodness of fit of observed bin counts against expected ones. Every update replaces the
/// statistic
///
/// ```text
/// chi2 = sum of (observed - expected)^2 / expected over bins with expected > 0
/// ```
///
/// and its p-value, the upper tail of the chi-squared distribution with the configured degrees
/// of freedom at `chi2`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChiSquare {
    degrees_of_freedom: u64,
    chi2: f64,
    /// `None` until the first update
    p: Option<f64>,
}

impl ChiSquare {
    /// Creates a test with no observations yet
    ///
    /// # Arguments
    ///
    /// * `degrees_of_freedom` - Degrees of freedom, positive
    pub fn new(degrees_of_freedom: u64) -> StatsResult<Self> {
        if degrees_of_freedom == 0 {
            return Err(StatsError::config("degreesOfFreedom must be positive"));
        }
        Ok(Self {
            degrees_of_freedom,
            chi2: 0.0,
            p: None,
        })
    }

    /// Creates a test from typed parameters
    pub fn from_params(params: &ChiSquareParams) -> StatsResult<Self> {
        Self::new(params.degrees_of_freedom)
    }

    /// Creates a test from a JSON object such as `{"degreesOfFreedom": 3}`
    pub fn from_json(params: &Value) -> StatsResult<Self> {
        let params: ChiSquareParams = parse(params)?;
        debug!(?params, "chi-square from json");
        Self::from_params(&params)
    }

    /// Returns the degrees of freedom
    #[inline]
    pub const fn degrees_of_freedom(&self) -> u64 {
        self.degrees_of_freedom
    }

    /// Returns the statistic of the last update (zero before any)
    #[inline]
    pub const fn chi2(&self) -> f64 {
        self.chi2
    }

    /// Returns the p-value of the last update
    #[inline]
    pub const fn p_value(&self) -> Option<f64> {
        self.p
    }

    /// Recomputes the statistic from a pair of histograms
    ///
    /// # Arguments
    ///
    /// * `observed` - Observed count per bin
    /// * `expected` - Expected count per bin; bins with no expected mass are skipped
    ///
    /// # Returns
    ///
    /// * `StatsResult<&mut Self>` - The test, unchanged on error
    pub fn update(&mut self, observed: &[f64], expected: &[f64]) -> StatsResult<&mut Self> {
        ensure_same_len("observed/expected", observed.len(), expected.len())?;
        if observed.iter().chain(expected).any(|x| x.is_nan()) {
            return Err(StatsError::NanValue("chi-square bins"));
        }
        let mut chi2 = Kbn::<f64>::default();
        for (&o, &e) in observed.iter().zip(expected) {
            if e > 0.0 {
                chi2 += (o - e) * (o - e) / e;
            }
        }
        let chi2 = chi2.total();
        let p = upper_tail(self.degrees_of_freedom, chi2)?;
        trace!(chi2, p, bins = observed.len(), "chi-square update");
        self.chi2 = chi2;
        self.p = Some(p);
        Ok(self)
    }

    /// Forgets the last result
    pub fn reset(&mut self) {
        self.chi2 = 0.0;
        self.p = None;
    }

    /// Projects the result as `{"chi2": ..., "p": ...}`, with a `null` p-value before any update
    pub fn to_json(&self) -> Value {
        json!({
            "chi2": self.chi2,
            "p": self.p,
        })
    }
}

/// Probability that a chi-squared variable exceeds `chi2`
fn upper_tail(degrees_of_freedom: u64, chi2: f64) -> StatsResult<f64> {
    let dist = ChiSquared::new(degrees_of_freedom as f64)
        .map_err(|e| StatsError::config(e.to_string()))?;
    Ok(dist.sf(chi2))
}

impl Persist for ChiSquare {
    const KIND: StateKind = StateKind::ChiSquare;

    /// Field order: degrees of freedom, has result, chi2, p-value
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u64(self.degrees_of_freedom);
        enc.put_bool(self.p.is_some());
        enc.put_f64(self.chi2);
        enc.put_f64(self.p.unwrap_or(f64::NAN));
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        let mut test =
            Self::new(dec.get_u64()?).map_err(|e| StatsError::Decode(e.to_string()))?;
        let has_result = dec.get_bool()?;
        test.chi2 = dec.get_f64()?;
        let p = dec.get_f64()?;
        test.p = has_result.then_some(p);
        Ok(test)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use test_case::test_case;

    use super::*;

    /// Feeds a single bin whose contribution is exactly `chi2`
    fn at(degrees_of_freedom: u64, chi2: f64) -> ChiSquare {
        let mut test = ChiSquare::new(degrees_of_freedom).unwrap();
        test.update(&[1.0 + chi2.sqrt()], &[1.0]).unwrap();
        test
    }

    #[test_case(1, 3.841459 ; "one degree")]
    #[test_case(2, 5.991465 ; "two degrees")]
    #[test_case(5, 11.070498 ; "five degrees")]
    #[test_case(10, 18.307038 ; "ten degrees")]
    fn five_percent_critical_values(degrees_of_freedom: u64, critical: f64) {
        let test = at(degrees_of_freedom, critical);
        assert_approx_eq!(test.chi2(), critical, 1e-9);
        assert_approx_eq!(test.p_value().unwrap(), 0.05, 1e-6);
    }

    #[test_case(1, 6.634897 ; "one degree")]
    #[test_case(3, 11.344867 ; "three degrees")]
    fn one_percent_critical_values(degrees_of_freedom: u64, critical: f64) {
        assert_approx_eq!(at(degrees_of_freedom, critical).p_value().unwrap(), 0.01, 1e-6);
    }

    #[test]
    fn statistic_over_bins() {
        let mut test = ChiSquare::new(1).unwrap();
        test.update(&[60.0, 40.0], &[50.0, 50.0]).unwrap();
        assert_approx_eq!(test.chi2(), 4.0, 1e-12);
        assert_approx_eq!(test.p_value().unwrap(), 0.0455002638963584, 1e-9);

        let mut test = ChiSquare::new(2).unwrap();
        test.update(&[30.0, 20.0, 50.0], &[40.0, 20.0, 40.0]).unwrap();
        assert_approx_eq!(test.chi2(), 5.0, 1e-12);
        assert_approx_eq!(test.p_value().unwrap(), (-2.5f64).exp(), 1e-9);
    }

    #[test]
    fn perfect_fit_has_unit_p_value() {
        let mut test = ChiSquare::new(3).unwrap();
        test.update(&[5.0, 7.0, 9.0, 1.0], &[5.0, 7.0, 9.0, 1.0]).unwrap();
        assert_eq!(test.chi2(), 0.0);
        assert_approx_eq!(test.p_value().unwrap(), 1.0, 1e-12);
    }

    #[test]
    fn empty_expected_bins_are_skipped() {
        let mut test = ChiSquare::new(1).unwrap();
        test.update(&[3.0, 60.0, 40.0], &[0.0, 50.0, 50.0]).unwrap();
        assert_approx_eq!(test.chi2(), 4.0, 1e-12);
    }

    #[test]
    fn each_update_replaces_the_result() {
        let mut test = ChiSquare::new(1).unwrap();
        test.update(&[60.0, 40.0], &[50.0, 50.0]).unwrap();
        test.update(&[50.0, 50.0], &[50.0, 50.0]).unwrap();
        assert_eq!(test.chi2(), 0.0);
        test.reset();
        assert_eq!(test.p_value(), None);
        assert_eq!(test.to_json(), json!({"chi2": 0.0, "p": null}));
    }

    #[test]
    fn invalid_input_is_rejected() {
        assert_eq!(
            ChiSquare::from_json(&json!({"degreesOfFreedom": 0})).unwrap_err(),
            StatsError::config("degreesOfFreedom must be positive")
        );
        assert!(ChiSquare::from_json(&json!({})).is_err());

        let mut test = ChiSquare::from_json(&json!({"degreesOfFreedom": 2})).unwrap();
        assert!(matches!(
            test.update(&[1.0, 2.0], &[1.0]),
            Err(StatsError::LengthMismatch { .. })
        ));
        assert_eq!(
            test.update(&[f64::NAN], &[1.0]).unwrap_err(),
            StatsError::NanValue("chi-square bins")
        );
        assert_eq!(test.p_value(), None);
    }
}
