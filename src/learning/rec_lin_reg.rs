use serde_json::Value;
use tracing::debug;

use crate::config::{RecLinRegParams, parse};
use crate::traits::{Persist, StateKind};
use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::dot;
use crate::{StatsError, StatsResult};

/// # Recursive Linear Regression
///
/// Least squares fitted one sample at a time. The inverse covariance `P` starts at
/// `I / regFact` and every sample `(x, y)` applies
///
/// ```text
/// Px = P x
/// P  = (P - Px Px' / (lambda + x'Px)) / lambda
/// w  = w + Px (y - w'x) / (lambda + x'Px)
/// ```
///
/// where `lambda` is the forgetting factor; `lambda = 1` weighs every sample equally and smaller
/// values discount old samples exponentially.
#[derive(Debug, Clone, PartialEq)]
pub struct RecLinReg {
    forget_fact: f64,
    reg_fact: f64,
    /// Row-major `dim x dim`
    p: Vec<f64>,
    coeffs: Vec<f64>,
}

impl RecLinReg {
    /// Creates an untrained model
    ///
    /// # Arguments
    ///
    /// * `dim` - Number of features
    /// * `reg_fact` - Regularisation, positive
    /// * `forget_fact` - Forgetting factor in `(0, 1]`
    ///
    /// # Returns
    ///
    /// * `StatsResult<Self>` - The model, or `InvalidConfig`
    pub fn new(dim: usize, reg_fact: f64, forget_fact: f64) -> StatsResult<Self> {
        if dim == 0 {
            return Err(StatsError::config("dim must be positive"));
        }
        if !(reg_fact.is_finite() && reg_fact > 0.0) {
            return Err(StatsError::config(format!(
                "regFact must be positive, got {reg_fact}"
            )));
        }
        if !(forget_fact > 0.0 && forget_fact <= 1.0) {
            return Err(StatsError::config(format!(
                "forgetFact must lie in (0, 1], got {forget_fact}"
            )));
        }
        let mut model = Self {
            forget_fact,
            reg_fact,
            p: Vec::new(),
            coeffs: Vec::new(),
        };
        model.init(dim);
        Ok(model)
    }

    fn init(&mut self, dim: usize) {
        self.p = vec![0.0; dim * dim];
        for i in 0..dim {
            self.p[i * dim + i] = 1.0 / self.reg_fact;
        }
        self.coeffs = vec![0.0; dim];
    }

    /// Creates a model from typed parameters
    pub fn from_params(params: &RecLinRegParams) -> StatsResult<Self> {
        Self::new(params.dim, params.reg_fact, params.forget_fact)
    }

    /// Creates a model from a JSON object such as `{"dim": 3, "forgetFact": 0.99}`
    pub fn from_json(params: &Value) -> StatsResult<Self> {
        let params: RecLinRegParams = parse(params)?;
        debug!(?params, "recursive linear regression from json");
        Self::from_params(&params)
    }

    /// Returns the number of features
    #[inline]
    pub fn dim(&self) -> usize {
        self.coeffs.len()
    }

    /// Returns the forgetting factor
    #[inline]
    pub const fn forget_fact(&self) -> f64 {
        self.forget_fact
    }

    /// Returns the regularisation factor
    #[inline]
    pub const fn reg_fact(&self) -> f64 {
        self.reg_fact
    }

    /// Returns the fitted coefficients
    #[inline]
    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    /// Returns true if any coefficient is NaN
    pub fn has_nan(&self) -> bool {
        self.coeffs.iter().any(|c| c.is_nan())
    }

    fn check_dim(&self, sample: &[f64]) -> StatsResult<()> {
        if sample.len() == self.dim() {
            Ok(())
        } else {
            Err(StatsError::DimensionMismatch {
                expected: self.dim(),
                actual: sample.len(),
            })
        }
    }

    /// Predicts the target of `sample`
    ///
    /// # Returns
    ///
    /// * `StatsResult<f64>` - `w'x`, or `DimensionMismatch`
    pub fn predict(&self, sample: &[f64]) -> StatsResult<f64> {
        self.check_dim(sample)?;
        Ok(dot(&self.coeffs, sample))
    }

    /// Fits one sample
    ///
    /// # Arguments
    ///
    /// * `sample` - Feature vector of length `dim`, without NaN
    /// * `target` - Observed target value
    pub fn learn(&mut self, sample: &[f64], target: f64) -> StatsResult<&mut Self> {
        self.check_dim(sample)?;
        if target.is_nan() || sample.iter().any(|x| x.is_nan()) {
            return Err(StatsError::NanValue("linear regression sample"));
        }
        let dim = self.dim();
        let err = target - dot(&self.coeffs, sample);
        let px: Vec<f64> = self.p.chunks_exact(dim).map(|row| dot(row, sample)).collect();
        let denom = self.forget_fact + dot(&px, sample);

        for (i, row) in self.p.chunks_exact_mut(dim).enumerate() {
            for (j, p) in row.iter_mut().enumerate() {
                *p = (*p - px[i] * px[j] / denom) / self.forget_fact;
            }
        }
        for (w, g) in self.coeffs.iter_mut().zip(&px) {
            *w += g * err / denom;
        }
        Ok(self)
    }

    /// Forgets every sample
    pub fn reset(&mut self) {
        self.init(self.dim());
    }
}

impl Persist for RecLinReg {
    const KIND: StateKind = StateKind::RecLinReg;

    /// Field order: forgetting factor, regularisation, coefficients, inverse covariance
    fn encode(&self, enc: &mut Encoder) {
        enc.put_f64(self.forget_fact);
        enc.put_f64(self.reg_fact);
        enc.put_f64s(&self.coeffs);
        enc.put_f64s(&self.p);
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        let forget_fact = dec.get_f64()?;
        let reg_fact = dec.get_f64()?;
        let coeffs = dec.get_f64s()?;
        let p = dec.get_f64s()?;
        if coeffs.len().checked_mul(coeffs.len()) != Some(p.len()) {
            return Err(StatsError::Decode(format!(
                "covariance of {} elements for dim {}",
                p.len(),
                coeffs.len()
            )));
        }
        let mut model = Self::new(coeffs.len(), reg_fact, forget_fact)
            .map_err(|e| StatsError::Decode(e.to_string()))?;
        model.p = p;
        model.coeffs = coeffs;
        Ok(model)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;

    use super::*;

    #[test]
    fn recovers_linear_coefficients() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut model = RecLinReg::new(3, 1.0, 1.0).unwrap();
        for _ in 0..5_000 {
            let x = [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), 1.0];
            let y = 2.0 * x[0] - 3.0 * x[1] + 0.5;
            model.learn(&x, y).unwrap();
        }
        let w = model.coefficients();
        assert_approx_eq!(w[0], 2.0, 1e-2);
        assert_approx_eq!(w[1], -3.0, 1e-2);
        assert_approx_eq!(w[2], 0.5, 1e-2);
        assert_approx_eq!(model.predict(&[1.0, 1.0, 1.0]).unwrap(), -0.5, 1e-2);
        assert!(!model.has_nan());
    }

    #[test]
    fn forgetting_tracks_a_drifting_slope() {
        let mut model = RecLinReg::from_json(&json!({"dim": 1, "forgetFact": 0.9})).unwrap();
        for i in 0..200 {
            let x = 1.0 + (i % 5) as f64;
            model.learn(&[x], x).unwrap();
        }
        for i in 0..200 {
            let x = 1.0 + (i % 5) as f64;
            model.learn(&[x], 4.0 * x).unwrap();
        }
        assert_approx_eq!(model.coefficients()[0], 4.0, 1e-6);
    }

    #[test]
    fn single_sample_update() {
        // P = I, lambda = 1: Px = x, w = x * y / (1 + x'x)
        let mut model = RecLinReg::new(2, 1.0, 1.0).unwrap();
        model.learn(&[1.0, 2.0], 6.0).unwrap();
        assert_approx_eq!(model.coefficients()[0], 1.0, 1e-12);
        assert_approx_eq!(model.coefficients()[1], 2.0, 1e-12);
    }

    #[test]
    fn contract_violations() {
        assert!(RecLinReg::new(0, 1.0, 1.0).is_err());
        assert!(RecLinReg::new(2, 0.0, 1.0).is_err());
        assert!(RecLinReg::new(2, 1.0, 1.5).is_err());
        let mut model = RecLinReg::new(2, 1.0, 1.0).unwrap();
        assert_eq!(
            model.predict(&[1.0]).unwrap_err(),
            StatsError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        );
        assert!(model.learn(&[1.0, f64::NAN], 1.0).is_err());
        assert_eq!(model.coefficients(), &[0.0, 0.0]);
    }

    #[test]
    fn reset_restores_prior() {
        let mut model = RecLinReg::new(2, 2.0, 1.0).unwrap();
        let fresh = model.clone();
        model.learn(&[1.0, 0.5], 3.0).unwrap();
        model.reset();
        assert_eq!(model, fresh);
    }
}
