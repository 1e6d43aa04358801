//! Construction parameters, deserialised from JSON with camelCase keys

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::StatsResult;

/// Deserialises a parameter struct from a JSON object
pub(crate) fn parse<T: DeserializeOwned>(params: &Value) -> StatsResult<T> {
    Ok(T::deserialize(params)?)
}

fn default_bins() -> usize {
    5
}

fn default_cutoff() -> f64 {
    1e-4
}

fn default_compression() -> f64 {
    100.0
}

fn one() -> f64 {
    1.0
}

fn default_learn_rate() -> f64 {
    0.1
}

fn default_momentum() -> f64 {
    0.5
}

fn default_hidden() -> String {
    "tanHyper".to_string()
}

fn default_output() -> String {
    "linear".to_string()
}

/// Parameters of [`crate::Ema`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmaParams {
    /// Interpolation policy: `previous`, `linear` or `next`
    pub ema_type: String,
    /// Averaging interval in milliseconds
    pub interval: f64,
    /// Minimum warm-up span in milliseconds; zero seeds on the first point
    #[serde(default)]
    pub init_window: u64,
    /// Decay per interval in `[0, 1)`; zero uses `dt / interval` directly
    #[serde(default)]
    pub decay: f64,
}

/// Parameters of [`crate::SparseEma`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparseEmaParams {
    /// The dense recurrence parameters
    #[serde(flatten)]
    pub ema: EmaParams,
    /// Coordinates with a smaller magnitude are pruned after every update
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
    /// Optional dimension every input must fit in
    #[serde(default)]
    pub dimension: Option<usize>,
}

/// Parameters of [`crate::OnlineHistogram`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramParams {
    /// Lower bound of the first finite bin
    pub lower_bound: f64,
    /// Upper bound of the last finite bin
    pub upper_bound: f64,
    /// Number of finite bins
    #[serde(default = "default_bins")]
    pub bins: usize,
    /// Adds a bin for values below the lower bound
    #[serde(default)]
    pub add_neg_inf: bool,
    /// Adds a bin for values above the upper bound
    #[serde(default)]
    pub add_pos_inf: bool,
}

/// Parameters of [`crate::SlottedHistogram`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlottedHistogramParams {
    /// Length of the repeating period in milliseconds
    pub period: u64,
    /// Width of one slot in milliseconds; must divide the period
    pub slot: u64,
    /// Number of bins per slot
    pub bins: usize,
    /// Lower bound of every slot histogram (defaults to zero)
    #[serde(default)]
    pub lower_bound: Option<f64>,
    /// Upper bound of every slot histogram (defaults to the bin count)
    #[serde(default)]
    pub upper_bound: Option<f64>,
}

/// Parameters of [`crate::TDigest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TDigestParams {
    /// Compression: roughly the number of centroids kept
    #[serde(default = "default_compression")]
    pub compression: f64,
}

impl Default for TDigestParams {
    fn default() -> Self {
        Self {
            compression: default_compression(),
        }
    }
}

/// Parameters of [`crate::RecLinReg`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecLinRegParams {
    /// Number of features
    pub dim: usize,
    /// Regularisation; the inverse covariance starts as `I / regFact`
    #[serde(default = "one")]
    pub reg_fact: f64,
    /// Forgetting factor in `(0, 1]`
    #[serde(default = "one")]
    pub forget_fact: f64,
}

/// Parameters of [`crate::ChiSquare`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChiSquareParams {
    /// Degrees of freedom of the reference distribution, positive
    pub degrees_of_freedom: u64,
}

/// Parameters of [`crate::NeuralNet`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeuralNetParams {
    /// Neurons per layer, input layer first, excluding bias neurons
    pub layout: Vec<usize>,
    /// Learning rate
    #[serde(default = "default_learn_rate")]
    pub learn_rate: f64,
    /// Momentum applied to the previous weight change
    #[serde(default = "default_momentum")]
    pub momentum: f64,
    /// Transfer function of the hidden layers
    #[serde(default = "default_hidden")]
    pub t_func_hidden: String,
    /// Transfer function of the output layer
    #[serde(default = "default_output")]
    pub t_func_out: String,
    /// Seed of the weight initialisation
    #[serde(default)]
    pub seed: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::StatsError;

    #[test]
    fn defaults_are_applied() {
        let p: HistogramParams = parse(&json!({"lowerBound": 0.0, "upperBound": 10.0})).unwrap();
        assert_eq!(p.bins, 5);
        assert!(!p.add_neg_inf && !p.add_pos_inf);

        let p: SparseEmaParams = parse(&json!({"emaType": "next", "interval": 60.0})).unwrap();
        assert_eq!(p.ema.init_window, 0);
        assert_eq!(p.cutoff, 1e-4);
        assert_eq!(p.dimension, None);

        let p: NeuralNetParams = parse(&json!({"layout": [2, 3, 1]})).unwrap();
        assert_eq!(p.t_func_hidden, "tanHyper");
        assert_eq!(p.t_func_out, "linear");
        assert_eq!(p.learn_rate, 0.1);

        let p: TDigestParams = parse(&json!({})).unwrap();
        assert_eq!(p, TDigestParams::default());
    }

    #[test]
    fn missing_keys_are_config_errors() {
        let err = parse::<EmaParams>(&json!({"interval": 1.0})).unwrap_err();
        assert!(matches!(err, StatsError::InvalidConfig(_)));
    }
}
