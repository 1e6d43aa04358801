use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::{NeuralNetParams, parse};
use crate::traits::{Persist, StateKind};
use crate::utils::codec::{Decoder, Encoder};
use crate::{Kbn, StatsError, StatsResult};

const RECENT_AVG_SMOOTHING: f64 = 100.0;

/// Activation of a layer of a [`NeuralNet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFunction {
    /// `tanh(s)`
    TanHyper,
    /// `1 / (1 + e^-s)`
    Sigmoid,
    /// `s / (1 + |s|)`
    FastTanh,
    /// `ln(1 + e^s)`
    SoftPlus,
    /// `s / (2 (1 + |s|)) + 1/2`
    FastSigmoid,
    /// `s`
    Linear,
}

impl TransferFunction {
    /// Resolves a function name (`tanHyper`, `sigmoid`, `fastTanh`, `softPlus`, `fastSigmoid`,
    /// `linear`)
    pub fn from_name(name: &str) -> StatsResult<Self> {
        match name {
            "tanHyper" => Ok(Self::TanHyper),
            "sigmoid" => Ok(Self::Sigmoid),
            "fastTanh" => Ok(Self::FastTanh),
            "softPlus" => Ok(Self::SoftPlus),
            "fastSigmoid" => Ok(Self::FastSigmoid),
            "linear" => Ok(Self::Linear),
            _ => Err(StatsError::unknown("transfer function", name)),
        }
    }

    /// Returns the function name
    pub const fn name(self) -> &'static str {
        match self {
            Self::TanHyper => "tanHyper",
            Self::Sigmoid => "sigmoid",
            Self::FastTanh => "fastTanh",
            Self::SoftPlus => "softPlus",
            Self::FastSigmoid => "fastSigmoid",
            Self::Linear => "linear",
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::TanHyper => 0,
            Self::Sigmoid => 1,
            Self::FastTanh => 2,
            Self::SoftPlus => 3,
            Self::FastSigmoid => 4,
            Self::Linear => 5,
        }
    }

    fn from_tag(tag: u8) -> StatsResult<Self> {
        match tag {
            0 => Ok(Self::TanHyper),
            1 => Ok(Self::Sigmoid),
            2 => Ok(Self::FastTanh),
            3 => Ok(Self::SoftPlus),
            4 => Ok(Self::FastSigmoid),
            5 => Ok(Self::Linear),
            _ => Err(StatsError::Decode(format!("unknown transfer function tag {tag}"))),
        }
    }

    /// Applies the function to a weighted input sum
    pub fn apply(self, sum: f64) -> f64 {
        match self {
            Self::TanHyper => sum.tanh(),
            Self::Sigmoid => 1.0 / (1.0 + (-sum).exp()),
            Self::FastTanh => sum / (1.0 + sum.abs()),
            Self::SoftPlus => sum.exp().ln_1p(),
            Self::FastSigmoid => sum / (2.0 * (1.0 + sum.abs())) + 0.5,
            Self::Linear => sum,
        }
    }

    /// Derivative at the input that produced `output`
    pub fn derivative(self, output: f64) -> f64 {
        match self {
            Self::TanHyper => 1.0 - output * output,
            Self::Sigmoid => output * (1.0 - output),
            Self::FastTanh => (1.0 - output.abs()).powi(2),
            Self::SoftPlus => -(-output).exp_m1(),
            Self::FastSigmoid => 0.5 * (1.0 - 2.0 * (output - 0.5).abs()).powi(2),
            Self::Linear => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Edge {
    weight: f64,
    /// Last applied weight change
    delta: f64,
    /// Weight changes summed in batch mode, not yet applied
    pending: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Neuron {
    output: f64,
    gradient: f64,
    /// Outgoing edges, indexed by the target neuron of the next layer
    edges: Vec<Edge>,
}

#[derive(Debug, Clone, PartialEq)]
struct Layer {
    func: TransferFunction,
    /// The last neuron is the bias, its output is always one
    neurons: Vec<Neuron>,
}

impl Layer {
    fn new(size: usize, outputs: usize, func: TransferFunction, rng: &mut StdRng) -> Self {
        let mut neurons: Vec<Neuron> = (0..=size)
            .map(|_| Neuron {
                output: 0.0,
                gradient: 0.0,
                edges: (0..outputs)
                    .map(|_| Edge {
                        weight: rng.gen_range(0.0..1.0),
                        delta: 0.0,
                        pending: 0.0,
                    })
                    .collect(),
            })
            .collect();
        if let Some(bias) = neurons.last_mut() {
            bias.output = 1.0;
        }
        Self { func, neurons }
    }

    /// Neurons excluding the bias
    #[inline]
    fn size(&self) -> usize {
        self.neurons.len() - 1
    }
}

/// # Feed-Forward Neural Network
///
/// Fully connected layers trained online by backpropagation with momentum. Every layer carries a
/// bias neuron. With `update_weights = false` a training call only accumulates the weight changes;
/// the next call with `update_weights = true` applies the accumulated sum at once.
#[derive(Debug, Clone, PartialEq)]
pub struct NeuralNet {
    layers: Vec<Layer>,
    learn_rate: f64,
    momentum: f64,
    error: f64,
    recent_avg_error: f64,
}

impl NeuralNet {
    /// Creates a network with random initial weights
    ///
    /// # Arguments
    ///
    /// * `params` - Layout, learning rate, momentum, transfer functions and weight seed
    ///
    /// # Returns
    ///
    /// * `StatsResult<Self>` - The network, or `InvalidConfig` / `UnknownType`
    pub fn from_params(params: &NeuralNetParams) -> StatsResult<Self> {
        if params.layout.len() < 2 || params.layout.contains(&0) {
            return Err(StatsError::config(format!(
                "layout needs at least two non-empty layers, got {:?}",
                params.layout
            )));
        }
        if !(params.learn_rate.is_finite() && params.learn_rate > 0.0) {
            return Err(StatsError::config("learnRate must be positive"));
        }
        if !(params.momentum.is_finite() && params.momentum >= 0.0) {
            return Err(StatsError::config("momentum must be non-negative"));
        }
        let hidden = TransferFunction::from_name(&params.t_func_hidden)?;
        let out = TransferFunction::from_name(&params.t_func_out)?;

        let mut rng = StdRng::seed_from_u64(params.seed);
        let last = params.layout.len() - 1;
        let layers = params
            .layout
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let outputs = if i == last { 0 } else { params.layout[i + 1] };
                let func = if i == last { out } else { hidden };
                Layer::new(size, outputs, func, &mut rng)
            })
            .collect();
        Ok(Self {
            layers,
            learn_rate: params.learn_rate,
            momentum: params.momentum,
            error: 0.0,
            recent_avg_error: 0.0,
        })
    }

    /// Creates a network from a JSON object such as `{"layout": [2, 4, 1], "seed": 7}`
    pub fn from_json(params: &Value) -> StatsResult<Self> {
        let params: NeuralNetParams = parse(params)?;
        debug!(?params, "neural network from json");
        Self::from_params(&params)
    }

    /// Returns the neurons per layer, bias excluded
    pub fn layout(&self) -> Vec<usize> {
        self.layers.iter().map(Layer::size).collect()
    }

    /// Returns the learning rate
    #[inline]
    pub const fn learn_rate(&self) -> f64 {
        self.learn_rate
    }

    /// Returns the momentum
    #[inline]
    pub const fn momentum(&self) -> f64 {
        self.momentum
    }

    /// Returns the RMS output error of the last training call
    #[inline]
    pub const fn error(&self) -> f64 {
        self.error
    }

    /// Returns the exponentially smoothed RMS error
    #[inline]
    pub const fn recent_average_error(&self) -> f64 {
        self.recent_avg_error
    }

    /// Returns true if any weight is NaN
    pub fn has_nan(&self) -> bool {
        self.layers
            .iter()
            .flat_map(|l| &l.neurons)
            .flat_map(|n| &n.edges)
            .any(|e| e.weight.is_nan())
    }

    fn feed_forward(&mut self, input: &[f64]) -> StatsResult<()> {
        let expected = self.layers[0].size();
        if input.len() != expected {
            return Err(StatsError::DimensionMismatch {
                expected,
                actual: input.len(),
            });
        }
        if input.iter().any(|x| x.is_nan()) {
            return Err(StatsError::NanValue("neural network input"));
        }
        for (neuron, &x) in self.layers[0].neurons.iter_mut().zip(input) {
            neuron.output = x;
        }
        for l in 1..self.layers.len() {
            let (prev, rest) = self.layers.split_at_mut(l);
            let (prev, layer) = (&prev[l - 1], &mut rest[0]);
            let func = layer.func;
            let size = layer.size();
            for (id, neuron) in layer.neurons.iter_mut().take(size).enumerate() {
                let mut sum = Kbn::<f64>::default();
                for p in &prev.neurons {
                    sum += p.output * p.edges[id].weight;
                }
                neuron.output = func.apply(sum.total());
            }
        }
        Ok(())
    }

    fn outputs(&self) -> Vec<f64> {
        self.layers
            .last()
            .map(|l| l.neurons[..l.size()].iter().map(|n| n.output).collect())
            .unwrap_or_default()
    }

    /// Evaluates the network
    ///
    /// # Arguments
    ///
    /// * `input` - One value per input neuron
    ///
    /// # Returns
    ///
    /// * `StatsResult<Vec<f64>>` - One value per output neuron, or `DimensionMismatch`
    pub fn predict(&mut self, input: &[f64]) -> StatsResult<Vec<f64>> {
        self.feed_forward(input)?;
        Ok(self.outputs())
    }

    /// Trains on one sample
    ///
    /// # Arguments
    ///
    /// * `input` - One value per input neuron
    /// * `target` - One value per output neuron
    /// * `update_weights` - Apply the changes now, or accumulate them for a later call
    pub fn learn(
        &mut self,
        input: &[f64],
        target: &[f64],
        update_weights: bool,
    ) -> StatsResult<&mut Self> {
        let expected = self.layers[self.layers.len() - 1].size();
        if target.len() != expected {
            return Err(StatsError::DimensionMismatch {
                expected,
                actual: target.len(),
            });
        }
        if target.iter().any(|x| x.is_nan()) {
            return Err(StatsError::NanValue("neural network target"));
        }
        self.feed_forward(input)?;
        self.back_propagate(target, update_weights);
        Ok(self)
    }

    fn back_propagate(&mut self, target: &[f64], update_weights: bool) {
        let last = self.layers.len() - 1;

        let out = &mut self.layers[last];
        let func = out.func;
        let mut sq = Kbn::<f64>::default();
        for (neuron, &t) in out.neurons.iter_mut().zip(target) {
            let delta = t - neuron.output;
            sq += delta * delta;
            neuron.gradient = delta * func.derivative(neuron.output);
        }
        self.error = (sq.total() / target.len() as f64).sqrt();
        self.recent_avg_error = (self.recent_avg_error * RECENT_AVG_SMOOTHING + self.error)
            / (RECENT_AVG_SMOOTHING + 1.0);

        for l in (1..last).rev() {
            let (head, tail) = self.layers.split_at_mut(l + 1);
            let (layer, next) = (&mut head[l], &tail[0]);
            let func = layer.func;
            let size = layer.size();
            for neuron in layer.neurons.iter_mut().take(size) {
                let mut sum = Kbn::<f64>::default();
                for (edge, target) in neuron.edges.iter().zip(&next.neurons) {
                    sum += edge.weight * target.gradient;
                }
                neuron.gradient = sum.total() * func.derivative(neuron.output);
            }
        }

        for l in (1..=last).rev() {
            let (head, tail) = self.layers.split_at_mut(l);
            let (prev, layer) = (&mut head[l - 1], &tail[0]);
            for (id, neuron) in layer.neurons.iter().take(layer.size()).enumerate() {
                for p in prev.neurons.iter_mut() {
                    let output = p.output;
                    let edge = &mut p.edges[id];
                    let mut change = self.learn_rate * output * neuron.gradient;
                    if update_weights && edge.pending == 0.0 {
                        change += self.momentum * edge.delta;
                    }
                    if update_weights {
                        change += edge.pending;
                        edge.pending = 0.0;
                        edge.delta = change;
                        edge.weight += change;
                    } else {
                        edge.pending += change;
                    }
                }
            }
        }
        trace!(error = self.error, update_weights, "neural network backpropagation");
    }
}

impl Persist for NeuralNet {
    const KIND: StateKind = StateKind::NeuralNet;

    /// Field order: learning rate, momentum, error, recent average error, layer count, then per
    /// layer the function tag, neuron count and per neuron its output, gradient, edge count and
    /// `(weight, delta, pending)` per edge
    fn encode(&self, enc: &mut Encoder) {
        enc.put_f64(self.learn_rate);
        enc.put_f64(self.momentum);
        enc.put_f64(self.error);
        enc.put_f64(self.recent_avg_error);
        enc.put_len(self.layers.len());
        for layer in &self.layers {
            enc.put_u8(layer.func.tag());
            enc.put_len(layer.neurons.len());
            for neuron in &layer.neurons {
                enc.put_f64(neuron.output);
                enc.put_f64(neuron.gradient);
                enc.put_len(neuron.edges.len());
                for edge in &neuron.edges {
                    enc.put_f64(edge.weight);
                    enc.put_f64(edge.delta);
                    enc.put_f64(edge.pending);
                }
            }
        }
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        let learn_rate = dec.get_f64()?;
        let momentum = dec.get_f64()?;
        let error = dec.get_f64()?;
        let recent_avg_error = dec.get_f64()?;
        let layer_count = dec.get_len(2)?;
        let mut layers = Vec::with_capacity(layer_count);
        for _ in 0..layer_count {
            let func = TransferFunction::from_tag(dec.get_u8()?)?;
            let neuron_count = dec.get_len(17)?;
            let mut neurons = Vec::with_capacity(neuron_count);
            for _ in 0..neuron_count {
                let output = dec.get_f64()?;
                let gradient = dec.get_f64()?;
                let edge_count = dec.get_len(24)?;
                let mut edges = Vec::with_capacity(edge_count);
                for _ in 0..edge_count {
                    edges.push(Edge {
                        weight: dec.get_f64()?,
                        delta: dec.get_f64()?,
                        pending: dec.get_f64()?,
                    });
                }
                neurons.push(Neuron {
                    output,
                    gradient,
                    edges,
                });
            }
            layers.push(Layer { func, neurons });
        }

        if layers.len() < 2 || layers.iter().any(|l| l.neurons.len() < 2) {
            return Err(StatsError::Decode("network needs two non-empty layers".into()));
        }
        for (i, layer) in layers.iter().enumerate() {
            let outputs = layers.get(i + 1).map_or(0, Layer::size);
            if layer.neurons.iter().any(|n| n.edges.len() != outputs) {
                return Err(StatsError::Decode(format!(
                    "layer {i} edges do not match the next layer"
                )));
            }
        }
        Ok(Self {
            layers,
            learn_rate,
            momentum,
            error,
            recent_avg_error,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    fn net() -> NeuralNet {
        NeuralNet::from_json(&json!({
            "layout": [2, 3, 1],
            "learnRate": 0.1,
            "momentum": 0.5,
            "tFuncHidden": "tanHyper",
            "tFuncOut": "linear",
            "seed": 42,
        }))
        .unwrap()
    }

    #[test_case(TransferFunction::TanHyper)]
    #[test_case(TransferFunction::Sigmoid)]
    #[test_case(TransferFunction::FastTanh)]
    #[test_case(TransferFunction::SoftPlus)]
    #[test_case(TransferFunction::FastSigmoid)]
    #[test_case(TransferFunction::Linear)]
    fn derivative_from_output_matches_numeric(func: TransferFunction) {
        let h = 1e-6;
        for s in [-2.0, -0.5, 0.7, 1.5] {
            let numeric = (func.apply(s + h) - func.apply(s - h)) / (2.0 * h);
            assert_approx_eq!(func.derivative(func.apply(s)), numeric, 1e-6);
        }
        assert_eq!(TransferFunction::from_name(func.name()).unwrap(), func);
    }

    #[test]
    fn fits_a_single_sample() {
        let mut nn = net();
        for _ in 0..500 {
            nn.learn(&[0.2, 0.4], &[0.5], true).unwrap();
        }
        assert_approx_eq!(nn.predict(&[0.2, 0.4]).unwrap()[0], 0.5, 1e-3);
        assert!(nn.error() < 1e-3);
        assert!(nn.recent_average_error() > nn.error());
        assert!(!nn.has_nan());
    }

    #[test]
    fn batch_mode_defers_weight_changes() {
        let mut nn = net();
        let before = nn.predict(&[0.2, 0.4]).unwrap();
        nn.learn(&[0.2, 0.4], &[0.5], false).unwrap();
        nn.learn(&[0.1, 0.3], &[0.2], false).unwrap();
        assert_eq!(nn.predict(&[0.2, 0.4]).unwrap(), before);
        nn.learn(&[0.2, 0.4], &[0.5], true).unwrap();
        assert_ne!(nn.predict(&[0.2, 0.4]).unwrap(), before);
    }

    #[test]
    fn seeded_construction_is_reproducible() {
        assert_eq!(net().save(), net().save());
        let other = NeuralNet::from_json(&json!({"layout": [2, 3, 1], "seed": 7})).unwrap();
        assert_ne!(net().save(), other.save());
        assert_eq!(other.layout(), vec![2, 3, 1]);
    }

    #[test]
    fn contract_violations() {
        assert!(NeuralNet::from_json(&json!({"layout": [2]})).is_err());
        assert!(NeuralNet::from_json(&json!({"layout": [2, 0, 1]})).is_err());
        assert!(matches!(
            NeuralNet::from_json(&json!({"layout": [2, 1], "tFuncOut": "relu"})),
            Err(StatsError::UnknownType { .. })
        ));
        let mut nn = net();
        assert_eq!(
            nn.predict(&[1.0]).unwrap_err(),
            StatsError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        );
        assert!(nn.learn(&[1.0, 2.0], &[1.0, 2.0], true).is_err());
        assert!(nn.learn(&[1.0, f64::NAN], &[1.0], true).is_err());
    }
}
