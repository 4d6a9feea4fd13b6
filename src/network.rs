pub mod encoding;
pub mod layer;
pub mod loss;
pub mod matrix;

use encoding::{Encoding, StateEncoder};
use layer::Layer;
use loss::SquaredError;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::replaybuffer::Experience;
use crate::error::ConfigError;
use crate::maze::{Action, State};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub hidden_sizes: Vec<usize>,
    /// Q-learning step towards the TD target.
    pub alpha: f64,
    /// Discount factor.
    pub gamma: f64,
    /// Gradient-descent step size.
    pub learning_rate: f64,
    pub encoding: Encoding,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            hidden_sizes: vec![32, 16],
            alpha: 0.5,
            gamma: 0.9,
            learning_rate: 0.01,
            encoding: Encoding::OneHotCell,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hidden_sizes.is_empty() {
            return Err(ConfigError::EmptyHiddenLayers);
        }
        if let Some(idx) = self.hidden_sizes.iter().position(|&size| size == 0) {
            // layer 0 is the input layer
            return Err(ConfigError::ZeroLayerSize { layer: idx + 1 });
        }
        self.validate_rates()
    }

    fn validate_rates(&self) -> Result<(), ConfigError> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "network.alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ConfigError::Validation(format!(
                "network.gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ConfigError::Validation(format!(
                "network.learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}


/// Q-value approximator: input layer, one or more ReLU hidden layers and a
/// linear output layer with one value per action.
///
/// `predict` and `train` reuse per-layer scratch buffers, so a network serves
/// one forward/backward pair at a time. `infer` leaves them alone.
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
    encoder: StateEncoder,
    alpha: f64,
    gamma: f64,
    learning_rate: f64,
    loss: SquaredError,
}

impl Network {
    pub fn new<R: Rng + ?Sized>(config: &NetworkConfig, encoder: StateEncoder, rng: &mut R) -> Result<Self, ConfigError> {
        config.validate()?;
        if encoder.is_empty() {
            return Err(ConfigError::ZeroLayerSize { layer: 0 });
        }

        let mut layers = vec![Layer::input(encoder.len())];
        let mut fan_in = encoder.len();
        for &size in &config.hidden_sizes {
            layers.push(Layer::hidden(fan_in, size, rng)?);
            fan_in = size;
        }
        layers.push(Layer::output(fan_in, Action::COUNT, rng)?);

        Self::from_layers(layers, encoder, config)
    }

    /// Builds a network from explicit layers. `config.hidden_sizes` is not
    /// consulted; the layers define the topology.
    pub fn from_layers(layers: Vec<Layer>, encoder: StateEncoder, config: &NetworkConfig) -> Result<Self, ConfigError> {
        config.validate_rates()?;

        if layers.len() < 3 {
            return Err(ConfigError::EmptyHiddenLayers);
        }
        let last = layers.len() - 1;
        for (idx, layer) in layers.iter().enumerate() {
            let (expected, placed) = match idx {
                0 => ("an input", matches!(layer, Layer::Input { .. })),
                i if i == last => ("an output", matches!(layer, Layer::Output(_))),
                _ => ("a hidden", matches!(layer, Layer::Hidden(_))),
            };
            if !placed {
                return Err(ConfigError::MisplacedLayer { layer: idx, expected });
            }
            if layer.output_size() == 0 {
                return Err(ConfigError::ZeroLayerSize { layer: idx });
            }
        }

        for (idx, pair) in layers.windows(2).enumerate() {
            if pair[0].output_size() != pair[1].input_size() {
                return Err(ConfigError::LayerSizeMismatch {
                    layer: idx,
                    output: pair[0].output_size(),
                    next_input: pair[1].input_size(),
                });
            }
        }

        if encoder.len() != layers[0].input_size() {
            return Err(ConfigError::InputSizeMismatch {
                features: encoder.len(),
                input: layers[0].input_size(),
            });
        }
        if layers[last].output_size() != Action::COUNT {
            return Err(ConfigError::OutputSizeMismatch {
                expected: Action::COUNT,
                actual: layers[last].output_size(),
            });
        }

        Ok(Self {
            layers,
            encoder,
            alpha: config.alpha,
            gamma: config.gamma,
            learning_rate: config.learning_rate,
            loss: SquaredError,
        })
    }

    pub fn layers(&self) -> &[Layer] {&self.layers}
    pub fn encoder(&self) -> &StateEncoder {&self.encoder}
    pub fn alpha(&self) -> f64 {self.alpha}
    pub fn gamma(&self) -> f64 {self.gamma}
    pub fn learning_rate(&self) -> f64 {self.learning_rate}

    pub fn forward(&mut self, features: &[f64]) -> Vec<f64> {
        let mut output = features.to_vec();
        for layer in &mut self.layers {
            output = layer.forward(&output);
        }
        output
    }

    /// Q-values for every action from `state`, recording scratch for a
    /// following backward pass.
    pub fn predict(&mut self, state: &State) -> Vec<f64> {
        let features = self.encoder.encode(state);
        self.forward(&features)
    }

    /// Same values as `predict` without touching the scratch buffers.
    pub fn infer(&self, state: &State) -> Vec<f64> {
        let mut output = self.encoder.encode(state);
        for layer in &self.layers {
            output = layer.evaluate(&output);
        }
        output
    }

    /// One Q-learning update on `experience`; returns the squared error
    /// between the prediction and its adjusted copy.
    pub fn train(&mut self, experience: &Experience) -> f64 {
        // predict the next state first so the scratch describes the current
        // state when backpropagating
        let max_q_next = match &experience.next_state {
            Some(next) => {
                let q_next = self.predict(next);
                max_next_q(next, &q_next)
            }
            None => 0.0,
        };

        let predicted = self.predict(&experience.state);
        let mut updated = predicted.clone();

        let target = experience.reward + self.gamma * max_q_next;
        let idx = experience.action.index();
        updated[idx] += self.alpha * (target - updated[idx]);

        self.backpropagate(experience, &updated, &predicted);

        let loss = self.loss.calculate(&predicted, &updated);
        tracing::trace!(action = %experience.action, target, loss, "trained on experience");
        loss
    }

    /// Gradient-descent step pulling the prediction for `experience.state`
    /// towards `updated`.
    pub fn backpropagate(&mut self, experience: &Experience, updated: &[f64], predicted: &[f64]) {
        assert_eq!(updated.len(), Action::COUNT, "one updated Q-value per action");

        let features = self.encoder.encode(&experience.state);
        if self.layers[0].last_input() != Some(features.as_slice()) {
            self.forward(&features);
        }

        // output activation is the identity, so this is also the output layer gradient
        let mut gradient = self.loss.gradient(predicted, updated);
        let learning_rate = self.learning_rate;

        for layer in self.layers[1..].iter_mut().rev() {
            let local: Vec<f64> = match layer.last_output() {
                Some(outputs) => gradient
                    .iter()
                    .zip(outputs)
                    .map(|(g, &o)| g * layer.activation_derivative(o))
                    .collect(),
                None => panic!("complete forward pass first."),
            };

            // propagate with the weights the forward pass used
            let next_gradients = layer.calc_next_gradients(&local);
            let weight_gradients = layer.weight_gradients(&local);
            layer.update_weights(&weight_gradients, &local, learning_rate);
            gradient = next_gradients;
        }

        for layer in &mut self.layers {
            layer.clear_scratch();
        }
    }
}

// max over the actions that lead somewhere from `next`, all four if it is boxed in.
// Not a plain max over the outputs: wall-direction outputs are never trained and
// would otherwise leak their initial values into every target.
fn max_next_q(next: &State, q_next: &[f64]) -> f64 {
    let open: Vec<f64> = Action::ALL
        .iter()
        .filter(|action| next.is_path(**action))
        .map(|action| q_next[action.index()])
        .collect();
    let candidates = if open.is_empty() { q_next } else { &open[..] };
    candidates.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}
