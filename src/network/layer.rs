use rand::Rng;

use super::matrix::Matrix;
use crate::error::ConfigError;

// fully-connected weights shared by hidden and output layers

#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    pub weights: Matrix,
    pub biases: Vec<f64>,
    cached_input: Option<Vec<f64>>, // for back propagation
    cached_output: Option<Vec<f64>>,
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Result<Self, ConfigError> {
        let weights = Matrix::kaiming(input_size, output_size, rng)?;
        Ok(Self::from_parts(weights, vec![0.0; output_size]))
    }

    pub fn from_parts(weights: Matrix, biases: Vec<f64>) -> Self {
        assert_eq!(weights.cols(), biases.len(), "one bias per output neuron");
        Self {
            weights,
            biases,
            cached_input: None,
            cached_output: None,
        }
    }

    // bias[j] + sum_i input[i] * W[i][j]
    fn linear(&self, input: &[f64]) -> Vec<f64> {
        let mut output = self.weights.vec_mul(input);
        for (out, b) in output.iter_mut().zip(&self.biases) {
            *out += b;
        }
        output
    }
}


/// One stage of the network. Scratch from the last `forward` is kept for the
/// following backward pass only, so a layer must not serve two passes at once.
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Input {
        size: usize,
        cached_input: Option<Vec<f64>>,
    },
    Hidden(Dense),
    Output(Dense),
}

impl Layer {
    pub fn input(size: usize) -> Self {
        Layer::Input {
            size,
            cached_input: None,
        }
    }

    pub fn hidden<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Result<Self, ConfigError> {
        Ok(Layer::Hidden(Dense::new(input_size, output_size, rng)?))
    }

    pub fn output<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Result<Self, ConfigError> {
        Ok(Layer::Output(Dense::new(input_size, output_size, rng)?))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Layer::Input { .. } => "input",
            Layer::Hidden(_) => "hidden",
            Layer::Output(_) => "output",
        }
    }

    pub fn input_size(&self) -> usize {
        match self {
            Layer::Input { size, .. } => *size,
            Layer::Hidden(dense) | Layer::Output(dense) => dense.weights.rows(),
        }
    }

    pub fn output_size(&self) -> usize {
        match self {
            Layer::Input { size, .. } => *size,
            Layer::Hidden(dense) | Layer::Output(dense) => dense.weights.cols(),
        }
    }

    pub fn dense(&self) -> Option<&Dense> {
        match self {
            Layer::Input { .. } => None,
            Layer::Hidden(dense) | Layer::Output(dense) => Some(dense),
        }
    }

    pub fn dense_mut(&mut self) -> Option<&mut Dense> {
        match self {
            Layer::Input { .. } => None,
            Layer::Hidden(dense) | Layer::Output(dense) => Some(dense),
        }
    }

    /// Forward pass without recording scratch.
    pub fn evaluate(&self, input: &[f64]) -> Vec<f64> {
        assert_eq!(input.len(), self.input_size(), "{} layer got {} inputs, expected {}", self.kind(), input.len(), self.input_size());
        match self {
            Layer::Input { .. } => input.to_vec(),
            Layer::Hidden(dense) => dense.linear(input).into_iter().map(|x| x.max(0.0)).collect(),
            Layer::Output(dense) => dense.linear(input),
        }
    }

    pub fn forward(&mut self, input: &[f64]) -> Vec<f64> {
        let output = self.evaluate(input);
        match self {
            Layer::Input { cached_input, .. } => {
                *cached_input = Some(input.to_vec());
            }
            Layer::Hidden(dense) | Layer::Output(dense) => {
                dense.cached_input = Some(input.to_vec());
                dense.cached_output = Some(output.clone());
            }
        }
        output
    }

    pub fn last_input(&self) -> Option<&[f64]> {
        match self {
            Layer::Input { cached_input, .. } => cached_input.as_deref(),
            Layer::Hidden(dense) | Layer::Output(dense) => dense.cached_input.as_deref(),
        }
    }

    pub fn last_output(&self) -> Option<&[f64]> {
        match self {
            Layer::Input { cached_input, .. } => cached_input.as_deref(),
            Layer::Hidden(dense) | Layer::Output(dense) => dense.cached_output.as_deref(),
        }
    }

    pub fn clear_scratch(&mut self) {
        match self {
            Layer::Input { cached_input, .. } => *cached_input = None,
            Layer::Hidden(dense) | Layer::Output(dense) => {
                dense.cached_input = None;
                dense.cached_output = None;
            }
        }
    }

    pub fn activation_derivative(&self, output: f64) -> f64 {
        match self {
            Layer::Hidden(_) => relu_derivative(output),
            Layer::Input { .. } | Layer::Output(_) => 1.0,
        }
    }

    /// Gradient with respect to this layer's inputs, given the gradient with
    /// respect to its outputs.
    pub fn calc_next_gradients(&self, layer_gradients: &[f64]) -> Vec<f64> {
        assert_eq!(layer_gradients.len(), self.output_size(), "one gradient per output neuron");
        match self {
            Layer::Input { size, .. } => vec![0.0; *size],
            Layer::Hidden(dense) => {
                let outputs = match &dense.cached_output {
                    Some(outputs) => outputs,
                    None => panic!("complete forward pass first."),
                };
                let masked: Vec<f64> = layer_gradients
                    .iter()
                    .zip(outputs)
                    .map(|(g, &o)| g * relu_derivative(o))
                    .collect();
                dense.weights.mul_vec(&masked)
            }
            Layer::Output(dense) => dense.weights.mul_vec(layer_gradients),
        }
    }

    // dL/dW[i][j] = layer_gradients[j] * input[i]
    pub fn weight_gradients(&self, layer_gradients: &[f64]) -> Matrix {
        match self.last_input() {
            Some(_) if matches!(self, Layer::Input { .. }) => Matrix::zeros(self.input_size(), 0),
            Some(input) => Matrix::outer(input, layer_gradients),
            None => panic!("complete forward pass first."),
        }
    }

    pub fn update_weights(&mut self, weight_gradients: &Matrix, bias_gradients: &[f64], learning_rate: f64) {
        if let Some(dense) = self.dense_mut() {
            assert_eq!(bias_gradients.len(), dense.biases.len(), "one bias gradient per output neuron");
            dense.weights.sub_scaled(weight_gradients, learning_rate);
            for (b, db) in dense.biases.iter_mut().zip(bias_gradients) {
                *b -= learning_rate * db;
            }
        }
    }
}

pub fn relu_derivative(output: f64) -> f64 {
    if output > 0.0 { 1.0 } else { 0.0 }
}
