use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::maze::Action;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub epsilon: f64,
    pub min_epsilon: f64,
    pub decay_rate: f64,
    /// Valid steps between two decays.
    pub decay_every: usize,
    /// Softmax temperature.
    pub tau: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            epsilon: 1.0,
            min_epsilon: 0.1,
            decay_rate: 0.999,
            decay_every: 1,
            tau: 0.5,
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(ConfigError::Validation(format!("policy.epsilon must be in [0, 1], got {}", self.epsilon)));
        }
        if !(0.0..=1.0).contains(&self.min_epsilon) {
            return Err(ConfigError::Validation(format!("policy.min_epsilon must be in [0, 1], got {}", self.min_epsilon)));
        }
        if self.min_epsilon > self.epsilon {
            return Err(ConfigError::Validation("policy.min_epsilon must be <= policy.epsilon".into()));
        }
        if !(self.decay_rate > 0.0 && self.decay_rate <= 1.0) {
            return Err(ConfigError::Validation(format!("policy.decay_rate must be in (0, 1], got {}", self.decay_rate)));
        }
        if self.decay_every == 0 {
            return Err(ConfigError::Validation("policy.decay_every must be > 0".into()));
        }
        if !(self.tau > 0.0 && self.tau.is_finite()) {
            return Err(ConfigError::Validation(format!("policy.tau must be > 0, got {}", self.tau)));
        }
        Ok(())
    }
}

/// Explores uniformly with probability epsilon, otherwise samples from a
/// softmax over the Q-values of the available actions.
#[derive(Debug, Clone, PartialEq)]
pub struct EpsilonSoft {
    epsilon: f64,
    tau: f64,
}

impl EpsilonSoft {
    pub fn new(epsilon: f64, tau: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(ConfigError::Validation(format!("epsilon must be in [0, 1], got {epsilon}")));
        }
        if !(tau > 0.0 && tau.is_finite()) {
            return Err(ConfigError::Validation(format!("tau must be > 0, got {tau}")));
        }
        Ok(Self { epsilon, tau })
    }

    pub fn from_config(config: &PolicyConfig) -> Result<Self, ConfigError> {
        Self::new(config.epsilon, config.tau)
    }

    pub fn epsilon(&self) -> f64 {self.epsilon}
    pub fn tau(&self) -> f64 {self.tau}

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    /// `epsilon = max(epsilon * rate, floor)`, only while above the floor.
    pub fn decay(&mut self, rate: f64, floor: f64) {
        if self.epsilon > floor {
            self.epsilon = (self.epsilon * rate).max(floor);
        }
    }

    pub fn select_action<R: Rng + ?Sized>(&self, q_values: &[f64], available: &[Action], rng: &mut R) -> Option<Action> {
        assert_eq!(q_values.len(), Action::COUNT, "one Q-value per action");
        if available.is_empty() {
            return None;
        }

        if rng.random::<f64>() < self.epsilon {
            return available.choose(rng).copied();
        }

        let values: Vec<f64> = available.iter().map(|a| q_values[a.index()]).collect();
        let probabilities = softmax(&values, self.tau);
        let u = rng.random::<f64>();

        let mut cumulative = 0.0;
        for (action, p) in available.iter().zip(&probabilities) {
            cumulative += p;
            if cumulative >= u {
                return Some(*action);
            }
        }
        // rounding left the total just below u
        available.last().copied()
    }

    /// Highest-valued available action; the first one wins ties.
    pub fn greedy_action(&self, q_values: &[f64], available: &[Action]) -> Option<Action> {
        assert_eq!(q_values.len(), Action::COUNT, "one Q-value per action");
        let mut best: Option<(Action, f64)> = None;
        for &action in available {
            let value = q_values[action.index()];
            match best {
                Some((_, best_value)) if value <= best_value => {}
                _ => best = Some((action, value)),
            }
        }
        best.map(|(action, _)| action)
    }
}

/// `exp(v / tau)` normalised, with the maximum subtracted first.
pub fn softmax(values: &[f64], tau: f64) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| ((v - max) / tau).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
