pub mod policy;
pub mod replaybuffer;
pub mod reward;

use policy::{EpsilonSoft, PolicyConfig};
use replaybuffer::{Experience, ReplayBuffer, ReplayConfig};
use reward::RewardShaping;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::maze::{Action, Environment, State};
use crate::network::encoding::StateEncoder;
use crate::network::{Network, NetworkConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub network: NetworkConfig,
    pub replay: ReplayConfig,
    pub policy: PolicyConfig,
    pub reward: RewardShaping,
    pub batch_size: usize,
    /// Draw each training batch without replacement.
    pub distinct_batches: bool,
    pub invalid_move_penalty: f64,
    /// Fixed seed for weights, exploration and sampling; OS entropy when unset.
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            network: NetworkConfig::default(),
            replay: ReplayConfig::default(),
            policy: PolicyConfig::default(),
            reward: RewardShaping::default(),
            batch_size: 20,
            distinct_batches: false,
            invalid_move_penalty: -1.0,
            seed: None,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network.validate()?;
        self.policy.validate()?;
        self.reward.validate(self.invalid_move_penalty)?;
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.replay.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.batch_size > self.replay.capacity {
            return Err(ConfigError::BatchExceedsCapacity {
                batch_size: self.batch_size,
                capacity: self.replay.capacity,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Moved,
    ReachedGoal,
    /// The chosen direction was a wall or the grid edge; the state is unchanged.
    Blocked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub transition: Transition,
    pub experience: Experience,
}

/// Q-learning agent: picks moves with an epsilon-soft policy, stores every
/// transition and trains its network on a replayed batch after each step.
pub struct Agent {
    network: Network,
    replay_buffer: ReplayBuffer,
    policy: EpsilonSoft,
    reward: RewardShaping,

    batch_size: usize,
    distinct_batches: bool,
    invalid_move_penalty: f64,

    min_epsilon: f64,
    decay_rate: f64,
    decay_every: usize,
    valid_steps: usize,

    current_state: State,
    total_reward: f64,
    rng: StdRng,
}

impl Agent {
    pub fn new<E: Environment>(config: &AgentConfig, env: &E, start: State) -> Result<Self, ConfigError> {
        config.validate()?;

        let (width, height) = env.dimensions();
        let (x, y) = start.position();
        if x < 0 || y < 0 || x as usize >= width || y as usize >= height {
            return Err(ConfigError::Validation(format!("start {start} lies outside the {width}x{height} maze")));
        }
        if !env.is_open_cell(start.position()) {
            return Err(ConfigError::Validation(format!("start {start} is not an open cell")));
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let encoder = StateEncoder::new(config.network.encoding, env.dimensions());
        let network = Network::new(&config.network, encoder, &mut rng)?;

        Ok(Self {
            network,
            replay_buffer: ReplayBuffer::from_config(&config.replay)?,
            policy: EpsilonSoft::from_config(&config.policy)?,
            reward: config.reward,
            batch_size: config.batch_size,
            distinct_batches: config.distinct_batches,
            invalid_move_penalty: config.invalid_move_penalty,
            min_epsilon: config.policy.min_epsilon,
            decay_rate: config.policy.decay_rate,
            decay_every: config.policy.decay_every,
            valid_steps: 0,
            current_state: start,
            total_reward: 0.0,
            rng,
        })
    }

    /// Chooses one of `available`, applies it to `env`, stores the resulting
    /// experience and trains on a batch. `None` when nothing is available.
    pub fn step<E: Environment>(&mut self, env: &E, available: &[Action]) -> Option<StepOutcome> {
        let q_values = self.network.predict(&self.current_state);
        let action = self.policy.select_action(&q_values, available, &mut self.rng)?;

        let outcome = match env.next_state(&self.current_state, action) {
            Some(next) => {
                let goal = env.goal_position();
                let reward = self.reward.reward(self.current_state.position(), &next, goal);
                let reached_goal = next.position() == goal;
                let experience = if reached_goal {
                    Experience::new(self.current_state.clone(), action, reward, None)
                } else {
                    let lookahead = self.greedy_action(&next, &env.legal_actions(&next));
                    let experience = Experience::new(self.current_state.clone(), action, reward, Some(next.clone()));
                    match lookahead {
                        Some(next_action) => experience.with_next_action(next_action),
                        None => experience,
                    }
                };

                self.record(experience.clone());

                self.valid_steps += 1;
                if self.valid_steps % self.decay_every == 0 {
                    self.policy.decay(self.decay_rate, self.min_epsilon);
                }
                self.current_state = next;

                StepOutcome {
                    transition: if reached_goal { Transition::ReachedGoal } else { Transition::Moved },
                    experience,
                }
            }
            None => {
                let experience = Experience::new(self.current_state.clone(), action, self.invalid_move_penalty, None);
                self.record(experience.clone());
                StepOutcome {
                    transition: Transition::Blocked,
                    experience,
                }
            }
        };

        debug!(
            action = %action,
            transition = ?outcome.transition,
            reward = outcome.experience.reward,
            state = %self.current_state,
            epsilon = self.policy.epsilon(),
            "agent step"
        );
        Some(outcome)
    }

    fn record(&mut self, experience: Experience) {
        self.total_reward += experience.reward;
        self.replay_buffer.add(experience, &mut self.rng);
        self.train_with_batch();
    }

    /// Trains on `batch_size` replayed experiences in sampled order and
    /// returns their mean loss. `None` until the buffer holds a full batch.
    pub fn train_with_batch(&mut self) -> Option<f64> {
        if self.replay_buffer.len() < self.batch_size {
            trace!(stored = self.replay_buffer.len(), batch_size = self.batch_size, "not enough experiences to train");
            return None;
        }

        let batch = self.replay_buffer.sample_batch(self.batch_size, self.distinct_batches, &mut self.rng);
        let total: f64 = batch.iter().map(|experience| self.network.train(experience)).sum();
        let mean_loss = total / batch.len() as f64;
        trace!(mean_loss, "trained batch");
        Some(mean_loss)
    }

    pub fn current_state(&self) -> &State {
        &self.current_state
    }

    pub fn set_current_state(&mut self, state: State) {
        self.current_state = state;
    }

    pub fn total_reward(&self) -> f64 {self.total_reward}

    pub fn set_total_reward(&mut self, total_reward: f64) {
        self.total_reward = total_reward;
    }

    pub fn epsilon(&self) -> f64 {self.policy.epsilon()}

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.policy.set_epsilon(epsilon);
    }

    /// Q-values for the current state.
    pub fn q_values(&self) -> Vec<f64> {
        self.network.infer(&self.current_state)
    }

    pub fn greedy_action(&self, state: &State, available: &[Action]) -> Option<Action> {
        self.policy.greedy_action(&self.network.infer(state), available)
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn replay_buffer(&self) -> &ReplayBuffer {
        &self.replay_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maze::{GridMaze, Surrounding};
    use crate::network::layer::Layer;

    fn maze() -> GridMaze {
        GridMaze::open(4, 4, (3, 3)).unwrap()
    }

    fn config() -> AgentConfig {
        AgentConfig {
            network: NetworkConfig {
                hidden_sizes: vec![8],
                ..NetworkConfig::default()
            },
            batch_size: 2,
            seed: Some(1),
            ..AgentConfig::default()
        }
    }

    fn agent_at(config: &AgentConfig, maze: &GridMaze, x: i32, y: i32) -> Agent {
        Agent::new(config, maze, maze.state_at(x, y).unwrap()).unwrap()
    }

    #[test]
    fn test_blocked_move_keeps_state() {
        let maze = maze();
        let mut agent = agent_at(&config(), &maze, 0, 0);
        let before = agent.current_state().clone();

        let outcome = agent.step(&maze, &[Action::West]).unwrap();

        assert_eq!(outcome.transition, Transition::Blocked);
        assert_eq!(agent.current_state(), &before);
        assert_eq!(outcome.experience.reward, -1.0);
        assert!(outcome.experience.is_terminal());
        assert_eq!(agent.replay_buffer().len(), 1);
        assert_eq!(agent.total_reward(), -1.0);
        assert_eq!(agent.epsilon(), 1.0);
    }

    #[test]
    fn test_valid_move() {
        let maze = maze();
        let mut agent = agent_at(&config(), &maze, 0, 0);

        let outcome = agent.step(&maze, &[Action::East]).unwrap();

        assert_eq!(outcome.transition, Transition::Moved);
        assert_eq!(agent.current_state().position(), (1, 0));
        assert_eq!(outcome.experience.reward, 1.0);
        assert_eq!(outcome.experience.next_state.as_ref().map(|s| s.position()), Some((1, 0)));
        assert!((agent.epsilon() - 0.999).abs() < 1e-12);
    }

    #[test]
    fn test_valid_move_records_greedy_next_action() {
        let maze = maze();
        let mut agent = agent_at(&config(), &maze, 0, 0);

        // a single stored experience is below the batch size, so no weights change
        let outcome = agent.step(&maze, &[Action::East]).unwrap();

        let next = outcome.experience.next_state.clone().unwrap();
        let legal = maze.legal_actions(&next);
        let next_action = outcome.experience.next_action.unwrap();
        assert!(legal.contains(&next_action));
        assert_eq!(agent.greedy_action(&next, &legal), Some(next_action));
    }

    #[test]
    fn test_reaching_goal_is_terminal() {
        let maze = maze();
        let mut agent = agent_at(&config(), &maze, 2, 3);

        let outcome = agent.step(&maze, &[Action::East]).unwrap();

        assert_eq!(outcome.transition, Transition::ReachedGoal);
        assert_eq!(outcome.experience.reward, 10.0);
        assert!(outcome.experience.is_terminal());
        assert_eq!(outcome.experience.next_action, None);
        assert_eq!(agent.current_state().position(), (3, 3));
    }

    #[test]
    fn test_no_available_actions() {
        let maze = maze();
        let mut agent = agent_at(&config(), &maze, 1, 1);
        assert!(agent.step(&maze, &[]).is_none());
        assert!(agent.replay_buffer().is_empty());
    }

    #[test]
    fn test_train_with_batch_waits_for_full_batch() {
        let maze = maze();
        let mut agent = agent_at(&config(), &maze, 0, 0);
        assert_eq!(agent.train_with_batch(), None);

        agent.step(&maze, &[Action::East]);
        assert_eq!(agent.train_with_batch(), None);

        agent.step(&maze, &[Action::East]);
        let loss = agent.train_with_batch();
        assert!(loss.is_some_and(|l| l.is_finite() && l >= 0.0));
    }

    #[test]
    fn test_epsilon_decay_floor() {
        let maze = maze();
        let mut config = config();
        config.policy = PolicyConfig {
            epsilon: 0.11,
            min_epsilon: 0.1,
            decay_rate: 0.5,
            ..PolicyConfig::default()
        };
        let mut agent = agent_at(&config, &maze, 0, 0);

        agent.step(&maze, &[Action::East]);
        assert_eq!(agent.epsilon(), 0.1);
        agent.step(&maze, &[Action::East]);
        assert_eq!(agent.epsilon(), 0.1);
    }

    #[test]
    fn test_decay_every_counts_valid_steps() {
        let maze = maze();
        let mut config = config();
        config.policy.decay_every = 2;
        config.policy.decay_rate = 0.5;
        let mut agent = agent_at(&config, &maze, 0, 0);

        agent.step(&maze, &[Action::East]);
        // north from the top row is blocked and does not count
        agent.step(&maze, &[Action::North]);
        assert_eq!(agent.epsilon(), 1.0);
        agent.step(&maze, &[Action::East]);
        assert_eq!(agent.epsilon(), 0.5);
    }

    #[test]
    fn test_start_on_wall_rejected() {
        // 0 0 0
        // 1 1 0
        // 0 0 0
        let corridor = GridMaze::from_csv_reader("0,0,0\n1,1,0\n0,0,0\n".as_bytes(), Some((0, 2))).unwrap();
        let on_wall = State::new(0, 1, [Surrounding::Path; Action::COUNT]);

        let result = Agent::new(&config(), &corridor, on_wall);
        assert!(matches!(result, Err(ConfigError::Validation(msg)) if msg.contains("not an open cell")));
    }

    #[test]
    fn test_default_network_trains_through_both_hidden_layers() {
        let maze = maze();
        let config = AgentConfig {
            seed: Some(21),
            ..AgentConfig::default()
        };
        assert_eq!(config.network.hidden_sizes, vec![32, 16]);
        let mut agent = agent_at(&config, &maze, 0, 0);
        let before: Vec<Layer> = agent.network().layers().to_vec();

        let mut losses = Vec::new();
        for _ in 0..60 {
            let available = maze.legal_actions(agent.current_state());
            let outcome = agent.step(&maze, &available).unwrap();
            if outcome.transition == Transition::ReachedGoal {
                agent.set_current_state(maze.state_at(0, 0).unwrap());
            }
            losses.extend(agent.train_with_batch());
        }

        assert!(!losses.is_empty());
        assert!(losses.iter().all(|l| l.is_finite()));
        let after = agent.network().layers();
        assert_eq!(after.len(), 4);
        for (idx, (old, new)) in before.iter().zip(after).enumerate().skip(1) {
            let (old, new) = (old.dense().unwrap(), new.dense().unwrap());
            assert_ne!(old.weights, new.weights, "{} layer {} never updated", after[idx].kind(), idx);
        }
    }

    #[test]
    fn test_seeded_agents_agree() {
        let maze = maze();
        let a = agent_at(&config(), &maze, 1, 2);
        let b = agent_at(&config(), &maze, 1, 2);
        assert_eq!(a.q_values(), b.q_values());
    }

    #[test]
    fn test_greedy_action_is_available() {
        let maze = maze();
        let agent = agent_at(&config(), &maze, 0, 0);
        let state = agent.current_state().clone();
        let available = maze.legal_actions(&state);
        let action = agent.greedy_action(&state, &available).unwrap();
        assert!(available.contains(&action));
    }

    #[test]
    fn test_config_errors() {
        let maze = maze();
        let start = maze.state_at(0, 0).unwrap();

        let zero_batch = AgentConfig { batch_size: 0, ..config() };
        assert!(matches!(Agent::new(&zero_batch, &maze, start.clone()), Err(ConfigError::ZeroBatchSize)));

        let mut oversized = config();
        oversized.batch_size = 50;
        oversized.replay.capacity = 10;
        assert!(matches!(
            Agent::new(&oversized, &maze, start.clone()),
            Err(ConfigError::BatchExceedsCapacity { batch_size: 50, capacity: 10 })
        ));

        let mut weak_goal = config();
        weak_goal.reward = RewardShaping::Flat { goal: -2.0, step: -3.0 };
        assert!(matches!(Agent::new(&weak_goal, &maze, start.clone()), Err(ConfigError::Validation(_))));

        let outside = State::new(9, 9, *start.surroundings());
        assert!(matches!(Agent::new(&config(), &maze, outside), Err(ConfigError::Validation(_))));
    }
}
