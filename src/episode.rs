use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::{Agent, AgentConfig, Transition};
use crate::error::ConfigError;
use crate::maze::{Action, Environment, Position, State};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: usize,
    pub max_steps_per_episode: usize,
    /// Offer all four directions each step instead of only the open ones,
    /// so walls are learned through the invalid-move penalty.
    pub explore_walls: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            episodes: 300,
            max_steps_per_episode: 200,
            explore_walls: false,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.episodes == 0 {
            return Err(ConfigError::Validation("training.episodes must be > 0".into()));
        }
        if self.max_steps_per_episode == 0 {
            return Err(ConfigError::Validation("training.max_steps_per_episode must be > 0".into()));
        }
        Ok(())
    }
}

/// One row of the statistics CSV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeStats {
    pub episode: usize,
    pub steps: usize,
    pub blocked: usize,
    pub reached_goal: bool,
    pub total_reward: f64,
    pub epsilon: f64,
}

fn offered_actions<E: Environment>(env: &E, state: &State, explore_walls: bool) -> Vec<Action> {
    if explore_walls {
        Action::ALL.to_vec()
    } else {
        env.legal_actions(state)
    }
}

/// Resets the agent to `start` and steps until the goal or `max_steps`.
pub fn run_episode<E: Environment>(
    agent: &mut Agent,
    env: &E,
    start: &State,
    max_steps: usize,
    explore_walls: bool,
    episode: usize,
) -> EpisodeStats {
    agent.set_current_state(start.clone());
    agent.set_total_reward(0.0);

    let mut steps = 0;
    let mut blocked = 0;
    let mut reached_goal = false;

    while steps < max_steps {
        let available = offered_actions(env, agent.current_state(), explore_walls);
        let Some(outcome) = agent.step(env, &available) else {
            debug!(episode, state = %agent.current_state(), "no action available");
            break;
        };
        steps += 1;
        match outcome.transition {
            Transition::Moved => {}
            Transition::Blocked => blocked += 1,
            Transition::ReachedGoal => {
                reached_goal = true;
                break;
            }
        }
    }

    let stats = EpisodeStats {
        episode,
        steps,
        blocked,
        reached_goal,
        total_reward: agent.total_reward(),
        epsilon: agent.epsilon(),
    };
    debug!(?stats, "episode finished");
    stats
}

pub fn train<E: Environment>(agent: &mut Agent, env: &E, start: &State, config: &TrainingConfig) -> Vec<EpisodeStats> {
    (0..config.episodes)
        .map(|episode| {
            let stats = run_episode(agent, env, start, config.max_steps_per_episode, config.explore_walls, episode);
            if (episode + 1) % 50 == 0 {
                info!(episode = episode + 1, steps = stats.steps, reward = stats.total_reward, epsilon = stats.epsilon, "training progress");
            }
            stats
        })
        .collect()
}

/// Runs episodes until `total_steps` steps have been taken; the last episode
/// is cut short if needed. Returns the number of episodes that reached the goal.
pub fn train_for_steps<E: Environment>(
    agent: &mut Agent,
    env: &E,
    start: &State,
    total_steps: usize,
    max_steps_per_episode: usize,
) -> usize {
    let mut remaining = total_steps;
    let mut goals = 0;
    let mut episode = 0;
    while remaining > 0 {
        let stats = run_episode(agent, env, start, max_steps_per_episode.min(remaining), false, episode);
        if stats.steps == 0 {
            break;
        }
        remaining -= stats.steps;
        goals += usize::from(stats.reached_goal);
        episode += 1;
    }
    goals
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rollout {
    pub path: Vec<Position>,
    pub reached_goal: bool,
}

impl Rollout {
    pub fn steps(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}

/// Follows the highest-valued open action from `start` without training or
/// touching the agent's state.
pub fn greedy_rollout<E: Environment>(agent: &Agent, env: &E, start: &State, max_steps: usize) -> Rollout {
    let goal = env.goal_position();
    let mut state = start.clone();
    let mut path = vec![state.position()];

    for _ in 0..max_steps {
        if state.position() == goal {
            break;
        }
        let available = env.legal_actions(&state);
        let Some(next) = agent
            .greedy_action(&state, &available)
            .and_then(|action| env.next_state(&state, action))
        else {
            break;
        };
        path.push(next.position());
        state = next;
    }

    Rollout {
        reached_goal: state.position() == goal,
        path,
    }
}

/// Trains one independent agent per seed in parallel and returns each
/// agent's greedy rollout, in seed order.
pub fn run_trials<E, F>(
    config: &AgentConfig,
    env: &E,
    start: &State,
    seeds: &[u64],
    train_agent: F,
) -> Result<Vec<Rollout>, ConfigError>
where
    E: Environment + Sync,
    F: Fn(&mut Agent) + Sync,
{
    let (width, height) = env.dimensions();
    seeds
        .par_iter()
        .map(|&seed| {
            let config = AgentConfig {
                seed: Some(seed),
                ..config.clone()
            };
            let mut agent = Agent::new(&config, env, start.clone())?;
            train_agent(&mut agent);
            let rollout = greedy_rollout(&agent, env, start, width * height);
            debug!(seed, steps = rollout.steps(), reached_goal = rollout.reached_goal, "trial finished");
            Ok(rollout)
        })
        .collect()
}

/// Fraction of rollouts that reached the goal, within `max_path_steps`
/// when given.
pub fn success_rate(rollouts: &[Rollout], max_path_steps: Option<usize>) -> f64 {
    if rollouts.is_empty() {
        return 0.0;
    }
    let successes = rollouts
        .iter()
        .filter(|r| r.reached_goal && max_path_steps.is_none_or(|max| r.steps() <= max))
        .count();
    successes as f64 / rollouts.len() as f64
}
