use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::maze::{Position, State};

/// How a valid move is scored. Reaching the goal always pays `goal`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardShaping {
    /// The same `step` reward for every non-goal move.
    Flat { goal: f64, step: f64 },
    /// Reduction in Manhattan distance to the goal, times `scale`.
    DistanceDelta { goal: f64, scale: f64 },
    /// `dead_end` when the destination has three or more walls around it.
    DeadEnd { goal: f64, step: f64, dead_end: f64 },
}

impl Default for RewardShaping {
    fn default() -> Self {
        RewardShaping::DistanceDelta { goal: 10.0, scale: 1.0 }
    }
}

pub fn manhattan((ax, ay): Position, (bx, by): Position) -> i32 {
    (ax - bx).abs() + (ay - by).abs()
}

impl RewardShaping {
    pub fn reward(&self, from: Position, to: &State, goal: Position) -> f64 {
        if to.position() == goal {
            return self.goal_reward();
        }
        match *self {
            RewardShaping::Flat { step, .. } => step,
            RewardShaping::DistanceDelta { scale, .. } => {
                (manhattan(from, goal) - manhattan(to.position(), goal)) as f64 * scale
            }
            RewardShaping::DeadEnd { step, dead_end, .. } => {
                if to.blocked_directions() >= 3 { dead_end } else { step }
            }
        }
    }

    pub fn goal_reward(&self) -> f64 {
        match *self {
            RewardShaping::Flat { goal, .. }
            | RewardShaping::DistanceDelta { goal, .. }
            | RewardShaping::DeadEnd { goal, .. } => goal,
        }
    }

    // single moves change the distance by exactly one
    fn best_step_reward(&self) -> f64 {
        match *self {
            RewardShaping::Flat { step, .. } => step,
            RewardShaping::DistanceDelta { scale, .. } => scale.abs(),
            RewardShaping::DeadEnd { step, dead_end, .. } => step.max(dead_end),
        }
    }

    /// The goal reward must beat every other reward, the invalid-move
    /// penalty included.
    pub fn validate(&self, invalid_move_penalty: f64) -> Result<(), ConfigError> {
        let goal = self.goal_reward();
        let best_step = self.best_step_reward();
        if !goal.is_finite() || !best_step.is_finite() || !invalid_move_penalty.is_finite() {
            return Err(ConfigError::Validation("rewards must be finite".into()));
        }
        if goal <= best_step {
            return Err(ConfigError::Validation(format!(
                "reward.goal ({goal}) must exceed the best step reward ({best_step})"
            )));
        }
        if goal <= invalid_move_penalty {
            return Err(ConfigError::Validation(format!(
                "reward.goal ({goal}) must exceed the invalid move penalty ({invalid_move_penalty})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maze::{Action, Surrounding};

    fn open_state(x: i32, y: i32) -> State {
        State::new(x, y, [Surrounding::Path; Action::COUNT])
    }

    #[test]
    fn test_goal_pays_goal_reward() {
        let shapings = [
            RewardShaping::Flat { goal: 5.0, step: -0.01 },
            RewardShaping::DistanceDelta { goal: 5.0, scale: 1.0 },
            RewardShaping::DeadEnd { goal: 5.0, step: -0.01, dead_end: -0.5 },
        ];
        for shaping in shapings {
            assert_eq!(shaping.reward((2, 3), &open_state(3, 3), (3, 3)), 5.0);
        }
    }

    #[test]
    fn test_distance_delta() {
        let shaping = RewardShaping::DistanceDelta { goal: 10.0, scale: 2.0 };
        assert_eq!(shaping.reward((0, 0), &open_state(1, 0), (3, 3)), 2.0);
        assert_eq!(shaping.reward((1, 0), &open_state(0, 0), (3, 3)), -2.0);
    }

    #[test]
    fn test_dead_end() {
        let shaping = RewardShaping::DeadEnd { goal: 10.0, step: -0.01, dead_end: -0.5 };
        let pocket = State::new(
            0,
            0,
            [Surrounding::Wall, Surrounding::Path, Surrounding::Wall, Surrounding::Wall],
        );
        assert_eq!(shaping.reward((0, 1), &pocket, (3, 3)), -0.5);
        assert_eq!(shaping.reward((0, 1), &open_state(1, 1), (3, 3)), -0.01);
    }

    #[test]
    fn test_validate_goal_is_maximum() {
        assert!(RewardShaping::default().validate(-1.0).is_ok());
        assert!(RewardShaping::DistanceDelta { goal: 0.5, scale: 1.0 }.validate(-1.0).is_err());
        assert!(RewardShaping::Flat { goal: 1.0, step: 2.0 }.validate(-1.0).is_err());
        assert!(RewardShaping::Flat { goal: 1.0, step: 0.0 }.validate(3.0).is_err());
        assert!(RewardShaping::Flat { goal: f64::NAN, step: 0.0 }.validate(-1.0).is_err());
    }

    #[test]
    fn test_deserialize_tagged() {
        let shaping: RewardShaping = toml::from_str("kind = \"flat\"\ngoal = 3.0\nstep = -0.1\n").unwrap();
        assert_eq!(shaping, RewardShaping::Flat { goal: 3.0, step: -0.1 });
    }
}
