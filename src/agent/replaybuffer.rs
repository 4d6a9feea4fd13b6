use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::maze::{Action, State};

/// One transition. `next_state == None` means there is nothing to bootstrap
/// from: the goal was reached or the move was blocked. `next_action` is the
/// greedy choice at `next_state` when the transition was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Experience {
    pub state: State,
    pub action: Action,
    pub reward: f64,
    pub next_state: Option<State>,
    pub next_action: Option<Action>,
}

impl Experience {
    pub fn new(state: State, action: Action, reward: f64, next_state: Option<State>) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            next_action: None,
        }
    }

    pub fn with_next_action(mut self, next_action: Action) -> Self {
        self.next_action = Some(next_action);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.next_state.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub capacity: usize,
    pub reject_duplicates: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig {
            capacity: 1000,
            reject_duplicates: false,
        }
    }
}

/// Bounded pool of experiences. Once full, a new experience replaces a
/// uniformly random one rather than the oldest.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    buffer: Vec<Experience>,
    capacity: usize,
    reject_duplicates: bool,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            reject_duplicates: false,
        })
    }

    pub fn from_config(config: &ReplayConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.capacity)?.with_duplicate_rejection(config.reject_duplicates))
    }

    pub fn with_duplicate_rejection(mut self, reject: bool) -> Self {
        self.reject_duplicates = reject;
        self
    }

    /// Returns false when the experience was skipped as a duplicate.
    pub fn add<R: Rng + ?Sized>(&mut self, experience: Experience, rng: &mut R) -> bool {
        if self.reject_duplicates && self.contains(&experience) {
            return false;
        }

        if self.buffer.len() < self.capacity {
            self.buffer.push(experience);
        } else {
            let slot = rng.random_range(0..self.buffer.len());
            self.buffer[slot] = experience;
        }
        true
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Experience> {
        if self.buffer.is_empty() {
            return None;
        }
        self.buffer.get(rng.random_range(0..self.buffer.len()))
    }

    /// `batch_size` experiences drawn with replacement, or without when
    /// `distinct` is set and the buffer holds enough of them.
    pub fn sample_batch<R: Rng + ?Sized>(&self, batch_size: usize, distinct: bool, rng: &mut R) -> Vec<Experience> {
        if self.buffer.is_empty() {
            return Vec::new();
        }

        if distinct && batch_size <= self.buffer.len() {
            index::sample(rng, self.buffer.len(), batch_size)
                .iter()
                .map(|i| self.buffer[i].clone())
                .collect()
        } else {
            (0..batch_size)
                .map(|_| self.buffer[rng.random_range(0..self.buffer.len())].clone())
                .collect()
        }
    }

    pub fn contains(&self, experience: &Experience) -> bool {
        self.buffer.iter().any(|e| e == experience)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {self.capacity}

    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.buffer.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maze::Surrounding;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn experience(i: i32) -> Experience {
        let state = State::new(i, 0, [Surrounding::Path; Action::COUNT]);
        let next = State::new(i + 1, 0, [Surrounding::Path; Action::COUNT]);
        Experience::new(state, Action::East, i as f64, Some(next))
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(ReplayBuffer::new(0), Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn test_replay_buffer() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut buffer = ReplayBuffer::new(100).unwrap();

        for i in 0..10 {
            assert!(buffer.add(experience(i), &mut rng));
        }
        assert_eq!(buffer.len(), 10);

        let batch = buffer.sample_batch(5, false, &mut rng);
        assert_eq!(batch.len(), 5);
        assert!(batch.iter().all(|e| buffer.contains(e)));

        for i in 10..110 {
            buffer.add(experience(i), &mut rng);
        }
        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.capacity(), 100);
    }

    #[test]
    fn test_full_buffer_replaces_random_slot() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut buffer = ReplayBuffer::new(3).unwrap();
        for i in 0..4 {
            buffer.add(experience(i), &mut rng);
        }

        assert_eq!(buffer.len(), 3);
        assert!(buffer.contains(&experience(3)));
        let survivors = (0..3).filter(|&i| buffer.contains(&experience(i))).count();
        assert_eq!(survivors, 2);
    }

    #[test]
    fn test_sample_empty() {
        let mut rng = StdRng::seed_from_u64(0);
        let buffer = ReplayBuffer::new(5).unwrap();
        assert!(buffer.sample(&mut rng).is_none());
        assert!(buffer.sample_batch(3, false, &mut rng).is_empty());
    }

    #[test]
    fn test_duplicate_rejection() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut buffer = ReplayBuffer::new(10).unwrap().with_duplicate_rejection(true);
        assert!(buffer.add(experience(1), &mut rng));
        assert!(!buffer.add(experience(1), &mut rng));
        assert_eq!(buffer.len(), 1);

        let mut permissive = ReplayBuffer::new(10).unwrap();
        permissive.add(experience(1), &mut rng);
        permissive.add(experience(1), &mut rng);
        assert_eq!(permissive.len(), 2);
    }

    #[test]
    fn test_distinct_batch() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut buffer = ReplayBuffer::new(10).unwrap();
        for i in 0..10 {
            buffer.add(experience(i), &mut rng);
        }

        let batch = buffer.sample_batch(10, true, &mut rng);
        for i in 0..10 {
            assert!(batch.contains(&experience(i)));
        }

        // more than stored falls back to sampling with replacement
        assert_eq!(buffer.sample_batch(25, true, &mut rng).len(), 25);
    }

    #[test]
    fn test_experience_terminal() {
        let e = experience(0);
        assert!(!e.is_terminal());
        let blocked = Experience::new(e.state.clone(), Action::West, -1.0, None).with_next_action(Action::North);
        assert!(blocked.is_terminal());
        assert_eq!(blocked.next_action, Some(Action::North));
    }

    proptest! {
        #[test]
        fn test_len_never_exceeds_capacity(capacity in 1usize..50, inserts in 0usize..200, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut buffer = ReplayBuffer::new(capacity).unwrap();
            for i in 0..inserts {
                buffer.add(experience(i as i32), &mut rng);
                prop_assert!(buffer.len() <= capacity);
            }
            prop_assert_eq!(buffer.len(), inserts.min(capacity));
        }

        #[test]
        fn test_sample_returns_member(inserts in 1usize..40, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut buffer = ReplayBuffer::new(16).unwrap();
            for i in 0..inserts {
                buffer.add(experience(i as i32), &mut rng);
            }
            let sampled = buffer.sample(&mut rng).cloned();
            prop_assert!(sampled.is_some());
            prop_assert!(buffer.contains(&sampled.unwrap()));
        }
    }
}
