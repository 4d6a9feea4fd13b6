pub mod error;
pub mod maze;

pub use error::{ConfigError, MazeError};
pub use maze::{
    Action,
    Cell,
    Environment,
    GridMaze,
    Position,
    State,
    Surrounding,
};

pub mod network;

pub use network::layer::{Dense, Layer};
pub use network::matrix::Matrix;
pub use network::encoding::{Encoding, StateEncoder};
pub use network::{Network, NetworkConfig};

pub mod agent;

pub use agent::{Agent, AgentConfig, StepOutcome, Transition};
pub use agent::policy::{EpsilonSoft, PolicyConfig, softmax};
pub use agent::replaybuffer::{Experience, ReplayBuffer, ReplayConfig};
pub use agent::reward::RewardShaping;

pub mod config;
pub mod episode;

pub use config::AppConfig;
pub use episode::{EpisodeStats, Rollout, TrainingConfig};
