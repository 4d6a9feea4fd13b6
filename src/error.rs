use std::path::PathBuf;

/// Errors raised while building a network, buffer, policy or agent from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("network needs at least one hidden layer")]
    EmptyHiddenLayers,

    #[error("layer {layer} has zero size")]
    ZeroLayerSize { layer: usize },

    #[error("layer {layer} outputs {output} values but the next layer expects {next_input}")]
    LayerSizeMismatch {
        layer: usize,
        output: usize,
        next_input: usize,
    },

    #[error("layer {layer} must be {expected} layer")]
    MisplacedLayer { layer: usize, expected: &'static str },

    #[error("state encoding produces {features} features but the input layer takes {input}")]
    InputSizeMismatch { features: usize, input: usize },

    #[error("output layer produces {actual} values, expected one per action ({expected})")]
    OutputSizeMismatch { expected: usize, actual: usize },

    #[error("batch size must be > 0")]
    ZeroBatchSize,

    #[error("replay buffer capacity must be > 0")]
    ZeroCapacity,

    #[error("batch size {batch_size} exceeds replay capacity {capacity}")]
    BatchExceedsCapacity { batch_size: usize, capacity: usize },

    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

/// Errors raised while building a grid maze.
#[derive(Debug, thiserror::Error)]
pub enum MazeError {
    #[error("maze has no cells")]
    Empty,

    #[error("invalid cell {value:?} at row {row}, column {column} (expected 0 or 1)")]
    InvalidCell {
        row: usize,
        column: usize,
        value: String,
    },

    #[error("row {row} has {actual} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("goal ({x}, {y}) is not an open cell")]
    GoalNotOpen { x: i32, y: i32 },

    #[error("maze has no open cell to place the goal on")]
    NoOpenCell,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
