//! Error types shared across the crate.

use std::path::PathBuf;

use glam::DVec3;

/// Failures while building or running a brain.
#[derive(Debug, thiserror::Error)]
pub enum BrainError {
    /// Genome length does not match the parameter count of the architecture.
    #[error("genome size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Byte length implied by the layout.
        expected: usize,
        /// Byte length actually present.
        actual: usize,
    },
    /// No architecture is registered under this index.
    #[error("unsupported model index {0}")]
    UnsupportedModel(usize),
    /// The architecture does not implement this operation.
    #[error("operation not supported by this brain: {0}")]
    UnsupportedOperation(&'static str),
    /// An arena-backed brain was requested without an arena.
    #[error("externally indexed brain requires a weight arena")]
    ArenaRequired,
    /// An arena index points past the last member.
    #[error("arena index {index} out of range for {len} members")]
    IndexOutOfRange {
        /// Requested member.
        index: usize,
        /// Arena size.
        len: usize,
    },
    /// Input or output buffer lengths do not match the brain.
    #[error("brain expects {expected} values, got {actual}")]
    Arity {
        /// Declared length.
        expected: usize,
        /// Length passed in.
        actual: usize,
    },
}

/// Failure reported by a fitness evaluation callback.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct EvalError(pub String);

impl From<BrainError> for EvalError {
    fn from(err: BrainError) -> Self {
        Self(err.to_string())
    }
}

impl From<SimError> for EvalError {
    fn from(err: SimError) -> Self {
        Self(err.to_string())
    }
}

/// Failures while setting up or running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The brain could not be run.
    #[error(transparent)]
    Brain(#[from] BrainError),
    /// Every placement slot was off the map or inside a wall.
    #[error("none of {requested} units could be placed around {start}")]
    NoUnitsPlaced {
        /// Units asked for.
        requested: usize,
        /// Centre of the placement grid.
        start: DVec3,
    },
}

/// Failures while reading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("config file {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid JSON for the expected structure.
    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures while writing or reading checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Filesystem failure.
    #[error("checkpoint io: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization failure.
    #[error("checkpoint json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures that end a training run.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    /// Parameters were rejected before any work started.
    #[error("invalid training parameters: {0}")]
    InvalidParams(String),
    /// `start` was called on a trainer that is not idle.
    #[error("trainer already started")]
    AlreadyStarted,
    /// A genome could not be turned into a brain.
    #[error(transparent)]
    Brain(#[from] BrainError),
    /// An evaluation callback failed.
    #[error("evaluation of epoch {epoch} member {index} failed: {source}")]
    Evaluation {
        /// Epoch index.
        epoch: usize,
        /// Population index.
        index: usize,
        /// Error returned by the callback.
        source: EvalError,
    },
    /// The strategy produced no genomes for the next epoch.
    #[error("strategy produced an empty population after epoch {epoch}")]
    EmptyPopulation {
        /// Epoch that produced the empty generation.
        epoch: usize,
    },
    /// The worker pool could not be created.
    #[error("worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// The training thread could not be spawned.
    #[error("spawning training thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// `join` was called on a trainer with no running thread.
    #[error("trainer is not running")]
    NotStarted,
    /// A panic escaped the epoch loop.
    #[error("training thread panicked: {0}")]
    Panicked(String),
    /// Periodic checkpoint failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}
