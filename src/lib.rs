//! # Pathfinder - Evolved Vehicle Brains
//!
//! Small neural networks learn to drive vehicles across procedurally generated
//! heightmap terrain toward a target point. A genetic algorithm ranks each
//! population by simulation cost and breeds the next one.
//!
//! ## Features
//!
//! - Genome byte codec with typed parameter layouts
//! - Two brain architectures: dense GELU network and arena-backed tanh network
//! - Rigid-body vehicles with probe sensors over a raycast heightmap
//! - Epoch-based trainer with a rayon worker pool and cooperative shutdown
//! - JSON scenario configuration and checkpoints
//!
//! ## Core Modules
//!
//! - [`genome`] - Genome byte buffer and parameter layouts
//! - [`brain`] - Neural network architectures
//! - [`simulation::sim`] - Per-tick evaluation loop
//! - [`training::trainer`] - Epoch loop state machine
//! - [`training::strategy`] - Evolution strategies per model
//! - [`scenario`] - Terrain variants, fitness callback and replay

pub mod brain;
/// JSON snapshots of training progress.
pub mod checkpoint;
/// Error types shared across the crate.
pub mod error;
/// Model registry keyed by model index.
pub mod factory;
/// Genome byte codec and parameter layouts.
pub mod genome;
pub mod scenario;

/// Vehicles, terrain and the evaluation loop.
pub mod simulation {
    /// Newtonian point mass integrator.
    pub mod rigid_body;
    /// Sensor and control layouts and the cost model.
    pub mod sensors;
    /// Per-tick evaluation of a brain.
    pub mod sim;
    pub mod terrain;
    /// Vehicle control mapping and stuck detection.
    pub mod unit;
}

/// Evolutionary training.
pub mod training {
    /// Cooperative cancellation flag.
    pub mod cancel;
    /// Fitness records and the best-genome list.
    pub mod leaderboard;
    /// Crossover, mutation and selection.
    pub mod operators;
    /// Per-model evolution policies.
    pub mod strategy;
    /// Background epoch loop.
    pub mod trainer;

    pub use cancel::CancelToken;
    pub use leaderboard::{FitnessRecord, Leaderboard, LeaderboardSnapshot};
    pub use operators::MutationKind;
    pub use strategy::{
        ArenaConfig, ArenaStrategy, BrainSource, CrossoverConfig, EvolutionStrategy,
        UniformCrossoverStrategy,
    };
    pub use trainer::{EpochStats, TrainOutcome, TrainParams, TrainState, Trainer};
}
