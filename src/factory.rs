//! Model registry keyed by model index.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::brain::{Brain, BrainKind, WeightArena};
use crate::error::{BrainError, TrainError};
use crate::genome::Genome;
use crate::training::{
    ArenaConfig, ArenaStrategy, CrossoverConfig, EvolutionStrategy, Trainer,
    UniformCrossoverStrategy,
};

/// Number of registered models.
pub fn models_len() -> usize {
    BrainKind::ALL.len()
}

/// Display name of a model.
pub fn model_name(model_index: usize) -> Result<&'static str, BrainError> {
    BrainKind::from_index(model_index).map(BrainKind::name)
}

/// Builds the brain of `model_index` encoded by `genome`.
///
/// Arena-backed models need the arena the genome was bred against.
pub fn create_brain(
    model_index: usize,
    genome: &Genome,
    ins: usize,
    outs: usize,
    arena: Option<&Arc<WeightArena>>,
) -> Result<Brain, BrainError> {
    Brain::from_genome(BrainKind::from_index(model_index)?, genome, ins, outs, arena)
}

/// Per-model strategy tunables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Tunables of the uniform crossover model.
    pub crossover: CrossoverConfig,
    /// Tunables of the weight arena model.
    pub arena: ArenaConfig,
}

/// Creates an idle trainer for `model_index` with default tunables.
pub fn create_trainer(model_index: usize, ins: usize, outs: usize) -> Result<Trainer, TrainError> {
    create_trainer_with(model_index, ins, outs, &StrategyConfig::default())
}

/// Creates an idle trainer for `model_index` with explicit tunables.
pub fn create_trainer_with(
    model_index: usize,
    ins: usize,
    outs: usize,
    config: &StrategyConfig,
) -> Result<Trainer, TrainError> {
    let strategy: Box<dyn EvolutionStrategy> = match BrainKind::from_index(model_index)? {
        BrainKind::DenseFeedForward => {
            config.crossover.validate()?;
            Box::new(UniformCrossoverStrategy::with_config(
                ins,
                outs,
                config.crossover.clone(),
            ))
        }
        BrainKind::ExternallyIndexed => {
            Box::new(ArenaStrategy::new(ins, outs, config.arena.clone())?)
        }
    };
    Ok(Trainer::new(strategy))
}
