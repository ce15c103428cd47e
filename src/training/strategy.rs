//! Evolution strategies: how a population is seeded, decoded and bred.

use std::path::PathBuf;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use super::leaderboard::{FitnessRecord, Leaderboard, LeaderboardSnapshot};
use super::operators::{self, MutationKind};
use crate::brain::{Brain, BrainKind, DenseBrain, IndexedBrain, Scalar, WeightArena};
use crate::checkpoint::Checkpoint;
use crate::error::{BrainError, TrainError};
use crate::genome::Genome;

/// Everything needed to turn a genome into a brain, detached from the strategy.
///
/// Cheap to clone: arena-backed sources share one arena snapshot.
#[derive(Debug, Clone)]
pub struct BrainSource {
    kind: BrainKind,
    inputs: usize,
    outputs: usize,
    arena: Option<Arc<WeightArena>>,
}

impl BrainSource {
    /// Creates a source for `kind` with the given arity.
    pub fn new(kind: BrainKind, inputs: usize, outputs: usize, arena: Option<Arc<WeightArena>>) -> Self {
        Self {
            kind,
            inputs,
            outputs,
            arena,
        }
    }

    /// Builds the brain encoded by `genome`.
    pub fn create_brain(&self, genome: &Genome) -> Result<Brain, BrainError> {
        Brain::from_genome(self.kind, genome, self.inputs, self.outputs, self.arena.as_ref())
    }

    /// Architecture produced by this source.
    pub fn kind(&self) -> BrainKind {
        self.kind
    }

    /// Arena snapshot, for arena-backed architectures.
    pub fn arena(&self) -> Option<&Arc<WeightArena>> {
        self.arena.as_ref()
    }
}

/// A model's evolutionary policy, driven by the trainer once per epoch.
pub trait EvolutionStrategy: Send {
    /// Architecture of the brains this strategy breeds.
    fn kind(&self) -> BrainKind;

    /// Initial population.
    fn seed_population(&mut self) -> Vec<Genome>;

    /// Decoder for the current population's genomes.
    fn brain_source(&self) -> BrainSource;

    /// Builds the brain for one genome of the current population.
    fn create_brain(&self, genome: &Genome) -> Result<Brain, BrainError> {
        self.brain_source().create_brain(genome)
    }

    /// Produces the next population from `ranked`, sorted best first.
    fn next_generation(
        &mut self,
        epoch: usize,
        ranked: &[(Genome, FitnessRecord)],
    ) -> Result<Vec<Genome>, TrainError>;

    /// Updates the leaderboard after [`Self::next_generation`] returned.
    fn record_leaders(&self, board: &mut Leaderboard, ranked: &[(Genome, FitnessRecord)]) {
        board.insert_ranked(ranked);
    }

    /// Called once when the run ends normally or by cancellation.
    fn on_training_end(&mut self, _leaders: &LeaderboardSnapshot) -> Result<(), TrainError> {
        Ok(())
    }
}

/// Fewest parents for which pairing `i` with `j >= i + 2` yields any children.
const MIN_SELECTION: usize = 3;

/// Tunables of [`UniformCrossoverStrategy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossoverConfig {
    /// Size of the seeded population.
    pub initial_population: usize,
    /// Number of best genomes bred with each other.
    pub top_for_selection: usize,
    /// Per-scalar mutation probability.
    pub mutation_rate: f64,
    /// Operator applied to the mutated half of the children.
    pub mutation: MutationKind,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            initial_population: 100,
            top_for_selection: 10,
            mutation_rate: 0.1,
            mutation: MutationKind::Normal,
        }
    }
}

impl CrossoverConfig {
    /// Checks that selection can breed a non-empty generation.
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.top_for_selection < MIN_SELECTION {
            return Err(TrainError::InvalidParams(format!(
                "top_for_selection must be at least {MIN_SELECTION}, got {}",
                self.top_for_selection
            )));
        }
        if self.initial_population <= self.top_for_selection {
            return Err(TrainError::InvalidParams(format!(
                "initial_population must exceed top_for_selection ({}), got {}",
                self.top_for_selection, self.initial_population
            )));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(TrainError::InvalidParams(format!(
                "mutation_rate must be within [0, 1], got {}",
                self.mutation_rate
            )));
        }
        Ok(())
    }
}

/// Dense brains bred by uniform crossover and normal mutation.
#[derive(Debug, Clone)]
pub struct UniformCrossoverStrategy {
    inputs: usize,
    outputs: usize,
    config: CrossoverConfig,
}

impl UniformCrossoverStrategy {
    /// Creates the strategy with default tunables.
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self::with_config(inputs, outputs, CrossoverConfig::default())
    }

    /// Creates the strategy with explicit tunables.
    pub fn with_config(inputs: usize, outputs: usize, config: CrossoverConfig) -> Self {
        Self {
            inputs,
            outputs,
            config,
        }
    }
}

impl EvolutionStrategy for UniformCrossoverStrategy {
    fn kind(&self) -> BrainKind {
        BrainKind::DenseFeedForward
    }

    fn seed_population(&mut self) -> Vec<Genome> {
        (0..self.config.initial_population)
            .map(|i| DenseBrain::from_seed(i as u64, self.inputs, self.outputs).flatten())
            .collect()
    }

    fn brain_source(&self) -> BrainSource {
        BrainSource::new(self.kind(), self.inputs, self.outputs, None)
    }

    fn next_generation(
        &mut self,
        epoch: usize,
        ranked: &[(Genome, FitnessRecord)],
    ) -> Result<Vec<Genome>, TrainError> {
        let mut rng = Pcg64::seed_from_u64(epoch as u64);
        let parents: Vec<&Genome> = ranked.iter().map(|(g, _)| g).collect();
        let next = operators::select_next_generation(
            &mut rng,
            &parents,
            self.config.top_for_selection,
            self.config.mutation,
            self.config.mutation_rate,
        )?;
        log::debug!("Epoch {epoch}: bred {} genomes from {} parents", next.len(), parents.len());
        Ok(next)
    }
}

/// Tunables of [`ArenaStrategy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Hidden layer sizes between inputs and outputs.
    pub hidden_layers: Vec<usize>,
    /// Number of arena members.
    pub population: usize,
    /// Members carried over unchanged each epoch.
    pub elites: usize,
    /// Seed of the initial weights and of breeding.
    pub seed: u64,
    /// Per-scalar mutation probability.
    pub mutation_rate: f64,
    /// Epoch period between checkpoints.
    pub checkpoint_every: usize,
    /// Where checkpoints go. None disables them.
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![32],
            population: 100,
            elites: 10,
            seed: 7422,
            mutation_rate: 0.1,
            checkpoint_every: 100,
            checkpoint_dir: None,
        }
    }
}

impl ArenaConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.population == 0 {
            return Err(TrainError::InvalidParams("arena population must be positive".into()));
        }
        if self.elites == 0 || self.elites > self.population {
            return Err(TrainError::InvalidParams(format!(
                "elites must be within 1..={}, got {}",
                self.population, self.elites
            )));
        }
        if self.hidden_layers.contains(&0) {
            return Err(TrainError::InvalidParams("hidden layers must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(TrainError::InvalidParams(format!(
                "mutation_rate must be within [0, 1], got {}",
                self.mutation_rate
            )));
        }
        Ok(())
    }
}

/// Tanh networks whose weights live in a trainer-owned [`WeightArena`].
///
/// Genomes are member indices. Each epoch the arena is reordered by rank, the elites
/// are kept and the remaining members are bred from them, then a fresh snapshot is
/// published so brains of the previous epoch stay valid.
#[derive(Debug)]
pub struct ArenaStrategy {
    inputs: usize,
    outputs: usize,
    config: ArenaConfig,
    arena: Arc<WeightArena>,
    rng: Pcg64,
}

impl ArenaStrategy {
    /// Creates the strategy with a randomly initialized arena.
    pub fn new(inputs: usize, outputs: usize, config: ArenaConfig) -> Result<Self, TrainError> {
        config.validate()?;
        let mut sizes = Vec::with_capacity(config.hidden_layers.len() + 2);
        sizes.push(inputs);
        sizes.extend_from_slice(&config.hidden_layers);
        sizes.push(outputs);

        let mut rng = Pcg64::seed_from_u64(config.seed);
        let arena = WeightArena::random(sizes, config.population, &mut rng);
        Ok(Self {
            inputs,
            outputs,
            config,
            arena: Arc::new(arena),
            rng,
        })
    }

    /// Current arena snapshot.
    pub fn arena(&self) -> &Arc<WeightArena> {
        &self.arena
    }

    fn elite_leaders(&self, ranked: &[(Genome, FitnessRecord)]) -> Vec<(Genome, FitnessRecord)> {
        // After breeding, rank i lives at arena index i.
        ranked
            .iter()
            .take(self.config.elites)
            .enumerate()
            .map(|(i, (_, record))| (IndexedBrain::genome_for(i), *record))
            .collect()
    }

    fn save_checkpoint(&self, epoch: usize, leaders: LeaderboardSnapshot) -> Result<(), TrainError> {
        if let Some(dir) = &self.config.checkpoint_dir {
            let checkpoint = Checkpoint::new(self.kind(), epoch, leaders, Some((*self.arena).clone()));
            checkpoint.save_to_file(&Checkpoint::path_in(dir, self.kind()))?;
        }
        Ok(())
    }
}

impl EvolutionStrategy for ArenaStrategy {
    fn kind(&self) -> BrainKind {
        BrainKind::ExternallyIndexed
    }

    fn seed_population(&mut self) -> Vec<Genome> {
        (0..self.arena.len()).map(IndexedBrain::genome_for).collect()
    }

    fn brain_source(&self) -> BrainSource {
        BrainSource::new(self.kind(), self.inputs, self.outputs, Some(Arc::clone(&self.arena)))
    }

    fn next_generation(
        &mut self,
        epoch: usize,
        ranked: &[(Genome, FitnessRecord)],
    ) -> Result<Vec<Genome>, TrainError> {
        let len = self.arena.len();
        let ranked_values = ranked
            .iter()
            .map(|(genome, _)| {
                let index = IndexedBrain::decode_index(genome)?;
                self.arena
                    .member_values(index)
                    .ok_or(BrainError::IndexOutOfRange { index, len })
            })
            .collect::<Result<Vec<Vec<Scalar>>, BrainError>>()?;
        if ranked_values.is_empty() {
            return Ok(Vec::new());
        }

        let elites = self.config.elites.min(ranked_values.len());
        let mut members: Vec<Vec<Scalar>> = ranked_values[..elites].to_vec();
        while members.len() < self.config.population {
            let a = Genome::from_values(&ranked_values[self.rng.random_range(0..elites)]);
            let b = Genome::from_values(&ranked_values[self.rng.random_range(0..elites)]);
            let child = operators::uniform_crossover(&mut self.rng, &a, &b)?;
            let child = operators::mutate_normal(&mut self.rng, &child, self.config.mutation_rate)?;
            members.push(child.values::<Scalar>()?);
        }

        let arena = WeightArena::from_values(self.arena.layer_sizes().to_vec(), &members)?;
        self.arena = Arc::new(arena);
        log::debug!("Epoch {epoch}: kept {elites} elites, bred {}", members.len() - elites);

        if self.config.checkpoint_every > 0 && epoch % self.config.checkpoint_every == 0 {
            let mut board = Leaderboard::new(self.config.elites);
            board.replace(self.elite_leaders(ranked));
            self.save_checkpoint(epoch, board.snapshot())?;
        }

        Ok((0..self.config.population).map(IndexedBrain::genome_for).collect())
    }

    fn record_leaders(&self, board: &mut Leaderboard, ranked: &[(Genome, FitnessRecord)]) {
        // Old indices point into replaced snapshots, so only this epoch's elites are valid.
        board.replace(self.elite_leaders(ranked));
    }

    fn on_training_end(&mut self, leaders: &LeaderboardSnapshot) -> Result<(), TrainError> {
        let epoch = leaders.records.iter().map(|r| r.epoch).max().unwrap_or(0);
        self.save_checkpoint(epoch, leaders.clone())
    }
}
