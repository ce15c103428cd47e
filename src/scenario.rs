//! Training and replay scenario: terrain variants, start and target picking,
//! the fitness callback and the replay player.

use std::f64::consts::TAU;
use std::path::Path;
use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::brain::Brain;
use crate::error::{BrainError, ConfigError, EvalError, SimError};
use crate::factory::{self, StrategyConfig};
use crate::simulation::sensors::{Control, WALL_HEIGHT, sensor};
use crate::simulation::sim::{SimParams, Simulation, progressive_offset};
use crate::simulation::terrain::{Terrain, TerrainParams};
use crate::training::{CancelToken, TrainParams};

/// Simulation step used for training and replay.
pub const TICK_INTERVAL_S: f64 = 1.0 / 60.0;
/// Start and target sit this fraction of the field away from the border.
const BORDER: f64 = 0.05;
/// Ring count when searching for a valid position.
const PICK_RINGS: usize = 20;
/// Angles tried per ring.
const PICK_ANGLES: usize = 200;
/// Clearance probe grid: offsets `0..=PROBE_SPAN` in steps of `PROBE_STEP` cells.
const PROBE_SPAN: usize = 30;
const PROBE_STEP: usize = 3;

/// Base terrain parameters plus the noise seeds to generate variants from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSetup {
    /// Shared parameters. Its seed is used when `seeds` is empty.
    pub params: TerrainParams,
    /// One terrain per seed.
    pub seeds: Vec<u64>,
}

impl Default for TerrainSetup {
    fn default() -> Self {
        Self {
            params: TerrainParams {
                field_size: 100.0,
                noise_barrier_level: 0.6,
                noise_seed: 102,
                noise_roughness: 0.5,
            },
            seeds: vec![102],
        }
    }
}

impl TerrainSetup {
    /// Terrain parameters for every seed.
    pub fn variants(&self) -> Vec<TerrainParams> {
        if self.seeds.is_empty() {
            return vec![self.params.clone()];
        }
        self.seeds
            .iter()
            .map(|&noise_seed| TerrainParams {
                noise_seed,
                ..self.params.clone()
            })
            .collect()
    }

    /// Generates every variant.
    pub fn build(&self) -> Result<Vec<Terrain>, ConfigError> {
        self.variants().iter().map(Terrain::new).collect()
    }
}

/// Everything the headless trainer needs, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Model index, see [`factory::model_name`].
    pub model_index: usize,
    /// Epochs to train.
    pub max_epochs: usize,
    /// Units per simulation.
    pub unit_count: usize,
    /// Simulation time limit in seconds.
    pub max_time_s: f64,
    /// Evaluation threads. None uses the available parallelism plus one.
    pub worker_threads: Option<usize>,
    /// Terrains used for fitness evaluation.
    pub train_terrain: TerrainSetup,
    /// Terrain used for replays. Only its first variant is used.
    pub test_terrain: TerrainSetup,
    /// Strategy tunables.
    pub strategy: StrategyConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            model_index: 0,
            max_epochs: 5000,
            unit_count: 1,
            max_time_s: 60.0 * 15.0,
            worker_threads: None,
            train_terrain: TerrainSetup::default(),
            test_terrain: TerrainSetup::default(),
            strategy: StrategyConfig::default(),
        }
    }
}

impl ScenarioConfig {
    /// Reads a config from a JSON file. Missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Writes the config as pretty JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks every value before anything is built or spawned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        factory::model_name(self.model_index)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.max_epochs == 0 {
            return Err(ConfigError::Invalid("max_epochs must be positive".into()));
        }
        if self.unit_count == 0 {
            return Err(ConfigError::Invalid("unit_count must be positive".into()));
        }
        if !(self.max_time_s.is_finite() && self.max_time_s > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "max_time_s must be positive, got {}",
                self.max_time_s
            )));
        }
        if self.worker_threads == Some(0) {
            return Err(ConfigError::Invalid("worker_threads must be positive".into()));
        }
        self.strategy
            .crossover
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.strategy
            .arena
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        for variant in self
            .train_terrain
            .variants()
            .iter()
            .chain(self.test_terrain.variants().iter())
        {
            variant.validate()?;
        }
        Ok(())
    }
}

/// Returns true when the area around `pos` is on the map and below the walls.
pub fn is_good_point(terrain: &Terrain, pos: DVec3) -> bool {
    let cell = terrain.cell_size();
    (0..=PROBE_SPAN).step_by(PROBE_STEP).all(|ix| {
        (0..=PROBE_SPAN).step_by(PROBE_STEP).all(|iz| {
            let offset = DVec3::new(
                progressive_offset(ix) as f64 * cell,
                0.0,
                progressive_offset(iz) as f64 * cell,
            );
            let probe = pos + offset;
            terrain.is_pos_inside(probe) && terrain.height_at(probe) < WALL_HEIGHT
        })
    })
}

/// Finds a good point at or near `center`, searching outward in rings.
pub fn pick_valid_pos(terrain: &Terrain, center: DVec3) -> Result<DVec3, ConfigError> {
    if is_good_point(terrain, center) {
        return Ok(center);
    }
    for ring in 1..PICK_RINGS {
        let radius = terrain.field_size() * 0.5 * (ring as f64 / PICK_RINGS as f64);
        for a in 0..PICK_ANGLES {
            let angle = TAU * a as f64 / PICK_ANGLES as f64;
            let pos = center + DVec3::new(angle.cos(), 0.0, angle.sin()) * radius;
            if is_good_point(terrain, pos) {
                log::debug!("Moved {center} to open ground at {pos}");
                return Ok(pos);
            }
        }
    }
    Err(ConfigError::Invalid(format!("no open ground near {center}")))
}

/// Simulation parameters going corner to corner across `terrain`.
pub fn default_sim_params(
    terrain: &Terrain,
    unit_count: usize,
    max_time_s: f64,
) -> Result<SimParams, ConfigError> {
    let corner = DVec3::new(0.5 - BORDER, 0.0, 0.5 - BORDER) * terrain.field_size();
    Ok(SimParams {
        unit_count,
        start_pos: pick_valid_pos(terrain, corner)?,
        target_pos: pick_valid_pos(terrain, -corner)?,
        max_time_s,
    })
}

/// Terrains and simulation parameters shared by every evaluation.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    cases: Vec<(Terrain, SimParams)>,
}

impl TrainingSet {
    /// Generates the training terrains of `config`.
    ///
    /// Fails when a terrain has no open ground for the start or the target.
    pub fn build(config: &ScenarioConfig) -> Result<Self, ConfigError> {
        let cases = config
            .train_terrain
            .build()?
            .into_iter()
            .map(|terrain| {
                let params = default_sim_params(&terrain, config.unit_count, config.max_time_s)?;
                Ok((terrain, params))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { cases })
    }

    /// Wraps prepared cases.
    pub fn from_cases(cases: Vec<(Terrain, SimParams)>) -> Self {
        Self { cases }
    }

    /// Terrain and parameters of each case.
    pub fn cases(&self) -> &[(Terrain, SimParams)] {
        &self.cases
    }

    /// Runs `brain` on every case and returns the mean simulation cost.
    ///
    /// A case where no unit can be placed is an error rather than a zero cost.
    pub fn evaluate(&self, brain: &Brain, cancel: &CancelToken) -> Result<f64, SimError> {
        let mut total = 0.0;
        for (terrain, params) in &self.cases {
            let mut sim = Simulation::new(params.clone(), terrain, brain)?;
            total += sim.run_to_completion(TICK_INTERVAL_S, cancel)?;
        }
        Ok(total / self.cases.len().max(1) as f64)
    }
}

/// Training parameters evaluating every genome on `set`.
pub fn train_params(config: &ScenarioConfig, set: Arc<TrainingSet>) -> TrainParams {
    let mut params = TrainParams::new(config.max_epochs, move |brain, cancel| {
        set.evaluate(brain, cancel).map_err(EvalError::from)
    });
    params.worker_threads = config.worker_threads;
    params
}

/// Input and output counts of the brains driven by a simulation.
pub fn brain_arity() -> (usize, usize) {
    (sensor::COUNT, Control::COUNT)
}

/// Replays one brain on one terrain at an adjustable speed.
pub struct Player<'a> {
    sim: Simulation<'a>,
    genome_hex: String,
    cost: f64,
}

impl<'a> Player<'a> {
    /// Starts a replay of `brain`, recorded with training cost `cost`.
    pub fn new(
        terrain: &'a Terrain,
        brain: &'a Brain,
        params: SimParams,
        genome_hex: String,
        cost: f64,
    ) -> Result<Self, SimError> {
        Ok(Self {
            sim: Simulation::new(params, terrain, brain)?,
            genome_hex,
            cost,
        })
    }

    /// Advances up to `speed_factor` ticks.
    pub fn advance(&mut self, speed_factor: f64) -> Result<(), BrainError> {
        let loops = speed_factor.max(0.0) as usize;
        for _ in 0..loops {
            if self.sim.is_complete() {
                break;
            }
            self.sim.tick(TICK_INTERVAL_S)?;
        }
        Ok(())
    }

    /// The running simulation.
    pub fn sim(&self) -> &Simulation<'a> {
        &self.sim
    }

    /// Hash of the replayed genome.
    pub fn genome_hex(&self) -> &str {
        &self.genome_hex
    }

    /// Cost the genome scored in training.
    pub fn cost(&self) -> f64 {
        self.cost
    }
}
