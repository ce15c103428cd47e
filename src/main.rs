use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use pathfinder::checkpoint::Checkpoint;
use pathfinder::factory;
use pathfinder::scenario::{self, Player, ScenarioConfig, TrainingSet};
use pathfinder::simulation::sensors::format_cost;
use pathfinder::training::BrainSource;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Train a model and checkpoint its best brains
    Train {
        /// Scenario config file; defaults are used when absent
        #[arg(long)]
        config: Option<PathBuf>,
        /// Model index, overrides the config
        #[arg(long)]
        model: Option<usize>,
        /// Epoch count, overrides the config
        #[arg(long)]
        epochs: Option<usize>,
        /// Evaluation threads, overrides the config
        #[arg(long)]
        threads: Option<usize>,
        /// Directory for checkpoints
        #[arg(long, default_value = "checkpoints")]
        checkpoint_dir: PathBuf,
    },
    /// Replay a brain from a checkpoint on the test terrain
    Replay {
        /// Checkpoint file written by `train`
        checkpoint: PathBuf,
        /// Scenario config file; defaults are used when absent
        #[arg(long)]
        config: Option<PathBuf>,
        /// Leaderboard position to replay
        #[arg(long, default_value_t = 0)]
        rank: usize,
        /// Ticks per step
        #[arg(long, default_value_t = 20.0)]
        speed: f64,
    },
    /// Write the default scenario config
    DefaultConfig {
        /// Output file
        #[arg(default_value = "pathfinder.json")]
        path: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<ScenarioConfig, Box<dyn Error>> {
    let config = match path {
        Some(path) => ScenarioConfig::load_from_file(path)?,
        None => ScenarioConfig::default(),
    };
    Ok(config)
}

fn train(mut config: ScenarioConfig, checkpoint_dir: &Path) -> Result<(), Box<dyn Error>> {
    config.strategy.arena.checkpoint_dir = Some(checkpoint_dir.to_path_buf());
    config.validate()?;

    let set = Arc::new(TrainingSet::build(&config)?);
    let (ins, outs) = scenario::brain_arity();
    let mut trainer = factory::create_trainer_with(config.model_index, ins, outs, &config.strategy)?;
    trainer.start(scenario::train_params(&config, set))?;

    let outcome = trainer.join()?;
    let leaders = trainer.leaderboard_snapshot();
    if let Some(best) = leaders.records.first() {
        println!("{outcome:?}: best {best}, cost {}", format_cost(best.cost));
    } else {
        println!("{outcome:?}: no epoch finished");
    }

    if !leaders.records.is_empty() {
        let epoch = trainer.last_epoch_stats().map_or(0, |s| s.epoch);
        let arena = trainer.brain_source().arena().map(|a| (**a).clone());
        let checkpoint = Checkpoint::new(trainer.kind(), epoch, leaders, arena);
        checkpoint.save_to_file(&Checkpoint::path_in(checkpoint_dir, trainer.kind()))?;
    }
    Ok(())
}

fn replay(
    config: &ScenarioConfig,
    checkpoint: &Path,
    rank: usize,
    speed: f64,
) -> Result<(), Box<dyn Error>> {
    config.validate()?;
    let checkpoint = Checkpoint::load_from_file(checkpoint)?;
    let genome = checkpoint
        .leaders
        .genomes
        .get(rank)
        .ok_or_else(|| format!("checkpoint has no genome at rank {rank}"))?;
    let cost = checkpoint.leaders.records.get(rank).map_or(f64::NAN, |r| r.cost);

    let (ins, outs) = scenario::brain_arity();
    let source = BrainSource::new(checkpoint.model, ins, outs, checkpoint.arena.map(Arc::new));
    let brain = source.create_brain(genome)?;

    let terrain = config
        .test_terrain
        .build()?
        .into_iter()
        .next()
        .ok_or("test terrain setup has no variants")?;
    let params = scenario::default_sim_params(&terrain, config.unit_count, config.max_time_s)?;
    let mut player = Player::new(&terrain, &brain, params, genome.hash_hex(), cost)?;
    println!(
        "Replaying chromo {} (cost {})",
        player.genome_hex(),
        format_cost(player.cost())
    );

    while !player.sim().is_complete() {
        player.advance(speed.max(1.0))?;
    }
    let sim = player.sim();
    let counts = sim.counts();
    println!(
        "Done after {:.1}s: {} reached the target, {} failed, cost {}",
        sim.elapsed_s(),
        counts.success,
        counts.failed,
        format_cost(sim.average_cost())
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.mode {
        Mode::Train {
            config,
            model,
            epochs,
            threads,
            checkpoint_dir,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(model) = model {
                config.model_index = model;
            }
            if let Some(epochs) = epochs {
                config.max_epochs = epochs;
            }
            if threads.is_some() {
                config.worker_threads = threads;
            }
            train(config, &checkpoint_dir)?;
        }
        Mode::Replay {
            checkpoint,
            config,
            rank,
            speed,
        } => {
            let config = load_config(config.as_deref())?;
            replay(&config, &checkpoint, rank, speed)?;
        }
        Mode::DefaultConfig { path } => {
            ScenarioConfig::default().save_to_file(&path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
