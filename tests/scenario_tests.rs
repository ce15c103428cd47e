#![allow(missing_docs)]
#![allow(clippy::float_cmp)]

use std::sync::Arc;

use glam::DVec3;
use ndarray::{Array2, s};
use pathfinder::brain::dense::DenseBrain;
use pathfinder::brain::{Brain, BrainKind, Scalar};
use pathfinder::checkpoint::Checkpoint;
use pathfinder::error::{ConfigError, SimError};
use pathfinder::factory;
use pathfinder::genome::Genome;
use pathfinder::scenario::{
    self, Player, ScenarioConfig, TICK_INTERVAL_S, TerrainSetup, TrainingSet,
};
use pathfinder::simulation::sim::SimParams;
use pathfinder::simulation::terrain::{GRID_SIZE, Terrain, TerrainParams};
use pathfinder::training::{CancelToken, FitnessRecord, Leaderboard, TrainOutcome};

fn create_test_brain() -> Brain {
    let (ins, outs) = scenario::brain_arity();
    let genome = Genome::with_len(DenseBrain::layout(ins, outs).byte_len::<Scalar>());
    factory::create_brain(0, &genome, ins, outs, None).unwrap()
}

/// Flat terrain with a wall band across the middle rows.
fn create_test_walled_terrain() -> Terrain {
    let mut heights = Array2::<f64>::zeros((GRID_SIZE, GRID_SIZE));
    heights.slice_mut(s![200..312, ..]).fill(1.0);
    Terrain::from_heights(100.0, heights).unwrap()
}

#[test]
fn test_config_round_trips_through_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.json");
    let mut config = ScenarioConfig::default();
    config.model_index = 1;
    config.train_terrain.seeds = vec![1, 2, 3];
    config.strategy.arena.elites = 4;
    config.save_to_file(&path).unwrap();

    let loaded = ScenarioConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_config_takes_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.json");
    std::fs::write(&path, r#"{ "max_epochs": 3, "train_terrain": { "seeds": [9] } }"#).unwrap();

    let config = ScenarioConfig::load_from_file(&path).unwrap();
    assert_eq!(config.max_epochs, 3);
    assert_eq!(config.train_terrain.seeds, vec![9]);
    assert_eq!(config.train_terrain.params, TerrainSetup::default().params);
    assert_eq!(config.unit_count, ScenarioConfig::default().unit_count);
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_config_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    match ScenarioConfig::load_from_file(&path) {
        Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected an io error, got {other:?}"),
    }
}

#[test]
fn test_validate_rejects_bad_values() {
    let bad_model = ScenarioConfig {
        model_index: 5,
        ..ScenarioConfig::default()
    };
    assert!(matches!(bad_model.validate(), Err(ConfigError::Invalid(_))));

    let no_units = ScenarioConfig {
        unit_count: 0,
        ..ScenarioConfig::default()
    };
    assert!(no_units.validate().is_err());

    let mut bad_terrain = ScenarioConfig::default();
    bad_terrain.test_terrain.params.noise_barrier_level = 1.5;
    assert!(bad_terrain.validate().is_err());

    let mut bad_arena = ScenarioConfig::default();
    bad_arena.strategy.arena.elites = 0;
    assert!(bad_arena.validate().is_err());
}

#[test]
fn test_terrain_is_deterministic_per_seed() {
    let params = TerrainParams::default();
    let a = Terrain::new(&params).unwrap();
    let b = Terrain::new(&params).unwrap();
    assert_eq!(a.heights(), b.heights());

    let other = Terrain::new(&TerrainParams {
        noise_seed: params.noise_seed + 1,
        ..params.clone()
    })
    .unwrap();
    assert_ne!(a.heights(), other.heights());

    // Below the barrier everything is flattened to zero.
    assert!(a.heights().iter().any(|&h| h == 0.0));
    assert!(a.heights().iter().all(|&h| h == 0.0 || h > params.noise_barrier_level));
}

#[test]
fn test_setup_builds_one_terrain_per_seed() {
    let setup = TerrainSetup {
        seeds: vec![5, 6],
        ..TerrainSetup::default()
    };
    let variants = setup.variants();
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[1].noise_seed, 6);
    assert_eq!(variants[1].field_size, setup.params.field_size);

    let empty = TerrainSetup {
        seeds: Vec::new(),
        ..TerrainSetup::default()
    };
    assert_eq!(empty.variants(), vec![empty.params.clone()]);
}

#[test]
fn test_pick_valid_pos_keeps_good_points() {
    let terrain = Terrain::flat(100.0).unwrap();
    assert!(scenario::is_good_point(&terrain, DVec3::ZERO));
    assert_eq!(scenario::pick_valid_pos(&terrain, DVec3::ZERO).unwrap(), DVec3::ZERO);

    let params = scenario::default_sim_params(&terrain, 3, 60.0).unwrap();
    assert_eq!(params.start_pos, DVec3::new(45.0, 0.0, 45.0));
    assert_eq!(params.target_pos, -params.start_pos);
    assert_eq!(params.unit_count, 3);
}

#[test]
fn test_pick_valid_pos_moves_out_of_walls() {
    let terrain = create_test_walled_terrain();
    assert!(!scenario::is_good_point(&terrain, DVec3::ZERO));

    let pos = scenario::pick_valid_pos(&terrain, DVec3::ZERO).unwrap();
    assert_ne!(pos, DVec3::ZERO);
    assert!(scenario::is_good_point(&terrain, pos));
}

#[test]
fn test_all_wall_terrain_is_rejected() {
    let heights = Array2::<f64>::from_elem((GRID_SIZE, GRID_SIZE), 1.0);
    let terrain = Terrain::from_heights(100.0, heights).unwrap();
    assert!(matches!(
        scenario::pick_valid_pos(&terrain, DVec3::ZERO),
        Err(ConfigError::Invalid(_))
    ));
    assert!(scenario::default_sim_params(&terrain, 1, 60.0).is_err());

    // Prepared cases on the same terrain fail instead of scoring zero.
    let set = TrainingSet::from_cases(vec![(terrain, SimParams::default())]);
    assert!(matches!(
        set.evaluate(&create_test_brain(), &CancelToken::new()),
        Err(SimError::NoUnitsPlaced { requested: 10, .. })
    ));
}

#[test]
fn test_validate_rejects_crossover_that_breeds_nothing() {
    let mut config = ScenarioConfig::default();
    config.strategy.crossover.top_for_selection = 2;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

    let mut config = ScenarioConfig::default();
    config.strategy.crossover.initial_population = 4;
    assert!(config.validate().is_err());

    let mut config = ScenarioConfig::default();
    config.strategy.crossover.mutation_rate = -0.1;
    assert!(config.validate().is_err());
}

#[test]
fn test_training_set_averages_case_costs() {
    let terrain = Terrain::flat(100.0).unwrap();
    let at_target = SimParams {
        unit_count: 1,
        start_pos: DVec3::ZERO,
        target_pos: DVec3::ZERO,
        max_time_s: 10.0,
    };
    let timed_out = SimParams {
        start_pos: DVec3::new(20.0, 0.0, 0.0),
        ..at_target.clone()
    };
    let set = TrainingSet::from_cases(vec![
        (terrain.clone(), at_target),
        (terrain, timed_out),
    ]);
    assert_eq!(set.cases().len(), 2);

    let cost = set.evaluate(&create_test_brain(), &CancelToken::new()).unwrap();
    let first = TICK_INTERVAL_S / 10.0;
    let second = 0.2 + 1.0;
    assert!((cost - (first + second) / 2.0).abs() < 1e-3, "cost {cost}");
}

#[test]
fn test_player_replays_to_completion() {
    let terrain = Terrain::flat(100.0).unwrap();
    let brain = create_test_brain();
    let params = SimParams {
        unit_count: 2,
        max_time_s: 1.0,
        target_pos: DVec3::new(10.0, 0.0, 0.0),
        ..SimParams::default()
    };
    let hex = brain.flatten().hash_hex();
    let mut player = Player::new(&terrain, &brain, params, hex.clone(), 0.25).unwrap();
    assert_eq!(player.genome_hex(), hex);
    assert_eq!(player.cost(), 0.25);

    player.advance(10.0).unwrap();
    assert!((player.sim().elapsed_s() - 10.0 * TICK_INTERVAL_S).abs() < 1e-9);
    while !player.sim().is_complete() {
        player.advance(20.0).unwrap();
    }
    assert_eq!(player.sim().counts().failed, 2);
}

#[test]
fn test_checkpoint_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = Checkpoint::path_in(&dir.path().join("nested"), BrainKind::DenseFeedForward);
    assert!(path.ends_with("pathfinder_m0.json"));

    let genome = create_test_brain().flatten();
    let mut board = Leaderboard::new(3);
    board.insert_ranked(&[(
        genome.clone(),
        FitnessRecord {
            cost: 1.5,
            epoch: 4,
            index: 2,
        },
    )]);
    Checkpoint::new(BrainKind::DenseFeedForward, 4, board.snapshot(), None)
        .save_to_file(&path)
        .unwrap();

    let loaded = Checkpoint::load_from_file(&path).unwrap();
    assert_eq!(loaded.model, BrainKind::DenseFeedForward);
    assert_eq!(loaded.epoch, 4);
    assert_eq!(loaded.leaders.genomes, vec![genome]);
    assert_eq!(loaded.leaders.records[0].to_string(), "epoch:4,idx:2");
    assert!(loaded.arena.is_none());
}

#[test]
fn test_scenario_training_runs_one_epoch() {
    let mut config = ScenarioConfig {
        max_epochs: 1,
        max_time_s: 1.0,
        worker_threads: Some(2),
        ..ScenarioConfig::default()
    };
    config.strategy.crossover.initial_population = 4;
    config.strategy.crossover.top_for_selection = 3;
    config.validate().unwrap();

    let set = Arc::new(TrainingSet::build(&config).unwrap());
    assert_eq!(set.cases().len(), config.train_terrain.seeds.len());

    let (ins, outs) = scenario::brain_arity();
    let mut trainer = factory::create_trainer_with(0, ins, outs, &config.strategy).unwrap();
    trainer.start(scenario::train_params(&config, set)).unwrap();
    assert_eq!(trainer.join().unwrap(), TrainOutcome::Completed);

    let leaders = trainer.leaderboard_snapshot();
    assert_eq!(leaders.records.len(), 4);
    assert!(leaders.records.iter().all(|r| r.cost.is_finite() && r.cost > 0.0));
}
