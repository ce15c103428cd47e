#![allow(missing_docs)]
#![allow(clippy::float_cmp)]

use std::sync::Arc;

use pathfinder::brain::dense::{DenseBrain, layer_sizes};
use pathfinder::brain::{Brain, BrainKind, IndexedBrain, Scalar, WeightArena};
use pathfinder::error::BrainError;
use pathfinder::factory;
use pathfinder::genome::Genome;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_pcg::Pcg64;

const INS: usize = 18;
const OUTS: usize = 5;

fn create_test_arena(count: usize) -> Arc<WeightArena> {
    let mut rng = Pcg64::seed_from_u64(11);
    Arc::new(WeightArena::random(vec![INS, 32, OUTS], count, &mut rng))
}

fn run(brain: &Brain, inputs: &[Scalar]) -> Vec<Scalar> {
    let mut outputs = vec![0.0; brain.outputs_len()];
    let mut scratch = brain.scratch();
    brain.forward(inputs, &mut outputs, &mut scratch).unwrap();
    outputs
}

#[test]
fn test_dense_topology_and_genome_length() {
    assert_eq!(layer_sizes(INS, OUTS), [18, 12, 6, 5]);
    let expected = 18 * 12 + 12 + 12 * 6 + 6 + 6 * 5 + 5;
    let layout = DenseBrain::layout(INS, OUTS);
    assert_eq!(layout.scalar_count(), expected);

    let brain = Brain::from_seed(BrainKind::DenseFeedForward, 1, INS, OUTS).unwrap();
    assert_eq!(brain.flatten().len_bytes(), expected * size_of::<Scalar>());
}

#[test]
fn test_flatten_round_trip_keeps_outputs() {
    let brain = Brain::from_seed(BrainKind::DenseFeedForward, 42, INS, OUTS).unwrap();
    let rebuilt =
        factory::create_brain(0, &brain.flatten(), INS, OUTS, None).unwrap();
    assert_eq!(rebuilt.flatten(), brain.flatten());

    let inputs: Vec<Scalar> = (0..INS).map(|i| i as Scalar * 0.1 - 0.5).collect();
    assert_eq!(run(&brain, &inputs), run(&rebuilt, &inputs));
}

#[test]
fn test_same_seed_same_genome() {
    let a = Brain::from_seed(BrainKind::DenseFeedForward, 9, INS, OUTS).unwrap();
    let b = Brain::from_seed(BrainKind::DenseFeedForward, 9, INS, OUTS).unwrap();
    let c = Brain::from_seed(BrainKind::DenseFeedForward, 10, INS, OUTS).unwrap();
    assert_eq!(a.flatten(), b.flatten());
    assert_ne!(a.flatten(), c.flatten());
    assert_eq!(a.flatten().hash_hex(), b.flatten().hash_hex());
}

#[test]
fn test_short_genome_reports_sizes() {
    let expected = DenseBrain::layout(INS, OUTS).byte_len::<Scalar>();
    let genome = Genome::with_len(expected - 4);
    match factory::create_brain(0, &genome, INS, OUTS, None) {
        Err(BrainError::SizeMismatch { expected: e, actual }) => {
            assert_eq!(e, expected);
            assert_eq!(actual, expected - 4);
        }
        other => panic!("expected SizeMismatch, got {other:?}"),
    }
}

#[test]
fn test_unknown_model_index() {
    let genome = Genome::default();
    assert!(matches!(
        factory::create_brain(2, &genome, INS, OUTS, None),
        Err(BrainError::UnsupportedModel(2))
    ));
}

#[test]
fn test_zero_genome_gives_zero_outputs() {
    let genome = Genome::with_len(DenseBrain::layout(INS, OUTS).byte_len::<Scalar>());
    let brain = factory::create_brain(0, &genome, INS, OUTS, None).unwrap();
    let outputs = run(&brain, &[1.0; INS]);
    assert!(outputs.iter().all(|&o| o == 0.0));
}

#[test]
fn test_indexed_brain_reads_its_arena_member() {
    let arena = create_test_arena(4);
    let genome = IndexedBrain::genome_for(2);
    let brain = factory::create_brain(1, &genome, INS, OUTS, Some(&arena)).unwrap();
    assert_eq!(brain.kind(), BrainKind::ExternallyIndexed);
    assert_eq!(brain.flatten(), genome);

    let inputs = [0.3; INS];
    let outputs = run(&brain, &inputs);
    assert!(outputs.iter().all(|o| (-1.0..=1.0).contains(o)));

    let other = factory::create_brain(1, &IndexedBrain::genome_for(3), INS, OUTS, Some(&arena)).unwrap();
    assert_ne!(outputs, run(&other, &inputs));
}

#[test]
fn test_indexed_brain_rejects_bad_index_and_seed() {
    let arena = create_test_arena(4);
    assert!(matches!(
        factory::create_brain(1, &IndexedBrain::genome_for(4), INS, OUTS, Some(&arena)),
        Err(BrainError::IndexOutOfRange { index: 4, len: 4 })
    ));
    assert!(matches!(
        Brain::from_seed(BrainKind::ExternallyIndexed, 1, INS, OUTS),
        Err(BrainError::UnsupportedOperation(_))
    ));
}

#[test]
fn test_forward_rejects_wrong_input_length() {
    let brain = Brain::from_seed(BrainKind::DenseFeedForward, 3, INS, OUTS).unwrap();
    let mut outputs = vec![0.0; OUTS];
    let mut scratch = brain.scratch();
    assert!(matches!(
        brain.forward(&[0.0; 4], &mut outputs, &mut scratch),
        Err(BrainError::Arity { .. })
    ));
}

proptest! {
    #[test]
    fn prop_hidden_sizes_follow_arity(ins in 1usize..64, outs in 1usize..32) {
        let [i, h1, h2, o] = layer_sizes(ins, outs);
        prop_assert_eq!(i, ins);
        prop_assert_eq!(o, outs);
        prop_assert_eq!(h1, (ins + outs).div_ceil(2));
        prop_assert!(h2 > outs);
        prop_assert!(h2 >= (ins + outs).div_ceil(4));
    }

    #[test]
    fn prop_seeded_genomes_round_trip(seed in 1u64..10_000, ins in 1usize..24, outs in 1usize..8) {
        let brain = DenseBrain::from_seed(seed, ins, outs);
        let genome = brain.flatten();
        prop_assert_eq!(genome.len_bytes(), DenseBrain::layout(ins, outs).byte_len::<Scalar>());
        let rebuilt = DenseBrain::from_genome(&genome, ins, outs).unwrap();
        prop_assert_eq!(rebuilt, brain);
    }
}
