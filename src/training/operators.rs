//! Genetic operators over genomes holding flat [`Scalar`] parameters.

use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::brain::Scalar;
use crate::error::BrainError;
use crate::genome::Genome;

fn scalars(genome: &Genome) -> Result<Vec<Scalar>, BrainError> {
    genome.values::<Scalar>()
}

/// Picks each scalar from `a` or `b` with equal probability.
pub fn uniform_crossover<R: Rng>(rng: &mut R, a: &Genome, b: &Genome) -> Result<Genome, BrainError> {
    if a.len_bytes() != b.len_bytes() {
        return Err(BrainError::SizeMismatch {
            expected: a.len_bytes(),
            actual: b.len_bytes(),
        });
    }
    let a = scalars(a)?;
    let b = scalars(b)?;
    let child: Vec<Scalar> = a
        .iter()
        .zip(&b)
        .map(|(&x, &y)| if rng.random::<f64>() < 0.5 { x } else { y })
        .collect();
    Ok(Genome::from_values(&child))
}

/// Mean and population standard deviation of the genome's scalars.
pub fn mean_and_stddev(values: &[Scalar]) -> (Scalar, Scalar) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as Scalar;
    let (sum, sum_sq) = values
        .iter()
        .fold((0.0, 0.0), |(s, sq), &x| (s + x, sq + x * x));
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// Adds a sample from `Normal(mean, stddev)` of the genome's own values to each
/// scalar with probability `rate`.
pub fn mutate_normal<R: Rng>(rng: &mut R, genome: &Genome, rate: f64) -> Result<Genome, BrainError> {
    let mut values = scalars(genome)?;
    let (mean, stddev) = mean_and_stddev(&values);
    let Ok(normal) = Normal::new(mean, stddev) else {
        log::debug!("Skipping mutation of degenerate genome {}", genome.hash_hex());
        return Ok(genome.clone());
    };
    let rate = rate.clamp(0.0, 1.0);
    for v in &mut values {
        if rng.random_bool(rate) {
            *v += rng.sample(normal);
        }
    }
    Ok(Genome::from_values(&values))
}

/// Adds `U[-1, 1] * max(1, mean |x|)` to each scalar with probability `rate`.
pub fn mutate_scaled<R: Rng>(rng: &mut R, genome: &Genome, rate: f64) -> Result<Genome, BrainError> {
    let mut values = scalars(genome)?;
    let abs_sum: f64 = values.iter().map(|v| f64::from(v.abs())).sum();
    let scale = (abs_sum / values.len().max(1) as f64).max(1.0) as Scalar;
    let rate = rate.clamp(0.0, 1.0);
    for v in &mut values {
        if rng.random_bool(rate) {
            *v += rng.random_range(-1.0..=1.0) * scale;
        }
    }
    Ok(Genome::from_values(&values))
}

/// Mutation operator applied to bred children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    /// [`mutate_normal`].
    #[default]
    Normal,
    /// [`mutate_scaled`].
    Scaled,
}

impl MutationKind {
    /// Mutates `genome` with this operator.
    pub fn apply<R: Rng>(self, rng: &mut R, genome: &Genome, rate: f64) -> Result<Genome, BrainError> {
        match self {
            Self::Normal => mutate_normal(rng, genome, rate),
            Self::Scaled => mutate_scaled(rng, genome, rate),
        }
    }
}

/// Breeds the top `top_n` of `ranked` (best first) among each other.
///
/// For every `i < K` and `i + 2 <= j < K` it emits the crossover of `(i, j)`,
/// a mutated crossover of `(i, j)`, and the same two for `(i, j + 1)`.
/// `K` is clamped to `ranked.len() - 1` so that `j + 1` stays in range.
pub fn select_next_generation<R: Rng>(
    rng: &mut R,
    ranked: &[&Genome],
    top_n: usize,
    mutation: MutationKind,
    mutation_rate: f64,
) -> Result<Vec<Genome>, BrainError> {
    let k = top_n.min(ranked.len().saturating_sub(1));
    let mut next = Vec::new();
    for i in 0..k {
        for j in i + 2..k {
            let (a, b, c) = (ranked[i], ranked[j], ranked[j + 1]);
            next.push(uniform_crossover(rng, a, b)?);
            let child = uniform_crossover(rng, a, b)?;
            next.push(mutation.apply(rng, &child, mutation_rate)?);
            next.push(uniform_crossover(rng, a, c)?);
            let child = uniform_crossover(rng, a, c)?;
            next.push(mutation.apply(rng, &child, mutation_rate)?);
        }
    }
    Ok(next)
}
