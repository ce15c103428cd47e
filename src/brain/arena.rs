//! Central store of per-member weight tensors for arena-backed brains.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::dense::{self, DenseLayer};
use super::{ForwardScratch, Scalar};
use crate::error::BrainError;
use crate::genome::ParamLayout;

fn tanh(x: Scalar) -> Scalar {
    x.tanh()
}

/// Weights for every member of a population, stored side by side.
///
/// Brains built against an arena hold an `Arc` to one snapshot of it and a member
/// index, so the snapshot outlives every brain that reads from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightArena {
    layer_sizes: Vec<usize>,
    members: Vec<Vec<DenseLayer>>,
}

impl WeightArena {
    /// Creates `count` members with random weights.
    ///
    /// # Arguments
    ///
    /// * `layer_sizes` - Neuron counts from input to output
    /// * `count` - Number of members
    /// * `rng` - Source of randomness
    pub fn random<R: Rng>(layer_sizes: Vec<usize>, count: usize, rng: &mut R) -> Self {
        let members = (0..count)
            .map(|_| dense::random_layers(&layer_sizes, rng))
            .collect();
        Self {
            layer_sizes,
            members,
        }
    }

    /// Creates an arena from flat parameter vectors, one per member.
    pub fn from_values(layer_sizes: Vec<usize>, values: &[Vec<Scalar>]) -> Result<Self, BrainError> {
        let members = values
            .iter()
            .map(|v| dense::layers_from_values(&layer_sizes, v))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            layer_sizes,
            members,
        })
    }

    /// Neuron counts from input to output.
    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    /// Layout of one member's parameters.
    pub fn layout(&self) -> ParamLayout {
        ParamLayout::dense(&self.layer_sizes)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true when the arena has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Flat parameters of one member.
    pub fn member_values(&self, index: usize) -> Option<Vec<Scalar>> {
        self.members.get(index).map(|m| dense::layers_to_values(m))
    }

    /// Flat parameters of every member, in index order.
    pub fn all_values(&self) -> Vec<Vec<Scalar>> {
        self.members
            .iter()
            .map(|m| dense::layers_to_values(m))
            .collect()
    }

    /// Runs member `index` on `inputs`, tanh on every layer.
    pub fn forward(
        &self,
        index: usize,
        inputs: &[Scalar],
        outputs: &mut [Scalar],
        scratch: &mut ForwardScratch,
    ) -> Result<(), BrainError> {
        let layers = self.members.get(index).ok_or(BrainError::IndexOutOfRange {
            index,
            len: self.members.len(),
        })?;
        dense::run_layers(
            layers.iter().map(|l| (l.weights.view(), l.biases.view())),
            tanh,
            inputs,
            outputs,
            scratch,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn values_round_trip_through_arena() {
        let mut rng = Pcg64::seed_from_u64(7422);
        let arena = WeightArena::random(vec![3, 4, 2], 5, &mut rng);
        let rebuilt = WeightArena::from_values(vec![3, 4, 2], &arena.all_values()).unwrap();
        assert_eq!(arena, rebuilt);
    }

    #[test]
    fn forward_output_is_bounded_by_tanh() {
        let mut rng = Pcg64::seed_from_u64(1);
        let arena = WeightArena::random(vec![2, 8, 3], 2, &mut rng);
        let mut scratch = ForwardScratch::new(8);
        let mut out = [0.0; 3];
        arena.forward(1, &[5.0, -5.0], &mut out, &mut scratch).unwrap();
        assert!(out.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn missing_member_is_an_error() {
        let mut rng = Pcg64::seed_from_u64(1);
        let arena = WeightArena::random(vec![2, 2], 1, &mut rng);
        let mut out = [0.0; 2];
        let err = arena
            .forward(4, &[0.0, 0.0], &mut out, &mut ForwardScratch::default())
            .unwrap_err();
        assert!(matches!(err, BrainError::IndexOutOfRange { index: 4, len: 1 }));
    }
}
