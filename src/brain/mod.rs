//! Neural network brains mapping sensor vectors to control vectors.
//!
//! Two architectures are available behind the single [`Brain`] enum:
//! a dense feed-forward network that owns its weights, and a network whose
//! weights live in a [`WeightArena`] owned by the training strategy.
//! Both are built from a [`Genome`] and can be flattened back into one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::BrainError;
use crate::genome::Genome;

pub mod arena;
pub mod dense;
pub mod indexed;

pub use arena::WeightArena;
pub use dense::DenseBrain;
pub use indexed::IndexedBrain;

/// Scalar type used for all network parameters and activations.
pub type Scalar = f32;

/// Architecture selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrainKind {
    /// Dense network with two derived hidden layers.
    DenseFeedForward,
    /// Network reading its weights from a shared arena.
    ExternallyIndexed,
}

impl BrainKind {
    /// Every registered architecture, in model-index order.
    pub const ALL: [BrainKind; 2] = [BrainKind::DenseFeedForward, BrainKind::ExternallyIndexed];

    /// Looks up an architecture by model index.
    pub fn from_index(index: usize) -> Result<Self, BrainError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(BrainError::UnsupportedModel(index))
    }

    /// Model index of this architecture.
    pub fn index(self) -> usize {
        match self {
            BrainKind::DenseFeedForward => 0,
            BrainKind::ExternallyIndexed => 1,
        }
    }

    /// Human readable model name.
    pub fn name(self) -> &'static str {
        match self {
            BrainKind::DenseFeedForward => "Model 0: uniform crossover",
            BrainKind::ExternallyIndexed => "Model 1: weight arena",
        }
    }
}

/// Reusable buffers for a forward pass.
///
/// Create one per evaluation with [`Brain::scratch`] so that forward passes
/// do not touch the allocator.
#[derive(Debug, Clone, Default)]
pub struct ForwardScratch {
    front: Vec<Scalar>,
    back: Vec<Scalar>,
}

impl ForwardScratch {
    /// Creates buffers able to hold a layer of `width` neurons.
    pub fn new(width: usize) -> Self {
        Self {
            front: vec![0.0; width],
            back: vec![0.0; width],
        }
    }

    /// Current buffer width.
    pub fn width(&self) -> usize {
        self.front.len().min(self.back.len())
    }

    pub(crate) fn buffers_mut(&mut self) -> (&mut Vec<Scalar>, &mut Vec<Scalar>) {
        (&mut self.front, &mut self.back)
    }
}

/// A decision-making network.
#[derive(Debug, Clone)]
pub enum Brain {
    /// Dense network owning its weights.
    DenseFeedForward(DenseBrain),
    /// Network reading weights from an arena by index.
    ExternallyIndexed(IndexedBrain),
}

impl Brain {
    /// Builds a brain of the given architecture from a genome.
    ///
    /// # Arguments
    ///
    /// * `kind` - Architecture to build
    /// * `genome` - Encoded parameters (or arena index)
    /// * `ins` - Number of sensor inputs
    /// * `outs` - Number of control outputs
    /// * `arena` - Weight store, required by [`BrainKind::ExternallyIndexed`]
    ///
    /// # Returns
    ///
    /// The constructed brain, or [`BrainError::SizeMismatch`] if the genome does not
    /// fit the architecture.
    pub fn from_genome(
        kind: BrainKind,
        genome: &Genome,
        ins: usize,
        outs: usize,
        arena: Option<&Arc<WeightArena>>,
    ) -> Result<Self, BrainError> {
        match kind {
            BrainKind::DenseFeedForward => {
                DenseBrain::from_genome(genome, ins, outs).map(Brain::DenseFeedForward)
            }
            BrainKind::ExternallyIndexed => {
                let arena = arena.ok_or(BrainError::ArenaRequired)?;
                IndexedBrain::from_genome(genome, Arc::clone(arena), ins, outs)
                    .map(Brain::ExternallyIndexed)
            }
        }
    }

    /// Builds a brain with random parameters.
    pub fn from_seed(kind: BrainKind, seed: u64, ins: usize, outs: usize) -> Result<Self, BrainError> {
        match kind {
            BrainKind::DenseFeedForward => Ok(Brain::DenseFeedForward(DenseBrain::from_seed(
                seed, ins, outs,
            ))),
            BrainKind::ExternallyIndexed => Err(BrainError::UnsupportedOperation(
                "construct an arena-backed brain from a seed",
            )),
        }
    }

    /// Serializes the brain into a genome accepted by [`Brain::from_genome`].
    pub fn flatten(&self) -> Genome {
        match self {
            Brain::DenseFeedForward(b) => b.flatten(),
            Brain::ExternallyIndexed(b) => b.flatten(),
        }
    }

    /// Runs the network on `inputs`, writing `outputs`.
    #[inline]
    pub fn forward(
        &self,
        inputs: &[Scalar],
        outputs: &mut [Scalar],
        scratch: &mut ForwardScratch,
    ) -> Result<(), BrainError> {
        match self {
            Brain::DenseFeedForward(b) => b.forward(inputs, outputs, scratch),
            Brain::ExternallyIndexed(b) => b.forward(inputs, outputs, scratch),
        }
    }

    /// Architecture of this brain.
    pub fn kind(&self) -> BrainKind {
        match self {
            Brain::DenseFeedForward(_) => BrainKind::DenseFeedForward,
            Brain::ExternallyIndexed(_) => BrainKind::ExternallyIndexed,
        }
    }

    /// Number of inputs.
    pub fn inputs_len(&self) -> usize {
        match self {
            Brain::DenseFeedForward(b) => b.inputs_len(),
            Brain::ExternallyIndexed(b) => b.inputs_len(),
        }
    }

    /// Number of outputs.
    pub fn outputs_len(&self) -> usize {
        match self {
            Brain::DenseFeedForward(b) => b.outputs_len(),
            Brain::ExternallyIndexed(b) => b.outputs_len(),
        }
    }

    /// Scratch buffers sized to the widest layer.
    pub fn scratch(&self) -> ForwardScratch {
        let widest = match self {
            Brain::DenseFeedForward(b) => b.layer_sizes().into_iter().max(),
            Brain::ExternallyIndexed(b) => b.arena().layer_sizes().iter().copied().max(),
        };
        ForwardScratch::new(widest.unwrap_or(0))
    }
}
