//! Brain whose weights live in a [`WeightArena`].

use std::sync::Arc;

use super::{ForwardScratch, Scalar, WeightArena};
use crate::error::BrainError;
use crate::genome::{Genome, ParamLayout, TensorShape};

/// Handle to one member of a weight arena.
///
/// The genome of such a brain is a single little-endian `u64` holding the member index.
#[derive(Debug, Clone)]
pub struct IndexedBrain {
    arena: Arc<WeightArena>,
    index: usize,
}

impl IndexedBrain {
    /// Layout of the index genome.
    pub fn layout() -> ParamLayout {
        ParamLayout::new(vec![TensorShape::vector(1)])
    }

    /// Genome selecting arena member `index`.
    pub fn genome_for(index: usize) -> Genome {
        Genome::from_values(&[index as u64])
    }

    /// Decodes the member index held by an index genome.
    pub fn decode_index(genome: &Genome) -> Result<usize, BrainError> {
        Self::layout().check::<u64>(genome)?;
        let mut reader = genome.reader();
        let index = reader.take::<u64>(1)?.first().copied().unwrap_or_default() as usize;
        reader.finish()?;
        Ok(index)
    }

    /// Binds an index genome to an arena.
    ///
    /// Fails when the genome is not a single index, the index is outside the arena,
    /// or the arena's arity differs from `ins`/`outs`.
    pub fn from_genome(
        genome: &Genome,
        arena: Arc<WeightArena>,
        ins: usize,
        outs: usize,
    ) -> Result<Self, BrainError> {
        let index = Self::decode_index(genome)?;
        if index >= arena.len() {
            return Err(BrainError::IndexOutOfRange {
                index,
                len: arena.len(),
            });
        }
        let sizes = arena.layer_sizes();
        let (arena_ins, arena_outs) = (
            sizes.first().copied().unwrap_or(0),
            sizes.last().copied().unwrap_or(0),
        );
        if arena_ins != ins {
            return Err(BrainError::Arity {
                expected: arena_ins,
                actual: ins,
            });
        }
        if arena_outs != outs {
            return Err(BrainError::Arity {
                expected: arena_outs,
                actual: outs,
            });
        }

        Ok(Self { arena, index })
    }

    /// The arena member this brain reads.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The arena snapshot this brain reads from.
    pub fn arena(&self) -> &WeightArena {
        &self.arena
    }

    /// The index genome.
    pub fn flatten(&self) -> Genome {
        Self::genome_for(self.index)
    }

    /// Number of inputs.
    pub fn inputs_len(&self) -> usize {
        self.arena.layer_sizes().first().copied().unwrap_or(0)
    }

    /// Number of outputs.
    pub fn outputs_len(&self) -> usize {
        self.arena.layer_sizes().last().copied().unwrap_or(0)
    }

    /// Runs the referenced member.
    pub fn forward(
        &self,
        inputs: &[Scalar],
        outputs: &mut [Scalar],
        scratch: &mut ForwardScratch,
    ) -> Result<(), BrainError> {
        self.arena.forward(self.index, inputs, outputs, scratch)
    }
}
