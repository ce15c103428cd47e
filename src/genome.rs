//! Flat genome buffers and the typed layouts used to read them back.
//!
//! A [`Genome`] is an opaque byte sequence. Brains write their parameters into it
//! tensor by tensor and read them back in the same order. The order and shape of those
//! tensors is described by a [`ParamLayout`], which lets the reader check sizes instead
//! of trusting the caller.

use std::fmt::Write as _;

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use crate::error::BrainError;

/// Shape of a single tensor stored in a genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorShape {
    /// Number of rows (1 for vectors).
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl TensorShape {
    /// A `rows × cols` matrix.
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// A vector of length `len`.
    pub fn vector(len: usize) -> Self {
        Self { rows: 1, cols: len }
    }

    /// Number of scalars in the tensor.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Returns true when the tensor holds no scalars.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered list of tensor shapes making up a genome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamLayout {
    shapes: Vec<TensorShape>,
}

impl ParamLayout {
    /// Creates a layout from an ordered list of shapes.
    pub fn new(shapes: Vec<TensorShape>) -> Self {
        Self { shapes }
    }

    /// Layout of a dense network: for each layer a weight matrix
    /// `(inputs × outputs)` followed by a bias vector.
    ///
    /// # Arguments
    ///
    /// * `layer_sizes` - Neuron counts from input to output
    pub fn dense(layer_sizes: &[usize]) -> Self {
        let shapes = layer_sizes
            .windows(2)
            .flat_map(|w| [TensorShape::matrix(w[0], w[1]), TensorShape::vector(w[1])])
            .collect();
        Self { shapes }
    }

    /// The tensor shapes in storage order.
    pub fn shapes(&self) -> &[TensorShape] {
        &self.shapes
    }

    /// Total number of scalars.
    pub fn scalar_count(&self) -> usize {
        self.shapes.iter().map(TensorShape::len).sum()
    }

    /// Total byte length when stored as `T`.
    pub fn byte_len<T: Pod>(&self) -> usize {
        self.scalar_count() * size_of::<T>()
    }

    /// Fails with [`BrainError::SizeMismatch`] unless `genome` holds exactly this layout.
    pub fn check<T: Pod>(&self, genome: &Genome) -> Result<(), BrainError> {
        let expected = self.byte_len::<T>();
        if genome.len_bytes() == expected {
            Ok(())
        } else {
            Err(BrainError::SizeMismatch {
                expected,
                actual: genome.len_bytes(),
            })
        }
    }
}

/// Opaque, resizable byte buffer encoding one candidate solution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genome {
    data: Vec<u8>,
}

impl Genome {
    /// Creates a zero-filled genome of `size_bytes` bytes.
    pub fn with_len(size_bytes: usize) -> Self {
        Self {
            data: vec![0; size_bytes],
        }
    }

    /// Creates an empty genome with room for `size_bytes` bytes.
    pub fn with_capacity(size_bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(size_bytes),
        }
    }

    /// Wraps raw bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Builds a genome holding `values` back to back.
    pub fn from_values<T: Pod>(values: &[T]) -> Self {
        let mut genome = Self::with_capacity(size_of_val(values));
        genome.append(values);
        genome
    }

    /// Returns a zero-filled genome of the same length.
    pub fn empty_clone(&self) -> Self {
        Self::with_len(self.data.len())
    }

    /// Appends `values` to the end of the buffer.
    pub fn append<T: Pod>(&mut self, values: &[T]) {
        self.data.extend_from_slice(bytemuck::cast_slice(values));
    }

    /// Reads `len` values of type `T` starting at element `offset`.
    pub fn read<T: Pod>(&self, offset: usize, len: usize) -> Result<Vec<T>, BrainError> {
        let width = size_of::<T>();
        let start = offset * width;
        let end = start + len * width;
        let bytes = self.data.get(start..end).ok_or(BrainError::SizeMismatch {
            expected: end,
            actual: self.data.len(),
        })?;
        Ok(bytes
            .chunks_exact(width)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// Decodes the whole buffer as values of type `T`.
    pub fn values<T: Pod>(&self) -> Result<Vec<T>, BrainError> {
        let width = size_of::<T>();
        if self.data.len() % width != 0 {
            return Err(BrainError::SizeMismatch {
                expected: self.data.len().next_multiple_of(width),
                actual: self.data.len(),
            });
        }
        self.read(0, self.data.len() / width)
    }

    /// Sequential reader over the buffer.
    pub fn reader(&self) -> GenomeReader<'_> {
        GenomeReader {
            data: &self.data,
            pos: 0,
        }
    }

    /// Buffer length in bytes.
    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }

    /// Returns true when the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Combine-hash of all bytes, formatted as lowercase hex.
    pub fn hash_hex(&self) -> String {
        let hash = self.data.iter().fold(0u64, |h, &b| {
            h ^ u64::from(b)
                .wrapping_add(0x9e37_79b9)
                .wrapping_add(h << 6)
                .wrapping_add(h >> 2)
        });
        let mut out = String::with_capacity(16);
        let _ = write!(out, "{hash:x}");
        out
    }
}

/// Cursor that reads consecutive tensors out of a genome.
#[derive(Debug)]
pub struct GenomeReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl GenomeReader<'_> {
    /// Reads the next `len` values.
    pub fn take<T: Pod>(&mut self, len: usize) -> Result<Vec<T>, BrainError> {
        let end = self.pos + len * size_of::<T>();
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(BrainError::SizeMismatch {
                expected: end,
                actual: self.data.len(),
            })?;
        self.pos = end;
        Ok(bytes
            .chunks_exact(size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// Fails unless every byte has been consumed.
    pub fn finish(self) -> Result<(), BrainError> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(BrainError::SizeMismatch {
                expected: self.pos,
                actual: self.data.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_keeps_order() {
        let mut genome = Genome::with_capacity(16);
        genome.append(&[1.0f32, 2.0]);
        genome.append(&[3.0f32]);
        assert_eq!(genome.len_bytes(), 12);
        assert_eq!(genome.read::<f32>(1, 2).unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn read_past_end_is_size_mismatch() {
        let genome = Genome::from_values(&[1u32, 2]);
        let err = genome.read::<u32>(1, 2).unwrap_err();
        assert!(matches!(
            err,
            BrainError::SizeMismatch {
                expected: 12,
                actual: 8
            }
        ));
    }

    #[test]
    fn dense_layout_counts_weights_and_biases() {
        let layout = ParamLayout::dense(&[3, 2, 1]);
        assert_eq!(layout.shapes().len(), 4);
        assert_eq!(layout.scalar_count(), 3 * 2 + 2 + 2 + 1);
        assert_eq!(layout.byte_len::<f32>(), 11 * 4);
    }

    #[test]
    fn hash_depends_on_content() {
        let a = Genome::from_values(&[1.0f32, 2.0]);
        let b = Genome::from_values(&[1.0f32, 2.5]);
        assert_eq!(a.hash_hex(), a.clone().hash_hex());
        assert_ne!(a.hash_hex(), b.hash_hex());
        assert_eq!(Genome::default().hash_hex(), "0");
    }

    #[test]
    fn reader_rejects_trailing_bytes() {
        let genome = Genome::from_values(&[1.0f32, 2.0, 3.0]);
        let mut reader = genome.reader();
        assert_eq!(reader.take::<f32>(2).unwrap(), vec![1.0, 2.0]);
        assert!(reader.finish().is_err());
    }

    #[test]
    fn empty_clone_has_same_length() {
        let genome = Genome::from_values(&[7u8; 9]);
        let clone = genome.empty_clone();
        assert_eq!(clone.len_bytes(), 9);
        assert!(clone.as_bytes().iter().all(|&b| b == 0));
    }
}
