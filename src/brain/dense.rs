//! Dense feed-forward network with two derived hidden layers.

use std::f32::consts::SQRT_2;

use ndarray::linalg::general_mat_vec_mul;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use super::{ForwardScratch, Scalar};
use crate::error::BrainError;
use crate::genome::{Genome, ParamLayout};

/// Scale applied to the random initial biases.
const BIAS_SCALE: Scalar = 0.1;

/// Gaussian error linear unit.
#[inline]
pub fn gelu(x: Scalar) -> Scalar {
    x * 0.5 * (1.0 + libm::erff(x / SQRT_2))
}

/// Neuron counts `[inputs, hidden1, hidden2, outputs]` for a given arity.
///
/// `hidden1 = ceil((ins + outs) / 2)` and
/// `hidden2 = max(ceil((ins + outs) / 4), outs + 1)`.
pub fn layer_sizes(ins: usize, outs: usize) -> [usize; 4] {
    let hidden1 = (ins + outs).div_ceil(2);
    let hidden2 = (ins + outs).div_ceil(4).max(outs + 1);
    [ins, hidden1, hidden2, outs]
}

/// One fully connected layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Weight matrix (`input_size` × `output_size`), row-major.
    pub weights: Array2<Scalar>,
    /// Bias vector (`output_size`).
    pub biases: Array1<Scalar>,
}

/// Feed-forward network owning its weights, with GELU on every layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseBrain {
    layers: Vec<DenseLayer>,
}

impl DenseBrain {
    /// Parameter layout for a network of the given arity.
    pub fn layout(ins: usize, outs: usize) -> ParamLayout {
        ParamLayout::dense(&layer_sizes(ins, outs))
    }

    /// Builds a network from a genome written by [`DenseBrain::flatten`].
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::SizeMismatch`] when the genome length differs from the
    /// parameter count implied by `ins` and `outs`.
    pub fn from_genome(genome: &Genome, ins: usize, outs: usize) -> Result<Self, BrainError> {
        Self::layout(ins, outs).check::<Scalar>(genome)?;
        let layers = layers_from_values(&layer_sizes(ins, outs), &genome.values::<Scalar>()?)?;
        Ok(Self { layers })
    }

    /// Builds a network with random weights in `[-1, 1]` and biases in `[-0.1, 0.1]`.
    ///
    /// A seed of 0 draws the seed from the operating system.
    pub fn from_seed(seed: u64, ins: usize, outs: usize) -> Self {
        let mut rng = if seed == 0 {
            Pcg64::from_os_rng()
        } else {
            Pcg64::seed_from_u64(seed)
        };
        Self {
            layers: random_layers(&layer_sizes(ins, outs), &mut rng),
        }
    }

    /// Serializes all weights and biases, layer by layer.
    pub fn flatten(&self) -> Genome {
        Genome::from_values(&layers_to_values(&self.layers))
    }

    /// Neuron counts from input to output.
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.layers.len() + 1);
        if let Some(first) = self.layers.first() {
            sizes.push(first.weights.nrows());
        }
        sizes.extend(self.layers.iter().map(|l| l.weights.ncols()));
        sizes
    }

    /// The layers from input to output.
    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    /// Number of inputs.
    pub fn inputs_len(&self) -> usize {
        self.layers.first().map_or(0, |l| l.weights.nrows())
    }

    /// Number of outputs.
    pub fn outputs_len(&self) -> usize {
        self.layers.last().map_or(0, |l| l.weights.ncols())
    }

    /// Runs the network without allocating.
    pub fn forward(
        &self,
        inputs: &[Scalar],
        outputs: &mut [Scalar],
        scratch: &mut ForwardScratch,
    ) -> Result<(), BrainError> {
        run_layers(
            self.layers.iter().map(|l| (l.weights.view(), l.biases.view())),
            gelu,
            inputs,
            outputs,
            scratch,
        )
    }
}

/// Random layers: weights in `[-1, 1]`, biases in `[-0.1, 0.1]`.
pub(crate) fn random_layers<R: Rng>(sizes: &[usize], rng: &mut R) -> Vec<DenseLayer> {
    sizes
        .windows(2)
        .map(|w| {
            let weights = Array2::from_shape_simple_fn((w[0], w[1]), || rng.random_range(-1.0..=1.0));
            let biases =
                Array1::from_shape_simple_fn(w[1], || BIAS_SCALE * rng.random_range(-1.0..=1.0));
            DenseLayer { weights, biases }
        })
        .collect()
}

/// Rebuilds layers from flat values stored as weights then biases per layer.
pub(crate) fn layers_from_values(
    sizes: &[usize],
    values: &[Scalar],
) -> Result<Vec<DenseLayer>, BrainError> {
    let layout = ParamLayout::dense(sizes);
    let mismatch = || BrainError::SizeMismatch {
        expected: layout.byte_len::<Scalar>(),
        actual: size_of_val(values),
    };
    if values.len() != layout.scalar_count() {
        return Err(mismatch());
    }

    let mut offset = 0;
    let mut layers = Vec::with_capacity(layout.shapes().len() / 2);
    for pair in layout.shapes().chunks_exact(2) {
        let (w, b) = (pair[0], pair[1]);
        let weights = Array2::from_shape_vec(
            (w.rows, w.cols),
            values[offset..offset + w.len()].to_vec(),
        )
        .map_err(|_| mismatch())?;
        offset += w.len();
        let biases = Array1::from_vec(values[offset..offset + b.len()].to_vec());
        offset += b.len();
        layers.push(DenseLayer { weights, biases });
    }
    Ok(layers)
}

/// Flattens layers into weights then biases per layer.
pub(crate) fn layers_to_values(layers: &[DenseLayer]) -> Vec<Scalar> {
    let mut values = Vec::with_capacity(
        layers
            .iter()
            .map(|l| l.weights.len() + l.biases.len())
            .sum(),
    );
    for layer in layers {
        values.extend(layer.weights.iter().copied());
        values.extend(layer.biases.iter().copied());
    }
    values
}

/// Pushes `inputs` through a chain of `(weights, biases)` layers.
///
/// Each layer computes `activation(input · W + b)` with `W` shaped
/// `(input_size, output_size)`. Intermediate values live in `scratch`.
pub(crate) fn run_layers<'a>(
    layers: impl IntoIterator<Item = (ArrayView2<'a, Scalar>, ArrayView1<'a, Scalar>)>,
    activation: fn(Scalar) -> Scalar,
    inputs: &[Scalar],
    outputs: &mut [Scalar],
    scratch: &mut ForwardScratch,
) -> Result<(), BrainError> {
    let (mut src, mut dst) = scratch.buffers_mut();
    if src.len() < inputs.len() {
        src.resize(inputs.len(), 0.0);
    }
    src[..inputs.len()].copy_from_slice(inputs);
    let mut len = inputs.len();

    for (weights, biases) in layers {
        if weights.nrows() != len {
            return Err(BrainError::Arity {
                expected: weights.nrows(),
                actual: len,
            });
        }
        let out_len = weights.ncols();
        // Only grows when the scratch was sized for a narrower network.
        if dst.len() < out_len {
            dst.resize(out_len, 0.0);
        }
        {
            let x = ArrayView1::from(&src[..len]);
            let mut y = ArrayViewMut1::from(&mut dst[..out_len]);
            y.assign(&biases);
            general_mat_vec_mul(1.0, &weights.t(), &x, 1.0, &mut y);
            y.mapv_inplace(activation);
        }
        std::mem::swap(&mut src, &mut dst);
        len = out_len;
    }

    if len != outputs.len() {
        return Err(BrainError::Arity {
            expected: len,
            actual: outputs.len(),
        });
    }
    outputs.copy_from_slice(&src[..len]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gelu_matches_reference_points() {
        assert!(gelu(0.0).abs() < 1e-7);
        assert!((gelu(1.0) - 0.841_344_7).abs() < 1e-5);
        assert!((gelu(-1.0) + 0.158_655_3).abs() < 1e-5);
    }

    #[test]
    fn hidden_sizes_follow_arity() {
        assert_eq!(layer_sizes(18, 5), [18, 12, 6, 5]);
        assert_eq!(layer_sizes(1, 1), [1, 1, 2, 1]);
    }

    #[test]
    fn forward_uses_input_times_weights() {
        let layers = vec![DenseLayer {
            weights: Array2::from_shape_vec((2, 1), vec![1.0, 2.0]).unwrap(),
            biases: Array1::from_vec(vec![0.5]),
        }];
        let brain = DenseBrain { layers };
        let mut scratch = ForwardScratch::default();
        let mut out = [0.0];
        brain.forward(&[1.0, 1.0], &mut out, &mut scratch).unwrap();
        assert!((out[0] - gelu(3.5)).abs() < 1e-6);
    }

    #[test]
    fn wrong_input_length_is_rejected() {
        let brain = DenseBrain::from_seed(3, 4, 2);
        let mut scratch = brain_scratch(&brain);
        let mut out = [0.0; 2];
        assert!(matches!(
            brain.forward(&[0.0; 3], &mut out, &mut scratch),
            Err(BrainError::Arity { .. })
        ));
    }

    fn brain_scratch(brain: &DenseBrain) -> ForwardScratch {
        ForwardScratch::new(brain.layer_sizes().into_iter().max().unwrap_or(0))
    }
}
