//! Labeled samples and input preprocessing.
//!
//! Raw collaborators hand the engine flat 784-byte intensity buffers and a
//! class label; this module wraps them into (input, one-hot target) pairs in
//! the shape each network expects and hosts the optional standardization
//! statistics.

use crate::error::{EngineError, Result};
use crate::matrix::Matrix;

/// Number of output classes (digits 0-9).
pub const NUM_CLASSES: usize = 10;
/// Image height/width in pixels.
pub const IMG_SIDE: usize = 28;
/// Flattened image length.
pub const IMG_LEN: usize = IMG_SIDE * IMG_SIDE;

// Added to the standard deviation so standardization never divides by zero.
pub(crate) const STD_EPSILON: f64 = 1e-100;

/// One labeled training or evaluation sample.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Network input: 784x1 vector for the FFNN, 28x28 matrix for the CNN.
    pub input: Matrix,
    /// One-hot target of length [`NUM_CLASSES`].
    pub target: Matrix,
}

impl Sample {
    /// FFNN sample: 784x1 input normalized to [0, 1].
    pub fn for_ffnn(pixels: &[u8], label: u8) -> Result<Self> {
        let values = normalize_pixels(pixels)?;
        Ok(Self {
            input: Matrix::vector_from_slice(&values),
            target: one_hot(label as usize, NUM_CLASSES)?,
        })
    }

    /// CNN sample: 28x28 input normalized to [0, 1].
    pub fn for_cnn(pixels: &[u8], label: u8) -> Result<Self> {
        let values = normalize_pixels(pixels)?;
        Ok(Self {
            input: Matrix::matrix_from_slice(&values, IMG_SIDE, IMG_SIDE)?,
            target: one_hot(label as usize, NUM_CLASSES)?,
        })
    }
}

fn normalize_pixels(pixels: &[u8]) -> Result<Vec<f64>> {
    if pixels.len() != IMG_LEN {
        return Err(EngineError::shape(
            "normalize_pixels",
            (IMG_LEN, 1),
            (pixels.len(), 1),
        ));
    }
    Ok(pixels.iter().map(|&p| p as f64 / 255.0).collect())
}

/// One-hot column vector with a single 1.0 at `label`.
pub fn one_hot(label: usize, classes: usize) -> Result<Matrix> {
    if label >= classes {
        return Err(EngineError::Index {
            what: "class label",
            index: label,
            len: classes,
        });
    }
    let mut target = Matrix::new(classes, 1);
    target.set(label, 0, 1.0);
    Ok(target)
}

/// Per-input-dimension mean and standard deviation, fitted once from a
/// training set and applied by the caller before forward/backward passes.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalization {
    pub mean: Matrix,
    pub std: Matrix,
}

impl Normalization {
    /// Fit mean and standard deviation over the inputs of `samples`.
    ///
    /// All inputs must share the shape of the first one.
    pub fn fit(samples: &[Sample]) -> Result<Self> {
        let first = samples.first().ok_or(EngineError::Index {
            what: "training set",
            index: 0,
            len: 0,
        })?;

        let n = samples.len() as f64;
        let mut mean = Matrix::new(first.input.rows(), first.input.cols());
        for sample in samples {
            mean.add_assign(&sample.input)?;
        }
        mean.div_scalar(n);

        let mut std = Matrix::new(first.input.rows(), first.input.cols());
        for sample in samples {
            let mut centered = Matrix::sub(&sample.input, &mean)?;
            centered.map_inplace(|x| x * x);
            std.add_assign(&centered)?;
        }
        std.map_inplace(|x| (x / n).sqrt());

        Ok(Self { mean, std })
    }

    /// Standardize `input` in place: subtract the mean, divide by the
    /// standard deviation plus a tiny epsilon.
    pub fn apply(&self, input: &mut Matrix) -> Result<()> {
        input.sub_assign(&self.mean)?;
        input.div_assign(&Matrix::map(&self.std, |x| x + STD_EPSILON))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat_image(value: u8) -> Vec<u8> {
        vec![value; IMG_LEN]
    }

    #[test]
    fn test_one_hot() {
        let t = one_hot(3, NUM_CLASSES).unwrap();
        assert_eq!(t.rows(), 10);
        assert_eq!(t.get(3, 0), 1.0);
        assert_eq!(t.as_slice().iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn test_one_hot_out_of_range() {
        assert!(matches!(
            one_hot(10, NUM_CLASSES),
            Err(EngineError::Index { .. })
        ));
    }

    #[test]
    fn test_ffnn_sample_shapes_and_normalization() {
        let sample = Sample::for_ffnn(&flat_image(255), 7).unwrap();
        assert_eq!(sample.input.rows(), IMG_LEN);
        assert_eq!(sample.input.cols(), 1);
        assert_relative_eq!(sample.input.get(0, 0), 1.0);
        assert_eq!(sample.target.argmax(), 7);
    }

    #[test]
    fn test_cnn_sample_shapes() {
        let sample = Sample::for_cnn(&flat_image(0), 1).unwrap();
        assert_eq!(sample.input.rows(), IMG_SIDE);
        assert_eq!(sample.input.cols(), IMG_SIDE);
        assert_eq!(sample.input.get(13, 13), 0.0);
    }

    #[test]
    fn test_sample_rejects_wrong_length() {
        assert!(Sample::for_ffnn(&[0u8; 100], 0).is_err());
    }

    #[test]
    fn test_normalization_fit_and_apply() {
        let a = Sample {
            input: Matrix::vector_from_slice(&[0.0, 2.0]),
            target: one_hot(0, NUM_CLASSES).unwrap(),
        };
        let b = Sample {
            input: Matrix::vector_from_slice(&[2.0, 4.0]),
            target: one_hot(1, NUM_CLASSES).unwrap(),
        };

        let norm = Normalization::fit(&[a.clone(), b]).unwrap();
        assert_relative_eq!(norm.mean.get(0, 0), 1.0);
        assert_relative_eq!(norm.mean.get(1, 0), 3.0);
        assert_relative_eq!(norm.std.get(0, 0), 1.0);

        let mut input = a.input;
        norm.apply(&mut input).unwrap();
        assert_relative_eq!(input.get(0, 0), -1.0, epsilon = 1e-9);
        assert_relative_eq!(input.get(1, 0), -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_normalization_fit_empty_fails() {
        assert!(Normalization::fit(&[]).is_err());
    }
}
