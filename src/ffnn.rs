//! Fully-connected feedforward network.
//!
//! A stack of dense layers trained with mini-batch stochastic gradient
//! descent on a mean-squared-error loss. The dense forward/backward helpers
//! here are shared with the CNN's classification stack.

use crate::dataset::{Normalization, Sample};
use crate::error::{EngineError, Result};
use crate::matrix::Matrix;
use crate::model::{FfnnModel, LayerData, MatrixData};
use crate::utils::{Activation, SimpleRng};

/// One fully-connected layer: weights (output x input) and biases (output x 1).
#[derive(Debug, Clone)]
pub struct DenseLayer {
    pub(crate) weights: Matrix,
    pub(crate) biases: Matrix,
}

impl DenseLayer {
    /// Gaussian-initialized layer; weights are scaled by `1/sqrt(fan_in)`.
    pub fn new(input_size: usize, output_size: usize, rng: &mut SimpleRng) -> Self {
        let mut weights = Matrix::new(output_size, input_size);
        weights.randomize(1.0 / (input_size as f64).sqrt(), rng);

        let mut biases = Matrix::new(output_size, 1);
        biases.randomize(1.0, rng);

        Self { weights, biases }
    }

    pub(crate) fn from_parts(weights: Matrix, biases: Matrix) -> Self {
        Self { weights, biases }
    }

    pub fn input_size(&self) -> usize {
        self.weights.cols()
    }

    pub fn output_size(&self) -> usize {
        self.weights.rows()
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    pub fn biases(&self) -> &Matrix {
        &self.biases
    }
}

/// Per-layer weight and bias gradients for one sample.
#[derive(Debug, Clone)]
pub struct LayerGradients {
    pub weights: Matrix,
    pub biases: Matrix,
}

/// Dense stack forward pass retaining every pre-activation and activation.
///
/// Returns `(zs, activations)`; `activations` does not include the input.
pub(crate) fn dense_forward_cached(
    layers: &[DenseLayer],
    activation: Activation,
    input: &Matrix,
) -> Result<(Vec<Matrix>, Vec<Matrix>)> {
    let mut zs = Vec::with_capacity(layers.len());
    let mut activations = Vec::with_capacity(layers.len());

    let mut a = input.clone();
    for layer in layers {
        let mut z = layer.weights.matmul(&a)?;
        z.add_assign(&layer.biases)?;
        a = Matrix::map(&z, |v| activation.apply(v));
        zs.push(z);
        activations.push(a.clone());
    }
    Ok((zs, activations))
}

/// Dense stack backward pass from cached intermediates.
///
/// Returns the per-layer gradients and the error propagated to the stack's
/// input (`W_0^T . delta_0`), which the CNN routes back through pooling.
pub(crate) fn dense_backward(
    layers: &[DenseLayer],
    activation: Activation,
    input: &Matrix,
    target: &Matrix,
    zs: &[Matrix],
    activations: &[Matrix],
) -> Result<(Vec<LayerGradients>, Matrix)> {
    let last = layers.len() - 1;

    // Output error for mean squared error: (a_L - y) .* act'(z_L).
    let diff = Matrix::sub(&activations[last], target)?;
    let mut delta = Matrix::hadamard(&diff, &Matrix::map(&zs[last], |v| activation.derivative(v)))?;

    let mut gradients = vec![
        LayerGradients {
            weights: Matrix::new(0, 0),
            biases: Matrix::new(0, 0),
        };
        layers.len()
    ];

    for l in (0..layers.len()).rev() {
        let prev_activation = if l == 0 { input } else { &activations[l - 1] };
        gradients[l] = LayerGradients {
            weights: delta.matmul(&prev_activation.transpose())?,
            biases: delta.clone(),
        };

        let back = layers[l].weights.transpose().matmul(&delta)?;
        if l == 0 {
            return Ok((gradients, back));
        }
        delta = Matrix::hadamard(&back, &Matrix::map(&zs[l - 1], |v| activation.derivative(v)))?;
    }

    unreachable!("dense stack is never empty");
}

/// Fully-connected feedforward classifier.
pub struct Ffnn {
    layers: Vec<DenseLayer>,
    activation: Activation,
    normalization: Option<Normalization>,
}

impl Ffnn {
    /// Build a network from an ordered list of layer sizes (input first,
    /// output last), with randomized parameters.
    pub fn new(sizes: &[usize], activation: Activation, rng: &mut SimpleRng) -> Result<Self> {
        if sizes.len() < 2 {
            return Err(EngineError::Config(format!(
                "network needs at least an input and an output size, got {:?}",
                sizes
            )));
        }
        if sizes.iter().any(|&s| s == 0) {
            return Err(EngineError::Config(format!(
                "layer sizes must be nonzero, got {:?}",
                sizes
            )));
        }

        let layers = sizes
            .windows(2)
            .map(|pair| DenseLayer::new(pair[0], pair[1], rng))
            .collect();

        Ok(Self {
            layers,
            activation,
            normalization: None,
        })
    }

    /// Rehydrate a network from a validated serialized model.
    pub fn from_model(model: &FfnnModel) -> Result<Self> {
        model.validate()?;

        let layers = model
            .layers
            .iter()
            .map(|layer| {
                Ok(DenseLayer::from_parts(
                    layer.weights.to_matrix()?,
                    layer.biases.to_matrix()?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let normalization = match (&model.mean, &model.std) {
            (Some(mean), Some(std)) => Some(Normalization {
                mean: mean.to_matrix()?,
                std: std.to_matrix()?,
            }),
            _ => None,
        };

        Ok(Self {
            layers,
            activation: Activation::parse(&model.activation)?,
            normalization,
        })
    }

    /// Serialize the current parameters.
    pub fn to_model(&self) -> FfnnModel {
        FfnnModel {
            sizes: self.layer_sizes(),
            activation: self.activation.name().to_string(),
            layers: self
                .layers
                .iter()
                .map(|layer| LayerData {
                    weights: MatrixData::from_matrix(&layer.weights),
                    biases: MatrixData::from_matrix(&layer.biases),
                })
                .collect(),
            mean: self
                .normalization
                .as_ref()
                .map(|n| MatrixData::from_matrix(&n.mean)),
            std: self
                .normalization
                .as_ref()
                .map(|n| MatrixData::from_matrix(&n.std)),
        }
    }

    /// Ordered layer sizes, input first.
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![self.layers[0].input_size()];
        sizes.extend(self.layers.iter().map(|l| l.output_size()));
        sizes
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    /// Standardization statistics, if fitted or loaded.
    pub fn normalization(&self) -> Option<&Normalization> {
        self.normalization.as_ref()
    }

    /// Fit per-dimension mean/std from a training set and attach them to
    /// this network so they persist through the model codec.
    pub fn fit_normalization(&mut self, training: &[Sample]) -> Result<()> {
        self.normalization = Some(Normalization::fit(training)?);
        Ok(())
    }

    /// Forward pass producing the output activation; no intermediates kept.
    pub fn feedforward(&self, input: &Matrix) -> Result<Matrix> {
        let mut a = input.clone();
        for layer in &self.layers {
            let mut z = layer.weights.matmul(&a)?;
            z.add_assign(&layer.biases)?;
            z.map_inplace(|v| self.activation.apply(v));
            a = z;
        }
        Ok(a)
    }

    /// Forward pass returning the output as a plain vector; the predicted
    /// class is the argmax, left to the caller.
    pub fn predict(&self, input: &Matrix) -> Result<Vec<f64>> {
        Ok(self.feedforward(input)?.to_vec())
    }

    /// Gradients of the MSE loss for one (input, one-hot target) sample.
    pub fn backpropagate(&self, input: &Matrix, target: &Matrix) -> Result<Vec<LayerGradients>> {
        let (zs, activations) = dense_forward_cached(&self.layers, self.activation, input)?;
        let (gradients, _) = dense_backward(
            &self.layers,
            self.activation,
            input,
            target,
            &zs,
            &activations,
        )?;
        Ok(gradients)
    }

    /// Mini-batch stochastic gradient descent with L2 weight decay.
    ///
    /// Shuffles the training set each epoch, averages gradients over each
    /// mini-batch (the last batch may be short) and applies
    /// `W -= (lr/batch) * sum(dW) + lr * l2 * W` and
    /// `b -= (lr/batch) * sum(db)`.
    ///
    /// When a test set is given, returns the correct count after each epoch.
    pub fn stochastic_gradient_descent(
        &mut self,
        training: &[Sample],
        hp: &crate::config::Hyperparameters,
        test: Option<&[Sample]>,
        rng: &mut SimpleRng,
    ) -> Result<Vec<usize>> {
        let mut indices: Vec<usize> = (0..training.len()).collect();
        let mut epoch_scores = Vec::new();

        for _ in 0..hp.epochs {
            rng.shuffle_usize(&mut indices);

            for batch in indices.chunks(hp.mini_batch_size) {
                let mut sums: Option<Vec<LayerGradients>> = None;

                for &i in batch {
                    let sample = &training[i];
                    let gradients = self.backpropagate(&sample.input, &sample.target)?;
                    match &mut sums {
                        None => sums = Some(gradients),
                        Some(sums) => {
                            for (sum, g) in sums.iter_mut().zip(&gradients) {
                                sum.weights.add_assign(&g.weights)?;
                                sum.biases.add_assign(&g.biases)?;
                            }
                        }
                    }
                }

                let sums = match sums {
                    Some(sums) => sums,
                    None => continue,
                };

                let step = -hp.learning_rate / batch.len() as f64;
                for (layer, sum) in self.layers.iter_mut().zip(&sums) {
                    if hp.l2 != 0.0 {
                        layer.weights.scale(1.0 - hp.learning_rate * hp.l2);
                    }
                    layer.weights.add_scaled(&sum.weights, step)?;
                    layer.biases.add_scaled(&sum.biases, step)?;
                }
            }

            if let Some(test) = test {
                epoch_scores.push(self.accuracy(test)?);
            }
        }

        Ok(epoch_scores)
    }

    /// Number of samples whose predicted class matches the target class.
    /// An empty dataset yields 0.
    pub fn accuracy(&self, dataset: &[Sample]) -> Result<usize> {
        let mut correct = 0;
        for sample in dataset {
            let output = self.feedforward(&sample.input)?;
            if output.argmax() == sample.target.argmax() {
                correct += 1;
            }
        }
        Ok(correct)
    }
}
