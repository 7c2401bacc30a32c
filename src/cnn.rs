//! Convolutional network: conv -> activation -> pool -> flatten -> dense.
//!
//! One convolution stage (a bank of square kernels over a single-channel
//! input) feeds a pooling stage and then the same dense classification stack
//! the FFNN uses. All convolution and pooling arithmetic is explicit index
//! loops; max pooling caches the winning position per window so the backward
//! pass can route gradients exactly.

use crate::dataset::Sample;
use crate::error::{EngineError, Result};
use crate::ffnn::{dense_backward, dense_forward_cached, DenseLayer, LayerGradients};
use crate::matrix::Matrix;
use crate::model::{CnnModel, KernelData, LayerData, MatrixData, PoolData};
use crate::utils::{Activation, SimpleRng};

/// One convolution kernel: a square weight bank plus a scalar bias.
#[derive(Debug, Clone)]
pub struct ConvKernel {
    pub(crate) weights: Matrix,
    pub(crate) bias: f64,
}

impl ConvKernel {
    fn new(size: usize, rng: &mut SimpleRng) -> Self {
        let mut weights = Matrix::new(size, size);
        weights.randomize(1.0 / (size as f64), rng);
        Self {
            weights,
            bias: rng.next_gaussian(),
        }
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }
}

/// Window reduction used by the pooling stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    Max,
    Average,
}

/// Pooling window configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub window: usize,
    pub stride: usize,
    pub mode: PoolMode,
}

/// Architecture constants for a fresh CNN.
#[derive(Debug, Clone)]
pub struct CnnConfig {
    pub input_rows: usize,
    pub input_cols: usize,
    pub kernel_count: usize,
    pub kernel_size: usize,
    pub padding: usize,
    pub conv_stride: usize,
    pub pool: PoolConfig,
    /// Dense sizes after the flatten boundary, hidden layers first and the
    /// class count last; the flattened length is prepended automatically.
    pub dense_sizes: Vec<usize>,
    pub activation: Activation,
}

impl Default for CnnConfig {
    fn default() -> Self {
        Self {
            input_rows: 28,
            input_cols: 28,
            kernel_count: 8,
            kernel_size: 3,
            padding: 0,
            conv_stride: 1,
            pool: PoolConfig {
                window: 2,
                stride: 2,
                mode: PoolMode::Max,
            },
            dense_sizes: vec![10],
            activation: Activation::Sigmoid,
        }
    }
}

fn output_dim(input: usize, window: usize, padding: usize, stride: usize) -> usize {
    (input + 2 * padding - window) / stride + 1
}

impl CnnConfig {
    /// Feature-map dimensions after convolution.
    pub fn conv_dims(&self) -> (usize, usize) {
        (
            output_dim(self.input_rows, self.kernel_size, self.padding, self.conv_stride),
            output_dim(self.input_cols, self.kernel_size, self.padding, self.conv_stride),
        )
    }

    /// Feature-map dimensions after pooling.
    pub fn pooled_dims(&self) -> (usize, usize) {
        let (h, w) = self.conv_dims();
        (
            output_dim(h, self.pool.window, 0, self.pool.stride),
            output_dim(w, self.pool.window, 0, self.pool.stride),
        )
    }

    /// Length of the flattened vector entering the dense stack.
    pub fn flattened_len(&self) -> usize {
        let (h, w) = self.pooled_dims();
        self.kernel_count * h * w
    }

    pub fn validate(&self) -> Result<()> {
        if self.kernel_count == 0
            || self.kernel_size == 0
            || self.conv_stride == 0
            || self.pool.window == 0
            || self.pool.stride == 0
        {
            return Err(EngineError::Config(
                "kernel count/size, strides and pooling window must be nonzero".to_string(),
            ));
        }
        if self.kernel_size > self.input_rows + 2 * self.padding
            || self.kernel_size > self.input_cols + 2 * self.padding
        {
            return Err(EngineError::Config(format!(
                "kernel size {} does not fit a {}x{} input with padding {}",
                self.kernel_size, self.input_rows, self.input_cols, self.padding
            )));
        }
        let (h, w) = self.conv_dims();
        if self.pool.window > h || self.pool.window > w {
            return Err(EngineError::Config(format!(
                "pooling window {} does not fit the {}x{} feature map",
                self.pool.window, h, w
            )));
        }
        if self.dense_sizes.is_empty() || self.dense_sizes.iter().any(|&s| s == 0) {
            return Err(EngineError::Config(format!(
                "dense sizes must be nonempty and nonzero, got {:?}",
                self.dense_sizes
            )));
        }
        Ok(())
    }
}

/// All intermediates of one forward pass, retained for backpropagation.
pub struct CnnTrace {
    /// Pre-activation feature maps, one per kernel.
    pub pre_activation: Vec<Matrix>,
    /// Activated feature maps.
    pub activated: Vec<Matrix>,
    /// Pooled maps.
    pub pooled: Vec<Matrix>,
    /// For max pooling: per pooled cell, the flat index of the winning
    /// position inside the activated map. Empty for average pooling.
    pub max_indices: Vec<Vec<usize>>,
    /// Flattened pooled maps (kernel-major, row-major within each map).
    pub flat: Matrix,
    /// Dense-stack pre-activations.
    pub zs: Vec<Matrix>,
    /// Dense-stack activations; the last entry is the output.
    pub activations: Vec<Matrix>,
}

impl CnnTrace {
    pub fn output(&self) -> &Matrix {
        self.activations.last().expect("dense stack is never empty")
    }
}

/// Gradients of one sample for every trainable parameter, plus the gradient
/// with respect to the input image.
pub struct CnnGradients {
    pub kernel_weights: Vec<Matrix>,
    pub kernel_biases: Vec<f64>,
    pub dense: Vec<LayerGradients>,
    pub input: Matrix,
}

/// Convolutional classifier.
pub struct Cnn {
    config: CnnConfig,
    kernels: Vec<ConvKernel>,
    dense: Vec<DenseLayer>,
}

impl Cnn {
    /// Fresh network with Gaussian-initialized kernels and dense layers.
    pub fn new(config: CnnConfig, rng: &mut SimpleRng) -> Result<Self> {
        config.validate()?;

        let kernels = (0..config.kernel_count)
            .map(|_| ConvKernel::new(config.kernel_size, rng))
            .collect();

        let mut sizes = vec![config.flattened_len()];
        sizes.extend_from_slice(&config.dense_sizes);
        let dense = sizes
            .windows(2)
            .map(|pair| DenseLayer::new(pair[0], pair[1], rng))
            .collect();

        Ok(Self {
            config,
            kernels,
            dense,
        })
    }

    /// Rehydrate a network from a validated serialized model.
    pub fn from_model(model: &CnnModel) -> Result<Self> {
        model.validate()?;

        let config = CnnConfig {
            input_rows: model.input_rows,
            input_cols: model.input_cols,
            kernel_count: model.kernels.len(),
            kernel_size: model.kernel_size,
            padding: model.padding,
            conv_stride: model.conv_stride,
            pool: model.pool.to_config()?,
            dense_sizes: model.dense_sizes.clone(),
            activation: Activation::parse(&model.activation)?,
        };
        config.validate()?;

        let kernels = model
            .kernels
            .iter()
            .map(|k| {
                Ok(ConvKernel {
                    weights: k.weights.to_matrix()?,
                    bias: k.bias,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let dense = model
            .dense
            .iter()
            .map(|layer| {
                Ok(DenseLayer::from_parts(
                    layer.weights.to_matrix()?,
                    layer.biases.to_matrix()?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            kernels,
            dense,
        })
    }

    /// Serialize the current parameters.
    pub fn to_model(&self) -> CnnModel {
        CnnModel {
            input_rows: self.config.input_rows,
            input_cols: self.config.input_cols,
            kernel_size: self.config.kernel_size,
            padding: self.config.padding,
            conv_stride: self.config.conv_stride,
            pool: PoolData::from_config(&self.config.pool),
            dense_sizes: self.config.dense_sizes.clone(),
            activation: self.config.activation.name().to_string(),
            kernels: self
                .kernels
                .iter()
                .map(|k| KernelData {
                    weights: MatrixData::from_matrix(&k.weights),
                    bias: k.bias,
                })
                .collect(),
            dense: self
                .dense
                .iter()
                .map(|layer| LayerData {
                    weights: MatrixData::from_matrix(&layer.weights),
                    biases: MatrixData::from_matrix(&layer.biases),
                })
                .collect(),
        }
    }

    pub fn config(&self) -> &CnnConfig {
        &self.config
    }

    pub fn kernels(&self) -> &[ConvKernel] {
        &self.kernels
    }

    pub fn dense_layers(&self) -> &[DenseLayer] {
        &self.dense
    }

    fn check_input(&self, input: &Matrix) -> Result<()> {
        if input.rows() != self.config.input_rows || input.cols() != self.config.input_cols {
            return Err(EngineError::shape(
                "cnn_forward",
                (self.config.input_rows, self.config.input_cols),
                (input.rows(), input.cols()),
            ));
        }
        Ok(())
    }

    /// Valid cross-correlation of `input` with one kernel, plus its bias.
    fn correlate(&self, input: &Matrix, kernel: &ConvKernel) -> Matrix {
        let (out_h, out_w) = self.config.conv_dims();
        let k = self.config.kernel_size;
        let pad = self.config.padding as isize;
        let stride = self.config.conv_stride;

        let mut out = Matrix::new(out_h, out_w);
        for oy in 0..out_h {
            for ox in 0..out_w {
                let mut sum = kernel.bias;
                for ky in 0..k {
                    for kx in 0..k {
                        let iy = (oy * stride + ky) as isize - pad;
                        let ix = (ox * stride + kx) as isize - pad;
                        if iy >= 0
                            && iy < input.rows() as isize
                            && ix >= 0
                            && ix < input.cols() as isize
                        {
                            sum += input.get(iy as usize, ix as usize) * kernel.weights.get(ky, kx);
                        }
                    }
                }
                out.set(oy, ox, sum);
            }
        }
        out
    }

    /// Pool one activated map; for max pooling also return the flat index of
    /// each window's winner for gradient routing.
    fn pool_forward(&self, map: &Matrix) -> (Matrix, Vec<usize>) {
        let pool = self.config.pool;
        let out_h = output_dim(map.rows(), pool.window, 0, pool.stride);
        let out_w = output_dim(map.cols(), pool.window, 0, pool.stride);

        let mut out = Matrix::new(out_h, out_w);
        let mut winners = Vec::new();
        if pool.mode == PoolMode::Max {
            winners.reserve(out_h * out_w);
        }

        for py in 0..out_h {
            for px in 0..out_w {
                let y0 = py * pool.stride;
                let x0 = px * pool.stride;

                match pool.mode {
                    PoolMode::Max => {
                        let mut best = f64::NEG_INFINITY;
                        let mut best_idx = 0;
                        for dy in 0..pool.window {
                            for dx in 0..pool.window {
                                let v = map.get(y0 + dy, x0 + dx);
                                if v > best {
                                    best = v;
                                    best_idx = (y0 + dy) * map.cols() + (x0 + dx);
                                }
                            }
                        }
                        out.set(py, px, best);
                        winners.push(best_idx);
                    }
                    PoolMode::Average => {
                        let mut sum = 0.0;
                        for dy in 0..pool.window {
                            for dx in 0..pool.window {
                                sum += map.get(y0 + dy, x0 + dx);
                            }
                        }
                        out.set(py, px, sum / (pool.window * pool.window) as f64);
                    }
                }
            }
        }
        (out, winners)
    }

    /// Route a pooled-map gradient back to feature-map positions.
    fn pool_backward(
        &self,
        grad_pooled: &Matrix,
        map_rows: usize,
        map_cols: usize,
        winners: &[usize],
    ) -> Result<Matrix> {
        let pool = self.config.pool;
        let mut grad_map = Matrix::new(map_rows, map_cols);

        for py in 0..grad_pooled.rows() {
            for px in 0..grad_pooled.cols() {
                let g = grad_pooled.get(py, px);
                match pool.mode {
                    PoolMode::Max => {
                        let cell = py * grad_pooled.cols() + px;
                        let idx = *winners.get(cell).ok_or(EngineError::Index {
                            what: "max-pool winner cache",
                            index: cell,
                            len: winners.len(),
                        })?;
                        if idx >= map_rows * map_cols {
                            return Err(EngineError::Index {
                                what: "max-pool target position",
                                index: idx,
                                len: map_rows * map_cols,
                            });
                        }
                        let (y, x) = (idx / map_cols, idx % map_cols);
                        grad_map.set(y, x, grad_map.get(y, x) + g);
                    }
                    PoolMode::Average => {
                        let share = g / (pool.window * pool.window) as f64;
                        for dy in 0..pool.window {
                            for dx in 0..pool.window {
                                let y = py * pool.stride + dy;
                                let x = px * pool.stride + dx;
                                grad_map.set(y, x, grad_map.get(y, x) + share);
                            }
                        }
                    }
                }
            }
        }
        Ok(grad_map)
    }

    /// Full forward pass retaining every intermediate for backpropagation.
    pub fn forward(&self, input: &Matrix) -> Result<CnnTrace> {
        self.check_input(input)?;
        let activation = self.config.activation;

        let mut pre_activation = Vec::with_capacity(self.kernels.len());
        let mut activated = Vec::with_capacity(self.kernels.len());
        let mut pooled = Vec::with_capacity(self.kernels.len());
        let mut max_indices = Vec::with_capacity(self.kernels.len());
        let mut flat = Vec::with_capacity(self.config.flattened_len());

        for kernel in &self.kernels {
            let pre = self.correlate(input, kernel);
            let act = Matrix::map(&pre, |v| activation.apply(v));
            let (pool, winners) = self.pool_forward(&act);

            flat.extend_from_slice(pool.as_slice());
            pre_activation.push(pre);
            activated.push(act);
            pooled.push(pool);
            max_indices.push(winners);
        }

        let flat = Matrix::vector_from_slice(&flat);
        let (zs, activations) = dense_forward_cached(&self.dense, activation, &flat)?;

        Ok(CnnTrace {
            pre_activation,
            activated,
            pooled,
            max_indices,
            flat,
            zs,
            activations,
        })
    }

    /// Forward pass producing only the output vector, no caches retained.
    pub fn predict(&self, input: &Matrix) -> Result<Vec<f64>> {
        self.check_input(input)?;
        let activation = self.config.activation;

        let mut flat = Vec::with_capacity(self.config.flattened_len());
        for kernel in &self.kernels {
            let mut act = self.correlate(input, kernel);
            act.map_inplace(|v| activation.apply(v));
            let (pool, _) = self.pool_forward(&act);
            flat.extend_from_slice(pool.as_slice());
        }

        let mut a = Matrix::vector_from_slice(&flat);
        for layer in &self.dense {
            let mut z = layer.weights.matmul(&a)?;
            z.add_assign(&layer.biases)?;
            z.map_inplace(|v| activation.apply(v));
            a = z;
        }
        Ok(a.to_vec())
    }

    /// Gradients of the MSE loss for one (input, one-hot target) sample.
    pub fn backpropagate(&self, input: &Matrix, target: &Matrix) -> Result<CnnGradients> {
        let trace = self.forward(input)?;
        let activation = self.config.activation;

        // Dense stack first; this also yields the error at the flatten
        // boundary.
        let (dense_gradients, flat_error) = dense_backward(
            &self.dense,
            activation,
            &trace.flat,
            target,
            &trace.zs,
            &trace.activations,
        )?;

        let (pool_h, pool_w) = self.config.pooled_dims();
        let map_len = pool_h * pool_w;
        if flat_error.rows() != self.kernels.len() * map_len {
            return Err(EngineError::Index {
                what: "flatten-boundary error vector",
                index: flat_error.rows(),
                len: self.kernels.len() * map_len,
            });
        }
        let flat_slice = flat_error.as_slice();

        let k = self.config.kernel_size;
        let pad = self.config.padding as isize;
        let stride = self.config.conv_stride;
        let (conv_h, conv_w) = self.config.conv_dims();

        let mut kernel_weights = Vec::with_capacity(self.kernels.len());
        let mut kernel_biases = Vec::with_capacity(self.kernels.len());
        let mut grad_input = Matrix::new(input.rows(), input.cols());

        for (ki, kernel) in self.kernels.iter().enumerate() {
            // Reshape this kernel's slice of the flatten error back into the
            // pooled-map shape.
            let grad_pooled = Matrix::matrix_from_slice(
                &flat_slice[ki * map_len..(ki + 1) * map_len],
                pool_h,
                pool_w,
            )?;

            // Route through pooling, then apply the activation derivative at
            // the pre-activation map.
            let routed =
                self.pool_backward(&grad_pooled, conv_h, conv_w, &trace.max_indices[ki])?;
            let grad_pre = Matrix::hadamard(
                &routed,
                &Matrix::map(&trace.pre_activation[ki], |v| activation.derivative(v)),
            )?;

            // Kernel gradient by cross-correlating the input with the routed
            // gradient; input gradient scattered through the kernel weights
            // (full convolution with the flipped kernel).
            let mut grad_kernel = Matrix::new(k, k);
            let mut grad_bias = 0.0;
            for oy in 0..conv_h {
                for ox in 0..conv_w {
                    let g = grad_pre.get(oy, ox);
                    if g == 0.0 {
                        continue;
                    }
                    grad_bias += g;
                    for ky in 0..k {
                        for kx in 0..k {
                            let iy = (oy * stride + ky) as isize - pad;
                            let ix = (ox * stride + kx) as isize - pad;
                            if iy >= 0
                                && iy < input.rows() as isize
                                && ix >= 0
                                && ix < input.cols() as isize
                            {
                                let (iy, ix) = (iy as usize, ix as usize);
                                grad_kernel
                                    .set(ky, kx, grad_kernel.get(ky, kx) + g * input.get(iy, ix));
                                grad_input.set(
                                    iy,
                                    ix,
                                    grad_input.get(iy, ix) + g * kernel.weights.get(ky, kx),
                                );
                            }
                        }
                    }
                }
            }

            kernel_weights.push(grad_kernel);
            kernel_biases.push(grad_bias);
        }

        Ok(CnnGradients {
            kernel_weights,
            kernel_biases,
            dense: dense_gradients,
            input: grad_input,
        })
    }

    /// Per-sample stochastic gradient descent, shuffled each epoch.
    ///
    /// When a test set is given, returns the correct count after each epoch.
    pub fn train(
        &mut self,
        training: &[Sample],
        epochs: usize,
        learning_rate: f64,
        test: Option<&[Sample]>,
        rng: &mut SimpleRng,
    ) -> Result<Vec<usize>> {
        let mut indices: Vec<usize> = (0..training.len()).collect();
        let mut epoch_scores = Vec::new();

        for _ in 0..epochs {
            rng.shuffle_usize(&mut indices);

            for &i in &indices {
                let sample = &training[i];
                let gradients = self.backpropagate(&sample.input, &sample.target)?;

                for (kernel, (gw, gb)) in self.kernels.iter_mut().zip(
                    gradients
                        .kernel_weights
                        .iter()
                        .zip(gradients.kernel_biases.iter()),
                ) {
                    kernel.weights.add_scaled(gw, -learning_rate)?;
                    kernel.bias -= learning_rate * gb;
                }
                for (layer, g) in self.dense.iter_mut().zip(&gradients.dense) {
                    layer.weights.add_scaled(&g.weights, -learning_rate)?;
                    layer.biases.add_scaled(&g.biases, -learning_rate)?;
                }
            }

            if let Some(test) = test {
                epoch_scores.push(self.test(test)?);
            }
        }

        Ok(epoch_scores)
    }

    /// Number of samples whose predicted class matches the target class.
    /// An empty dataset yields 0.
    pub fn test(&self, dataset: &[Sample]) -> Result<usize> {
        let mut correct = 0;
        for sample in dataset {
            let output = self.predict(&sample.input)?;
            let predicted = Matrix::vector_from_slice(&output).argmax();
            if predicted == sample.target.argmax() {
                correct += 1;
            }
        }
        Ok(correct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::one_hot;
    use approx::assert_relative_eq;

    fn small_config() -> CnnConfig {
        CnnConfig {
            input_rows: 6,
            input_cols: 6,
            kernel_count: 2,
            kernel_size: 3,
            dense_sizes: vec![4],
            ..CnnConfig::default()
        }
    }

    #[test]
    fn test_config_dims() {
        let config = small_config();
        assert_eq!(config.conv_dims(), (4, 4));
        assert_eq!(config.pooled_dims(), (2, 2));
        assert_eq!(config.flattened_len(), 8);
    }

    #[test]
    fn test_default_config_matches_mnist() {
        let config = CnnConfig::default();
        assert_eq!(config.conv_dims(), (26, 26));
        assert_eq!(config.pooled_dims(), (13, 13));
        assert_eq!(config.flattened_len(), 8 * 13 * 13);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_oversized_window() {
        let mut config = small_config();
        config.pool.window = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_forward_trace_shapes() {
        let mut rng = SimpleRng::new(11);
        let cnn = Cnn::new(small_config(), &mut rng).unwrap();
        let input = Matrix::new(6, 6);

        let trace = cnn.forward(&input).unwrap();
        assert_eq!(trace.pre_activation.len(), 2);
        assert_eq!(trace.pre_activation[0].rows(), 4);
        assert_eq!(trace.pooled[0].rows(), 2);
        assert_eq!(trace.max_indices[0].len(), 4);
        assert_eq!(trace.flat.rows(), 8);
        assert_eq!(trace.output().rows(), 4);
    }

    #[test]
    fn test_forward_rejects_wrong_input_shape() {
        let mut rng = SimpleRng::new(12);
        let cnn = Cnn::new(small_config(), &mut rng).unwrap();
        assert!(cnn.forward(&Matrix::new(5, 6)).is_err());
    }

    #[test]
    fn test_predict_matches_forward_output() {
        let mut rng = SimpleRng::new(13);
        let cnn = Cnn::new(small_config(), &mut rng).unwrap();

        let mut input = Matrix::new(6, 6);
        let mut seed = SimpleRng::new(99);
        input.randomize(1.0, &mut seed);

        let trace = cnn.forward(&input).unwrap();
        let lean = cnn.predict(&input).unwrap();
        for (a, b) in trace.output().as_slice().iter().zip(&lean) {
            assert_relative_eq!(a, b);
        }
    }

    #[test]
    fn test_max_pool_routes_to_maximum() {
        // 2x2 window [[1,5],[3,2]]: the whole gradient must land on the 5.
        let mut rng = SimpleRng::new(14);
        let config = CnnConfig {
            input_rows: 4,
            input_cols: 4,
            kernel_count: 1,
            kernel_size: 3,
            dense_sizes: vec![2],
            ..CnnConfig::default()
        };
        let cnn = Cnn::new(config, &mut rng).unwrap();

        let map = Matrix::matrix_from_slice(&[1.0, 5.0, 3.0, 2.0], 2, 2).unwrap();
        let (pooled, winners) = cnn.pool_forward(&map);
        assert_eq!(pooled.rows(), 1);
        assert_eq!(pooled.get(0, 0), 5.0);
        assert_eq!(winners, vec![1]);

        let grad_pooled = Matrix::matrix_from_slice(&[1.0], 1, 1).unwrap();
        let routed = cnn.pool_backward(&grad_pooled, 2, 2, &winners).unwrap();
        assert_eq!(routed.as_slice(), &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_average_pool_distributes_evenly() {
        let mut rng = SimpleRng::new(15);
        let config = CnnConfig {
            input_rows: 4,
            input_cols: 4,
            kernel_count: 1,
            kernel_size: 3,
            pool: PoolConfig {
                window: 2,
                stride: 2,
                mode: PoolMode::Average,
            },
            dense_sizes: vec![2],
            ..CnnConfig::default()
        };
        let cnn = Cnn::new(config, &mut rng).unwrap();

        let map = Matrix::matrix_from_slice(&[1.0, 5.0, 3.0, 2.0], 2, 2).unwrap();
        let (pooled, winners) = cnn.pool_forward(&map);
        assert!(winners.is_empty());
        assert_relative_eq!(pooled.get(0, 0), 2.75);

        let grad_pooled = Matrix::matrix_from_slice(&[1.0], 1, 1).unwrap();
        let routed = cnn.pool_backward(&grad_pooled, 2, 2, &winners).unwrap();
        for &v in routed.as_slice() {
            assert_relative_eq!(v, 0.25);
        }
    }

    #[test]
    fn test_backpropagate_gradient_shapes() {
        let mut rng = SimpleRng::new(16);
        let cnn = Cnn::new(small_config(), &mut rng).unwrap();

        let mut input = Matrix::new(6, 6);
        input.randomize(1.0, &mut rng);
        let target = one_hot(1, 4).unwrap();

        let gradients = cnn.backpropagate(&input, &target).unwrap();
        assert_eq!(gradients.kernel_weights.len(), 2);
        assert_eq!(gradients.kernel_weights[0].rows(), 3);
        assert_eq!(gradients.kernel_biases.len(), 2);
        assert_eq!(gradients.dense.len(), 1);
        assert_eq!(gradients.input.rows(), 6);
    }

    #[test]
    fn test_test_empty_dataset() {
        let mut rng = SimpleRng::new(17);
        let cnn = Cnn::new(small_config(), &mut rng).unwrap();
        assert_eq!(cnn.test(&[]).unwrap(), 0);
    }
}
