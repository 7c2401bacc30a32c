//! Serialized model documents.
//!
//! JSON documents carrying the architecture descriptor plus every parameter
//! of a trained network. Deserialization is strict (unknown fields are
//! rejected) and `validate` cross-checks every declared shape against every
//! stored buffer, so a corrupt document fails loudly at load time instead of
//! producing a silently wrong network.

use crate::cnn::{PoolConfig, PoolMode};
use crate::error::{EngineError, Result};
use crate::matrix::Matrix;
use crate::utils::Activation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A matrix as stored in a model document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixData {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl MatrixData {
    pub fn from_matrix(matrix: &Matrix) -> Self {
        Self {
            rows: matrix.rows(),
            cols: matrix.cols(),
            data: matrix.to_vec(),
        }
    }

    pub fn to_matrix(&self) -> Result<Matrix> {
        self.check_len()?;
        Matrix::matrix_from_slice(&self.data, self.rows, self.cols)
    }

    fn check_len(&self) -> Result<()> {
        if self.data.len() != self.rows * self.cols {
            return Err(EngineError::InvalidModel(format!(
                "matrix declared {}x{} but stores {} values",
                self.rows,
                self.cols,
                self.data.len()
            )));
        }
        Ok(())
    }

    fn check_shape(&self, rows: usize, cols: usize, what: &str) -> Result<()> {
        self.check_len()?;
        if self.rows != rows || self.cols != cols {
            return Err(EngineError::InvalidModel(format!(
                "{} expected shape {}x{}, found {}x{}",
                what, rows, cols, self.rows, self.cols
            )));
        }
        Ok(())
    }
}

/// One dense layer's parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerData {
    pub weights: MatrixData,
    pub biases: MatrixData,
}

/// Serialized FFNN: ordered layer sizes plus per-layer parameters and
/// optional standardization statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FfnnModel {
    pub sizes: Vec<usize>,
    pub activation: String,
    pub layers: Vec<LayerData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<MatrixData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std: Option<MatrixData>,
}

impl FfnnModel {
    /// Check internal consistency of every declared shape.
    pub fn validate(&self) -> Result<()> {
        Activation::parse(&self.activation)?;

        if self.sizes.len() < 2 {
            return Err(EngineError::InvalidModel(format!(
                "need at least two layer sizes, got {:?}",
                self.sizes
            )));
        }
        if self.sizes.iter().any(|&s| s == 0) {
            return Err(EngineError::InvalidModel(format!(
                "layer sizes must be nonzero, got {:?}",
                self.sizes
            )));
        }
        if self.layers.len() != self.sizes.len() - 1 {
            return Err(EngineError::InvalidModel(format!(
                "{} sizes declare {} layers but {} are stored",
                self.sizes.len(),
                self.sizes.len() - 1,
                self.layers.len()
            )));
        }

        for (i, layer) in self.layers.iter().enumerate() {
            let (input, output) = (self.sizes[i], self.sizes[i + 1]);
            layer
                .weights
                .check_shape(output, input, &format!("layer {} weights", i))?;
            layer
                .biases
                .check_shape(output, 1, &format!("layer {} biases", i))?;
        }

        match (&self.mean, &self.std) {
            (None, None) => {}
            (Some(mean), Some(std)) => {
                mean.check_shape(self.sizes[0], 1, "normalization mean")?;
                std.check_shape(self.sizes[0], 1, "normalization std")?;
            }
            _ => {
                return Err(EngineError::InvalidModel(
                    "normalization mean and std must be stored together".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let model: FfnnModel = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidModel(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::InvalidModel(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// One convolution kernel's parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelData {
    pub weights: MatrixData,
    pub bias: f64,
}

/// Pooling configuration as stored in a model document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolData {
    pub window: usize,
    pub stride: usize,
    pub mode: String,
}

impl PoolData {
    pub fn from_config(pool: &PoolConfig) -> Self {
        Self {
            window: pool.window,
            stride: pool.stride,
            mode: match pool.mode {
                PoolMode::Max => "max".to_string(),
                PoolMode::Average => "average".to_string(),
            },
        }
    }

    pub fn to_config(&self) -> Result<PoolConfig> {
        let mode = match self.mode.as_str() {
            "max" => PoolMode::Max,
            "average" => PoolMode::Average,
            other => {
                return Err(EngineError::InvalidModel(format!(
                    "unknown pooling mode '{}', expected 'max' or 'average'",
                    other
                )));
            }
        };
        Ok(PoolConfig {
            window: self.window,
            stride: self.stride,
            mode,
        })
    }
}

/// Serialized CNN: kernel bank, pooling configuration and dense stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CnnModel {
    pub input_rows: usize,
    pub input_cols: usize,
    pub kernel_size: usize,
    pub padding: usize,
    pub conv_stride: usize,
    pub pool: PoolData,
    pub dense_sizes: Vec<usize>,
    pub activation: String,
    pub kernels: Vec<KernelData>,
    pub dense: Vec<LayerData>,
}

impl CnnModel {
    fn conv_dim(&self, input: usize) -> Result<usize> {
        let padded = input + 2 * self.padding;
        if self.kernel_size == 0 || self.conv_stride == 0 || self.kernel_size > padded {
            return Err(EngineError::InvalidModel(format!(
                "kernel size {} with stride {} does not fit input dimension {}",
                self.kernel_size, self.conv_stride, input
            )));
        }
        Ok((padded - self.kernel_size) / self.conv_stride + 1)
    }

    fn pooled_dim(&self, conv: usize) -> Result<usize> {
        if self.pool.window == 0 || self.pool.stride == 0 || self.pool.window > conv {
            return Err(EngineError::InvalidModel(format!(
                "pooling window {} with stride {} does not fit feature map dimension {}",
                self.pool.window, self.pool.stride, conv
            )));
        }
        Ok((conv - self.pool.window) / self.pool.stride + 1)
    }

    /// Length of the flattened vector entering the dense stack.
    pub fn flattened_len(&self) -> Result<usize> {
        let h = self.pooled_dim(self.conv_dim(self.input_rows)?)?;
        let w = self.pooled_dim(self.conv_dim(self.input_cols)?)?;
        Ok(self.kernels.len() * h * w)
    }

    /// Check internal consistency of every declared shape.
    pub fn validate(&self) -> Result<()> {
        Activation::parse(&self.activation)?;
        self.pool.to_config()?;

        if self.kernels.is_empty() {
            return Err(EngineError::InvalidModel(
                "kernel bank is empty".to_string(),
            ));
        }
        for (i, kernel) in self.kernels.iter().enumerate() {
            kernel.weights.check_shape(
                self.kernel_size,
                self.kernel_size,
                &format!("kernel {}", i),
            )?;
        }

        if self.dense_sizes.is_empty() || self.dense_sizes.iter().any(|&s| s == 0) {
            return Err(EngineError::InvalidModel(format!(
                "dense sizes must be nonempty and nonzero, got {:?}",
                self.dense_sizes
            )));
        }
        if self.dense.len() != self.dense_sizes.len() {
            return Err(EngineError::InvalidModel(format!(
                "{} dense sizes declared but {} layers stored",
                self.dense_sizes.len(),
                self.dense.len()
            )));
        }

        let mut input = self.flattened_len()?;
        for (i, (layer, &output)) in self.dense.iter().zip(&self.dense_sizes).enumerate() {
            layer
                .weights
                .check_shape(output, input, &format!("dense layer {} weights", i))?;
            layer
                .biases
                .check_shape(output, 1, &format!("dense layer {} biases", i))?;
            input = output;
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let model: CnnModel = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidModel(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::InvalidModel(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
