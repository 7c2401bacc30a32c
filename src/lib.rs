//! Digit Recognizer Engine
//!
//! A self-contained learning engine for 28x28 grayscale digit classification.
//! All numeric machinery is implemented here from primitives: a dense matrix
//! type, a fully connected network trained with mini-batch SGD, and a small
//! convolutional network, plus a JSON model codec for persistence.
//!
//! # Modules
//!
//! - `matrix`: Dense row-major f64 matrix arithmetic
//! - `ffnn`: Fully connected network (feedforward, backprop, SGD)
//! - `cnn`: Convolutional network (conv, pooling, dense head)
//! - `model`: JSON (de)serialization and validation of trained models
//! - `dataset`: Samples, one-hot targets, input standardization
//! - `config`: Run configuration and hyperparameters
//! - `utils`: RNG and activation functions
//! - `error`: Engine-wide error type

pub mod cnn;
pub mod config;
pub mod dataset;
pub mod error;
pub mod ffnn;
pub mod matrix;
pub mod model;
pub mod utils;

pub use cnn::{Cnn, CnnConfig, PoolConfig, PoolMode};
pub use config::{Hyperparameters, RunConfig};
pub use dataset::{Normalization, Sample};
pub use error::{EngineError, Result};
pub use ffnn::Ffnn;
pub use matrix::Matrix;
pub use utils::{Activation, SimpleRng};
