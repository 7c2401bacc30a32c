//! Activation functions.
//!
//! Both networks apply the same scalar nonlinearity elementwise; sigmoid is
//! the default, ReLU is available for experiments (use a much smaller
//! learning rate with it).

use crate::error::{EngineError, Result};

/// Elementwise activation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Sigmoid,
    Relu,
}

impl Activation {
    /// Apply the activation to a pre-activation value z.
    pub fn apply(self, z: f64) -> f64 {
        match self {
            Activation::Sigmoid => 1.0 / (1.0 + (-z).exp()),
            Activation::Relu => {
                if z > 0.0 {
                    z
                } else {
                    0.0
                }
            }
        }
    }

    /// Derivative with respect to the pre-activation value z.
    pub fn derivative(self, z: f64) -> f64 {
        match self {
            Activation::Sigmoid => {
                let s = self.apply(z);
                s * (1.0 - s)
            }
            Activation::Relu => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Codec name of the activation.
    pub fn name(self) -> &'static str {
        match self {
            Activation::Sigmoid => "sigmoid",
            Activation::Relu => "relu",
        }
    }

    /// Parse an activation from its codec name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "sigmoid" => Ok(Activation::Sigmoid),
            "relu" => Ok(Activation::Relu),
            other => Err(EngineError::InvalidModel(format!(
                "unknown activation '{}', expected 'sigmoid' or 'relu'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sigmoid_zero() {
        assert_relative_eq!(Activation::Sigmoid.apply(0.0), 0.5);
    }

    #[test]
    fn test_sigmoid_saturates() {
        assert!(Activation::Sigmoid.apply(20.0) > 0.999);
        assert!(Activation::Sigmoid.apply(-20.0) < 0.001);
    }

    #[test]
    fn test_sigmoid_derivative_at_zero() {
        assert_relative_eq!(Activation::Sigmoid.derivative(0.0), 0.25);
    }

    #[test]
    fn test_relu() {
        assert_eq!(Activation::Relu.apply(-2.0), 0.0);
        assert_eq!(Activation::Relu.apply(3.0), 3.0);
        assert_eq!(Activation::Relu.derivative(-2.0), 0.0);
        assert_eq!(Activation::Relu.derivative(3.0), 1.0);
    }

    #[test]
    fn test_sigmoid_derivative_matches_finite_difference() {
        let eps = 1e-6;
        for &z in &[-2.0, -0.5, 0.0, 0.7, 3.0] {
            let numeric = (Activation::Sigmoid.apply(z + eps)
                - Activation::Sigmoid.apply(z - eps))
                / (2.0 * eps);
            assert_relative_eq!(
                Activation::Sigmoid.derivative(z),
                numeric,
                epsilon = 1e-8
            );
        }
    }

    #[test]
    fn test_parse_roundtrip() {
        assert_eq!(Activation::parse("sigmoid").unwrap(), Activation::Sigmoid);
        assert_eq!(Activation::parse("relu").unwrap(), Activation::Relu);
        assert!(Activation::parse("tanh").is_err());
    }
}
