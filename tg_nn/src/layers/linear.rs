//! Linear (fully connected) layer.

use rand::Rng;
use tg_core::{Error as TensorError, Shape, Tape, Tensor};

use crate::error::Result;

/// A linear (fully connected) layer: y = x @ W + b
#[derive(Debug, Clone)]
pub struct Linear {
    /// Weight matrix [in_features, out_features]
    pub weight: Tensor,
    /// Bias vector [out_features]
    pub bias: Tensor,
}

impl Linear {
    /// Create a new linear layer with random initialization.
    ///
    /// Weights are drawn from U(-√(2/in), √(2/in)) (Kaiming-style, for ReLU
    /// networks); the bias starts at zero.
    pub fn new<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Result<Self> {
        let bound = (2.0 / in_features as f64).sqrt();

        let weight_data: Vec<f64> = (0..in_features * out_features)
            .map(|_| rng.gen_range(-bound..=bound))
            .collect();

        let weight = Tensor::param("weight", weight_data, [in_features, out_features])?;
        let bias = Tensor::param("bias", vec![0.0; out_features], [out_features])?;

        Ok(Linear { weight, bias })
    }

    /// Create a linear layer from existing weight and bias tensors.
    pub fn from_tensors(weight: Tensor, bias: Tensor) -> Result<Self> {
        let out = match weight.shape().dims() {
            &[_, out] => out,
            _ => {
                return Err(TensorError::ShapeMismatch {
                    op: "linear",
                    lhs: weight.shape().clone(),
                    rhs: bias.shape().clone(),
                }
                .into())
            }
        };
        if bias.shape() != &Shape::new(vec![out]) {
            return Err(TensorError::ShapeMismatch {
                op: "linear",
                lhs: weight.shape().clone(),
                rhs: bias.shape().clone(),
            }
            .into());
        }
        Ok(Linear { weight, bias })
    }

    /// Forward pass: y = x @ W + b
    ///
    /// Input x has shape [batch, in_features]; output has shape [batch, out_features].
    pub fn forward(&self, tape: &Tape, x: &Tensor) -> Result<Tensor> {
        let y = tape.matmul(x, &self.weight)?;
        Ok(tape.add(&y, &self.bias)?)
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape().dim(0)
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape().dim(1)
    }

    /// Handles to the trainable parameters, weight first.
    pub fn parameters(&self) -> Vec<Tensor> {
        vec![self.weight.clone(), self.bias.clone()]
    }
}
