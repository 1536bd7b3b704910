//! The closed set of differentiable operations.
//!
//! Each [`Op`] variant knows how to compute its output from its inputs and how to
//! turn the gradient of that output into gradient contributions for each input
//! (a vector-Jacobian product).

use crate::error::{Error, Result};
use crate::kernels;
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Operations that can be recorded on a [`Tape`](crate::Tape).
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// `inputs[0] @ inputs[1]` for `[m, k] @ [k, n]`.
    MatMul,
    /// Same-shape element-wise add, or `[m, n] + [n]` bias broadcast over rows.
    Add,
    /// `max(0, inputs[0])`.
    Relu,
    /// Sum of every element of `inputs[0]`, as a scalar.
    Sum,
    /// Mean negative log-likelihood of `softmax(inputs[0])` at `labels`.
    SoftmaxCrossEntropy { labels: Vec<usize> },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::MatMul => "matmul",
            Op::Add => "add",
            Op::Relu => "relu",
            Op::Sum => "sum",
            Op::SoftmaxCrossEntropy { .. } => "softmax_cross_entropy",
        }
    }

    /// Number of tensor inputs this operation takes.
    pub fn arity(&self) -> usize {
        match self {
            Op::MatMul | Op::Add => 2,
            Op::Relu | Op::Sum | Op::SoftmaxCrossEntropy { .. } => 1,
        }
    }

    /// Compute the output values and shape.
    pub(crate) fn forward(&self, inputs: &[Tensor]) -> Result<(Vec<f64>, Shape)> {
        debug_assert_eq!(inputs.len(), self.arity());
        for t in inputs {
            if t.shape().has_zero_dim() {
                return Err(Error::EmptyTensor {
                    op: self.name(),
                    shape: t.shape().clone(),
                });
            }
        }

        match self {
            Op::MatMul => {
                let (a, b) = (&inputs[0], &inputs[1]);
                let (m, k) = a.shape().as_matrix(self.name(), b.shape())?;
                let (k2, n) = b.shape().as_matrix(self.name(), a.shape())?;
                if k != k2 {
                    return Err(Error::ShapeMismatch {
                        op: self.name(),
                        lhs: a.shape().clone(),
                        rhs: b.shape().clone(),
                    });
                }
                let out = kernels::matmul(&a.values(), &b.values(), m, k, n);
                Ok((out, Shape::new(vec![m, n])))
            }

            Op::Add => {
                let (a, b) = (&inputs[0], &inputs[1]);
                let av = a.values();
                let bv = b.values();
                if a.shape() == b.shape() {
                    let out = av.iter().zip(bv.iter()).map(|(x, y)| x + y).collect();
                    return Ok((out, a.shape().clone()));
                }
                let (_, n) = a.shape().as_matrix(self.name(), b.shape())?;
                if b.shape().dims() != [n] {
                    return Err(Error::ShapeMismatch {
                        op: self.name(),
                        lhs: a.shape().clone(),
                        rhs: b.shape().clone(),
                    });
                }
                let out = av
                    .chunks_exact(n)
                    .flat_map(|row| row.iter().zip(bv.iter()).map(|(x, y)| x + y))
                    .collect();
                Ok((out, a.shape().clone()))
            }

            Op::Relu => {
                let x = &inputs[0];
                let out = x.values().iter().map(|&v| v.max(0.0)).collect();
                Ok((out, x.shape().clone()))
            }

            Op::Sum => {
                let total = inputs[0].values().iter().sum();
                Ok((vec![total], Shape::scalar()))
            }

            Op::SoftmaxCrossEntropy { labels } => {
                let logits = &inputs[0];
                let label_shape = Shape::new(vec![labels.len()]);
                let (m, c) = logits.shape().as_matrix(self.name(), &label_shape)?;
                if labels.len() != m {
                    return Err(Error::ShapeMismatch {
                        op: self.name(),
                        lhs: logits.shape().clone(),
                        rhs: label_shape,
                    });
                }
                if let Some(&label) = labels.iter().find(|&&l| l >= c) {
                    return Err(Error::LabelOutOfRange { label, classes: c });
                }

                let values = logits.values();
                let total: f64 = values
                    .chunks_exact(c)
                    .zip(labels)
                    .map(|(row, &label)| kernels::log_sum_exp(row) - row[label])
                    .sum();
                Ok((vec![total / m as f64], Shape::scalar()))
            }
        }
    }

    /// Gradient contributions for each input, given the output's gradient.
    ///
    /// Inputs that do not require gradients get `None`.
    pub(crate) fn backward(&self, inputs: &[Tensor], upstream: &[f64]) -> Vec<Option<Vec<f64>>> {
        let wants = |i: usize| inputs[i].requires_grad();

        match self {
            Op::MatMul => {
                // dA = dOut @ B^T, dB = A^T @ dOut
                let (a, b) = (&inputs[0], &inputs[1]);
                let (m, k) = (a.shape().dim(0), a.shape().dim(1));
                let n = b.shape().dim(1);

                let grad_a = wants(0).then(|| {
                    let b_t = kernels::transpose(&b.values(), k, n);
                    kernels::matmul(upstream, &b_t, m, n, k)
                });
                let grad_b = wants(1).then(|| {
                    let a_t = kernels::transpose(&a.values(), m, k);
                    kernels::matmul(&a_t, upstream, k, m, n)
                });
                vec![grad_a, grad_b]
            }

            Op::Add => {
                let (a, b) = (&inputs[0], &inputs[1]);
                let grad_a = wants(0).then(|| upstream.to_vec());
                let grad_b = wants(1).then(|| {
                    if a.shape() == b.shape() {
                        upstream.to_vec()
                    } else {
                        // bias was broadcast over rows: reduce over the batch axis
                        let (m, n) = (a.shape().dim(0), a.shape().dim(1));
                        kernels::sum_rows(upstream, m, n)
                    }
                });
                vec![grad_a, grad_b]
            }

            Op::Relu => {
                // sub-gradient at exactly 0 is 0
                let grad = wants(0).then(|| {
                    inputs[0]
                        .values()
                        .iter()
                        .zip(upstream)
                        .map(|(&x, &g)| if x > 0.0 { g } else { 0.0 })
                        .collect()
                });
                vec![grad]
            }

            Op::Sum => {
                let grad = wants(0).then(|| vec![upstream[0]; inputs[0].numel()]);
                vec![grad]
            }

            Op::SoftmaxCrossEntropy { labels } => {
                // (softmax(logits) - one_hot(labels)) / batch
                let grad = wants(0).then(|| {
                    let logits = &inputs[0];
                    let (m, c) = (logits.shape().dim(0), logits.shape().dim(1));
                    let mut grad = kernels::softmax_rows(&logits.values(), m, c);
                    for (row, &label) in labels.iter().enumerate() {
                        grad[row * c + label] -= 1.0;
                    }
                    let scale = upstream[0] / m as f64;
                    for g in &mut grad {
                        *g *= scale;
                    }
                    grad
                });
                vec![grad]
            }
        }
    }
}
