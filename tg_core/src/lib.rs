//! # tg_core - Tape-based Reverse-mode Automatic Differentiation
//!
//! This crate provides the numerical engine for training small feed-forward
//! networks: `f64` tensors with gradient accumulators, a closed set of
//! differentiable operations, and a [`Tape`] that records them so one backward
//! traversal yields the exact gradient of a scalar loss.
//!
//! ## Quick Start
//!
//! ```
//! use tg_core::{Tape, Tensor};
//!
//! let tape = Tape::new();
//!
//! // A batch of two inputs with three features, and a [3, 2] weight matrix
//! let x = Tensor::new(vec![1.0, 0.0, -1.0, 0.5, 2.0, 1.0], [2, 3])?;
//! let w = Tensor::param("w", vec![0.1, -0.2, 0.3, 0.4, -0.5, 0.6], [3, 2])?;
//! let b = Tensor::param("b", vec![0.0, 0.0], [2])?;
//!
//! // logits = x @ w + b, loss = mean cross-entropy against the labels
//! let logits = tape.add(&tape.matmul(&x, &w)?, &b)?;
//! let loss = tape.softmax_cross_entropy(&logits, &[0, 1])?;
//!
//! tape.backward(&loss)?;
//! assert_eq!(w.grad().len(), 6);
//!
//! // Bias gradient is the batch sum of (softmax - one_hot) / batch, so its
//! // entries sum to zero.
//! let db = b.grad();
//! assert!((db[0] + db[1]).abs() < 1e-12);
//! # Ok::<(), tg_core::Error>(())
//! ```
//!
//! ## Supported Operations
//!
//! | Operation | Forward | Backward |
//! |-----------|---------|----------|
//! | [`Tape::matmul`] | `A·B` | `dA += dOut·Bᵗ`, `dB += Aᵗ·dOut` |
//! | [`Tape::add`] | `A + b` (same shape or row bias) | `dA += dOut`, `db += Σ_batch dOut` |
//! | [`Tape::relu`] | `max(0, x)` | `dx += dOut ⊙ (x > 0)` |
//! | [`Tape::sum`] | `Σ x` | `dx += dOut` |
//! | [`Tape::softmax_cross_entropy`] | mean NLL of softmax | `(softmax - one_hot) / batch` |
//!
//! ## Architecture
//!
//! - **[`Tensor`]**: reference-counted handle to values plus a gradient accumulator.
//! - **[`Op`]**: closed enum; each variant carries its forward and backward rule.
//! - **[`Tape`]**: ordered [`TapeEntry`] list for one step, walked in reverse by
//!   [`Tape::backward`]. [`Tape::no_grad`] suspends recording for a scope.
//! - **[`check_gradient`]**: finite-difference reference for testing.
//!
//! Gradients accumulate: calling [`Tape::backward`] twice without
//! [`Tensor::zero_grad`] in between doubles every gradient.

mod error;
mod grad_check;
pub mod kernels;
mod op;
mod shape;
mod tape;
mod tensor;

pub use error::{Error, Result};
pub use grad_check::{check_gradient, finite_diff_grad, max_grad_error, GradCheck};
pub use op::Op;
pub use shape::Shape;
pub use tape::{NoGradGuard, Tape, TapeEntry};
pub use tensor::{Tensor, TensorId};
