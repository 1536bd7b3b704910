//! Optimizers for neural network training.

mod sgd;

pub use sgd::Sgd;

/// Updates a fixed set of parameter tensors from their accumulated gradients.
pub trait Optimizer {
    /// Apply one update to every registered parameter.
    fn step(&mut self);

    /// Reset every registered gradient accumulator to zero.
    fn zero_grad(&mut self);

    fn lr(&self) -> f64;

    fn set_lr(&mut self, lr: f64);
}
