//! Stochastic Gradient Descent optimizer.

use tg_core::Tensor;

use super::Optimizer;

/// SGD optimizer with optional momentum.
///
/// Parameters are registered once at construction; [`Optimizer::step`] updates
/// their values in place, so every handle held by the layers sees the change.
pub struct Sgd {
    params: Vec<Tensor>,
    /// Learning rate.
    lr: f64,
    /// Momentum coefficient; 0 means plain SGD.
    momentum: f64,
    /// Velocity buffers for momentum, one per parameter.
    velocities: Vec<Vec<f64>>,
}

impl Sgd {
    /// Create a plain SGD optimizer over `params`.
    pub fn new(params: Vec<Tensor>, lr: f64) -> Self {
        Self::with_momentum(params, lr, 0.0)
    }

    /// Create an SGD optimizer with momentum.
    pub fn with_momentum(params: Vec<Tensor>, lr: f64, momentum: f64) -> Self {
        let velocities = params.iter().map(|p| vec![0.0; p.numel()]).collect();
        Sgd {
            params,
            lr,
            momentum,
            velocities,
        }
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    pub fn params(&self) -> &[Tensor] {
        &self.params
    }
}

impl Optimizer for Sgd {
    fn step(&mut self) {
        for (param, velocity) in self.params.iter().zip(self.velocities.iter_mut()) {
            let grad = param.grad();
            let mut values = param.values_mut();

            if self.momentum > 0.0 {
                // v = momentum * v + grad; param = param - lr * v
                for ((p, v), g) in values.iter_mut().zip(velocity.iter_mut()).zip(&grad) {
                    *v = self.momentum * *v + g;
                    *p -= self.lr * *v;
                }
            } else {
                for (p, g) in values.iter_mut().zip(&grad) {
                    *p -= self.lr * g;
                }
            }
        }
    }

    fn zero_grad(&mut self) {
        for param in &self.params {
            param.zero_grad();
        }
    }

    fn lr(&self) -> f64 {
        self.lr
    }

    fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tg_core::Tape;

    /// Give the row vector `w` ([1, n]) the gradient `g`: d/dw sum(w @ gᵗ) = g.
    fn set_grad(w: &Tensor, g: &[f64]) {
        let tape = Tape::new();
        let column = Tensor::new(g.to_vec(), [g.len(), 1]).unwrap();
        let loss = tape.sum(&tape.matmul(w, &column).unwrap()).unwrap();
        tape.backward(&loss).unwrap();
    }

    #[test]
    fn test_sgd_step() {
        let w = Tensor::param("w", vec![1.0, 2.0, 3.0], [1, 3]).unwrap();
        set_grad(&w, &[0.1, 0.2, 0.3]);
        assert_eq!(w.grad(), vec![0.1, 0.2, 0.3]);

        let mut opt = Sgd::new(vec![w.clone()], 0.1);
        opt.step();

        // param = param - 0.1 * grad
        let expected = [1.0 - 0.1 * 0.1, 2.0 - 0.1 * 0.2, 3.0 - 0.1 * 0.3];
        assert_eq!(w.to_vec(), expected.to_vec());
    }

    #[test]
    fn test_sgd_with_momentum() {
        let w = Tensor::param("w", vec![1.0], [1, 1]).unwrap();
        set_grad(&w, &[1.0]);

        let mut opt = Sgd::with_momentum(vec![w.clone()], 0.1, 0.9);

        // v = 0.9 * 0 + 1 = 1, param = 1 - 0.1 * 1 = 0.9
        opt.step();
        assert_abs_diff_eq!(w.to_vec()[0], 0.9, epsilon = 1e-12);

        // same gradient again: v = 0.9 * 1 + 1 = 1.9, param = 0.9 - 0.19
        opt.step();
        assert_abs_diff_eq!(w.to_vec()[0], 0.71, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_grad_clears_registered_params() {
        let w = Tensor::param("w", vec![1.0, 1.0], [1, 2]).unwrap();
        set_grad(&w, &[3.0, 4.0]);
        let mut opt = Sgd::new(vec![w.clone()], 0.5);
        opt.zero_grad();
        assert_eq!(w.grad(), vec![0.0, 0.0]);

        // stepping on a zero gradient leaves values unchanged
        opt.step();
        assert_eq!(w.to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_set_lr() {
        let mut opt = Sgd::new(vec![], 0.1);
        opt.set_lr(0.01);
        assert_eq!(opt.lr(), 0.01);
        assert_eq!(opt.momentum(), 0.0);
    }
}
