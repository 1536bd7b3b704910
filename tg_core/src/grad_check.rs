//! Finite-difference gradient checking.
//!
//! Numerical derivatives are slow and approximate, but they do not depend on any
//! backward rule, which makes them the reference the tape is tested against.

use crate::error::Error;
use crate::tape::Tape;
use crate::tensor::Tensor;

/// Compute gradients using central finite differences.
///
/// # Arguments
/// * `f` - Function that takes a slice of variable values and returns a scalar
/// * `point` - The point at which to compute gradients
/// * `eps` - Step size for finite differences (typically 1e-7 to 1e-5)
///
/// # Example
/// ```
/// use tg_core::finite_diff_grad;
///
/// // f(x, y) = x^2 + y^2
/// let f = |v: &[f64]| v[0] * v[0] + v[1] * v[1];
/// let grads = finite_diff_grad(f, &[3.0, 4.0], 1e-7);
///
/// assert!((grads[0] - 6.0).abs() < 1e-5);
/// assert!((grads[1] - 8.0).abs() < 1e-5);
/// ```
pub fn finite_diff_grad<F>(f: F, point: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut grads = Vec::with_capacity(point.len());
    let mut perturbed = point.to_vec();

    for i in 0..point.len() {
        perturbed[i] = point[i] + eps;
        let f_plus = f(&perturbed);

        perturbed[i] = point[i] - eps;
        let f_minus = f(&perturbed);

        perturbed[i] = point[i];

        grads.push((f_plus - f_minus) / (2.0 * eps));
    }

    grads
}

/// Maximum absolute difference between two gradient vectors.
pub fn max_grad_error(grad1: &[f64], grad2: &[f64]) -> f64 {
    assert_eq!(grad1.len(), grad2.len());
    grad1
        .iter()
        .zip(grad2.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

/// Tape gradient of one tensor next to its finite-difference estimate.
#[derive(Debug, Clone)]
pub struct GradCheck {
    pub analytic: Vec<f64>,
    pub numeric: Vec<f64>,
    pub max_error: f64,
}

impl GradCheck {
    pub fn passes(&self, tolerance: f64) -> bool {
        self.max_error < tolerance
    }
}

/// Compare the backward-pass gradient of `loss_fn` w.r.t. `wrt` against
/// central differences.
///
/// `loss_fn` rebuilds the scalar loss on the tape it is given. It runs once with
/// recording on, then twice per element of `wrt` under [`Tape::no_grad`] with that
/// element nudged by `±eps`. Values of `wrt` are restored afterwards, and the
/// accumulator of `wrt` is left as it was. Other differentiable tensors the loss
/// reads still receive the gradient of the recorded run.
///
/// The closure may use any error type that wraps [`Error`], so losses built by
/// higher-level crates can be checked directly.
pub fn check_gradient<F, E>(wrt: &Tensor, eps: f64, loss_fn: F) -> std::result::Result<GradCheck, E>
where
    F: Fn(&Tape) -> std::result::Result<Tensor, E>,
    E: From<Error>,
{
    let saved = wrt.take_grad();
    let tape = Tape::new();
    let analytic = loss_fn(&tape)
        .and_then(|loss| Ok(tape.backward(&loss)?))
        .map(|()| wrt.grad());
    wrt.restore_grad(saved);
    let analytic = analytic?;
    tape.reset();

    let _guard = tape.no_grad();
    let mut numeric = Vec::with_capacity(wrt.numel());
    for i in 0..wrt.numel() {
        let original = wrt.values()[i];

        wrt.values_mut()[i] = original + eps;
        let plus = loss_fn(&tape).and_then(|l| Ok(l.item()?));

        wrt.values_mut()[i] = original - eps;
        let minus = loss_fn(&tape).and_then(|l| Ok(l.item()?));

        wrt.values_mut()[i] = original;
        numeric.push((plus? - minus?) / (2.0 * eps));
    }

    let max_error = max_grad_error(&analytic, &numeric);
    Ok(GradCheck {
        analytic,
        numeric,
        max_error,
    })
}
