//! Loss functions and classification metrics.

use tg_core::{kernels, Shape, Tape, Tensor};

use crate::error::Result;

/// Cross-Entropy loss for classification (with log-softmax).
///
/// Assumes:
/// - `logits` has shape [batch, num_classes]
/// - `targets` are class indices (0 to num_classes-1), one per row
///
/// Returns the mean negative log probability of the correct class as a
/// recorded scalar.
pub fn cross_entropy_loss(tape: &Tape, logits: &Tensor, targets: &[usize]) -> Result<Tensor> {
    Ok(tape.softmax_cross_entropy(logits, targets)?)
}

/// `(rows, classes)` of a logits matrix with at least one class.
fn matrix_dims(op: &'static str, logits: &Tensor) -> tg_core::Result<(usize, usize)> {
    match *logits.shape().dims() {
        [rows, classes] if classes > 0 => Ok((rows, classes)),
        [_, _] => Err(tg_core::Error::EmptyTensor {
            op,
            shape: logits.shape().clone(),
        }),
        _ => Err(tg_core::Error::NotMatrix {
            op,
            shape: logits.shape().clone(),
        }),
    }
}

/// Row-wise softmax of a [batch, classes] tensor, outside the tape.
pub fn softmax(logits: &Tensor) -> Result<Vec<f64>> {
    let (rows, cols) = matrix_dims("softmax", logits)?;
    let probs = kernels::softmax_rows(&logits.values(), rows, cols);
    Ok(probs)
}

/// Fraction of rows whose argmax equals the label.
///
/// Needs one label per row. An empty batch has accuracy 0.
pub fn accuracy(logits: &Tensor, targets: &[usize]) -> Result<f64> {
    let (rows, cols) = matrix_dims("accuracy", logits)?;
    if targets.len() != rows {
        return Err(tg_core::Error::ShapeMismatch {
            op: "accuracy",
            lhs: logits.shape().clone(),
            rhs: Shape::new(vec![targets.len()]),
        }
        .into());
    }
    if rows == 0 {
        return Ok(0.0);
    }
    let predicted = kernels::argmax_rows(&logits.values(), rows, cols);
    let correct = predicted
        .iter()
        .zip(targets)
        .filter(|(p, t)| p == t)
        .count();
    Ok(correct as f64 / rows as f64)
}
