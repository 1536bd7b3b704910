//! The operation tape and reverse-mode traversal.
//!
//! Every operation executed through a [`Tape`] while it is recording, and with
//! at least one differentiable input, appends a [`TapeEntry`]. The entries are in
//! execution order, so walking them backwards visits every tensor only after all
//! of its consumers.

use std::cell::{Cell, Ref, RefCell};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::op::Op;
use crate::tensor::{Tensor, TensorId};

/// One executed operation.
#[derive(Debug)]
pub struct TapeEntry {
    pub op: Op,
    pub inputs: Vec<Tensor>,
    pub output: Tensor,
}

/// Step-scoped record of executed operations.
#[derive(Debug)]
pub struct Tape {
    entries: RefCell<Vec<TapeEntry>>,
    recording: Cell<bool>,
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

impl Tape {
    /// Create an empty tape that records.
    pub fn new() -> Self {
        Tape {
            entries: RefCell::new(Vec::new()),
            recording: Cell::new(true),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Borrow the recorded entries.
    pub fn entries(&self) -> Ref<'_, [TapeEntry]> {
        Ref::map(self.entries.borrow(), |e| e.as_slice())
    }

    /// Names of the recorded operations, in execution order.
    pub fn op_names(&self) -> Vec<&'static str> {
        self.entries.borrow().iter().map(|e| e.op.name()).collect()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.get()
    }

    /// Suspend recording until the returned guard is dropped.
    ///
    /// The previous state comes back on every exit path, so guards nest.
    pub fn no_grad(&self) -> NoGradGuard<'_> {
        let prev = self.recording.replace(false);
        NoGradGuard { tape: self, prev }
    }

    /// Discard all entries.
    pub fn reset(&self) {
        let mut entries = self.entries.borrow_mut();
        trace!(entries = entries.len(), "tape reset");
        entries.clear();
    }

    // === Operations ===

    /// Matrix product of `[m, k]` and `[k, n]`.
    pub fn matmul(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        self.apply(Op::MatMul, vec![a.clone(), b.clone()])
    }

    /// Element-wise add, or add a `[n]` bias to every row of a `[m, n]` matrix.
    pub fn add(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        self.apply(Op::Add, vec![a.clone(), b.clone()])
    }

    pub fn relu(&self, x: &Tensor) -> Result<Tensor> {
        self.apply(Op::Relu, vec![x.clone()])
    }

    /// Sum all elements into a scalar.
    pub fn sum(&self, x: &Tensor) -> Result<Tensor> {
        self.apply(Op::Sum, vec![x.clone()])
    }

    /// Mean cross-entropy of `softmax(logits)` against class indices.
    ///
    /// `logits` is `[batch, classes]` and `labels` has one entry per row. The
    /// softmax is never materialised in the forward pass: each row's loss is
    /// `logsumexp(row) - row[label]`.
    pub fn softmax_cross_entropy(&self, logits: &Tensor, labels: &[usize]) -> Result<Tensor> {
        self.apply(
            Op::SoftmaxCrossEntropy {
                labels: labels.to_vec(),
            },
            vec![logits.clone()],
        )
    }

    fn apply(&self, op: Op, inputs: Vec<Tensor>) -> Result<Tensor> {
        let (values, shape) = op.forward(&inputs)?;
        let tracked = self.is_recording() && inputs.iter().any(Tensor::requires_grad);
        let output = Tensor::from_op(values, shape, tracked)?;

        if tracked {
            trace!(op = op.name(), output = ?output.id(), "record");
            self.entries.borrow_mut().push(TapeEntry {
                op,
                inputs,
                output: output.clone(),
            });
        }
        Ok(output)
    }

    // === Backward ===

    /// Accumulate `d loss / d t` into every differentiable tensor `t` that
    /// `loss` depends on through this tape.
    ///
    /// The tape is left intact, so a second call adds the same gradients again.
    /// A tracked loss that this tape did not record is rejected with
    /// [`Error::DetachedLoss`], leaving every accumulator untouched.
    pub fn backward(&self, loss: &Tensor) -> Result<()> {
        if !loss.shape().is_scalar() {
            return Err(Error::NotScalar {
                shape: loss.shape().clone(),
            });
        }
        if !loss.requires_grad() {
            debug!("backward on a loss without gradient tracking, nothing to do");
            return Ok(());
        }

        let entries = self.entries.borrow();

        // Gradients of this pass only; committed to the accumulators as each
        // tensor's total becomes final.
        let mut pending: HashMap<TensorId, (Tensor, Vec<f64>)> = HashMap::new();
        pending.insert(loss.id(), (loss.clone(), vec![1.0]));

        let mut visited = 0usize;
        for entry in entries.iter().rev() {
            let Some((output, upstream)) = pending.remove(&entry.output.id()) else {
                continue;
            };
            visited += 1;
            output.accumulate_grad(&upstream);

            let contributions = entry.op.backward(&entry.inputs, &upstream);
            for (input, grad) in entry.inputs.iter().zip(contributions) {
                let Some(grad) = grad else {
                    continue;
                };
                match pending.entry(input.id()) {
                    Entry::Occupied(mut slot) => {
                        for (e, g) in slot.get_mut().1.iter_mut().zip(&grad) {
                            *e += g;
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert((input.clone(), grad));
                    }
                }
            }
        }

        // A derived loss with no entry here was recorded on another tape or
        // before a reset.
        if visited == 0 && !loss.is_leaf() {
            return Err(Error::DetachedLoss);
        }

        // Whatever is left was not produced by a recorded entry: leaves.
        let leaves = pending.len();
        for (_, (tensor, grad)) in pending {
            tensor.accumulate_grad(&grad);
        }

        debug!(entries = entries.len(), visited, leaves, "backward pass complete");
        Ok(())
    }
}

/// Restores the tape's previous recording state when dropped.
#[must_use = "recording resumes as soon as the guard is dropped"]
pub struct NoGradGuard<'a> {
    tape: &'a Tape,
    prev: bool,
}

impl Drop for NoGradGuard<'_> {
    fn drop(&mut self) {
        self.tape.recording.set(self.prev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn param(values: Vec<f64>, shape: &[usize]) -> Tensor {
        Tensor::with_grad(values, shape).unwrap()
    }

    #[test]
    fn test_records_only_tracked_ops() {
        let tape = Tape::new();
        let x = Tensor::new(vec![1.0, -1.0], [1, 2]).unwrap();
        let w = param(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]);

        let c = tape.relu(&x).unwrap();
        assert!(!c.requires_grad());
        assert!(tape.is_empty());

        let h = tape.matmul(&x, &w).unwrap();
        assert!(h.requires_grad());
        assert_eq!(tape.op_names(), vec!["matmul"]);
    }

    #[test]
    fn test_backward_matmul_sum() {
        // L = sum(A @ B); dA = 1 @ B^T, dB = A^T @ 1
        let tape = Tape::new();
        let a = param(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let b = param(vec![5.0, 6.0, 7.0, 8.0], &[2, 2]);
        let loss = tape.sum(&tape.matmul(&a, &b).unwrap()).unwrap();
        tape.backward(&loss).unwrap();

        assert_eq!(a.grad(), vec![11.0, 15.0, 11.0, 15.0]);
        assert_eq!(b.grad(), vec![4.0, 4.0, 6.0, 6.0]);
        assert_eq!(loss.grad(), vec![1.0]);
    }

    #[test]
    fn test_reused_tensor_sums_paths() {
        // L = sum(x + x) -> dL/dx = 2
        let tape = Tape::new();
        let x = param(vec![1.0, 2.0, 3.0], &[3]);
        let loss = tape.sum(&tape.add(&x, &x).unwrap()).unwrap();
        tape.backward(&loss).unwrap();
        assert_eq!(x.grad(), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_diamond_graph() {
        // h = relu(x); L = sum(h + x)
        let tape = Tape::new();
        let x = param(vec![-1.0, 2.0], &[2]);
        let h = tape.relu(&x).unwrap();
        let loss = tape.sum(&tape.add(&h, &x).unwrap()).unwrap();
        tape.backward(&loss).unwrap();
        assert_eq!(x.grad(), vec![1.0, 2.0]);
        assert_eq!(h.grad(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_backward_requires_scalar() {
        let tape = Tape::new();
        let x = param(vec![1.0, 2.0], &[1, 2]);
        let y = tape.relu(&x).unwrap();
        let err = tape.backward(&y).unwrap_err();
        assert!(matches!(err, Error::NotScalar { .. }));
        assert!(err.is_shape_error());
        assert!(!x.has_grad());
    }

    #[test]
    fn test_failed_op_leaves_tape_untouched() {
        let tape = Tape::new();
        let a = param(vec![0.5; 12], &[3, 4]);
        let b = param(vec![0.5; 30], &[5, 6]);
        let h = tape.relu(&a).unwrap();
        assert_eq!(tape.len(), 1);

        assert!(tape.matmul(&a, &b).unwrap_err().is_shape_error());
        assert_eq!(tape.op_names(), vec!["relu"]);

        let loss = tape.sum(&h).unwrap();
        tape.backward(&loss).unwrap();
        assert_eq!(a.grad(), vec![1.0; 12]);
    }

    #[test]
    fn test_no_grad_guard_restores_state() {
        let tape = Tape::new();
        let x = param(vec![1.0, 2.0], &[2]);
        {
            let _guard = tape.no_grad();
            assert!(!tape.is_recording());
            {
                let _inner = tape.no_grad();
                let y = tape.relu(&x).unwrap();
                assert!(!y.requires_grad());
            }
            assert!(!tape.is_recording());
        }
        assert!(tape.is_recording());
        assert!(tape.is_empty());
    }

    #[test]
    fn test_no_grad_guard_restores_on_early_return() {
        fn failing(tape: &Tape) -> Result<Tensor> {
            let _guard = tape.no_grad();
            let x = Tensor::new(vec![], [0]).unwrap();
            tape.relu(&x)
        }

        let tape = Tape::new();
        assert!(failing(&tape).is_err());
        assert!(tape.is_recording());
    }

    #[test]
    fn test_reset_keeps_accumulators() {
        let tape = Tape::new();
        let x = param(vec![3.0], &[1]);
        let loss = tape.sum(&x).unwrap();
        tape.backward(&loss).unwrap();
        tape.reset();
        assert!(tape.is_empty());
        assert_eq!(x.grad(), vec![1.0]);
    }

    #[test]
    fn test_backward_after_reset_is_rejected() {
        let tape = Tape::new();
        let x = param(vec![3.0, 4.0], &[2]);
        let loss = tape.sum(&x).unwrap();
        assert!(!loss.is_leaf());
        tape.reset();

        assert_eq!(tape.backward(&loss).unwrap_err(), Error::DetachedLoss);
        assert!(!x.has_grad());
        assert!(!loss.has_grad());
    }

    #[test]
    fn test_backward_with_foreign_tape_is_rejected() {
        let recorder = Tape::new();
        let other = Tape::new();
        let x = param(vec![1.0, 2.0], &[2]);
        let loss = recorder.sum(&recorder.relu(&x).unwrap()).unwrap();

        assert!(matches!(other.backward(&loss), Err(Error::DetachedLoss)));
        assert!(!x.has_grad());

        recorder.backward(&loss).unwrap();
        assert_eq!(x.grad(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_backward_on_leaf_scalar() {
        let tape = Tape::new();
        let s = Tensor::with_grad(vec![4.0], Vec::<usize>::new()).unwrap();
        tape.backward(&s).unwrap();
        assert_eq!(s.grad(), vec![1.0]);
    }

    #[test]
    fn test_untracked_loss_is_noop() {
        let tape = Tape::new();
        let loss = Tensor::scalar(1.0);
        tape.backward(&loss).unwrap();
        assert!(!loss.has_grad());
    }

    #[test]
    fn test_cross_entropy_backward_closed_form() {
        let tape = Tape::new();
        let logits = param(vec![1.0, 2.0, 0.5, -1.0, 0.0, 3.0], &[2, 3]);
        let loss = tape.softmax_cross_entropy(&logits, &[1, 2]).unwrap();
        tape.backward(&loss).unwrap();

        let grad = logits.grad();
        let values = logits.to_vec();
        for (row, &label) in [1usize, 2].iter().enumerate() {
            let r = &values[row * 3..row * 3 + 3];
            let denom: f64 = r.iter().map(|v| v.exp()).sum();
            for j in 0..3 {
                let p = r[j].exp() / denom;
                let target = if j == label { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(grad[row * 3 + j], (p - target) / 2.0, epsilon = 1e-12);
            }
        }
    }
}
