//! Tensor handles with gradient accumulators.
//!
//! A [`Tensor`] is a reference-counted handle: cloning it is O(1) and every clone
//! sees the same values and the same gradient accumulator. The tape keeps clones
//! of the tensors an operation read and wrote, so nothing is copied while
//! recording.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::shape::Shape;

/// Global counter for unique tensor IDs.
static TENSOR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_tensor_id() -> u64 {
    TENSOR_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Unique identifier of a tensor, stable for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub(crate) u64);

struct TensorNode {
    id: TensorId,
    name: Option<String>,
    shape: Shape,
    requires_grad: bool,
    /// False for operation outputs.
    leaf: bool,
    values: RefCell<Vec<f64>>,
    /// Allocated on first accumulation; `None` reads as zeros.
    grad: RefCell<Option<Vec<f64>>>,
}

/// An N-dimensional array of `f64` values.
#[derive(Clone)]
pub struct Tensor(Rc<TensorNode>);

impl Tensor {
    fn build(
        values: Vec<f64>,
        shape: Shape,
        requires_grad: bool,
        leaf: bool,
        name: Option<String>,
    ) -> Result<Self> {
        if values.len() != shape.numel() {
            return Err(Error::DataLength {
                len: values.len(),
                shape,
            });
        }
        Ok(Tensor(Rc::new(TensorNode {
            id: TensorId(next_tensor_id()),
            name,
            shape,
            requires_grad,
            leaf,
            values: RefCell::new(values),
            grad: RefCell::new(None),
        })))
    }

    // === Constructors ===

    /// Create a constant tensor (never receives gradients).
    pub fn new(values: Vec<f64>, shape: impl Into<Shape>) -> Result<Self> {
        Self::build(values, shape.into(), false, true, None)
    }

    /// Create a differentiable leaf tensor.
    pub fn with_grad(values: Vec<f64>, shape: impl Into<Shape>) -> Result<Self> {
        Self::build(values, shape.into(), true, true, None)
    }

    /// Create a named differentiable leaf, as layers do for their weights.
    pub fn param(name: &str, values: Vec<f64>, shape: impl Into<Shape>) -> Result<Self> {
        Self::build(values, shape.into(), true, true, Some(name.to_string()))
    }

    /// Create a constant scalar.
    pub fn scalar(value: f64) -> Self {
        Tensor(Rc::new(TensorNode {
            id: TensorId(next_tensor_id()),
            name: None,
            shape: Shape::scalar(),
            requires_grad: false,
            leaf: true,
            values: RefCell::new(vec![value]),
            grad: RefCell::new(None),
        }))
    }

    /// Create a constant tensor of zeros.
    pub fn zeros(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let values = vec![0.0; shape.numel()];
        Tensor(Rc::new(TensorNode {
            id: TensorId(next_tensor_id()),
            name: None,
            shape,
            requires_grad: false,
            leaf: true,
            values: RefCell::new(values),
            grad: RefCell::new(None),
        }))
    }

    /// Output of a recorded or unrecorded operation.
    pub(crate) fn from_op(values: Vec<f64>, shape: Shape, requires_grad: bool) -> Result<Self> {
        Self::build(values, shape, requires_grad, false, None)
    }

    // === Accessors ===

    pub fn id(&self) -> TensorId {
        self.0.id
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn shape(&self) -> &Shape {
        &self.0.shape
    }

    pub fn numel(&self) -> usize {
        self.0.shape.numel()
    }

    pub fn requires_grad(&self) -> bool {
        self.0.requires_grad
    }

    /// True unless this tensor was produced by a [`Tape`](crate::Tape) operation.
    pub fn is_leaf(&self) -> bool {
        self.0.leaf
    }

    /// Borrow the values.
    pub fn values(&self) -> Ref<'_, [f64]> {
        Ref::map(self.0.values.borrow(), |v| v.as_slice())
    }

    /// Mutably borrow the values for an in-place parameter update.
    ///
    /// The length is fixed; only the numbers can change.
    pub fn values_mut(&self) -> RefMut<'_, [f64]> {
        RefMut::map(self.0.values.borrow_mut(), |v| v.as_mut_slice())
    }

    /// Copy the values out.
    pub fn to_vec(&self) -> Vec<f64> {
        self.0.values.borrow().clone()
    }

    /// The single value of a scalar tensor.
    pub fn item(&self) -> Result<f64> {
        if !self.shape().is_scalar() {
            return Err(Error::NotScalar {
                shape: self.shape().clone(),
            });
        }
        Ok(self.0.values.borrow()[0])
    }

    // === Gradient accumulator ===

    /// The accumulated gradient, same length as the values.
    ///
    /// Reading before any backward pass has touched this tensor returns zeros;
    /// use [`Tensor::has_grad`] to tell the two apart.
    pub fn grad(&self) -> Vec<f64> {
        match self.0.grad.borrow().as_ref() {
            Some(g) => g.clone(),
            None => vec![0.0; self.numel()],
        }
    }

    /// Whether a backward pass has ever written into this accumulator.
    pub fn has_grad(&self) -> bool {
        self.0.grad.borrow().is_some()
    }

    /// Add `delta` into the accumulator.
    pub(crate) fn accumulate_grad(&self, delta: &[f64]) {
        debug_assert_eq!(delta.len(), self.numel());
        let mut grad = self.0.grad.borrow_mut();
        match grad.as_mut() {
            Some(existing) => {
                for (g, d) in existing.iter_mut().zip(delta) {
                    *g += d;
                }
            }
            None => *grad = Some(delta.to_vec()),
        }
    }

    /// Detach the accumulator, leaving it unpopulated.
    pub(crate) fn take_grad(&self) -> Option<Vec<f64>> {
        self.0.grad.borrow_mut().take()
    }

    /// Put back an accumulator detached with [`Tensor::take_grad`].
    pub(crate) fn restore_grad(&self, grad: Option<Vec<f64>>) {
        *self.0.grad.borrow_mut() = grad;
    }

    /// Reset the accumulator to zero, keeping its allocation.
    pub fn zero_grad(&self) {
        if let Some(g) = self.0.grad.borrow_mut().as_mut() {
            g.fill(0.0);
        }
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("shape", &self.0.shape)
            .field("requires_grad", &self.0.requires_grad)
            .finish()
    }
}
