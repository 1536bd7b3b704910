//! Neural network layers.

mod linear;
mod stack;

pub use linear::Linear;
pub use stack::{build_layer_stack, LayerStack};
