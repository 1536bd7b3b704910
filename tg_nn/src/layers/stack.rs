//! Feed-forward stack of linear layers with ReLU between them.

use rand::Rng;
use tg_core::{kernels, Tape, Tensor};

use super::Linear;
use crate::error::{Error, Result};

/// An ordered sequence of [`Linear`] layers.
///
/// Every layer except the last is followed by ReLU; the last one produces raw
/// logits, ready for [`Tape::softmax_cross_entropy`].
#[derive(Debug, Clone)]
pub struct LayerStack {
    layers: Vec<Linear>,
}

/// Build a stack from layer widths: `[64, 32, 10]` gives 64 -> 32 -> 10.
///
/// Needs at least two sizes and all of them non-zero.
pub fn build_layer_stack<R: Rng + ?Sized>(sizes: &[usize], rng: &mut R) -> Result<LayerStack> {
    if sizes.len() < 2 {
        return Err(Error::InvalidLayerSizes {
            sizes: sizes.to_vec(),
            reason: "need an input and an output size".to_string(),
        });
    }
    if let Some(pos) = sizes.iter().position(|&s| s == 0) {
        return Err(Error::InvalidLayerSizes {
            sizes: sizes.to_vec(),
            reason: format!("size at position {pos} is zero"),
        });
    }

    let layers = sizes
        .windows(2)
        .map(|w| Linear::new(w[0], w[1], rng))
        .collect::<Result<Vec<_>>>()?;
    Ok(LayerStack { layers })
}

impl LayerStack {
    /// Wrap already-built layers, checking that adjacent widths agree.
    pub fn from_layers(layers: Vec<Linear>) -> Result<Self> {
        let sizes: Vec<usize> = layers
            .first()
            .map(|l| l.in_features())
            .into_iter()
            .chain(layers.iter().map(Linear::out_features))
            .collect();
        if layers.is_empty() {
            return Err(Error::InvalidLayerSizes {
                sizes,
                reason: "no layers".to_string(),
            });
        }
        for pair in layers.windows(2) {
            if pair[0].out_features() != pair[1].in_features() {
                return Err(Error::InvalidLayerSizes {
                    sizes,
                    reason: format!(
                        "layer of width {} feeds a layer expecting {}",
                        pair[0].out_features(),
                        pair[1].in_features()
                    ),
                });
            }
        }
        Ok(LayerStack { layers })
    }

    /// Forward pass producing logits of shape [batch, last size].
    pub fn forward(&self, tape: &Tape, input: &Tensor) -> Result<Tensor> {
        let last = self.layers.len() - 1;
        let mut x = input.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(tape, &x)?;
            if i < last {
                x = tape.relu(&x)?;
            }
        }
        Ok(x)
    }

    /// Predicted class per row, computed without recording.
    pub fn predict(&self, tape: &Tape, input: &Tensor) -> Result<Vec<usize>> {
        let _guard = tape.no_grad();
        let logits = self.forward(tape, input)?;
        let (rows, cols) = (logits.shape().dim(0), logits.shape().dim(1));
        let predicted = kernels::argmax_rows(&logits.values(), rows, cols);
        Ok(predicted)
    }

    pub fn layers(&self) -> &[Linear] {
        &self.layers
    }

    /// Parameter handles in layer order, weight before bias.
    pub fn parameters(&self) -> Vec<Tensor> {
        self.layers.iter().flat_map(Linear::parameters).collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters().iter().map(Tensor::numel).sum()
    }

    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![self.layers[0].in_features()];
        sizes.extend(self.layers.iter().map(Linear::out_features));
        sizes
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].in_features()
    }

    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].out_features()
    }
}
