//! In-memory datasets and mini-batch iteration.
//!
//! The training driver only sees the [`BatchSource`] trait: anything that can
//! hand out a finite, restartable sequence of [`Batch`]es can be trained on.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tg_core::Tensor;

use crate::error::{Error, Result};

/// One mini-batch: inputs of shape [batch, features] and a label per row.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: Tensor,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn new(inputs: Tensor, labels: Vec<usize>) -> Result<Self> {
        if inputs.shape().ndim() != 2 || inputs.shape().dim(0) != labels.len() {
            return Err(Error::Dataset(format!(
                "inputs of shape {} do not match {} labels",
                inputs.shape(),
                labels.len()
            )));
        }
        Ok(Batch { inputs, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Produces the mini-batches of one epoch.
///
/// Each call to [`BatchSource::batches`] starts the sequence over.
pub trait BatchSource {
    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>> + '_>;
}

/// A fixed list of batches, replayed in order every epoch.
impl BatchSource for Vec<Batch> {
    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        Box::new(self.iter().cloned().map(Ok::<Batch, Error>))
    }
}

/// Row-major feature matrix with one class label per row.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Vec<f64>,
    num_features: usize,
    labels: Vec<usize>,
    num_classes: usize,
}

impl Dataset {
    pub fn new(
        features: Vec<f64>,
        num_features: usize,
        labels: Vec<usize>,
        num_classes: usize,
    ) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::Dataset("dataset has no examples".to_string()));
        }
        if num_features == 0 {
            return Err(Error::Dataset("examples have no features".to_string()));
        }
        if features.len() != labels.len() * num_features {
            return Err(Error::Dataset(format!(
                "{} feature values for {} examples of {} features",
                features.len(),
                labels.len(),
                num_features
            )));
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= num_classes) {
            return Err(Error::Dataset(format!(
                "label {label} out of range for {num_classes} classes"
            )));
        }
        Ok(Dataset {
            features,
            num_features,
            labels,
            num_classes,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let start = index * self.num_features;
        &self.features[start..start + self.num_features]
    }

    /// Gather the given rows into a batch.
    pub fn batch(&self, indices: &[usize]) -> Result<Batch> {
        let mut inputs = Vec::with_capacity(indices.len() * self.num_features);
        let mut labels = Vec::with_capacity(indices.len());
        for &i in indices {
            if i >= self.len() {
                return Err(Error::Dataset(format!(
                    "row {i} out of range for {} examples",
                    self.len()
                )));
            }
            inputs.extend_from_slice(self.row(i));
            labels.push(self.labels[i]);
        }
        let inputs = Tensor::new(inputs, [indices.len(), self.num_features])?;
        Ok(Batch { inputs, labels })
    }

    /// The whole dataset as a single batch.
    pub fn full_batch(&self) -> Result<Batch> {
        let indices: Vec<usize> = (0..self.len()).collect();
        self.batch(&indices)
    }

    /// Split off the last `fraction` of rows, e.g. for a held-out test set.
    ///
    /// `fraction` must lie strictly between 0 and 1, and both halves must end
    /// up non-empty.
    pub fn split(&self, fraction: f64) -> Result<(Dataset, Dataset)> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(Error::Dataset(format!(
                "split fraction {fraction} not in (0, 1)"
            )));
        }
        let held_out = (self.len() as f64 * fraction).round() as usize;
        let cut = self.len() - held_out;
        let at = cut * self.num_features;
        let first = Dataset::new(
            self.features[..at].to_vec(),
            self.num_features,
            self.labels[..cut].to_vec(),
            self.num_classes,
        )?;
        let second = Dataset::new(
            self.features[at..].to_vec(),
            self.num_features,
            self.labels[cut..].to_vec(),
            self.num_classes,
        )?;
        Ok((first, second))
    }
}

/// Mini-batch iterator over a [`Dataset`].
pub struct DataLoader {
    dataset: Dataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    indices: Vec<usize>,
    rng: StdRng,
}

impl DataLoader {
    /// In-order loader keeping the trailing partial batch.
    pub fn new(dataset: Dataset, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Dataset("batch size must be positive".to_string()));
        }
        Ok(DataLoader {
            indices: (0..dataset.len()).collect(),
            dataset,
            batch_size,
            shuffle: false,
            drop_last: false,
            rng: StdRng::seed_from_u64(0),
        })
    }

    /// Reshuffle the row order at the start of every epoch.
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Skip the trailing batch when it is smaller than `batch_size`.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches one epoch yields.
    pub fn num_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }
}

impl BatchSource for DataLoader {
    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        if self.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
        let batch_size = self.batch_size;
        let drop_last = self.drop_last;
        let dataset = &self.dataset;
        Box::new(
            self.indices
                .chunks(batch_size)
                .filter(move |chunk| !drop_last || chunk.len() == batch_size)
                .map(move |chunk| dataset.batch(chunk)),
        )
    }
}
