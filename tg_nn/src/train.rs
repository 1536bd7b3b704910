//! Mini-batch training driver.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tg_core::{Tape, Tensor};
use tracing::{debug, info};

use crate::config::TrainConfig;
use crate::data::{Batch, BatchSource};
use crate::error::{Error, Result};
use crate::layers::{build_layer_stack, LayerStack};
use crate::loss::{accuracy, cross_entropy_loss};
use crate::optim::{Optimizer, Sgd};

/// Running-loss snapshot handed to a [`ProgressSink`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// 1-based epoch index.
    pub epoch: usize,
    pub total_epochs: usize,
    /// Optimizer steps taken so far, across epochs.
    pub step: usize,
    /// Mean loss over the steps since the previous report.
    pub running_loss: f64,
}

/// Receives progress reports; has no influence on training.
pub trait ProgressSink {
    fn report(&mut self, progress: &Progress);
}

impl<F: FnMut(&Progress)> ProgressSink for F {
    fn report(&mut self, progress: &Progress) {
        self(progress)
    }
}

/// Forwards progress to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, progress: &Progress) {
        info!(
            epoch = progress.epoch,
            total_epochs = progress.total_epochs,
            step = progress.step,
            loss = format_args!("{:.4}", progress.running_loss),
            "training"
        );
    }
}

/// Outcome of [`Trainer::fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    /// Mean loss of each epoch, in order.
    pub epoch_losses: Vec<f64>,
    /// Optimizer steps taken during this call.
    pub steps: usize,
}

impl TrainReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.epoch_losses.last().copied()
    }
}

/// Loss and accuracy over a dataset, computed without recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
    pub examples: usize,
}

/// Owns a model, its optimizer and the tape a training step records on.
pub struct Trainer {
    config: TrainConfig,
    model: LayerStack,
    optimizer: Sgd,
    tape: Tape,
    steps: usize,
}

impl Trainer {
    /// Validate `config` and build a freshly initialized model from it.
    pub fn new(config: TrainConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let model = build_layer_stack(&config.layer_sizes, &mut rng)?;
        Self::with_model(config, model)
    }

    /// Train an existing model.
    ///
    /// `config` is validated and its `layer_sizes` must describe `model`.
    pub fn with_model(config: TrainConfig, model: LayerStack) -> Result<Self> {
        config.validate()?;
        if config.layer_sizes != model.layer_sizes() {
            return Err(Error::Config(format!(
                "layer_sizes {:?} do not match the model's {:?}",
                config.layer_sizes,
                model.layer_sizes()
            )));
        }
        let optimizer =
            Sgd::with_momentum(model.parameters(), config.learning_rate, config.momentum);
        debug!(
            sizes = ?model.layer_sizes(),
            parameters = model.num_parameters(),
            "built trainer"
        );
        Ok(Trainer {
            config,
            model,
            optimizer,
            tape: Tape::new(),
            steps: 0,
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn model(&self) -> &LayerStack {
        &self.model
    }

    pub fn optimizer(&self) -> &Sgd {
        &self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut Sgd {
        &mut self.optimizer
    }

    /// Total optimizer steps taken by this trainer.
    pub fn steps(&self) -> usize {
        self.steps
    }

    fn loss(&self, batch: &Batch) -> Result<Tensor> {
        let logits = self.model.forward(&self.tape, &batch.inputs)?;
        cross_entropy_loss(&self.tape, &logits, &batch.labels)
    }

    /// One optimization step; returns the batch loss before the update.
    ///
    /// The tape is reset afterwards whether or not the step succeeded.
    pub fn train_step(&mut self, batch: &Batch) -> Result<f64> {
        self.optimizer.zero_grad();
        let result = self.loss(batch).and_then(|loss| {
            self.tape.backward(&loss)?;
            Ok(loss.item()?)
        });
        if result.is_ok() {
            self.optimizer.step();
            self.steps += 1;
        }
        self.tape.reset();
        result
    }

    /// Run `config.epochs` epochs over `source`, reporting to `sink`.
    ///
    /// Reports every `config.print_every` steps, plus once at the end for any
    /// steps not yet reported. Any error, including a malformed batch, ends the run immediately.
    pub fn fit<S, P>(&mut self, source: &mut S, sink: &mut P) -> Result<TrainReport>
    where
        S: BatchSource + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let total_epochs = self.config.epochs;
        let print_every = self.config.print_every;
        let start = self.steps;

        let mut epoch_losses = Vec::with_capacity(total_epochs);
        let mut running = 0.0;
        let mut window = 0usize;

        for epoch in 1..=total_epochs {
            let mut epoch_total = 0.0;
            let mut batches = 0usize;

            for batch in source.batches() {
                let loss = self.train_step(&batch?)?;
                epoch_total += loss;
                batches += 1;
                running += loss;
                window += 1;

                if self.steps % print_every == 0 {
                    sink.report(&Progress {
                        epoch,
                        total_epochs,
                        step: self.steps,
                        running_loss: running / window as f64,
                    });
                    running = 0.0;
                    window = 0;
                }
            }

            if batches == 0 {
                return Err(Error::Dataset(format!("epoch {epoch} produced no batches")));
            }
            let mean = epoch_total / batches as f64;
            info!(epoch, total_epochs, batches, loss = mean, "epoch complete");
            epoch_losses.push(mean);
        }

        // steps since the last report
        if window > 0 {
            sink.report(&Progress {
                epoch: total_epochs,
                total_epochs,
                step: self.steps,
                running_loss: running / window as f64,
            });
        }

        Ok(TrainReport {
            epoch_losses,
            steps: self.steps - start,
        })
    }

    /// Mean loss and accuracy over every batch of `source`, without recording.
    pub fn evaluate<S>(&self, source: &mut S) -> Result<Evaluation>
    where
        S: BatchSource + ?Sized,
    {
        let _guard = self.tape.no_grad();
        let mut loss_sum = 0.0;
        let mut correct = 0.0;
        let mut examples = 0usize;

        for batch in source.batches() {
            let batch = batch?;
            let logits = self.model.forward(&self.tape, &batch.inputs)?;
            let loss = cross_entropy_loss(&self.tape, &logits, &batch.labels)?;
            let n = batch.len();
            loss_sum += loss.item()? * n as f64;
            correct += accuracy(&logits, &batch.labels)? * n as f64;
            examples += n;
        }

        if examples == 0 {
            return Err(Error::Dataset("nothing to evaluate".to_string()));
        }
        Ok(Evaluation {
            loss: loss_sum / examples as f64,
            accuracy: correct / examples as f64,
            examples,
        })
    }
}
