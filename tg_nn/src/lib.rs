//! # tg_nn - Feed-forward Networks on the tg_core Tape
//!
//! This crate provides training building blocks on top of the tg_core autodiff engine:
//!
//! - **Layers**: [`Linear`] and [`LayerStack`] (ReLU between layers, raw logits out)
//! - **Loss**: mean softmax cross-entropy, plus accuracy and softmax helpers
//! - **Optimizers**: [`Sgd`] (with optional momentum) behind the [`Optimizer`] trait
//! - **Data**: [`Dataset`], [`DataLoader`] and the [`BatchSource`] trait, and a
//!   synthetic 8x8 digit generator
//! - **Training**: [`Trainer`] with [`TrainConfig`] loaded from YAML and progress
//!   delivered to a [`ProgressSink`]
//!
//! ## Example: Training a Small Classifier
//!
//! ```
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use tg_nn::{synthetic, DataLoader, LogProgress, TrainConfig, Trainer};
//!
//! let config = TrainConfig {
//!     layer_sizes: vec![64, 16, 10],
//!     epochs: 2,
//!     batch_size: 16,
//!     ..TrainConfig::default()
//! };
//!
//! let data = synthetic::digits(64, 0.1, &mut StdRng::seed_from_u64(config.seed))?;
//! let mut loader = DataLoader::new(data, config.batch_size)?.shuffled(config.seed);
//!
//! let mut trainer = Trainer::new(config)?;
//! let report = trainer.fit(&mut loader, &mut LogProgress)?;
//! assert_eq!(report.epoch_losses.len(), 2);
//! # Ok::<(), tg_nn::Error>(())
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod layers;
pub mod loss;
pub mod optim;
pub mod synthetic;
pub mod train;

// Re-exports for convenience
pub use config::{load_config, save_config, TrainConfig};
pub use data::{Batch, BatchSource, DataLoader, Dataset};
pub use error::{Error, Result};
pub use layers::{build_layer_stack, LayerStack, Linear};
pub use loss::{accuracy, cross_entropy_loss, softmax};
pub use optim::{Optimizer, Sgd};
pub use train::{Evaluation, LogProgress, Progress, ProgressSink, TrainReport, Trainer};
