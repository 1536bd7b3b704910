//! Command-line driver for the tapegrad engine.
//!
//! `tapegrad train` fits a classifier on synthetic 8x8 digit glyphs and reports
//! held-out loss and accuracy. `tapegrad gradcheck` compares backward-pass
//! gradients of a random network against finite differences and exits non-zero
//! when they disagree.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tg_core::{check_gradient, Tensor};
use tg_nn::{
    build_layer_stack, cross_entropy_loss, load_config, synthetic, DataLoader, LogProgress,
    TrainConfig, Trainer,
};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "tapegrad")]
#[command(version)]
#[command(about = "Train small feed-forward networks with tape-based autodiff")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on synthetic digit glyphs
    Train(TrainArgs),
    /// Check backward-pass gradients against finite differences
    Gradcheck(GradcheckArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// YAML config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    /// Learning rate
    #[arg(long)]
    lr: Option<f64>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    momentum: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Layer widths, input first, e.g. 64,32,10
    #[arg(long, value_delimiter = ',')]
    layers: Option<Vec<usize>>,

    /// Number of synthetic examples to generate
    #[arg(long, default_value_t = 1000)]
    samples: usize,

    /// Background noise level in [0, 1)
    #[arg(long, default_value_t = 0.1)]
    noise: f64,

    /// Fraction of examples held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,
}

#[derive(Args, Debug)]
struct GradcheckArgs {
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Layer widths, input first
    #[arg(long, value_delimiter = ',', default_value = "8,6,3")]
    layers: Vec<usize>,

    /// Rows in the random batch
    #[arg(long, default_value_t = 4)]
    batch: usize,

    /// Finite-difference step
    #[arg(long, default_value_t = 1e-6)]
    eps: f64,

    /// Largest accepted absolute error
    #[arg(long, default_value_t = 1e-4)]
    tolerance: f64,
}

impl TrainArgs {
    /// Start from the config file (or defaults) and apply flag overrides.
    fn resolve_config(&self) -> Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => TrainConfig::default(),
        };
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(lr) = self.lr {
            config.learning_rate = lr;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(momentum) = self.momentum {
            config.momentum = momentum;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(layers) = &self.layers {
            config.layer_sizes = layers.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Command::Train(args) => run_train(&args),
        Command::Gradcheck(args) => {
            if !run_gradcheck(&args)? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn run_train(args: &TrainArgs) -> Result<()> {
    let config = args.resolve_config()?;
    let (input, output) = match config.layer_sizes.as_slice() {
        [first, .., last] => (*first, *last),
        _ => bail!("layer sizes {:?} too short", config.layer_sizes),
    };
    if input != synthetic::NUM_FEATURES || output != synthetic::NUM_CLASSES {
        bail!(
            "synthetic digits need {} inputs and {} outputs, got layer sizes {:?}",
            synthetic::NUM_FEATURES,
            synthetic::NUM_CLASSES,
            config.layer_sizes
        );
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let dataset = synthetic::digits(args.samples, args.noise, &mut rng)?;
    let (train, test) = dataset.split(args.test_fraction)?;
    info!(
        train = train.len(),
        test = test.len(),
        sizes = ?config.layer_sizes,
        "generated synthetic digits"
    );

    let mut train_loader = DataLoader::new(train, config.batch_size)?.shuffled(config.seed);
    let mut test_loader = DataLoader::new(test, config.batch_size)?;

    let mut trainer = Trainer::new(config)?;
    let report = trainer.fit(&mut train_loader, &mut LogProgress)?;
    let eval = trainer.evaluate(&mut test_loader)?;

    println!("=== Training Summary ===\n");
    println!("Layer sizes: {:?}", trainer.model().layer_sizes());
    println!("Parameters:  {}", trainer.model().num_parameters());
    println!("Steps:       {}", report.steps);
    for (epoch, loss) in report.epoch_losses.iter().enumerate() {
        println!("  epoch {:>3}: mean loss {:.4}", epoch + 1, loss);
    }
    println!(
        "\nHeld-out: loss {:.4}, accuracy {:.1}% over {} examples",
        eval.loss,
        eval.accuracy * 100.0,
        eval.examples
    );
    Ok(())
}

/// Returns whether every parameter passed.
fn run_gradcheck(args: &GradcheckArgs) -> Result<bool> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let model = build_layer_stack(&args.layers, &mut rng)?;
    let (features, classes) = (model.input_size(), model.output_size());

    let inputs = (0..args.batch * features)
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    let inputs = Tensor::new(inputs, [args.batch, features])?;
    let labels: Vec<usize> = (0..args.batch).map(|_| rng.gen_range(0..classes)).collect();

    println!("=== Gradient Check ===\n");
    println!("Layer sizes: {:?}, batch {}", model.layer_sizes(), args.batch);
    println!("eps = {:e}, tolerance = {:e}\n", args.eps, args.tolerance);

    let mut worst = 0.0f64;
    for (i, param) in model.parameters().iter().enumerate() {
        let check = check_gradient(param, args.eps, |tape| {
            let logits = model.forward(tape, &inputs)?;
            cross_entropy_loss(tape, &logits, &labels)
        })?;
        println!(
            "  layer {} {:<6} {:<8} max |autodiff - fd| = {:.2e}",
            i / 2,
            param.name().unwrap_or("param"),
            param.shape().to_string(),
            check.max_error
        );
        worst = worst.max(check.max_error);
    }

    if worst < args.tolerance {
        println!("\nPASS: Max error ({:.2e}) < tolerance ({:.2e})", worst, args.tolerance);
        Ok(true)
    } else {
        println!("\nFAIL: Max error ({:.2e}) >= tolerance ({:.2e})", worst, args.tolerance);
        Ok(false)
    }
}
