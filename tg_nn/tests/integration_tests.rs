//! Integration tests for network training.
//!
//! Covers the optimizer contract, the accumulate-until-zeroed gradient
//! convention, and end-to-end training on synthetic digits.

use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tg_core::{Tape, Tensor};
use tg_nn::{
    build_layer_stack, cross_entropy_loss, load_config, save_config, synthetic, Batch,
    BatchSource, DataLoader, Dataset, LayerStack, Optimizer, Progress, Sgd, TrainConfig,
    Trainer,
};

// ============================================================================
// Test Utilities
// ============================================================================

/// `n` random examples with `features` inputs and labels below `classes`.
fn random_batch(rng: &mut StdRng, n: usize, features: usize, classes: usize) -> Batch {
    let inputs = (0..n * features).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let labels = (0..n).map(|_| rng.gen_range(0..classes)).collect();
    Batch::new(Tensor::new(inputs, [n, features]).unwrap(), labels).unwrap()
}

fn batch_loss(model: &LayerStack, tape: &Tape, batch: &Batch) -> f64 {
    let logits = model.forward(tape, &batch.inputs).unwrap();
    cross_entropy_loss(tape, &logits, &batch.labels)
        .unwrap()
        .item()
        .unwrap()
}

// ============================================================================
// Test: One SGD Step Descends
// ============================================================================

#[test]
fn test_single_step_reduces_loss_for_most_seeds() {
    let mut decreased = 0;

    for seed in 0..10 {
        let mut rng = StdRng::seed_from_u64(seed);
        let model = build_layer_stack(&[4, 3, 2], &mut rng).unwrap();
        let batch = random_batch(&mut rng, 5, 4, 2);
        let mut opt = Sgd::new(model.parameters(), 0.1);
        let tape = Tape::new();

        opt.zero_grad();
        let logits = model.forward(&tape, &batch.inputs).unwrap();
        let loss = cross_entropy_loss(&tape, &logits, &batch.labels).unwrap();
        let before = loss.item().unwrap();
        tape.backward(&loss).unwrap();
        opt.step();
        tape.reset();

        let after = {
            let _guard = tape.no_grad();
            batch_loss(&model, &tape, &batch)
        };
        eprintln!("seed {seed}: {before:.6} -> {after:.6}");
        if after < before {
            decreased += 1;
        }
    }

    assert!(decreased >= 9, "loss decreased for only {decreased}/10 seeds");
}

// ============================================================================
// Test: Exact SGD Update
// ============================================================================

#[test]
fn test_sgd_update_is_exact() {
    let mut rng = StdRng::seed_from_u64(3);
    let model = build_layer_stack(&[3, 4, 2], &mut rng).unwrap();
    let batch = random_batch(&mut rng, 4, 3, 2);
    let params = model.parameters();
    let lr = 0.05;
    let mut opt = Sgd::new(params.clone(), lr);

    let tape = Tape::new();
    let loss = cross_entropy_loss(
        &tape,
        &model.forward(&tape, &batch.inputs).unwrap(),
        &batch.labels,
    )
    .unwrap();
    tape.backward(&loss).unwrap();

    let old: Vec<Vec<f64>> = params.iter().map(Tensor::to_vec).collect();
    let grads: Vec<Vec<f64>> = params.iter().map(Tensor::grad).collect();
    opt.step();

    for ((p, old), grad) in params.iter().zip(&old).zip(&grads) {
        let expected: Vec<f64> = old.iter().zip(grad).map(|(w, g)| w - lr * g).collect();
        assert_eq!(p.to_vec(), expected);
    }
}

// ============================================================================
// Test: Gradients Accumulate Without zero_grad
// ============================================================================

#[test]
fn test_missing_zero_grad_accumulates() {
    let mut rng = StdRng::seed_from_u64(8);
    let model = build_layer_stack(&[4, 5, 3], &mut rng).unwrap();
    let batch = random_batch(&mut rng, 6, 4, 3);
    let mut opt = Sgd::new(model.parameters(), 0.1);
    let tape = Tape::new();

    let run_backward = |tape: &Tape| {
        let logits = model.forward(tape, &batch.inputs).unwrap();
        let loss = cross_entropy_loss(tape, &logits, &batch.labels).unwrap();
        tape.backward(&loss).unwrap();
        tape.reset();
    };

    opt.zero_grad();
    run_backward(&tape);
    let single: Vec<Vec<f64>> = model.parameters().iter().map(Tensor::grad).collect();

    // a second forward/backward on unchanged weights, without zeroing
    run_backward(&tape);
    for (p, g) in model.parameters().iter().zip(&single) {
        for (acc, one) in p.grad().iter().zip(g) {
            assert_abs_diff_eq!(*acc, 2.0 * one, epsilon = 1e-12);
        }
    }

    // zero_grad wipes it again
    opt.zero_grad();
    assert!(model
        .parameters()
        .iter()
        .all(|p| p.grad().iter().all(|&g| g == 0.0)));
}

// ============================================================================
// Test: Data Loader Restarts Each Epoch
// ============================================================================

#[test]
fn test_data_loader_restarts() {
    let features = (0..14).map(|i| i as f64).collect();
    let ds = Dataset::new(features, 2, vec![0, 1, 0, 1, 0, 1, 0], 2).unwrap();
    let mut loader = DataLoader::new(ds, 3).unwrap();

    let epoch = |loader: &mut DataLoader| {
        loader
            .batches()
            .map(|b| b.unwrap().labels)
            .collect::<Vec<_>>()
    };
    let first = epoch(&mut loader);
    assert_eq!(first, vec![vec![0, 1, 0], vec![1, 0, 1], vec![0]]);
    assert_eq!(epoch(&mut loader), first);
}

// ============================================================================
// Test: Training on Synthetic Digits
// ============================================================================

#[test]
fn test_training_on_synthetic_digits_reduces_loss() {
    let config = TrainConfig {
        layer_sizes: vec![64, 32, 10],
        epochs: 8,
        batch_size: 16,
        learning_rate: 0.1,
        momentum: 0.0,
        print_every: 5,
        seed: 7,
    };

    let mut rng = StdRng::seed_from_u64(config.seed);
    let (train, test) = synthetic::digits(400, 0.1, &mut rng)
        .unwrap()
        .split(0.25)
        .unwrap();
    let mut train_loader = DataLoader::new(train, config.batch_size)
        .unwrap()
        .shuffled(config.seed);
    let mut test_loader = DataLoader::new(test, 50).unwrap();

    let mut trainer = Trainer::new(config).unwrap();
    let before = trainer.evaluate(&mut test_loader).unwrap();

    let mut reports: Vec<Progress> = Vec::new();
    let report = trainer
        .fit(&mut train_loader, &mut |p: &Progress| reports.push(*p))
        .unwrap();

    let after = trainer.evaluate(&mut test_loader).unwrap();
    eprintln!(
        "epoch losses {:?}; test loss {:.4} -> {:.4}, accuracy {:.3} -> {:.3}",
        report.epoch_losses, before.loss, after.loss, before.accuracy, after.accuracy
    );

    assert_eq!(report.epoch_losses.len(), 8);
    assert_eq!(report.steps, 8 * 19);
    assert!(report.final_loss().unwrap() < report.epoch_losses[0]);
    assert!(after.loss < before.loss);
    assert!(after.accuracy > 0.3);
    assert!(!reports.is_empty());
    assert!(reports.iter().all(|p| p.running_loss.is_finite()));
}

#[test]
fn test_fit_accepts_any_batch_source() {
    let mut rng = StdRng::seed_from_u64(21);
    let mut source: Vec<Batch> = (0..3).map(|_| random_batch(&mut rng, 4, 5, 3)).collect();
    let config = TrainConfig {
        layer_sizes: vec![5, 3],
        epochs: 2,
        print_every: 100,
        ..TrainConfig::default()
    };

    let mut trainer = Trainer::new(config).unwrap();
    let dyn_source: &mut dyn BatchSource = &mut source;
    let report = trainer.fit(dyn_source, &mut tg_nn::LogProgress).unwrap();
    assert_eq!(report.steps, 6);
}

// ============================================================================
// Test: Configuration Files
// ============================================================================

#[test]
fn test_config_yaml_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("train.yaml");

    let config = TrainConfig {
        layer_sizes: vec![64, 48, 10],
        momentum: 0.9,
        ..TrainConfig::default()
    };
    save_config(&config, &path).unwrap();
    assert_eq!(load_config(&path).unwrap(), config);
}

#[test]
fn test_config_file_errors() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("missing.yaml");
    assert!(matches!(load_config(&missing), Err(tg_nn::Error::Io(_))));

    let invalid = dir.path().join("invalid.yaml");
    std::fs::write(&invalid, "epochs: 0\n").unwrap();
    assert!(matches!(load_config(&invalid), Err(tg_nn::Error::Config(_))));

    let malformed = dir.path().join("malformed.yaml");
    std::fs::write(&malformed, "layer_sizes: [64, oops").unwrap();
    assert!(matches!(load_config(&malformed), Err(tg_nn::Error::Yaml(_))));
}
