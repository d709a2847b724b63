//! DC Power-Flow Surrogate Training
//!
//! This example trains a dense surrogate of the DC power flow on a
//! fixed-topology grid:
//! 1. Generate (or reuse) a dataset of perturbed four-bus cases
//! 2. Fit the normalizer and build the codec from the training split
//! 3. Train with Adam, evaluating on the test split every epoch
//! 4. Save the surrogate and compare its predictions to the simulator
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin train_dc_surrogate -- data/four_bus output/four_bus_model
//! cargo run --release --bin train_dc_surrogate -- data/four_bus output/model --config training.json
//! ```
//!
//! Press Ctrl-C to stop after the current step; the weights of the last
//! completed step are kept and saved.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use burn::backend::{Autodiff, NdArray};
use burn::config::Config;
use neural_volt::prelude::*;
use volt_core::Backend;
use volt_io::{four_bus_case, perturbed_cases, write_cases, DcPowerFlowBackend, PerturbationConfig};

type TrainBackend = Autodiff<NdArray>;

const TRAIN_SAMPLES: usize = 256;
const TEST_SAMPLES: usize = 32;

fn default_config() -> TrainingConfig {
    let input = FeatureNames::new()
        .with_class("load", ["p_mw", "q_mvar", "scaling"])
        .with_class("sgen", ["p_mw", "scaling"])
        .with_class("gen", ["p_mw", "scaling", "vm_pu"])
        .with_class("ext_grid", ["vm_pu"]);
    let output = FeatureNames::new()
        .with_class("bus", ["res_va_degree", "res_vm_pu"])
        .with_class("line", ["res_p_from_mw"]);
    TrainingConfig::new(input, output)
        .with_network(DenseTransformConfig::new().with_hidden_dimensions(vec![64, 64]))
        .with_optimizer(OptimizerConfig::new().with_learning_rate(3e-3).with_warmup_steps(20))
        .with_loader(LoaderConfig::new().with_batch_size(32).with_num_workers(4))
        .with_epochs(40)
        .with_checkpoint_interval(10)
}

fn ensure_dataset(root: &Path) -> Result<()> {
    if root.join("train").is_dir() {
        println!("  Reusing dataset in {}", root.display());
        return Ok(());
    }
    let base = four_bus_case();
    let perturbation = PerturbationConfig::default();
    write_cases(&perturbed_cases(&base, TRAIN_SAMPLES, &perturbation, 1), &root.join("train"))?;
    write_cases(&perturbed_cases(&base, TEST_SAMPLES, &perturbation, 2), &root.join("test"))?;
    println!(
        "  Generated {} train / {} test cases in {}",
        TRAIN_SAMPLES,
        TEST_SAMPLES,
        root.display()
    );
    Ok(())
}

fn run(dataset: &Path, output: &Path, config: TrainingConfig) -> Result<()> {
    let device = Default::default();

    // =========================================================================
    // Step 1: Dataset
    // =========================================================================
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ Step 1: Dataset                                             │");
    println!("└─────────────────────────────────────────────────────────────┘");
    ensure_dataset(dataset)?;
    println!();

    // =========================================================================
    // Step 2: Normalizer and codec
    // =========================================================================
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ Step 2: Normalizer and Codec                                │");
    println!("└─────────────────────────────────────────────────────────────┘");
    let start = Instant::now();
    let backend = Arc::new(DcPowerFlowBackend::new());
    let mut trainer = GridTrainer::<TrainBackend, _>::from_dataset(
        config,
        Arc::clone(&backend),
        dataset,
        &device,
    )?
    .with_checkpoint_dir(output.join("checkpoints"));

    let stop = trainer.stop_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        stop.store(true, Ordering::Relaxed);
    }) {
        log::warn!("Could not install the Ctrl-C handler: {}", e);
    }

    println!("  Statistics:      {}", trainer.normalizer().len());
    println!("  Input length:    {}", trainer.codec().input_len());
    println!("  Output length:   {}", trainer.codec().output_len());
    println!("  Hidden layers:   {:?}", trainer.transform().hidden_dimensions());
    println!("  Setup time:      {:.3}s", start.elapsed().as_secs_f64());
    println!();

    // =========================================================================
    // Step 3: Training
    // =========================================================================
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ Step 3: Training                                            │");
    println!("└─────────────────────────────────────────────────────────────┘");
    let start = Instant::now();
    let history = trainer.train()?;
    let train_time = start.elapsed();
    if let (Some(first), Some(last)) = (history.first(), history.last()) {
        println!("  Epochs:          {}", history.len());
        println!("  Loss:            {:.6} → {:.6}", first, last);
    }
    if let Some(loader) = trainer.eval_loader() {
        println!("  Test loss:       {:.6}", trainer.evaluate(loader)?);
    }
    println!("  Training time:   {:.3}s", train_time.as_secs_f64());
    println!();

    // =========================================================================
    // Step 4: Save and compare with the simulator
    // =========================================================================
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ Step 4: Surrogate vs Simulator                              │");
    println!("└─────────────────────────────────────────────────────────────┘");
    let surrogate = trainer.into_surrogate();
    let model_dir = output.join("surrogate");
    surrogate.save(&model_dir)?;
    println!("  Saved to:        {}", model_dir.display());

    let cases = perturbed_cases(&four_bus_case(), 4, &PerturbationConfig::default(), 99);
    let mut predicted = cases.clone();
    let mut simulated = cases;
    surrogate.predict_graphs(backend.as_ref(), &mut predicted)?;
    backend.run_batch(&mut simulated)?;

    for (i, (p, s)) in predicted.iter().zip(simulated.iter()).enumerate() {
        let worst = p
            .bus
            .iter()
            .zip(s.bus.iter())
            .map(|(a, b)| (a.res_va_degree - b.res_va_degree).abs())
            .fold(0.0_f32, f32::max);
        println!("  Case {}: max |Δ angle| = {:.4}°", i, worst);
    }
    println!();

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("═══════════════════════════════════════════════════════════════");
    println!("          volt DC Power-Flow Surrogate Training");
    println!("═══════════════════════════════════════════════════════════════");
    println!();

    let args: Vec<String> = env::args().collect();
    let positional: Vec<&String> = args
        .iter()
        .skip(1)
        .take_while(|a| !a.starts_with("--"))
        .collect();
    let (dataset, output) = match positional.as_slice() {
        [dataset, output, ..] => (PathBuf::from(dataset), PathBuf::from(output)),
        _ => {
            println!("Usage: {} <dataset_dir> <output_dir> [--config training.json]", args[0]);
            println!();
            println!("Using default: data/four_bus → output/four_bus_model");
            (PathBuf::from("data/four_bus"), PathBuf::from("output/four_bus_model"))
        }
    };

    let config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let Some(path) = args.get(i + 1) else {
                eprintln!("--config needs a path");
                std::process::exit(2);
            };
            match TrainingConfig::load(path) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Error loading config '{}': {}", path, e);
                    std::process::exit(1);
                }
            }
        }
        None => default_config(),
    };

    if let Err(e) = run(&dataset, &output, config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
