//! End-to-end training tests on a synthetic four-bus dataset.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use burn::backend::{Autodiff, NdArray};
use burn::tensor::Tensor;
use neural_volt::prelude::*;
use neural_volt::training::{checkpoint_exists, find_latest_checkpoint};
use tempfile::TempDir;
use volt_core::{Backend as GridBackend, FeatureMap, SampleFeatures};
use volt_io::{four_bus_case, perturbed_cases, write_cases, DcPowerFlowBackend, PerturbationConfig, PowerGrid};

type TrainBackend = Autodiff<NdArray>;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn dataset(n_train: usize, n_test: usize) -> TempDir {
    let root = TempDir::new().unwrap();
    let base = four_bus_case();
    let perturbation = PerturbationConfig::default();
    write_cases(&perturbed_cases(&base, n_train, &perturbation, 1), &root.path().join("train")).unwrap();
    if n_test > 0 {
        write_cases(&perturbed_cases(&base, n_test, &perturbation, 2), &root.path().join("test")).unwrap();
    }
    root
}

fn config(epochs: usize) -> TrainingConfig {
    let input = FeatureNames::new()
        .with_class("load", ["p_mw", "scaling"])
        .with_class("sgen", ["scaling"])
        .with_class("gen", ["p_mw", "scaling"]);
    let output = FeatureNames::new().with_class("bus", ["res_va_degree"]);
    TrainingConfig::new(input, output)
        .with_network(DenseTransformConfig::new().with_hidden_dimensions(vec![16]))
        .with_optimizer(OptimizerConfig::new().with_learning_rate(1e-2))
        .with_loader(LoaderConfig::new().with_batch_size(4))
        .with_epochs(epochs)
        .with_log_interval(5)
}

fn trainer(root: &TempDir, config: TrainingConfig) -> GridTrainer<TrainBackend, DcPowerFlowBackend> {
    trainer_with(root, config, Arc::new(DcPowerFlowBackend::new()))
}

fn trainer_with<Bk>(root: &TempDir, config: TrainingConfig, backend: Arc<Bk>) -> GridTrainer<TrainBackend, Bk>
where
    Bk: GridBackend + 'static,
{
    GridTrainer::from_dataset(config, backend, root.path(), &Default::default()).unwrap()
}

/// Raises a stop flag from inside the `n`-th load after being armed.
#[derive(Default)]
struct InterruptingBackend {
    inner: DcPowerFlowBackend,
    loads: AtomicUsize,
    trigger: Mutex<Option<(usize, Arc<AtomicBool>)>>,
}

impl InterruptingBackend {
    fn arm(&self, after_loads: usize, stop: Arc<AtomicBool>) {
        self.loads.store(0, Ordering::SeqCst);
        *self.trigger.lock().unwrap() = Some((after_loads, stop));
    }
}

impl GridBackend for InterruptingBackend {
    type Graph = PowerGrid;

    fn valid_extensions(&self) -> &[&'static str] {
        self.inner.valid_extensions()
    }

    fn valid_feature_names(&self) -> FeatureNames {
        self.inner.valid_feature_names()
    }

    fn load(&self, path: &Path) -> volt_core::Result<PowerGrid> {
        let loads = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        let mut trigger = self.trigger.lock().unwrap();
        if trigger.as_ref().is_some_and(|(at, _)| *at == loads) {
            if let Some((_, stop)) = trigger.take() {
                stop.store(true, Ordering::SeqCst);
            }
        }
        drop(trigger);
        self.inner.load(path)
    }

    fn run_network(&self, graph: &mut PowerGrid) -> volt_core::Result<()> {
        self.inner.run_network(graph)
    }

    fn get_features(&self, graph: &PowerGrid, names: &FeatureNames) -> volt_core::Result<SampleFeatures> {
        self.inner.get_features(graph, names)
    }

    fn set_features(&self, graph: &mut PowerGrid, values: &FeatureMap) -> volt_core::Result<()> {
        self.inner.set_features(graph, values)
    }
}

fn predictions<Bk>(trainer: &GridTrainer<TrainBackend, Bk>) -> Vec<f32>
where
    Bk: GridBackend + 'static,
    Bk::Graph: 'static,
{
    let input = Tensor::<TrainBackend, 2>::ones([2, trainer.codec().input_len()], &Default::default());
    trainer
        .transform()
        .forward(trainer.weights(), input)
        .unwrap()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap()
}

#[test]
fn test_codec_shape_follows_reference_grid() {
    init_logger();
    let root = dataset(8, 0);
    let trainer = trainer(&root, config(1));
    // load 2x2 + sgen 1 + gen 2 inputs, 4 bus angles out
    assert_eq!(trainer.codec().input_len(), 7);
    assert_eq!(trainer.codec().output_len(), 4);
    assert_eq!(trainer.normalizer().len(), 5);
    assert!(trainer.eval_loader().is_none());
}

#[test]
fn test_training_reduces_loss() {
    init_logger();
    let root = dataset(20, 4);
    let mut trainer = trainer(&root, config(25));

    let history = trainer.train().unwrap();
    assert_eq!(history.len(), 25);
    assert!(history.iter().all(|l| l.is_finite()));
    assert!(history[24] < history[0], "{history:?}");
    assert_eq!(trainer.state().epoch, 25);
    assert_eq!(trainer.state().total_steps, 25 * 5);

    let eval = trainer.evaluate(trainer.eval_loader().unwrap()).unwrap();
    assert!(eval.is_finite());
}

#[test]
fn test_stop_flag_before_training() {
    init_logger();
    let root = dataset(8, 0);
    let mut trainer = trainer(&root, config(5));
    trainer.stop_flag().store(true, Ordering::Relaxed);

    let history = trainer.train().unwrap();
    assert!(history.is_empty());
    assert_eq!(trainer.state().total_steps, 0);
    assert_eq!(trainer.state().epoch, 0);
}

#[test]
fn test_interrupt_mid_epoch_keeps_last_committed_weights() {
    init_logger();
    let root = dataset(20, 0);
    let checkpoints = TempDir::new().unwrap();
    // One worker with a queue of one: position p is only loaded once p - 1
    // was handed to the trainer, so the load count pins the step count.
    let loader = LoaderConfig::new().with_batch_size(4).with_num_workers(1).with_prefetch_factor(1);
    let config = config(3).with_loader(loader).with_checkpoint_interval(1);

    let backend = Arc::new(InterruptingBackend::default());
    let mut interrupted = trainer_with(&root, config.clone(), Arc::clone(&backend))
        .with_checkpoint_dir(checkpoints.path());
    let initial = interrupted.weights().clone();
    // Epoch 0 loads 20 files. The 10th load of epoch 1 starts its third
    // batch, after two steps of that epoch were committed.
    backend.arm(30, interrupted.stop_flag());

    let history = interrupted.train().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(interrupted.state().epoch, 1);
    assert_eq!(interrupted.state().total_steps, 5 + 2);
    assert!(checkpoint_exists(&checkpoints.path().join("checkpoint_1")));
    assert!(!checkpoints.path().join("checkpoint_2").exists());

    // Replay the committed steps from the same starting weights.
    let mut replay = trainer(&root, config);
    replay.set_weights(initial);
    let mut optim = replay.config().optimizer.init::<TrainBackend, DenseWeights<TrainBackend>>();
    for (epoch, steps) in [(0, 5), (1, 2)] {
        let batches: Vec<_> = replay
            .train_loader()
            .epoch(epoch)
            .take(steps)
            .map(|b| b.unwrap())
            .collect();
        for batch in batches {
            replay.train_step(&mut optim, batch).unwrap();
        }
    }
    assert_eq!(replay.state().total_steps, interrupted.state().total_steps);
    for (a, b) in predictions(&interrupted).iter().zip(predictions(&replay)) {
        assert!((a - b).abs() < 1e-5, "{a} != {b}");
    }

    // The raised flag does not reach loaders built for evaluation.
    assert!(interrupted.stop_flag().load(Ordering::SeqCst));
    let files = interrupted.train_loader().files().to_vec();
    let eval_loader = interrupted.loader(files).unwrap();
    assert!(interrupted.evaluate(&eval_loader).unwrap().is_finite());
}

#[test]
fn test_checkpoints_and_resume() {
    init_logger();
    let root = dataset(8, 0);
    let checkpoints = TempDir::new().unwrap();
    let mut first = trainer(&root, config(4).with_checkpoint_interval(2))
        .with_checkpoint_dir(checkpoints.path());
    first.train().unwrap();

    assert!(checkpoint_exists(&checkpoints.path().join("checkpoint_2")));
    let latest = find_latest_checkpoint(checkpoints.path()).unwrap();
    assert!(latest.ends_with("checkpoint_4"));

    let mut resumed = trainer(&root, config(6));
    resumed.resume_from(&latest).unwrap();
    assert_eq!(resumed.state().epoch, 4);
    assert_eq!(resumed.state().total_steps, 8);

    let history = resumed.train().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(resumed.state().epoch, 6);
}

#[test]
fn test_surrogate_predicts_into_grids() {
    init_logger();
    let root = dataset(8, 0);
    let output_models = TempDir::new().unwrap();
    let mut trainer = trainer(&root, config(2));
    trainer.train().unwrap();

    let surrogate = trainer.into_surrogate();
    surrogate.save(output_models.path()).unwrap();
    let restored = GridSurrogate::<NdArray>::load(output_models.path(), &Default::default()).unwrap();

    let backend = DcPowerFlowBackend::new();
    let mut graphs = perturbed_cases(&four_bus_case(), 3, &PerturbationConfig::default(), 9);
    restored.predict_graphs(&backend, &mut graphs).unwrap();
    for grid in &graphs {
        assert!(grid.bus.iter().all(|b| b.res_va_degree.is_finite()));
        assert!(grid.bus.iter().any(|b| b.res_va_degree != 0.0));
    }
}

#[test]
fn test_invalid_feature_is_rejected_before_training() {
    init_logger();
    let root = dataset(4, 0);
    let bad = TrainingConfig::new(
        FeatureNames::new().with_class("load", ["p_mw"]),
        FeatureNames::new().with_class("trafo", ["res_loading_percent"]),
    );
    let result = GridTrainer::<TrainBackend, _>::from_dataset(
        bad,
        Arc::new(DcPowerFlowBackend::new()),
        root.path(),
        &Default::default(),
    );
    assert!(matches!(result, Err(NeuralVoltError::Core(_))));
}
