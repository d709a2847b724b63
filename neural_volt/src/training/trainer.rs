//! Surrogate trainer.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use volt_core::{
    collate, Backend as GridBackend, GraphBatch, Normalizer, PostProcessor, SampleAdapter,
    VectorCodec, VoltCoreError,
};
use volt_io::DatasetSplit;

use crate::config::{LoaderConfig, TrainingConfig};
use crate::data::DataLoader;
use crate::error::{NeuralVoltError, Result};
use crate::inference::GridSurrogate;
use crate::nn::{postprocess_flat, DenseTransform, DenseWeights};

use super::batch::TensorBatch;
use super::checkpoint::{checkpoint_dir, load_checkpoint, save_checkpoint, CheckpointMetadata};
use super::metrics::{MetricsTracker, TrainMetrics};
use super::optimizer::TrainingState;

/// Mean squared error of post-processed predictions against `batch.targets`.
fn batch_loss<B: Backend>(
    transform: &DenseTransform,
    codec: &VectorCodec,
    post: &PostProcessor,
    weights: &DenseWeights<B>,
    batch: TensorBatch<B>,
) -> Result<Tensor<B, 1>> {
    let targets = batch.targets.ok_or_else(|| NeuralVoltError::TrainingError {
        message: "batch has no ground truth".into(),
    })?;
    let predictions = transform.forward(weights, batch.inputs)?;
    let predictions = postprocess_flat(post, codec.output_layout(), predictions);
    Ok(MseLoss::new().forward(predictions, targets, Reduction::Mean))
}

/// Accumulates the squared L2 norm of every parameter gradient.
struct GradientNorm<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    squared: f32,
    backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradientNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            let squared: f32 = (grad.clone() * grad).sum().into_scalar().elem();
            self.squared += squared;
        }
    }
}

fn gradient_norm<B: AutodiffBackend>(weights: &DenseWeights<B>, grads: &GradientsParams) -> f32 {
    let mut visitor = GradientNorm {
        grads,
        squared: 0.0,
        backend: PhantomData,
    };
    weights.visit(&mut visitor);
    visitor.squared.sqrt()
}

/// Trains a dense surrogate on the grids of a dataset.
///
/// Construction fits the normalizer on the training files, records the codec
/// schema from the first training file and initializes the weights. Every
/// training step then simulates the raw graphs of a batch for ground truth,
/// runs the network on the encoded inputs and replaces the weights with the
/// optimizer's update. A failed step leaves the weights untouched.
pub struct GridTrainer<B: AutodiffBackend, Bk: GridBackend> {
    config: TrainingConfig,
    backend: Arc<Bk>,
    adapter: Arc<SampleAdapter<Bk>>,
    codec: VectorCodec,
    transform: DenseTransform,
    weights: DenseWeights<B>,
    state: TrainingState,
    metrics: MetricsTracker,
    train_loader: DataLoader<Bk>,
    eval_loader: Option<DataLoader<Bk>>,
    checkpoint_base: Option<PathBuf>,
    stop: Arc<AtomicBool>,
    device: B::Device,
}

impl<B, Bk> GridTrainer<B, Bk>
where
    B: AutodiffBackend,
    Bk: GridBackend + 'static,
    Bk::Graph: 'static,
{
    /// Build a trainer over `train_files`.
    pub fn new(
        config: TrainingConfig,
        backend: Arc<Bk>,
        train_files: Vec<PathBuf>,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate().map_err(NeuralVoltError::config)?;
        let input_names = config.input_feature_names.clone();
        let output_names = config.output_feature_names.clone();
        backend.check_feature_names(&input_names)?;
        backend.check_feature_names(&output_names)?;

        let normalizer = Normalizer::build(&train_files, backend.as_ref(), &input_names, &config.normalizer)?;
        let adapter = Arc::new(SampleAdapter::new(
            Arc::clone(&backend),
            Arc::new(normalizer),
            input_names.clone(),
            &output_names,
        ));

        let first = train_files.first().ok_or(VoltCoreError::EmptySampleSet)?;
        let reference = adapter.adapt(first)?;
        let reference = collate(&[reference.features])?;
        let codec = VectorCodec::from_reference(&reference, &input_names, &output_names)?;
        let transform = DenseTransform::from_codec(&codec, &config.network)?;

        B::seed(config.seed);
        let weights = transform.init::<B>(device);

        let stop = Arc::new(AtomicBool::new(false));
        let train_loader = DataLoader::new(
            Arc::clone(&adapter),
            train_files,
            config.loader.clone(),
            config.seed,
        )?
        .with_stop_flag(Arc::clone(&stop));

        log::info!(
            "Surrogate {} -> {:?} -> {} over {} training files",
            codec.input_len(),
            transform.hidden_dimensions(),
            codec.output_len(),
            train_loader.len()
        );

        Ok(Self {
            metrics: MetricsTracker::new(config.log_interval.max(1)),
            config,
            backend,
            adapter,
            codec,
            transform,
            weights,
            state: TrainingState::new(),
            train_loader,
            eval_loader: None,
            checkpoint_base: None,
            stop,
            device: device.clone(),
        })
    }

    /// Build a trainer over `root/train`, evaluating on `root/test` when present.
    pub fn from_dataset(
        config: TrainingConfig,
        backend: Arc<Bk>,
        root: &Path,
        device: &B::Device,
    ) -> Result<Self> {
        let split = DatasetSplit::open(root, backend.valid_extensions())?;
        let mut trainer = Self::new(config, backend, split.train, device)?;
        if !split.test.is_empty() {
            trainer.eval_loader = Some(trainer.loader(split.test)?);
        }
        Ok(trainer)
    }

    /// An unshuffled loader over `files` sharing this trainer's normalizer.
    ///
    /// The loader has its own stop flag, so evaluation still runs after the
    /// training stop flag was raised.
    pub fn loader(&self, files: Vec<PathBuf>) -> Result<DataLoader<Bk>> {
        let config = LoaderConfig {
            shuffle: false,
            drop_last: false,
            ..self.config.loader.clone()
        };
        DataLoader::new(Arc::clone(&self.adapter), files, config, self.config.seed)
    }

    /// Write a checkpoint under `base` every `checkpoint_interval` epochs.
    pub fn with_checkpoint_dir(mut self, base: impl Into<PathBuf>) -> Self {
        self.checkpoint_base = Some(base.into());
        self
    }

    /// Restore weights and progress from a checkpoint directory.
    ///
    /// Optimizer moments are not part of a checkpoint and restart from zero.
    pub fn resume_from(&mut self, dir: &Path) -> Result<()> {
        let (weights, metadata) = load_checkpoint::<B>(dir, &self.transform, &self.device)?;
        self.weights = weights;
        self.state = TrainingState::resume(
            metadata.epoch,
            metadata.total_steps,
            metadata.best_loss,
            metadata.avg_loss,
        );
        Ok(())
    }

    /// Flag that ends training after the current step when raised.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Training configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Codec fixed from the reference sample.
    pub fn codec(&self) -> &VectorCodec {
        &self.codec
    }

    /// Network shape.
    pub fn transform(&self) -> &DenseTransform {
        &self.transform
    }

    /// Fitted normalizer.
    pub fn normalizer(&self) -> &Arc<Normalizer> {
        self.adapter.normalizer()
    }

    /// Current weights.
    pub fn weights(&self) -> &DenseWeights<B> {
        &self.weights
    }

    /// Replace the weights wholesale.
    pub fn set_weights(&mut self, weights: DenseWeights<B>) {
        self.weights = weights;
    }

    /// Training progress.
    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Training loader.
    pub fn train_loader(&self) -> &DataLoader<Bk> {
        &self.train_loader
    }

    /// Loader of the test split, if the dataset has one.
    pub fn eval_loader(&self) -> Option<&DataLoader<Bk>> {
        self.eval_loader.as_ref()
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Simulate the graphs of `batch` and encode inputs and ground truth.
    fn prepare<BB: Backend<Device = B::Device>>(
        &self,
        batch: GraphBatch<Bk::Graph>,
    ) -> Result<TensorBatch<BB>> {
        let GraphBatch { batch, mut graphs } = batch;
        self.backend.run_batch(&mut graphs)?;
        let truth = self
            .backend
            .get_feature_batch(&graphs, self.codec.output_names())?;
        TensorBatch::from_inputs(&self.codec, &batch, &self.device)?.with_targets(
            &self.codec,
            &truth,
            &self.device,
        )
    }

    /// One optimization step on `batch`.
    pub fn train_step<O>(&mut self, optim: &mut O, batch: GraphBatch<Bk::Graph>) -> Result<TrainMetrics>
    where
        O: Optimizer<DenseWeights<B>, B>,
    {
        let tensors = self.prepare::<B>(batch)?;
        let loss = batch_loss(
            &self.transform,
            &self.codec,
            &self.config.postprocess_functions,
            &self.weights,
            tensors,
        )?;
        let loss_value: f32 = loss.clone().into_scalar().elem();
        if !loss_value.is_finite() {
            return Err(NeuralVoltError::TrainingError {
                message: format!("non-finite loss at step {}", self.state.total_steps),
            });
        }

        let grads = GradientsParams::from_grads(loss.backward(), &self.weights);
        let gradient_norm = gradient_norm(&self.weights, &grads);
        let learning_rate = self
            .state
            .get_learning_rate(self.config.optimizer.learning_rate, self.config.optimizer.warmup_steps);

        self.weights = optim.step(learning_rate, self.weights.clone(), grads);
        self.state.on_step(loss_value);

        let metrics = TrainMetrics {
            loss: loss_value,
            gradient_norm,
            learning_rate: learning_rate as f32,
            step: self.state.total_steps,
        };
        self.metrics.add(&metrics);
        Ok(metrics)
    }

    /// Train until `config.epochs` epochs are completed or the stop flag is
    /// raised. Returns the mean training loss of every completed epoch.
    pub fn train(&mut self) -> Result<Vec<f32>> {
        let mut optim = self.config.optimizer.init::<B, DenseWeights<B>>();
        let epochs = self.config.epochs;
        let log_interval = self.config.log_interval;
        let mut history = Vec::with_capacity(epochs.saturating_sub(self.state.epoch));

        for epoch in self.state.epoch..epochs {
            let mut sum = 0.0;
            let mut steps = 0usize;
            for batch in self.train_loader.epoch(epoch) {
                let metrics = self.train_step(&mut optim, batch?)?;
                sum += metrics.loss;
                steps += 1;
                if log_interval > 0 && metrics.step % log_interval == 0 {
                    self.metrics
                        .average_metrics()
                        .log(&format!("Epoch {}/{}", epoch + 1, epochs));
                }
            }

            if self.is_stopped() {
                log::info!(
                    "Training interrupted during epoch {}/{} after {} steps",
                    epoch + 1,
                    epochs,
                    self.state.total_steps
                );
                break;
            }
            self.state.on_epoch();

            if steps == 0 {
                log::warn!("Epoch {}/{} produced no batch", epoch + 1, epochs);
                continue;
            }
            let mean = sum / steps as f32;
            history.push(mean);

            let eval = self
                .eval_loader
                .as_ref()
                .map(|loader| self.evaluate(loader))
                .transpose()?;
            match eval {
                Some(eval) => log::info!(
                    "Epoch {}/{}: loss = {:.6}, eval = {:.6}",
                    epoch + 1,
                    epochs,
                    mean,
                    eval
                ),
                None => log::info!("Epoch {}/{}: loss = {:.6}", epoch + 1, epochs, mean),
            }

            let interval = self.config.checkpoint_interval;
            if interval > 0 && self.state.epoch % interval == 0 {
                if let Some(base) = &self.checkpoint_base {
                    let metadata = CheckpointMetadata::new(
                        self.state.epoch,
                        self.state.total_steps,
                        self.state.best_loss,
                        self.state.avg_loss,
                        &self.transform,
                    );
                    save_checkpoint(&checkpoint_dir(base, self.state.epoch), &self.weights, &metadata)?;
                }
            }
        }

        Ok(history)
    }

    /// Mean squared error over every sample of `loader`, without updating
    /// the weights.
    pub fn evaluate(&self, loader: &DataLoader<Bk>) -> Result<f32> {
        let weights = self.weights.valid();
        let mut total = 0.0;
        let mut samples = 0usize;
        for batch in loader.epoch(0) {
            let tensors = self.prepare::<B::InnerBackend>(batch?)?;
            let n = tensors.len();
            let loss = batch_loss(
                &self.transform,
                &self.codec,
                &self.config.postprocess_functions,
                &weights,
                tensors,
            )?;
            let loss: f32 = loss.into_scalar().elem();
            total += loss * n as f32;
            samples += n;
        }
        if samples == 0 {
            return Err(NeuralVoltError::TrainingError {
                message: "evaluation split produced no sample".into(),
            });
        }
        Ok(total / samples as f32)
    }

    /// Freeze the trained weights into an inference surrogate.
    pub fn into_surrogate(self) -> GridSurrogate<B::InnerBackend> {
        GridSurrogate::new(
            Arc::clone(self.adapter.normalizer()),
            self.codec,
            self.config.postprocess_functions,
            self.transform,
            self.weights.valid(),
            self.device,
        )
    }
}
