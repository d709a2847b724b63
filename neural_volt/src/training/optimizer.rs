//! Optimizer configuration and training progress.
//!
//! The update rule is burn's Adam. This module only maps the run
//! configuration onto it and tracks the loss statistics of a run.

use burn::config::Config;
use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, Optimizer};
use burn::tensor::backend::AutodiffBackend;

/// Configuration for the optimizer.
#[derive(Config, Debug)]
pub struct OptimizerConfig {
    /// Learning rate.
    #[config(default = 1e-3)]
    pub learning_rate: f64,

    /// Adam first moment decay.
    #[config(default = 0.9)]
    pub beta_1: f32,

    /// Adam second moment decay.
    #[config(default = 0.999)]
    pub beta_2: f32,

    /// Epsilon for numerical stability.
    #[config(default = 1e-8)]
    pub epsilon: f32,

    /// Weight decay penalty (0 = none).
    #[config(default = 0.0)]
    pub weight_decay: f32,

    /// Gradient clipping threshold on the L2 norm (0 = no clipping).
    #[config(default = 1.0)]
    pub gradient_clip: f32,

    /// Number of steps of linear learning rate warmup (0 = none).
    #[config(default = 0)]
    pub warmup_steps: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.learning_rate <= 0.0 || self.learning_rate.is_nan() {
            return Err("learning_rate must be positive".to_string());
        }
        for (name, beta) in [("beta_1", self.beta_1), ("beta_2", self.beta_2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(format!("{name} must be in [0, 1)"));
            }
        }
        if self.epsilon <= 0.0 || self.epsilon.is_nan() {
            return Err("epsilon must be positive".to_string());
        }
        if self.weight_decay < 0.0 || self.gradient_clip < 0.0 {
            return Err("weight_decay and gradient_clip must not be negative".to_string());
        }
        Ok(())
    }

    /// Adam configured from this configuration.
    pub fn adam(&self) -> AdamConfig {
        let mut adam = AdamConfig::new()
            .with_beta_1(self.beta_1)
            .with_beta_2(self.beta_2)
            .with_epsilon(self.epsilon);
        if self.weight_decay > 0.0 {
            adam = adam.with_weight_decay(Some(WeightDecayConfig::new(self.weight_decay)));
        }
        if self.gradient_clip > 0.0 {
            adam = adam.with_grad_clipping(Some(GradientClippingConfig::Norm(self.gradient_clip)));
        }
        adam
    }

    /// Initialize the optimizer for module `M`.
    pub fn init<B: AutodiffBackend, M: AutodiffModule<B>>(&self) -> impl Optimizer<M, B> {
        self.adam().init::<B, M>()
    }
}

/// Progress of a training run.
#[derive(Debug, Clone)]
pub struct TrainingState {
    /// Completed epochs.
    pub epoch: usize,
    /// Total training steps.
    pub total_steps: usize,
    /// Best loss achieved.
    pub best_loss: f32,
    /// Exponential moving average of recent losses.
    pub avg_loss: f32,
    /// Exponential moving average factor for loss.
    loss_ema_factor: f32,
}

impl Default for TrainingState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingState {
    /// Create a new training state.
    pub fn new() -> Self {
        Self {
            epoch: 0,
            total_steps: 0,
            best_loss: f32::INFINITY,
            avg_loss: 0.0,
            loss_ema_factor: 0.99,
        }
    }

    /// Resume from checkpointed progress.
    pub fn resume(epoch: usize, total_steps: usize, best_loss: f32, avg_loss: f32) -> Self {
        Self {
            epoch,
            total_steps,
            best_loss,
            avg_loss,
            ..Self::new()
        }
    }

    /// Update training state after a step.
    pub fn on_step(&mut self, loss: f32) {
        self.total_steps += 1;

        if self.total_steps == 1 {
            self.avg_loss = loss;
        } else {
            self.avg_loss = self.loss_ema_factor * self.avg_loss + (1.0 - self.loss_ema_factor) * loss;
        }

        if loss < self.best_loss {
            self.best_loss = loss;
        }
    }

    /// Update training state after an epoch.
    pub fn on_epoch(&mut self) {
        self.epoch += 1;
    }

    /// Learning rate of the next step, ramping linearly over `warmup_steps`.
    ///
    /// The first warmup step already uses `base_lr / warmup_steps`.
    pub fn get_learning_rate(&self, base_lr: f64, warmup_steps: usize) -> f64 {
        if self.total_steps < warmup_steps {
            base_lr * ((self.total_steps + 1) as f64 / warmup_steps as f64)
        } else {
            base_lr
        }
    }
}
