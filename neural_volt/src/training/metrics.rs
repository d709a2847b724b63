//! Training metrics.

use std::collections::VecDeque;

/// Training metrics for a single step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrainMetrics {
    /// Mean squared error over every output slot of the batch.
    pub loss: f32,
    /// L2 norm of the gradient over all weights, before clipping.
    pub gradient_norm: f32,
    /// Learning rate used for the step.
    pub learning_rate: f32,
    /// Index of the step in the run.
    pub step: usize,
}

impl TrainMetrics {
    /// Create new training metrics.
    pub fn new(loss: f32) -> Self {
        Self {
            loss,
            ..Default::default()
        }
    }

    /// Log metrics.
    pub fn log(&self, prefix: &str) {
        log::info!(
            "{} step={} loss={:.6} grad_norm={:.4} lr={:.2e}",
            prefix,
            self.step,
            self.loss,
            self.gradient_norm,
            self.learning_rate,
        );
    }
}

/// Running average tracker for metrics.
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    window_size: usize,
    losses: VecDeque<f32>,
    gradient_norms: VecDeque<f32>,
    last: TrainMetrics,
    total_steps: usize,
}

impl MetricsTracker {
    /// Create a new metrics tracker averaging over `window_size` steps.
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            losses: VecDeque::with_capacity(window_size),
            gradient_norms: VecDeque::with_capacity(window_size),
            last: TrainMetrics::default(),
            total_steps: 0,
        }
    }

    /// Add metrics from a training step.
    pub fn add(&mut self, metrics: &TrainMetrics) {
        Self::push(&mut self.losses, metrics.loss, self.window_size);
        Self::push(&mut self.gradient_norms, metrics.gradient_norm, self.window_size);
        self.last = *metrics;
        self.total_steps += 1;
    }

    fn push(window: &mut VecDeque<f32>, value: f32, window_size: usize) {
        if window.len() >= window_size {
            window.pop_front();
        }
        window.push_back(value);
    }

    fn average(window: &VecDeque<f32>) -> f32 {
        if window.is_empty() {
            0.0
        } else {
            window.iter().sum::<f32>() / window.len() as f32
        }
    }

    /// Average metrics over the window. Learning rate and step are the latest.
    pub fn average_metrics(&self) -> TrainMetrics {
        TrainMetrics {
            loss: Self::average(&self.losses),
            gradient_norm: Self::average(&self.gradient_norms),
            learning_rate: self.last.learning_rate,
            step: self.last.step,
        }
    }

    /// Total number of steps seen.
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}
