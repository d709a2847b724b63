//! Training configuration types.

use burn::config::Config;
use volt_core::{FeatureNames, NormalizerConfig, PostProcessor};

use super::DenseTransformConfig;
use crate::training::OptimizerConfig;

/// Configuration of the sample loading worker pool.
#[derive(Config, Debug)]
pub struct LoaderConfig {
    /// Samples per batch.
    #[config(default = 16)]
    pub batch_size: usize,

    /// Number of worker threads loading and adapting samples.
    #[config(default = 2)]
    pub num_workers: usize,

    /// Samples each worker may have queued ahead of the consumer.
    #[config(default = 2)]
    pub prefetch_factor: usize,

    /// Reshuffle the file order at the start of every epoch.
    #[config(default = true)]
    pub shuffle: bool,

    /// Drop the last batch of an epoch when it is incomplete.
    #[config(default = false)]
    pub drop_last: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderConfig {
    /// Capacity of the sample queue between workers and consumer.
    pub fn queue_depth(&self) -> usize {
        (self.num_workers * self.prefetch_factor).max(1)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be positive".to_string());
        }
        if self.num_workers == 0 {
            return Err("num_workers must be positive".to_string());
        }
        if self.prefetch_factor == 0 {
            return Err("prefetch_factor must be positive".to_string());
        }
        Ok(())
    }
}

/// Configuration of a surrogate training run.
///
/// JSON form (as written by [`Config::save`]):
///
/// ```json
/// {
///   "input_feature_names": {"load": ["p_mw", "q_mvar"]},
///   "output_feature_names": {"bus": ["res_vm_pu"]},
///   "network": {"hidden_dimensions": [64, 64]},
///   "postprocess_functions": {"bus": {"res_vm_pu": [{"kind": "affine", "offset": 1.0}]}},
///   ...
/// }
/// ```
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Features fed to the network, per class.
    pub input_feature_names: FeatureNames,

    /// Features predicted by the network, per class.
    pub output_feature_names: FeatureNames,

    /// Dense transform configuration.
    #[config(default = "DenseTransformConfig::new()")]
    pub network: DenseTransformConfig,

    /// Transform chains applied to decoded predictions.
    #[config(default = "PostProcessor::identity()")]
    pub postprocess_functions: PostProcessor,

    /// Normalizer fitting.
    #[config(default = "NormalizerConfig::default()")]
    pub normalizer: NormalizerConfig,

    /// Optimizer configuration.
    #[config(default = "OptimizerConfig::new()")]
    pub optimizer: OptimizerConfig,

    /// Loader configuration.
    #[config(default = "LoaderConfig::new()")]
    pub loader: LoaderConfig,

    /// Number of passes over the training files.
    #[config(default = 10)]
    pub epochs: usize,

    /// Log metrics every `log_interval` steps (0 = never).
    #[config(default = 10)]
    pub log_interval: usize,

    /// Save a checkpoint every `checkpoint_interval` epochs (0 = never).
    #[config(default = 0)]
    pub checkpoint_interval: usize,

    /// Seed for weight initialization and epoch permutations.
    #[config(default = 42)]
    pub seed: u64,
}

impl TrainingConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.input_feature_names.num_features() == 0 {
            return Err("input_feature_names declares no feature".to_string());
        }
        if self.output_feature_names.num_features() == 0 {
            return Err("output_feature_names declares no feature".to_string());
        }
        for (class, _) in self.postprocess_functions.chains() {
            if !self.output_feature_names.has_class(class) {
                return Err(format!(
                    "postprocess_functions names class '{class}' which is not an output"
                ));
            }
        }
        if self.epochs == 0 {
            return Err("epochs must be positive".to_string());
        }
        self.network.validate()?;
        self.normalizer.validate()?;
        self.optimizer.validate()?;
        self.loader.validate()?;
        Ok(())
    }
}
