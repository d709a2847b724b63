//! Dense network configuration.

use burn::config::Config;

/// Configuration of the dense transform between encoded inputs and outputs.
///
/// Input and output widths are not configured: they come from the codec.
#[derive(Config, Debug)]
pub struct DenseTransformConfig {
    /// Widths of the hidden layers, in order.
    #[config(default = "vec![64, 64]")]
    pub hidden_dimensions: Vec<usize>,
}

impl Default for DenseTransformConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DenseTransformConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(i) = self.hidden_dimensions.iter().position(|&w| w == 0) {
            return Err(format!("hidden_dimensions[{i}] must be positive"));
        }
        Ok(())
    }
}
