//! [`Backend`] implementation over JSON grid cases and the DC power flow.

use std::path::Path;

use volt_core::{Backend, FeatureMap, FeatureNames, SampleFeatures};

use crate::grid::{self, PowerGrid};
use crate::powerflow::run_dc_power_flow;

/// Loads `.json` grid cases and simulates them with a DC power flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct DcPowerFlowBackend;

impl DcPowerFlowBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

impl Backend for DcPowerFlowBackend {
    type Graph = PowerGrid;

    fn valid_extensions(&self) -> &[&'static str] {
        &["json"]
    }

    fn valid_feature_names(&self) -> FeatureNames {
        grid::valid_feature_names()
    }

    fn load(&self, path: &Path) -> volt_core::Result<PowerGrid> {
        Ok(PowerGrid::from_path(path)?)
    }

    fn run_network(&self, graph: &mut PowerGrid) -> volt_core::Result<()> {
        if !run_dc_power_flow(graph) {
            log::warn!("Power flow of '{}' did not converge", graph.name);
        }
        Ok(())
    }

    fn get_features(
        &self,
        graph: &PowerGrid,
        names: &FeatureNames,
    ) -> volt_core::Result<SampleFeatures> {
        Ok(graph.features(names)?)
    }

    fn set_features(&self, graph: &mut PowerGrid, values: &FeatureMap) -> volt_core::Result<()> {
        for (class, columns) in values {
            for (feature, column) in columns {
                graph.set_column(class, feature, column)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::four_bus_case;
    use volt_core::VoltCoreError;

    #[test]
    fn test_check_feature_names() {
        let backend = DcPowerFlowBackend::new();
        let ok = FeatureNames::new()
            .with_class("load", ["p_mw", "q_mvar"])
            .with_class("bus", ["res_vm_pu"]);
        backend.check_feature_names(&ok).unwrap();

        let bad = FeatureNames::new().with_class("trafo", ["tap_pos"]);
        assert!(matches!(
            backend.check_feature_names(&bad),
            Err(VoltCoreError::UnknownFeature { .. })
        ));
    }

    #[test]
    fn test_run_and_extract_batch() {
        let backend = DcPowerFlowBackend::new();
        let mut graphs = vec![four_bus_case(), four_bus_case()];
        backend.run_batch(&mut graphs).unwrap();
        assert!(graphs.iter().all(|g| g.converged));

        let names = FeatureNames::new().with_class("bus", ["res_va_degree"]);
        let batch = backend.get_feature_batch(&graphs, &names).unwrap();
        assert_eq!(batch.count("bus"), 8);
        assert_eq!(batch.address.sample_range("bus", 1), 4..8);
    }

    #[test]
    fn test_set_feature_batch_writes_back() {
        let backend = DcPowerFlowBackend::new();
        let mut graphs = vec![four_bus_case()];
        let names = FeatureNames::new().with_class("bus", ["res_vm_pu"]);
        let mut batch = backend.get_feature_batch(&graphs, &names).unwrap();
        batch
            .features
            .get_mut("bus")
            .and_then(|c| c.get_mut("res_vm_pu"))
            .unwrap()
            .iter_mut()
            .for_each(|v| *v = 0.95);

        backend.set_feature_batch(&mut graphs, &batch).unwrap();
        assert!(graphs[0].bus.iter().all(|b| b.res_vm_pu == 0.95));
    }

    #[test]
    fn test_valid_file_extension() {
        let backend = DcPowerFlowBackend::new();
        assert!(backend.is_valid_file(Path::new("data/train/sample_00001.json")));
        assert!(!backend.is_valid_file(Path::new("data/train/notes.txt")));
    }
}
