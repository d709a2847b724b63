//! Synthetic datasets of one fixed topology.
//!
//! Cases are produced by rescaling the loads and generation of a base case,
//! which keeps every object count identical across the dataset.

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VoltIoError};
use crate::grid::{Bus, ExtGrid, Gen, Injection, Line, Load, PowerGrid, Sgen};

/// Ranges of the random perturbations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerturbationConfig {
    /// Uniform range of the per-load scaling factor.
    pub load_scale: (f32, f32),
    /// Uniform range of the per-generator scaling factor (gen and sgen).
    pub gen_scale: (f32, f32),
    /// Half width of the uniform jitter added to voltage set points.
    pub vm_jitter: f32,
}

impl Default for PerturbationConfig {
    fn default() -> Self {
        Self {
            load_scale: (0.6, 1.4),
            gen_scale: (0.8, 1.2),
            vm_jitter: 0.02,
        }
    }
}

fn sample_range(rng: &mut StdRng, (lo, hi): (f32, f32)) -> f32 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

/// `n` perturbed copies of `base`, deterministic for a given seed.
pub fn perturbed_cases(
    base: &PowerGrid,
    n: usize,
    config: &PerturbationConfig,
    seed: u64,
) -> Vec<PowerGrid> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let mut case = base.clone();
            case.name = format!("{}_{i:05}", base.name);
            case.converged = false;
            for load in &mut case.load {
                load.0.scaling *= sample_range(&mut rng, config.load_scale);
            }
            for sgen in &mut case.sgen {
                sgen.0.scaling *= sample_range(&mut rng, config.gen_scale);
            }
            for gen in &mut case.gen {
                gen.scaling *= sample_range(&mut rng, config.gen_scale);
                gen.vm_pu += jitter(&mut rng, config.vm_jitter);
            }
            for ext in &mut case.ext_grid {
                ext.vm_pu += jitter(&mut rng, config.vm_jitter);
            }
            case
        })
        .collect()
}

fn jitter(rng: &mut StdRng, half_width: f32) -> f32 {
    if half_width > 0.0 {
        rng.gen_range(-half_width..half_width)
    } else {
        0.0
    }
}

/// Write cases as `sample_00000.json`, `sample_00001.json`, ... into `dir`.
pub fn write_cases(cases: &[PowerGrid], dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| VoltIoError::io(dir, e))?;
    cases
        .iter()
        .enumerate()
        .map(|(i, case)| {
            let path = dir.join(format!("sample_{i:05}.json"));
            case.to_path(&path)?;
            Ok(path)
        })
        .collect()
}

fn bus(name: &str, vn_kv: f32) -> Bus {
    Bus {
        name: name.to_string(),
        vn_kv,
        in_service: true,
        min_vm_pu: 0.9,
        max_vm_pu: 1.1,
        res_vm_pu: 0.0,
        res_va_degree: 0.0,
        res_p_mw: 0.0,
        res_q_mvar: 0.0,
    }
}

fn injection(bus: usize, name: &str, p_mw: f32, q_mvar: f32) -> Injection {
    Injection {
        bus,
        name: name.to_string(),
        p_mw,
        q_mvar,
        scaling: 1.0,
        in_service: true,
        res_p_mw: 0.0,
        res_q_mvar: 0.0,
    }
}

fn line(from_bus: usize, to_bus: usize, length_km: f32) -> Line {
    Line {
        from_bus,
        to_bus,
        name: format!("line_{from_bus}_{to_bus}"),
        length_km,
        r_ohm_per_km: 0.1,
        x_ohm_per_km: 0.4,
        max_i_ka: 0.4,
        in_service: true,
        res_p_from_mw: 0.0,
        res_p_to_mw: 0.0,
        res_pl_mw: 0.0,
        res_i_ka: 0.0,
        res_loading_percent: 0.0,
    }
}

/// Meshed 20 kV reference case: 4 buses, 2 loads, 1 static generator,
/// 1 generator, 1 external grid and 4 lines.
pub fn four_bus_case() -> PowerGrid {
    let mut grid = PowerGrid::new("four_bus");
    grid.sn_mva = 10.0;
    grid.bus = vec![
        bus("feeder", 20.0),
        bus("north", 20.0),
        bus("east", 20.0),
        bus("south", 20.0),
    ];
    grid.load = vec![
        Load(injection(1, "load_north", 2.0, 0.6)),
        Load(injection(3, "load_south", 3.0, 0.9)),
    ];
    grid.sgen = vec![Sgen(injection(3, "pv_south", 0.8, 0.0))];
    grid.gen = vec![Gen {
        bus: 2,
        name: "gen_east".into(),
        p_mw: 1.5,
        vm_pu: 1.01,
        scaling: 1.0,
        slack: false,
        in_service: true,
        res_p_mw: 0.0,
        res_q_mvar: 0.0,
        res_va_degree: 0.0,
        res_vm_pu: 0.0,
    }];
    grid.ext_grid = vec![ExtGrid {
        bus: 0,
        name: "upstream".into(),
        vm_pu: 1.02,
        va_degree: 0.0,
        in_service: true,
        res_p_mw: 0.0,
        res_q_mvar: 0.0,
    }];
    grid.line = vec![
        line(0, 1, 2.0),
        line(1, 2, 1.5),
        line(2, 3, 1.0),
        line(3, 0, 2.5),
    ];
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cases_share_topology_and_differ_in_values() {
        let base = four_bus_case();
        let cases = perturbed_cases(&base, 5, &PerturbationConfig::default(), 11);
        assert_eq!(cases.len(), 5);
        for case in &cases {
            assert_eq!(case.bus.len(), base.bus.len());
            assert_eq!(case.load.len(), base.load.len());
            let s = case.load[0].0.scaling;
            assert!((0.6..1.4).contains(&s));
        }
        assert_ne!(cases[0].load[0].0.scaling, cases[1].load[0].0.scaling);

        let again = perturbed_cases(&base, 5, &PerturbationConfig::default(), 11);
        assert_eq!(cases, again);
    }

    #[test]
    fn test_write_cases_round_trip() {
        let dir = TempDir::new().unwrap();
        let cases = perturbed_cases(&four_bus_case(), 3, &PerturbationConfig::default(), 0);
        let paths = write_cases(&cases, dir.path()).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths[2].ends_with("sample_00002.json"));
        assert_eq!(PowerGrid::from_path(&paths[1]).unwrap(), cases[1]);
    }
}
