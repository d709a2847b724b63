//! volt_io - grid case files, simulation and dataset utilities.
//!
//! This crate is the storage and simulator side of volt:
//!
//! - [`PowerGrid`]: JSON grid case with bus, load, sgen, gen, ext_grid and line
//!   tables, inputs and `res_*` results side by side
//! - [`DcPowerFlowBackend`]: the [`volt_core::Backend`] over grid cases, running
//!   a linearised DC power flow
//! - [`dataset`]: listing of `train/` and `test/` sample directories
//! - [`persist`]: JSON persistence of normalizers and post-processors
//! - [`synth`]: fixed-topology synthetic datasets from a base case

#![warn(missing_docs)]

pub mod backend;
pub mod dataset;
pub mod error;
pub mod grid;
pub mod persist;
pub mod powerflow;
pub mod synth;

pub use backend::DcPowerFlowBackend;
pub use dataset::{list_valid_files, DatasetSplit};
pub use error::{Result, VoltIoError};
pub use grid::{valid_feature_names, Bus, ExtGrid, Gen, GridObject, Injection, Line, Load, PowerGrid, Sgen};
pub use persist::{load_normalizer, load_postprocessor, save_normalizer, save_postprocessor};
pub use powerflow::{run_dc_power_flow, solve_dc, DcSolution};
pub use synth::{four_bus_case, perturbed_cases, write_cases, PerturbationConfig};
