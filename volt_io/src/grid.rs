//! JSON grid case format.
//!
//! A [`PowerGrid`] holds one table of typed records per object class. Input
//! parameters and simulation results (`res_*`) live side by side on each
//! record; results default to zero when absent from the file.
//!
//! Objects reference buses by their index in the `bus` table.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use volt_core::{FeatureNames, SampleFeatures};

use crate::error::{Result, VoltIoError};

/// Object classes of the grid format, in table order.
pub const OBJECT_CLASSES: &[&str] = &["bus", "load", "sgen", "gen", "ext_grid", "line"];

/// Replacement of `+inf` values when extracting features.
pub const POS_INF_REPLACEMENT: f32 = 99999.0;
/// Replacement of `-inf` values when extracting features.
pub const NEG_INF_REPLACEMENT: f32 = -99999.0;

/// Map non-finite values to finite placeholders (`NaN` becomes 0).
pub fn clean_value(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else if x == f32::INFINITY {
        POS_INF_REPLACEMENT
    } else if x == f32::NEG_INFINITY {
        NEG_INF_REPLACEMENT
    } else {
        x
    }
}

fn default_true() -> bool {
    true
}

fn default_one() -> f32 {
    1.0
}

fn default_sn_mva() -> f32 {
    1.0
}

fn default_f_hz() -> f32 {
    50.0
}

fn flag(b: bool) -> f32 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Typed record of one object class, addressable by feature name.
pub trait GridObject {
    /// Class name of the table.
    const CLASS: &'static str;
    /// Every feature readable and writable by name.
    const FEATURES: &'static [&'static str];

    /// Read one feature.
    fn feature(&self, name: &str) -> Option<f32>;

    /// Write one feature; returns `false` for an unknown name.
    fn set_feature(&mut self, name: &str, value: f32) -> bool;

    /// Indices of the buses this object connects to.
    fn buses(&self) -> Vec<usize>;
}

/// Network node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    /// Optional label.
    #[serde(default)]
    pub name: String,
    /// Rated voltage in kV.
    pub vn_kv: f32,
    /// Whether the bus is energized.
    #[serde(default = "default_true")]
    pub in_service: bool,
    /// Lower voltage limit in p.u.
    #[serde(default)]
    pub min_vm_pu: f32,
    /// Upper voltage limit in p.u.
    #[serde(default)]
    pub max_vm_pu: f32,
    /// Voltage magnitude result in p.u.
    #[serde(default)]
    pub res_vm_pu: f32,
    /// Voltage angle result in degrees.
    #[serde(default)]
    pub res_va_degree: f32,
    /// Net active power demand result in MW.
    #[serde(default)]
    pub res_p_mw: f32,
    /// Net reactive power demand result in MVAr.
    #[serde(default)]
    pub res_q_mvar: f32,
}

impl GridObject for Bus {
    const CLASS: &'static str = "bus";
    const FEATURES: &'static [&'static str] = &[
        "vn_kv",
        "in_service",
        "min_vm_pu",
        "max_vm_pu",
        "res_vm_pu",
        "res_va_degree",
        "res_p_mw",
        "res_q_mvar",
    ];

    fn feature(&self, name: &str) -> Option<f32> {
        Some(match name {
            "vn_kv" => self.vn_kv,
            "in_service" => flag(self.in_service),
            "min_vm_pu" => self.min_vm_pu,
            "max_vm_pu" => self.max_vm_pu,
            "res_vm_pu" => self.res_vm_pu,
            "res_va_degree" => self.res_va_degree,
            "res_p_mw" => self.res_p_mw,
            "res_q_mvar" => self.res_q_mvar,
            _ => return None,
        })
    }

    fn set_feature(&mut self, name: &str, value: f32) -> bool {
        match name {
            "vn_kv" => self.vn_kv = value,
            "in_service" => self.in_service = value > 0.5,
            "min_vm_pu" => self.min_vm_pu = value,
            "max_vm_pu" => self.max_vm_pu = value,
            "res_vm_pu" => self.res_vm_pu = value,
            "res_va_degree" => self.res_va_degree = value,
            "res_p_mw" => self.res_p_mw = value,
            "res_q_mvar" => self.res_q_mvar = value,
            _ => return false,
        }
        true
    }

    fn buses(&self) -> Vec<usize> {
        Vec::new()
    }
}

/// Constant power consumer. Also used for static generators (`sgen`), which
/// inject instead of consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Injection {
    /// Connected bus.
    pub bus: usize,
    /// Optional label.
    #[serde(default)]
    pub name: String,
    /// Active power in MW.
    #[serde(default)]
    pub p_mw: f32,
    /// Reactive power in MVAr.
    #[serde(default)]
    pub q_mvar: f32,
    /// Scaling factor applied to both powers.
    #[serde(default = "default_one")]
    pub scaling: f32,
    /// Whether the element is connected.
    #[serde(default = "default_true")]
    pub in_service: bool,
    /// Active power result in MW.
    #[serde(default)]
    pub res_p_mw: f32,
    /// Reactive power result in MVAr.
    #[serde(default)]
    pub res_q_mvar: f32,
}

impl Injection {
    /// Effective active power (0 when out of service).
    pub fn effective_p_mw(&self) -> f32 {
        if self.in_service {
            self.p_mw * self.scaling
        } else {
            0.0
        }
    }

    /// Effective reactive power (0 when out of service).
    pub fn effective_q_mvar(&self) -> f32 {
        if self.in_service {
            self.q_mvar * self.scaling
        } else {
            0.0
        }
    }
}

const INJECTION_FEATURES: &[&str] = &[
    "p_mw",
    "q_mvar",
    "scaling",
    "in_service",
    "res_p_mw",
    "res_q_mvar",
];

fn injection_feature(obj: &Injection, name: &str) -> Option<f32> {
    Some(match name {
        "p_mw" => obj.p_mw,
        "q_mvar" => obj.q_mvar,
        "scaling" => obj.scaling,
        "in_service" => flag(obj.in_service),
        "res_p_mw" => obj.res_p_mw,
        "res_q_mvar" => obj.res_q_mvar,
        _ => return None,
    })
}

fn set_injection_feature(obj: &mut Injection, name: &str, value: f32) -> bool {
    match name {
        "p_mw" => obj.p_mw = value,
        "q_mvar" => obj.q_mvar = value,
        "scaling" => obj.scaling = value,
        "in_service" => obj.in_service = value > 0.5,
        "res_p_mw" => obj.res_p_mw = value,
        "res_q_mvar" => obj.res_q_mvar = value,
        _ => return false,
    }
    true
}

/// Consumer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Load(pub Injection);

/// Static generator record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sgen(pub Injection);

impl GridObject for Load {
    const CLASS: &'static str = "load";
    const FEATURES: &'static [&'static str] = INJECTION_FEATURES;

    fn feature(&self, name: &str) -> Option<f32> {
        injection_feature(&self.0, name)
    }

    fn set_feature(&mut self, name: &str, value: f32) -> bool {
        set_injection_feature(&mut self.0, name, value)
    }

    fn buses(&self) -> Vec<usize> {
        vec![self.0.bus]
    }
}

impl GridObject for Sgen {
    const CLASS: &'static str = "sgen";
    const FEATURES: &'static [&'static str] = INJECTION_FEATURES;

    fn feature(&self, name: &str) -> Option<f32> {
        injection_feature(&self.0, name)
    }

    fn set_feature(&mut self, name: &str, value: f32) -> bool {
        set_injection_feature(&mut self.0, name, value)
    }

    fn buses(&self) -> Vec<usize> {
        vec![self.0.bus]
    }
}

/// Voltage-controlled generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gen {
    /// Connected bus.
    pub bus: usize,
    /// Optional label.
    #[serde(default)]
    pub name: String,
    /// Active power set point in MW.
    #[serde(default)]
    pub p_mw: f32,
    /// Voltage set point in p.u.
    #[serde(default = "default_one")]
    pub vm_pu: f32,
    /// Scaling factor of the active power.
    #[serde(default = "default_one")]
    pub scaling: f32,
    /// Whether the generator may act as slack.
    #[serde(default)]
    pub slack: bool,
    /// Whether the generator is connected.
    #[serde(default = "default_true")]
    pub in_service: bool,
    /// Active power result in MW.
    #[serde(default)]
    pub res_p_mw: f32,
    /// Reactive power result in MVAr.
    #[serde(default)]
    pub res_q_mvar: f32,
    /// Voltage angle result in degrees.
    #[serde(default)]
    pub res_va_degree: f32,
    /// Voltage magnitude result in p.u.
    #[serde(default)]
    pub res_vm_pu: f32,
}

impl Gen {
    /// Effective active power (0 when out of service).
    pub fn effective_p_mw(&self) -> f32 {
        if self.in_service {
            self.p_mw * self.scaling
        } else {
            0.0
        }
    }
}

impl GridObject for Gen {
    const CLASS: &'static str = "gen";
    const FEATURES: &'static [&'static str] = &[
        "p_mw",
        "vm_pu",
        "scaling",
        "slack",
        "in_service",
        "res_p_mw",
        "res_q_mvar",
        "res_va_degree",
        "res_vm_pu",
    ];

    fn feature(&self, name: &str) -> Option<f32> {
        Some(match name {
            "p_mw" => self.p_mw,
            "vm_pu" => self.vm_pu,
            "scaling" => self.scaling,
            "slack" => flag(self.slack),
            "in_service" => flag(self.in_service),
            "res_p_mw" => self.res_p_mw,
            "res_q_mvar" => self.res_q_mvar,
            "res_va_degree" => self.res_va_degree,
            "res_vm_pu" => self.res_vm_pu,
            _ => return None,
        })
    }

    fn set_feature(&mut self, name: &str, value: f32) -> bool {
        match name {
            "p_mw" => self.p_mw = value,
            "vm_pu" => self.vm_pu = value,
            "scaling" => self.scaling = value,
            "slack" => self.slack = value > 0.5,
            "in_service" => self.in_service = value > 0.5,
            "res_p_mw" => self.res_p_mw = value,
            "res_q_mvar" => self.res_q_mvar = value,
            "res_va_degree" => self.res_va_degree = value,
            "res_vm_pu" => self.res_vm_pu = value,
            _ => return false,
        }
        true
    }

    fn buses(&self) -> Vec<usize> {
        vec![self.bus]
    }
}

/// Connection to an upstream grid (slack).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtGrid {
    /// Connected bus.
    pub bus: usize,
    /// Optional label.
    #[serde(default)]
    pub name: String,
    /// Voltage magnitude set point in p.u.
    #[serde(default = "default_one")]
    pub vm_pu: f32,
    /// Voltage angle set point in degrees.
    #[serde(default)]
    pub va_degree: f32,
    /// Whether the connection is active.
    #[serde(default = "default_true")]
    pub in_service: bool,
    /// Active power result in MW (positive when feeding the grid).
    #[serde(default)]
    pub res_p_mw: f32,
    /// Reactive power result in MVAr.
    #[serde(default)]
    pub res_q_mvar: f32,
}

impl GridObject for ExtGrid {
    const CLASS: &'static str = "ext_grid";
    const FEATURES: &'static [&'static str] = &[
        "vm_pu",
        "va_degree",
        "in_service",
        "res_p_mw",
        "res_q_mvar",
    ];

    fn feature(&self, name: &str) -> Option<f32> {
        Some(match name {
            "vm_pu" => self.vm_pu,
            "va_degree" => self.va_degree,
            "in_service" => flag(self.in_service),
            "res_p_mw" => self.res_p_mw,
            "res_q_mvar" => self.res_q_mvar,
            _ => return None,
        })
    }

    fn set_feature(&mut self, name: &str, value: f32) -> bool {
        match name {
            "vm_pu" => self.vm_pu = value,
            "va_degree" => self.va_degree = value,
            "in_service" => self.in_service = value > 0.5,
            "res_p_mw" => self.res_p_mw = value,
            "res_q_mvar" => self.res_q_mvar = value,
            _ => return false,
        }
        true
    }

    fn buses(&self) -> Vec<usize> {
        vec![self.bus]
    }
}

/// Overhead line or cable between two buses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// Sending bus.
    pub from_bus: usize,
    /// Receiving bus.
    pub to_bus: usize,
    /// Optional label.
    #[serde(default)]
    pub name: String,
    /// Length in km.
    #[serde(default = "default_one")]
    pub length_km: f32,
    /// Resistance per km in ohm.
    #[serde(default)]
    pub r_ohm_per_km: f32,
    /// Reactance per km in ohm.
    pub x_ohm_per_km: f32,
    /// Thermal current limit in kA.
    #[serde(default)]
    pub max_i_ka: f32,
    /// Whether the line is closed.
    #[serde(default = "default_true")]
    pub in_service: bool,
    /// Active power flow into the line at the sending end, in MW.
    #[serde(default)]
    pub res_p_from_mw: f32,
    /// Active power flow into the line at the receiving end, in MW.
    #[serde(default)]
    pub res_p_to_mw: f32,
    /// Active power losses in MW.
    #[serde(default)]
    pub res_pl_mw: f32,
    /// Current magnitude in kA.
    #[serde(default)]
    pub res_i_ka: f32,
    /// Loading relative to `max_i_ka`, in percent.
    #[serde(default)]
    pub res_loading_percent: f32,
}

impl GridObject for Line {
    const CLASS: &'static str = "line";
    const FEATURES: &'static [&'static str] = &[
        "length_km",
        "r_ohm_per_km",
        "x_ohm_per_km",
        "max_i_ka",
        "in_service",
        "res_p_from_mw",
        "res_p_to_mw",
        "res_pl_mw",
        "res_i_ka",
        "res_loading_percent",
    ];

    fn feature(&self, name: &str) -> Option<f32> {
        Some(match name {
            "length_km" => self.length_km,
            "r_ohm_per_km" => self.r_ohm_per_km,
            "x_ohm_per_km" => self.x_ohm_per_km,
            "max_i_ka" => self.max_i_ka,
            "in_service" => flag(self.in_service),
            "res_p_from_mw" => self.res_p_from_mw,
            "res_p_to_mw" => self.res_p_to_mw,
            "res_pl_mw" => self.res_pl_mw,
            "res_i_ka" => self.res_i_ka,
            "res_loading_percent" => self.res_loading_percent,
            _ => return None,
        })
    }

    fn set_feature(&mut self, name: &str, value: f32) -> bool {
        match name {
            "length_km" => self.length_km = value,
            "r_ohm_per_km" => self.r_ohm_per_km = value,
            "x_ohm_per_km" => self.x_ohm_per_km = value,
            "max_i_ka" => self.max_i_ka = value,
            "in_service" => self.in_service = value > 0.5,
            "res_p_from_mw" => self.res_p_from_mw = value,
            "res_p_to_mw" => self.res_p_to_mw = value,
            "res_pl_mw" => self.res_pl_mw = value,
            "res_i_ka" => self.res_i_ka = value,
            "res_loading_percent" => self.res_loading_percent = value,
            _ => return false,
        }
        true
    }

    fn buses(&self) -> Vec<usize> {
        vec![self.from_bus, self.to_bus]
    }
}

fn read_column<T: GridObject>(table: &[T], feature: &str) -> Result<Vec<f32>> {
    table
        .iter()
        .map(|obj| {
            obj.feature(feature)
                .map(clean_value)
                .ok_or_else(|| VoltIoError::UnknownFeature {
                    class: T::CLASS.to_string(),
                    feature: feature.to_string(),
                })
        })
        .collect()
}

fn write_column<T: GridObject>(table: &mut [T], feature: &str, values: &[f32]) -> Result<()> {
    if values.len() != table.len() {
        return Err(VoltIoError::ColumnLength {
            class: T::CLASS.to_string(),
            feature: feature.to_string(),
            expected: table.len(),
            got: values.len(),
        });
    }
    if !T::FEATURES.contains(&feature) {
        return Err(VoltIoError::UnknownFeature {
            class: T::CLASS.to_string(),
            feature: feature.to_string(),
        });
    }
    for (obj, &value) in table.iter_mut().zip(values) {
        obj.set_feature(feature, value);
    }
    Ok(())
}

fn check_buses<T: GridObject>(table: &[T], buses: usize) -> Result<()> {
    for (index, obj) in table.iter().enumerate() {
        if let Some(bus) = obj.buses().into_iter().find(|&b| b >= buses) {
            return Err(VoltIoError::DanglingBus {
                class: T::CLASS.to_string(),
                index,
                bus,
                buses,
            });
        }
    }
    Ok(())
}

/// Every (class, feature) pair of the grid format.
pub fn valid_feature_names() -> FeatureNames {
    FeatureNames::new()
        .with_class(Bus::CLASS, Bus::FEATURES.iter().copied())
        .with_class(Load::CLASS, Load::FEATURES.iter().copied())
        .with_class(Sgen::CLASS, Sgen::FEATURES.iter().copied())
        .with_class(Gen::CLASS, Gen::FEATURES.iter().copied())
        .with_class(ExtGrid::CLASS, ExtGrid::FEATURES.iter().copied())
        .with_class(Line::CLASS, Line::FEATURES.iter().copied())
}

/// One grid case: object tables plus system parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerGrid {
    /// Case label.
    #[serde(default)]
    pub name: String,
    /// System base power in MVA.
    #[serde(default = "default_sn_mva")]
    pub sn_mva: f32,
    /// Nominal frequency in Hz.
    #[serde(default = "default_f_hz")]
    pub f_hz: f32,
    /// Whether the stored results come from a converged simulation.
    #[serde(default)]
    pub converged: bool,
    /// Bus table.
    #[serde(default)]
    pub bus: Vec<Bus>,
    /// Load table.
    #[serde(default)]
    pub load: Vec<Load>,
    /// Static generator table.
    #[serde(default)]
    pub sgen: Vec<Sgen>,
    /// Generator table.
    #[serde(default)]
    pub gen: Vec<Gen>,
    /// External grid table.
    #[serde(default)]
    pub ext_grid: Vec<ExtGrid>,
    /// Line table.
    #[serde(default)]
    pub line: Vec<Line>,
}

impl PowerGrid {
    /// Empty grid with default system parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sn_mva: default_sn_mva(),
            f_hz: default_f_hz(),
            converged: false,
            bus: Vec::new(),
            load: Vec::new(),
            sgen: Vec::new(),
            gen: Vec::new(),
            ext_grid: Vec::new(),
            line: Vec::new(),
        }
    }

    /// Parse a JSON document without validating bus references.
    pub fn from_json_str(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read and validate a grid file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| VoltIoError::io(path, e))?;
        let grid: PowerGrid =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| VoltIoError::json(path, e))?;
        grid.validate()?;
        Ok(grid)
    }

    /// Write the grid as pretty JSON.
    pub fn to_path(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| VoltIoError::io(path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| VoltIoError::json(path, e))
    }

    /// Check that every bus reference is in range.
    pub fn validate(&self) -> Result<()> {
        let n = self.bus.len();
        check_buses(&self.load, n)?;
        check_buses(&self.sgen, n)?;
        check_buses(&self.gen, n)?;
        check_buses(&self.ext_grid, n)?;
        check_buses(&self.line, n)?;
        Ok(())
    }

    /// Number of objects of a class.
    pub fn count(&self, class: &str) -> Result<usize> {
        Ok(match class {
            "bus" => self.bus.len(),
            "load" => self.load.len(),
            "sgen" => self.sgen.len(),
            "gen" => self.gen.len(),
            "ext_grid" => self.ext_grid.len(),
            "line" => self.line.len(),
            _ => {
                return Err(VoltIoError::UnknownClass {
                    class: class.to_string(),
                })
            }
        })
    }

    /// Read one feature of every object of a class, non-finite values cleaned.
    pub fn column(&self, class: &str, feature: &str) -> Result<Vec<f32>> {
        match class {
            "bus" => read_column(&self.bus, feature),
            "load" => read_column(&self.load, feature),
            "sgen" => read_column(&self.sgen, feature),
            "gen" => read_column(&self.gen, feature),
            "ext_grid" => read_column(&self.ext_grid, feature),
            "line" => read_column(&self.line, feature),
            _ => Err(VoltIoError::UnknownClass {
                class: class.to_string(),
            }),
        }
    }

    /// Write one feature of every object of a class.
    pub fn set_column(&mut self, class: &str, feature: &str, values: &[f32]) -> Result<()> {
        match class {
            "bus" => write_column(&mut self.bus, feature, values),
            "load" => write_column(&mut self.load, feature, values),
            "sgen" => write_column(&mut self.sgen, feature, values),
            "gen" => write_column(&mut self.gen, feature, values),
            "ext_grid" => write_column(&mut self.ext_grid, feature, values),
            "line" => write_column(&mut self.line, feature, values),
            _ => Err(VoltIoError::UnknownClass {
                class: class.to_string(),
            }),
        }
    }

    /// Extract the named features and the counts of every named class.
    pub fn features(&self, names: &FeatureNames) -> Result<SampleFeatures> {
        let mut sample = SampleFeatures::default();
        for (class, features) in names.iter() {
            sample.counts.insert(class.to_string(), self.count(class)?);
            let columns = sample.features.entry(class.to_string()).or_default();
            for feature in features {
                columns.insert(feature.clone(), self.column(class, feature)?);
            }
        }
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CASE: &str = r#"{
        "name": "two_bus",
        "sn_mva": 10.0,
        "bus": [{"vn_kv": 20.0}, {"vn_kv": 20.0, "res_vm_pu": 0.98}],
        "load": [{"bus": 1, "p_mw": 2.0, "q_mvar": 0.5}],
        "ext_grid": [{"bus": 0}],
        "line": [{"from_bus": 0, "to_bus": 1, "length_km": 2.0, "x_ohm_per_km": 0.4}]
    }"#;

    #[test]
    fn test_parse_defaults() {
        let grid = PowerGrid::from_json_str(CASE).unwrap();
        assert_eq!(grid.sn_mva, 10.0);
        assert_eq!(grid.f_hz, 50.0);
        assert!(grid.bus[0].in_service);
        assert_eq!(grid.load[0].0.scaling, 1.0);
        assert_eq!(grid.ext_grid[0].vm_pu, 1.0);
        assert!(grid.gen.is_empty());
        grid.validate().unwrap();
    }

    #[test]
    fn test_columns_and_write_back() {
        let mut grid = PowerGrid::from_json_str(CASE).unwrap();
        assert_eq!(grid.column("bus", "res_vm_pu").unwrap(), vec![0.0, 0.98]);
        assert_eq!(grid.column("load", "in_service").unwrap(), vec![1.0]);

        grid.set_column("load", "p_mw", &[3.5]).unwrap();
        assert_eq!(grid.load[0].0.p_mw, 3.5);

        assert!(matches!(
            grid.set_column("load", "p_mw", &[1.0, 2.0]),
            Err(VoltIoError::ColumnLength { .. })
        ));
        assert!(matches!(
            grid.column("trafo", "p_mw"),
            Err(VoltIoError::UnknownClass { .. })
        ));
        assert!(matches!(
            grid.column("line", "p_mw"),
            Err(VoltIoError::UnknownFeature { .. })
        ));
    }

    #[test]
    fn test_non_finite_values_are_cleaned() {
        let mut grid = PowerGrid::from_json_str(CASE).unwrap();
        grid.bus[0].max_vm_pu = f32::INFINITY;
        grid.bus[1].max_vm_pu = f32::NAN;
        grid.bus[0].min_vm_pu = f32::NEG_INFINITY;
        assert_eq!(grid.column("bus", "max_vm_pu").unwrap(), vec![99999.0, 0.0]);
        assert_eq!(grid.column("bus", "min_vm_pu").unwrap()[0], -99999.0);
    }

    #[test]
    fn test_dangling_bus_is_rejected() {
        let mut grid = PowerGrid::from_json_str(CASE).unwrap();
        grid.line[0].to_bus = 7;
        assert!(matches!(
            grid.validate(),
            Err(VoltIoError::DanglingBus { bus: 7, .. })
        ));
    }

    #[test]
    fn test_feature_extraction_counts_empty_classes() {
        let grid = PowerGrid::from_json_str(CASE).unwrap();
        let names = FeatureNames::new()
            .with_class("gen", ["p_mw"])
            .with_class("bus", Vec::<String>::new());
        let sample = grid.features(&names).unwrap();
        assert_eq!(sample.count("gen"), 0);
        assert_eq!(sample.count("bus"), 2);
        assert!(sample.features["gen"]["p_mw"].is_empty());
        sample.validate().unwrap();
    }

    #[test]
    fn test_valid_feature_names_cover_every_class() {
        let names = valid_feature_names();
        for class in OBJECT_CLASSES {
            assert!(names.has_class(class));
        }
        assert!(names.contains("gen", "res_vm_pu"));
    }
}
