//! Simulation configuration.
//!
//! A [`SimConfig`] can be assembled from command-line flags or loaded from
//! a YAML file; flags win over file values in the binary. Validation runs
//! before any network is built, so a bad configuration fails fast with a
//! [`ConfigError`] instead of dying mid-simulation.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! topology: Mesh_XY
//! rows: 4
//! cols: 4
//! cycles: 10000
//! injection_rate: 0.02
//! packet_size: 4
//! routing: xy
//! seed: 7
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Cycle;

/// Errors that can occur while configuring a simulation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown topology: {0}")]
    UnknownTopology(String),

    #[error("topology file {file}, line {line}: {msg}")]
    TopologyFile {
        file: String,
        line: usize,
        msg: String,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("fault model: {0}")]
    FaultModel(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Routing mode selector; on the command line 0 is table, 1 is XY.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingAlgorithm {
    Table,
    Xy,
}

impl TryFrom<u8> for RoutingAlgorithm {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RoutingAlgorithm::Table),
            1 => Ok(RoutingAlgorithm::Xy),
            other => Err(format!("routing algorithm must be 0 (table) or 1 (XY), got {other}")),
        }
    }
}

/// Spatial traffic pattern for the synthetic workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficPattern {
    /// Every NI injects to uniform-random destinations.
    Uniform,
    /// Only `src` injects, always toward `dest`.
    SingleFlow { src: usize, dest: usize },
}

/// All knobs of one simulation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Built-in topology name or a path to a `.conf` file.
    pub topology: String,

    /// Mesh rows.
    pub rows: usize,
    /// Mesh columns.
    pub cols: usize,
    /// Mesh layers; more than one builds a 3D mesh.
    pub depth: usize,

    /// Cycle horizon to simulate.
    pub cycles: Cycle,

    /// Packets per NI per cycle, in `0.0..=1.0`.
    pub injection_rate: f64,

    /// Packet length in flits.
    pub packet_size: usize,

    pub routing: RoutingAlgorithm,

    pub pattern: TrafficPattern,

    /// Deterministic single-packet test: NI 0 to the last NI.
    pub test_mode: bool,

    pub debug: bool,
    pub trace_packet: bool,
    pub fault_model: bool,
    pub seed: u64,

    /// Virtual networks.
    pub vnets: usize,
    /// Virtual channels per vnet per port.
    pub vcs_per_vnet: usize,
    /// Buffer slots per data VC.
    pub buffers_per_data_vc: u32,
    /// Buffer slots per control VC.
    pub buffers_per_ctrl_vc: u32,
    /// Flit width in bits.
    pub ni_flit_size: u32,
    /// Router pipeline depth in cycles.
    pub router_latency: Cycle,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            topology: "Mesh_XY".to_string(),
            rows: 2,
            cols: 2,
            depth: 1,
            cycles: 1000,
            injection_rate: 0.01,
            packet_size: 1,
            routing: RoutingAlgorithm::Xy,
            pattern: TrafficPattern::Uniform,
            test_mode: false,
            debug: false,
            trace_packet: false,
            fault_model: false,
            seed: 42,
            vnets: 2,
            vcs_per_vnet: 4,
            buffers_per_data_vc: 4,
            buffers_per_ctrl_vc: 1,
            ni_flit_size: 16,
            router_latency: 1,
        }
    }
}

impl SimConfig {
    /// Loads a configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_yaml::from_str(&text)?;
        Ok(config)
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.injection_rate) {
            return Err(ConfigError::Validation(format!(
                "injection rate must be within [0, 1], got {}",
                self.injection_rate
            )));
        }
        if self.packet_size == 0 {
            return Err(ConfigError::Validation(
                "packet size must be at least one flit".to_string(),
            ));
        }
        if self.rows == 0 || self.cols == 0 || self.depth == 0 {
            return Err(ConfigError::Validation(format!(
                "mesh shape {}x{}x{} has an empty dimension",
                self.rows, self.cols, self.depth
            )));
        }
        if self.vnets == 0 || self.vcs_per_vnet == 0 {
            return Err(ConfigError::Validation(
                "at least one vnet and one VC per vnet are required".to_string(),
            ));
        }
        if self.buffers_per_data_vc == 0 || self.buffers_per_ctrl_vc == 0 {
            return Err(ConfigError::Validation(
                "VC buffer depth must be at least one slot".to_string(),
            ));
        }
        if self.router_latency == 0 {
            return Err(ConfigError::Validation(
                "router pipeline depth must be at least one cycle".to_string(),
            ));
        }
        if self.test_mode && self.rows * self.cols * self.depth < 2 {
            return Err(ConfigError::Validation(
                "deterministic test mode needs at least two NIs".to_string(),
            ));
        }
        if let TrafficPattern::SingleFlow { src, dest } = self.pattern {
            if src == dest {
                return Err(ConfigError::Validation(
                    "single-flow pattern must have distinct source and destination".to_string(),
                ));
            }
        }
        Ok(())
    }
}
