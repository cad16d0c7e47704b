//! Router fault-probability lookup.
//!
//! Two fixed tables are compiled in, kept in the flat record format they
//! were tabulated in: configuration records of
//! `(buffers/VC, total VCs, ten fault-type percentages)` and
//! `(temperature, weight)` pairs, each list terminated by a negative
//! sentinel. A router is declared once against the configuration table;
//! lookups then scale its record by the temperature weight.
//!
//! The third `declare_router` argument is the total VC count per input
//! port, i.e. vnets times VCs per vnet; the table is keyed by
//! `inputs * vcs_per_input`.

use crate::config::{ConfigError, ConfigResult};

/// Number of modeled fault types.
pub const NUM_FAULT_TYPES: usize = 10;

/// Reference temperature in Celsius; the weight there is exactly 1.
pub const BASELINE_TEMPERATURE: i32 = 71;

const MAX_VCS: usize = 40;
const MAX_BUFFERS_PER_VC: u32 = 5;

const FIELDS_PER_CONF_RECORD: usize = 2 + NUM_FAULT_TYPES;
const FIELDS_PER_TEMPERATURE_RECORD: usize = 2;

pub const FAULT_TYPE_NAMES: [&str; NUM_FAULT_TYPES] = [
    "data_corruption__few_bits",
    "data_corruption__all_bits",
    "flit_conservation__flit_duplication",
    "flit_conservation__flit_loss_or_split",
    "misrouting",
    "credit_conservation__credit_generation",
    "credit_conservation__credit_loss",
    "erroneous_allocation__VC",
    "erroneous_allocation__switch",
    "unfair_arbitration",
];

// Per-configuration fault probabilities at the baseline temperature.
// Record: <buffers/VC> <total VCs> <ten fault-type percentages>.
#[rustfmt::skip]
const BASELINE_FAULT_RECORDS: &[f32] = &[
    4.0,  4.0, 0.62, 0.38, 0.49, 0.44, 0.54, 0.34, 0.31, 0.66, 0.72, 0.50,
    4.0,  8.0, 0.78, 0.50, 0.62, 0.56, 0.68, 0.44, 0.40, 0.82, 0.90, 0.64,
    4.0, 12.0, 0.94, 0.62, 0.76, 0.68, 0.82, 0.54, 0.50, 1.00, 1.10, 0.78,
    4.0, 16.0, 1.04, 0.70, 0.84, 0.75, 0.90, 0.61, 0.56, 1.10, 1.21, 0.86,
    4.0, 20.0, 1.14, 0.78, 0.92, 0.82, 0.98, 0.68, 0.62, 1.20, 1.32, 0.94,
    4.0, 24.0, 1.24, 0.86, 1.00, 0.89, 1.06, 0.75, 0.68, 1.30, 1.43, 1.02,
    4.0, 28.0, 1.34, 0.94, 1.08, 0.96, 1.14, 0.82, 0.74, 1.40, 1.54, 1.10,
    4.0, 32.0, 1.44, 1.02, 1.16, 1.03, 1.22, 0.89, 0.80, 1.50, 1.65, 1.18,
    4.0, 36.0, 1.54, 1.10, 1.24, 1.10, 1.30, 0.96, 0.86, 1.60, 1.76, 1.26,
    4.0, 40.0, 1.64, 1.18, 1.32, 1.17, 1.38, 1.03, 0.92, 1.70, 1.87, 1.34,
    1.0, 16.0, 0.71, 0.47, 0.55, 0.50, 0.61, 0.40, 0.37, 0.74, 0.81, 0.57,
    1.0, 24.0, 0.85, 0.57, 0.67, 0.60, 0.73, 0.49, 0.45, 0.89, 0.97, 0.69,
    1.0, 32.0, 0.99, 0.67, 0.79, 0.70, 0.85, 0.58, 0.53, 1.04, 1.13, 0.81,
    1.0, 40.0, 1.13, 0.77, 0.91, 0.80, 0.97, 0.67, 0.61, 1.19, 1.29, 0.93,
    2.0, 16.0, 0.82, 0.55, 0.65, 0.58, 0.71, 0.47, 0.43, 0.86, 0.94, 0.67,
    2.0, 24.0, 0.98, 0.66, 0.78, 0.70, 0.85, 0.57, 0.52, 1.02, 1.12, 0.80,
    2.0, 32.0, 1.14, 0.77, 0.91, 0.82, 0.99, 0.67, 0.61, 1.18, 1.30, 0.93,
    2.0, 40.0, 1.30, 0.88, 1.04, 0.94, 1.13, 0.77, 0.70, 1.34, 1.48, 1.06,
    3.0, 16.0, 0.93, 0.63, 0.75, 0.67, 0.81, 0.54, 0.50, 0.98, 1.08, 0.77,
    3.0, 24.0, 1.11, 0.76, 0.89, 0.80, 0.96, 0.66, 0.60, 1.16, 1.28, 0.91,
    3.0, 32.0, 1.29, 0.89, 1.03, 0.93, 1.11, 0.78, 0.70, 1.34, 1.48, 1.05,
    3.0, 40.0, 1.47, 1.02, 1.17, 1.06, 1.26, 0.90, 0.80, 1.52, 1.68, 1.19,
    5.0, 16.0, 1.15, 0.77, 0.93, 0.83, 0.99, 0.67, 0.62, 1.21, 1.33, 0.95,
    5.0, 24.0, 1.37, 0.95, 1.11, 0.98, 1.17, 0.83, 0.75, 1.43, 1.58, 1.13,
    5.0, 32.0, 1.59, 1.13, 1.29, 1.13, 1.35, 0.99, 0.88, 1.65, 1.83, 1.31,
    5.0, 40.0, 1.81, 1.31, 1.47, 1.28, 1.53, 1.15, 1.01, 1.87, 2.08, 1.49,
    -1.0,
];

// Temperature-to-weight pairs; temperatures below the first record carry
// weight zero. Weight is exactly 1.0 at the 71C baseline.
#[rustfmt::skip]
const TEMPERATURE_WEIGHTS: &[f32] = &[
     51.0, 0.00,  52.0, 0.05,  53.0, 0.10,  54.0, 0.15,  55.0, 0.20,
     56.0, 0.25,  57.0, 0.30,  58.0, 0.35,  59.0, 0.40,  60.0, 0.45,
     61.0, 0.50,  62.0, 0.55,  63.0, 0.60,  64.0, 0.65,  65.0, 0.70,
     66.0, 0.75,  67.0, 0.80,  68.0, 0.85,  69.0, 0.90,  70.0, 0.95,
     71.0, 1.00,  72.0, 1.05,  73.0, 1.10,  74.0, 1.15,  75.0, 1.20,
     76.0, 1.25,  77.0, 1.30,  78.0, 1.35,  79.0, 1.40,  80.0, 1.45,
     81.0, 1.50,  82.0, 1.55,  83.0, 1.60,  84.0, 1.65,  85.0, 1.70,
     86.0, 1.75,  87.0, 1.80,  88.0, 1.85,  89.0, 1.90,  90.0, 1.95,
     91.0, 2.00,  92.0, 2.05,  93.0, 2.10,  94.0, 2.15,  95.0, 2.20,
     96.0, 2.25,  97.0, 2.30,  98.0, 2.35,  99.0, 2.40, 100.0, 2.45,
    -1.0,
];

#[derive(Clone, Debug)]
struct SystemConf {
    buffers_per_vc: u32,
    vcs: usize,
    fault_probs: [f32; NUM_FAULT_TYPES],
}

#[derive(Debug)]
pub struct FaultModel {
    configurations: Vec<SystemConf>,
    routers: Vec<SystemConf>,
    temperature_weights: Vec<f32>,
}

impl Default for FaultModel {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultModel {
    pub fn new() -> Self {
        let mut configurations = Vec::new();
        let mut i = 0;
        while BASELINE_FAULT_RECORDS[i] >= 0.0 {
            let record = &BASELINE_FAULT_RECORDS[i..i + FIELDS_PER_CONF_RECORD];
            let mut fault_probs = [0.0; NUM_FAULT_TYPES];
            for (k, prob) in fault_probs.iter_mut().enumerate() {
                // Tabulated as percentages.
                *prob = record[2 + k] / 100.0;
            }
            configurations.push(SystemConf {
                buffers_per_vc: record[0] as u32,
                vcs: record[1] as usize,
                fault_probs,
            });
            i += FIELDS_PER_CONF_RECORD;
        }

        let mut temperature_weights = Vec::new();
        let mut i = 0;
        while TEMPERATURE_WEIGHTS[i] >= 0.0 {
            let temperature = TEMPERATURE_WEIGHTS[i] as usize;
            let weight = TEMPERATURE_WEIGHTS[i + 1];
            // Temperatures below the tabulated range get weight zero.
            while temperature_weights.len() < temperature {
                temperature_weights.push(0.0);
            }
            temperature_weights.push(weight);
            i += FIELDS_PER_TEMPERATURE_RECORD;
        }

        Self {
            configurations,
            routers: Vec::new(),
            temperature_weights,
        }
    }

    /// Registers a router and binds it to a configuration record.
    ///
    /// `vcs_per_input` is the total VC count of one input port; the table
    /// key is `inputs * vcs_per_input`, with buffer depth taken as the
    /// larger of the data and control values.
    pub fn declare_router(
        &mut self,
        inputs: usize,
        outputs: usize,
        vcs_per_input: usize,
        buffers_per_data_vc: u32,
        buffers_per_ctrl_vc: u32,
    ) -> ConfigResult<usize> {
        if inputs == 0
            || outputs == 0
            || vcs_per_input == 0
            || buffers_per_data_vc == 0
            || buffers_per_ctrl_vc == 0
        {
            return Err(ConfigError::FaultModel(
                "declare_router arguments must all be positive".to_string(),
            ));
        }

        let buffers_per_vc = buffers_per_data_vc.max(buffers_per_ctrl_vc);
        let total_vcs = inputs * vcs_per_input;

        if total_vcs > MAX_VCS {
            return Err(ConfigError::FaultModel(format!(
                "inputs * VCs ({total_vcs}) exceeds the tabulated maximum of {MAX_VCS}"
            )));
        }
        if buffers_per_vc > MAX_BUFFERS_PER_VC {
            return Err(ConfigError::FaultModel(format!(
                "buffers/VC ({buffers_per_vc}) exceeds the tabulated maximum of {MAX_BUFFERS_PER_VC}"
            )));
        }

        let record = self
            .configurations
            .iter()
            .find(|c| c.buffers_per_vc == buffers_per_vc && c.vcs == total_vcs)
            .ok_or_else(|| {
                ConfigError::FaultModel(format!(
                    "no configuration record for buffers/VC={buffers_per_vc}, total VCs={total_vcs}"
                ))
            })?;

        self.routers.push(record.clone());
        Ok(self.routers.len() - 1)
    }

    /// Per-fault-type probabilities for a declared router, scaled by the
    /// temperature weight.
    ///
    /// Out-of-range temperatures saturate to the nearest tabulated bound;
    /// the returned flag is false in that case.
    pub fn fault_vector(&self, router_id: usize, temperature: i32) -> ([f32; NUM_FAULT_TYPES], bool) {
        let record = self
            .routers
            .get(router_id)
            .unwrap_or_else(|| panic!("fault model: unknown router id {router_id}"));

        let (temperature, ok) = self.clamp_temperature(temperature);
        let weight = self.temperature_weights[temperature];

        let mut vector = [0.0; NUM_FAULT_TYPES];
        for (out, prob) in vector.iter_mut().zip(record.fault_probs.iter()) {
            *out = prob * weight;
        }
        (vector, ok)
    }

    /// Aggregate probability of any fault: `1 - prod(1 - p_i)`.
    pub fn fault_prob(&self, router_id: usize, temperature: i32) -> (f32, bool) {
        let (vector, ok) = self.fault_vector(router_id, temperature);
        let none_fires: f32 = vector.iter().map(|p| 1.0 - p).product();
        (1.0 - none_fires, ok)
    }

    pub fn fault_type_name(index: usize) -> &'static str {
        FAULT_TYPE_NAMES[index]
    }

    pub fn num_declared_routers(&self) -> usize {
        self.routers.len()
    }

    fn clamp_temperature(&self, temperature: i32) -> (usize, bool) {
        if temperature < 0 {
            (0, false)
        } else if temperature as usize >= self.temperature_weights.len() {
            (self.temperature_weights.len() - 1, false)
        } else {
            (temperature as usize, true)
        }
    }
}
