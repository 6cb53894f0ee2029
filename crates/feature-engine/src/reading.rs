//! Machine Readings

use crate::FeatureError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Product quality variant of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MachineType {
    /// Medium quality variant
    #[default]
    #[serde(rename = "Type_M")]
    M,
    /// Low quality variant
    #[serde(rename = "Type_L")]
    L,
    /// High quality variant
    #[serde(rename = "Type_H")]
    H,
}

impl MachineType {
    /// All variants, in feature vector order
    pub const ALL: [MachineType; 3] = [MachineType::M, MachineType::L, MachineType::H];

    /// Get the form / feature label
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineType::M => "Type_M",
            MachineType::L => "Type_L",
            MachineType::H => "Type_H",
        }
    }

    /// One-hot indicators in `[Type_M, Type_L, Type_H]` order
    pub fn indicators(&self) -> [f64; 3] {
        match self {
            MachineType::M => [1.0, 0.0, 0.0],
            MachineType::L => [0.0, 1.0, 0.0],
            MachineType::H => [0.0, 0.0, 1.0],
        }
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineType {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MachineType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| FeatureError::UnknownMachineType(s.to_string()))
    }
}

/// One machine observation as entered by the operator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MachineReading {
    /// Air temperature (K)
    pub air_temperature_k: f64,
    /// Process temperature (K)
    pub process_temperature_k: f64,
    /// Rotational speed (rpm)
    pub rotational_speed_rpm: f64,
    /// Torque (Nm)
    pub torque_nm: f64,
    /// Tool wear (min)
    pub tool_wear_min: f64,
    /// Machine quality variant
    pub machine_type: MachineType,
}

impl Default for MachineReading {
    /// The placeholder values pre-filled in the input form
    fn default() -> Self {
        Self {
            air_temperature_k: 298.0,
            process_temperature_k: 304.0,
            rotational_speed_rpm: 1550.0,
            torque_nm: 50.0,
            tool_wear_min: 8.0,
            machine_type: MachineType::M,
        }
    }
}

impl MachineReading {
    /// Measurements with their display names, in form order
    pub fn measurements(&self) -> [(&'static str, f64); 5] {
        [
            ("Air temperature", self.air_temperature_k),
            ("Process temperature", self.process_temperature_k),
            ("Rotational speed", self.rotational_speed_rpm),
            ("Torque", self.torque_nm),
            ("Tool wear", self.tool_wear_min),
        ]
    }

    /// Check that the reading can be encoded without undefined values
    pub fn validate(&self) -> Result<(), FeatureError> {
        for (field, value) in self.measurements() {
            if !value.is_finite() {
                return Err(FeatureError::NonFinite { field, value });
            }
        }

        if self.torque_nm == 0.0 {
            return Err(FeatureError::ZeroTorque);
        }

        Ok(())
    }
}
