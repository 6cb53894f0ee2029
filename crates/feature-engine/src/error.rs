//! Feature Encoding Error Types

use thiserror::Error;

/// Errors while validating or encoding a machine reading
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    /// Torque of zero makes the speed/torque ratio undefined
    #[error("Torque must be non-zero: rotational speed over torque is undefined at 0 Nm")]
    ZeroTorque,

    /// Measurement is NaN or infinite
    #[error("{field} must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    /// Type selector outside the closed set of labels
    #[error("Unknown machine type: {0:?} (expected Type_M, Type_L or Type_H)")]
    UnknownMachineType(String),
}
