//! Feature Engineering Engine
//!
//! Turns a single machine observation into the fixed-order feature vector
//! consumed by the failure classifier.

mod error;
mod features;
mod reading;

pub use error::FeatureError;
pub use features::{FeatureVector, FEATURE_DIMENSION, FEATURE_NAMES};
pub use reading::{MachineReading, MachineType};
