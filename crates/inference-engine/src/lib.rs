//! Failure Inference Engine
//!
//! Gradient-boosted tree classifier for machine failure, plus an exact
//! TreeSHAP explainer over the same ensemble.

mod engine;
mod explainer;
mod model;
mod tree;

pub use engine::{FailureLabel, InferenceEngine, Prediction};
pub use explainer::{
    Algorithm, ExplainerSpec, Explanation, FeatureContribution, ModelOutput, TreeExplainer,
};
pub use model::{sigmoid, TreeEnsemble};
pub use tree::{Node, Tree};

use thiserror::Error;

/// Errors during model loading
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Invalid model: {0}")]
    InvalidModel(String),
    #[error("Feature mismatch: expected [{expected}], got [{actual}]")]
    FeatureMismatch { expected: String, actual: String },
}
