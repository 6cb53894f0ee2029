//! Gradient-Boosted Tree Ensemble
//!
//! Binary classifier with a logistic link. The model file is JSON:
//!
//! ```json
//! {
//!   "feature_names": ["Air temperature K", "..."],
//!   "base_score": -1.5,
//!   "trees": [
//!     {"nodes": [
//!       {"id":0,"feature":3,"threshold":60.0,"yes":1,"no":2,"missing":1,"cover":100.0},
//!       {"id":1,"leaf":-0.4,"cover":80.0},
//!       {"id":2,"leaf":0.9,"cover":20.0}
//!     ]}
//!   ]
//! }
//! ```
//!
//! `base_score` is a margin (log-odds) offset; each tree adds the value of
//! the leaf the observation lands in.

use crate::engine::FailureLabel;
use crate::tree::{RawTree, Tree};
use crate::InferenceError;
use feature_engine::{FeatureVector, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Model file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEnsemble {
    feature_names: Vec<String>,
    #[serde(default)]
    base_score: f64,
    trees: Vec<RawTree>,
}

/// Validated tree ensemble
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEnsemble {
    base_score: f64,
    trees: Vec<Tree>,
}

/// Logistic link from margin to probability
pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

impl TreeEnsemble {
    /// Load and validate a model file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        info!("Loading classifier from {}", path.display());

        let text = std::fs::read_to_string(path).map_err(|e| {
            InferenceError::ModelLoadError(format!("{}: {}", path.display(), e))
        })?;

        Self::from_json(&text)
    }

    /// Parse and validate a model from JSON text
    pub fn from_json(text: &str) -> Result<Self, InferenceError> {
        let raw: RawEnsemble = serde_json::from_str(text)
            .map_err(|e| InferenceError::ModelLoadError(format!("invalid model JSON: {}", e)))?;

        if raw.feature_names.len() != FEATURE_NAMES.len()
            || raw.feature_names.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(InferenceError::FeatureMismatch {
                expected: FEATURE_NAMES.join(", "),
                actual: raw.feature_names.join(", "),
            });
        }

        if !raw.base_score.is_finite() {
            return Err(InferenceError::InvalidModel("base_score is not finite".to_string()));
        }

        if raw.trees.is_empty() {
            return Err(InferenceError::InvalidModel("model has no trees".to_string()));
        }

        let trees = raw
            .trees
            .into_iter()
            .enumerate()
            .map(|(idx, tree)| Tree::from_raw(idx, tree))
            .collect::<Result<Vec<_>, _>>()?;

        let max_depth = trees.iter().map(Tree::depth).max().unwrap_or(0);
        info!(
            "Classifier loaded: {} trees, max depth {}, base score {:.4}",
            trees.len(),
            max_depth,
            raw.base_score
        );

        Ok(Self {
            base_score: raw.base_score,
            trees,
        })
    }

    /// Raw log-odds output
    pub fn margin(&self, features: &FeatureVector) -> f64 {
        let x = features.values();
        let margin = self.trees.iter().fold(self.base_score, |acc, t| acc + t.predict(x));
        debug!("Ensemble margin {:.6}", margin);
        margin
    }

    /// Class probabilities `[P(no failure), P(failure)]`
    pub fn predict_proba(&self, features: &FeatureVector) -> [f64; 2] {
        let p = sigmoid(self.margin(features));
        [1.0 - p, p]
    }

    /// Predicted class
    pub fn predict(&self, features: &FeatureVector) -> FailureLabel {
        FailureLabel::from_probability(sigmoid(self.margin(features)))
    }

    /// Cover-weighted expected margin over the training distribution
    pub fn expected_margin(&self) -> f64 {
        self.trees
            .iter()
            .fold(self.base_score, |acc, t| acc + t.expected_value())
    }

    /// Trees in the ensemble
    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }
}
