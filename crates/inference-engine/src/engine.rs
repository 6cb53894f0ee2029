//! Inference Engine Implementation

use crate::explainer::{ExplainerSpec, Explanation, TreeExplainer};
use crate::model::{sigmoid, TreeEnsemble};
use crate::InferenceError;
use feature_engine::FeatureVector;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Probability above which a failure is predicted
const DECISION_THRESHOLD: f64 = 0.5;

/// Binary outcome predicted by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureLabel {
    /// Machine operating normally
    NoFailure,
    /// Machine failure predicted
    Failure,
}

impl FailureLabel {
    /// Get display string
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureLabel::NoFailure => "No Failure",
            FailureLabel::Failure => "Failure",
        }
    }

    /// Label for a failure probability
    pub fn from_probability(probability: f64) -> Self {
        if probability > DECISION_THRESHOLD {
            FailureLabel::Failure
        } else {
            FailureLabel::NoFailure
        }
    }
}

/// Prediction result for one observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class
    pub label: FailureLabel,
    /// Probability of failure (0.0 to 1.0)
    pub probability: f64,
    /// Raw log-odds
    pub margin: f64,
}

/// Classifier and explainer loaded once at startup
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    explainer: TreeExplainer,
}

impl InferenceEngine {
    /// Load the classifier and its explainer from disk
    pub fn load(
        classifier_path: impl AsRef<Path>,
        explainer_path: impl AsRef<Path>,
    ) -> Result<Self, InferenceError> {
        let model = TreeEnsemble::from_path(classifier_path)?;
        let spec = ExplainerSpec::from_path(explainer_path)?;
        let explainer = TreeExplainer::new(&spec, model)?;

        info!(
            "Inference engine loaded with {} trees",
            explainer.model().trees().len()
        );

        Ok(Self { explainer })
    }

    /// Wrap an already-built explainer
    pub fn from_explainer(explainer: TreeExplainer) -> Self {
        Self { explainer }
    }

    /// Predicted class
    pub fn predict(&self, features: &FeatureVector) -> FailureLabel {
        self.classify(features).label
    }

    /// Class probabilities `[P(no failure), P(failure)]`
    pub fn predict_proba(&self, features: &FeatureVector) -> [f64; 2] {
        self.explainer.model().predict_proba(features)
    }

    /// Label, probability and margin in one pass
    pub fn classify(&self, features: &FeatureVector) -> Prediction {
        let margin = self.explainer.model().margin(features);
        let probability = sigmoid(margin);
        let label = FailureLabel::from_probability(probability);

        debug!("Prediction: {} (p={:.4})", label.as_str(), probability);

        Prediction {
            label,
            probability,
            margin,
        }
    }

    /// SHAP attribution for one observation
    pub fn explain(&self, features: &FeatureVector) -> Explanation {
        self.explainer.explain(features)
    }

    /// Number of trees in the classifier
    pub fn tree_count(&self) -> usize {
        self.explainer.model().trees().len()
    }

    /// Expected margin used as the attribution baseline
    pub fn expected_value(&self) -> f64 {
        self.explainer.expected_value()
    }
}
