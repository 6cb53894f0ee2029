//! TreeSHAP Explainer
//!
//! Exact path-dependent TreeSHAP (Lundberg et al. 2018, Algorithm 2) over a
//! [`TreeEnsemble`]. Attributions are in margin (log-odds) space, so
//! `base_value + Σ shap == margin` for every observation.

use crate::model::TreeEnsemble;
use crate::tree::{Node, Tree};
use crate::InferenceError;
use feature_engine::{FeatureVector, FEATURE_DIMENSION, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Tolerance when checking a stored expected value against the model
const EXPECTED_VALUE_TOLERANCE: f64 = 1e-6;

/// Attribution algorithm named in the explainer file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Conditional expectations follow the training cover of each node
    TreePathDependent,
}

/// Output space the attributions are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelOutput {
    /// Log-odds margin
    Raw,
}

/// Explainer file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainerSpec {
    pub algorithm: Algorithm,
    pub model_output: ModelOutput,
    /// Expected margin recorded when the explainer was built
    #[serde(default)]
    pub expected_value: Option<f64>,
}

impl ExplainerSpec {
    /// Load an explainer file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        info!("Loading explainer from {}", path.display());

        let text = std::fs::read_to_string(path).map_err(|e| {
            InferenceError::ModelLoadError(format!("{}: {}", path.display(), e))
        })?;

        serde_json::from_str(&text)
            .map_err(|e| InferenceError::ModelLoadError(format!("invalid explainer JSON: {}", e)))
    }
}

/// Contribution of a single feature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureContribution {
    /// Feature name
    pub name: &'static str,
    /// Observed feature value
    pub value: f64,
    /// SHAP value (margin units)
    pub shap: f64,
}

/// Attribution of one prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    /// Expected margin E[f(x)]
    pub base_value: f64,
    /// Per-feature contributions in feature vector order
    pub contributions: Vec<FeatureContribution>,
    /// Model margin f(x)
    pub output_value: f64,
}

impl Explanation {
    /// Sum of all contributions
    pub fn total_shap(&self) -> f64 {
        self.contributions.iter().map(|c| c.shap).sum()
    }
}

/// One element of the unique feature path
#[derive(Debug, Clone, Copy)]
struct PathElement {
    /// `None` for the root placeholder
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

/// TreeSHAP explainer bound to a loaded ensemble
#[derive(Debug, Clone)]
pub struct TreeExplainer {
    model: TreeEnsemble,
    expected_value: f64,
}

impl TreeExplainer {
    /// Build an explainer from its file spec and the classifier it explains
    pub fn new(spec: &ExplainerSpec, model: TreeEnsemble) -> Result<Self, InferenceError> {
        let expected_value = model.expected_margin();

        if let Some(stored) = spec.expected_value {
            if (stored - expected_value).abs() > EXPECTED_VALUE_TOLERANCE {
                return Err(InferenceError::InvalidModel(format!(
                    "explainer expected value {} does not match classifier ({}); was it built for another model?",
                    stored, expected_value
                )));
            }
        }

        info!(
            "TreeSHAP explainer ready: {:?}/{:?}, expected value {:.6}",
            spec.algorithm, spec.model_output, expected_value
        );

        Ok(Self {
            model,
            expected_value,
        })
    }

    /// Explainer for a model with no stored spec
    pub fn for_model(model: TreeEnsemble) -> Self {
        let expected_value = model.expected_margin();
        Self {
            model,
            expected_value,
        }
    }

    /// Expected margin E[f(x)]
    pub fn expected_value(&self) -> f64 {
        self.expected_value
    }

    /// Classifier being explained
    pub fn model(&self) -> &TreeEnsemble {
        &self.model
    }

    /// Compute SHAP values for a single observation
    pub fn explain(&self, features: &FeatureVector) -> Explanation {
        let x = features.values();
        let mut phi = [0.0; FEATURE_DIMENSION];

        for tree in self.model.trees() {
            Self::recurse(tree, tree.root(), x, &mut phi, &[], 1.0, 1.0, None);
        }

        let contributions = FEATURE_NAMES
            .iter()
            .copied()
            .zip(x.iter().zip(phi.iter()))
            .map(|(name, (value, shap))| FeatureContribution {
                name,
                value: *value,
                shap: *shap,
            })
            .collect();

        let output_value = self.model.margin(features);
        debug!(
            "Explained margin {:.6} from base {:.6}",
            output_value, self.expected_value
        );

        Explanation {
            base_value: self.expected_value,
            contributions,
            output_value,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn recurse(
        tree: &Tree,
        id: usize,
        x: &[f64],
        phi: &mut [f64; FEATURE_DIMENSION],
        parent_path: &[PathElement],
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<usize>,
    ) {
        let mut path = Vec::with_capacity(parent_path.len() + 1);
        path.extend_from_slice(parent_path);
        extend_path(&mut path, zero_fraction, one_fraction, feature);

        match *tree.node(id) {
            Node::Leaf { value, .. } => {
                for i in 1..path.len() {
                    let weight = unwound_path_sum(&path, i);
                    let el = path[i];
                    if let Some(f) = el.feature {
                        phi[f] += weight * (el.one_fraction - el.zero_fraction) * value;
                    }
                }
            }
            Node::Split {
                feature: split,
                yes,
                no,
                cover,
                ..
            } => {
                let hot = tree.next(id, x).unwrap_or(yes);
                let cold = if hot == yes { no } else { yes };
                let hot_zero = tree.node(hot).cover() / cover;
                let cold_zero = tree.node(cold).cover() / cover;

                // A feature seen earlier on the path is merged, not duplicated
                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;
                if let Some(k) = path.iter().position(|e| e.feature == Some(split)) {
                    incoming_zero = path[k].zero_fraction;
                    incoming_one = path[k].one_fraction;
                    unwind_path(&mut path, k);
                }

                Self::recurse(
                    tree,
                    hot,
                    x,
                    phi,
                    &path,
                    hot_zero * incoming_zero,
                    incoming_one,
                    Some(split),
                );
                Self::recurse(
                    tree,
                    cold,
                    x,
                    phi,
                    &path,
                    cold_zero * incoming_zero,
                    0.0,
                    Some(split),
                );
            }
        }
    }
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });

    let d = depth as f64;
    for i in (0..depth).rev() {
        let fi = i as f64;
        path[i + 1].weight += one_fraction * path[i].weight * (fi + 1.0) / (d + 1.0);
        path[i].weight = zero_fraction * path[i].weight * (d - fi) / (d + 1.0);
    }
}

fn unwind_path(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let d = depth as f64;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let mut next_one_portion = path[depth].weight;

    for i in (0..depth).rev() {
        let fi = i as f64;
        if one_fraction != 0.0 {
            let tmp = path[i].weight;
            path[i].weight = next_one_portion * (d + 1.0) / ((fi + 1.0) * one_fraction);
            next_one_portion = tmp - path[i].weight * zero_fraction * (d - fi) / (d + 1.0);
        } else {
            path[i].weight = path[i].weight * (d + 1.0) / (zero_fraction * (d - fi));
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

fn unwound_path_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let d = depth as f64;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let mut next_one_portion = path[depth].weight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        let fi = i as f64;
        if one_fraction != 0.0 {
            let tmp = next_one_portion * (d + 1.0) / ((fi + 1.0) * one_fraction);
            total += tmp;
            next_one_portion = path[i].weight - tmp * zero_fraction * ((d - fi) / (d + 1.0));
        } else if zero_fraction != 0.0 {
            total += (path[i].weight / zero_fraction) / ((d - fi) / (d + 1.0));
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{demo_model, worn_reading};
    use feature_engine::{MachineReading, MachineType};
    use proptest::prelude::*;

    /// E[f(x) | x_S] with the same cover-weighted conditioning TreeSHAP uses
    fn conditional_expectation(tree: &Tree, id: usize, x: &[f64], known: u32) -> f64 {
        match *tree.node(id) {
            Node::Leaf { value, .. } => value,
            Node::Split { feature, yes, no, cover, .. } => {
                if known & (1 << feature) != 0 {
                    let next = tree.next(id, x).unwrap();
                    conditional_expectation(tree, next, x, known)
                } else {
                    tree.node(yes).cover() / cover * conditional_expectation(tree, yes, x, known)
                        + tree.node(no).cover() / cover * conditional_expectation(tree, no, x, known)
                }
            }
        }
    }

    /// Shapley values by enumerating every coalition
    fn brute_force_shap(model: &TreeEnsemble, x: &[f64]) -> [f64; FEATURE_DIMENSION] {
        let m = FEATURE_DIMENSION;
        let value = |known: u32| -> f64 {
            model
                .trees()
                .iter()
                .map(|t| conditional_expectation(t, t.root(), x, known))
                .sum()
        };

        let mut factorial = [1.0f64; FEATURE_DIMENSION + 1];
        for i in 1..=m {
            factorial[i] = factorial[i - 1] * i as f64;
        }

        let mut phi = [0.0; FEATURE_DIMENSION];
        for (i, phi_i) in phi.iter_mut().enumerate() {
            for subset in 0u32..(1 << m) {
                if subset & (1 << i) != 0 {
                    continue;
                }
                let s = subset.count_ones() as usize;
                let weight = factorial[s] * factorial[m - s - 1] / factorial[m];
                *phi_i += weight * (value(subset | (1 << i)) - value(subset));
            }
        }
        phi
    }

    /// Model that splits on the same feature twice along one path
    fn repeated_feature_model() -> TreeEnsemble {
        let names: Vec<&str> = FEATURE_NAMES.to_vec();
        let text = serde_json::json!({
            "feature_names": names,
            "base_score": 0.1,
            "trees": [
                {"nodes": [
                    {"id":0,"feature":3,"threshold":60.0,"yes":1,"no":2,"cover":100.0},
                    {"id":1,"feature":4,"threshold":100.0,"yes":3,"no":4,"cover":70.0},
                    {"id":2,"feature":3,"threshold":75.0,"yes":5,"no":6,"cover":30.0},
                    {"id":3,"feature":3,"threshold":40.0,"yes":7,"no":8,"cover":50.0},
                    {"id":4,"leaf":0.3,"cover":20.0},
                    {"id":5,"leaf":0.6,"cover":18.0},
                    {"id":6,"leaf":1.1,"cover":12.0},
                    {"id":7,"leaf":-0.7,"cover":15.0},
                    {"id":8,"leaf":-0.2,"cover":35.0}
                ]},
                {"nodes": [
                    {"id":0,"feature":11,"threshold":0.5,"yes":1,"no":2,"cover":100.0},
                    {"id":1,"feature":6,"threshold":30.0,"yes":3,"no":4,"cover":80.0},
                    {"id":2,"leaf":0.4,"cover":20.0},
                    {"id":3,"leaf":0.2,"cover":25.0},
                    {"id":4,"feature":11,"threshold":0.5,"yes":5,"no":6,"cover":55.0},
                    {"id":5,"leaf":-0.15,"cover":55.0},
                    {"id":6,"leaf":9.0,"cover":0.0}
                ]}
            ]
        })
        .to_string();
        TreeEnsemble::from_json(&text).unwrap()
    }

    fn assert_matches_brute_force(model: &TreeEnsemble, reading: &MachineReading) {
        let features = FeatureVector::encode(reading).unwrap();
        let explanation = TreeExplainer::for_model(model.clone()).explain(&features);
        let expected = brute_force_shap(model, features.values());

        for (c, e) in explanation.contributions.iter().zip(expected.iter()) {
            assert!(
                (c.shap - e).abs() < 1e-9,
                "{}: treeshap {} vs brute force {}",
                c.name,
                c.shap,
                e
            );
        }
    }

    #[test]
    fn test_matches_brute_force_on_demo_model() {
        let model = demo_model();
        assert_matches_brute_force(&model, &MachineReading::default());
        assert_matches_brute_force(&model, &worn_reading());
    }

    #[test]
    fn test_matches_brute_force_with_repeated_splits() {
        let model = repeated_feature_model();
        for torque in [30.0, 45.0, 65.0, 80.0] {
            for machine_type in MachineType::ALL {
                let reading = MachineReading {
                    torque_nm: torque,
                    tool_wear_min: 120.0,
                    machine_type,
                    ..Default::default()
                };
                assert_matches_brute_force(&model, &reading);
            }
        }
    }

    #[test]
    fn test_additivity() {
        let model = demo_model();
        let explainer = TreeExplainer::for_model(model.clone());
        let features = FeatureVector::encode(&worn_reading()).unwrap();
        let explanation = explainer.explain(&features);

        assert!((explanation.output_value - model.margin(&features)).abs() < 1e-12);
        assert!(
            (explanation.base_value + explanation.total_shap() - explanation.output_value).abs() < 1e-9
        );
    }

    #[test]
    fn test_unused_features_get_zero() {
        let explainer = TreeExplainer::for_model(demo_model());
        let explanation = explainer.explain(&FeatureVector::encode(&MachineReading::default()).unwrap());

        for name in ["Air temperature K", "Process temperature K", "Rot spd times tool wr", "Type_M", "Type_H"] {
            let c = explanation.contributions.iter().find(|c| c.name == name).unwrap();
            assert_eq!(c.shap, 0.0, "{} is never split on", name);
        }
    }

    #[test]
    fn test_explain_is_deterministic() {
        let explainer = TreeExplainer::for_model(demo_model());
        let features = FeatureVector::encode(&worn_reading()).unwrap();
        assert_eq!(explainer.explain(&features), explainer.explain(&features));
    }

    #[test]
    fn test_spec_expected_value_checked() {
        let spec: ExplainerSpec =
            serde_json::from_str(include_str!("../../../models/explainer.json")).unwrap();
        let explainer = TreeExplainer::new(&spec, demo_model()).unwrap();
        assert!((explainer.expected_value() - -2.37875).abs() < 1e-9);

        let stale = ExplainerSpec {
            expected_value: Some(0.0),
            ..spec
        };
        assert!(matches!(
            TreeExplainer::new(&stale, demo_model()),
            Err(InferenceError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let result: Result<ExplainerSpec, _> =
            serde_json::from_str(r#"{"algorithm":"interventional","model_output":"raw"}"#);
        assert!(result.is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_additivity_holds(
            rot in 1100.0f64..2900.0,
            torque in 3.0f64..80.0,
            wear in 0.0f64..260.0,
            air in 295.0f64..305.0,
            l in any::<bool>(),
        ) {
            let model = demo_model();
            let reading = MachineReading {
                air_temperature_k: air,
                process_temperature_k: air + 10.0,
                rotational_speed_rpm: rot,
                torque_nm: torque,
                tool_wear_min: wear,
                machine_type: if l { MachineType::L } else { MachineType::H },
            };
            let features = FeatureVector::encode(&reading).unwrap();
            let explanation = TreeExplainer::for_model(model).explain(&features);
            prop_assert!(
                (explanation.base_value + explanation.total_shap() - explanation.output_value).abs() < 1e-9
            );
        }
    }
}
