//! Regression Trees
//!
//! Trees are stored as flat node arrays indexed by node id, the layout
//! produced by XGBoost's JSON tree dump with statistics enabled.

use crate::InferenceError;
use feature_engine::FEATURE_DIMENSION;
use serde::{Deserialize, Serialize};

/// Node as it appears in the model file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNode {
    pub id: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf: Option<f64>,
    pub cover: f64,
}

/// Tree as it appears in the model file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTree {
    pub nodes: Vec<RawNode>,
}

/// Validated tree node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    /// Internal split: `x[feature] < threshold` goes to `yes`
    Split {
        feature: usize,
        threshold: f64,
        yes: usize,
        no: usize,
        missing: usize,
        cover: f64,
    },
    /// Terminal node holding a margin contribution
    Leaf { value: f64, cover: f64 },
}

impl Node {
    /// Training hessian mass that reached this node
    pub fn cover(&self) -> f64 {
        match *self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => cover,
        }
    }
}

/// Validated regression tree
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Validate a raw tree: dense ids, children after parents, non-negative
    /// covers with a positive cover on every split
    pub fn from_raw(index: usize, raw: RawTree) -> Result<Self, InferenceError> {
        let invalid = |msg: String| InferenceError::InvalidModel(format!("tree {}: {}", index, msg));

        let mut raw_nodes = raw.nodes;
        if raw_nodes.is_empty() {
            return Err(invalid("no nodes".to_string()));
        }
        raw_nodes.sort_by_key(|n| n.id);

        let count = raw_nodes.len();
        let mut nodes = Vec::with_capacity(count);

        for (position, raw) in raw_nodes.into_iter().enumerate() {
            if raw.id != position {
                return Err(invalid(format!("node ids must be dense from 0, missing id {}", position)));
            }
            if !raw.cover.is_finite() || raw.cover < 0.0 {
                return Err(invalid(format!("node {} has invalid cover {}", raw.id, raw.cover)));
            }

            let child = |name: &str, id: Option<usize>| -> Result<usize, InferenceError> {
                let id = id.ok_or_else(|| invalid(format!("split node {} has no '{}' child", raw.id, name)))?;
                // Children after parents rules out cycles
                if id <= raw.id || id >= count {
                    return Err(invalid(format!("node {} has invalid '{}' child {}", raw.id, name, id)));
                }
                Ok(id)
            };

            let node = match (raw.leaf, raw.feature) {
                (Some(value), None) => {
                    if !value.is_finite() {
                        return Err(invalid(format!("leaf {} has non-finite value", raw.id)));
                    }
                    Node::Leaf { value, cover: raw.cover }
                }
                (None, Some(feature)) => {
                    if feature >= FEATURE_DIMENSION {
                        return Err(invalid(format!("node {} splits on unknown feature {}", raw.id, feature)));
                    }
                    let threshold = raw
                        .threshold
                        .filter(|t| !t.is_nan())
                        .ok_or_else(|| invalid(format!("split node {} has no threshold", raw.id)))?;
                    if raw.cover <= 0.0 {
                        return Err(invalid(format!("split node {} has zero cover", raw.id)));
                    }
                    let yes = child("yes", raw.yes)?;
                    let no = child("no", raw.no)?;
                    let missing = child("missing", raw.missing.or(raw.yes))?;
                    if missing != yes && missing != no {
                        return Err(invalid(format!(
                            "node {} sends missing values to {}, which is neither child",
                            raw.id, missing
                        )));
                    }
                    Node::Split { feature, threshold, yes, no, missing, cover: raw.cover }
                }
                _ => {
                    return Err(invalid(format!(
                        "node {} must be either a leaf or a split",
                        raw.id
                    )))
                }
            };
            nodes.push(node);
        }

        Ok(Self { nodes })
    }

    /// Node by id
    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    /// Root node id
    pub fn root(&self) -> usize {
        0
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes (never true for a validated tree)
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Maximum root-to-leaf depth, counted in edges
    pub fn depth(&self) -> usize {
        self.depth_from(self.root())
    }

    fn depth_from(&self, id: usize) -> usize {
        match self.nodes[id] {
            Node::Leaf { .. } => 0,
            Node::Split { yes, no, .. } => 1 + self.depth_from(yes).max(self.depth_from(no)),
        }
    }

    /// Child taken by `x` at a split node
    pub fn next(&self, id: usize, x: &[f64]) -> Option<usize> {
        match self.nodes[id] {
            Node::Leaf { .. } => None,
            Node::Split { feature, threshold, yes, no, missing, .. } => {
                let value = x[feature];
                Some(if value.is_nan() {
                    missing
                } else if value < threshold {
                    yes
                } else {
                    no
                })
            }
        }
    }

    /// Leaf value reached by `x`
    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut id = self.root();
        loop {
            match self.nodes[id] {
                Node::Leaf { value, .. } => return value,
                Node::Split { .. } => {
                    // Split nodes always have a successor
                    id = self.next(id, x).unwrap_or(id);
                }
            }
        }
    }

    /// Cover-weighted mean leaf value
    pub fn expected_value(&self) -> f64 {
        self.expected_from(self.root())
    }

    fn expected_from(&self, id: usize) -> f64 {
        match self.nodes[id] {
            Node::Leaf { value, .. } => value,
            Node::Split { yes, no, cover, .. } => {
                let yes_fraction = self.nodes[yes].cover() / cover;
                let no_fraction = self.nodes[no].cover() / cover;
                yes_fraction * self.expected_from(yes) + no_fraction * self.expected_from(no)
            }
        }
    }
}
