//! Serialized rack state.
//!
//! A [`StateTree`] is the hierarchical, named-node form of a rack: one
//! [`InstanceNode`] per instance in signal order, each carrying its module type,
//! instance index, bypass flag and ordered `parameter id → value` pairs.
//!
//! The format tolerates unknown extra fields (ignored) and missing optional
//! fields (defaulted), and serializes identically for identical racks, so the
//! same tree can be stored as TOML by the settings cache or as JSON by a
//! foreign host.
//!
//! ```toml
//! version = 1
//!
//! [[instances]]
//! type = "equalizer"
//! index = 0
//! bypassed = false
//! params = [
//!     { id = "low_gain", value = 3.0 },
//! ]
//! ```

use rackhost_core::SetupError;
use serde::{Deserialize, Serialize};

/// Current [`StateTree::version`].
pub const STATE_VERSION: u32 = 1;

/// Serialized form of a whole rack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTree {
    /// Format version the tree was written with.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Instances in signal order.
    #[serde(default)]
    pub instances: Vec<InstanceNode>,
}

impl Default for StateTree {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            instances: Vec::new(),
        }
    }
}

fn default_version() -> u32 {
    STATE_VERSION
}

/// One instance of a [`StateTree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceNode {
    /// Module type id.
    #[serde(rename = "type")]
    pub type_id: String,
    /// Per-type instance index the instance held.
    #[serde(default)]
    pub index: usize,
    /// Whether processing was bypassed.
    #[serde(default)]
    pub bypassed: bool,
    /// Parameter values in declaration order.
    #[serde(default)]
    pub params: Vec<ParamValue>,
}

impl InstanceNode {
    /// A node with no parameters.
    pub fn new(type_id: impl Into<String>, index: usize) -> Self {
        Self {
            type_id: type_id.into(),
            index,
            bypassed: false,
            params: Vec::new(),
        }
    }

    /// Value stored for parameter `id`, if any.
    pub fn param(&self, id: &str) -> Option<f32> {
        self.params.iter().find(|p| p.id == id).map(|p| p.value)
    }
}

/// A `parameter id → value` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamValue {
    /// Stable parameter string id.
    pub id: String,
    /// Plain (denormalized) value.
    pub value: f32,
}

/// Something [`restore`](crate::RackController::restore) could not apply
/// exactly as written.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RestoreWarning {
    /// No module type with this id is registered; kept as a placeholder.
    #[error("unknown module type '{type_id}', kept as placeholder")]
    UnknownType {
        /// Type id from the tree.
        type_id: String,
    },

    /// The type had no free instance index; kept as a placeholder.
    #[error("no free instance of '{type_id}', kept as placeholder")]
    OverCapacity {
        /// Type id from the tree.
        type_id: String,
    },

    /// The instance was recreated but could not prepare; it is parked.
    #[error("instance {index} of '{type_id}' failed setup: {error}")]
    SetupFailed {
        /// Type id from the tree.
        type_id: String,
        /// Instance index assigned.
        index: usize,
        /// What the module reported.
        error: SetupError,
    },

    /// A stored parameter id is not declared by the module type; ignored.
    #[error("'{type_id}' has no parameter '{param}'")]
    UnknownParam {
        /// Type id from the tree.
        type_id: String,
        /// Parameter id from the tree.
        param: String,
    },
}

/// Outcome of a successful restore.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    /// Instances recreated, including placeholders.
    pub instances: usize,
    /// Everything not applied verbatim.
    pub warnings: Vec<RestoreWarning>,
}

impl RestoreReport {
    /// Returns `true` if the tree was applied without warnings.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default() {
        let tree: StateTree = serde_json::from_str(r#"{"instances":[{"type":"gain"}]}"#).unwrap();
        assert_eq!(tree.version, STATE_VERSION);
        assert_eq!(tree.instances[0], InstanceNode::new("gain", 0));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{
            "version": 1,
            "future_routing": {"graph": true},
            "instances": [
                {"type": "delay", "index": 2, "colour": "red",
                 "params": [{"id": "mix", "value": 0.5, "curve": 3}]}
            ]
        }"#;
        let tree: StateTree = serde_json::from_str(json).unwrap();
        assert_eq!(tree.instances[0].index, 2);
        assert_eq!(tree.instances[0].param("mix"), Some(0.5));
    }

    #[test]
    fn toml_uses_type_key() {
        let mut node = InstanceNode::new("equalizer", 1);
        node.params.push(ParamValue {
            id: "low_gain".into(),
            value: 3.0,
        });
        let tree = StateTree {
            version: STATE_VERSION,
            instances: vec![node],
        };
        let text = toml::to_string(&tree).unwrap();
        assert!(text.contains("type = \"equalizer\""));
        let back: StateTree = toml::from_str(&text).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn warning_display() {
        let w = RestoreWarning::UnknownType {
            type_id: "reverb".into(),
        };
        assert_eq!(
            w.to_string(),
            "unknown module type 'reverb', kept as placeholder"
        );
    }
}
