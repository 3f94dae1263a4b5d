//! Engine configuration.
//!
//! Every field has a default so hosts can supply a partial JSON document.

use crate::history::Operation;
use crate::resolution::DEFAULT_TARGET_SIZE;
use crate::shapes::SerializableColor;
use kurbo::Size;
use serde::{Deserialize, Serialize};

/// History recording policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// Maximum number of entries kept; the oldest are dropped first.
    pub max_size: usize,
    /// Same-tag operations closer together than this fold into one entry.
    pub merge_interval_ms: u64,
    /// After this many merges into one entry, the next operation starts a new one.
    pub force_snapshot_every: usize,
    /// Operations that may merge into the previous entry.
    pub mergeable: Vec<Operation>,
    /// Operations that always start a new entry.
    pub always_snapshot: Vec<Operation>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 100,
            merge_interval_ms: 1000,
            force_snapshot_every: 25,
            mergeable: vec![
                Operation::UpdateElements,
                Operation::UpdateSelection,
                Operation::ChangeMode,
                Operation::UpdateLayer,
                Operation::Label,
            ],
            always_snapshot: vec![
                Operation::DeleteElements,
                Operation::ClearAll,
                Operation::DeleteLayer,
                Operation::LoadDocument,
            ],
        }
    }
}

/// Layer system settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub enabled: bool,
    pub max_layers: usize,
    pub default_layer_name: String,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_layers: 20,
            default_layer_name: "Layer 1".to_string(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Processing resolution all geometry is stored in.
    pub target_resolution: Size,
    pub history: HistoryConfig,
    pub layers: LayerConfig,
    /// Element hit radius in display pixels.
    pub hit_tolerance: f64,
    /// Handle hit radius in display pixels.
    pub handle_tolerance: f64,
    /// Half length of a detection gate in target pixels.
    pub gate_half_length: f64,
    /// Offset applied to each successive paste, in target pixels.
    pub paste_offset: f64,
    /// Closer clicks are ignored while drawing multi-point elements (target pixels).
    pub min_point_distance: f64,
    pub max_listeners: usize,
    pub default_color: SerializableColor,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_resolution: DEFAULT_TARGET_SIZE,
            history: HistoryConfig::default(),
            layers: LayerConfig::default(),
            hit_tolerance: 8.0,
            handle_tolerance: 10.0,
            gate_half_length: 25.0,
            paste_offset: 20.0,
            min_point_distance: 2.0,
            max_listeners: 64,
            default_color: SerializableColor::annotation(),
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the configuration to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{ "history": { "max_size": 5 }, "paste_offset": 4.0 }"#).unwrap();
        assert_eq!(config.history.max_size, 5);
        assert_eq!(config.history.merge_interval_ms, 1000);
        assert!((config.paste_offset - 4.0).abs() < f64::EPSILON);
        assert_eq!(config.layers, LayerConfig::default());
    }

    #[test]
    fn test_roundtrip() {
        let config = EngineConfig::default();
        let parsed = EngineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_add_never_configured_as_mergeable() {
        let config = HistoryConfig::default();
        assert!(!config.mergeable.contains(&Operation::AddElements));
    }
}
