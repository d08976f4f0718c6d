//! Serde model of the versioned panel schema document.
//!
//! The document is read once at construction and treated as immutable.
//! Parsing is deliberately lenient: unknown element kinds and input kinds
//! deserialize into `Unknown` variants instead of failing the whole
//! document, so a malformed fragment degrades to a missing widget rather
//! than aborting the tree. Structural problems are reported separately by
//! the validator.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level schema document: `{ schemaVersion, controller: {...} }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDocument {
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub controller: ControllerSchema,
}

impl SchemaDocument {
    /// Parse a document from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Parse a document from an already-decoded JSON value.
    pub fn from_value(v: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(v)
    }
}

/// Horizontal or vertical arrangement of the top-level items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Row,
    Column,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSchema {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub layout: Layout,
    /// Whether the controller headline is shown. Absent means `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_visible: Option<bool>,
    #[serde(default)]
    pub items: Vec<ItemSchema>,
}

/// One top-level item: a tab-set container or a chart-set container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ItemSchema {
    Tabset(TabSetSchema),
    Chartset(ChartSetSchema),
    /// Any kind this version does not understand; the factory skips it
    /// with a warning.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSetSchema {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    /// CSS-like width hint forwarded to the presentation layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(default)]
    pub tabs: Vec<TabSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSchema {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default)]
    pub groups: Vec<GroupSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSchema {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default)]
    pub items: Vec<GroupItemSchema>,
}

/// A leaf inside a group: a parameter input or a command button.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GroupItemSchema {
    Parameter(ParameterSchema),
    Command(CommandSchema),
    #[serde(other)]
    Unknown,
}

/// The input widget a parameter is presented as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Number,
    Readonly,
    Flags,
    Slider,
    Select,
    Radio,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSchema {
    #[serde(default)]
    pub param_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub input_kind: InputKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub props: ParamProps,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamProps {
    /// Initial value; interpreted per input kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Bit position → label, for `flags` inputs (32-bit mask).
    #[serde(
        default,
        deserialize_with = "deserialize_bits",
        skip_serializing_if = "Option::is_none"
    )]
    pub bits: Option<BTreeMap<u8, String>>,
    /// Choices for `select`/`radio` inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<ChoiceOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// For sliders: show the numeric value next to the handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_value_display: Option<bool>,
}

/// JSON object keys are always strings; parse them into bit positions.
/// Needed because the internally tagged item enums buffer their content,
/// and the replayed string keys do not coerce to integers on their own.
fn deserialize_bits<'de, D>(deserializer: D) -> Result<Option<BTreeMap<u8, String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, String>> = Option::deserialize(deserializer)?;
    raw.map(|map| {
        map.into_iter()
            .map(|(key, label)| {
                key.parse::<u8>()
                    .map(|bit| (bit, label))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    })
    .transpose()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceOption {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ChoiceOption {
    /// Label shown in the UI; falls back to the raw value.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.value)
    }
}

/// Press behaviour of a command button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandBehavior {
    #[default]
    Momentary,
    Toggle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSchema {
    #[serde(default)]
    pub command_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub props: CommandProps,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandProps {
    #[serde(default)]
    pub behavior: CommandBehavior,
    /// Label while a toggle command is in the active state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name_active: Option<String>,
    /// Label while the transient clicked presentation is shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name_clicked: Option<String>,
    /// Revert the clicked presentation automatically after
    /// `reset_duration_ms` even without a release.
    #[serde(default)]
    pub auto_reset: bool,
    #[serde(default = "default_reset_duration_ms")]
    pub reset_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_active: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_clicked: Option<String>,
}

fn default_reset_duration_ms() -> u64 {
    200
}

impl Default for CommandProps {
    fn default() -> Self {
        Self {
            behavior: CommandBehavior::default(),
            display_name_active: None,
            display_name_clicked: None,
            auto_reset: false,
            reset_duration_ms: default_reset_duration_ms(),
            tooltip: None,
            style: None,
            style_active: None,
            style_clicked: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSetSchema {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(default)]
    pub charts: Vec<ChartSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSchema {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Whether the chart title is rendered. Absent means `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default)]
    pub line_defs: Vec<LineDef>,
}

/// Kind tag of a chart line definition; drives its update semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineDefKind {
    /// Fixed vertical marker rendered as an overlay annotation.
    StaticMarker,
    /// Curve evaluated from a formula over a declared X range.
    FormulaCurve,
    /// Series fed by live samples through the quantized buffer.
    RealtimeSeries,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub kind: LineDefKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Named numeric parameters. Formula curves feed these into the
    /// evaluator scope; static markers read their `x` position from here.
    #[serde(default)]
    pub params: HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_range: Option<XRange>,
    /// Opaque style bag forwarded unchanged to the charting library.
    #[serde(default)]
    pub style: Value,
    /// Quantization step for incoming real-time X coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_precision: Option<f64>,
    /// Lower values render beneath higher ones; absent preserves
    /// declaration order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
}

impl LineDef {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_minimal_document() {
        let doc = SchemaDocument::from_value(json!({
            "schemaVersion": "1.0.0",
            "controller": {
                "name": "pump",
                "displayName": "Pump station",
                "items": [
                    {"kind": "tabset", "id": "main", "tabs": [
                        {"id": "t1", "title": "Main", "groups": [
                            {"id": "g1", "title": "Drive", "items": [
                                {"kind": "parameter", "paramId": "speed",
                                 "displayName": "Speed", "inputKind": "number",
                                 "props": {"default": 1500, "min": 0, "max": 3000}},
                                {"kind": "command", "commandId": "start",
                                 "displayName": "Start",
                                 "props": {"behavior": "toggle"}}
                            ]}
                        ]}
                    ]},
                    {"kind": "chartset", "id": "charts", "charts": [
                        {"id": "graph", "title": "Speed", "lineDefs": [
                            {"id": "teor", "kind": "formula_curve", "formula": "a*x",
                             "params": {"a": 10.0}, "xRange": {"min": -2.0, "max": 2.0}},
                            {"id": "prakt", "kind": "realtime_series", "roundPrecision": 1.0},
                            {"id": "limit", "kind": "static_marker", "params": {"x": 1.5}}
                        ]}
                    ]}
                ]
            }
        }))
        .unwrap();

        assert_eq!(doc.schema_version, "1.0.0");
        assert_eq!(doc.controller.name, "pump");
        assert_eq!(doc.controller.items.len(), 2);
        match &doc.controller.items[0] {
            ItemSchema::Tabset(ts) => {
                let item = &ts.tabs[0].groups[0].items[0];
                match item {
                    GroupItemSchema::Parameter(p) => {
                        assert_eq!(p.param_id, "speed");
                        assert_eq!(p.input_kind, InputKind::Number);
                        assert_eq!(p.props.default, Some(json!(1500)));
                    }
                    other => panic!("expected parameter, got {other:?}"),
                }
            }
            other => panic!("expected tabset, got {other:?}"),
        }
        match &doc.controller.items[1] {
            ItemSchema::Chartset(cs) => {
                let defs = &cs.charts[0].line_defs;
                assert_eq!(defs[0].kind, LineDefKind::FormulaCurve);
                assert_eq!(defs[1].kind, LineDefKind::RealtimeSeries);
                assert_eq!(defs[2].kind, LineDefKind::StaticMarker);
            }
            other => panic!("expected chartset, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kinds_degrade_instead_of_failing() {
        let doc = SchemaDocument::from_value(json!({
            "schemaVersion": "1.0.0",
            "controller": {
                "name": "c",
                "items": [
                    {"kind": "hologram", "id": "x"},
                    {"kind": "tabset", "id": "main", "tabs": [
                        {"id": "t", "title": "T", "groups": [
                            {"id": "g", "title": "G", "items": [
                                {"kind": "widget3000", "id": "weird"}
                            ]}
                        ]}
                    ]}
                ]
            }
        }))
        .unwrap();
        assert!(matches!(doc.controller.items[0], ItemSchema::Unknown));
        match &doc.controller.items[1] {
            ItemSchema::Tabset(ts) => {
                assert!(matches!(
                    ts.tabs[0].groups[0].items[0],
                    GroupItemSchema::Unknown
                ));
            }
            other => panic!("expected tabset, got {other:?}"),
        }
    }

    #[test]
    fn flags_bits_use_integer_keys() {
        let p: ParameterSchema = serde_json::from_value(json!({
            "paramId": "status",
            "displayName": "Status",
            "inputKind": "flags",
            "props": {"bits": {"0": "Ready", "3": "Fault"}}
        }))
        .unwrap();
        let bits = p.props.bits.unwrap();
        assert_eq!(bits.get(&0).map(String::as_str), Some("Ready"));
        assert_eq!(bits.get(&3).map(String::as_str), Some("Fault"));
    }
}
