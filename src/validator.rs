//! Structural and version validation of a schema document.
//!
//! Validation collects every problem it finds instead of stopping at the
//! first one; the findings are reported once, and construction proceeds
//! best-effort afterwards so a partially broken schema still yields a
//! usable (if incomplete) panel.

use std::collections::HashSet;

use thiserror::Error;
use tracing::error;

use crate::schema::{
    GroupItemSchema, ItemSchema, LineDef, LineDefKind, SchemaDocument,
};

/// Schema versions this crate understands.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0.0"];

/// A structural problem found in a schema document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("schema document has no schemaVersion")]
    MissingVersion,
    #[error("schema version `{0}` is not supported (supported: {supported})", supported = SUPPORTED_VERSIONS.join(", "))]
    UnsupportedVersion(String),
    #[error("controller has no name")]
    MissingControllerName,
    #[error("{path} has no id")]
    MissingId { path: String },
    #[error("duplicate element id `{id}` at {path}")]
    DuplicateId { id: String, path: String },
    #[error("formula line `{line}` in chart `{chart}` has no formula")]
    MissingFormula { chart: String, line: String },
    #[error("formula line `{line}` in chart `{chart}` has no xRange")]
    MissingXRange { chart: String, line: String },
    #[error("line `{line}` in chart `{chart}` has an inverted xRange")]
    InvertedXRange { chart: String, line: String },
    #[error("line `{line}` in chart `{chart}` has a non-positive roundPrecision")]
    InvalidPrecision { chart: String, line: String },
}

/// Validate a document, returning every problem found (empty = valid).
pub fn validate(doc: &SchemaDocument) -> Vec<SchemaError> {
    let mut errors = Vec::new();
    let mut ids = HashSet::new();

    if doc.schema_version.is_empty() {
        errors.push(SchemaError::MissingVersion);
    } else if !SUPPORTED_VERSIONS.contains(&doc.schema_version.as_str()) {
        errors.push(SchemaError::UnsupportedVersion(doc.schema_version.clone()));
    }

    if doc.controller.name.is_empty() {
        errors.push(SchemaError::MissingControllerName);
    }

    let mut check_id = |id: &str, path: String, errors: &mut Vec<SchemaError>| {
        if id.is_empty() {
            errors.push(SchemaError::MissingId { path });
        } else if !ids.insert(id.to_string()) {
            errors.push(SchemaError::DuplicateId {
                id: id.to_string(),
                path,
            });
        }
    };

    for (i, item) in doc.controller.items.iter().enumerate() {
        match item {
            ItemSchema::Tabset(ts) => {
                check_id(&ts.id, format!("items[{i}]"), &mut errors);
                for (t, tab) in ts.tabs.iter().enumerate() {
                    check_id(&tab.id, format!("items[{i}].tabs[{t}]"), &mut errors);
                    for (g, group) in tab.groups.iter().enumerate() {
                        let gpath = format!("items[{i}].tabs[{t}].groups[{g}]");
                        check_id(&group.id, gpath.clone(), &mut errors);
                        for (n, leaf) in group.items.iter().enumerate() {
                            match leaf {
                                GroupItemSchema::Parameter(p) => check_id(
                                    &p.param_id,
                                    format!("{gpath}.items[{n}]"),
                                    &mut errors,
                                ),
                                GroupItemSchema::Command(c) => check_id(
                                    &c.command_id,
                                    format!("{gpath}.items[{n}]"),
                                    &mut errors,
                                ),
                                GroupItemSchema::Unknown => {}
                            }
                        }
                    }
                }
            }
            ItemSchema::Chartset(cs) => {
                check_id(&cs.id, format!("items[{i}]"), &mut errors);
                for (c, chart) in cs.charts.iter().enumerate() {
                    check_id(&chart.id, format!("items[{i}].charts[{c}]"), &mut errors);
                    for def in &chart.line_defs {
                        validate_line(&chart.id, def, &mut errors);
                    }
                }
            }
            ItemSchema::Unknown => {}
        }
    }

    errors
}

fn validate_line(chart: &str, def: &LineDef, errors: &mut Vec<SchemaError>) {
    if def.id.is_empty() {
        errors.push(SchemaError::MissingId {
            path: format!("chart `{chart}` lineDefs"),
        });
        return;
    }
    match def.kind {
        LineDefKind::FormulaCurve => {
            if def.formula.as_deref().unwrap_or("").is_empty() {
                errors.push(SchemaError::MissingFormula {
                    chart: chart.to_string(),
                    line: def.id.clone(),
                });
            }
            match def.x_range {
                None => errors.push(SchemaError::MissingXRange {
                    chart: chart.to_string(),
                    line: def.id.clone(),
                }),
                Some(r) if r.min > r.max => errors.push(SchemaError::InvertedXRange {
                    chart: chart.to_string(),
                    line: def.id.clone(),
                }),
                Some(_) => {}
            }
        }
        LineDefKind::RealtimeSeries => {
            if let Some(p) = def.round_precision {
                if !(p.is_finite() && p > 0.0) {
                    errors.push(SchemaError::InvalidPrecision {
                        chart: chart.to_string(),
                        line: def.id.clone(),
                    });
                }
            }
        }
        LineDefKind::StaticMarker | LineDefKind::Unknown => {}
    }
}

/// Validate and log every finding once. Returns the findings.
pub fn validate_and_report(doc: &SchemaDocument) -> Vec<SchemaError> {
    let errors = validate(doc);
    for e in &errors {
        error!(controller = %doc.controller.name, "schema validation: {e}");
    }
    errors
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> SchemaDocument {
        SchemaDocument::from_value(v).unwrap()
    }

    #[test]
    fn accepts_a_well_formed_document() {
        let d = doc(json!({
            "schemaVersion": "1.0.0",
            "controller": {"name": "c", "items": [
                {"kind": "tabset", "id": "main", "tabs": [
                    {"id": "t", "title": "T", "groups": [
                        {"id": "g", "title": "G", "items": [
                            {"kind": "parameter", "paramId": "p", "displayName": "P",
                             "inputKind": "number"}
                        ]}
                    ]}
                ]}
            ]}
        }));
        assert!(validate(&d).is_empty());
    }

    #[test]
    fn flags_missing_and_unsupported_versions() {
        let d = doc(json!({"controller": {"name": "c"}}));
        assert!(validate(&d).contains(&SchemaError::MissingVersion));

        let d = doc(json!({"schemaVersion": "9.9.9", "controller": {"name": "c"}}));
        assert!(validate(&d)
            .iter()
            .any(|e| matches!(e, SchemaError::UnsupportedVersion(v) if v == "9.9.9")));
    }

    #[test]
    fn flags_duplicate_ids_across_the_tree() {
        let d = doc(json!({
            "schemaVersion": "1.0.0",
            "controller": {"name": "c", "items": [
                {"kind": "tabset", "id": "main", "tabs": [
                    {"id": "t", "title": "T", "groups": [
                        {"id": "g", "title": "G", "items": [
                            {"kind": "parameter", "paramId": "speed",
                             "displayName": "A", "inputKind": "number"},
                            {"kind": "command", "commandId": "speed",
                             "displayName": "B"}
                        ]}
                    ]}
                ]}
            ]}
        }));
        assert!(validate(&d)
            .iter()
            .any(|e| matches!(e, SchemaError::DuplicateId { id, .. } if id == "speed")));
    }

    #[test]
    fn flags_broken_line_definitions() {
        let d = doc(json!({
            "schemaVersion": "1.0.0",
            "controller": {"name": "c", "items": [
                {"kind": "chartset", "id": "cs", "charts": [
                    {"id": "graph", "title": "G", "lineDefs": [
                        {"id": "f1", "kind": "formula_curve"},
                        {"id": "f2", "kind": "formula_curve", "formula": "x",
                         "xRange": {"min": 5.0, "max": -5.0}},
                        {"id": "rt", "kind": "realtime_series", "roundPrecision": 0.0}
                    ]}
                ]}
            ]}
        }));
        let errors = validate(&d);
        assert!(errors.iter().any(|e| matches!(e, SchemaError::MissingFormula { line, .. } if line == "f1")));
        assert!(errors.iter().any(|e| matches!(e, SchemaError::MissingXRange { line, .. } if line == "f1")));
        assert!(errors.iter().any(|e| matches!(e, SchemaError::InvertedXRange { line, .. } if line == "f2")));
        assert!(errors.iter().any(|e| matches!(e, SchemaError::InvalidPrecision { line, .. } if line == "rt")));
    }
}
