use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use panelkit::{ChartRender, PanelController, SchemaDocument};
use serde_json::json;

fn chart_document() -> SchemaDocument {
    SchemaDocument::from_value(json!({
        "schemaVersion": "1.0.0",
        "controller": {
            "name": "motor",
            "items": [
                {"kind": "chartset", "id": "cs", "charts": [
                    {"id": "speed_graph", "title": "Speed", "lineDefs": [
                        {"id": "teor", "kind": "formula_curve", "formula": "a*x",
                         "displayName": "Theoretical",
                         "params": {"a": 10.0},
                         "xRange": {"min": -2.0, "max": 2.0},
                         "drawOrder": 1},
                        {"id": "prakt", "kind": "realtime_series",
                         "displayName": "Measured", "roundPrecision": 0.5},
                        {"id": "limit", "kind": "static_marker",
                         "displayName": "Limit", "params": {"x": 1.5}}
                    ]},
                    {"id": "torque_graph", "title": "Torque", "lineDefs": [
                        {"id": "rt", "kind": "realtime_series"}
                    ]}
                ]}
            ]
        }
    }))
    .unwrap()
}

fn mounted() -> PanelController {
    let mut panel = PanelController::new(chart_document());
    panel.mount("root");
    panel
}

fn dataset<'a>(render: &'a ChartRender, id: &str) -> &'a panelkit::Dataset {
    render
        .datasets
        .iter()
        .find(|d| d.line_id == id)
        .unwrap_or_else(|| panic!("no dataset {id}"))
}

#[test]
fn formula_curve_is_evaluated_at_declaration() {
    let panel = mounted();
    let render = panel.chart_render("speed_graph").unwrap();
    assert_eq!(
        dataset(&render, "teor").points,
        vec![[-2.0, -20.0], [-1.0, -10.0], [0.0, 0.0], [1.0, 10.0], [2.0, 20.0]]
    );
    assert_eq!(dataset(&render, "teor").label, "Theoretical");
}

#[test]
fn formula_parameters_update_the_cached_series() {
    let panel = mounted();
    panel.update_chart_formula_params(
        "speed_graph",
        "teor",
        &HashMap::from([("a".to_string(), 5.0)]),
    );
    let render = panel.chart_render("speed_graph").unwrap();
    assert_eq!(
        dataset(&render, "teor").points,
        vec![[-2.0, -10.0], [-1.0, -5.0], [0.0, 0.0], [1.0, 5.0], [2.0, 10.0]]
    );
}

#[test]
fn realtime_points_snap_to_the_precision_grid() {
    let panel = mounted();
    // precision 0.5: 1.24 and 1.26 land in different buckets
    panel.update_chart_line_data("speed_graph", "prakt", [1.24, 3.0]);
    panel.update_chart_line_data("speed_graph", "prakt", [1.26, 4.0]);
    // 0.8 and 0.9 share the 1.0 bucket; the later write wins
    panel.update_chart_line_data("speed_graph", "prakt", [0.8, 9.0]);
    panel.update_chart_line_data("speed_graph", "prakt", [0.9, 11.0]);
    let render = panel.chart_render("speed_graph").unwrap();
    assert_eq!(
        dataset(&render, "prakt").points,
        vec![[1.0, 11.0], [1.5, 4.0]]
    );
}

#[test]
fn marker_renders_as_an_annotation_not_a_dataset() {
    let panel = mounted();
    let render = panel.chart_render("speed_graph").unwrap();
    assert!(render.datasets.iter().all(|d| d.line_id != "limit"));
    assert_eq!(render.annotations.len(), 1);
    assert_eq!(render.annotations[0].key, "marker-0");
    assert_eq!(render.annotations[0].x, 1.5);
    assert_eq!(render.annotations[0].label, "Limit");
}

#[test]
fn hiding_a_line_repartitions_immediately() {
    let panel = mounted();
    panel.update_chart_line_data("speed_graph", "prakt", [0.0, 1.0]);
    panel.set_chart_line_visibility("speed_graph", "prakt", false);
    let render = panel.chart_render("speed_graph").unwrap();
    assert!(render.datasets.iter().all(|d| d.line_id != "prakt"));

    panel.set_chart_line_visibility("speed_graph", "prakt", true);
    let render = panel.chart_render("speed_graph").unwrap();
    assert_eq!(dataset(&render, "prakt").points, vec![[0.0, 1.0]], "buffer survives hiding");
}

#[test]
fn a_burst_of_mutations_yields_one_render_per_chart() {
    let mut panel = mounted();
    panel.on_frame(Instant::now());

    for i in 0..100 {
        panel.update_chart_line_data("torque_graph", "rt", [i as f64, i as f64]);
    }
    panel.update_chart_line_data("speed_graph", "prakt", [0.0, 0.0]);

    let renders = panel.on_frame(Instant::now());
    assert_eq!(renders.len(), 2);
    // first-dirtied order
    assert_eq!(renders[0].chart_id, "torque_graph");
    assert_eq!(renders[1].chart_id, "speed_graph");
    assert!(panel.on_frame(Instant::now()).is_empty());
}

#[test]
fn redraw_observer_fires_once_per_dirty_chart() {
    let mut panel = mounted();
    panel.on_frame(Instant::now());
    let seen = Rc::new(RefCell::new(Vec::new()));
    {
        let seen = seen.clone();
        panel
            .chart_engine()
            .borrow_mut()
            .set_redraw_observer(move |id, _| seen.borrow_mut().push(id.to_string()));
    }
    for _ in 0..10 {
        panel.update_chart_line_data("torque_graph", "rt", [1.0, 1.0]);
    }
    panel.on_frame(Instant::now());
    assert_eq!(*seen.borrow(), vec!["torque_graph"]);
}

#[test]
fn draw_order_sorts_datasets_back_to_front() {
    let panel = mounted();
    panel.update_chart_line_data("speed_graph", "prakt", [0.0, 0.0]);
    let render = panel.chart_render("speed_graph").unwrap();
    // prakt has no drawOrder (0), teor has drawOrder 1
    let order: Vec<&str> = render.datasets.iter().map(|d| d.line_id.as_str()).collect();
    assert_eq!(order, vec!["prakt", "teor"]);
}

#[test]
fn unmount_removes_declared_charts() {
    let mut panel = mounted();
    panel.unmount();
    assert!(panel.chart_render("speed_graph").is_none());
    assert!(panel.chart_render("torque_graph").is_none());
    // late feeds are ignored
    panel.update_chart_line_data("speed_graph", "prakt", [0.0, 0.0]);
}
