//! Chart line aggregation engine.
//!
//! Charts are declared once from the schema and then fed through three
//! kinds of lines with different update semantics:
//!
//! - static markers: a fixed vertical position rendered as an annotation,
//! - formula curves: recomputed only when their parameters change,
//! - real-time series: live samples accumulated in a quantized buffer.
//!
//! Incoming real-time X coordinates are snapped to the line's
//! `roundPrecision` grid; a sample landing on an occupied bucket replaces
//! the previous one, so a re-sent point updates the line instead of growing
//! it. Mutations mark the owning chart dirty; [`ChartEngine::on_frame`]
//! renders each dirty chart exactly once per frame no matter how many
//! mutations arrived in between.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::{debug, warn};

use crate::eval::Evaluator;
use crate::sched::FrameScheduler;
use crate::schema::{ChartSchema, LineDef, LineDefKind};

/// Step between evaluation points of a formula curve.
const FORMULA_STEP: f64 = 1.0;

/// One or many points pushed into a real-time series.
#[derive(Debug, Clone, PartialEq)]
pub enum LinePoints {
    /// Append/update a single `[x, y]` sample.
    Single([f64; 2]),
    /// Discard the buffer and replace it with a full series.
    Replace(Vec<[f64; 2]>),
}

impl From<[f64; 2]> for LinePoints {
    fn from(p: [f64; 2]) -> Self {
        LinePoints::Single(p)
    }
}

impl From<Vec<[f64; 2]>> for LinePoints {
    fn from(points: Vec<[f64; 2]>) -> Self {
        LinePoints::Replace(points)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Render output
// ─────────────────────────────────────────────────────────────────────────────

/// Renderable snapshot of one chart, handed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRender {
    pub chart_id: String,
    pub title: String,
    pub title_visible: bool,
    /// Plot lines, ordered back-to-front.
    pub datasets: Vec<Dataset>,
    /// Vertical marker overlays.
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub line_id: String,
    pub label: String,
    pub points: Vec<[f64; 2]>,
    /// Opaque style bag from the schema, forwarded unchanged.
    pub style: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Stable key derived from the marker's position among the chart's
    /// markers, so a re-render replaces rather than duplicates it.
    pub key: String,
    pub x: f64,
    pub label: String,
    pub style: Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal line state
// ─────────────────────────────────────────────────────────────────────────────

enum LineKind {
    StaticMarker {
        x: f64,
    },
    FormulaCurve {
        /// Cached evaluation; refreshed only on parameter updates.
        series: Vec<[f64; 2]>,
    },
    RealtimeSeries {
        precision: f64,
        /// Quantized bucket → latest Y. Iteration yields ascending X.
        buffer: BTreeMap<i64, f64>,
    },
}

struct LineState {
    def: LineDef,
    visible: bool,
    kind: LineKind,
}

struct ChartState {
    schema: ChartSchema,
    lines: Vec<LineState>,
}

/// Snap an X coordinate to the line's precision grid.
fn quantize(x: f64, precision: f64) -> i64 {
    (x / precision).round() as i64
}

/// X coordinate a bucket renders at.
fn bucket_x(bucket: i64, precision: f64) -> f64 {
    bucket as f64 * precision
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

type RedrawObserver = Box<dyn FnMut(&str, &ChartRender)>;

/// Owns every declared chart and its line buffers.
pub struct ChartEngine {
    charts: Vec<ChartState>,
    evaluator: Box<dyn Evaluator>,
    dirty: FrameScheduler<String>,
    observer: Option<RedrawObserver>,
}

impl ChartEngine {
    pub fn new(evaluator: Box<dyn Evaluator>) -> Self {
        Self {
            charts: Vec::new(),
            evaluator,
            dirty: FrameScheduler::new(),
            observer: None,
        }
    }

    /// Called once per dirty chart from [`on_frame`](Self::on_frame) with
    /// the fresh render.
    pub fn set_redraw_observer<F>(&mut self, f: F)
    where
        F: FnMut(&str, &ChartRender) + 'static,
    {
        self.observer = Some(Box::new(f));
    }

    /// Declare a chart from its schema and mark it for an initial render.
    /// Formula curves are evaluated here; re-declaring an id replaces the
    /// previous chart with a warning.
    pub fn declare_chart(&mut self, schema: &ChartSchema) {
        if self.chart_index(&schema.id).is_some() {
            warn!(chart = %schema.id, "duplicate chart id; replacing previous chart");
            self.remove_chart(&schema.id);
        }
        let lines = schema
            .line_defs
            .iter()
            .map(|def| self.build_line(&schema.id, def))
            .collect();
        self.charts.push(ChartState {
            schema: schema.clone(),
            lines,
        });
        self.dirty.mark(schema.id.clone());
        debug!(chart = %schema.id, lines = schema.line_defs.len(), "chart declared");
    }

    /// Remove a chart and everything it buffered. Unknown ids are a no-op.
    pub fn remove_chart(&mut self, chart_id: &str) {
        self.charts.retain(|c| c.schema.id != chart_id);
    }

    pub fn contains_chart(&self, chart_id: &str) -> bool {
        self.chart_index(chart_id).is_some()
    }

    /// Declared chart ids in declaration order.
    pub fn chart_ids(&self) -> Vec<String> {
        self.charts.iter().map(|c| c.schema.id.clone()).collect()
    }

    fn chart_index(&self, chart_id: &str) -> Option<usize> {
        self.charts.iter().position(|c| c.schema.id == chart_id)
    }

    fn build_line(&self, chart_id: &str, def: &LineDef) -> LineState {
        let kind = match def.kind {
            LineDefKind::StaticMarker => {
                let x = match def.params.get("x") {
                    Some(x) => *x,
                    None => {
                        warn!(chart = chart_id, line = %def.id,
                              "static marker without an `x` parameter; placing at 0");
                        0.0
                    }
                };
                LineKind::StaticMarker { x }
            }
            LineDefKind::FormulaCurve => LineKind::FormulaCurve {
                series: self.evaluate_series(chart_id, def, &def.params),
            },
            LineDefKind::RealtimeSeries | LineDefKind::Unknown => {
                if def.kind == LineDefKind::Unknown {
                    warn!(chart = chart_id, line = %def.id,
                          "unknown line kind; treating as real-time series");
                }
                let precision = match def.round_precision {
                    Some(p) if p.is_finite() && p > 0.0 => p,
                    Some(p) => {
                        warn!(chart = chart_id, line = %def.id, precision = p,
                              "invalid roundPrecision; falling back to 1");
                        1.0
                    }
                    None => 1.0,
                };
                LineKind::RealtimeSeries {
                    precision,
                    buffer: BTreeMap::new(),
                }
            }
        };
        LineState {
            visible: def.visible.unwrap_or(true),
            def: def.clone(),
            kind,
        }
    }

    /// Evaluate a formula curve over its declared X range, stepping by
    /// [`FORMULA_STEP`] and always including both endpoints. Evaluation
    /// errors degrade to a flat zero series over the same grid.
    fn evaluate_series(
        &self,
        chart_id: &str,
        def: &LineDef,
        params: &HashMap<String, f64>,
    ) -> Vec<[f64; 2]> {
        let range = match def.x_range {
            Some(r) if r.min <= r.max => r,
            _ => {
                warn!(chart = chart_id, line = %def.id,
                      "formula curve without a usable xRange; empty series");
                return Vec::new();
            }
        };
        let formula = def.formula.as_deref().unwrap_or("");

        let mut xs = Vec::new();
        let mut x = range.min;
        while x < range.max {
            xs.push(x);
            x += FORMULA_STEP;
        }
        xs.push(range.max);

        let mut scope = params.clone();
        let mut series = Vec::with_capacity(xs.len());
        for x in &xs {
            scope.insert("x".to_string(), *x);
            match self.evaluator.evaluate(formula, &scope) {
                Ok(y) => series.push([*x, y]),
                Err(err) => {
                    warn!(chart = chart_id, line = %def.id, %err,
                          "formula evaluation failed; substituting a zero series");
                    return xs.iter().map(|x| [*x, 0.0]).collect();
                }
            }
        }
        series
    }

    fn line_mut(&mut self, chart_id: &str, line_id: &str) -> Option<&mut LineState> {
        match self.chart_index(chart_id) {
            Some(i) => {
                let line = self.charts[i]
                    .lines
                    .iter_mut()
                    .find(|l| l.def.id == line_id);
                if line.is_none() {
                    warn!(chart = chart_id, line = line_id, "update for unknown line id");
                }
                line
            }
            None => {
                warn!(chart = chart_id, "update for unknown chart id");
                None
            }
        }
    }

    /// Feed data into a real-time series. A single point is quantized and
    /// inserted (last write to a bucket wins); a replacement series clears
    /// the buffer first. Marks the chart dirty.
    pub fn update_line_data<P: Into<LinePoints>>(
        &mut self,
        chart_id: &str,
        line_id: &str,
        points: P,
    ) {
        let points = points.into();
        let Some(line) = self.line_mut(chart_id, line_id) else {
            return;
        };
        let LineKind::RealtimeSeries { precision, buffer } = &mut line.kind else {
            warn!(chart = chart_id, line = line_id,
                  "data update targets a non-realtime line");
            return;
        };
        match points {
            LinePoints::Single([x, y]) => {
                buffer.insert(quantize(x, *precision), y);
            }
            LinePoints::Replace(series) => {
                buffer.clear();
                for [x, y] in series {
                    buffer.insert(quantize(x, *precision), y);
                }
            }
        }
        self.dirty.mark(chart_id.to_string());
    }

    /// Merge new parameters into a formula curve and re-evaluate its cached
    /// series. Marks the chart dirty.
    pub fn update_formula_params(
        &mut self,
        chart_id: &str,
        line_id: &str,
        params: &HashMap<String, f64>,
    ) {
        let Some(chart) = self.chart_index(chart_id) else {
            warn!(chart = chart_id, "update for unknown chart id");
            return;
        };
        let Some(idx) = self.charts[chart]
            .lines
            .iter()
            .position(|l| l.def.id == line_id)
        else {
            warn!(chart = chart_id, line = line_id, "update for unknown line id");
            return;
        };
        if !matches!(self.charts[chart].lines[idx].kind, LineKind::FormulaCurve { .. }) {
            warn!(chart = chart_id, line = line_id,
                  "parameter update targets a non-formula line");
            return;
        }
        let mut merged = self.charts[chart].lines[idx].def.params.clone();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), *v)));
        let series = {
            let def = &self.charts[chart].lines[idx].def;
            self.evaluate_series(chart_id, def, &merged)
        };
        let line = &mut self.charts[chart].lines[idx];
        line.def.params = merged;
        line.kind = LineKind::FormulaCurve { series };
        self.dirty.mark(chart_id.to_string());
    }

    /// Show or hide a single line. Marks the chart dirty; the next render
    /// already reflects the change since rendering is a pure projection.
    pub fn set_line_visibility(&mut self, chart_id: &str, line_id: &str, visible: bool) {
        if let Some(line) = self.line_mut(chart_id, line_id) {
            line.visible = visible;
            self.dirty.mark(chart_id.to_string());
        }
    }

    /// Render one chart from its current state. Datasets are ordered by
    /// `drawOrder` (absent sorts as 0) with declaration order breaking
    /// ties; hidden lines are omitted entirely.
    pub fn render(&self, chart_id: &str) -> Option<ChartRender> {
        let chart = &self.charts[self.chart_index(chart_id)?];
        let mut datasets = Vec::new();
        let mut annotations = Vec::new();
        let mut marker_index = 0usize;
        for line in &chart.lines {
            match &line.kind {
                LineKind::StaticMarker { x } => {
                    if line.visible {
                        annotations.push(Annotation {
                            key: format!("marker-{marker_index}"),
                            x: *x,
                            label: line.def.label().to_string(),
                            style: line.def.style.clone(),
                        });
                    }
                    marker_index += 1;
                }
                LineKind::FormulaCurve { series } => {
                    if line.visible {
                        datasets.push((line.def.draw_order.unwrap_or(0), Dataset {
                            line_id: line.def.id.clone(),
                            label: line.def.label().to_string(),
                            points: series.clone(),
                            style: line.def.style.clone(),
                        }));
                    }
                }
                LineKind::RealtimeSeries { precision, buffer } => {
                    if line.visible {
                        datasets.push((line.def.draw_order.unwrap_or(0), Dataset {
                            line_id: line.def.id.clone(),
                            label: line.def.label().to_string(),
                            points: buffer
                                .iter()
                                .map(|(b, y)| [bucket_x(*b, *precision), *y])
                                .collect(),
                            style: line.def.style.clone(),
                        }));
                    }
                }
            }
        }
        datasets.sort_by_key(|(order, _)| *order);
        Some(ChartRender {
            chart_id: chart.schema.id.clone(),
            title: chart.schema.title.clone(),
            title_visible: chart.schema.title_visible.unwrap_or(true),
            datasets: datasets.into_iter().map(|(_, d)| d).collect(),
            annotations,
        })
    }

    /// Drain the dirty set: render every chart that changed since the last
    /// frame, invoke the redraw observer once per chart and return the
    /// renders in first-dirtied order.
    pub fn on_frame(&mut self) -> Vec<ChartRender> {
        let dirty = self.dirty.take();
        let mut renders = Vec::with_capacity(dirty.len());
        for chart_id in dirty {
            if let Some(render) = self.render(&chart_id) {
                if let Some(observer) = self.observer.as_mut() {
                    observer(&chart_id, &render);
                }
                renders.push(render);
            }
        }
        renders
    }

    /// Charts currently waiting for a render.
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────
