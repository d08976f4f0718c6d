//! Composition root tying the schema, widget tree, registry, bus and chart
//! engine together into one panel.
//!
//! The host owns a [`PanelController`], mounts it once and then drives it
//! with [`PanelController::on_frame`] per animation tick. Everything else
//! happens through ids: programmatic value and visibility updates, chart
//! feeds, and the bus events user interaction emits.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn};

use crate::bus::{topics, EventBus, Subscription, VisibilityChanged};
use crate::chart::{ChartEngine, ChartRender, LinePoints};
use crate::eval::{BasicEvaluator, Evaluator};
use crate::factory::ElementFactory;
use crate::registry::ValueRegistry;
use crate::schema::{GroupItemSchema, ItemSchema, SchemaDocument};
use crate::validator::{self, SchemaError};
use crate::widget::{Handlers, ParamValue, WidgetRef};

/// A schema-driven panel: widget tree, value registry and chart engine
/// behind a single id-addressed facade.
pub struct PanelController {
    document: SchemaDocument,
    display_name: String,
    bus: EventBus,
    registry: ValueRegistry,
    handlers: Handlers,
    charts: Rc<RefCell<ChartEngine>>,
    roots: Vec<WidgetRef>,
    mount_target: Option<String>,
    validation: Vec<SchemaError>,
    /// Replacement document received on the bus, applied on the next frame.
    pending_schema: Rc<RefCell<Option<SchemaDocument>>>,
    subscriptions: Vec<Subscription>,
}

impl PanelController {
    /// Build a controller with the default formula evaluator.
    pub fn new(document: SchemaDocument) -> Self {
        Self::with_evaluator(document, Box::new(BasicEvaluator))
    }

    /// Build a controller with a custom formula evaluator. The document is
    /// validated once here; findings are logged and kept available through
    /// [`validation_errors`](Self::validation_errors), and construction
    /// continues best-effort regardless.
    pub fn with_evaluator(document: SchemaDocument, evaluator: Box<dyn Evaluator>) -> Self {
        let validation = validator::validate_and_report(&document);
        let bus = EventBus::new();
        let registry = ValueRegistry::new();
        let charts = Rc::new(RefCell::new(ChartEngine::new(evaluator)));
        let pending_schema: Rc<RefCell<Option<SchemaDocument>>> = Rc::default();

        let mut subscriptions = Vec::new();
        {
            // visibility flows through the bus so external publishers and
            // the controller's own API take the same path
            let registry = registry.clone();
            subscriptions.push(bus.subscribe(topics::VISIBILITY_CHANGED, move |payload| {
                match serde_json::from_value::<VisibilityChanged>(payload.clone()) {
                    Ok(evt) => registry.set_visibility(&evt.element_id, evt.is_visible),
                    Err(err) => warn!(%err, "malformed visibility payload"),
                }
            }));
        }
        {
            let pending = pending_schema.clone();
            subscriptions.push(bus.subscribe(topics::SCHEMA_UPDATE_RECEIVED, move |payload| {
                match SchemaDocument::from_value(payload.clone()) {
                    Ok(doc) => *pending.borrow_mut() = Some(doc),
                    Err(err) => warn!(%err, "malformed schema update; keeping current schema"),
                }
            }));
        }

        let display_name = if document.controller.display_name.is_empty() {
            document.controller.name.clone()
        } else {
            document.controller.display_name.clone()
        };
        Self {
            document,
            display_name,
            bus,
            registry,
            handlers: Handlers::new(),
            charts,
            roots: Vec::new(),
            mount_target: None,
            validation,
            pending_schema,
            subscriptions,
        }
    }

    /// Build the widget tree into the named mount target. Mounting while
    /// mounted tears the old tree down first.
    pub fn mount(&mut self, target: &str) {
        if self.mount_target.is_some() {
            self.unmount();
        }
        let factory = ElementFactory::new(
            self.registry.clone(),
            self.bus.clone(),
            self.handlers.clone(),
            self.charts.clone(),
            self.document.controller.name.clone(),
        );
        self.roots = self
            .document
            .controller
            .items
            .iter()
            .filter_map(|item| factory.create(item))
            .collect();
        self.mount_target = Some(target.to_string());
        info!(controller = %self.document.controller.name, target,
              roots = self.roots.len(), "panel mounted");
    }

    /// Tear the widget tree down: unregister every id, remove the declared
    /// charts and drop the widgets. Safe to call when not mounted.
    pub fn unmount(&mut self) {
        let mut ids = Vec::new();
        for root in &self.roots {
            root.borrow().collect_ids(&mut ids);
        }
        for id in &ids {
            self.registry.unregister(id);
        }
        {
            let mut charts = self.charts.borrow_mut();
            for root in &self.roots {
                if let crate::widget::Widget::ChartSet(cs) = &*root.borrow() {
                    for chart_id in &cs.chart_ids {
                        charts.remove_chart(chart_id);
                    }
                }
            }
        }
        self.roots.clear();
        if let Some(target) = self.mount_target.take() {
            info!(controller = %self.document.controller.name, target,
                  elements = ids.len(), "panel unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mount_target.is_some()
    }

    /// Problems found when the current document was validated.
    pub fn validation_errors(&self) -> &[SchemaError] {
        &self.validation
    }

    /// The bus this panel publishes on; subscribe here to observe user
    /// interaction or to inject events.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Application callbacks fired on user interaction.
    pub fn handlers(&self) -> &Handlers {
        &self.handlers
    }

    /// The id-indexed registry over the mounted tree.
    pub fn registry(&self) -> &ValueRegistry {
        &self.registry
    }

    /// Look up any widget by id.
    pub fn widget(&self, id: &str) -> Option<WidgetRef> {
        self.registry.get(id)
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn set_display_name(&mut self, name: &str) {
        self.display_name = name.to_string();
    }

    // ── parameters ──────────────────────────────────────────────────────────

    /// Programmatic parameter update: silent on the bus.
    pub fn set_parameter_value(&self, id: &str, value: &Value) {
        self.registry.set_value(id, value);
    }

    /// Apply a batch of `{id: value}` updates.
    pub fn set_multiple_parameter_values<'a, I>(&self, updates: I)
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        self.registry.set_values(updates);
    }

    pub fn get_parameter_value(&self, id: &str) -> Option<ParamValue> {
        self.registry.get_value(id)
    }

    // ── visibility ──────────────────────────────────────────────────────────

    /// Change an element's visibility. Publishes
    /// [`topics::VISIBILITY_CHANGED`]; the controller's own subscription
    /// applies it to the widget.
    pub fn set_element_visibility(&self, id: &str, visible: bool) {
        self.bus.publish_event(
            topics::VISIBILITY_CHANGED,
            &VisibilityChanged {
                element_id: id.to_string(),
                is_visible: visible,
            },
        );
    }

    /// Apply every explicit visibility flag a document carries to the
    /// current tree. Elements the document leaves unspecified keep their
    /// state.
    pub fn apply_schema_visibility(&self, document: &SchemaDocument) {
        let mut flags: Vec<(String, bool)> = Vec::new();
        let mut lines: Vec<(String, String, bool)> = Vec::new();
        for item in &document.controller.items {
            match item {
                ItemSchema::Tabset(ts) => {
                    push_flag(&mut flags, &ts.id, ts.visible);
                    for tab in &ts.tabs {
                        push_flag(&mut flags, &tab.id, tab.visible);
                        for group in &tab.groups {
                            push_flag(&mut flags, &group.id, group.visible);
                            for leaf in &group.items {
                                match leaf {
                                    GroupItemSchema::Parameter(p) => {
                                        push_flag(&mut flags, &p.param_id, p.visible)
                                    }
                                    GroupItemSchema::Command(c) => {
                                        push_flag(&mut flags, &c.command_id, c.visible)
                                    }
                                    GroupItemSchema::Unknown => {}
                                }
                            }
                        }
                    }
                }
                ItemSchema::Chartset(cs) => {
                    push_flag(&mut flags, &cs.id, cs.visible);
                    for chart in &cs.charts {
                        for def in &chart.line_defs {
                            if let Some(visible) = def.visible {
                                lines.push((chart.id.clone(), def.id.clone(), visible));
                            }
                        }
                    }
                }
                ItemSchema::Unknown => {}
            }
        }
        for (id, visible) in flags {
            self.set_element_visibility(&id, visible);
        }
        let mut charts = self.charts.borrow_mut();
        for (chart, line, visible) in lines {
            charts.set_line_visibility(&chart, &line, visible);
        }
    }

    // ── commands ────────────────────────────────────────────────────────────

    /// Activate a command by id, as a full press-and-release.
    pub fn click_command(&self, id: &str, now: Instant) {
        match self.widget(id) {
            Some(w) => match w.borrow_mut().as_command_mut() {
                Some(cmd) => cmd.click(now),
                None => warn!(id, "click targets a non-command element"),
            },
            None => warn!(id, "click for unknown element id"),
        }
    }

    // ── charts ──────────────────────────────────────────────────────────────

    /// Feed a point or a replacement series into a real-time line.
    pub fn update_chart_line_data<P: Into<LinePoints>>(
        &self,
        chart_id: &str,
        line_id: &str,
        points: P,
    ) {
        self.charts
            .borrow_mut()
            .update_line_data(chart_id, line_id, points);
    }

    /// Merge parameters into a formula line and re-evaluate it.
    pub fn update_chart_formula_params(
        &self,
        chart_id: &str,
        line_id: &str,
        params: &HashMap<String, f64>,
    ) {
        self.charts
            .borrow_mut()
            .update_formula_params(chart_id, line_id, params);
    }

    pub fn set_chart_line_visibility(&self, chart_id: &str, line_id: &str, visible: bool) {
        self.charts
            .borrow_mut()
            .set_line_visibility(chart_id, line_id, visible);
    }

    /// Render one chart from its current state, dirty or not.
    pub fn chart_render(&self, chart_id: &str) -> Option<ChartRender> {
        self.charts.borrow().render(chart_id)
    }

    /// Shared handle to the chart engine, for hosts that attach a redraw
    /// observer.
    pub fn chart_engine(&self) -> Rc<RefCell<ChartEngine>> {
        self.charts.clone()
    }

    // ── frame loop ──────────────────────────────────────────────────────────

    /// Advance one frame: apply a pending schema replacement, drive command
    /// auto-resets and render every dirty chart. Returns the fresh renders.
    pub fn on_frame(&mut self, now: Instant) -> Vec<ChartRender> {
        let pending = self.pending_schema.borrow_mut().take();
        if let Some(document) = pending {
            self.replace_schema(document);
        }
        for root in &self.roots {
            root.borrow_mut().tick(now);
        }
        self.charts.borrow_mut().on_frame()
    }

    /// Swap in a replacement document: validate, tear down the current
    /// tree and rebuild it into the same mount target.
    fn replace_schema(&mut self, document: SchemaDocument) {
        info!(controller = %document.controller.name, "applying schema update");
        self.validation = validator::validate_and_report(&document);
        let target = self.mount_target.clone();
        self.unmount();
        if document.controller.display_name.is_empty() {
            self.display_name = document.controller.name.clone();
        } else {
            self.display_name = document.controller.display_name.clone();
        }
        self.document = document;
        if let Some(target) = target {
            self.mount(&target);
        }
    }
}

impl Drop for PanelController {
    fn drop(&mut self) {
        for sub in &self.subscriptions {
            self.bus.unsubscribe(sub);
        }
    }
}

fn push_flag(flags: &mut Vec<(String, bool)>, id: &str, visible: Option<bool>) {
    if let Some(visible) = visible {
        flags.push((id.to_string(), visible));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────
