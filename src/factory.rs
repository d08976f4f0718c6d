//! Builds the widget tree from schema items.
//!
//! Construction is fail-soft: an unknown item kind produces a warning and
//! no widget, never an error. Every widget with an id is registered in the
//! [`ValueRegistry`] as it is created, and chart sets declare their charts
//! into the [`ChartEngine`] so the two stay in lockstep with the tree.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;

use crate::bus::EventBus;
use crate::chart::ChartEngine;
use crate::registry::ValueRegistry;
use crate::schema::{GroupItemSchema, GroupSchema, ItemSchema, TabSchema, TabSetSchema};
use crate::widget::{
    ChartSetWidget, CommandWidget, GroupWidget, Handlers, ParameterWidget, TabSetWidget,
    TabWidget, Widget, WidgetRef,
};

/// Creates widgets and keeps the registry and chart engine in sync with
/// what it built.
pub struct ElementFactory {
    registry: ValueRegistry,
    bus: EventBus,
    handlers: Handlers,
    charts: Rc<RefCell<ChartEngine>>,
    controller_name: String,
}

impl ElementFactory {
    pub fn new(
        registry: ValueRegistry,
        bus: EventBus,
        handlers: Handlers,
        charts: Rc<RefCell<ChartEngine>>,
        controller_name: String,
    ) -> Self {
        Self {
            registry,
            bus,
            handlers,
            charts,
            controller_name,
        }
    }

    /// Build one top-level item. Returns `None` for kinds this version
    /// does not understand.
    pub fn create(&self, item: &ItemSchema) -> Option<WidgetRef> {
        match item {
            ItemSchema::Tabset(schema) => Some(self.create_tabset(schema)),
            ItemSchema::Chartset(schema) => {
                let mut charts = self.charts.borrow_mut();
                for chart in &schema.charts {
                    charts.declare_chart(chart);
                }
                drop(charts);
                Some(self.finish(Widget::ChartSet(ChartSetWidget::new(schema))))
            }
            ItemSchema::Unknown => {
                warn!("skipping top-level item of unknown kind");
                None
            }
        }
    }

    fn create_tabset(&self, schema: &TabSetSchema) -> WidgetRef {
        let tabs = schema.tabs.iter().map(|t| self.create_tab(t)).collect();
        self.finish(Widget::TabSet(TabSetWidget::new(schema, tabs)))
    }

    fn create_tab(&self, schema: &TabSchema) -> WidgetRef {
        let groups = schema.groups.iter().map(|g| self.create_group(g)).collect();
        self.finish(Widget::Tab(TabWidget::new(schema, groups)))
    }

    fn create_group(&self, schema: &GroupSchema) -> WidgetRef {
        let children = schema
            .items
            .iter()
            .filter_map(|item| self.create_group_item(item))
            .collect();
        self.finish(Widget::Group(GroupWidget::new(schema, children)))
    }

    fn create_group_item(&self, item: &GroupItemSchema) -> Option<WidgetRef> {
        match item {
            GroupItemSchema::Parameter(schema) => {
                Some(self.finish(Widget::Parameter(ParameterWidget::new(
                    schema.clone(),
                    self.bus.clone(),
                    self.handlers.clone(),
                    self.controller_name.clone(),
                ))))
            }
            GroupItemSchema::Command(schema) => {
                Some(self.finish(Widget::Command(CommandWidget::new(
                    schema.clone(),
                    self.bus.clone(),
                    self.handlers.clone(),
                    self.controller_name.clone(),
                ))))
            }
            GroupItemSchema::Unknown => {
                warn!("skipping group item of unknown kind");
                None
            }
        }
    }

    fn finish(&self, widget: Widget) -> WidgetRef {
        let widget = Rc::new(RefCell::new(widget));
        self.registry.register(&widget);
        widget
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::BasicEvaluator;
    use serde_json::json;

    fn factory() -> (ElementFactory, ValueRegistry, Rc<RefCell<ChartEngine>>) {
        let registry = ValueRegistry::new();
        let charts = Rc::new(RefCell::new(ChartEngine::new(Box::new(BasicEvaluator))));
        let factory = ElementFactory::new(
            registry.clone(),
            EventBus::new(),
            Handlers::new(),
            charts.clone(),
            "c".into(),
        );
        (factory, registry, charts)
    }

    #[test]
    fn builds_and_registers_a_tabset_tree() {
        let (factory, registry, _) = factory();
        let item: ItemSchema = serde_json::from_value(json!({
            "kind": "tabset", "id": "main", "tabs": [
                {"id": "t1", "title": "Main", "groups": [
                    {"id": "g1", "title": "Drive", "items": [
                        {"kind": "parameter", "paramId": "speed",
                         "displayName": "Speed", "inputKind": "number"},
                        {"kind": "command", "commandId": "start",
                         "displayName": "Start"}
                    ]}
                ]}
            ]
        }))
        .unwrap();
        let root = factory.create(&item).unwrap();
        assert_eq!(root.borrow().id(), "main");
        for id in ["main", "t1", "g1", "speed", "start"] {
            assert!(registry.contains(id), "{id} not registered");
        }
    }

    #[test]
    fn chartset_declares_its_charts() {
        let (factory, registry, charts) = factory();
        let item: ItemSchema = serde_json::from_value(json!({
            "kind": "chartset", "id": "cs", "charts": [
                {"id": "graph", "title": "G", "lineDefs": [
                    {"id": "rt", "kind": "realtime_series"}
                ]}
            ]
        }))
        .unwrap();
        let _root = factory.create(&item).unwrap();
        assert!(registry.contains("cs"));
        assert!(charts.borrow().contains_chart("graph"));
    }

    #[test]
    fn unknown_kinds_yield_no_widget() {
        let (factory, registry, _) = factory();
        assert!(factory.create(&ItemSchema::Unknown).is_none());
        assert!(registry.is_empty());

        let item: ItemSchema = serde_json::from_value(json!({
            "kind": "tabset", "id": "main", "tabs": [
                {"id": "t", "title": "T", "groups": [
                    {"id": "g", "title": "G", "items": [
                        {"kind": "widget3000", "id": "weird"}
                    ]}
                ]}
            ]
        }))
        .unwrap();
        let root = factory.create(&item).unwrap();
        assert!(root.borrow().children()[0].borrow().children()[0]
            .borrow()
            .children()
            .is_empty());
        assert!(!registry.contains("weird"));
    }
}
