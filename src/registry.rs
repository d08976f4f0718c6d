//! Id-indexed registry over the widget tree.
//!
//! Holds weak references so the tree stays solely owned by its parents;
//! a looked-up id whose widget was dropped behaves like an unknown id.
//! Unknown ids are warned about and otherwise ignored, so a stale update
//! from the remote side can never break the panel.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::warn;

use crate::widget::{ParamValue, Widget, WidgetRef};

/// Registry mapping element ids to live widgets. Cheap to clone; clones
/// share the same table.
#[derive(Clone, Default)]
pub struct ValueRegistry {
    inner: Rc<RefCell<HashMap<String, Weak<RefCell<Widget>>>>>,
}

impl ValueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a widget under its id. Registering over a still-live entry
    /// warns and replaces it.
    pub fn register(&self, widget: &WidgetRef) {
        let id = widget.borrow().id().to_string();
        if id.is_empty() {
            warn!("refusing to register a widget without an id");
            return;
        }
        let mut map = self.inner.borrow_mut();
        if let Some(existing) = map.get(&id) {
            if existing.strong_count() > 0 {
                warn!(id, "duplicate element id; replacing previous registration");
            }
        }
        map.insert(id, Rc::downgrade(widget));
    }

    /// Remove an id. Unknown ids are a no-op.
    pub fn unregister(&self, id: &str) {
        self.inner.borrow_mut().remove(id);
    }

    /// Look up a live widget by id.
    pub fn get(&self, id: &str) -> Option<WidgetRef> {
        self.inner.borrow().get(id).and_then(Weak::upgrade)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Current value of a parameter. `None` for unknown ids and for
    /// non-parameter widgets.
    pub fn get_value(&self, id: &str) -> Option<ParamValue> {
        let widget = self.get(id)?;
        let widget = widget.borrow();
        widget.as_parameter().map(|p| p.value())
    }

    /// Programmatically set a parameter from a JSON value. Silent on the
    /// bus; warns and ignores unknown or non-parameter ids.
    pub fn set_value(&self, id: &str, value: &Value) {
        match self.get(id) {
            Some(widget) => {
                let mut widget = widget.borrow_mut();
                match widget.as_parameter_mut() {
                    Some(p) => p.update_from_json(value),
                    None => warn!(id, "value update targets a non-parameter element"),
                }
            }
            None => warn!(id, "value update for unknown element id"),
        }
    }

    /// Apply a batch of `{id: value}` updates in iteration order.
    pub fn set_values<'a, I>(&self, updates: I)
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        for (id, value) in updates {
            self.set_value(id, value);
        }
    }

    /// Set an element's visibility. Warns and ignores unknown ids.
    pub fn set_visibility(&self, id: &str, visible: bool) {
        match self.get(id) {
            Some(widget) => widget.borrow_mut().set_visibility(visible),
            None => warn!(id, "visibility update for unknown element id"),
        }
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.inner
            .borrow()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.inner.borrow_mut().clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::widget::{Handlers, ParameterWidget};
    use serde_json::json;

    fn make_param(id: &str) -> WidgetRef {
        let schema = serde_json::from_value(json!({
            "paramId": id,
            "displayName": id,
            "inputKind": "number",
            "props": {"default": 5}
        }))
        .unwrap();
        Rc::new(RefCell::new(Widget::Parameter(ParameterWidget::new(
            schema,
            EventBus::new(),
            Handlers::new(),
            "c".into(),
        ))))
    }

    #[test]
    fn set_and_get_round_trip() {
        let reg = ValueRegistry::new();
        let w = make_param("speed");
        reg.register(&w);
        assert_eq!(reg.get_value("speed"), Some(ParamValue::Number(5.0)));
        reg.set_value("speed", &json!(300));
        assert_eq!(reg.get_value("speed"), Some(ParamValue::Number(300.0)));
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let reg = ValueRegistry::new();
        reg.set_value("ghost", &json!(1));
        reg.set_visibility("ghost", false);
        assert_eq!(reg.get_value("ghost"), None);
    }

    #[test]
    fn dropped_widgets_behave_like_unknown_ids() {
        let reg = ValueRegistry::new();
        let w = make_param("speed");
        reg.register(&w);
        assert!(reg.contains("speed"));
        drop(w);
        assert!(!reg.contains("speed"));
        assert_eq!(reg.len(), 0);
        reg.set_value("speed", &json!(1));
    }

    #[test]
    fn duplicate_registration_replaces_the_old_widget() {
        let reg = ValueRegistry::new();
        let first = make_param("speed");
        let second = make_param("speed");
        reg.register(&first);
        reg.register(&second);
        second
            .borrow_mut()
            .as_parameter_mut()
            .unwrap()
            .update_from_json(&json!(42));
        assert_eq!(reg.get_value("speed"), Some(ParamValue::Number(42.0)));
    }

    #[test]
    fn batch_updates_apply_in_order() {
        let reg = ValueRegistry::new();
        let a = make_param("a");
        let b = make_param("b");
        reg.register(&a);
        reg.register(&b);
        let va = json!(1);
        let vb = json!(2);
        reg.set_values([("a", &va), ("b", &vb)]);
        assert_eq!(reg.get_value("a"), Some(ParamValue::Number(1.0)));
        assert_eq!(reg.get_value("b"), Some(ParamValue::Number(2.0)));
    }
}
