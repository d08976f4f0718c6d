//! Widget tree built from the schema: parameter inputs, command buttons and
//! the container levels above them.
//!
//! Widgets own the runtime state the presentation layer mirrors. Two update
//! paths exist and stay deliberately asymmetric: programmatic updates
//! ([`ParameterWidget::update_value`]) mutate state and reflect into the
//! attached [`Surface`] without emitting anything, while the user path
//! ([`ParameterWidget::set_from_input`]) additionally publishes on the bus
//! and fires the application callbacks. Keeping remote updates silent is
//! what prevents echo loops through an external transport.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{error, warn};

use crate::bus::{topics, CommandClicked, CommandToggled, EventBus, ParameterValueChanged};
use crate::sched::Deadline;
use crate::schema::{
    ChartSetSchema, CommandBehavior, CommandSchema, GroupSchema, InputKind, ParameterSchema,
    TabSchema, TabSetSchema,
};
use crate::surface::Surface;

/// Shared handle to a widget in the tree.
pub type WidgetRef = Rc<RefCell<Widget>>;

// ─────────────────────────────────────────────────────────────────────────────
// Parameter values
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime value of a parameter, typed per input kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// `number` and `slider` inputs.
    Number(f64),
    /// `readonly`, `select` and `radio` inputs.
    Text(String),
    /// `flags` inputs: a 32-bit mask.
    Mask(u32),
    /// Boolean states mirrored from toggle commands or boolean updates.
    Bool(bool),
}

impl ParamValue {
    /// Interpret a JSON value as the given input kind. Mismatched shapes
    /// fall back to a best-effort coercion rather than failing.
    pub fn from_json(kind: InputKind, value: &Value) -> Self {
        match kind {
            InputKind::Number | InputKind::Slider => {
                ParamValue::Number(value.as_f64().unwrap_or_else(|| {
                    value
                        .as_str()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0.0)
                }))
            }
            InputKind::Flags => ParamValue::Mask(value.as_u64().unwrap_or(0) as u32),
            InputKind::Readonly | InputKind::Select | InputKind::Radio | InputKind::Unknown => {
                match value {
                    Value::Bool(b) => ParamValue::Bool(*b),
                    Value::Number(n) => ParamValue::Number(n.as_f64().unwrap_or(0.0)),
                    Value::String(s) => ParamValue::Text(s.clone()),
                    other => ParamValue::Text(other.to_string()),
                }
            }
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Number(n) => serde_json::json!(n),
            ParamValue::Text(s) => Value::String(s.clone()),
            ParamValue::Mask(m) => serde_json::json!(m),
            ParamValue::Bool(b) => Value::Bool(*b),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Mask(m) => Some(*m as f64),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Application callbacks
// ─────────────────────────────────────────────────────────────────────────────

type ParamHook = Box<dyn FnMut(&str, &ParamValue)>;
type CommandHook = Box<dyn FnMut(&str, Option<bool>)>;

#[derive(Default)]
struct HandlersInner {
    on_parameter_change: Option<ParamHook>,
    on_command: Option<CommandHook>,
}

/// Application-level callbacks invoked on user interaction, alongside the
/// bus events. Cheap to clone; clones share the same callbacks.
///
/// A panicking callback is caught and logged so it cannot poison the widget
/// that invoked it.
#[derive(Clone, Default)]
pub struct Handlers {
    inner: Rc<RefCell<HandlersInner>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with `(param_id, new_value)` whenever the user edits a
    /// parameter input.
    pub fn set_on_parameter_change<F>(&self, f: F)
    where
        F: FnMut(&str, &ParamValue) + 'static,
    {
        self.inner.borrow_mut().on_parameter_change = Some(Box::new(f));
    }

    /// Called with `(command_id, state)` on command activation. `state` is
    /// `Some(new_state)` for toggles and `None` for momentary commands.
    pub fn set_on_command<F>(&self, f: F)
    where
        F: FnMut(&str, Option<bool>) + 'static,
    {
        self.inner.borrow_mut().on_command = Some(Box::new(f));
    }

    fn fire_parameter_change(&self, param_id: &str, value: &ParamValue) {
        let mut inner = self.inner.borrow_mut();
        if let Some(hook) = inner.on_parameter_change.as_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| hook(param_id, value)));
            if outcome.is_err() {
                error!(param_id, "parameter-change callback panicked");
            }
        }
    }

    fn fire_command(&self, command_id: &str, state: Option<bool>) {
        let mut inner = self.inner.borrow_mut();
        if let Some(hook) = inner.on_command.as_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| hook(command_id, state)));
            if outcome.is_err() {
                error!(command_id, "command callback panicked");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameter widget
// ─────────────────────────────────────────────────────────────────────────────

/// A single parameter input.
pub struct ParameterWidget {
    schema: ParameterSchema,
    value: ParamValue,
    visible: bool,
    surface: Option<Box<dyn Surface>>,
    bus: EventBus,
    handlers: Handlers,
    controller_name: String,
}

impl ParameterWidget {
    pub fn new(
        schema: ParameterSchema,
        bus: EventBus,
        handlers: Handlers,
        controller_name: String,
    ) -> Self {
        let default = schema
            .props
            .default
            .clone()
            .map(|v| ParamValue::from_json(schema.input_kind, &v))
            .unwrap_or_else(|| initial_value(&schema));
        let visible = schema.visible.unwrap_or(true);
        Self {
            schema,
            value: default,
            visible,
            surface: None,
            bus,
            handlers,
            controller_name,
        }
    }

    pub fn id(&self) -> &str {
        &self.schema.param_id
    }

    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Current value. Prefers the attached surface's live input when it
    /// exposes one, otherwise the cached value.
    pub fn value(&self) -> ParamValue {
        self.surface
            .as_ref()
            .and_then(|s| s.read_value())
            .unwrap_or_else(|| self.value.clone())
    }

    /// Programmatic update: caches and reflects, publishes nothing.
    pub fn update_value(&mut self, value: ParamValue) {
        self.value = value;
        if let Some(surface) = self.surface.as_mut() {
            surface.reflect_value(&self.value);
        }
    }

    /// Interpret a JSON value per this parameter's input kind and apply it
    /// programmatically. Structurally invalid values are warned about and
    /// ignored; an unknown select/radio option clears the selection.
    pub fn update_from_json(&mut self, value: &Value) {
        match self.schema.input_kind {
            InputKind::Number | InputKind::Slider => {
                let parsed = value
                    .as_f64()
                    .or_else(|| value.as_str().and_then(|s| s.parse().ok()));
                match parsed {
                    Some(n) => self.update_value(ParamValue::Number(n)),
                    None => warn!(id = %self.schema.param_id,
                                  "ignoring non-numeric value update"),
                }
            }
            InputKind::Flags => match value.as_u64() {
                Some(mask) => self.update_value(ParamValue::Mask(mask as u32)),
                None => warn!(id = %self.schema.param_id,
                              "ignoring non-integer mask update"),
            },
            InputKind::Select | InputKind::Radio => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let known = self
                    .schema
                    .props
                    .options
                    .as_ref()
                    .map(|opts| opts.iter().any(|o| o.value == text))
                    .unwrap_or(true);
                if known {
                    self.update_value(ParamValue::Text(text));
                } else {
                    warn!(id = %self.schema.param_id, option = %text,
                          "unknown option; clearing selection");
                    self.update_value(ParamValue::Text(String::new()));
                }
            }
            InputKind::Readonly | InputKind::Unknown => {
                self.update_value(ParamValue::from_json(self.schema.input_kind, value));
            }
        }
    }

    /// User-interaction update: caches, reflects, publishes
    /// [`topics::PARAMETER_VALUE_CHANGED`] and fires the application
    /// callback.
    pub fn set_from_input(&mut self, value: ParamValue) {
        self.value = value.clone();
        if let Some(surface) = self.surface.as_mut() {
            surface.reflect_value(&self.value);
        }
        self.bus.publish_event(
            topics::PARAMETER_VALUE_CHANGED,
            &ParameterValueChanged {
                param_id: self.schema.param_id.clone(),
                value: self.value.to_json(),
                controller_name: self.controller_name.clone(),
            },
        );
        self.handlers
            .fire_parameter_change(&self.schema.param_id, &value);
    }

    pub fn set_visibility(&mut self, visible: bool) {
        self.visible = visible;
        if let Some(surface) = self.surface.as_mut() {
            surface.reflect_visibility(visible);
        }
    }

    /// Attach a presentation binding. The surface immediately receives the
    /// current value and visibility.
    pub fn attach_surface(&mut self, mut surface: Box<dyn Surface>) {
        surface.reflect_value(&self.value);
        surface.reflect_visibility(self.visible);
        self.surface = Some(surface);
    }

    pub fn detach_surface(&mut self) {
        self.surface = None;
    }
}

/// Initial value for a parameter without an explicit default.
fn initial_value(schema: &ParameterSchema) -> ParamValue {
    match schema.input_kind {
        InputKind::Number | InputKind::Slider => {
            ParamValue::Number(schema.props.min.unwrap_or(0.0))
        }
        InputKind::Flags => ParamValue::Mask(0),
        InputKind::Select | InputKind::Radio => ParamValue::Text(
            schema
                .props
                .options
                .as_ref()
                .and_then(|opts| opts.first())
                .map(|o| o.value.clone())
                .unwrap_or_default(),
        ),
        InputKind::Readonly | InputKind::Unknown => ParamValue::Text(String::new()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command widget
// ─────────────────────────────────────────────────────────────────────────────

/// A command button: momentary or toggle, with an optional transient
/// "clicked" presentation that auto-reverts on a deadline.
pub struct CommandWidget {
    schema: CommandSchema,
    visible: bool,
    /// Toggle state; always `false` for momentary commands.
    toggled: bool,
    /// Transient clicked presentation is currently shown.
    clicked: bool,
    pending_reset: Option<Deadline>,
    bus: EventBus,
    handlers: Handlers,
    controller_name: String,
}

impl CommandWidget {
    pub fn new(
        schema: CommandSchema,
        bus: EventBus,
        handlers: Handlers,
        controller_name: String,
    ) -> Self {
        let visible = schema.visible.unwrap_or(true);
        Self {
            schema,
            visible,
            toggled: false,
            clicked: false,
            pending_reset: None,
            bus,
            handlers,
            controller_name,
        }
    }

    pub fn id(&self) -> &str {
        &self.schema.command_id
    }

    pub fn schema(&self) -> &CommandSchema {
        &self.schema
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visibility(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_toggled(&self) -> bool {
        self.toggled
    }

    /// Whether the transient clicked presentation is active.
    pub fn is_clicked(&self) -> bool {
        self.clicked
    }

    /// Begin a press. Momentary commands fire here; toggles flip here.
    ///
    /// If `autoReset` is set, the clicked presentation is reverted by
    /// [`tick`](Self::tick) once `resetDurationMs` has elapsed, whether or
    /// not a release ever arrives.
    pub fn press(&mut self, now: Instant) {
        self.clicked = true;
        if self.schema.props.auto_reset {
            self.pending_reset = Some(Deadline::after(
                now,
                Duration::from_millis(self.schema.props.reset_duration_ms),
            ));
        }
        match self.schema.props.behavior {
            CommandBehavior::Momentary => {
                self.bus.publish_event(
                    topics::COMMAND_CLICKED,
                    &CommandClicked {
                        command_id: self.schema.command_id.clone(),
                        controller_name: self.controller_name.clone(),
                    },
                );
                self.handlers.fire_command(&self.schema.command_id, None);
            }
            CommandBehavior::Toggle => {
                self.toggled = !self.toggled;
                self.bus.publish_event(
                    topics::COMMAND_TOGGLED,
                    &CommandToggled {
                        command_id: self.schema.command_id.clone(),
                        controller_name: self.controller_name.clone(),
                        state: self.toggled,
                    },
                );
                self.handlers
                    .fire_command(&self.schema.command_id, Some(self.toggled));
            }
        }
    }

    /// End a press: reverts the clicked presentation and cancels any armed
    /// auto-reset.
    pub fn release(&mut self) {
        self.clicked = false;
        self.pending_reset = None;
    }

    /// Full press-and-release. With `autoReset` the clicked presentation
    /// stays up until the deadline; without it the release is immediate.
    pub fn click(&mut self, now: Instant) {
        self.press(now);
        if !self.schema.props.auto_reset {
            self.release();
        }
    }

    /// Force a toggle into a given state without emitting events; used when
    /// the remote side reports the authoritative state.
    pub fn update_toggle_state(&mut self, state: bool) {
        if self.schema.props.behavior == CommandBehavior::Toggle {
            self.toggled = state;
        }
    }

    /// Advance the auto-reset clock. Returns `true` if the presentation
    /// reverted on this tick.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.pending_reset {
            Some(deadline) if deadline.is_due(now) => {
                self.pending_reset = None;
                self.clicked = false;
                true
            }
            _ => false,
        }
    }

    /// Label for the current state, falling back through clicked → active →
    /// base.
    pub fn current_label(&self) -> &str {
        let props = &self.schema.props;
        if self.clicked {
            if let Some(label) = props.display_name_clicked.as_deref() {
                return label;
            }
        }
        if self.toggled {
            if let Some(label) = props.display_name_active.as_deref() {
                return label;
            }
        }
        &self.schema.display_name
    }

    /// Style hint for the current state, same fallback order as the label.
    pub fn current_style(&self) -> Option<&str> {
        let props = &self.schema.props;
        if self.clicked {
            if let Some(style) = props.style_clicked.as_deref() {
                return Some(style);
            }
        }
        if self.toggled {
            if let Some(style) = props.style_active.as_deref() {
                return Some(style);
            }
        }
        props.style.as_deref()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Containers
// ─────────────────────────────────────────────────────────────────────────────

pub struct GroupWidget {
    pub id: String,
    pub title: String,
    pub visible: bool,
    pub children: Vec<WidgetRef>,
}

impl GroupWidget {
    pub fn new(schema: &GroupSchema, children: Vec<WidgetRef>) -> Self {
        Self {
            id: schema.id.clone(),
            title: schema.title.clone(),
            visible: schema.visible.unwrap_or(true),
            children,
        }
    }
}

pub struct TabWidget {
    pub id: String,
    pub title: String,
    pub visible: bool,
    pub groups: Vec<WidgetRef>,
}

impl TabWidget {
    pub fn new(schema: &TabSchema, groups: Vec<WidgetRef>) -> Self {
        Self {
            id: schema.id.clone(),
            title: schema.title.clone(),
            visible: schema.visible.unwrap_or(true),
            groups,
        }
    }
}

pub struct TabSetWidget {
    pub id: String,
    pub visible: bool,
    pub width: Option<String>,
    pub tabs: Vec<WidgetRef>,
    /// Index into `tabs` of the tab currently shown.
    pub selected: usize,
}

impl TabSetWidget {
    pub fn new(schema: &TabSetSchema, tabs: Vec<WidgetRef>) -> Self {
        Self {
            id: schema.id.clone(),
            visible: schema.visible.unwrap_or(true),
            width: schema.width.clone(),
            tabs,
            selected: 0,
        }
    }

    /// Switch the shown tab. Out-of-range indices are ignored with a
    /// warning.
    pub fn select_tab(&mut self, index: usize) {
        if index < self.tabs.len() {
            self.selected = index;
        } else {
            warn!(tabset = %self.id, index, "tab index out of range");
        }
    }
}

/// Container for one or more charts. The line data itself lives in the
/// chart engine; the widget carries layout state and the chart ids it
/// declared, so teardown can remove them again.
pub struct ChartSetWidget {
    pub id: String,
    pub visible: bool,
    pub width: Option<String>,
    pub chart_ids: Vec<String>,
}

impl ChartSetWidget {
    pub fn new(schema: &ChartSetSchema) -> Self {
        Self {
            id: schema.id.clone(),
            visible: schema.visible.unwrap_or(true),
            width: schema.width.clone(),
            chart_ids: schema.charts.iter().map(|c| c.id.clone()).collect(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Widget enum
// ─────────────────────────────────────────────────────────────────────────────

/// Any node of the widget tree.
pub enum Widget {
    Parameter(ParameterWidget),
    Command(CommandWidget),
    Group(GroupWidget),
    Tab(TabWidget),
    TabSet(TabSetWidget),
    ChartSet(ChartSetWidget),
}

impl Widget {
    pub fn id(&self) -> &str {
        match self {
            Widget::Parameter(w) => w.id(),
            Widget::Command(w) => w.id(),
            Widget::Group(w) => &w.id,
            Widget::Tab(w) => &w.id,
            Widget::TabSet(w) => &w.id,
            Widget::ChartSet(w) => &w.id,
        }
    }

    pub fn is_visible(&self) -> bool {
        match self {
            Widget::Parameter(w) => w.is_visible(),
            Widget::Command(w) => w.is_visible(),
            Widget::Group(w) => w.visible,
            Widget::Tab(w) => w.visible,
            Widget::TabSet(w) => w.visible,
            Widget::ChartSet(w) => w.visible,
        }
    }

    pub fn set_visibility(&mut self, visible: bool) {
        match self {
            Widget::Parameter(w) => w.set_visibility(visible),
            Widget::Command(w) => w.set_visibility(visible),
            Widget::Group(w) => w.visible = visible,
            Widget::Tab(w) => w.visible = visible,
            Widget::TabSet(w) => w.visible = visible,
            Widget::ChartSet(w) => w.visible = visible,
        }
    }

    /// Direct children, empty for leaves.
    pub fn children(&self) -> &[WidgetRef] {
        match self {
            Widget::Group(w) => &w.children,
            Widget::Tab(w) => &w.groups,
            Widget::TabSet(w) => &w.tabs,
            _ => &[],
        }
    }

    /// Advance time-driven state (command auto-resets) through the subtree.
    /// Returns how many widgets changed presentation.
    pub fn tick(&mut self, now: Instant) -> usize {
        match self {
            Widget::Command(w) => usize::from(w.tick(now)),
            Widget::Parameter(_) | Widget::ChartSet(_) => 0,
            _ => {
                let children: Vec<WidgetRef> = self.children().to_vec();
                children
                    .iter()
                    .map(|c| c.borrow_mut().tick(now))
                    .sum()
            }
        }
    }

    /// Collect this widget's id and every descendant id, depth-first.
    pub fn collect_ids(&self, out: &mut Vec<String>) {
        out.push(self.id().to_string());
        for child in self.children() {
            child.borrow().collect_ids(out);
        }
    }

    pub fn as_parameter(&self) -> Option<&ParameterWidget> {
        match self {
            Widget::Parameter(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_parameter_mut(&mut self) -> Option<&mut ParameterWidget> {
        match self {
            Widget::Parameter(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_command(&self) -> Option<&CommandWidget> {
        match self {
            Widget::Command(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_command_mut(&mut self) -> Option<&mut CommandWidget> {
        match self {
            Widget::Command(w) => Some(w),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────
