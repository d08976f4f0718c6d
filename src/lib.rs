//! PanelKit crate root: re-exports and module wiring.
//!
//! Schema-driven control panels: a declarative JSON document describes
//! tabs, groups, parameter inputs, command buttons and live charts; the
//! crate turns it into a widget tree with typed runtime state, an
//! id-addressed value registry, a publish/subscribe event bus and a chart
//! line aggregation engine. Rendering and transport stay with the host:
//! widgets mirror into a `Surface`, charts hand out `ChartRender`
//! snapshots, and `link` defines the wire messages.
//!
//! Module map:
//! - `schema`: serde model of the versioned document
//! - `validator`: structural validation, reported once
//! - `bus`: named-topic event bus with panic-isolated handlers
//! - `registry`: id → widget lookup and silent value updates
//! - `widget`: parameter/command/container runtime state
//! - `factory`: schema items → widget tree
//! - `chart`: marker/formula/real-time line aggregation
//! - `eval`: formula evaluation behind the `Evaluator` trait
//! - `sched`: frame coalescing and cancellable deadlines
//! - `surface`: presentation seam the host implements
//! - `controller`: the composition root hosts drive
//! - `link`: inbound/outbound transport messages

pub mod bus;
pub mod chart;
pub mod controller;
pub mod eval;
pub mod factory;
pub mod link;
pub mod registry;
pub mod sched;
pub mod schema;
pub mod surface;
pub mod validator;
pub mod widget;

// Public re-exports for a compact external API
pub use bus::{EventBus, Subscription};
pub use chart::{Annotation, ChartEngine, ChartRender, Dataset, LinePoints};
pub use controller::PanelController;
pub use eval::{BasicEvaluator, EvalError, Evaluator};
pub use link::{apply_inbound, apply_inbound_json, forward_outbound, Inbound, Outbound};
pub use registry::ValueRegistry;
pub use schema::SchemaDocument;
pub use surface::Surface;
pub use validator::{validate, SchemaError, SUPPORTED_VERSIONS};
pub use widget::{Handlers, ParamValue, Widget};
