//! Presentation seam between widgets and whatever renders them.
//!
//! The core never touches a concrete UI toolkit. A renderer attaches a
//! [`Surface`] to a widget; the widget reflects value and visibility changes
//! into it and, when the surface exposes a live value (an editable input),
//! reads the current value back from it. With no surface attached the
//! widget's cached value is the source of truth.

use crate::widget::ParamValue;
use std::cell::RefCell;
use std::rc::Rc;

/// One widget's presentation binding.
pub trait Surface {
    /// Current value held by the live input, if this surface has one.
    /// Returning `None` makes the widget fall back to its cached value.
    fn read_value(&self) -> Option<ParamValue> {
        None
    }

    /// Mirror a programmatic value change into the presentation.
    fn reflect_value(&mut self, value: &ParamValue);

    /// Mirror a visibility change into the presentation.
    fn reflect_visibility(&mut self, visible: bool);
}

/// Everything a [`RecordingSurface`] has observed.
#[derive(Debug, Default, Clone)]
pub struct SurfaceRecord {
    /// Value the simulated live input currently holds.
    pub live_value: Option<ParamValue>,
    /// All values reflected into the surface, in order.
    pub reflected: Vec<ParamValue>,
    /// All visibility changes reflected into the surface, in order.
    pub visibility: Vec<bool>,
}

/// Test/double surface that records reflections and can simulate a live
/// input by pre-setting a value. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    record: Rc<RefCell<SurfaceRecord>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the record, kept valid after the surface is boxed
    /// and attached to a widget.
    pub fn record(&self) -> Rc<RefCell<SurfaceRecord>> {
        self.record.clone()
    }

    /// Simulate the user editing the live input directly.
    pub fn set_live_value(&self, value: ParamValue) {
        self.record.borrow_mut().live_value = Some(value);
    }
}

impl Surface for RecordingSurface {
    fn read_value(&self) -> Option<ParamValue> {
        self.record.borrow().live_value.clone()
    }

    fn reflect_value(&mut self, value: &ParamValue) {
        let mut rec = self.record.borrow_mut();
        rec.live_value = Some(value.clone());
        rec.reflected.push(value.clone());
    }

    fn reflect_visibility(&mut self, visible: bool) {
        self.record.borrow_mut().visibility.push(visible);
    }
}
