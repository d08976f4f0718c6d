//! Wire messages bridging a panel to an external transport.
//!
//! The panel core does not own a socket. A host decodes whatever arrives
//! on its transport into an [`Inbound`] and hands it to [`apply_inbound`];
//! in the other direction [`forward_outbound`] taps the interaction topics
//! on the bus and queues [`Outbound`] messages for the host to drain and
//! send. Message framing is JSON with a `type` discriminator.

use std::collections::HashMap;
use std::sync::mpsc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::bus::{
    topics, CommandClicked, CommandToggled, EventBus, ParameterValueChanged, Subscription,
};
use crate::controller::PanelController;

/// Message arriving from the remote side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Inbound {
    /// Batch of authoritative parameter values. Applied silently.
    ParameterUpdate { values: HashMap<String, Value> },
    /// Batch of element visibility flags.
    VisibilityUpdate { elements: HashMap<String, bool> },
    /// A full replacement schema document.
    SchemaUpdate { schema: Value },
    /// One sample for a real-time chart line.
    ChartPoint {
        chart_id: String,
        line_id: String,
        point: [f64; 2],
    },
    /// Full replacement series for a real-time chart line.
    ChartData {
        chart_id: String,
        line_id: String,
        points: Vec<[f64; 2]>,
    },
}

impl Inbound {
    /// Decode a wire frame. Unknown `type` values and malformed frames are
    /// errors; callers typically warn and drop them.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Message to be sent to the remote side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outbound {
    /// The user changed a parameter.
    ParameterChange {
        param_id: String,
        value: Value,
        controller: String,
    },
    /// The user activated a command. `state` carries the new toggle state
    /// and is absent for momentary commands.
    Command {
        command_id: String,
        controller: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<bool>,
    },
}

impl Outbound {
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Apply one inbound message to a panel. Every path is the silent,
/// programmatic one, so remote updates never echo back out.
pub fn apply_inbound(panel: &PanelController, msg: Inbound) {
    match msg {
        Inbound::ParameterUpdate { values } => {
            panel.set_multiple_parameter_values(values.iter().map(|(k, v)| (k.as_str(), v)));
        }
        Inbound::VisibilityUpdate { elements } => {
            for (id, visible) in elements {
                panel.set_element_visibility(&id, visible);
            }
        }
        Inbound::SchemaUpdate { schema } => {
            panel.bus().publish(topics::SCHEMA_UPDATE_RECEIVED, &schema);
        }
        Inbound::ChartPoint {
            chart_id,
            line_id,
            point,
        } => {
            panel.update_chart_line_data(&chart_id, &line_id, point);
        }
        Inbound::ChartData {
            chart_id,
            line_id,
            points,
        } => {
            panel.update_chart_line_data(&chart_id, &line_id, points);
        }
    }
}

/// Decode and apply one wire frame; malformed frames are warned about and
/// dropped.
pub fn apply_inbound_json(panel: &PanelController, frame: &str) {
    match Inbound::from_json_str(frame) {
        Ok(msg) => apply_inbound(panel, msg),
        Err(err) => warn!(%err, "dropping malformed inbound frame"),
    }
}

/// Subscribe to the interaction topics and queue every user action as an
/// [`Outbound`] message. The host drains the receiver and writes the
/// frames to its transport; dropping the subscriptions detaches the tap.
pub fn forward_outbound(bus: &EventBus) -> (mpsc::Receiver<Outbound>, Vec<Subscription>) {
    let (tx, rx) = mpsc::channel();
    let mut subs = Vec::with_capacity(3);
    {
        let tx = tx.clone();
        subs.push(bus.subscribe(topics::PARAMETER_VALUE_CHANGED, move |payload| {
            match serde_json::from_value::<ParameterValueChanged>(payload.clone()) {
                Ok(evt) => {
                    let _ = tx.send(Outbound::ParameterChange {
                        param_id: evt.param_id,
                        value: evt.value,
                        controller: evt.controller_name,
                    });
                }
                Err(err) => warn!(%err, "malformed parameter-change payload"),
            }
        }));
    }
    {
        let tx = tx.clone();
        subs.push(bus.subscribe(topics::COMMAND_CLICKED, move |payload| {
            match serde_json::from_value::<CommandClicked>(payload.clone()) {
                Ok(evt) => {
                    let _ = tx.send(Outbound::Command {
                        command_id: evt.command_id,
                        controller: evt.controller_name,
                        state: None,
                    });
                }
                Err(err) => warn!(%err, "malformed command payload"),
            }
        }));
    }
    subs.push(bus.subscribe(topics::COMMAND_TOGGLED, move |payload| {
        match serde_json::from_value::<CommandToggled>(payload.clone()) {
            Ok(evt) => {
                let _ = tx.send(Outbound::Command {
                    command_id: evt.command_id,
                    controller: evt.controller_name,
                    state: Some(evt.state),
                });
            }
            Err(err) => warn!(%err, "malformed command payload"),
        }
    }));
    (rx, subs)
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inbound_frames_decode_by_type_tag() {
        let msg = Inbound::from_json_str(
            r#"{"type": "PARAMETER_UPDATE", "values": {"speed": 300}}"#,
        )
        .unwrap();
        match msg {
            Inbound::ParameterUpdate { values } => {
                assert_eq!(values.get("speed"), Some(&json!(300)));
            }
            other => panic!("unexpected message {other:?}"),
        }

        let msg = Inbound::from_json_str(
            r#"{"type": "CHART_POINT", "chart_id": "g", "line_id": "rt", "point": [1.0, 2.0]}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            Inbound::ChartPoint {
                chart_id: "g".into(),
                line_id: "rt".into(),
                point: [1.0, 2.0],
            }
        );

        assert!(Inbound::from_json_str(r#"{"type": "WARP_DRIVE"}"#).is_err());
    }

    #[test]
    fn outbound_frames_carry_the_type_tag() {
        let frame = Outbound::ParameterChange {
            param_id: "speed".into(),
            value: json!(42),
            controller: "pump".into(),
        }
        .to_json_string()
        .unwrap();
        let decoded: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(decoded["type"], json!("PARAMETER_CHANGE"));
        assert_eq!(decoded["param_id"], json!("speed"));

        let frame = Outbound::Command {
            command_id: "fire".into(),
            controller: "pump".into(),
            state: None,
        }
        .to_json_string()
        .unwrap();
        let decoded: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(decoded["type"], json!("COMMAND"));
        assert!(decoded.get("state").is_none());
    }

    #[test]
    fn outbound_tap_sees_user_interaction() {
        let bus = EventBus::new();
        let (rx, _subs) = forward_outbound(&bus);
        bus.publish_event(
            topics::COMMAND_TOGGLED,
            &CommandToggled {
                command_id: "start".into(),
                controller_name: "pump".into(),
                state: true,
            },
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Command {
                command_id: "start".into(),
                controller: "pump".into(),
                state: Some(true),
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
