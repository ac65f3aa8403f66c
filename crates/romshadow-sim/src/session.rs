//! One scripted dialog session
//!
//! Builds the dialog a [`Scenario`] describes, routes its `OnEvent` through a
//! [`ScriptedHandler`], feeds the scripted input to the simulated firmware
//! and blocks in `show` until the firmware loop ends.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;

use romshadow_common::config::OverridePolicy;
use romshadow_common::Scenario;
use romshadow_gui::dialog::DialogParams;
use romshadow_gui::sim;
use romshadow_gui::text_box::DEFAULT_FLAGS;
use romshadow_gui::{Dialog, DialogHandler, ElementId, Event, EventContext, TextBox};

/// Override that answers the event types of an [`OverridePolicy`]
///
/// Everything else goes to the firmware's own handler.
pub struct ScriptedHandler {
    policy: OverridePolicy,
    hits: BTreeMap<u16, u32>,
    forwarded: u32,
    /// Contents of text boxes that handled events referred to
    touched: Vec<(usize, String)>,
}

impl ScriptedHandler {
    pub fn new(policy: OverridePolicy) -> Self {
        Self {
            policy,
            hits: BTreeMap::new(),
            forwarded: 0,
            touched: Vec::new(),
        }
    }
}

impl DialogHandler for ScriptedHandler {
    fn on_event(&mut self, cx: &mut EventContext<'_>, event: &Event) -> i32 {
        if !self.policy.handled.contains(&event.kind) {
            self.forwarded += 1;
            return cx.forward();
        }

        *self.hits.entry(event.kind).or_default() += 1;
        if let Some(id) = event.element {
            if let Some(text) = cx.with_element(id, |t: &TextBox| t.text()) {
                tracing::debug!("event {:#06x} on text box {}: {:?}", event.kind, id.index(), text);
                self.touched.push((id.index(), text));
            }
            cx.refresh();
        }
        self.policy.status
    }
}

/// What happened during a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub title: String,
    pub started: String,
    pub finished: String,
    /// Left, top, right, bottom
    pub bounds: [u16; 4],
    pub elements: usize,
    /// Handled events, by event type
    pub handled: BTreeMap<u16, u32>,
    pub forwarded: u32,
    pub touched: Vec<(usize, String)>,
    /// Event types that reached the firmware's own handler
    pub default_events: Vec<u16>,
    /// Status of every event dispatched by the firmware loop
    pub statuses: Vec<i32>,
    pub refreshes: u32,
    pub closed: bool,
    /// Scripted events the loop never got to
    pub pending: usize,
}

fn timestamp(time: DateTime<Local>) -> String {
    time.to_rfc3339()
}

/// Build, show and tear down the dialog described by `scenario`
pub fn run(scenario: &Scenario) -> Result<SessionReport> {
    let started = Local::now();
    let setup = &scenario.dialog;

    let params = DialogParams::new(setup.height, setup.alignment, &setup.title).keyboard(setup.keyboard);
    let dialog = Dialog::new(params, ScriptedHandler::new(scenario.policy.clone()))
        .with_context(|| format!("Failed to create dialog {:?}", setup.title))?;

    let mut ids: Vec<ElementId> = Vec::with_capacity(scenario.text_boxes.len());
    for (index, text_box) in scenario.text_boxes.iter().enumerate() {
        let element = TextBox::create(
            text_box.x,
            text_box.y,
            text_box.width,
            text_box.text.as_deref(),
            text_box.max_length,
            text_box.count_by_bytes,
            DEFAULT_FLAGS,
        )
        .with_context(|| format!("Failed to create text box {}", index))?;
        ids.push(dialog.add_element(element));
    }

    let mut input = Vec::with_capacity(scenario.input_count());
    for event in &scenario.events {
        let element = event
            .element
            .and_then(|index| ids.get(index))
            .and_then(|id| dialog.element_ptr(*id));
        for _ in 0..event.repeat {
            input.push(sim::event_for(event.event_type(), event.aux, element));
        }
    }
    tracing::info!("Queued {} input events for {:?}", input.len(), setup.title);
    if !sim::queue_input(dialog.object_ptr(), input) {
        anyhow::bail!("Simulated firmware does not know dialog {:?}", setup.title);
    }

    dialog.show().context("Dialog event loop failed")?;

    let snapshot = sim::snapshot(dialog.object_ptr()).context("Dialog vanished from the simulated firmware")?;
    let bounds = dialog.bounds();
    let handler = dialog.handler();

    Ok(SessionReport {
        title: setup.title.clone(),
        started: timestamp(started),
        finished: timestamp(Local::now()),
        bounds: [bounds.left, bounds.top, bounds.right, bounds.bottom],
        elements: dialog.element_count(),
        handled: handler.hits.clone(),
        forwarded: handler.forwarded,
        touched: handler.touched.clone(),
        default_events: snapshot.default_events,
        statuses: snapshot.statuses,
        refreshes: snapshot.refreshes,
        closed: snapshot.closed,
        pending: snapshot.pending,
    })
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dialog {:?} ({} .. {})", self.title, self.started, self.finished)?;
        let [left, top, right, bottom] = self.bounds;
        writeln!(f, "  bounds:    ({}, {}) - ({}, {})", left, top, right, bottom)?;
        writeln!(f, "  elements:  {}", self.elements)?;
        for (kind, count) in &self.handled {
            writeln!(f, "  handled:   {:#06x} x{}", kind, count)?;
        }
        writeln!(f, "  forwarded: {}", self.forwarded)?;
        for (index, text) in &self.touched {
            writeln!(f, "  text box {}: {:?}", index, text)?;
        }
        writeln!(f, "  statuses:  {:?}", self.statuses)?;
        writeln!(f, "  refreshes: {}", self.refreshes)?;
        write!(
            f,
            "  {} with {} event(s) left",
            if self.closed { "closed" } else { "still open" },
            self.pending
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use romshadow_gui::sim::EVENT_CLOSE;

    fn scenario(text: &str) -> Scenario {
        Scenario::from_toml(text).unwrap()
    }

    #[test]
    fn test_policy_splits_handled_and_forwarded() {
        let report = run(&scenario(
            r#"
[dialog]
height = "Percent55"
alignment = "Center"
title = "Counter"

[policy]
handled = [5]
status = 7

[[events]]
kind = 5
repeat = 3

[[events]]
kind = 2

[[events]]
kind = 16

[[events]]
kind = 5
"#,
        ))
        .unwrap();

        assert_eq!(report.handled.get(&5), Some(&3));
        assert_eq!(report.forwarded, 2);
        assert_eq!(report.default_events, vec![2, EVENT_CLOSE]);
        assert_eq!(report.statuses, vec![7, 7, 7, 0, 0]);
        assert!(report.closed);
        assert_eq!(report.pending, 1);
    }

    #[test]
    fn test_button_event_on_text_box() {
        let report = run(&scenario(
            r#"
[dialog]
height = "Percent75"
alignment = "Bottom"
title = "Form"

[[text_boxes]]
x = 10
y = 40
width = 200
text = "first"
max_length = 32

[[text_boxes]]
x = 10
y = 80
width = 200
text = "second"
max_length = 32

[policy]
handled = [0x98]

[[events]]
button = 1
element = 1

[[events]]
kind = 16
"#,
        ))
        .unwrap();

        assert_eq!(report.elements, 2);
        assert_eq!(report.touched, vec![(1, "second".to_string())]);
        assert_eq!(report.refreshes, 1);
        assert_eq!(report.bounds[3], 527);
        assert!(report.closed);
    }

    #[test]
    fn test_unclosed_session_reports_open() {
        let report = run(&scenario(
            r#"
[dialog]
height = "Percent25"
alignment = "Top"
title = "Stuck"

[policy]
handled = [16]

[[events]]
kind = 16
"#,
        ))
        .unwrap();

        assert!(!report.closed);
        assert_eq!(report.pending, 0);
        assert!(report.to_string().contains("still open"));
    }

    #[test]
    fn test_report_serializes() {
        let report = run(&scenario(
            r#"
[dialog]
height = "Percent35"
alignment = "Center"
title = "Json"
"#,
        ))
        .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["title"], "Json");
        assert_eq!(json["elements"], 0);
    }
}
