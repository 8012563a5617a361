use std::fmt::Write as _;

use crate::protocol::{EventKind, EventMessage, Locality, ResponseMessage, TagRecord};

/// Log line for a response, split by outcome so the caller can pick the level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseLine {
    Failure(String),
    Success(String),
}

pub fn render_response(response: &ResponseMessage) -> ResponseLine {
    if response.is_failure() {
        ResponseLine::Failure(format!(
            "There was an error with the sent request: {}",
            response.content_message().unwrap_or("no details")
        ))
    } else {
        ResponseLine::Success(format!("Received response: {}", response.kind))
    }
}

/// Human readable form of an event: the envelope line followed by one line per tag record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedEvent {
    pub envelope: String,
    pub tag_lines: Vec<String>,
}

fn push_locality(out: &mut String, locality: &Locality) {
    if let Some(units) = &locality.units {
        let _ = write!(out, " by unit(s) {units:?}");
    }
    if let Some(aisle) = locality.aisle {
        let _ = write!(out, " in aisle {aisle}");
    }
    if let Some(group) = locality.group {
        let _ = write!(out, " in group {group}");
    }
}

pub fn render_tag(tag: &TagRecord) -> String {
    let mut line = tag.epc.clone();
    if let Some(status) = &tag.eas_status {
        let _ = write!(line, " with EAS status {status}");
    }
    line.push_str(" detected");
    push_locality(&mut line, &tag.locality());
    let _ = write!(line, " at {}", tag.time);
    line
}

pub fn render_event(event: &EventMessage) -> RenderedEvent {
    let mut envelope = format!("Received {}, detected", event.tag);
    push_locality(&mut envelope, &event.locality);
    let _ = write!(envelope, " at {}", event.time);
    if let Some(direction) = event.direction {
        let _ = write!(envelope, " with direction {direction}");
    }

    let tags = match &event.kind {
        EventKind::InputObservation { status } => {
            let _ = write!(envelope, " with status: {status}");
            None
        }
        EventKind::RfidObservation { epcs } | EventKind::RfidMove { epcs, .. } => {
            envelope.push_str(" with EPCs:");
            Some(epcs)
        }
        EventKind::SdLabelDetect { sd_address } => {
            let _ = write!(envelope, " SD address {sd_address}");
            None
        }
        EventKind::Detection(_) | EventKind::Unrecognized(_) => None,
    };

    RenderedEvent {
        envelope,
        tag_lines: tags
            .map(|epcs| epcs.iter().map(render_tag).collect())
            .unwrap_or_default(),
    }
}
