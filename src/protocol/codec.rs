//! JSON text codec for the events channel.

use serde::Deserialize;

use super::{
    ControlMessage, Direction, EventKind, EventMessage, EventType, Locality, ResponseContent,
    ResponseMessage, TagRecord,
};
use crate::core::{RenosError, RenosResult};

pub fn encode(message: &ControlMessage) -> RenosResult<String> {
    sonic_rs::to_string(message).map_err(|e| RenosError::Encode(e.to_string()))
}

#[derive(Deserialize)]
struct RawResponse {
    response: String,
    #[serde(default)]
    content: Option<ResponseContent>,
}

pub fn decode_response(text: &str) -> RenosResult<ResponseMessage> {
    let raw: RawResponse =
        sonic_rs::from_str(text).map_err(|e| RenosError::Decode(e.to_string()))?;
    Ok(ResponseMessage {
        kind: raw.response.into(),
        content: raw.content,
    })
}

#[derive(Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    id: Option<String>,
    time: String,
    #[serde(default)]
    group: Option<u32>,
    #[serde(default)]
    units: Option<Vec<u32>>,
    #[serde(default)]
    aisle: Option<u32>,
    #[serde(default)]
    direction: Option<Direction>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    epcs: Option<Vec<TagRecord>>,
    #[serde(default)]
    sd_address: Option<String>,
}

fn required<T>(value: Option<T>, event: &str, field: &str) -> RenosResult<T> {
    value.ok_or_else(|| RenosError::Decode(format!("{event} event without {field}")))
}

pub fn decode_event(text: &str) -> RenosResult<EventMessage> {
    let raw: RawEvent = sonic_rs::from_str(text).map_err(|e| RenosError::Decode(e.to_string()))?;

    let kind = match EventType::from_tag(&raw.event) {
        Some(EventType::InputObservation) => EventKind::InputObservation {
            status: required(raw.status, &raw.event, "status")?,
        },
        Some(EventType::RfidObservation) => EventKind::RfidObservation {
            epcs: required(raw.epcs, &raw.event, "epcs")?,
        },
        Some(EventType::RfidMove) => EventKind::RfidMove {
            epcs: required(raw.epcs, &raw.event, "epcs")?,
            direction: required(raw.direction, &raw.event, "direction")?,
        },
        Some(EventType::SdLabelDetect) => EventKind::SdLabelDetect {
            sd_address: required(raw.sd_address, &raw.event, "sd_address")?,
        },
        Some(other) => EventKind::Detection(other),
        None => EventKind::Unrecognized(raw.event.clone()),
    };

    Ok(EventMessage {
        tag: raw.event,
        id: raw.id,
        time: raw.time,
        locality: Locality {
            units: raw.units,
            aisle: raw.aisle,
            group: raw.group,
        },
        direction: raw.direction,
        kind,
    })
}
