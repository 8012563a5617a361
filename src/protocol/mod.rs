//! Typed messages exchanged on the events channel.
//!
//! Outbound requests are tagged by a `"request"` key, inbound replies by `"response"` and inbound
//! notifications by `"event"`. The JSON text encoding itself lives in [`codec`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{RenosError, RenosResult};

pub mod codec;

pub use codec::{decode_event, decode_response, encode};

/// Event channels a client can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RfAlarm,
    RfidAlarm,
    IrDirection,
    MetalAlarm,
    RfidObservation,
    RfidMove,
    InputObservation,
    SdLabelDetect,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [EventType; 8] = [
        EventType::RfAlarm,
        EventType::RfidAlarm,
        EventType::IrDirection,
        EventType::MetalAlarm,
        EventType::RfidObservation,
        EventType::RfidMove,
        EventType::InputObservation,
        EventType::SdLabelDetect,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::RfAlarm => "rf_alarm",
            EventType::RfidAlarm => "rfid_alarm",
            EventType::IrDirection => "ir_direction",
            EventType::MetalAlarm => "metal_alarm",
            EventType::RfidObservation => "rfid_observation",
            EventType::RfidMove => "rfid_move",
            EventType::InputObservation => "input_observation",
            EventType::SdLabelDetect => "sd_label_detect",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_str() == tag)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to receive a set of event types, optionally replaying recent history.
///
/// The event list is non-empty and free of duplicates; first occurrence order is what goes on the
/// wire. The replay timestamp is passed through untouched: keeping it within the device's two hour
/// replay window is up to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    include_events_since: Option<String>,
    events: Vec<EventType>,
}

impl SubscriptionRequest {
    pub fn new(events: impl IntoIterator<Item = EventType>) -> RenosResult<Self> {
        let mut unique: Vec<EventType> = Vec::new();
        for event in events {
            if !unique.contains(&event) {
                unique.push(event);
            }
        }
        if unique.is_empty() {
            return Err(RenosError::InvalidRequest(
                "a subscription needs at least one event type".to_string(),
            ));
        }
        Ok(Self {
            reference: None,
            include_events_since: None,
            events: unique,
        })
    }

    /// Subscription to every event type.
    pub fn all() -> Self {
        Self {
            reference: None,
            include_events_since: None,
            events: EventType::ALL.to_vec(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Replay events since the given ISO-8601 timestamp.
    pub fn with_events_since(mut self, since: impl Into<String>) -> Self {
        self.include_events_since = Some(since.into());
        self
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn events_since(&self) -> Option<&str> {
        self.include_events_since.as_deref()
    }

    pub fn events(&self) -> &[EventType] {
        &self.events
    }
}

/// Outbound control messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ControlMessage {
    Authenticate { token: String },
    Heartbeat,
    Subscribe(SubscriptionRequest),
}

impl ControlMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ControlMessage::Authenticate { .. } => "authenticate",
            ControlMessage::Heartbeat => "heartbeat",
            ControlMessage::Subscribe(_) => "subscribe",
        }
    }
}

/// Kind tag of a response. `Unknown` is what the device answers to a request it could not honour.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseKind {
    Authenticate,
    Heartbeat,
    Subscribe,
    Unknown,
    Other(String),
}

impl From<String> for ResponseKind {
    fn from(tag: String) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "authenticate" => ResponseKind::Authenticate,
            "heartbeat" => ResponseKind::Heartbeat,
            "subscribe" => ResponseKind::Subscribe,
            "unknown" => ResponseKind::Unknown,
            _ => ResponseKind::Other(tag),
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseKind::Authenticate => f.write_str("authenticate"),
            ResponseKind::Heartbeat => f.write_str("heartbeat"),
            ResponseKind::Subscribe => f.write_str("subscribe"),
            ResponseKind::Unknown => f.write_str("unknown"),
            ResponseKind::Other(tag) => f.write_str(tag),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseContent {
    #[serde(default)]
    pub message: Option<String>,
}

/// Reply to a previously sent control message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseMessage {
    pub kind: ResponseKind,
    pub content: Option<ResponseContent>,
}

impl ResponseMessage {
    pub fn is_failure(&self) -> bool {
        self.kind == ResponseKind::Unknown
    }

    /// The embedded explanation, if the device sent one.
    pub fn content_message(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.message.as_deref())
    }
}

/// Motion direction reported by direction-aware detections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[serde(alias = "IN")]
    In,
    #[serde(alias = "OUT")]
    Out,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Unknown => "unknown",
        })
    }
}

/// Optional locality of a detection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Locality {
    pub units: Option<Vec<u32>>,
    pub aisle: Option<u32>,
    pub group: Option<u32>,
}

/// One observed RFID tag.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TagRecord {
    pub epc: String,
    #[serde(default)]
    pub eas_status: Option<String>,
    #[serde(default)]
    pub group: Option<u32>,
    #[serde(default)]
    pub units: Option<Vec<u32>>,
    #[serde(default)]
    pub aisle: Option<u32>,
    pub time: String,
}

impl TagRecord {
    pub fn locality(&self) -> Locality {
        Locality {
            units: self.units.clone(),
            aisle: self.aisle,
            group: self.group,
        }
    }
}

/// Subtype payload of an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Alarm and direction detections without extra payload.
    Detection(EventType),
    InputObservation { status: String },
    RfidObservation { epcs: Vec<TagRecord> },
    RfidMove {
        epcs: Vec<TagRecord>,
        direction: Direction,
    },
    SdLabelDetect { sd_address: String },
    /// Event tag this client does not know about.
    Unrecognized(String),
}

/// Notification pushed by the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventMessage {
    /// Raw event tag as sent by the device.
    pub tag: String,
    pub id: Option<String>,
    pub time: String,
    pub locality: Locality,
    pub direction: Option<Direction>,
    pub kind: EventKind,
}

impl EventMessage {
    pub fn event_type(&self) -> Option<EventType> {
        EventType::from_tag(&self.tag)
    }
}

/// A decoded inbound payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassifiedMessage {
    Response(ResponseMessage),
    Event(EventMessage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_dedups_and_keeps_first_occurrence_order() {
        let request = SubscriptionRequest::new([
            EventType::RfidMove,
            EventType::RfAlarm,
            EventType::RfidMove,
            EventType::InputObservation,
            EventType::RfAlarm,
        ])
        .unwrap();
        assert_eq!(
            request.events(),
            &[
                EventType::RfidMove,
                EventType::RfAlarm,
                EventType::InputObservation
            ]
        );
    }

    #[test]
    fn empty_subscription_is_rejected() {
        assert!(matches!(
            SubscriptionRequest::new(Vec::<EventType>::new()),
            Err(RenosError::InvalidRequest(_))
        ));
    }

    #[test]
    fn all_covers_every_event_type() {
        let request = SubscriptionRequest::all();
        assert_eq!(request.events(), &EventType::ALL);
        assert!(request.reference().is_none());
        assert!(request.events_since().is_none());
    }

    #[test]
    fn event_type_tags_round_trip_through_from_tag() {
        for ty in EventType::ALL {
            assert_eq!(EventType::from_tag(ty.as_str()), Some(ty));
        }
        assert_eq!(EventType::from_tag("door_open"), None);
    }

    #[test]
    fn response_kind_parsing_is_case_insensitive() {
        assert_eq!(ResponseKind::from("UNKNOWN".to_string()), ResponseKind::Unknown);
        assert_eq!(
            ResponseKind::from("Subscribe".to_string()),
            ResponseKind::Subscribe
        );
        assert_eq!(
            ResponseKind::from("reboot".to_string()),
            ResponseKind::Other("reboot".to_string())
        );
    }
}
