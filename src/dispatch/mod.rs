//! Inbound message classification and dispatch.
//!
//! The dispatcher runs inside the connection's reader task. It never touches connection state:
//! every payload is classified, decoded, logged and optionally forwarded to the application sink.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::core::RenosResult;
use crate::protocol::{ClassifiedMessage, decode_event, decode_response};

pub mod render;

pub use render::{RenderedEvent, ResponseLine, render_event, render_response, render_tag};

const RESPONSE_MARKER: &str = "response";
const EVENT_MARKER: &str = "event";

/// Coarse category of an inbound payload, decided before decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadCategory {
    Response,
    Event,
    Unclassified,
}

/// Pick the category by top-level marker key. Responses win when both markers appear.
/// Marker words appearing as values or in nested objects do not count.
pub fn categorize(text: &str) -> PayloadCategory {
    if has_top_level_key(text, RESPONSE_MARKER) {
        PayloadCategory::Response
    } else if has_top_level_key(text, EVENT_MARKER) {
        PayloadCategory::Event
    } else {
        PayloadCategory::Unclassified
    }
}

fn has_top_level_key(text: &str, key: &str) -> bool {
    sonic_rs::get(text, &[key]).is_ok()
}

/// Classify and decode a payload. `Ok(None)` means it carried neither marker.
pub fn classify(text: &str) -> RenosResult<Option<ClassifiedMessage>> {
    match categorize(text) {
        PayloadCategory::Response => {
            decode_response(text).map(|response| Some(ClassifiedMessage::Response(response)))
        }
        PayloadCategory::Event => {
            decode_event(text).map(|event| Some(ClassifiedMessage::Event(event)))
        }
        PayloadCategory::Unclassified => Ok(None),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched,
    Ignored,
    Rejected,
}

pub struct Dispatcher {
    connection: Arc<str>,
    sink: Option<mpsc::UnboundedSender<ClassifiedMessage>>,
}

impl Dispatcher {
    pub fn new(
        connection: Arc<str>,
        sink: Option<mpsc::UnboundedSender<ClassifiedMessage>>,
    ) -> Self {
        Self { connection, sink }
    }

    pub fn dispatch(&mut self, text: &str) -> DispatchOutcome {
        debug!(connection = %self.connection, payload = text, "received from server");

        let message = match classify(text) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(connection = %self.connection, "ignoring payload without response or event marker");
                return DispatchOutcome::Ignored;
            }
            Err(err) => {
                error!(connection = %self.connection, error = %err, "failed to handle inbound message");
                return DispatchOutcome::Rejected;
            }
        };

        match &message {
            ClassifiedMessage::Response(response) => match render_response(response) {
                ResponseLine::Failure(line) => error!(connection = %self.connection, "{line}"),
                ResponseLine::Success(line) => info!(connection = %self.connection, "{line}"),
            },
            ClassifiedMessage::Event(event) => {
                let rendered = render_event(event);
                info!(connection = %self.connection, "{}", rendered.envelope);
                for line in &rendered.tag_lines {
                    info!(connection = %self.connection, "   {line}");
                }
            }
        }

        self.forward(message);
        DispatchOutcome::Dispatched
    }

    fn forward(&mut self, message: ClassifiedMessage) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        if sink.send(message).is_err() {
            debug!(connection = %self.connection, "message sink closed, dropping it");
            self.sink = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{EventKind, ResponseKind};
    use std::io::{self, Write};
    use std::sync::Mutex;
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct LogCapture {
        bytes: Arc<Mutex<Vec<u8>>>,
    }

    impl LogCapture {
        fn install(&self, level: LevelFilter) -> tracing::subscriber::DefaultGuard {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(self.clone())
                .with_ansi(false)
                .with_target(false);
            let subscriber = tracing_subscriber::registry().with(level).with(layer);
            tracing::subscriber::set_default(subscriber)
        }

        fn text(&self) -> String {
            let guard = self
                .bytes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            String::from_utf8_lossy(&guard).to_string()
        }
    }

    struct LogCaptureWriter {
        bytes: Arc<Mutex<Vec<u8>>>,
    }

    impl Write for LogCaptureWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.bytes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
        type Writer = LogCaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            LogCaptureWriter {
                bytes: Arc::clone(&self.bytes),
            }
        }
    }

    fn dispatcher() -> (Dispatcher, mpsc::UnboundedReceiver<ClassifiedMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Dispatcher::new(Arc::from("ws://test"), Some(tx)), rx)
    }

    #[test]
    fn response_marker_takes_precedence() {
        assert_eq!(
            categorize(r#"{"response":"subscribe","content":{"message":"event"}}"#),
            PayloadCategory::Response
        );
        assert_eq!(
            categorize(r#"{"event":"rf_alarm","time":"t"}"#),
            PayloadCategory::Event
        );
        assert_eq!(categorize(r#"{"hello":1}"#), PayloadCategory::Unclassified);
    }

    #[test]
    fn marker_words_in_values_do_not_change_the_category() {
        let payload = r#"{"event":"input_observation","time":"t0","status":"response"}"#;
        assert_eq!(categorize(payload), PayloadCategory::Event);
        assert_eq!(
            categorize(r#"{"unrelated":{"response":"heartbeat"}}"#),
            PayloadCategory::Unclassified
        );

        let (mut dispatcher, mut rx) = dispatcher();
        assert_eq!(dispatcher.dispatch(payload), DispatchOutcome::Dispatched);
        let Ok(ClassifiedMessage::Event(event)) = rx.try_recv() else {
            panic!("expected the input observation");
        };
        assert_eq!(
            event.kind,
            EventKind::InputObservation {
                status: "response".to_string()
            }
        );
    }

    #[test]
    fn unknown_response_is_logged_as_an_error_with_its_message() {
        let capture = LogCapture::default();
        let _guard = capture.install(LevelFilter::ERROR);
        let (mut dispatcher, _rx) = dispatcher();

        assert_eq!(
            dispatcher.dispatch(r#"{"response":"heartbeat","content":{"message":"ok"}}"#),
            DispatchOutcome::Dispatched
        );
        assert!(capture.text().is_empty(), "success responses stay below error");

        assert_eq!(
            dispatcher.dispatch(r#"{"response":"unknown","content":{"message":"Invalid token"}}"#),
            DispatchOutcome::Dispatched
        );
        let logged = capture.text();
        let line = logged
            .lines()
            .find(|line| line.contains("There was an error with the sent request: Invalid token"))
            .unwrap_or_else(|| panic!("failure line missing from {logged:?}"));
        assert!(line.contains("ERROR"));
    }

    #[test]
    fn successful_response_is_logged_with_its_kind() {
        let capture = LogCapture::default();
        let _guard = capture.install(LevelFilter::INFO);
        let (mut dispatcher, _rx) = dispatcher();

        dispatcher.dispatch(r#"{"response":"subscribe","content":{"message":"ok"}}"#);
        let logged = capture.text();
        let line = logged
            .lines()
            .find(|line| line.contains("Received response: subscribe"))
            .unwrap_or_else(|| panic!("success line missing from {logged:?}"));
        assert!(line.contains("INFO"));
    }

    #[test]
    fn classified_messages_reach_the_sink_in_order() {
        let (mut dispatcher, mut rx) = dispatcher();
        assert_eq!(
            dispatcher.dispatch(r#"{"response":"heartbeat"}"#),
            DispatchOutcome::Dispatched
        );
        assert_eq!(
            dispatcher.dispatch(r#"{"event":"metal_alarm","time":"t0"}"#),
            DispatchOutcome::Dispatched
        );

        let Ok(ClassifiedMessage::Response(first)) = rx.try_recv() else {
            panic!("expected a response first");
        };
        assert_eq!(first.kind, ResponseKind::Heartbeat);
        let Ok(ClassifiedMessage::Event(second)) = rx.try_recv() else {
            panic!("expected an event second");
        };
        assert!(matches!(second.kind, EventKind::Detection(_)));
    }

    #[test]
    fn malformed_and_unmarked_payloads_are_contained() {
        let (mut dispatcher, mut rx) = dispatcher();
        assert_eq!(dispatcher.dispatch("not json"), DispatchOutcome::Ignored);
        assert_eq!(
            dispatcher.dispatch(r#"{"event":12,"time":"t0"}"#),
            DispatchOutcome::Rejected
        );
        assert_eq!(
            dispatcher.dispatch(r#"{"event":"input_observation","time":"t0"}"#),
            DispatchOutcome::Rejected
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_sink_is_dropped_without_failing_dispatch() {
        let (mut dispatcher, rx) = dispatcher();
        drop(rx);
        assert_eq!(
            dispatcher.dispatch(r#"{"response":"heartbeat"}"#),
            DispatchOutcome::Dispatched
        );
        assert!(dispatcher.sink.is_none());
    }
}
