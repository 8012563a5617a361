use bytes::Bytes;

/// Close code sent when the client ends a session on purpose.
pub const NORMAL_CLOSE_CODE: u16 = 1000;
/// Close reason sent alongside [`NORMAL_CLOSE_CODE`].
pub const NORMAL_CLOSE_REASON: &str = "Application exit.";

/// Transport-neutral websocket frame type.
///
/// Transports convert their native frame representation into/from `WsFrame`, so the
/// supervisor and dispatcher never see tungstenite types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsFrame {
    Text(Bytes),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<WsCloseFrame>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsCloseFrame {
    pub code: u16,
    pub reason: Bytes,
}

impl WsCloseFrame {
    pub fn reason_lossy(&self) -> String {
        String::from_utf8_lossy(self.reason.as_ref()).into_owned()
    }
}

impl WsFrame {
    /// Text frame from an owned string (always valid UTF-8).
    #[inline]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(Bytes::from(text.into()))
    }

    #[inline]
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close(Some(WsCloseFrame {
            code,
            reason: Bytes::from(reason.into()),
        }))
    }

    /// The close frame sent by `disconnect()`/`finish()`.
    #[inline]
    pub fn normal_close() -> Self {
        Self::Close(Some(WsCloseFrame {
            code: NORMAL_CLOSE_CODE,
            reason: Bytes::from_static(NORMAL_CLOSE_REASON.as_bytes()),
        }))
    }

    /// Borrow the payload of a text frame as `&str`.
    ///
    /// Returns `None` for non-text frames and for text frames that are not valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsFrame::Text(bytes) => std::str::from_utf8(bytes.as_ref()).ok(),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WsFrame::Text(_) => "text",
            WsFrame::Binary(_) => "binary",
            WsFrame::Ping(_) => "ping",
            WsFrame::Pong(_) => "pong",
            WsFrame::Close(_) => "close",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_close_carries_code_and_reason() {
        let WsFrame::Close(Some(frame)) = WsFrame::normal_close() else {
            panic!("expected a close frame");
        };
        assert_eq!(frame.code, 1000);
        assert_eq!(frame.reason_lossy(), "Application exit.");
    }

    #[test]
    fn as_text_only_reads_text_frames() {
        assert_eq!(WsFrame::text("{}").as_text(), Some("{}"));
        assert_eq!(WsFrame::Binary(Bytes::from_static(b"{}")).as_text(), None);
        assert_eq!(WsFrame::Text(Bytes::from_static(&[0xff, 0xfe])).as_text(), None);
    }
}
