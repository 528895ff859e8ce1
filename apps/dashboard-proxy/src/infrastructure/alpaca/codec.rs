//! Stream Codec Module
//!
//! Decodes text frames from the stock data WebSocket and encodes outbound
//! control messages.
//!
//! Frames are JSON arrays whose elements are discriminated by a `T` field:
//! ```json
//! [{"T":"success","msg":"connected"}]
//! [{"T":"b","S":"AAPL","o":179.5,...},{"T":"b","S":"MSFT",...}]
//! ```
//! A bare object is accepted as a one-element frame.

use crate::infrastructure::alpaca::messages::{
    ErrorMessage, StockBarMessage, StreamMessage, SubscriptionMessage, SuccessMessage,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is neither an array nor an object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the stock stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// Elements with a type this gateway does not use (quotes, trades,
    /// statuses) are skipped. An element that fails to deserialize is logged
    /// and dropped without affecting the rest of the frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame itself is not a JSON array or object.
    pub fn decode(&self, text: &str) -> Result<Vec<StreamMessage>, CodecError> {
        let trimmed = text.trim();

        let values: Vec<serde_json::Value> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)?
        } else if trimmed.starts_with('{') {
            vec![serde_json::from_str(trimmed)?]
        } else {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {preview}..."
            )));
        };

        let mut messages = Vec::with_capacity(values.len());

        for value in values {
            let msg_type = value
                .get("T")
                .and_then(|v| v.as_str())
                .map(str::to_owned);

            match Self::decode_element(msg_type.as_deref(), value) {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => {
                    tracing::trace!(msg_type = ?msg_type, "Skipping unhandled stream message");
                }
                Err(e) => {
                    tracing::warn!(msg_type = ?msg_type, error = %e, "Dropping malformed stream message");
                }
            }
        }

        Ok(messages)
    }

    fn decode_element(
        msg_type: Option<&str>,
        value: serde_json::Value,
    ) -> Result<Option<StreamMessage>, serde_json::Error> {
        let message = match msg_type {
            Some("success") => {
                StreamMessage::Success(serde_json::from_value::<SuccessMessage>(value)?)
            }
            Some("error") => {
                StreamMessage::Error(serde_json::from_value::<ErrorMessage>(value)?)
            }
            Some("subscription") => {
                StreamMessage::Subscription(serde_json::from_value::<SubscriptionMessage>(value)?)
            }
            Some("b" | "d" | "u") => {
                StreamMessage::Bar(serde_json::from_value::<StockBarMessage>(value)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    /// Encode a value to JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::alpaca::messages::{SubscriptionRequest, SuccessKind};

    #[test]
    fn decode_greeting() {
        let messages = JsonCodec::new()
            .decode(r#"[{"T":"success","msg":"connected"}]"#)
            .unwrap();

        assert_eq!(messages.len(), 1);
        assert!(matches!(
            &messages[0],
            StreamMessage::Success(m) if m.msg == SuccessKind::Connected
        ));
    }

    #[test]
    fn decode_single_object() {
        let messages = JsonCodec::new()
            .decode(r#"{"T":"error","code":406,"msg":"connection limit exceeded"}"#)
            .unwrap();

        assert!(matches!(&messages[0], StreamMessage::Error(e) if e.code == 406));
    }

    #[test]
    fn decode_mixed_batch_skips_unused_types() {
        let frame = r#"[
            {"T":"b","S":"AAPL","o":100.0,"h":101.5,"l":99.5,"c":101.0,"v":1200,"t":"2024-03-01T14:30:00Z"},
            {"T":"q","S":"AAPL","bp":100.9,"ap":101.1},
            {"T":"d","S":"MSFT","o":400.0,"h":405.0,"l":398.0,"c":404.0,"v":900000,"t":"2024-03-01T00:00:00Z"},
            {"T":"subscription","bars":["AAPL","MSFT"]}
        ]"#;

        let messages = JsonCodec::new().decode(frame).unwrap();

        assert_eq!(messages.len(), 3);
        assert!(matches!(&messages[0], StreamMessage::Bar(b) if b.symbol == "AAPL"));
        assert!(matches!(&messages[1], StreamMessage::Bar(b) if b.msg_type == "d"));
        assert!(matches!(&messages[2], StreamMessage::Subscription(s) if s.bars.len() == 2));
    }

    #[test]
    fn decode_empty_array() {
        assert!(JsonCodec::new().decode("[]").unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            JsonCodec::new().decode("hello"),
            Err(CodecError::InvalidFormat(_))
        ));
        assert!(matches!(
            JsonCodec::new().decode("[{"),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn decode_malformed_bar_is_dropped() {
        let messages = JsonCodec::new().decode(r#"[{"T":"b","S":"AAPL"}]"#).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn malformed_element_keeps_the_rest_of_the_frame() {
        let frame = r#"[
            {"T":"b","S":"AAPL","o":100.0,"h":101.5,"l":99.5,"c":101.0,"v":1200,"t":"2024-03-01T14:30:00Z"},
            {"T":"b","S":"MSFT","o":1.0},
            {"T":"u","S":"TSLA","o":200.0,"h":201.0,"l":199.0,"c":200.5,"v":300,"t":"2024-03-01T14:30:00Z"}
        ]"#;

        let messages = JsonCodec::new().decode(frame).unwrap();

        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], StreamMessage::Bar(b) if b.symbol == "AAPL"));
        assert!(matches!(&messages[1], StreamMessage::Bar(b) if b.symbol == "TSLA"));
    }

    #[test]
    fn unknown_success_notice_does_not_drop_bars() {
        let frame = r#"[
            {"T":"success","msg":"something"},
            {"T":"b","S":"AAPL","o":100.0,"h":101.5,"l":99.5,"c":101.0,"v":1200,"t":"2024-03-01T14:30:00Z"}
        ]"#;

        let messages = JsonCodec::new().decode(frame).unwrap();

        assert_eq!(messages.len(), 2);
        assert!(matches!(
            &messages[0],
            StreamMessage::Success(m) if m.msg == SuccessKind::Unknown
        ));
        assert!(matches!(&messages[1], StreamMessage::Bar(b) if b.symbol == "AAPL"));
    }

    #[test]
    fn encode_subscription() {
        let json = JsonCodec::new()
            .encode(&SubscriptionRequest::subscribe_bars(vec!["AAPL".to_string()]))
            .unwrap();
        assert_eq!(json, r#"{"action":"subscribe","bars":["AAPL"]}"#);
    }
}
