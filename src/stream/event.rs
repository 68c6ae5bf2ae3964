use crate::constants::FEATURES_EVENT;
use crate::DecodeError;
use crate::Payload;

/// One event read off the realtime channel, before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub event_type: String,
    pub body: String,
}

impl StreamEvent {
    pub fn new(
        event_type: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            body: body.into(),
        }
    }
}

/// Decoded form of a [`StreamEvent`]
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Replacement features document for the subscribed key
    Features(Payload),
    /// Any other event type; carries the tag
    Unknown(String),
}

impl StreamMessage {
    /// Only `features` events have their body decoded; everything else is
    /// passed through by tag.
    pub fn decode(event: &StreamEvent) -> Result<Self, DecodeError> {
        if event.event_type == FEATURES_EVENT {
            Ok(StreamMessage::Features(Payload::from_json(&event.body)?))
        } else {
            Ok(StreamMessage::Unknown(event.event_type.clone()))
        }
    }
}
