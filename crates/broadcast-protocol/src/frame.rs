use crate::error::FrameError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The raw, weakly-typed shape every inbound frame arrives in. Kept around
/// only long enough for [`parse`] to classify it -- nothing downstream
/// touches `RawFrame` directly.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    pub event: Value,
    #[serde(default)]
    pub channel: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    #[serde(rename = "messageId")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub ack: Option<bool>,
    #[serde(default)]
    pub channels: Option<Vec<String>>,
    #[serde(default)]
    #[serde(rename = "channelData")]
    pub channel_data: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub events: Option<Vec<BatchBroadcastItem>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeFrame {
    pub channel: String,
    pub channel_data: Option<Value>,
    pub auth: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnsubscribeFrame {
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSubscribeFrame {
    pub channels: Vec<String>,
    pub channel_data: HashMap<String, Value>,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchUnsubscribeFrame {
    pub channels: Vec<String>,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchBroadcastItem {
    pub channel: String,
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchBroadcastFrame {
    pub items: Vec<BatchBroadcastItem>,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatFrame {
    pub channel: Option<String>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AckFrame {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientEventFrame {
    pub event: String,
    pub channel: String,
    pub data: Value,
}

/// The tagged variant a raw inbound frame is classified into: one of
/// {Subscribe, Unsubscribe, BatchSubscribe, BatchUnsubscribe, BatchBroadcast,
/// Ping, Heartbeat, Ack, ClientEvent, Unknown}.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrameKind {
    Subscribe(SubscribeFrame),
    Unsubscribe(UnsubscribeFrame),
    BatchSubscribe(BatchSubscribeFrame),
    BatchUnsubscribe(BatchUnsubscribeFrame),
    BatchBroadcast(BatchBroadcastFrame),
    Ping,
    Heartbeat(HeartbeatFrame),
    Ack(AckFrame),
    ClientEvent(ClientEventFrame),
    /// Any other structurally-valid frame: forwarded unchanged if it carries
    /// an ack request, otherwise logged and dropped by the orchestrator.
    Unknown(String),
}

/// A structurally-validated inbound frame plus the orthogonal
/// "please ack this" request that can ride along on any frame kind
/// (dispatch table: "Anything else with ack:true, messageId").
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    pub kind: ClientFrameKind,
    pub wants_ack: bool,
    pub message_id: Option<String>,
}

const MAX_EVENT_LEN: usize = 100;

fn valid_event_name(event: &str) -> bool {
    if event.is_empty() || event.len() > MAX_EVENT_LEN {
        return false;
    }
    event
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Parse and structurally validate an inbound text frame. This *is* the
/// default validator chain's first link; callers
/// layer additional user validators on top of a successfully parsed frame.
pub fn parse(text: &str, max_payload_size: usize) -> Result<ParsedFrame, FrameError> {
    if text.len() > max_payload_size {
        return Err(FrameError::PayloadTooLarge);
    }

    let raw: RawFrame = serde_json::from_str(text)?;

    let event = match &raw.event {
        Value::String(s) => s.clone(),
        Value::Null => return Err(FrameError::MissingEvent),
        _ => return Err(FrameError::EventNotString),
    };
    if event.len() > MAX_EVENT_LEN {
        return Err(FrameError::EventTooLong);
    }
    if !valid_event_name(&event) {
        return Err(FrameError::EventInvalidChars);
    }

    let channel = match &raw.channel {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(_) => return Err(FrameError::ChannelNotString),
    };

    let wants_ack = raw.ack.unwrap_or(false);
    let message_id = raw.message_id.clone();

    let kind = classify(&event, channel, &raw)?;

    Ok(ParsedFrame {
        kind,
        wants_ack,
        message_id,
    })
}

fn classify(
    event: &str,
    channel: Option<String>,
    raw: &RawFrame,
) -> Result<ClientFrameKind, FrameError> {
    match event {
        "subscribe" => {
            let channel = channel.ok_or(FrameError::MissingField("channel"))?;
            let auth = raw
                .data
                .as_ref()
                .and_then(|d| d.get("auth"))
                .and_then(|v| v.as_str())
                .map(str::to_owned);
            let channel_data = raw.data.as_ref().and_then(|d| d.get("channel_data")).cloned();
            Ok(ClientFrameKind::Subscribe(SubscribeFrame {
                channel,
                channel_data,
                auth,
            }))
        }
        "unsubscribe" => {
            let channel = channel.ok_or(FrameError::MissingField("channel"))?;
            Ok(ClientFrameKind::Unsubscribe(UnsubscribeFrame { channel }))
        }
        "batch_subscribe" => {
            let channels = raw.channels.clone().unwrap_or_default();
            let channel_data = raw.channel_data.clone().unwrap_or_default();
            let message_id = raw
                .message_id
                .clone()
                .ok_or(FrameError::MissingField("messageId"))?;
            Ok(ClientFrameKind::BatchSubscribe(BatchSubscribeFrame {
                channels,
                channel_data,
                message_id,
            }))
        }
        "batch_unsubscribe" => {
            let channels = raw.channels.clone().unwrap_or_default();
            let message_id = raw
                .message_id
                .clone()
                .ok_or(FrameError::MissingField("messageId"))?;
            Ok(ClientFrameKind::BatchUnsubscribe(BatchUnsubscribeFrame {
                channels,
                message_id,
            }))
        }
        "batch_broadcast" => {
            let items = raw.events.clone().unwrap_or_default();
            let message_id = raw
                .message_id
                .clone()
                .ok_or(FrameError::MissingField("messageId"))?;
            Ok(ClientFrameKind::BatchBroadcast(BatchBroadcastFrame {
                items,
                message_id,
            }))
        }
        "ping" => Ok(ClientFrameKind::Ping),
        "heartbeat" | "presence_heartbeat" => {
            let timestamp = raw
                .data
                .as_ref()
                .and_then(|d| d.get("timestamp"))
                .and_then(Value::as_i64);
            Ok(ClientFrameKind::Heartbeat(HeartbeatFrame {
                channel,
                timestamp,
            }))
        }
        "ack" => {
            let message_id = raw
                .message_id
                .clone()
                .ok_or(FrameError::MissingField("messageId"))?;
            Ok(ClientFrameKind::Ack(AckFrame { message_id }))
        }
        e if e.starts_with("client-") => {
            let channel = channel.ok_or(FrameError::MissingField("channel"))?;
            let data = raw.data.clone().unwrap_or(Value::Null);
            Ok(ClientFrameKind::ClientEvent(ClientEventFrame {
                event: e.to_owned(),
                channel,
                data,
            }))
        }
        other => Ok(ClientFrameKind::Unknown(other.to_owned())),
    }
}

/// An outbound server->client frame, rendered as JSON text.
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "messageId")]
    pub message_id: Option<String>,
}

impl ServerFrame {
    pub fn new(event: impl Into<String>) -> Self {
        ServerFrame {
            event: event.into(),
            channel: None,
            data: None,
            message_id: None,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerFrame always serializes")
    }

    pub fn byte_len(&self) -> usize {
        self.to_json().len()
    }
}
