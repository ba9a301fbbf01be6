// src/core/protocol/message.rs

//! The closed set of message kinds exchanged between clients and the server,
//! and the typed views the connection handler dispatches on.

use crate::core::RelayError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};

/// The value of the mandatory `type` field of every message.
///
/// [`Inbound::parse`] decides what each kind means: `register` is handled by
/// the server, `status` and `system` may only come from the server, and every
/// other kind is relayed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Register,
    Chat,
    Status,
    System,
    Question,
    DuelRequest,
    DuelScore,
}

/// A participant's declared intent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Learn,
    Teach,
}

impl Role {
    /// The role a registrant with this role is matched against.
    pub fn partner(self) -> Role {
        match self {
            Role::Learn => Role::Teach,
            Role::Teach => Role::Learn,
        }
    }

    /// How a waiting registrant refers to the peer it is waiting for.
    pub fn seeking_label(self) -> &'static str {
        match self {
            Role::Learn => "tutor",
            Role::Teach => "student",
        }
    }
}

/// The validated fields of a `register` message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Registration {
    pub subject: String,
    pub role: Role,
}

impl Registration {
    pub fn new(subject: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            role,
        }
    }

    fn from_fields(fields: &Map<String, Value>) -> Result<Self, RelayError> {
        let subject = match fields.get("subject") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::String(_)) | None => {
                return Err(RelayError::InvalidRegistration(
                    "missing subject".to_string(),
                ));
            }
            Some(other) => {
                return Err(RelayError::InvalidRegistration(format!(
                    "subject must be a string, got {other}"
                )));
            }
        };
        let role = match fields.get("role") {
            Some(Value::String(s)) if !s.is_empty() => {
                Role::from_str(s).map_err(|_| RelayError::InvalidRole(s.clone()))?
            }
            Some(Value::String(_)) | None => {
                return Err(RelayError::InvalidRegistration("missing role".to_string()));
            }
            Some(other) => return Err(RelayError::InvalidRole(other.to_string())),
        };
        Ok(Self { subject, role })
    }
}

/// A decoded client message, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Register(Registration),
    /// A relayable message. `payload` is the frame exactly as received.
    Relay { kind: MessageKind, payload: Bytes },
    /// A kind only the server may send. Always a protocol violation.
    ServerOnly(MessageKind),
}

impl Inbound {
    /// Parses one frame. The frame is kept as-is for relayed kinds; only the
    /// `type` field (and the fields of `register`) are inspected.
    pub fn parse(payload: Bytes) -> Result<Self, RelayError> {
        let value: Value = serde_json::from_slice(&payload)?;
        let Value::Object(fields) = value else {
            return Err(RelayError::NotAnObject);
        };
        let kind = match fields.get("type") {
            None => return Err(RelayError::MissingType),
            Some(Value::String(s)) => {
                MessageKind::from_str(s).map_err(|_| RelayError::UnknownType(s.clone()))?
            }
            Some(other) => return Err(RelayError::UnknownType(other.to_string())),
        };

        match kind {
            MessageKind::Register => Registration::from_fields(&fields).map(Inbound::Register),
            MessageKind::Chat
            | MessageKind::Question
            | MessageKind::DuelRequest
            | MessageKind::DuelScore => Ok(Inbound::Relay { kind, payload }),
            MessageKind::Status | MessageKind::System => Ok(Inbound::ServerOnly(kind)),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Inbound::Register(_) => MessageKind::Register,
            Inbound::Relay { kind, .. } | Inbound::ServerOnly(kind) => *kind,
        }
    }
}

/// The `status` field of a `status` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Connected,
    Disconnected,
}

/// Messages originated by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Status {
        status: SessionStatus,
        message: String,
    },
    System {
        message: String,
    },
}

impl ServerMessage {
    pub fn waiting(registration: &Registration) -> Self {
        ServerMessage::Status {
            status: SessionStatus::Waiting,
            message: format!(
                "Waiting for a {} in {}...",
                registration.role.seeking_label(),
                registration.subject
            ),
        }
    }

    pub fn connected() -> Self {
        ServerMessage::Status {
            status: SessionStatus::Connected,
            message: "Connected! You can now chat.".to_string(),
        }
    }

    pub fn partner_disconnected() -> Self {
        ServerMessage::Status {
            status: SessionStatus::Disconnected,
            message: "Partner disconnected".to_string(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        ServerMessage::System {
            message: message.into(),
        }
    }

    /// Serializes the message without the frame terminator, in the form
    /// accepted by a connection's outbound queue.
    pub fn to_bytes(&self) -> Result<Bytes, RelayError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}
