//! Row and value types shared by the store, the relay, and the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audio or video call, carried on `call-initiate` and in the call log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    #[default]
    Audio,
    Video,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

/// Terminal outcome recorded for a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[default]
    Missed,
    Answered,
    Rejected,
    Outgoing,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missed => "missed",
            Self::Answered => "answered",
            Self::Rejected => "rejected",
            Self::Outgoing => "outgoing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "missed" => Some(Self::Missed),
            "answered" => Some(Self::Answered),
            "rejected" => Some(Self::Rejected),
            "outgoing" => Some(Self::Outgoing),
            _ => None,
        }
    }
}

/// Row in the calls table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub id: Uuid,
    pub caller_id: String,
    pub receiver_id: String,
    pub call_type: CallKind,
    pub status: CallStatus,
    /// Seconds
    pub duration: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Partial update applied when a call finishes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallUpdate {
    pub status: Option<CallStatus>,
    pub duration: Option<i64>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A conversation member as seen by the delivery fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: String,
    pub push_token: Option<String>,
}

/// Chat message content type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}
