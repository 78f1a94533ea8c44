//! Shared vocabulary between the engine, the switch and the orchestrator

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a single invitation (one originate plus its watch)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InviteId(Uuid);

impl InviteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InviteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InviteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog identifier of a conference (distinct from its dial-in number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConferenceId(pub u64);

impl fmt::Display for ConferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conference-{}", self.0)
    }
}

/// A directory entry reachable by phone
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    pub phone: String,
    pub name: String,
}

impl Contact {
    pub fn new(phone: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.phone)
        } else {
            write!(f, "{} <{}>", self.name, self.phone)
        }
    }
}

/// Everything needed to place one call leg into a conference.
///
/// Option sets are shared immutably, so a fan-out hands the same options to
/// every subordinate without copying or mutating them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteRequest {
    conference_number: String,
    target_phone: String,
    display_name: String,
    bridge_options: Arc<[String]>,
    user_options: Arc<[String]>,
}

impl InviteRequest {
    pub fn new(
        conference_number: impl Into<String>,
        target_phone: impl Into<String>,
        display_name: impl Into<String>,
        bridge_options: Vec<String>,
        user_options: Vec<String>,
    ) -> Self {
        Self {
            conference_number: conference_number.into(),
            target_phone: target_phone.into(),
            display_name: display_name.into(),
            bridge_options: bridge_options.into(),
            user_options: user_options.into(),
        }
    }

    /// Same conference and options, different callee
    pub fn for_contact(&self, contact: &Contact) -> Self {
        Self {
            conference_number: self.conference_number.clone(),
            target_phone: contact.phone.clone(),
            display_name: contact.name.clone(),
            bridge_options: Arc::clone(&self.bridge_options),
            user_options: Arc::clone(&self.user_options),
        }
    }

    pub fn conference_number(&self) -> &str {
        &self.conference_number
    }

    pub fn target_phone(&self) -> &str {
        &self.target_phone
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn bridge_options(&self) -> &[String] {
        &self.bridge_options
    }

    pub fn user_options(&self) -> &[String] {
        &self.user_options
    }
}

/// Channel state as reported by `core show channels`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelStatus {
    Down,
    Reserved,
    OffHook,
    Dialing,
    Ring,
    Ringing,
    Up,
    Busy,
    PreRing,
    Unknown,
    Other(String),
}

impl ChannelStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Down" => Self::Down,
            "Rsrvd" => Self::Reserved,
            "OffHook" => Self::OffHook,
            "Dialing" => Self::Dialing,
            "Ring" => Self::Ring,
            "Ringing" => Self::Ringing,
            "Up" => Self::Up,
            "Busy" => Self::Busy,
            "Pre-ring" => Self::PreRing,
            "Unknown" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }
}

/// One row of the switch's live channel table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel_id: String,
    pub location: String,
    pub status: ChannelStatus,
    pub application: String,
}

/// Result of one watch task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchOutcome {
    Answered,
    Unreachable,
}

/// Kinds of conference log entries pushed to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InviteFailed,
    Redirected,
    DialStatus,
    Entered,
    Left,
    /// Readable log line for an unmute request
    UnmuteRequested,
    /// Bare caller id pushed to moderators; not logged
    UnmuteRequest,
}

impl EventKind {
    /// Name of the push event subscribers listen for
    pub fn push_event(&self) -> &'static str {
        match self {
            Self::UnmuteRequest => "unmute_request",
            _ => "log_message",
        }
    }
}

/// A conference event as delivered to live subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceEvent {
    pub conference_id: ConferenceId,
    pub kind: EventKind,
    pub payload: String,
}

impl ConferenceEvent {
    /// Payload pushed over the conference's live channel
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "event": self.kind.push_event(),
            "conference": self.conference_id.0,
            "data": self.payload,
        })
    }
}

/// Operations accepted by the orchestrator loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    InviteAll { number: String, caller: String },
    InviteOffline { number: String },
    InviteGuest { number: String, phone: String },
    DialStatus { number: String, caller: String, status: String },
    EnterConference { number: String, caller: String },
    LeaveConference { number: String, caller: String },
    UnmuteRequest { number: String, caller: String },
}

impl Op {
    pub fn conference_number(&self) -> &str {
        match self {
            Op::InviteAll { number, .. }
            | Op::InviteOffline { number }
            | Op::InviteGuest { number, .. }
            | Op::DialStatus { number, .. }
            | Op::EnterConference { number, .. }
            | Op::LeaveConference { number, .. }
            | Op::UnmuteRequest { number, .. } => number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_status_parse() {
        assert_eq!(ChannelStatus::parse("Up"), ChannelStatus::Up);
        assert_eq!(ChannelStatus::parse("Ring"), ChannelStatus::Ring);
        assert_eq!(ChannelStatus::parse("Rsrvd"), ChannelStatus::Reserved);
        assert_eq!(
            ChannelStatus::parse("Weird"),
            ChannelStatus::Other("Weird".into())
        );
        assert!(!ChannelStatus::parse("up").is_up());
    }

    #[test]
    fn test_for_contact_keeps_options() {
        let request = InviteRequest::new(
            "100",
            "201",
            "Bob",
            vec!["max_members=50".into()],
            vec!["admin=yes".into(), "quiet=yes".into()],
        );
        let carol = Contact::new("202", "Carol");

        let redirected = request.for_contact(&carol);

        assert_eq!(redirected.conference_number(), "100");
        assert_eq!(redirected.target_phone(), "202");
        assert_eq!(redirected.display_name(), "Carol");
        assert_eq!(redirected.bridge_options(), request.bridge_options());
        assert_eq!(redirected.user_options(), request.user_options());
        // The original is untouched
        assert_eq!(request.target_phone(), "201");
    }

    #[test]
    fn test_event_json_payload() {
        let event = ConferenceEvent {
            conference_id: ConferenceId(7),
            kind: EventKind::UnmuteRequest,
            payload: "101".into(),
        };
        let json = event.to_json();
        assert_eq!(json["event"], "unmute_request");
        assert_eq!(json["conference"], 7);
        assert_eq!(json["data"], "101");
    }

    #[test]
    fn test_contact_display() {
        assert_eq!(Contact::new("101", "").to_string(), "101");
        assert_eq!(Contact::new("101", "Alice").to_string(), "Alice <101>");
    }
}
