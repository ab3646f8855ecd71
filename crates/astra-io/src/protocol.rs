use astra_core::{tags, Command, DashboardSnapshot};
use serde::{Deserialize, Serialize};

pub const STATE_TAGS: &[tags::Tag] = &[
    tags::PRESSURE_BAR,
    tags::FLOW_LPS,
    tags::VALVE_POSITION_PCT,
    tags::LEAK_VOLUME_L,
    tags::UPTIME_S,
    tags::EMERGENCY_ACTIVE,
    tags::LEAK_ACTIVE,
];

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const fn v1() -> Self {
        Self { major: 1, minor: 0 }
    }

    pub fn is_supported(&self) -> bool {
        self.major == 1
    }
}

/// Clients that omit `protocol_version` speak the current version.
impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::v1()
    }
}

#[derive(Debug, Serialize)]
pub struct StateMsg<'a> {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub protocol_version: ProtocolVersion,
    pub sequence: u64,
    pub unix_us: u64,
    pub uptime_hms: String,
    pub status_label: &'static str,
    #[serde(flatten)]
    pub snapshot: &'a DashboardSnapshot,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AckMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub command: Command,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AckMsg {
    pub fn accepted(command: Command) -> Self {
        Self {
            msg_type: "ack".to_string(),
            command,
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(command: Command, reason: impl Into<String>) -> Self {
        Self {
            msg_type: "ack".to_string(),
            command,
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    pub command: Command,
}

#[derive(Debug, Deserialize)]
pub struct HelloMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug)]
pub enum IncomingMessage {
    Hello(HelloMsg),
    Command(CommandMsg),
}

impl IncomingMessage {
    pub fn parse(line: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(line).ok()?;
        let msg_type = value.get("type")?.as_str()?;
        match msg_type {
            "command" => serde_json::from_value(value)
                .ok()
                .map(IncomingMessage::Command),
            "hello" => serde_json::from_value(value)
                .ok()
                .map(IncomingMessage::Hello),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_msg_carries_every_tag() {
        let snapshot = DashboardSnapshot::default();
        let msg = StateMsg {
            msg_type: "state",
            protocol_version: ProtocolVersion::v1(),
            sequence: 7,
            unix_us: 1,
            uptime_hms: "00:00:00".to_string(),
            status_label: snapshot.status.label(),
            snapshot: &snapshot,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "state");
        assert_eq!(value["sequence"], 7);
        assert_eq!(value["status"], "nominal");
        assert_eq!(value["status_label"], "NORMAL OPERATION");
        for tag in STATE_TAGS {
            assert!(
                value.get(tag.key).is_some(),
                "state message missing {}",
                tag.key
            );
        }
    }

    #[test]
    fn rejected_ack_serializes_reason() {
        let ack = AckMsg::rejected(Command::SimulateFailure, "a leak is already active");
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(value["command"], "simulate_failure");
        assert_eq!(value["accepted"], false);
        assert_eq!(value["reason"], "a leak is already active");
    }

    #[test]
    fn versionless_command_is_supported() {
        match IncomingMessage::parse(r#"{"type":"command","command":"simulate_failure"}"#) {
            Some(IncomingMessage::Command(cmd)) => {
                assert_eq!(cmd.protocol_version, ProtocolVersion::v1());
                assert!(cmd.protocol_version.is_supported());
            }
            other => panic!("expected command, got {other:?}"),
        }
        match IncomingMessage::parse(r#"{"type":"hello"}"#) {
            Some(IncomingMessage::Hello(hello)) => assert!(hello.protocol_version.is_supported()),
            other => panic!("expected hello, got {other:?}"),
        }
    }

    #[test]
    fn unknown_command_is_ignored() {
        assert!(IncomingMessage::parse(r#"{"type":"command","command":"open_valve"}"#).is_none());
        assert!(IncomingMessage::parse("not json").is_none());
    }
}
