//! Line-delimited JSON packets exchanged with the server
//!
//! Each packet is one newline-terminated JSON object. Field names are
//! PascalCase on the wire (`Type`, `Seq`, `Request_seq`); the structs here
//! rename accordingly so the rest of the crate can stay snake_case.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name the server emits once it is ready to take requests
pub const STARTED_EVENT: &str = "started";

/// Event name carrying server-side log entries, redirected to the
/// diagnostic sink instead of the event bus
pub const LOG_EVENT: &str = "log";

/// Outbound request packet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPacket {
    /// Always `"request"`
    #[serde(rename = "Type")]
    pub packet_type: String,
    /// Sequence id assigned at send time
    #[serde(rename = "Seq")]
    pub seq: u64,
    /// Server command
    #[serde(rename = "Command")]
    pub command: String,
    /// Opaque payload, serialized as-is
    #[serde(rename = "Arguments", skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Inbound response packet, correlated to a request by `Request_seq`
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsePacket {
    /// Command of the request being answered
    #[serde(rename = "Command")]
    pub command: String,
    /// Sequence id of the request being answered
    #[serde(rename = "Request_seq")]
    pub request_seq: u64,
    /// Whether the server is still processing related work
    #[serde(rename = "Running", default)]
    pub running: bool,
    /// Whether the request succeeded
    #[serde(rename = "Success", default)]
    pub success: bool,
    /// Failure description when `success` is false
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    /// Response payload
    #[serde(rename = "Body", default)]
    pub body: Value,
}

/// Inbound event packet, not correlated to any request
#[derive(Debug, Clone, Deserialize)]
pub struct EventPacket {
    /// Event name
    #[serde(rename = "Event")]
    pub event: String,
    /// Event payload
    #[serde(rename = "Body", default)]
    pub body: Value,
}

/// Why an inbound line was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Started with `{` but was not valid JSON, or a packet field had the
    /// wrong shape
    Malformed,
    /// Valid JSON with no `Type` field
    MissingType,
    /// Valid JSON with a `Type` this client does not know
    UnknownType(String),
}

/// Classification of one line read from the server's stdout
#[derive(Debug)]
pub enum Decoded {
    /// A response to an earlier request
    Response(ResponsePacket),
    /// An uncorrelated server event
    Event(EventPacket),
    /// No leading `{`; plain diagnostic text outside the protocol
    Diagnostic,
    /// Unusable line; the reason says how it failed
    Dropped(DropReason),
}

/// Serialize a request to its wire form, newline included
pub fn encode_request(seq: u64, command: &str, arguments: Option<&Value>) -> String {
    let packet = RequestPacket {
        packet_type: "request".to_string(),
        seq,
        command: command.to_string(),
        arguments: arguments.cloned(),
    };

    // serde_json cannot fail on this shape; fall back to an empty object
    // line rather than poisoning the write path
    let mut line = serde_json::to_string(&packet).unwrap_or_else(|_| "{}".to_string());
    line.push('\n');
    line
}

/// Remove a UTF-8 byte order mark, which the server occasionally prefixes
/// to its first line on some platforms
pub fn strip_bom(line: &str) -> &str {
    line.strip_prefix('\u{feff}').unwrap_or(line)
}

/// Decode one line of server output
pub fn decode_line(line: &str) -> Decoded {
    let line = strip_bom(line);

    if !line.starts_with('{') {
        return Decoded::Diagnostic;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => return Decoded::Dropped(DropReason::Malformed),
    };

    let packet_type = match value.get("Type").and_then(Value::as_str) {
        Some(packet_type) => packet_type.to_string(),
        None => return Decoded::Dropped(DropReason::MissingType),
    };

    match packet_type.as_str() {
        "response" => match serde_json::from_value::<ResponsePacket>(value) {
            Ok(packet) => Decoded::Response(packet),
            Err(_) => Decoded::Dropped(DropReason::Malformed),
        },
        "event" => match serde_json::from_value::<EventPacket>(value) {
            Ok(packet) => Decoded::Event(packet),
            Err(_) => Decoded::Dropped(DropReason::Malformed),
        },
        other => Decoded::Dropped(DropReason::UnknownType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_request_wire_shape() {
        let line = encode_request(5, "/findsymbols", Some(&json!({"Filter": "Foo"})));
        assert_eq!(
            line,
            "{\"Type\":\"request\",\"Seq\":5,\"Command\":\"/findsymbols\",\"Arguments\":{\"Filter\":\"Foo\"}}\n"
        );
    }

    #[test]
    fn test_encode_request_without_arguments() {
        let line = encode_request(1, "/projects", None);
        assert_eq!(line, "{\"Type\":\"request\",\"Seq\":1,\"Command\":\"/projects\"}\n");
    }

    #[test]
    fn test_decode_response() {
        let line = r#"{"Type":"response","Command":"/findsymbols","Request_seq":5,"Running":true,"Success":true,"Message":null,"Body":{"QuickFixes":[]}}"#;
        match decode_line(line) {
            Decoded::Response(packet) => {
                assert_eq!(packet.command, "/findsymbols");
                assert_eq!(packet.request_seq, 5);
                assert!(packet.success);
                assert!(packet.message.is_none());
                assert_eq!(packet.body, json!({"QuickFixes": []}));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_failure_response() {
        let line = r#"{"Type":"response","Command":"/rename","Request_seq":2,"Success":false,"Message":"no symbol at location","Body":null}"#;
        match decode_line(line) {
            Decoded::Response(packet) => {
                assert!(!packet.success);
                assert_eq!(packet.message.as_deref(), Some("no symbol at location"));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_event() {
        let line = r#"{"Type":"event","Event":"started","Body":null}"#;
        match decode_line(line) {
            Decoded::Event(packet) => {
                assert_eq!(packet.event, "started");
                assert!(packet.body.is_null());
            }
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_plain_text() {
        assert!(matches!(
            decode_line("Starting OmniSharp server (version 1.35.0)"),
            Decoded::Diagnostic
        ));
    }

    #[test]
    fn test_decode_malformed_json() {
        assert!(matches!(
            decode_line("{not json at all"),
            Decoded::Dropped(DropReason::Malformed)
        ));
    }

    #[test]
    fn test_decode_missing_type() {
        assert!(matches!(
            decode_line(r#"{"Event":"started"}"#),
            Decoded::Dropped(DropReason::MissingType)
        ));
    }

    #[test]
    fn test_decode_unknown_type() {
        match decode_line(r#"{"Type":"unknown"}"#) {
            Decoded::Dropped(DropReason::UnknownType(t)) => assert_eq!(t, "unknown"),
            other => panic!("expected unknown-type drop, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_strips_bom() {
        let line = "\u{feff}{\"Type\":\"event\",\"Event\":\"started\",\"Body\":null}";
        assert!(matches!(decode_line(line), Decoded::Event(_)));
    }

    #[test]
    fn test_strip_bom_passthrough() {
        assert_eq!(strip_bom("plain"), "plain");
        assert_eq!(strip_bom("\u{feff}plain"), "plain");
    }
}
