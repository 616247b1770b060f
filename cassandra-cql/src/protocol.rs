//! Opcodes, consistency levels, and request/response body shapes
//! (component 4.E, plus the wire constants from spec §6).
use std::collections::BTreeMap;

use bytes::Bytes;

use crate::{
    error::{Error, ErrorKind},
    frame::Frame,
};

/// Request protocol version (§3).
pub const REQUEST_VERSION: u8 = 0x01;
/// Response protocol version (§3).
pub const RESPONSE_VERSION: u8 = 0x81;

/// CQL version put on the wire by `startup()` (DESIGN.md open question #1).
pub const CQL_VERSION: &str = "3.0.0";

/// One-byte message-kind tag in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Credentials = 0x04,
    Options = 0x05,
    Supported = 0x06,
    Query = 0x07,
    Result = 0x08,
    Prepare = 0x09,
    Execute = 0x0A,
    Register = 0x0B,
    Event = 0x0C,
}

impl Opcode {
    pub fn from_u8(b: u8) -> Option<Self> {
        Some(match b {
            0x00 => Self::Error,
            0x01 => Self::Startup,
            0x02 => Self::Ready,
            0x03 => Self::Authenticate,
            0x04 => Self::Credentials,
            0x05 => Self::Options,
            0x06 => Self::Supported,
            0x07 => Self::Query,
            0x08 => Self::Result,
            0x09 => Self::Prepare,
            0x0A => Self::Execute,
            0x0B => Self::Register,
            0x0C => Self::Event,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Replica-count policy on reads/writes, encoded as a short (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    Any = 0,
    One = 1,
    Two = 2,
    Three = 3,
    Quorum = 4,
    All = 5,
    LocalQuorum = 6,
    EachQuorum = 7,
}

impl Consistency {
    pub fn as_short(self) -> u16 {
        self as u16
    }
}

/// Names a caller may `register()` for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    TopologyChange,
    StatusChange,
    SchemaChange,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopologyChange => "TOPOLOGY_CHANGE",
            Self::StatusChange => "STATUS_CHANGE",
            Self::SchemaChange => "SCHEMA_CHANGE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "TOPOLOGY_CHANGE" => Self::TopologyChange,
            "STATUS_CHANGE" => Self::StatusChange,
            "SCHEMA_CHANGE" => Self::SchemaChange,
            _ => return None,
        })
    }
}

/// A decoded `OPCODE_EVENT` body.
#[derive(Debug, Clone)]
pub enum Event {
    TopologyChange { change_type: String, node: (std::net::IpAddr, i32) },
    StatusChange { status: String, node: (std::net::IpAddr, i32) },
    SchemaChange { change_type: String, keyspace: String, table: String },
}

/// Build a `STARTUP` body: a string map with `CQL_VERSION` and, if present,
/// `COMPRESSION` (never set — compression negotiation is a declared Non-goal).
pub fn startup_body() -> Frame {
    let mut map = BTreeMap::new();
    map.insert("CQL_VERSION".to_string(), CQL_VERSION.to_string());
    let mut frame = Frame::new();
    frame.pack_string_map(&map);
    frame
}

/// Build a `CREDENTIALS` body from a username/password pair.
pub fn credentials_body(user: &str, password: &str) -> Frame {
    let mut map = BTreeMap::new();
    map.insert("username".to_string(), user.to_string());
    map.insert("password".to_string(), password.to_string());
    let mut frame = Frame::new();
    frame.pack_string_map(&map);
    frame
}

/// Build a `QUERY` body: long string CQL text + short consistency.
pub fn query_body(cql: &str, consistency: Consistency) -> Frame {
    let mut frame = Frame::new();
    frame.pack_lstring(cql);
    frame.pack_short(consistency.as_short());
    frame
}

/// Build a `PREPARE` body: long string CQL text.
pub fn prepare_body(cql: &str) -> Frame {
    let mut frame = Frame::new();
    frame.pack_lstring(cql);
    frame
}

/// Build an `EXECUTE` body: short-bytes id, short param count, then each
/// param as a `bytes` value, then short consistency.
pub fn execute_body(id: &[u8], values: &[Option<Vec<u8>>], consistency: Consistency) -> Frame {
    let mut frame = Frame::new();
    frame.pack_short_bytes(id);
    frame.pack_short(values.len() as u16);
    for v in values {
        frame.pack_bytes(v.as_deref());
    }
    frame.pack_short(consistency.as_short());
    frame
}

/// Build a `REGISTER` body: a string list of event names.
pub fn register_body(names: &[EventName]) -> Frame {
    let strs: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
    let mut frame = Frame::new();
    frame.pack_string_list(&strs);
    frame
}

/// Decode a `SUPPORTED` body: a string multimap.
pub fn decode_supported(frame: &mut Frame) -> Result<BTreeMap<String, Vec<String>>, Error> {
    frame.unpack_string_multimap().map_err(Into::into)
}

/// Decode an `AUTHENTICATE` body: the authenticator class name.
pub fn decode_authenticate(frame: &mut Frame) -> Result<String, Error> {
    frame.unpack_string().map_err(Into::into)
}

/// Decode an `ERROR` body: int error code, string message.
pub fn decode_error(frame: &mut Frame) -> Result<(i32, String), Error> {
    let code = frame.unpack_int()?;
    let message = frame.unpack_string()?;
    Ok((code, message))
}

/// Decode an `OPCODE_EVENT` body: string event-name plus event-specific payload.
pub fn decode_event(frame: &mut Frame) -> Result<Event, Error> {
    let name = frame.unpack_string()?;
    Ok(match name.as_str() {
        "TOPOLOGY_CHANGE" => {
            let change_type = frame.unpack_string()?;
            let node = frame.unpack_inet()?;
            Event::TopologyChange { change_type, node }
        }
        "STATUS_CHANGE" => {
            let status = frame.unpack_string()?;
            let node = frame.unpack_inet()?;
            Event::StatusChange { status, node }
        }
        "SCHEMA_CHANGE" => {
            let change_type = frame.unpack_string()?;
            let keyspace = frame.unpack_string()?;
            let table = frame.unpack_string()?;
            Event::SchemaChange { change_type, keyspace, table }
        }
        other => return Err(ErrorKind::ProtocolViolation(format!("unknown event name {other:?}")).into()),
    })
}

/// One fully framed outgoing message (header + body).
pub fn encode_message(stream_id: i8, opcode: Opcode, body: Frame) -> Bytes {
    Frame::build(REQUEST_VERSION, 0x00, stream_id, opcode.as_u8(), body)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn startup_matches_s1_scenario_bytes() {
        // spec.md §8 scenario S1
        let body = startup_body();
        let msg = encode_message(1, Opcode::Startup, body);
        let expected: &[u8] = &[
            0x01, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, 0x16, 0x00, 0x01, 0x00, 0x0b, b'C', b'Q',
            b'L', b'_', b'V', b'E', b'R', b'S', b'I', b'O', b'N', 0x00, 0x05, b'3', b'.', b'0',
            b'.', b'0',
        ];
        assert_eq!(msg.as_ref(), expected);
    }

    #[test]
    fn options_matches_s2_scenario_bytes() {
        let msg = encode_message(1, Opcode::Options, Frame::new());
        assert_eq!(msg.as_ref(), &[0x01, 0x00, 0x01, 0x05, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn supported_decodes_multimap() {
        let mut frame = Frame::new();
        let mut map = BTreeMap::new();
        map.insert("COMPRESSION".to_string(), vec!["snappy".to_string()]);
        map.insert("CQL_VERSION".to_string(), vec!["3.0.0".to_string()]);
        frame.pack_short(map.len() as u16);
        for (k, v) in &map {
            frame.pack_string(k);
            frame.pack_string_list(v);
        }
        let decoded = decode_supported(&mut frame).unwrap();
        assert_eq!(decoded.get("CQL_VERSION").unwrap(), &vec!["3.0.0".to_string()]);
    }

    #[test]
    fn schema_change_event_round_trip() {
        let mut frame = Frame::new();
        frame.pack_string("SCHEMA_CHANGE");
        frame.pack_string("DROPPED");
        frame.pack_string("test");
        frame.pack_string("users");
        let event = decode_event(&mut frame).unwrap();
        match event {
            Event::SchemaChange { change_type, keyspace, table } => {
                assert_eq!((change_type.as_str(), keyspace.as_str(), table.as_str()), ("DROPPED", "test", "users"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
