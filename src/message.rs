use std::error::Error;
use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire type tags accepted by the decoder
const KNOWN_TYPES: &[&str] = &["update", "revoke", "data", "no route", "dump", "table"];

/// One framed message exchanged with a neighbor:
/// `{"src": ..., "dst": ..., "type": ..., "msg": ...}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Envelope {
    /// Decode one frame, rejecting unrecognized type tags up front
    pub fn from_slice(input: &[u8]) -> Result<Envelope, DecodeError> {
        match serde_json::from_slice(input) {
            Ok(envelope) => Ok(envelope),
            Err(err) => {
                // Distinguish a message we don't speak from one we can't read
                if let Ok(value) = serde_json::from_slice::<Value>(input) {
                    if let Some(tag) = value.get("type").and_then(Value::as_str) {
                        if !KNOWN_TYPES.contains(&tag) {
                            return Err(DecodeError::UnknownType(tag.to_string()));
                        }
                    }
                }
                Err(DecodeError::Malformed(err.to_string()))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "msg")]
pub enum Payload {
    #[serde(rename = "update")]
    Update(RouteAdvertisement),
    #[serde(rename = "revoke")]
    Revoke(Vec<PrefixSpec>),
    #[serde(rename = "data")]
    Data(Value),
    #[serde(rename = "no route")]
    NoRoute(EmptyBody),
    #[serde(rename = "dump")]
    Dump(EmptyBody),
    #[serde(rename = "table")]
    Table(Vec<TableEntry>),
}

impl Payload {
    /// Wire tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Update(_) => "update",
            Payload::Revoke(_) => "revoke",
            Payload::Data(_) => "data",
            Payload::NoRoute(_) => "no route",
            Payload::Dump(_) => "dump",
            Payload::Table(_) => "table",
        }
    }
}

/// `update` body: one prefix and its five selection attributes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteAdvertisement {
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub localpref: u32,
    #[serde(rename = "ASPath")]
    pub as_path: Vec<u32>,
    pub origin: Origin,
    #[serde(rename = "selfOrigin")]
    pub self_origin: bool,
}

/// How a route first entered inter-domain routing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    #[serde(rename = "IGP")]
    Igp,
    #[serde(rename = "EGP")]
    Egp,
    #[serde(rename = "UNK")]
    Unk,
}

impl Origin {
    /// Selection preference, higher wins: IGP > EGP > UNK
    pub fn preference(self) -> u8 {
        match self {
            Origin::Igp => 2,
            Origin::Egp => 1,
            Origin::Unk => 0,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            Origin::Igp => "IGP",
            Origin::Egp => "EGP",
            Origin::Unk => "UNK",
        };
        write!(f, "{}", word)
    }
}

/// A bare (network, netmask) pair, as carried in `revoke` bodies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixSpec {
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

/// One row of a `table` reply
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub peer: Ipv4Addr,
}

/// The `{}` body of `no route` and `dump` messages
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyBody {}

#[derive(Debug)]
pub enum DecodeError {
    /// Message with a type tag outside the protocol
    UnknownType(String),
    /// Not a valid envelope: bad JSON, bad address, missing field
    Malformed(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::UnknownType(tag) => write!(f, "unknown message type '{}'", tag),
            DecodeError::Malformed(reason) => write!(f, "malformed message: {}", reason),
        }
    }
}

impl Error for DecodeError {}
