mod file;

use std::error;
use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

use crate::utils::{parse_address, ParseError};

/// Commercial relationship with a neighbor, fixed for the process lifetime
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relationship {
    Customer,
    Peer,
    Provider,
}

impl Relationship {
    /// The Gao-Rexford rule: traffic and announcements may cross a pair of
    /// links only when at least one side is a customer
    pub fn permits(ingress: Relationship, egress: Relationship) -> bool {
        ingress == Relationship::Customer || egress == Relationship::Customer
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            Relationship::Customer => "cust",
            Relationship::Peer => "peer",
            Relationship::Provider => "prov",
        };
        write!(f, "{}", word)
    }
}

impl FromStr for Relationship {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "cust" => Ok(Relationship::Customer),
            "peer" => Ok(Relationship::Peer),
            "prov" => Ok(Relationship::Provider),
            _ => Err(ParseError::new(format!(
                "unsupported relationship: '{}'",
                input
            ))),
        }
    }
}

impl Serialize for Relationship {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Relationship {
    fn deserialize<D>(deserializer: D) -> Result<Relationship, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|err: ParseError| serde::de::Error::custom(err.to_string()))
    }
}

/// A directly connected neighbor: the address that names its channel, and
/// the relationship that governs forwarding and propagation toward it
#[derive(Clone, Debug)]
pub struct NeighborConfig {
    pub addr: Ipv4Addr,
    pub relationship: Relationship,
}

impl NeighborConfig {
    /// Parse an `<address>-<relationship>` startup token
    pub fn from_token(token: &str) -> Result<Self, ConfigError> {
        let split = token
            .rfind('-')
            .ok_or_else(|| ConfigError::Invalid(format!("bad neighbor token: '{}'", token)))?;
        let addr = parse_address(&token[..split])
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        let relationship = token[split + 1..]
            .parse()
            .map_err(|err: ParseError| ConfigError::Invalid(err.to_string()))?;
        Ok(Self { addr, relationship })
    }
}

impl fmt::Display for NeighborConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<Neighbor {} rel={}>", self.addr, self.relationship)
    }
}

/// In-memory router configuration, from argv tokens or a TOML file
#[derive(Debug)]
pub struct RouterConfig {
    pub local_as: u32,
    pub socket_dir: String,
    pub neighbors: Vec<Arc<NeighborConfig>>,
}

impl RouterConfig {
    /// Build a config from the startup arguments: the local AS number and
    /// one `<address>-<relationship>` token per neighbor
    pub fn from_tokens(local_as: u32, tokens: &[&str]) -> Result<Self, ConfigError> {
        let neighbors = tokens
            .iter()
            .map(|token| NeighborConfig::from_token(token).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Self::checked(local_as, file::Defaults::socket_dir(), neighbors)
    }

    /// Parse a TOML config file and return a RouterConfig
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let spec = file::RouterConfigSpec::from_file(path)?;
        let neighbors = spec
            .neighbors
            .iter()
            .map(|n| {
                Arc::new(NeighborConfig {
                    addr: n.address,
                    relationship: n.relationship,
                })
            })
            .collect();
        Self::checked(spec.local_as, spec.socket_dir, neighbors)
    }

    fn checked(
        local_as: u32,
        socket_dir: String,
        neighbors: Vec<Arc<NeighborConfig>>,
    ) -> Result<Self, ConfigError> {
        if neighbors.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one neighbor is required".to_string(),
            ));
        }
        Ok(Self {
            local_as,
            socket_dir,
            neighbors,
        })
    }

    pub fn relationship_of(&self, addr: Ipv4Addr) -> Option<Relationship> {
        self.neighbors
            .iter()
            .find(|n| n.addr == addr)
            .map(|n| n.relationship)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    /// Startup input that doesn't describe a runnable router
    Invalid(String),
    /// Config file could not be read
    Io(io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Invalid(reason) => write!(f, "invalid configuration: {}", reason),
            ConfigError::Io(err) => write!(f, "cannot read configuration: {}", err),
        }
    }
}

impl error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(error: io::Error) -> Self {
        ConfigError::Io(error)
    }
}
