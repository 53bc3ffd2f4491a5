use std::fs::File;
use std::io::Read;
use std::net::Ipv4Addr;

use serde::Deserialize;

use super::{ConfigError, Relationship};

pub(super) struct Defaults {}

impl Defaults {
    pub(super) fn socket_dir() -> String {
        ".".to_string()
    }
}

/// Config (toml) representation of a neighbor
#[derive(Clone, Debug, Deserialize)]
pub(super) struct NeighborSpec {
    pub(super) address: Ipv4Addr,
    pub(super) relationship: Relationship,
}

#[derive(Debug, Deserialize)]
pub(super) struct RouterConfigSpec {
    // The router's own AS number, appended on propagated updates
    pub(super) local_as: u32,

    // Directory holding one Unix socket per neighbor, named by address
    #[serde(default = "Defaults::socket_dir")]
    pub(super) socket_dir: String,

    #[serde(default = "Vec::new")]
    pub(super) neighbors: Vec<NeighborSpec>,
}

impl RouterConfigSpec {
    pub(super) fn from_file(path: &str) -> Result<Self, ConfigError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        toml::from_str(&contents).map_err(|err| ConfigError::Invalid(err.to_string()))
    }
}
