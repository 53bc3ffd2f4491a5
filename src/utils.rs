use std::error::Error;
use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};

#[derive(Debug)]
pub struct ParseError {
    reason: String,
}

impl ParseError {
    pub fn new(reason: String) -> Self {
        ParseError { reason }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParseError: {}", self.reason)
    }
}

impl Error for ParseError {}

/// Parse a dotted-quad address (four decimal octets in [0,255])
pub fn parse_address(input: &str) -> Result<Ipv4Addr, ParseError> {
    input
        .parse()
        .map_err(|_| ParseError::new(format!("not a dotted-quad address: '{}'", input)))
}

/// Prefix length of a contiguous mask: the index of the first zero bit
pub fn mask_len(mask: Ipv4Addr) -> u8 {
    u32::from(mask).leading_ones() as u8
}

/// The mask with one fewer leading one-bit. Callers must not pass 0.0.0.0
pub fn shorten_mask(mask: Ipv4Addr) -> Ipv4Addr {
    let mask = u32::from(mask);
    Ipv4Addr::from(mask & (mask << 1))
}

/// Does `addr` fall inside the (network, mask) prefix
pub fn prefix_matches(addr: Ipv4Addr, network: Ipv4Addr, mask: Ipv4Addr) -> bool {
    (u32::from(addr) ^ u32::from(network)) & u32::from(mask) == 0
}

/// Are the two /L networks halves of one /(L-1) supernet: same mask, equal in
/// the first L-1 bits, differing in bit L-1. Only defined for L >= 1
pub fn prefixes_adjacent(a: Ipv4Addr, b: Ipv4Addr, mask: Ipv4Addr) -> bool {
    let mask = u32::from(mask);
    let low_bit = mask & mask.wrapping_neg();
    low_bit != 0 && (u32::from(a) ^ u32::from(b)) == low_bit
}

/// The router's own address on the link toward `neighbor`: the neighbor's
/// address with the final octet replaced by 1
pub fn link_local_source(neighbor: Ipv4Addr) -> Ipv4Addr {
    let octets = neighbor.octets();
    Ipv4Addr::new(octets[0], octets[1], octets[2], 1)
}

/// Given a timestamp, format the elapsed time like "00:00:00"
pub fn format_time_as_elapsed(time: DateTime<Utc>) -> String {
    let elapsed = Utc::now().signed_duration_since(time).num_seconds().abs() as u64;
    format!(
        "{:02}:{:02}:{:02}",
        elapsed / 3600,
        (elapsed % 3600) / 60,
        elapsed % 60
    )
}
