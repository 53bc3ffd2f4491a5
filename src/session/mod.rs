mod codec;

pub use codec::{MessageCodec, MessageProtocol};

use std::error;
use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use log::{debug, trace, warn};
use tokio::net::UnixStream;
use tokio::time::{timeout, Duration};
use tokio_util::codec::Framed;

use crate::config::{NeighborConfig, RouterConfig};
use crate::message::Envelope;
use crate::utils::format_time_as_elapsed;

/// How long to wait on one channel before moving to the next
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum SessionError {
    /// Channel returned EOF. [neighbor]
    Closed(Ipv4Addr),
    /// Something happened in transport
    Transport(io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionError::Closed(addr) => write!(f, "channel to {} closed", addr),
            SessionError::Transport(err) => write!(f, "transport error: {}", err),
        }
    }
}

impl error::Error for SessionError {}

impl From<io::Error> for SessionError {
    fn from(error: io::Error) -> Self {
        SessionError::Transport(error)
    }
}

/// One connected neighbor channel, with per-direction frame counters
pub struct Session {
    config: Arc<NeighborConfig>,
    protocol: MessageProtocol,
    connect_time: DateTime<Utc>,
    received: u64,
    sent: u64,
}

impl Session {
    fn new(config: Arc<NeighborConfig>, protocol: MessageProtocol) -> Self {
        Self {
            config,
            protocol,
            connect_time: Utc::now(),
            received: 0,
            sent: 0,
        }
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.config.addr
    }

    /// Wait briefly for one framed message; None when the timeout lapses
    async fn poll(&mut self) -> Result<Option<Envelope>, SessionError> {
        match timeout(POLL_TIMEOUT, self.protocol.next()).await {
            // Framed stream is exhausted, remote side closed the channel
            Ok(None) => Err(SessionError::Closed(self.addr())),
            Ok(Some(Ok(envelope))) => {
                trace!("[{}] Incoming: {}", self.addr(), envelope.payload.kind());
                self.received += 1;
                Ok(Some(envelope))
            }
            Ok(Some(Err(err))) => Err(SessionError::Transport(err)),
            // Timeout hit first, nothing to read here
            Err(_) => Ok(None),
        }
    }

    // Send a message, flushing the send buffer afterwards
    async fn send(&mut self, envelope: Envelope) -> Result<(), io::Error> {
        trace!("[{}] Outgoing: {}", self.addr(), envelope.payload.kind());
        self.protocol.send(envelope).await?;
        self.sent += 1;
        Ok(())
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Session {} rel={} uptime={} rx={} tx={}>",
            self.addr(),
            self.config.relationship,
            format_time_as_elapsed(self.connect_time),
            self.received,
            self.sent,
        )
    }
}

/// Owns every neighbor channel and multiplexes reads across them
pub struct SessionManager {
    sessions: Vec<Session>,
    // Round-robin cursor so one chatty channel cannot starve the rest
    next: usize,
}

impl SessionManager {
    /// Connect the channel for every configured neighbor, keyed by address
    pub async fn connect(config: &RouterConfig) -> Result<Self, io::Error> {
        let mut sessions = Vec::with_capacity(config.neighbors.len());
        for neighbor in &config.neighbors {
            let path = Path::new(&config.socket_dir).join(neighbor.addr.to_string());
            let stream = UnixStream::connect(&path).await?;
            debug!(
                "Connected to {} ({}) at {}",
                neighbor.addr,
                neighbor.relationship,
                path.display()
            );
            sessions.push(Session::new(
                Arc::clone(neighbor),
                Framed::new(stream, MessageCodec::new()),
            ));
        }
        Ok(Self { sessions, next: 0 })
    }

    /// Poll each channel once, starting after the last one that produced a
    /// message; yields at most one framed message in total
    pub async fn poll_message(&mut self) -> Result<Option<(Ipv4Addr, Envelope)>, SessionError> {
        for offset in 0..self.sessions.len() {
            let idx = (self.next + offset) % self.sessions.len();
            if let Some(envelope) = self.sessions[idx].poll().await? {
                let addr = self.sessions[idx].addr();
                self.next = (idx + 1) % self.sessions.len();
                return Ok(Some((addr, envelope)));
            }
        }
        Ok(None)
    }

    pub async fn send(&mut self, addr: Ipv4Addr, envelope: Envelope) -> Result<(), io::Error> {
        match self.sessions.iter_mut().find(|s| s.addr() == addr) {
            Some(session) => session.send(envelope).await,
            // Every next-hop is a configured neighbor, so this is a bug
            // somewhere upstream rather than a reason to die
            None => {
                warn!("No channel to {}, dropping outbound message", addr);
                Ok(())
            }
        }
    }
}
