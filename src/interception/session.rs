// src/interception/session.rs
//! Per-session state
//!
//! Everything that used to be ambient — the current destination, the
//! direction convention, the active trace and replay index — lives on the
//! session so independent servers can run side by side in one process.

use crate::recording::TraceWriter;
use crate::replay::ReplayIndex;
use crate::utils::config::{EnvFilter, SessionMode};
use tracing::{debug, info, warn};

/// Destination discovery: unbound until the first server location
/// announcement, bound (and direction-flipped) forever after
#[derive(Debug, Default)]
pub struct DestinationState {
    destination: Option<String>,
    flipped: bool,
}

impl DestinationState {
    /// Drive the state machine with an announcement payload whose last
    /// whitespace-separated token is `host:port`. Only the first parseable
    /// announcement transitions; everything later is ignored.
    pub fn announce(&mut self, payload: &str) -> bool {
        if self.destination.is_some() {
            debug!("Destination already bound, ignoring announcement");
            return false;
        }
        let Some(address) = parse_address(payload) else {
            warn!("Ignoring unparseable location announcement {:?}", payload);
            return false;
        };
        info!("Destination bound to {}; serving the server side now", address);
        self.destination = Some(address);
        // A server contacted us, so the server side is "incoming" from here on
        self.flipped = true;
        true
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Whether the direction convention has swapped client and server sides
    pub fn flipped(&self) -> bool {
        self.flipped
    }
}

fn parse_address(payload: &str) -> Option<String> {
    let last_word = payload.split_whitespace().last()?;
    let (host, port) = last_word.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    let port: u16 = port.parse().ok()?;
    Some(format!("{}:{}", host, port))
}

/// Mutable session state, guarded by one mutex on the server: trace writes
/// and replay lookups never interleave
#[derive(Debug)]
pub struct SessionState {
    pub mode: SessionMode,
    pub writer: Option<TraceWriter>,
    pub replay: ReplayIndex,
    pub destination: DestinationState,
    pub env_filter: EnvFilter,
}

impl SessionState {
    pub fn new(env_filter: EnvFilter) -> Self {
        Self {
            mode: SessionMode::Off,
            writer: None,
            replay: ReplayIndex::new(),
            destination: DestinationState::default(),
            env_filter,
        }
    }

    /// Reset everything that belongs to one recording/replaying run
    pub fn reset(&mut self) {
        self.mode = SessionMode::Off;
        self.writer = None;
        self.replay = ReplayIndex::new();
        self.destination = DestinationState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_fires_once() {
        let mut state = DestinationState::default();
        assert!(state.announce("SUT server ready at localhost:7001"));
        assert_eq!(state.destination(), Some("localhost:7001"));
        assert!(state.flipped());

        // A second announcement with a different address changes nothing
        assert!(!state.announce("SUT server ready at otherhost:9999"));
        assert_eq!(state.destination(), Some("localhost:7001"));
    }

    #[test]
    fn test_unparseable_announcements_ignored() {
        let mut state = DestinationState::default();
        assert!(!state.announce("no address here"));
        assert!(!state.announce("port-only :8080"));
        assert!(!state.announce("bad-port host:http"));
        assert!(!state.announce(""));
        assert_eq!(state.destination(), None);
        assert!(!state.flipped());

        // Still unbound, so a good announcement afterwards transitions
        assert!(state.announce("ready at 10.0.0.5:4242"));
        assert_eq!(state.destination(), Some("10.0.0.5:4242"));
    }

    #[test]
    fn test_session_reset() {
        let mut session = SessionState::new(EnvFilter::default());
        session.mode = SessionMode::Record;
        session.destination.announce("at host:1234");

        session.reset();
        assert_eq!(session.mode, SessionMode::Off);
        assert!(session.writer.is_none());
        assert!(session.replay.is_empty());
        assert_eq!(session.destination.destination(), None);
    }
}
