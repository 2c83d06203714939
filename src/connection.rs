//! Per-connection state (§3, §4.5): the Connecting -> Finding -> Connected state machine.
//!
//! This module holds only the state data; the event loop (`server.rs`) owns the actual socket
//! and buffers alongside it, since those are resources with their own lifecycle and this state
//! is plain data cloned freely (e.g. by the matchmaker scan).

use mio::Token;

/// The `Finding` state's payload: everything the server needs to attempt a match and, once
/// matched, to build the `found` record for the peer (§4.3, §4.6).
#[derive(Debug, Clone)]
pub struct FindingInfo {
    pub peer_id: u16,
    pub name: String,
    pub id: u32,
    pub trainer_type: String,
    pub win_text: i64,
    pub lose_text: i64,
    /// The party's raw, unescaped fields exactly as received — stored opaquely so it can be
    /// relayed byte-for-byte without re-parsing or re-escaping ambiguity (§9 "opaque party
    /// storage").
    pub party: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum ConnState {
    Connecting,
    Finding(FindingInfo),
    /// Holds the stable socket key of the paired peer, never an owning reference, to avoid a
    /// reference cycle between the two connections (§9 "connection ownership cycle").
    Connected(Token),
}

impl ConnState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnState::Connecting => "connecting",
            ConnState::Finding(_) => "finding",
            ConnState::Connected(_) => "connected",
        }
    }
}
