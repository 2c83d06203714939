/// Command-line argument parsing.
pub mod cli;
/// Line-framed, comma/backslash-escaped record codec (C1).
pub mod codec;
/// Configuration handling for the server.
pub mod config;
/// Per-socket connection state and the Connecting/Finding/Connected state machine (C5).
pub mod connection;
/// Crate-wide error type for the startup path.
pub mod error;
/// Logging setup.
pub mod logging;
/// Peer rendezvous over the Finding connections (C6).
pub mod matchmaker;
/// Hot-reloadable rule set loaded from a directory of files (C4).
pub mod rules;
/// The single-threaded readiness-multiplexed event loop (C7).
pub mod server;
/// Species/ability/move/item database loaded from PBS-style files (C2).
pub mod species;
/// Recursive party validator (C3).
pub mod validator;
/// Independent gift HTTP service (C8).
pub mod web;

/// Public trainer id, used as the pairing key (§3 invariant 5).
pub fn public_id(id: u32) -> u16 {
    (id & 0xFFFF) as u16
}

/// Bytes read per non-blocking `recv` call on a client socket (§4.7 step 5).
pub const RECV_CHUNK_SIZE: usize = 4096;

/// Event-loop ticks between rule-set change checks (§4.7 step 1).
pub const RULES_REFRESH_RATE: u64 = 60;

/// Soft cap on a connection's outstanding send buffer; overrun disconnects the client (§5).
pub const MAX_SEND_BUFFER: usize = 1024 * 1024;
