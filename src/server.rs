//! The single-threaded, readiness-multiplexed event loop (§4.7).
//!
//! One `mio::Poll` instance multiplexes the listening socket and every accepted client socket.
//! Each client's write-interest is toggled on only while its send buffer is non-empty, which
//! gives the same practical readiness sets as the reference implementation's `select()` call
//! without re-registering every socket on every tick.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use crate::codec::{RecordParser, RecordWriter};
use crate::config::ConfigFile;
use crate::connection::{ConnState, FindingInfo};
use crate::error::CableClubError;
use crate::matchmaker;
use crate::public_id;
use crate::rules::RuleSet;
use crate::species::SpeciesDatabase;
use crate::validator::validate_party;

const LISTENER: Token = Token(0);
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// One accepted socket plus its protocol state (§3, §4.5).
struct Conn {
    stream: TcpStream,
    state: ConnState,
    address: SocketAddr,
    send_buffer: Vec<u8>,
    recv_buffer: Vec<u8>,
    writable_registered: bool,
}

impl Conn {
    fn queue(&mut self, bytes: &[u8]) {
        self.send_buffer.extend_from_slice(bytes);
        if self.send_buffer.len() > crate::MAX_SEND_BUFFER {
            warn!("{self}: send buffer exceeded cap, will disconnect");
        }
    }
}

impl std::fmt::Display for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            ConnState::Connecting => "connecting",
            ConnState::Finding(_) => "finding",
            ConnState::Connected(_) => "connected",
        };
        write!(f, "{}/{}", self.address, state)
    }
}

pub struct Server {
    poll: Poll,
    listener: TcpListener,
    connections: BTreeMap<Token, Conn>,
    next_token: usize,
    species: SpeciesDatabase,
    rule_set: RuleSet,
    config: ConfigFile,
    loop_count: u64,
}

impl Server {
    pub fn new(config: ConfigFile) -> Result<Self, CableClubError> {
        let addr = config.dns_listener_address()?;
        let mut listener = TcpListener::bind(addr)?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        let species = SpeciesDatabase::load(&config.pbs_dir)?;
        let rule_set = RuleSet::load(config.rules_dir.clone());

        info!("cable club core listening on {addr}");
        Ok(Server {
            poll,
            listener,
            connections: BTreeMap::new(),
            next_token: 1,
            species,
            rule_set,
            config,
            loop_count: 0,
        })
    }

    /// Run until `shutdown` is set. Each tick: refresh rules every `RULES_REFRESH_RATE`
    /// iterations, wait on the poller, then dispatch readiness (§4.7).
    pub fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<(), CableClubError> {
        let mut events = Events::with_capacity(1024);
        while !shutdown.load(Ordering::Relaxed) {
            self.loop_count += 1;
            if self.loop_count % crate::RULES_REFRESH_RATE == 0 {
                self.loop_count = 0;
                if self.rule_set.refresh_if_changed() {
                    debug!("rule set reloaded");
                }
            }

            if let Err(err) = self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                if err.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(err.into());
            }

            for event in events.iter() {
                let token = event.token();
                if token == LISTENER {
                    if event.is_error() {
                        return Err(CableClubError::StartupError(
                            "listener socket error".to_string(),
                        ));
                    }
                    self.accept_all()?;
                    continue;
                }

                if event.is_error() {
                    self.disconnect(token, "transport error");
                    continue;
                }
                if event.is_writable() {
                    self.flush_writes(token);
                }
                if event.is_readable() {
                    self.handle_readable(token);
                }
            }
        }
        Ok(())
    }

    fn accept_all(&mut self) -> Result<(), CableClubError> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, address)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    self.poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)?;
                    self.connections.insert(
                        token,
                        Conn {
                            stream,
                            state: ConnState::Connecting,
                            address,
                            send_buffer: Vec::new(),
                            recv_buffer: Vec::new(),
                            writable_registered: false,
                        },
                    );
                    debug!("accepted {address}");
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn flush_writes(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if conn.send_buffer.is_empty() {
            return;
        }
        match conn.stream.write(&conn.send_buffer) {
            Ok(sent) => {
                conn.send_buffer.drain(..sent);
                if conn.send_buffer.is_empty() {
                    self.lower_write_interest(token);
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(_) => self.disconnect(token, "transport error"),
        }
    }

    fn raise_write_interest(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if conn.writable_registered {
            return;
        }
        if self
            .poll
            .registry()
            .reregister(&mut conn.stream, token, Interest::READABLE | Interest::WRITABLE)
            .is_ok()
        {
            conn.writable_registered = true;
        }
    }

    fn lower_write_interest(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if !conn.writable_registered {
            return;
        }
        if self
            .poll
            .registry()
            .reregister(&mut conn.stream, token, Interest::READABLE)
            .is_ok()
        {
            conn.writable_registered = false;
        }
    }

    /// Drain a client socket until the kernel reports `WouldBlock`. `mio`'s poller is
    /// edge-triggered, so a single readiness event only fires on a transition in the kernel
    /// buffer — a burst bigger than `RECV_CHUNK_SIZE` (an easy thing for a multi-Pokemon party
    /// record to be) would otherwise leave bytes unread with no further event to wake us,
    /// mirroring the loop `accept_all` already uses for the listener.
    fn handle_readable(&mut self, token: Token) {
        let mut buf = [0u8; crate::RECV_CHUNK_SIZE];
        loop {
            if !self.connections.contains_key(&token) {
                return;
            }
            let read_result = self.connections.get_mut(&token).unwrap().stream.read(&mut buf);
            match read_result {
                Ok(0) => {
                    self.disconnect(token, "client disconnected");
                    return;
                }
                Ok(n) => {
                    let lines = {
                        let Some(conn) = self.connections.get_mut(&token) else {
                            return;
                        };
                        conn.recv_buffer.extend_from_slice(&buf[..n]);
                        let mut lines = Vec::new();
                        loop {
                            let Some(pos) = conn.recv_buffer.iter().position(|&b| b == b'\n') else {
                                break;
                            };
                            let line: Vec<u8> = conn.recv_buffer.drain(..=pos).collect();
                            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
                        }
                        lines
                    };
                    for line in lines {
                        if !self.connections.contains_key(&token) {
                            return;
                        }
                        self.dispatch_line(token, &line);
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(_) => {
                    self.disconnect(token, "client disconnected");
                    return;
                }
            }
        }
    }

    fn dispatch_line(&mut self, token: Token, line: &str) {
        // Read the dispatch target out as an owned value first so this doesn't hold an
        // immutable borrow of `self.connections` across the `&mut self` calls below.
        enum Target {
            Connecting,
            Finding,
            Connected(Token),
        }
        let target = match self.connections.get(&token) {
            Some(conn) => match &conn.state {
                ConnState::Connecting => Target::Connecting,
                ConnState::Finding(_) => Target::Finding,
                ConnState::Connected(peer_token) => Target::Connected(*peer_token),
            },
            None => return,
        };
        match target {
            Target::Connecting => self.handle_connecting(token, line),
            Target::Finding => debug!("dropping message from {token:?} while still finding a peer"),
            Target::Connected(peer_token) => self.handle_connected(peer_token, line),
        }
    }

    fn handle_connecting(&mut self, token: Token, line: &str) {
        let mut parser = RecordParser::new(line);
        let parsed = (|| -> Result<FindingInfo, String> {
            let record_type = parser.str().map_err(|e| e.to_string())?;
            if record_type != "find" {
                return Err("bad assert".to_string());
            }
            // Version is parsed but intentionally unchecked; preserved as a future gating
            // hook (§9 ambiguity (a)).
            let _version = parser.str().map_err(|e| e.to_string())?;
            let peer_id_raw = parser.int().map_err(|e| e.to_string())?;
            if !(0..=0xFFFF).contains(&peer_id_raw) {
                // A peer_id outside the public-id space can never legitimately match anyone;
                // truncating it with `as u16` would instead fold it back into range and risk a
                // spurious match, so reject it outright.
                return Err("bad assert".to_string());
            }
            let peer_id = peer_id_raw as u16;
            let name = parser.str().map_err(|e| e.to_string())?;
            let id = parser.int().map_err(|e| e.to_string())? as u32;
            let trainer_type = parser.str().map_err(|e| e.to_string())?;
            let win_text = parser.int().map_err(|e| e.to_string())?;
            let lose_text = parser.int().map_err(|e| e.to_string())?;
            let party = parser.raw_all();
            Ok(FindingInfo {
                peer_id,
                name,
                id,
                trainer_type,
                win_text,
                lose_text,
                party,
            })
        })();

        let info = match parsed {
            Ok(info) => info,
            Err(_) => {
                self.disconnect(token, "bad assert");
                return;
            }
        };

        let party_line = info.party.join(",");
        let errors = validate_party(&party_line, &self.species, &self.config);
        if !errors.is_empty() {
            debug!("party rejected for {token:?}: {errors:?}");
            self.disconnect(token, "invalid party");
            return;
        }

        if let Some(conn) = self.connections.get_mut(&token) {
            conn.state = ConnState::Finding(info.clone());
        } else {
            return;
        }

        let states = self.connections.iter().map(|(&t, c)| (t, &c.state));
        if let Some(peer_token) = matchmaker::find_match(token, &info, states) {
            self.connect(token, peer_token);
        }
    }

    fn handle_connected(&mut self, peer_token: Token, line: &str) {
        let Some(peer) = self.connections.get_mut(&peer_token) else {
            debug!("dropping relayed message, peer {peer_token:?} vanished");
            return;
        };
        let mut framed = line.as_bytes().to_vec();
        framed.push(b'\n');
        peer.queue(&framed);
        self.raise_write_interest(peer_token);
    }

    /// Build and enqueue both `found` records, then transition both sides to `Connected`
    /// (§4.6 — both messages are enqueued before either transition happens).
    fn connect(&mut self, a: Token, b: Token) {
        let (Some(a_info), Some(b_info)) = (self.finding_info(a), self.finding_info(b)) else {
            return;
        };

        let rules = self.rule_set.read();
        let a_message = build_found_record(0, &b_info, &rules);
        let b_message = build_found_record(1, &a_info, &rules);
        drop(rules);

        if let Some(conn) = self.connections.get_mut(&a) {
            conn.queue(a_message.as_bytes());
        }
        if let Some(conn) = self.connections.get_mut(&b) {
            conn.queue(b_message.as_bytes());
        }
        self.raise_write_interest(a);
        self.raise_write_interest(b);

        if let Some(conn) = self.connections.get_mut(&a) {
            conn.state = ConnState::Connected(b);
        }
        if let Some(conn) = self.connections.get_mut(&b) {
            conn.state = ConnState::Connected(a);
        }
        info!("paired {a:?} <-> {b:?}");
    }

    fn finding_info(&self, token: Token) -> Option<FindingInfo> {
        match &self.connections.get(&token)?.state {
            ConnState::Finding(info) => Some(info.clone()),
            _ => None,
        }
    }

    /// Remove `token` from the connection map and tear it down. Idempotent: calling this on an
    /// already-removed token is a no-op (§8 property 8).
    fn disconnect(&mut self, token: Token, reason: &str) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };
        let mut writer = RecordWriter::new();
        writer.str("disconnect").str(reason);
        let _ = conn.stream.write_all(writer.finish().as_bytes());
        let _ = self.poll.registry().deregister(&mut conn.stream);
        info!("disconnected {conn} ({reason})");

        if let ConnState::Connected(peer_token) = conn.state {
            self.disconnect(peer_token, "peer disconnected");
        }
    }
}

fn build_found_record(
    side: i64,
    peer: &FindingInfo,
    rules: &[crate::rules::Rule],
) -> String {
    let mut writer = RecordWriter::new();
    writer
        .str("found")
        .int(side)
        .str(&peer.name)
        .str(&peer.trainer_type)
        .int(peer.win_text)
        .int(peer.lose_text)
        .raw(&peer.party);
    writer.int(rules.len() as i64);
    for rule in rules {
        writer.raw(rule);
    }
    writer.finish()
}
