//! End-to-end exercises of §8's concrete scenarios, driving a real `Server` over real TCP
//! sockets against a throwaway PBS/rules/gifts fixture tree.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cableclub::config::ConfigFile;
use cableclub::server::Server;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    config: ConfigFile,
}

fn build_fixture(port: u16) -> Fixture {
    let dir = TempDir::new().unwrap();
    let pbs_dir = dir.path().join("PBS");
    let rules_dir = dir.path().join("Rules");
    std::fs::create_dir_all(&pbs_dir).unwrap();
    std::fs::create_dir_all(&rules_dir).unwrap();

    std::fs::write(pbs_dir.join("abilities.txt"), "[STATIC]\n").unwrap();
    std::fs::write(pbs_dir.join("moves.txt"), "[TACKLE]\n[GROWL]\n").unwrap();
    std::fs::write(pbs_dir.join("items.txt"), "[POTION]\n").unwrap();
    std::fs::write(
        pbs_dir.join("server_pokemon.txt"),
        "[PIKACHU]\nabilities = STATIC\nmoves = TACKLE,GROWL\n",
    )
    .unwrap();

    let mut config = ConfigFile::default();
    config.host = "127.0.0.1".to_string();
    config.port = port;
    config.pbs_dir = pbs_dir;
    config.rules_dir = rules_dir;

    Fixture { _dir: dir, config }
}

fn spawn_server(config: ConfigFile) -> (std::thread::JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let thread_shutdown = shutdown.clone();
    let handle = std::thread::spawn(move || {
        let mut server = Server::new(config).expect("server should start");
        server.run(thread_shutdown).expect("server should run cleanly");
    });
    // give the listener a moment to bind before clients connect.
    std::thread::sleep(Duration::from_millis(100));
    (handle, shutdown)
}

fn minimal_party_zero() -> &'static str {
    "0"
}

fn connect_client(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).expect("client should connect");
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream
}

fn read_line(stream: &mut TcpStream) -> String {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut line = String::new();
    reader.read_line(&mut line).expect("should read a line");
    line
}

#[test]
fn s2_pairing_match_produces_found_on_both_sides() {
    let port = 19001;
    let fixture = build_fixture(port);
    let (handle, shutdown) = spawn_server(fixture.config);

    let mut a = connect_client(port);
    let mut b = connect_client(port);

    // public_id(65538) == 2, public_id(65578) == 42.
    a.write_all(format!("find,1.0,42,Ash,65538,Youngster,0,0,{}\n", minimal_party_zero()).as_bytes())
        .unwrap();
    b.write_all(format!("find,1.0,2,Gary,65578,Rival,0,0,{}\n", minimal_party_zero()).as_bytes())
        .unwrap();

    let a_line = read_line(&mut a);
    let b_line = read_line(&mut b);
    assert!(a_line.starts_with("found,0,"), "unexpected: {a_line:?}");
    assert!(b_line.starts_with("found,1,"), "unexpected: {b_line:?}");

    shutdown.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn s3_no_match_leaves_both_sides_finding() {
    let port = 19002;
    let fixture = build_fixture(port);
    let (handle, shutdown) = spawn_server(fixture.config);

    let mut a = connect_client(port);
    a.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
    let mut b = connect_client(port);
    b.set_read_timeout(Some(Duration::from_millis(300))).unwrap();

    a.write_all(format!("find,1.0,42,Ash,65538,Youngster,0,0,{}\n", minimal_party_zero()).as_bytes())
        .unwrap();
    // peer_id 99 does not match A's public id (2).
    b.write_all(format!("find,1.0,99,Gary,65578,Rival,0,0,{}\n", minimal_party_zero()).as_bytes())
        .unwrap();

    let mut buf = [0u8; 16];
    let result = a.read(&mut buf);
    assert!(result.is_err() || result.unwrap() == 0, "expected no found message");

    shutdown.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn s4_connected_relay_forwards_lines_verbatim() {
    let port = 19003;
    let fixture = build_fixture(port);
    let (handle, shutdown) = spawn_server(fixture.config);

    let mut a = connect_client(port);
    let mut b = connect_client(port);
    a.write_all(format!("find,1.0,42,Ash,65538,Youngster,0,0,{}\n", minimal_party_zero()).as_bytes())
        .unwrap();
    b.write_all(format!("find,1.0,2,Gary,65578,Rival,0,0,{}\n", minimal_party_zero()).as_bytes())
        .unwrap();
    let _ = read_line(&mut a);
    let _ = read_line(&mut b);

    a.write_all(b"attack,tackle\n").unwrap();
    let relayed = read_line(&mut b);
    assert_eq!(relayed, "attack,tackle\n");

    shutdown.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn s5_peer_drop_notifies_survivor_and_closes_its_socket() {
    let port = 19004;
    let fixture = build_fixture(port);
    let (handle, shutdown) = spawn_server(fixture.config);

    let mut a = connect_client(port);
    let mut b = connect_client(port);
    a.write_all(format!("find,1.0,42,Ash,65538,Youngster,0,0,{}\n", minimal_party_zero()).as_bytes())
        .unwrap();
    b.write_all(format!("find,1.0,2,Gary,65578,Rival,0,0,{}\n", minimal_party_zero()).as_bytes())
        .unwrap();
    let _ = read_line(&mut a);
    let _ = read_line(&mut b);

    drop(a);
    let notice = read_line(&mut b);
    assert_eq!(notice, "disconnect,peer disconnected\n");

    shutdown.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn s6_invalid_party_disconnects_with_reason() {
    let port = 19005;
    let fixture = build_fixture(port);
    let (handle, shutdown) = spawn_server(fixture.config);

    let mut client = connect_client(port);
    // level 101 is out of range (1..=100), so validation must fail.
    let bad_party = "1,PIKACHU,101,1,1,X,0,0,0,,0,0,0,,,,,,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,,,0,0,0,0,0,0,0,0,0,false,false";
    client
        .write_all(format!("find,1.0,2,X,1,Y,0,0,{bad_party}\n").as_bytes())
        .unwrap();

    let reply = read_line(&mut client);
    assert_eq!(reply, "disconnect,invalid party\n");

    shutdown.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn out_of_range_peer_id_is_rejected_not_truncated() {
    let port = 19006;
    let fixture = build_fixture(port);
    let (handle, shutdown) = spawn_server(fixture.config);

    let mut client = connect_client(port);
    // 65538 & 0xFFFF == 2, which would spuriously be treated as a valid public id if the
    // peer_id field were truncated with `as u16` instead of range-checked.
    client
        .write_all(format!("find,1.0,65538,Ash,1,Youngster,0,0,{}\n", minimal_party_zero()).as_bytes())
        .unwrap();

    let reply = read_line(&mut client);
    assert_eq!(reply, "disconnect,bad assert\n");

    shutdown.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}
