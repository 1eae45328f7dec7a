//! Tests for the text protocol
//!
//! These tests verify:
//! - Query parsing and argument validation
//! - Response rendering
//! - Stable numeric command kinds
//! - Serving queries over TCP
//! - Holding extra connections until a slot frees up

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tidekv::network::{Client, QueryHandler, Server, ShutdownHandle};
use tidekv::protocol::{parse_query, Command, CommandKind, Response};
use tidekv::{Database, Engine, Storage, TideError};

// =============================================================================
// Parsing
// =============================================================================

#[test]
fn test_parse_all_commands() {
    assert_eq!(
        parse_query("SET k v").unwrap(),
        Command::Set { key: "k".into(), value: "v".into() }
    );
    assert_eq!(parse_query("GET k").unwrap(), Command::Get { key: "k".into() });
    assert_eq!(parse_query("DEL k").unwrap(), Command::Del { key: "k".into() });
}

#[test]
fn test_parse_rejects_wrong_arity() {
    for query in ["SET k", "SET k v extra", "GET", "GET a b", "DEL"] {
        assert!(
            matches!(parse_query(query), Err(TideError::Protocol(_))),
            "accepted {query:?}"
        );
    }
}

#[test]
fn test_parse_rejects_unknown_and_empty() {
    assert!(matches!(parse_query("PUT k v"), Err(TideError::Protocol(_))));
    assert!(matches!(parse_query(""), Err(TideError::Protocol(_))));
    assert!(matches!(parse_query("   \t "), Err(TideError::Protocol(_))));
}

#[test]
fn test_command_kind_codes_are_stable() {
    assert_eq!(u8::from(CommandKind::Set), 1);
    assert_eq!(u8::from(CommandKind::Get), 2);
    assert_eq!(u8::from(CommandKind::Del), 3);
    assert_eq!(CommandKind::try_from(3u8).unwrap(), CommandKind::Del);
    assert!(CommandKind::try_from(0u8).is_err());
    assert!(CommandKind::try_from(4u8).is_err());
}

#[test]
fn test_only_get_is_read_only() {
    assert!(parse_query("SET k v").unwrap().is_mutation());
    assert!(parse_query("DEL k").unwrap().is_mutation());
    assert!(!parse_query("GET k").unwrap().is_mutation());
}

// =============================================================================
// Responses
// =============================================================================

#[test]
fn test_response_rendering() {
    assert_eq!(Response::Ok.to_string(), "[ok]");
    assert_eq!(Response::Value("v".into()).to_string(), "[ok] v");
    assert_eq!(Response::NotFound.to_string(), "[not found]");
    assert_eq!(Response::error("boom").to_string(), "[error] boom");
    assert!(Response::error("boom").is_error());
}

// =============================================================================
// Over TCP
// =============================================================================

struct Running {
    addr: String,
    shutdown: ShutdownHandle,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.shutdown.shutdown();
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

fn serve(max_message_size: usize, idle_timeout: Duration, max_connections: usize) -> Running {
    let storage = Arc::new(Storage::in_memory(Arc::new(Engine::default())));
    let database = Arc::new(Database::new(storage));
    let server = Server::bind("127.0.0.1:0", max_connections, idle_timeout).unwrap();
    let addr = server.local_addr().to_string();
    let shutdown = server.shutdown_handle();
    let handler = Arc::new(QueryHandler::new(database, max_message_size));
    let handle = thread::spawn(move || server.run(handler).unwrap());

    Running {
        addr,
        shutdown,
        handle: Some(handle),
    }
}

#[test]
fn test_client_round_trip() {
    let running = serve(4096, Duration::from_secs(5), 4);
    let mut client = Client::connect(&running.addr, Duration::from_secs(5)).unwrap();

    assert_eq!(client.send("GET name").unwrap(), "[not found]");
    assert_eq!(client.send("SET name tide").unwrap(), "[ok]");
    assert_eq!(client.send("GET name").unwrap(), "[ok] tide");
    assert_eq!(client.send("DEL name").unwrap(), "[ok]");
    assert_eq!(client.send("GET name").unwrap(), "[not found]");
    assert!(client.send("FLY away").unwrap().starts_with("[error]"));
}

#[test]
fn test_clients_share_state() {
    let running = serve(4096, Duration::from_secs(5), 4);
    let mut writer = Client::connect(&running.addr, Duration::from_secs(5)).unwrap();
    let mut reader = Client::connect(&running.addr, Duration::from_secs(5)).unwrap();

    assert_eq!(writer.send("SET shared 42").unwrap(), "[ok]");
    assert_eq!(reader.send("GET shared").unwrap(), "[ok] 42");
}

#[test]
fn test_oversize_message_closes_connection() {
    let running = serve(16, Duration::from_secs(5), 4);
    let mut stream = TcpStream::connect(&running.addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    // One byte over the limit, with no newline in sight
    let query = format!("SET key {}", "x".repeat(9));
    assert_eq!(query.len(), 17);
    stream.write_all(query.as_bytes()).unwrap();

    let mut reply = String::new();
    stream.read_to_string(&mut reply).unwrap();
    assert!(reply.starts_with("[error]"), "got {reply:?}");
}

#[test]
fn test_idle_connection_is_closed() {
    let running = serve(4096, Duration::from_millis(50), 4);
    let mut stream = TcpStream::connect(&running.addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let mut buf = Vec::new();
    let read = stream.read_to_end(&mut buf).unwrap();
    assert_eq!(read, 0);
}

#[test]
fn test_connection_over_limit_waits_for_a_slot() {
    let running = serve(4096, Duration::from_secs(5), 1);
    let mut first = Client::connect(&running.addr, Duration::from_secs(5)).unwrap();
    assert_eq!(first.send("SET k v").unwrap(), "[ok]");

    // Accepted by the kernel but not served while `first` holds the slot
    let mut second = TcpStream::connect(&running.addr).unwrap();
    second.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    second.write_all(b"GET k\n").unwrap();
    let mut buf = [0u8; 64];
    let err = second.read(&mut buf).unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
        "got {err:?}"
    );

    drop(first);
    second.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut reader = BufReader::new(second);
    let mut reply = String::new();
    reader.read_line(&mut reply).unwrap();
    assert_eq!(reply.trim_end(), "[ok] v");
}
