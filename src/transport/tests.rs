//! Wire-level tests for the HTTP transport against a mock server.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};

use crate::config::EngineConfig;
use crate::event::Event;

use super::{HttpTransport, Transport, TransportError};

#[derive(Debug)]
struct CapturedRequest {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> &str {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }
}

fn parse_header_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    line.split_once(':')
        .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
}

fn read_http_request(stream: &mut TcpStream) -> CapturedRequest {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .expect("read request line");
    let parts: Vec<&str> = request_line.trim().split(' ').collect();
    let method = parts.first().unwrap_or(&"").to_string();
    let path = parts.get(1).unwrap_or(&"").to_string();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read header");
        if line.trim().is_empty() {
            break;
        }
        let Some((key, value)) = parse_header_line(&line) else {
            continue;
        };
        if key == "content-length" {
            content_length = value.parse().unwrap_or(0);
        }
        headers.push((key, value));
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).expect("read body");
    }

    CapturedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    }
}

/// Spawn a mock server answering successive requests with the given statuses.
fn spawn_mock_server(
    listener: TcpListener,
    statuses: Vec<u16>,
) -> (SocketAddr, mpsc::Receiver<CapturedRequest>) {
    let addr = listener.local_addr().expect("listener has address");
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for status in statuses {
            let Ok((mut stream, _)) = listener.accept() else {
                break;
            };
            let captured = read_http_request(&mut stream);
            let response = format!("HTTP/1.1 {status} X\r\nContent-Length: 0\r\n\r\n");
            let _ = stream.write_all(response.as_bytes());
            let _ = tx.send(captured);
        }
    });

    (addr, rx)
}

#[fixture]
fn tcp_listener() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}

fn config_for(addr: SocketAddr) -> EngineConfig {
    EngineConfig::builder("harbor-9", "s3cr3t key", format!("http://{addr}"))
        .with_connect_timeout_ms(5000)
        .with_request_timeout_ms(5000)
        .build()
        .expect("build config")
}

fn sample_batch() -> Vec<Event> {
    vec![
        Event::stamped("v1.fp", "click", 1.0, "", Default::default()),
        Event::stamped("v1.fp", "scroll", 75.0, "", Default::default()),
    ]
}

#[rstest]
fn posts_batch_to_ingest_path(tcp_listener: TcpListener) {
    let (addr, rx) = spawn_mock_server(tcp_listener, vec![200]);
    let mut transport = HttpTransport::new(&config_for(addr));

    transport.send(&sample_batch()).expect("delivery succeeds");

    let captured = rx.recv_timeout(Duration::from_secs(5)).expect("request");
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.path, "/ingest/harbor-9/batch");
    assert_eq!(captured.header("content-type"), "application/json");
    assert_eq!(captured.header("x-api-key"), "s3cr3t key");

    let body: serde_json::Value = serde_json::from_str(&captured.body).expect("json body");
    let events = body.as_array().expect("array body");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["ship_id"], "v1.fp");
    assert_eq!(events[0]["cargo_id"], "click");
    assert_eq!(events[1]["value"], 75.0);
}

#[rstest]
fn non_success_status_is_a_transport_error(tcp_listener: TcpListener) {
    let (addr, _rx) = spawn_mock_server(tcp_listener, vec![503]);
    let mut transport = HttpTransport::new(&config_for(addr));

    let err = transport.send(&sample_batch()).expect_err("must fail");
    assert!(matches!(err, TransportError::Status(503)));
}

#[rstest]
fn unreachable_endpoint_is_a_network_error(tcp_listener: TcpListener) {
    // Bind then drop the listener so the port is closed.
    let addr = tcp_listener.local_addr().expect("address");
    drop(tcp_listener);
    let mut transport = HttpTransport::new(&config_for(addr));

    let err = transport.send(&sample_batch()).expect_err("must fail");
    assert!(matches!(err, TransportError::Network(_)));
}

#[rstest]
fn best_effort_hits_teardown_path_with_encoded_key(tcp_listener: TcpListener) {
    let (addr, rx) = spawn_mock_server(tcp_listener, vec![200]);
    let transport = HttpTransport::new(&config_for(addr));

    transport.send_best_effort(sample_batch());

    let captured = rx.recv_timeout(Duration::from_secs(5)).expect("request");
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.path, "/ingest/harbor-9?k=s3cr3t%20key");

    let body: serde_json::Value = serde_json::from_str(&captured.body).expect("json body");
    assert_eq!(body.as_array().expect("array").len(), 2);
}

#[rstest]
fn best_effort_swallows_failures(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("address");
    drop(tcp_listener);
    let transport = HttpTransport::new(&config_for(addr));

    // Must neither block nor panic when nothing is listening.
    transport.send_best_effort(sample_batch());
}
