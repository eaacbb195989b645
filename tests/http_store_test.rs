//! Integration tests for the HTTP remote store
//!
//! Serves a tiny scripted HTTP/1.1 repository from a local socket and runs
//! the collision validator against it end to end.

use repo_validator_rs::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

struct Route {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
}

/// Start a server answering HEAD and GET from `routes`; unknown paths get 404
fn serve(routes: HashMap<String, Route>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let routes = Arc::clone(&routes);
            thread::spawn(move || handle(stream, &routes));
        }
    });

    format!("http://{}/repo", addr)
}

fn handle(stream: TcpStream, routes: &HashMap<String, Route>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) if line == "\r\n" => break,
            Ok(_) => {}
        }
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();

    let not_found = Route {
        status: 404,
        headers: Vec::new(),
        body: Vec::new(),
    };
    let route = routes.get(path).unwrap_or(&not_found);
    let body: &[u8] = if method == "HEAD" { &[] } else { &route.body };

    let mut response = format!(
        "HTTP/1.1 {} Scripted\r\nContent-Length: {}\r\nConnection: close\r\n",
        route.status,
        body.len()
    );
    for (name, value) in &route.headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");

    let mut stream = stream;
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}

fn route(status: u16, body: &[u8]) -> Route {
    Route {
        status,
        headers: Vec::new(),
        body: body.to_vec(),
    }
}

fn sha1_of(root: &std::path::Path, relative: &str) -> String {
    compute_file_digest(&root.join(relative), ChecksumAlgorithm::Sha1).unwrap()
}

/// Test probe and fetch against a live socket
#[test]
fn test_ureq_store_probe_and_fetch() {
    let mut routes = HashMap::new();
    routes.insert(
        "/repo/a.jar".to_string(),
        Route {
            status: 200,
            headers: vec![("X-Checksum-Sha1", "abc123".to_string())],
            body: b"jar".to_vec(),
        },
    );
    let base = serve(routes);
    let store = UreqRemoteStore::new(Duration::from_secs(5));

    let probe = store.probe(&format!("{}/a.jar", base)).unwrap();
    assert_eq!(probe.status, 200);
    assert_eq!(probe.header("x-checksum-sha1"), Some("abc123"));

    let fetched = store.fetch(&format!("{}/a.jar", base)).unwrap();
    assert_eq!(fetched.status, 200);
    assert_eq!(fetched.body, b"jar");

    let missing = store.probe(&format!("{}/missing.jar", base)).unwrap();
    assert_eq!(missing.status, 404);
}

/// Test that a remote body larger than the read buffer is digested in full
#[test]
fn test_ureq_store_streams_body_digest() {
    let body: Vec<u8> = (0..300_000u32).map(|i| (i % 253) as u8).collect();
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("big.zip"), &body).unwrap();
    let expected = sha1_of(temp_dir.path(), "big.zip");

    let mut routes = HashMap::new();
    routes.insert("/repo/big.zip".to_string(), route(200, &body));
    let base = serve(routes);
    let store = UreqRemoteStore::new(Duration::from_secs(5));

    let found = store
        .fetch_digest(&format!("{}/big.zip", base), ChecksumAlgorithm::Sha1)
        .unwrap();
    assert_eq!(found.status, 200);
    assert_eq!(found.digest, Some(expected));

    let missing = store
        .fetch_digest(&format!("{}/missing.zip", base), ChecksumAlgorithm::Sha1)
        .unwrap();
    assert_eq!(
        missing,
        DigestResponse {
            status: 404,
            digest: None
        }
    );
}

/// Test a full collision run over HTTP
#[test]
fn test_collision_run_over_http() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("org/x")).unwrap();
    fs::write(root.join("org/x/x-1.0.pom"), b"<project/>").unwrap();
    fs::write(root.join("org/x/x-1.0.jar"), b"new jar").unwrap();
    fs::write(root.join("org/x/x-1.1.jar"), b"unpublished").unwrap();
    fs::write(root.join("org/x/broken.jar"), b"broken").unwrap();

    let pom_sha1 = sha1_of(root, "org/x/x-1.0.pom");
    let mut routes = HashMap::new();
    routes.insert(
        "/repo/org/x/x-1.0.pom".to_string(),
        Route {
            status: 200,
            headers: vec![("X-Checksum-Sha1", pom_sha1)],
            body: Vec::new(),
        },
    );
    routes.insert("/repo/org/x/x-1.0.jar".to_string(), route(200, b"old jar"));
    routes.insert("/repo/org/x/broken.jar".to_string(), route(500, b""));
    let base = serve(routes);

    let config = CollisionValidatorConfig {
        max_connections: 4,
        request_timeout: Duration::from_secs(5),
        ..CollisionValidatorConfig::new(base.clone())
    };
    let validator = CollisionValidator::with_defaults(config);
    let ctx = ValidationContext::new(root, Vec::new());
    validator.validate(&ctx).unwrap();

    let collisions = ctx.failures_of_kind(FailureKind::RemoteCollision);
    assert_eq!(collisions.len(), 1);
    assert_eq!(
        collisions[0].detail,
        FailureDetail::RemoteCollision {
            remote_url: format!("{}/org/x/x-1.0.jar", base)
        }
    );

    let statuses = ctx.failures_of_kind(FailureKind::RemoteUnexpectedStatus);
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].path, "org/x/broken.jar");
    assert_eq!(ctx.reported_failures().len(), 2);
}

/// Test that a refused connection becomes a request failure per artifact
#[test]
fn test_connection_refused_is_request_failed() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("a.jar"), b"a").unwrap();
    fs::write(temp_dir.path().join("b.jar"), b"b").unwrap();

    let config = CollisionValidatorConfig {
        request_timeout: Duration::from_secs(5),
        ..CollisionValidatorConfig::new(format!("http://{}/repo", addr))
    };
    let validator = CollisionValidator::with_defaults(config);
    let ctx = ValidationContext::new(temp_dir.path(), Vec::new());
    validator.validate(&ctx).unwrap();

    let failed = ctx.failures_of_kind(FailureKind::RemoteRequestFailed);
    assert_eq!(failed.len(), 2);
    assert_eq!(ctx.reported_failures().len(), 2);
}
