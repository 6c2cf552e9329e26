//! Minimal HTTP/1.1 server for fetcher integration tests.
//!
//! Serves a single static body for GET, answers HEAD with Content-Length,
//! counts requests, and can be told to fail the first N GETs with a chosen
//! status so tests can exercise retry and backoff.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// Fail this many GET requests (with `fail_status`) before succeeding.
    /// Use `u32::MAX` for a source that never recovers.
    pub fail_first: u32,
    /// Status code for injected failures.
    pub fail_status: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            fail_first: 0,
            fail_status: 500,
        }
    }
}

pub struct TestServer {
    /// Full artifact URL, e.g. "http://127.0.0.1:PORT/artifact.h5ad".
    pub url: String,
    gets: Arc<AtomicU32>,
}

impl TestServer {
    /// Number of GET requests received so far (including injected failures).
    pub fn gets(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread serving `body`.
/// The server runs until the process exits.
pub fn start(body: Vec<u8>) -> TestServer {
    start_with_options(body, ServerOptions::default())
}

/// Like `start` but with failure injection.
pub fn start_with_options(body: Vec<u8>, opts: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let gets = Arc::new(AtomicU32::new(0));
    {
        let gets = Arc::clone(&gets);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let body = Arc::clone(&body);
                let gets = Arc::clone(&gets);
                thread::spawn(move || handle(stream, &body, opts, &gets));
            }
        });
    }
    TestServer {
        url: format!("http://127.0.0.1:{}/artifact.h5ad", port),
        gets,
    }
}

fn handle(mut stream: TcpStream, body: &[u8], opts: ServerOptions, gets: &AtomicU32) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let method = request.split_whitespace().next().unwrap_or("");

    if method.eq_ignore_ascii_case("HEAD") {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    if method.eq_ignore_ascii_case("GET") {
        let seen = gets.fetch_add(1, Ordering::SeqCst);
        if seen < opts.fail_first {
            let response = format!(
                "HTTP/1.1 {} Injected Failure\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                opts.fail_status
            );
            let _ = stream.write_all(response.as_bytes());
            return;
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.write_all(body);
        return;
    }

    let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
}
