//! Minimal HTTP/1.1 server that answers each request with the next status
//! from a script, for integration tests.
//!
//! The n-th request gets `script[n]`; once the script runs out the last entry
//! repeats. Every request line is recorded so tests can count attempts.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// Respond with this status and a short body.
    Status(u16),
    /// Read the request, then say nothing for this long.
    Stall(Duration),
    /// Read the request, never answer, and note when the client hangs up.
    Silent,
}

/// Handle to a running server.
#[derive(Clone)]
pub struct StatusServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    hangups: Arc<Mutex<Vec<Instant>>>,
}

impl StatusServer {
    /// Request lines received so far, e.g. `GET /api/sales HTTP/1.1`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// When the client closed a connection that got a `Silent` reply.
    pub fn hangups(&self) -> Vec<Instant> {
        self.hangups.lock().unwrap().clone()
    }

    /// Polls until the client has closed a `Silent` connection, up to `limit`.
    pub fn wait_for_hangup(&self, limit: Duration) -> Option<Instant> {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if let Some(at) = self.hangups().first() {
                return Some(*at);
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }
}

/// Starts a server in a background thread. It runs until the process exits.
pub fn start(script: Vec<Reply>) -> StatusServer {
    assert!(!script.is_empty(), "script needs at least one reply");
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let hangups = Arc::new(Mutex::new(Vec::new()));
    let server = StatusServer {
        base_url: format!("http://127.0.0.1:{}/api/", port),
        requests: Arc::clone(&requests),
        hangups: Arc::clone(&hangups),
    };
    let script = Arc::new(script);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let requests = Arc::clone(&requests);
            let hangups = Arc::clone(&hangups);
            let script = Arc::clone(&script);
            thread::spawn(move || handle(stream, &requests, &hangups, &script));
        }
    });
    server
}

/// Base URL of a port nothing listens on (connections are refused).
pub fn refused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/api/", port)
}

fn handle(
    mut stream: TcpStream,
    requests: &Mutex<Vec<String>>,
    hangups: &Mutex<Vec<Instant>>,
    script: &[Reply],
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = String::from_utf8_lossy(&buf[..n]);
    let line = request.lines().next().unwrap_or("").trim().to_string();
    let index = {
        let mut reqs = requests.lock().unwrap();
        reqs.push(line);
        reqs.len() - 1
    };
    match script[index.min(script.len() - 1)] {
        Reply::Status(code) => {
            let body = format!("{{\"status\":{}}}", code);
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                code,
                reason(code),
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
        Reply::Stall(d) => thread::sleep(d),
        Reply::Silent => {
            let _ = stream.set_read_timeout(Some(Duration::from_secs(30)));
            // Only EOF or a reset counts; a read timeout means the client stayed.
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        return
                    }
                    Err(_) => break,
                }
            }
            hangups.lock().unwrap().push(Instant::now());
        }
    }
}

fn reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
