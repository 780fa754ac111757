//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves static resources by path. HEAD answers with `Content-Length`,
//! optional `Accept-Ranges: bytes` and `Content-Disposition`; GET with a
//! `Range` header answers `206 Partial Content`. Resources can redirect,
//! refuse HEAD with `405`, or fail their first N range requests. Every
//! request is logged.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Something the server can answer for a path.
#[derive(Debug, Default)]
pub struct Resource {
    body: Vec<u8>,
    ranges: bool,
    disposition: Option<String>,
    location: Option<String>,
    head_blocked: bool,
    range_failures: AtomicUsize,
}

impl Resource {
    /// A file that supports byte ranges.
    pub fn file(body: Vec<u8>) -> Self {
        Self {
            body,
            ranges: true,
            ..Default::default()
        }
    }

    /// A `302 Found` pointing at `location`.
    pub fn redirect(location: &str) -> Self {
        Self {
            location: Some(location.to_string()),
            ..Default::default()
        }
    }

    pub fn without_ranges(mut self) -> Self {
        self.ranges = false;
        self
    }

    pub fn with_disposition(mut self, value: &str) -> Self {
        self.disposition = Some(value.to_string());
        self
    }

    /// Answer HEAD with `405 Method Not Allowed`.
    pub fn head_blocked(mut self) -> Self {
        self.head_blocked = true;
        self
    }

    /// Answer the first `count` range requests with `500`.
    pub fn failing_ranges(self, count: usize) -> Self {
        self.range_failures.store(count, Ordering::SeqCst);
        self
    }
}

/// A logged request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub range: Option<(u64, u64)>,
}

/// Handle to a running server. The server lives until the process exits.
pub struct RangeServer {
    base: String,
    log: Arc<Mutex<Vec<Request>>>,
}

impl RangeServer {
    pub fn start(routes: Vec<(&str, Resource)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();

        let routes: Arc<HashMap<String, Resource>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, resource)| (path.to_string(), resource))
                .collect(),
        );
        let log = Arc::new(Mutex::new(Vec::new()));

        let server_log = Arc::clone(&log);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let routes = Arc::clone(&routes);
                let log = Arc::clone(&server_log);
                thread::spawn(move || handle(stream, &routes, &log));
            }
        });

        Self {
            base: format!("http://127.0.0.1:{}", port),
            log,
        }
    }

    /// Absolute URL for `path` (which starts with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    /// Ranges requested for `path`, sorted.
    pub fn ranges_for(&self, path: &str) -> Vec<(u64, u64)> {
        let mut ranges: Vec<(u64, u64)> = self
            .requests()
            .into_iter()
            .filter(|r| r.path == path)
            .filter_map(|r| r.range)
            .collect();
        ranges.sort();
        ranges
    }
}

fn handle(mut stream: TcpStream, routes: &HashMap<String, Resource>, log: &Mutex<Vec<Request>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));

    let Some(head) = read_head(&mut stream) else {
        return;
    };
    let request = parse_request(&head);
    log.lock().unwrap().push(request.clone());

    let Some(resource) = routes.get(&request.path) else {
        respond(&mut stream, "404 Not Found", &[], &[]);
        return;
    };

    if resource.head_blocked && request.method.eq_ignore_ascii_case("HEAD") {
        respond(&mut stream, "405 Method Not Allowed", &[("Allow", "GET".to_string())], &[]);
        return;
    }

    if let Some(location) = &resource.location {
        respond(&mut stream, "302 Found", &[("Location", location.clone())], &[]);
        return;
    }

    let total = resource.body.len() as u64;
    let mut headers = vec![];
    if resource.ranges {
        headers.push(("Accept-Ranges", "bytes".to_string()));
    }
    if let Some(disposition) = &resource.disposition {
        headers.push(("Content-Disposition", disposition.clone()));
    }

    if request.method.eq_ignore_ascii_case("HEAD") {
        headers.push(("Content-Length", total.to_string()));
        write_head(&mut stream, "200 OK", &headers);
        return;
    }

    match request.range {
        Some((start, end)) if resource.ranges => {
            let failing = resource
                .range_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                respond(&mut stream, "500 Internal Server Error", &[], &[]);
                return;
            }

            let end = end.min(total.saturating_sub(1));
            if start > end {
                respond(&mut stream, "416 Range Not Satisfiable", &[], &[]);
                return;
            }
            headers.push(("Content-Range", format!("bytes {}-{}/{}", start, end, total)));
            let slice = &resource.body[start as usize..=end as usize];
            respond(&mut stream, "206 Partial Content", &headers, slice);
        }
        _ => respond(&mut stream, "200 OK", &headers, &resource.body),
    }
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while !data.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(data).ok()
}

fn parse_request(head: &str) -> Request {
    let mut lines = head.lines();
    let mut parts = lines.next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("/");
    let path = target.split('?').next().unwrap_or("/").to_string();

    let mut range = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("range") {
            if let Some((a, b)) = value.trim().trim_start_matches("bytes=").split_once('-') {
                if let (Ok(start), Ok(end)) = (a.trim().parse(), b.trim().parse()) {
                    range = Some((start, end));
                }
            }
        }
    }

    Request {
        method,
        path,
        range,
    }
}

fn write_head(stream: &mut TcpStream, status: &str, headers: &[(&str, String)]) {
    let mut head = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status);
    for (name, value) in headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");
    let _ = stream.write_all(head.as_bytes());
}

fn respond(stream: &mut TcpStream, status: &str, headers: &[(&str, String)], body: &[u8]) {
    let mut headers = headers.to_vec();
    headers.push(("Content-Length", body.len().to_string()));
    write_head(stream, status, &headers);
    let _ = stream.write_all(body);
    let _ = stream.flush();
}
