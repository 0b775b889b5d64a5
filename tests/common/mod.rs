//! Loopback file-sharing endpoint for integration tests.
//!
//! Serves `GET /uc?export=download&id=<id>[&confirm=<token>]`. The id prefix
//! picks the behaviour, so one server covers every scenario:
//!
//! | prefix      | response                                              |
//! |-------------|-------------------------------------------------------|
//! | `img`       | 200 PNG                                               |
//! | `missing`   | 404                                                   |
//! | `flaky`     | 503 twice, then 200 PNG                               |
//! | `confirm`   | 200 HTML interstitial; PNG once the token is presented |
//! | `garbage`   | 200 `text/plain` that is not an image                 |
//! | `slow`      | sleeps past any sane test timeout, then 200 PNG       |
//! | `lagconfirm`| like `confirm`, each response delayed by 600 ms       |

#![allow(dead_code)]

use image::{ImageBuffer, ImageFormat, Rgb};
use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const CONFIRM_TOKEN: &str = "t0k3n_Abc-123";
const READ_WAIT: Duration = Duration::from_secs(3);
const SLOW_DELAY: Duration = Duration::from_secs(4);
pub const LAG_DELAY: Duration = Duration::from_millis(600);

/// A PNG of the given size, solid colour.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb([180u8, 90, 40]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encode test png");
    out.into_inner()
}

pub fn interstitial_page() -> String {
    format!(
        "<html><body><p>Google Drive can't scan this file for viruses.</p>\
         <a href=\"/uc?export=download&amp;confirm={CONFIRM_TOKEN}&amp;id=x\">Download anyway</a>\
         </body></html>"
    )
}

/// Route library logs through the test harness; `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct TestServer {
    addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TestServer {
    /// Start the server, or `None` when loopback sockets are not permitted.
    pub fn start() -> Option<Self> {
        init_tracing();
        let listener = match TcpListener::bind("127.0.0.1:0") {
            Ok(l) => l,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                eprintln!("skipping: cannot bind localhost in this environment: {e}");
                return None;
            }
            Err(e) => panic!("bind localhost: {e}"),
        };
        let addr = listener.local_addr().expect("local addr");
        listener.set_nonblocking(true).expect("nonblocking listener");

        let hits = Arc::new(Mutex::new(HashMap::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let hits = Arc::clone(&hits);
            let stop = Arc::clone(&stop);
            thread::spawn(move || accept_loop(listener, hits, stop))
        };

        Some(Self {
            addr,
            hits,
            stop,
            handle: Some(handle),
        })
    }

    /// Value for `FetchConfig::download_endpoint`.
    pub fn endpoint(&self) -> String {
        format!("http://{}/uc", self.addr)
    }

    /// Requests seen for `id` so far, confirmed re-requests included.
    pub fn hits(&self, id: &str) -> usize {
        self.hits.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    /// Requests seen for every id.
    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn accept_loop(listener: TcpListener, hits: Arc<Mutex<HashMap<String, usize>>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                let hits = Arc::clone(&hits);
                // Detached: a `slow` handler must not hold up shutdown.
                thread::spawn(move || handle_connection(stream, &hits));
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(_) => break,
        }
    }
}

fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(Duration::from_millis(100)));
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    let start = Instant::now();
    while start.elapsed() < READ_WAIT {
        match stream.read(&mut tmp) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&tmp[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {}
            Err(_) => break,
        }
    }
    buf
}

/// Query parameters of the request line.
fn query_params(request: &[u8]) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(request);
    let target = text
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("");
    target
        .split_once('?')
        .map(|(_, q)| q)
        .unwrap_or("")
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn handle_connection(mut stream: TcpStream, hits: &Mutex<HashMap<String, usize>>) {
    let request = read_request(&mut stream);
    let params = query_params(&request);
    let id = params.get("id").cloned().unwrap_or_default();
    let confirmed = params.get("confirm").map(String::as_str) == Some(CONFIRM_TOKEN);

    let seen = {
        let mut map = hits.lock().unwrap();
        let n = map.entry(id.clone()).or_insert(0);
        *n += 1;
        *n
    };

    let png = || ("200 OK", "image/png", png_bytes(64, 48));
    let (status, content_type, body) = if id.starts_with("img") {
        png()
    } else if id.starts_with("missing") {
        ("404 Not Found", "text/html", b"<html>not found</html>".to_vec())
    } else if id.starts_with("flaky") {
        if seen <= 2 {
            ("503 Service Unavailable", "text/plain", b"busy".to_vec())
        } else {
            png()
        }
    } else if id.starts_with("confirm") || id.starts_with("lagconfirm") {
        if id.starts_with("lag") {
            thread::sleep(LAG_DELAY);
        }
        if confirmed {
            png()
        } else {
            ("200 OK", "text/html; charset=utf-8", interstitial_page().into_bytes())
        }
    } else if id.starts_with("garbage") {
        ("200 OK", "text/plain", b"this is definitely not an image".to_vec())
    } else if id.starts_with("slow") {
        thread::sleep(SLOW_DELAY);
        png()
    } else {
        ("404 Not Found", "text/plain", Vec::new())
    };

    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}
