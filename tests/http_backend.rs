use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use approx::assert_relative_eq;
use cosmophone::error::FetchError;
use cosmophone::melody::Instrument;
use cosmophone::remote::http::HttpBackend;
use cosmophone::remote::{Integrator, SonificationService};
use cosmophone::sim::body::Body;

/// What the fake server saw: request line and body.
struct Seen {
    request_line: String,
    body: String,
}

/// Serve exactly one request with a canned response.
fn serve_once(status: u16, payload: &'static str) -> (String, JoinHandle<Seen>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line == "\r\n" || line.is_empty() {
                break;
            }
            let lower = line.to_ascii_lowercase();
            if let Some(v) = lower.strip_prefix("content-length:") {
                content_length = v.trim().parse().unwrap();
            }
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).unwrap();

        let response = format!(
            "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
            payload.len()
        );
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();
        Seen {
            request_line: request_line.trim_end().to_string(),
            body: String::from_utf8(body).unwrap(),
        }
    });
    (format!("http://{addr}"), handle)
}

fn backend(url: &str) -> HttpBackend {
    HttpBackend::new(url, Duration::from_secs(5))
}

#[test]
fn start_posts_bodies_and_decodes_positions() {
    let (url, server) = serve_once(
        200,
        r#"{"positions":[{"id":"Sun","x":0.0,"y":0.0,"tone":261.63},{"id":"Planet","x":150.0,"y":-2.5,"tone":392.0}]}"#,
    );
    let bodies = vec![
        Body {
            id: "Sun".into(),
            mass: 1000.0,
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            tone: 261.63,
        },
        Body {
            id: "Planet".into(),
            mass: 1.0,
            x: 150.0,
            y: 0.0,
            vx: 0.0,
            vy: 2.5,
            tone: 392.0,
        },
    ];
    let snapshot = backend(&url).start(&bodies).unwrap();
    let seen = server.join().unwrap();

    assert!(seen.request_line.starts_with("POST /experiments/gravity/start"));
    let sent: serde_json::Value = serde_json::from_str(&seen.body).unwrap();
    assert_eq!(sent["bodies"].as_array().unwrap().len(), 2);
    assert_eq!(sent["bodies"][1]["id"], "Planet");
    assert_eq!(sent["bodies"][1]["vy"], 2.5);

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.bodies[1].id, "Planet");
    assert_eq!(snapshot.bodies[1].y, -2.5);
}

#[test]
fn step_sends_dt_as_query() {
    let (url, server) = serve_once(200, r#"{"positions":[{"id":"A","x":1.0,"y":2.0,"tone":300.0}]}"#);
    let snapshot = backend(&url).step(0.25).unwrap();
    let seen = server.join().unwrap();

    assert!(seen.request_line.starts_with("GET /experiments/gravity/step?dt=0.25"));
    assert_eq!(snapshot.bodies[0].x, 1.0);
}

#[test]
fn error_status_is_reported() {
    let (url, server) = serve_once(500, r#"{"detail":"boom"}"#);
    let err = backend(&url).step(0.1).unwrap_err();
    server.join().unwrap();
    assert_eq!(err, FetchError::Status(500));
}

#[test]
fn malformed_payload_is_a_decode_error() {
    let (url, server) = serve_once(200, r#"{"positions":"nope"}"#);
    let err = backend(&url).step(0.1).unwrap_err();
    server.join().unwrap();
    assert!(matches!(err, FetchError::Decode(_)), "{err:?}");
}

#[test]
fn unreachable_server_is_a_transport_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let err = backend(&format!("http://{addr}")).step(0.1).unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)), "{err:?}");
}

#[test]
fn sonify_decodes_sound_data() {
    let (url, server) = serve_once(
        200,
        r#"{"url":"/static/images/nebula.jpg","description":"nebula","sound_data":[{"note":60,"pan":-0.5,"instrument":"strings"},{"note":67,"pan":0.5,"instrument":"flute"}]}"#,
    );
    let resp = backend(&format!("{url}/")).sonify("nebula").unwrap();
    let seen = server.join().unwrap();

    assert!(seen.request_line.starts_with("GET /experiments/image/sonify?image_id=nebula"));
    assert_eq!(resp.description.as_deref(), Some("nebula"));
    let events = resp.events(0.1);
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].instrument, Instrument::Flute);
    assert_relative_eq!(events[1].time_offset, 0.1);
}
