//! End-to-end tests driving a real `Server` over real TCP sockets,
//! covering the HTTP/1.1, h2c upgrade, and direct HTTP/2 paths.

mod support;

use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;

use h2c_engine::h2::frame::{Kind, Settings, StreamId};
use h2c_engine::h2::hpack::Decoder as HpackDecoder;
use h2c_engine::{Handler, IncomingRequest, ResponseHandle, RouteTable, Server};

use support::*;

struct TestRoutes;

impl RouteTable for TestRoutes {
    fn find(&self, method: &Method, path: &str) -> Option<Arc<dyn Handler>> {
        if *method == Method::GET && path == "/hello" {
            return Some(Arc::new(|_req: IncomingRequest, mut res: ResponseHandle| {
                let _ = res.respond_bytes("text/plain", Bytes::from_static(b"hello world"));
            }) as Arc<dyn Handler>);
        }
        if *method == Method::POST && path == "/echo" {
            return Some(Arc::new(|req: IncomingRequest, mut res: ResponseHandle| {
                let body = Bytes::from(req.body);
                let _ = res.respond_bytes("application/octet-stream", body);
            }) as Arc<dyn Handler>);
        }
        if *method == Method::GET && path == "/panic" {
            return Some(Arc::new(|_req: IncomingRequest, _res: ResponseHandle| {
                panic!("handler blew up on purpose");
            }) as Arc<dyn Handler>);
        }
        None
    }
}

fn spawn_test_server() -> SocketAddr {
    let config = Server::builder().port(0).poll_timeout(Duration::from_millis(15)).build();
    let server = Server::new(config, TestRoutes);
    let (mut reactor, addr) = server.bind().expect("bind");
    let stop = Arc::new(AtomicBool::new(false));
    std::thread::spawn(move || {
        let _ = reactor.run(move || stop.load(Ordering::Relaxed));
    });
    // Give the reactor thread a moment to start its poll loop before
    // the test opens its first connection.
    std::thread::sleep(Duration::from_millis(20));
    addr
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect");
    set_test_timeouts(&stream);
    stream
}

#[test]
fn simple_get_returns_200_http1() {
    let addr = spawn_test_server();
    let mut stream = connect(addr);
    write_h1_request(&mut stream, "GET", "/hello", &[], b"");
    let (status, body) = read_http1_response(&mut stream);
    assert_eq!(status, 200);
    assert_eq!(body, b"hello world");
}

#[test]
fn unknown_route_returns_404() {
    let addr = spawn_test_server();
    let mut stream = connect(addr);
    write_h1_request(&mut stream, "GET", "/nope", &[], b"");
    let (status, _body) = read_http1_response(&mut stream);
    assert_eq!(status, 404);
}

#[test]
fn keep_alive_two_requests_same_connection() {
    let addr = spawn_test_server();
    let mut stream = connect(addr);

    write_h1_request(&mut stream, "GET", "/hello", &[], b"");
    let (status1, body1) = read_http1_response(&mut stream);
    assert_eq!(status1, 200);
    assert_eq!(body1, b"hello world");

    write_h1_request(&mut stream, "GET", "/hello", &[], b"");
    let (status2, body2) = read_http1_response(&mut stream);
    assert_eq!(status2, 200);
    assert_eq!(body2, b"hello world");
}

#[test]
fn handler_panic_responds_500() {
    let addr = spawn_test_server();
    let mut stream = connect(addr);
    write_h1_request(&mut stream, "GET", "/panic", &[], b"");
    let (status, _body) = read_http1_response(&mut stream);
    assert_eq!(status, 500);
}

#[test]
fn post_echoes_body_over_http1() {
    let addr = spawn_test_server();
    let mut stream = connect(addr);
    write_h1_request(&mut stream, "POST", "/echo", &[], b"round trip me");
    let (status, body) = read_http1_response(&mut stream);
    assert_eq!(status, 200);
    assert_eq!(body, b"round trip me");
}

#[test]
fn h2c_upgrade_serves_seeded_request() {
    let addr = spawn_test_server();
    let mut stream = connect(addr);

    write_h1_request(
        &mut stream,
        "GET",
        "/hello",
        &[("Connection", "Upgrade, HTTP2-Settings"), ("Upgrade", "h2c"), ("HTTP2-Settings", "AAAAAAAAAA")],
        b"",
    );

    let head = read_until(&mut stream, b"\r\n\r\n");
    let head_str = String::from_utf8_lossy(&head);
    assert!(head_str.starts_with("HTTP/1.1 101"), "unexpected upgrade response: {head_str}");

    // The client's mandatory first h2 frame; the preface is implicit
    // in the upgrade so only the frame itself is sent.
    let mut client_settings = Settings::default();
    client_settings.set_enable_push(Some(false));
    let mut settings_bytes = bytes::BytesMut::new();
    client_settings.encode(&mut settings_bytes);
    stream.write_all(&settings_bytes).unwrap();

    let mut saw_server_settings = false;
    let mut status = None;
    let mut body = Vec::new();
    let mut hpack = HpackDecoder::new(16 << 20);

    for _ in 0..20 {
        let (head, payload) = read_frame(&mut stream);
        match head.kind() {
            Kind::Settings => {
                if !payload.is_empty() {
                    saw_server_settings = true;
                }
            }
            Kind::Headers => {
                let decoded = hpack.decode(&payload).expect("hpack decode");
                status = decoded.pseudo.status.map(|s| s.as_u16());
            }
            Kind::Data => {
                body.extend_from_slice(&payload);
                if head.flag() & 0x1 == 0x1 {
                    break;
                }
            }
            _ => {}
        }
        if status.is_some() && !body.is_empty() {
            break;
        }
    }

    assert!(saw_server_settings, "server never sent its initial SETTINGS");
    assert_eq!(status, Some(200));
    assert_eq!(body, b"hello world");
}

#[test]
fn http2_direct_echo_post() {
    use std::io::Write;

    let addr = spawn_test_server();
    let mut stream = connect(addr);

    write_h2_preface_and_settings(&mut stream, &Settings::default());

    // Drain the server's initial SETTINGS + our own SETTINGS ack
    // before sending the request, to keep the read loop below simple.
    let (head, _payload) = read_until_kind(&mut stream, Kind::Settings);
    assert_eq!(head.stream_id(), StreamId::new(0));

    let headers = build_headers_frame(1, "POST", "/echo", false);
    stream.write_all(&headers).unwrap();
    let data = build_data_frame(1, b"ping-pong", true);
    stream.write_all(&data).unwrap();

    let mut status = None;
    let mut body = Vec::new();
    let mut hpack = HpackDecoder::new(16 << 20);

    for _ in 0..20 {
        let (head, payload) = read_frame(&mut stream);
        match head.kind() {
            Kind::Headers => {
                let decoded = hpack.decode(&payload).expect("hpack decode");
                status = decoded.pseudo.status.map(|s| s.as_u16());
            }
            Kind::Data => {
                body.extend_from_slice(&payload);
                if head.flag() & 0x1 == 0x1 {
                    break;
                }
            }
            _ => {}
        }
    }

    assert_eq!(status, Some(200));
    assert_eq!(body, b"ping-pong");
}
