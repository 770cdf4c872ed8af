//! HttpTransport against a minimal local HTTP responder

use snapstream::testing::{synthetic_rgba_frame, SyntheticFrameSource};
use snapstream::{
    FrameEncoder, FrameTransport, HttpTransport, JpegFrameEncoder, ManualClock, StreamConfig,
    StreamController, StreamError, StreamState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

#[derive(Debug)]
struct CapturedRequest {
    method: String,
    path: String,
    content_type: Option<String>,
    body: Vec<u8>,
}

/// Answer every request with `status`; report what arrived
async fn spawn_responder(status: u16) -> (String, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(request) = read_request(&mut socket).await {
                    let _ = tx.send(request);
                }
                let response = format!(
                    "HTTP/1.1 {} Scripted\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (base_url, rx)
}

/// Keep-alive responder that sends a short body and counts TCP connections
async fn spawn_keep_alive_responder() -> (String, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let connections = Arc::new(AtomicUsize::new(0));
    let served = Arc::new(AtomicUsize::new(0));

    let (accepted, answered) = (connections.clone(), served.clone());
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            accepted.fetch_add(1, Ordering::SeqCst);
            let answered = answered.clone();
            tokio::spawn(async move {
                while read_request(&mut socket).await.is_some() {
                    let body = "{\"ok\":true}";
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    answered.fetch_add(1, Ordering::SeqCst);
                    if socket.write_all(response.as_bytes()).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (base_url, connections, served)
}

/// Accept connections and never answer
async fn spawn_silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    base_url
}

async fn read_request(socket: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let mut content_type = None;
    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-type" => content_type = Some(value.trim().to_string()),
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                _ => {}
            }
        }
    }

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(CapturedRequest {
        method,
        path,
        content_type,
        body,
    })
}

fn transport_with_timeouts(status_ms: u64, upload_ms: u64) -> HttpTransport {
    let mut config = StreamConfig::default();
    config.server.status_timeout_ms = status_ms;
    config.server.upload_timeout_ms = upload_ms;
    HttpTransport::new(&config.server).unwrap()
}

#[tokio::test]
async fn test_check_status_reports_code() {
    let (base_url, mut requests) = spawn_responder(200).await;
    let transport = transport_with_timeouts(3000, 2000);

    let url = format!("{}/stream/video/status", base_url);
    assert_eq!(transport.check_status(&url).await, Ok(200));

    let request = requests.recv().await.unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/stream/video/status");
}

#[tokio::test]
async fn test_non_200_is_returned_not_raised() {
    let (base_url, _requests) = spawn_responder(500).await;
    let transport = transport_with_timeouts(3000, 2000);

    let url = format!("{}/stream/video/status", base_url);
    assert_eq!(transport.check_status(&url).await, Ok(500));
}

#[tokio::test]
async fn test_upload_posts_jpeg_body() {
    let (base_url, mut requests) = spawn_responder(200).await;
    let transport = transport_with_timeouts(3000, 2000);
    let frame = JpegFrameEncoder::default()
        .encode(&synthetic_rgba_frame(1, 64, 48))
        .unwrap();

    let url = format!("{}/stream/video", base_url);
    assert_eq!(transport.upload_frame(&url, &frame).await, Ok(200));

    let request = requests.recv().await.unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/stream/video");
    assert_eq!(request.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(request.body, frame.data.to_vec());
}

#[tokio::test]
async fn test_response_bodies_are_read_so_connections_are_reused() {
    let (base_url, connections, served) = spawn_keep_alive_responder().await;
    let transport = transport_with_timeouts(3000, 2000);
    let frame = JpegFrameEncoder::default()
        .encode(&synthetic_rgba_frame(2, 32, 24))
        .unwrap();

    let status_url = format!("{}/stream/video/status", base_url);
    assert_eq!(transport.check_status(&status_url).await, Ok(200));
    let upload_url = format!("{}/stream/video", base_url);
    for _ in 0..5 {
        assert_eq!(transport.upload_frame(&upload_url, &frame).await, Ok(200));
    }

    assert_eq!(served.load(Ordering::SeqCst), 6);
    assert!(connections.load(Ordering::SeqCst) < 6);
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = transport_with_timeouts(3000, 2000);
    let result = transport
        .check_status(&format!("http://{}/stream/video/status", addr))
        .await;
    assert!(matches!(result, Err(StreamError::TransportError(_))));
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let base_url = spawn_silent_server().await;
    let transport = transport_with_timeouts(200, 200);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        transport.check_status(&format!("{}/stream/video/status", base_url)),
    )
    .await
    .expect("transport should enforce its own timeout");
    assert_eq!(
        result,
        Err(StreamError::TransportError("request timed out".to_string()))
    );
}

#[tokio::test]
async fn test_controller_streams_over_http() {
    let (base_url, mut requests) = spawn_responder(200).await;
    let controller = StreamController::builder(
        StreamConfig::default(),
        Arc::new(SyntheticFrameSource::new(64, 48)),
    )
    .scheduler(Arc::new(ManualClock::new()))
    .build()
    .unwrap();

    controller.start(&base_url).await.unwrap();
    assert_eq!(controller.state(), StreamState::Live);
    assert!(controller.tick().await.is_delivered());

    let probe = requests.recv().await.unwrap();
    assert_eq!(probe.path, "/stream/video/status");
    let upload = requests.recv().await.unwrap();
    assert_eq!(upload.method, "POST");
    assert!(upload.body.starts_with(&[0xFF, 0xD8]));

    assert_eq!(controller.stop(), Ok(1));
}

#[tokio::test]
async fn test_controller_offline_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let controller = StreamController::with_http(
        StreamConfig::default(),
        Arc::new(SyntheticFrameSource::new(8, 8)),
    )
    .unwrap();

    let err = controller
        .start(&format!("http://{}", addr))
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::PreflightError { status: None, .. }));

    let status = controller.status();
    assert_eq!(status.state, StreamState::Error);
    assert!(status.last_message.starts_with("OFFLINE: "));
}
