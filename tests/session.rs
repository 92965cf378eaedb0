//! End-to-end sessions against an in-process WebSocket mesh service.

mod common;

use std::time::Duration;

use common::{MockServer, f16_ones, i32_le, init_tracing};
use frames::{Frame, Status};
use mesh_client::{ClientConfig, MeshClient, MeshError, ResponseEncoding, SMPL_VERTEX_COUNT};
use serde_json::{Value, json};

fn config(server: &MockServer, encoding: ResponseEncoding) -> ClientConfig {
    ClientConfig::new("127.0.0.1", server.port())
        .with_encoding(encoding)
        .with_connect_timeout(Duration::from_secs(2))
        .with_request_timeout(Some(Duration::from_secs(5)))
}

/// A well-behaved service: 42 frames, every vertex at (1, 1, 1), two faces.
fn bytes_service(req: &Frame) -> Option<Frame> {
    match req.syscall.as_str() {
        "upload" => Some(req.done_with(json!({"status": "success", "num_frames": 42}))),
        "forward" => Some(req.done_with_blob(f16_ones(SMPL_VERTEX_COUNT * 3))),
        "get_faces" => Some(req.done_with_blob(i32_le(&[0, 1, 2, 2, 3, 4]))),
        _ => None,
    }
}

fn structured_service(req: &Frame) -> Option<Frame> {
    match req.syscall.as_str() {
        "upload" => Some(req.done_with(json!({"status": "success", "num_frames": 42}))),
        "forward" => {
            let rows = vec![[1.0, 1.0, 1.0]; SMPL_VERTEX_COUNT];
            Some(req.done_with(json!({"status": "success", "verts": rows})))
        }
        "get_faces" => Some(req.done_with(json!({
            "status": "success",
            "faces": [[0, 1, 2], [2, 3, 4]],
        }))),
        _ => None,
    }
}

#[tokio::test]
async fn bytes_session_round_trip() {
    init_tracing();
    let server = MockServer::start(bytes_service).await;
    let mut client = MeshClient::connect(config(&server, ResponseEncoding::Bytes))
        .await
        .expect("connect");
    assert_eq!(server.query().as_deref(), Some("encoding=bytes"));

    assert_eq!(client.upload(b"npz-bytes").await.expect("upload"), 42);

    let verts = client.forward(0).await.expect("forward");
    assert_eq!(verts.len(), SMPL_VERTEX_COUNT);
    assert!(verts.iter().all(|v| *v == [1.0, 1.0, 1.0]));

    let faces = client.get_topology().await.expect("faces");
    assert_eq!(faces, vec![[0, 1, 2], [2, 3, 4]]);

    client.close().await.expect("close");
    assert!(server.wait_disconnected().await);

    let received = server.received();
    let syscalls: Vec<&str> = received.iter().map(|f| f.syscall.as_str()).collect();
    assert_eq!(syscalls, ["upload", "forward", "get_faces"]);

    let session = client.session_id().to_string();
    assert!(received.iter().all(|f| {
        f.data.get("uuid").and_then(Value::as_str) == Some(session.as_str())
    }));
    assert_eq!(received[0].blob.as_deref(), Some(b"npz-bytes".as_slice()));
    assert_eq!(received[1].data.get("frame_idx"), Some(&json!(0.0)));
}

#[tokio::test]
async fn structured_session_matches_bytes_session() {
    init_tracing();
    let bytes_server = MockServer::start(bytes_service).await;
    let structured_server = MockServer::start(structured_service).await;

    let mut bytes_client = MeshClient::connect(config(&bytes_server, ResponseEncoding::Bytes))
        .await
        .expect("connect bytes");
    let mut structured_client =
        MeshClient::connect(config(&structured_server, ResponseEncoding::Structured))
            .await
            .expect("connect structured");
    assert_eq!(
        structured_server.query().as_deref(),
        Some("encoding=structured")
    );

    assert_eq!(
        bytes_client.forward(7).await.expect("bytes forward"),
        structured_client.forward(7).await.expect("structured forward")
    );
    assert_eq!(
        bytes_client.get_topology().await.expect("bytes faces"),
        structured_client.get_topology().await.expect("structured faces")
    );
}

#[tokio::test]
async fn rejected_upload_closes_the_connection() {
    init_tracing();
    let server = MockServer::start(|req: &Frame| {
        Some(req.done_with(json!({"status": "error", "msg": "bad format"})))
    })
    .await;
    let mut client = MeshClient::connect(config(&server, ResponseEncoding::Bytes))
        .await
        .expect("connect");

    let err = client.upload(b"not-an-npz").await.unwrap_err();
    assert!(matches!(&err, MeshError::UploadRejected { msg } if msg == "bad format"));
    assert!(client.is_closed());
    assert!(server.wait_disconnected().await);
}

#[tokio::test]
async fn short_vertex_buffer_is_shape_mismatch_and_session_survives() {
    init_tracing();
    let server = MockServer::start(|req: &Frame| {
        let idx = req.data.get("frame_idx").and_then(Value::as_f64)?;
        let values = if idx < 1.0 { 100 } else { SMPL_VERTEX_COUNT * 3 };
        Some(req.done_with_blob(f16_ones(values)))
    })
    .await;
    let mut client = MeshClient::connect(config(&server, ResponseEncoding::Bytes))
        .await
        .expect("connect");

    let err = client.forward(0).await.unwrap_err();
    assert!(matches!(err, MeshError::ShapeMismatch { actual: 100, .. }));
    assert!(!client.is_closed());

    assert_eq!(client.forward(1).await.expect("forward").len(), SMPL_VERTEX_COUNT);
    assert!(!server.is_disconnected());
}

#[tokio::test]
async fn structured_faces_scenario() {
    init_tracing();
    let server = MockServer::start(|req: &Frame| {
        Some(req.done_with(json!({"status": "success", "faces": [[0, 1, 2]]})))
    })
    .await;
    let mut client = MeshClient::connect(config(&server, ResponseEncoding::Structured))
        .await
        .expect("connect");

    assert_eq!(client.get_topology().await.expect("faces"), vec![[0, 1, 2]]);
    assert_eq!(client.get_topology().await.expect("faces"), vec![[0, 1, 2]]);
}

#[tokio::test]
async fn unanswered_request_times_out_and_cancels() {
    init_tracing();
    let server = MockServer::start(|_: &Frame| None).await;
    let mut client = MeshClient::connect(
        config(&server, ResponseEncoding::Bytes)
            .with_request_timeout(Some(Duration::from_millis(100))),
    )
    .await
    .expect("connect");

    let err = client.forward(0).await.unwrap_err();
    assert!(matches!(err, MeshError::Timeout(_)));
    assert!(!client.is_closed());

    for _ in 0..100 {
        if server.received().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let received = server.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[1].status, Status::Cancel);
    assert_eq!(received[1].parent_id.as_deref(), Some(received[0].id.as_str()));
}

#[tokio::test]
async fn connect_to_closed_port_fails_in_constructor() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let cfg = ClientConfig::new("127.0.0.1", port).with_connect_timeout(Duration::from_secs(2));
    let err = MeshClient::connect(cfg).await.err().expect("connect should fail");
    assert!(matches!(err, MeshError::Connection(_)), "{err}");
}

#[tokio::test]
async fn missing_handshake_fails_in_constructor() {
    let server = MockServer::start_without_handshake().await;
    let cfg = config(&server, ResponseEncoding::Bytes)
        .with_connect_timeout(Duration::from_millis(200));

    let err = MeshClient::connect(cfg).await.err().expect("connect should fail");
    assert!(matches!(err, MeshError::Handshake(_)), "{err}");
}

#[test]
fn blocking_client_round_trip() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let server = runtime.block_on(MockServer::start(bytes_service));

    let mut client =
        mesh_client::blocking::MeshClient::connect(config(&server, ResponseEncoding::Bytes))
            .expect("connect");
    assert_eq!(client.upload(b"npz").expect("upload"), 42);
    assert!(client.upload_completed());
    assert_eq!(client.forward(41).expect("forward").len(), SMPL_VERTEX_COUNT);
    assert_eq!(client.get_topology().expect("faces").len(), 2);
    assert_eq!(client.cached_faces().map(<[_]>::len), Some(2));

    client.close().expect("close");
    assert!(client.is_closed());
    assert!(matches!(client.forward(0), Err(MeshError::Closed)));
}
