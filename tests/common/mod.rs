//! In-process mesh service stand-in speaking the real WS frame protocol.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use frames::{Frame, SESSION_CONNECTED};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

pub const F16_ONE: u16 = 0x3C00;

type Handler = dyn Fn(&Frame) -> Option<Frame> + Send + Sync;

#[derive(Default)]
pub struct Shared {
    pub received: Mutex<Vec<Frame>>,
    pub query: Mutex<Option<String>>,
    pub disconnected: AtomicBool,
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub shared: Arc<Shared>,
}

impl MockServer {
    /// Serve connections, answering each request with `handler`.
    pub async fn start(handler: impl Fn(&Frame) -> Option<Frame> + Send + Sync + 'static) -> Self {
        Self::spawn(Arc::new(handler), true).await
    }

    /// Accept the upgrade but never send `session:connected`.
    pub async fn start_without_handshake() -> Self {
        Self::spawn(Arc::new(|_: &Frame| None), false).await
    }

    async fn spawn(handler: Arc<Handler>, handshake: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let shared = Arc::new(Shared::default());

        let accept_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(
                    stream,
                    Arc::clone(&handler),
                    Arc::clone(&accept_shared),
                    handshake,
                ));
            }
        });

        Self { addr, shared }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn received(&self) -> Vec<Frame> {
        self.shared.received.lock().expect("received mutex").clone()
    }

    pub fn query(&self) -> Option<String> {
        self.shared.query.lock().expect("query mutex").clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.shared.disconnected.load(Ordering::SeqCst)
    }

    /// Poll until the client connection has gone away.
    pub async fn wait_disconnected(&self) -> bool {
        for _ in 0..200 {
            if self.is_disconnected() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

async fn serve(stream: TcpStream, handler: Arc<Handler>, shared: Arc<Shared>, handshake: bool) {
    let query_shared = Arc::clone(&shared);
    let callback = move |req: &Request, resp: Response| {
        *query_shared.query.lock().expect("query mutex") = req.uri().query().map(str::to_owned);
        Ok(resp)
    };
    let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
        return;
    };

    if handshake {
        let hello = Frame::request(SESSION_CONNECTED).with_data("client_id", "mock");
        if ws
            .send(Message::Binary(frames::encode_frame(&hello).into()))
            .await
            .is_err()
        {
            return;
        }
    }

    while let Some(Ok(msg)) = ws.next().await {
        match msg {
            Message::Binary(bytes) => {
                let Ok(frame) = frames::decode_frame(&bytes) else {
                    continue;
                };
                shared
                    .received
                    .lock()
                    .expect("received mutex")
                    .push(frame.clone());
                if let Some(reply) = handler(&frame) {
                    let bytes = frames::encode_frame(&reply);
                    if ws.send(Message::Binary(bytes.into())).await.is_err() {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    shared.disconnected.store(true, Ordering::SeqCst);
}

pub fn f16_ones(values: usize) -> Vec<u8> {
    std::iter::repeat_n(F16_ONE.to_le_bytes(), values)
        .flatten()
        .collect()
}

pub fn i32_le(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
