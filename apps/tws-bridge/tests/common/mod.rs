//! Fake trading terminal for integration tests.
//!
//! Speaks just enough of the TWS socket protocol to take a client through
//! the handshake, announce readiness and answer one historical data
//! request.

#![allow(dead_code)]

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tws_bridge::infrastructure::tws::codec::{API_PREFIX, frame_codec};
use tws_bridge::infrastructure::tws::FieldWriter;

/// Server version the fake terminal announces.
pub const SERVER_VERSION: i32 = 176;

/// How the fake terminal answers a historical data request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Send this many daily bars followed by the end marker.
    Bars(usize),
    /// Answer with an error message for the request id.
    Error {
        /// Error code.
        code: i32,
        /// Error text.
        message: String,
    },
    /// Never answer.
    Silent,
}

/// A running fake terminal.
pub struct FakeTerminal {
    /// Address the fake terminal listens on.
    pub addr: SocketAddr,
    /// Every message received after the handshake, split into fields.
    pub received: mpsc::UnboundedReceiver<Vec<String>>,
    handle: JoinHandle<()>,
}

impl FakeTerminal {
    /// Bind on an ephemeral port and serve one client.
    pub async fn spawn(reply: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, received) = mpsc::unbounded_channel();
        let handle = tokio::spawn(serve(listener, reply, tx));
        Self {
            addr,
            received,
            handle,
        }
    }

    /// Next message received from the client.
    pub async fn next_message(&mut self) -> Vec<String> {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.received.recv())
            .await
            .expect("timed out waiting for a client message")
            .expect("fake terminal stopped")
    }
}

impl Drop for FakeTerminal {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Split a payload into its NUL-terminated fields.
pub fn fields(payload: &[u8]) -> Vec<String> {
    let payload = payload.strip_suffix(b"\0").unwrap_or(payload);
    payload
        .split(|b| *b == 0)
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .collect()
}

fn message(build: impl FnOnce(&mut FieldWriter)) -> tokio_util::bytes::Bytes {
    let mut writer = FieldWriter::new();
    build(&mut writer);
    writer.into_bytes()
}

async fn serve(listener: TcpListener, reply: Reply, tx: mpsc::UnboundedSender<Vec<String>>) {
    let (mut stream, _) = listener.accept().await.unwrap();

    let mut prefix = [0_u8; 4];
    stream.read_exact(&mut prefix).await.unwrap();
    assert_eq!(&prefix, API_PREFIX);

    let mut framed = Framed::new(stream, frame_codec());

    let versions = framed.next().await.unwrap().unwrap();
    assert_eq!(&versions[..], b"v100..176");

    framed
        .send(message(|w| {
            w.push_int(SERVER_VERSION).push_str("20240520 09:30:00 EST");
        }))
        .await
        .unwrap();

    // START_API
    let start_api = framed.next().await.unwrap().unwrap();
    let _ = tx.send(fields(&start_api));

    framed
        .send(message(|w| {
            w.push_int(4)
                .push_int(2)
                .push_int(-1)
                .push_int(2104)
                .push_str("Market data farm connection is OK:usfarm")
                .push_str("");
        }))
        .await
        .unwrap();
    framed
        .send(message(|w| {
            w.push_int(15).push_int(1).push_str("DU123456");
        }))
        .await
        .unwrap();
    framed
        .send(message(|w| {
            w.push_int(9).push_int(1).push_int(1);
        }))
        .await
        .unwrap();

    while let Some(Ok(frame)) = framed.next().await {
        let received = fields(&frame);
        let is_historical_request = received.first().is_some_and(|id| id == "20");
        let request_id: i32 = received.get(1).and_then(|id| id.parse().ok()).unwrap_or(0);
        let _ = tx.send(received);

        if !is_historical_request {
            continue;
        }

        match &reply {
            Reply::Bars(count) => {
                let count = *count;
                framed
                    .send(message(|w| {
                        w.push_int(17)
                            .push_int(request_id)
                            .push_str("20240509  23:59:59")
                            .push_str("20240519  23:59:59")
                            .push_int(i32::try_from(count).unwrap());
                        for day in 0..count {
                            w.push_str(&format!("202405{:02}", 10 + day))
                                .push_str("520.10")
                                .push_str("523.50")
                                .push_str("519.80")
                                .push_str("522.75")
                                .push_str("61234567")
                                .push_str("521.95")
                                .push_int(412_345);
                        }
                    }))
                    .await
                    .unwrap();
            }
            Reply::Error { code, message: text } => {
                framed
                    .send(message(|w| {
                        w.push_int(4)
                            .push_int(2)
                            .push_int(request_id)
                            .push_int(*code)
                            .push_str(text)
                            .push_str("");
                    }))
                    .await
                    .unwrap();
            }
            Reply::Silent => {}
        }
    }
}
