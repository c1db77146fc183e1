//! In-memory scripted server for connection tests.
//!
//! The server greets, then answers each command line through a handler.
//! Tests can also push unsolicited bytes (idle replies) through `push`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mupwit_proto::Connection;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;

pub struct Scripted {
    pub conn: Connection,
    pub push: mpsc::UnboundedSender<Vec<u8>>,
    pub received: Arc<Mutex<Vec<String>>>,
}

impl Scripted {
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

pub async fn connect_scripted<F>(handler: F) -> Scripted
where
    F: FnMut(&str) -> Option<Vec<u8>> + Send + 'static,
{
    let (client, server) = tokio::io::duplex(1024 * 1024);
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let received = Arc::new(Mutex::new(Vec::new()));
    tokio::spawn(serve(server, handler, push_rx, received.clone()));
    let conn = Connection::from_stream(client, Duration::from_secs(2))
        .await
        .expect("greeting");
    Scripted {
        conn,
        push: push_tx,
        received,
    }
}

async fn serve<F>(
    stream: DuplexStream,
    mut handler: F,
    mut push_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    received: Arc<Mutex<Vec<String>>>,
) where
    F: FnMut(&str) -> Option<Vec<u8>>,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    if write_half.write_all(b"OK MPD 0.23.5\n").await.is_err() {
        return;
    }
    let mut lines = BufReader::new(read_half).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                received.lock().unwrap().push(line.clone());
                if let Some(reply) = handler(&line) {
                    if write_half.write_all(&reply).await.is_err() {
                        break;
                    }
                }
            }
            Some(bytes) = push_rx.recv() => {
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Poll until the server's bytes have reached the client buffer.
pub async fn wait_pending(conn: &mut Connection) -> bool {
    for _ in 0..200 {
        if conn.has_pending_input().expect("pending check") {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    false
}
