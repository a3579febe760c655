//! Outbound clients: the peer-sentinel client and the coordinator client.
//!
//! Both follow the same queue-admission discipline: the synchronous call
//! returns `false` when the request cannot be admitted right now
//! (disconnected, or the outbound queue is full), and the reply arrives
//! later through a oneshot continuation. A resolved reply of `None` means
//! the transport failed mid-call; the inner value is the remote's actual
//! answer. Dropping the receiving end cancels nothing remote but simply
//! discards the answer, which is all cancellation needs here.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::io::Lines;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::timeout;
use vigil_transaction::Attestation;
use vigil_transaction::CompactTx;
use vigil_transaction::FullTx;

use crate::rpc::SentinelRequest;

/// How many calls may wait in a client's outbound queue before admission is
/// refused
const QUEUE_DEPTH: usize = 64;

/// Delay between reconnection attempts while a client is down
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// A remote peer sentinel, asked to co-sign transactions.
///
/// The reply is `None` on transport failure, `Some(None)` when the peer
/// refused to attest, and `Some(Some(_))` with the attestation otherwise.
pub trait PeerClient: Send + Sync {
    /// Returns `false` when the request was not admitted and should be
    /// routed to another peer.
    fn validate(&self, tx: &FullTx, reply: oneshot::Sender<Option<Option<Attestation>>>) -> bool;
}

/// The coordinator, asked to run the two-phase protocol for a compact
/// transaction.
///
/// The inner reply value is the coordinator's verdict: `Some(true)` means
/// confirmed, `Some(false)` rejected by execution, `None` aborted without an
/// answer. A transport failure (outer `None`) carries the same weight as an
/// abort.
pub trait CoordinatorClient: Send + Sync {
    /// Returns `false` when the coordinator's queue refused the request and
    /// the submission should be retried.
    fn execute(&self, ctx: &CompactTx, reply: oneshot::Sender<Option<Option<bool>>>) -> bool;
}

/// TCP implementation of [PeerClient], speaking the sentinel line protocol
pub struct TcpPeerClient {
    inner: LineClient<SentinelRequest, Option<Attestation>>,
}

impl TcpPeerClient {
    pub fn new(endpoint: String) -> Self {
        TcpPeerClient {
            inner: LineClient::spawn(endpoint),
        }
    }

    /// Attempts to connect now, reporting whether the peer is reachable
    pub async fn ensure_connected(&self) -> bool {
        self.inner.ensure_connected().await
    }
}

impl PeerClient for TcpPeerClient {
    fn validate(&self, tx: &FullTx, reply: oneshot::Sender<Option<Option<Attestation>>>) -> bool {
        self.inner
            .call(SentinelRequest::Validate { tx: tx.clone() }, reply)
    }
}

/// The coordinator's wire request: a compact transaction to execute
#[derive(Debug, Serialize, Deserialize)]
pub struct CoordinatorCall {
    pub ctx: CompactTx,
}

/// TCP implementation of [CoordinatorClient], speaking the coordinator's
/// line protocol
pub struct TcpCoordinatorClient {
    inner: LineClient<CoordinatorCall, Option<bool>>,
}

impl TcpCoordinatorClient {
    pub fn new(endpoint: String) -> Self {
        TcpCoordinatorClient {
            inner: LineClient::spawn(endpoint),
        }
    }

    pub async fn ensure_connected(&self) -> bool {
        self.inner.ensure_connected().await
    }
}

impl CoordinatorClient for TcpCoordinatorClient {
    fn execute(&self, ctx: &CompactTx, reply: oneshot::Sender<Option<Option<bool>>>) -> bool {
        self.inner.call(CoordinatorCall { ctx: ctx.clone() }, reply)
    }
}

enum ClientMessage<Req, Resp> {
    Call {
        request: Req,
        reply: oneshot::Sender<Option<Resp>>,
    },
    Probe {
        reply: oneshot::Sender<bool>,
    },
}

/// A request/response client over newline-delimited JSON, one in-flight call
/// at a time, processed by a background actor that owns the connection and
/// reconnects on failure
struct LineClient<Req, Resp> {
    queue: mpsc::Sender<ClientMessage<Req, Resp>>,
    connected: Arc<AtomicBool>,
}

impl<Req, Resp> LineClient<Req, Resp>
where
    Req: Serialize + Send + Sync + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    fn spawn(endpoint: String) -> Self {
        let (queue, rx) = mpsc::channel(QUEUE_DEPTH);
        let connected = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_client(endpoint, rx, connected.clone()));

        LineClient { queue, connected }
    }

    /// Queue-admission call: `false` means disconnected or backpressured
    fn call(&self, request: Req, reply: oneshot::Sender<Option<Resp>>) -> bool {
        if !self.connected.load(Ordering::Acquire) {
            return false;
        }
        self.queue
            .try_send(ClientMessage::Call { request, reply })
            .is_ok()
    }

    async fn ensure_connected(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .queue
            .send(ClientMessage::Probe { reply: tx })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

struct Conn {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

async fn try_connect(endpoint: &str) -> Option<Conn> {
    match TcpStream::connect(endpoint).await {
        Ok(stream) => {
            let (reader, writer) = stream.into_split();
            Some(Conn {
                lines: BufReader::new(reader).lines(),
                writer,
            })
        }
        Err(e) => {
            debug!("could not connect to {endpoint}: {e}");
            None
        }
    }
}

#[derive(Serialize)]
struct WireCall<'a, Req> {
    id: u64,
    #[serde(flatten)]
    call: &'a Req,
}

#[derive(Deserialize)]
struct WireReply<Resp> {
    id: u64,
    result: Resp,
}

async fn run_client<Req, Resp>(
    endpoint: String,
    mut rx: mpsc::Receiver<ClientMessage<Req, Resp>>,
    connected: Arc<AtomicBool>,
) where
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    let mut conn: Option<Conn> = None;
    let mut next_id: u64 = 0;

    loop {
        if conn.is_none() {
            conn = try_connect(&endpoint).await;
            connected.store(conn.is_some(), Ordering::Release);

            if conn.is_none() {
                // Down: fail queued calls, serve probes, retry on a timer
                match timeout(RECONNECT_DELAY, rx.recv()).await {
                    Ok(None) => return,
                    Ok(Some(ClientMessage::Call { reply, .. })) => {
                        let _ = reply.send(None);
                    }
                    Ok(Some(ClientMessage::Probe { reply })) => {
                        conn = try_connect(&endpoint).await;
                        connected.store(conn.is_some(), Ordering::Release);
                        let _ = reply.send(conn.is_some());
                    }
                    Err(_elapsed) => {}
                }
                continue;
            }
        }

        let message = match rx.recv().await {
            Some(message) => message,
            None => return,
        };

        match message {
            ClientMessage::Probe { reply } => {
                let _ = reply.send(true);
            }
            ClientMessage::Call { request, reply } => {
                next_id += 1;
                let active = conn.as_mut().expect("connected in this branch");
                match roundtrip(active, next_id, &request).await {
                    Ok(response) => {
                        let _ = reply.send(Some(response));
                    }
                    Err(e) => {
                        debug!("request to {endpoint} failed: {e}");
                        conn = None;
                        connected.store(false, Ordering::Release);
                        let _ = reply.send(None);
                    }
                }
            }
        }
    }
}

async fn roundtrip<Req, Resp>(conn: &mut Conn, id: u64, request: &Req) -> Result<Resp, String>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let line = serde_json::to_string(&WireCall { id, call: request })
        .map_err(|e| format!("encode: {e}"))?;

    conn.writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| format!("write: {e}"))?;
    conn.writer
        .write_all(b"\n")
        .await
        .map_err(|e| format!("write: {e}"))?;

    loop {
        let line = conn
            .lines
            .next_line()
            .await
            .map_err(|e| format!("read: {e}"))?
            .ok_or_else(|| "connection closed".to_string())?;

        let reply: WireReply<Resp> =
            serde_json::from_str(&line).map_err(|e| format!("decode: {e}"))?;
        if reply.id == id {
            return Ok(reply.result);
        }
        // A reply to an abandoned earlier call; skip it
    }
}
