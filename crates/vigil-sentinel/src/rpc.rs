//! The sentinel's RPC surface: newline-delimited JSON over TCP, one request
//! object per line, answered by one response object carrying the same id, a
//! `result` (null when there is none) and an `error` string when the call
//! failed. The server side accepts connections and dispatches each request
//! on its own task; ordering between requests is not guaranteed.

use std::sync::Arc;

use log::debug;
use log::error;
use log::info;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::mpsc::unbounded_channel;
use vigil_transaction::FullTx;

use crate::controller::Controller;

/// The calls a sentinel answers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum SentinelRequest {
    /// Validate, gather attestations for and execute a transaction
    Execute { tx: FullTx },
    /// Validate a transaction and attest to it
    Validate { tx: FullTx },
}

/// A request line: a caller-chosen id plus the call itself
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u64,
    #[serde(flatten)]
    pub request: SentinelRequest,
}

pub(crate) async fn accept_loop(listener: TcpListener, controller: Arc<Controller>) {
    loop {
        match listener.accept().await {
            Ok((stream, address)) => {
                debug!("accepted sentinel RPC connection from {address}");
                tokio::spawn(handle_connection(stream, controller.clone()));
            }
            Err(e) => {
                error!("failed to accept sentinel RPC connection: {e}");
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, controller: Arc<Controller>) {
    let (reader, mut writer) = stream.into_split();
    let (response_tx, mut response_rx) = unbounded_channel::<String>();

    // Writer half: responses from whichever request task finishes first
    tokio::spawn(async move {
        while let Some(line) = response_rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if writer.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let controller = controller.clone();
                let response_tx = response_tx.clone();
                tokio::spawn(async move {
                    let response = dispatch(&controller, &line).await;
                    let _ = response_tx.send(response);
                });
            }
            Ok(None) => {
                info!("sentinel RPC client closed the connection");
                break;
            }
            Err(e) => {
                error!("error reading from sentinel RPC client: {e}");
                break;
            }
        }
    }
}

async fn dispatch(controller: &Controller, line: &str) -> String {
    let envelope: RequestEnvelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            return json!({
                "id": null,
                "result": null,
                "error": format!("malformed request: {e}"),
            })
            .to_string()
        }
    };

    let id = envelope.id;
    match envelope.request {
        SentinelRequest::Execute { tx } => match controller.execute(tx).await {
            Ok(result) => json!({ "id": id, "result": result }).to_string(),
            Err(e) => {
                json!({ "id": id, "result": null, "error": e.to_string() }).to_string()
            }
        },
        SentinelRequest::Validate { tx } => {
            let result = controller.validate(tx).await;
            json!({ "id": id, "result": result }).to_string()
        }
    }
}
