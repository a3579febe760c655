//! The sentinel controller: request validation, attestation gathering,
//! coordinator submission and result reporting.
//!
//! Each `execute` call runs as one async state machine. Peer solicitation
//! and coordinator submission are the only suspension points; dropping the
//! returned future cancels the request, including the 100 ms coordinator
//! retry cadence. Archive writes are best-effort and never fail a request.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use log::debug;
use log::error;
use log::info;
use log::trace;
use log::warn;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use secp256k1::All;
use secp256k1::Keypair;
use secp256k1::Secp256k1;
use secp256k1::SecretKey;
use secp256k1::XOnlyPublicKey;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::sleep;
use vigil_archive::TxHistoryArchiver;
use vigil_archive::TxState;
use vigil_common::encode_hex;
use vigil_common::Hash;
use vigil_transaction::tx_id;
use vigil_transaction::validation;
use vigil_transaction::Attestation;
use vigil_transaction::CompactTx;
use vigil_transaction::FullTx;

use crate::client::CoordinatorClient;
use crate::client::PeerClient;
use crate::client::TcpCoordinatorClient;
use crate::client::TcpPeerClient;
use crate::config::Options;
use crate::error::SentinelError;
use crate::rpc;
use crate::ExecuteResponse;
use crate::TxStatus;

/// Delay between coordinator admission retries
const COORDINATOR_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Refused admissions between "coordinator still unreachable" warnings
const COORDINATOR_WARN_EVERY: u32 = 50;

pub struct Controller {
    sentinel_id: u32,
    opts: Options,
    secp: Secp256k1<All>,
    privkey: Option<SecretKey>,
    tha: TxHistoryArchiver,
    coordinator: Arc<dyn CoordinatorClient>,
    peers: Vec<Arc<dyn PeerClient>>,
    /// Peer selection randomness, per controller rather than process-wide
    rng: Mutex<StdRng>,
}

impl Controller {
    /// Builds a controller with TCP clients for the coordinator and every
    /// peer sentinel. The coordinator connection is retried with exponential
    /// backoff and is not fatal; unreachable peers are tolerated too.
    pub async fn new(sentinel_id: u32, opts: Options) -> Result<Self, SentinelError> {
        validate_options(sentinel_id, &opts)?;

        let coordinator_endpoint = opts
            .coordinator_endpoint_for(sentinel_id)
            .unwrap_or_default()
            .to_string();
        let coordinator = TcpCoordinatorClient::new(coordinator_endpoint);

        let mut retry_delay = Duration::from_secs(1);
        let mut retry_threshold = 4;
        while !coordinator.ensure_connected().await && retry_threshold > 0 {
            warn!("Failed to start coordinator client.");

            sleep(retry_delay).await;
            retry_threshold -= 1;
            if retry_threshold > 0 {
                retry_delay *= 2;
                warn!("Retrying...");
            }
        }

        let own_endpoint = &opts.sentinel_endpoints[sentinel_id as usize];
        let mut peers: Vec<Arc<dyn PeerClient>> = Vec::new();
        for endpoint in &opts.sentinel_endpoints {
            if endpoint == own_endpoint {
                continue;
            }
            let client = TcpPeerClient::new(endpoint.clone());
            if !client.ensure_connected().await {
                warn!("Failed to start sentinel client for {endpoint}");
            }
            peers.push(Arc::new(client));
        }

        Self::with_clients(sentinel_id, opts, Arc::new(coordinator), peers).await
    }

    /// Builds a controller around caller-provided clients. This is the
    /// constructor everything else reduces to; tests hand it mock clients.
    pub async fn with_clients(
        sentinel_id: u32,
        opts: Options,
        coordinator: Arc<dyn CoordinatorClient>,
        peers: Vec<Arc<dyn PeerClient>>,
    ) -> Result<Self, SentinelError> {
        validate_options(sentinel_id, &opts)?;

        let secp = Secp256k1::new();
        let privkey = match opts.sentinel_private_keys.get(&sentinel_id) {
            Some(bytes) => Some(SecretKey::from_slice(bytes)?),
            None => None,
        };
        if let Some(key) = &privkey {
            let keypair = Keypair::from_secret_key(&secp, key);
            let (pubkey, _) = XOnlyPublicKey::from_keypair(&keypair);
            info!("Sentinel public key: {}", encode_hex(&pubkey.serialize()));
        }

        let tha = TxHistoryArchiver::new(sentinel_id, &opts.archive).await;

        Ok(Controller {
            sentinel_id,
            opts,
            secp,
            privkey,
            tha,
            coordinator,
            peers,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Binds the sentinel's RPC endpoint and serves requests until the task
    /// is dropped. A bind failure is the one fatal runtime error a sentinel
    /// has.
    pub async fn serve(self: Arc<Self>) -> Result<(), SentinelError> {
        let endpoint = self.opts.sentinel_endpoints[self.sentinel_id as usize].clone();
        let listener = TcpListener::bind(&endpoint)
            .await
            .map_err(SentinelError::Bind)?;
        info!("sentinel {} RPC server listening on {endpoint}", self.sentinel_id);

        rpc::accept_loop(listener, self).await;
        Ok(())
    }

    /// Executes a transaction end to end. `Ok(None)` means the coordinator
    /// gave up without an authoritative answer; the archive keeps the
    /// `unknown` record for forensic replay.
    pub async fn execute(&self, tx: FullTx) -> Result<Option<ExecuteResponse>, SentinelError> {
        let txid = tx_id(&tx);

        trace!("Tx status set to initial {}", encode_hex(&txid));
        self.tha.add_transaction(&tx).await;

        if let Err(validation_err) = validation::check_tx(&self.secp, &tx) {
            debug!(
                "Rejected, validation_failed status ({validation_err}) {}",
                encode_hex(&txid)
            );
            self.tha.set_status(&txid, TxState::ValidationFailed).await;
            return Ok(Some(ExecuteResponse {
                status: TxStatus::StaticInvalid,
                error: Some(validation_err),
            }));
        }

        let mut ctx = CompactTx::from_full(&tx);
        if self.opts.attestation_threshold > 0 {
            let key = self.privkey.as_ref().expect("checked during init");
            let attestation = ctx.sign(&self.secp, key);
            ctx.insert_attestation(attestation);
        }

        if !self.gather_attestations(&tx, &mut ctx).await? {
            return Ok(Some(ExecuteResponse {
                status: TxStatus::ValidationFailed,
                error: None,
            }));
        }

        let result = self.send_compact_tx(&ctx).await;
        Ok(self.handle_result(&ctx.id, result).await)
    }

    /// Validates a transaction on behalf of a peer and attests to it, or
    /// returns `None` when it fails validation or this sentinel cannot sign
    pub async fn validate(&self, tx: FullTx) -> Option<Attestation> {
        let txid = tx_id(&tx);

        if validation::check_tx(&self.secp, &tx).is_err() {
            debug!("Tx status: validation_failed {}", encode_hex(&txid));
            self.tha.set_status(&txid, TxState::ValidationFailed).await;
            return None;
        }

        let Some(key) = &self.privkey else {
            warn!("asked to attest but no private key is configured");
            return None;
        };
        let ctx = CompactTx::from_full(&tx);
        Some(ctx.sign(&self.secp, key))
    }

    pub fn archive(&self) -> &TxHistoryArchiver {
        &self.tha
    }

    /// Solicits random peers one at a time until the compact transaction
    /// carries a threshold of attestations. Returns `Ok(false)` when a peer
    /// examined the transaction and refused to attest.
    async fn gather_attestations(
        &self,
        tx: &FullTx,
        ctx: &mut CompactTx,
    ) -> Result<bool, SentinelError> {
        let mut requested: HashSet<usize> = HashSet::new();

        while ctx.attestations.len() < self.opts.attestation_threshold {
            // Solicit: pick an un-asked peer at random; admission-refused
            // peers count as asked so exhaustion terminates instead of
            // spinning
            let (peer_id, reply_rx) = loop {
                let candidates: Vec<usize> = (0..self.peers.len())
                    .filter(|peer_id| !requested.contains(peer_id))
                    .collect();
                if candidates.is_empty() {
                    return Err(SentinelError::NoPeersAvailable);
                }

                let pick = {
                    let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                    candidates[rng.gen_range(0..candidates.len())]
                };

                let (reply_tx, reply_rx) = oneshot::channel();
                if self.peers[pick].validate(tx, reply_tx) {
                    break (pick, reply_rx);
                }
                requested.insert(pick);
            };
            requested.insert(peer_id);

            match reply_rx.await.ok().flatten() {
                Some(Some(attestation)) => {
                    if !ctx.verify(&self.secp, &attestation) {
                        // Signature checks are the only attestation scrutiny
                        // we apply; a bad one is treated like no reply
                        warn!(
                            "peer returned an unverifiable attestation for {}",
                            encode_hex(&ctx.id)
                        );
                        continue;
                    }
                    ctx.insert_attestation(attestation);
                }
                Some(None) => {
                    error!(
                        "{} invalid (Tx status: validation_failed) according to remote sentinel",
                        encode_hex(&ctx.id)
                    );
                    self.tha.set_status(&ctx.id, TxState::ValidationFailed).await;
                    return Ok(false);
                }
                None => {
                    // Transport failure: tolerated, try another peer
                    debug!("peer dropped a validate request for {}", encode_hex(&ctx.id));
                }
            }
        }

        debug!("Accepted (tx status: validated) {}", encode_hex(&ctx.id));
        self.tha.set_status(&ctx.id, TxState::Validated).await;
        Ok(true)
    }

    /// Submits to the coordinator, retrying admission forever on a 100 ms
    /// cadence. The loop is bounded only by the caller dropping the future.
    async fn send_compact_tx(&self, ctx: &CompactTx) -> Option<bool> {
        let mut refused: u32 = 0;
        let reply_rx = loop {
            let (reply_tx, reply_rx) = oneshot::channel();
            if self.coordinator.execute(ctx, reply_tx) {
                break reply_rx;
            }

            refused += 1;
            if refused % COORDINATOR_WARN_EVERY == 0 {
                warn!(
                    "coordinator has refused tx {} {refused} times, still retrying",
                    encode_hex(&ctx.id)
                );
            }
            sleep(COORDINATOR_RETRY_DELAY).await;
        };

        trace!("Tx status: execution {}", encode_hex(&ctx.id));
        self.tha.set_status(&ctx.id, TxState::Execution).await;

        reply_rx.await.ok().flatten().flatten()
    }

    /// Maps the coordinator's verdict onto the archived state and the
    /// caller's response
    async fn handle_result(&self, ctx_id: &Hash, result: Option<bool>) -> Option<ExecuteResponse> {
        match result {
            Some(true) => {
                self.tha.set_status(ctx_id, TxState::Completed).await;
                trace!("Completed tx {}", encode_hex(ctx_id));
                Some(ExecuteResponse {
                    status: TxStatus::Confirmed,
                    error: None,
                })
            }
            Some(false) => {
                self.tha.set_status(ctx_id, TxState::ExecutionFailed).await;
                error!("Execution failed tx {}", encode_hex(ctx_id));
                Some(ExecuteResponse {
                    status: TxStatus::StateInvalid,
                    error: None,
                })
            }
            None => {
                self.tha.set_status(ctx_id, TxState::Unknown).await;
                trace!("Unknown status for tx {}", encode_hex(ctx_id));
                None
            }
        }
    }
}

fn validate_options(sentinel_id: u32, opts: &Options) -> Result<(), SentinelError> {
    if opts.sentinel_endpoints.is_empty() {
        error!("No sentinel endpoints are defined.");
        return Err(SentinelError::NoEndpoints);
    }
    if sentinel_id as usize >= opts.sentinel_endpoints.len() {
        error!("The sentinel ID is too large for the number of sentinels.");
        return Err(SentinelError::IdOutOfRange {
            id: sentinel_id,
            count: opts.sentinel_endpoints.len(),
        });
    }
    if opts.attestation_threshold > 0 && !opts.sentinel_private_keys.contains_key(&sentinel_id) {
        error!("No private key specified");
        return Err(SentinelError::NoPrivateKey(opts.attestation_threshold));
    }
    Ok(())
}
