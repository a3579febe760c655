// SPDX-License-Identifier: MIT

//! The sentinel: the validating front-end of the transaction processor. It
//! statically validates client transactions, gathers a threshold of peer
//! attestations over the compact form, submits the result to a coordinator
//! and reports the outcome, journaling every lifecycle transition to the
//! transaction history archive along the way.

use serde::Deserialize;
use serde::Serialize;
use vigil_transaction::validation::ValidationError;

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod rpc;

pub use client::CoordinatorClient;
pub use client::PeerClient;
pub use config::Options;
pub use controller::Controller;
pub use error::SentinelError;

/// The outcome of an execute call, as reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// The transaction was executed and the UHS updated
    Confirmed,
    /// The coordinator reported conflicting state (e.g. an already-spent
    /// input)
    StateInvalid,
    /// The transaction failed deterministic local validation
    StaticInvalid,
    /// A peer sentinel refused to attest to the transaction
    ValidationFailed,
}

/// The response to an execute call. A missing response (`None` at the RPC
/// layer) means the coordinator gave up without an authoritative answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub status: TxStatus,
    pub error: Option<ValidationError>,
}
