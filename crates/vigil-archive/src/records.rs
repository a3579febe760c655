//! Binary layout of archive records and the human-readable rendering used by
//! the reader tool.
//!
//! A transaction body is stored under the 64-character lowercase hex of its
//! id. Each lifecycle status lives in its own record, keyed by the body key,
//! an ASCII `-`, and the single decimal digit of the status ordinal. Status
//! values are the 8-byte little-endian millisecond timestamp of the
//! transition.

use std::fmt;
use std::fmt::Write as _;

use chrono::Local;
use chrono::TimeZone;
use thiserror::Error;
use vigil_common::encode_hex;
use vigil_common::Hash;
use vigil_common::HASH_SIZE;
use vigil_transaction::tx_id;
use vigil_transaction::FullTx;
use vigil_transaction::Input;
use vigil_transaction::OutPoint;
use vigil_transaction::Output;

/// The lifecycle state of an archived transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TxState {
    Initial = 0,
    Validated = 1,
    Execution = 2,
    Completed = 3,
    Unknown = 4,
    ValidationFailed = 5,
    ExecutionFailed = 6,
}

impl TxState {
    /// States probed by `get`, highest priority first. `Initial` is the
    /// floor: it has no status record of its own, the body record implies it.
    pub const PRIORITY: [TxState; 6] = [
        TxState::Completed,
        TxState::ExecutionFailed,
        TxState::ValidationFailed,
        TxState::Execution,
        TxState::Validated,
        TxState::Unknown,
    ];

    /// The single decimal digit used in status keys
    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxState::Initial => "initial",
            TxState::Validated => "validated",
            TxState::Execution => "execution",
            TxState::Completed => "completed",
            TxState::Unknown => "unknown",
            TxState::ValidationFailed => "validation_failed",
            TxState::ExecutionFailed => "execution_failed",
        };
        write!(f, "{name}")
    }
}

/// The archive key of a transaction body
pub fn body_key(txid: &Hash) -> String {
    encode_hex(txid)
}

/// The archive key of one status record
pub fn status_key(body_key: &str, state: TxState) -> String {
    format!("{body_key}-{}", state.ordinal())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("record ends before field {0}")]
    UnexpectedEof(&'static str),
}

/// Serializes a transaction body record: the archival timestamp followed by
/// the length-prefixed inputs, outputs and witnesses, all little-endian
pub fn encode_tx(tx: &FullTx, timestamp_ms: u64) -> Vec<u8> {
    let witness_bytes: usize = tx.witnesses.iter().map(|w| w.len() + 8).sum();
    let mut out = Vec::with_capacity(8 + 8 + tx.inputs.len() * 80 + 8 + tx.outputs.len() * 40 + 8 + witness_bytes);

    out.extend_from_slice(&timestamp_ms.to_le_bytes());

    out.extend_from_slice(&(tx.inputs.len() as u64).to_le_bytes());
    for input in &tx.inputs {
        out.extend_from_slice(&input.prevout.txid);
        out.extend_from_slice(&input.prevout.index.to_le_bytes());
        out.extend_from_slice(&input.prevout_data.witness_program_commitment);
        out.extend_from_slice(&input.prevout_data.value.to_le_bytes());
    }

    out.extend_from_slice(&(tx.outputs.len() as u64).to_le_bytes());
    for output in &tx.outputs {
        out.extend_from_slice(&output.witness_program_commitment);
        out.extend_from_slice(&output.value.to_le_bytes());
    }

    out.extend_from_slice(&(tx.witnesses.len() as u64).to_le_bytes());
    for witness in &tx.witnesses {
        out.extend_from_slice(&(witness.len() as u64).to_le_bytes());
        out.extend_from_slice(witness);
    }

    out
}

/// Parses a transaction body record back into the transaction and its
/// archival timestamp
pub fn decode_tx(record: &[u8]) -> Result<(FullTx, u64), CodecError> {
    let mut reader = Reader(record);
    let timestamp_ms = reader.u64("timestamp")?;

    let n_inputs = reader.u64("input count")?;
    let mut inputs = Vec::new();
    for _ in 0..n_inputs {
        inputs.push(Input {
            prevout: OutPoint {
                txid: reader.hash("input txid")?,
                index: reader.u64("input index")?,
            },
            prevout_data: Output {
                witness_program_commitment: reader.hash("input commitment")?,
                value: reader.u64("input value")?,
            },
        });
    }

    let n_outputs = reader.u64("output count")?;
    let mut outputs = Vec::new();
    for _ in 0..n_outputs {
        outputs.push(Output {
            witness_program_commitment: reader.hash("output commitment")?,
            value: reader.u64("output value")?,
        });
    }

    let n_witnesses = reader.u64("witness count")?;
    let mut witnesses = Vec::new();
    for _ in 0..n_witnesses {
        let len = reader.u64("witness length")?;
        witnesses.push(reader.bytes(len as usize, "witness")?.to_vec());
    }

    Ok((
        FullTx {
            inputs,
            outputs,
            witnesses,
        },
        timestamp_ms,
    ))
}

/// Encodes a status record value
pub fn encode_status(timestamp_ms: u64) -> Vec<u8> {
    timestamp_ms.to_le_bytes().to_vec()
}

/// Parses a status record value
pub fn decode_status(record: &[u8]) -> Result<u64, CodecError> {
    let bytes: [u8; 8] = record
        .try_into()
        .map_err(|_| CodecError::UnexpectedEof("status timestamp"))?;
    Ok(u64::from_le_bytes(bytes))
}

struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn bytes(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], CodecError> {
        if self.0.len() < len {
            return Err(CodecError::UnexpectedEof(field));
        }
        let (taken, rest) = self.0.split_at(len);
        self.0 = rest;
        Ok(taken)
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, CodecError> {
        let bytes = self.bytes(8, field)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("split at 8")))
    }

    fn hash(&mut self, field: &'static str) -> Result<Hash, CodecError> {
        let bytes = self.bytes(HASH_SIZE, field)?;
        Ok(bytes.try_into().expect("split at hash size"))
    }
}

/// Renders a transaction, its state and its timestamp the way the reader
/// tool prints them
pub fn render_tx(tx: &FullTx, state: TxState, timestamp_ms: u64) -> String {
    let txid = tx_id(tx);
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Transaction: 0x{} | Status: {state} | Timestamp: {}",
        encode_hex(&txid),
        render_timestamp(timestamp_ms)
    );

    let _ = writeln!(out, "\tInputs ({}):", tx.inputs.len());
    for (i, input) in tx.inputs.iter().enumerate() {
        if tx.inputs.len() > 1 {
            let _ = writeln!(out, "\t\t--- {} ---", i + 1);
        }
        let _ = writeln!(
            out,
            "\t\tOutPoint:\tTX Id: 0x{}\tIndex: {}",
            encode_hex(&input.prevout.txid),
            input.prevout.index
        );
        let _ = writeln!(
            out,
            "\t\tOutput:\tWitness_program_commitment: 0x{}\tValue: {}",
            encode_hex(&input.prevout_data.witness_program_commitment),
            input.prevout_data.value
        );
    }

    let _ = writeln!(out, "\tOutputs ({}):", tx.outputs.len());
    for (i, output) in tx.outputs.iter().enumerate() {
        if tx.outputs.len() > 1 {
            let _ = writeln!(out, "\t\t--- {} ---", i + 1);
        }
        let _ = writeln!(
            out,
            "\t\tWitness_program_commitment: 0x{}\tValue: {}",
            encode_hex(&output.witness_program_commitment),
            output.value
        );
    }

    let _ = writeln!(out, "\tWitnesses ({}):", tx.witnesses.len());
    for (i, witness) in tx.witnesses.iter().enumerate() {
        let _ = writeln!(out, "\t\t{}: 0x{}", i + 1, encode_hex(witness));
    }

    out
}

fn render_timestamp(timestamp_ms: u64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms as i64).single() {
        Some(when) => when.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => format!("{timestamp_ms} ms"),
    }
}

#[cfg(test)]
mod test {
    use vigil_common::sha256;

    use super::*;

    fn sample_tx() -> FullTx {
        FullTx {
            inputs: vec![
                Input {
                    prevout: OutPoint::new(sha256(b"a"), 0),
                    prevout_data: Output::new(sha256(b"b"), 7),
                },
                Input {
                    prevout: OutPoint::new(sha256(b"c"), 9),
                    prevout_data: Output::new(sha256(b"d"), 3),
                },
            ],
            outputs: vec![Output::new(sha256(b"e"), 10)],
            witnesses: vec![vec![1, 2, 3], Vec::new()],
        }
    }

    #[test]
    fn test_body_roundtrip() {
        let tx = sample_tx();
        let record = encode_tx(&tx, 1_700_000_000_123);

        let (decoded, timestamp) = decode_tx(&record).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(timestamp, 1_700_000_000_123);
    }

    #[test]
    fn test_empty_tx_roundtrip() {
        let tx = FullTx::default();
        let (decoded, timestamp) = decode_tx(&encode_tx(&tx, 0)).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(timestamp, 0);
    }

    #[test]
    fn test_truncated_body_fails() {
        let record = encode_tx(&sample_tx(), 1);
        for len in [0, 7, 8, 15, record.len() - 1] {
            assert!(decode_tx(&record[..len]).is_err(), "len {len} must fail");
        }
    }

    #[test]
    fn test_status_keys() {
        let txid = [0xabu8; 32];
        let key = body_key(&txid);
        assert_eq!(key.len(), 64);
        assert_eq!(status_key(&key, TxState::Completed), format!("{key}-3"));
        assert_eq!(status_key(&key, TxState::ExecutionFailed), format!("{key}-6"));
    }

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(decode_status(&encode_status(42)).unwrap(), 42);
        assert!(decode_status(&[0u8; 7]).is_err());
    }

    #[test]
    fn test_render_mentions_every_part() {
        let tx = sample_tx();
        let rendered = render_tx(&tx, TxState::Completed, 1_700_000_000_000);

        assert!(rendered.contains(&format!("0x{}", encode_hex(&tx_id(&tx)))));
        assert!(rendered.contains("Status: completed"));
        assert!(rendered.contains("Inputs (2):"));
        assert!(rendered.contains("--- 2 ---"));
        assert!(rendered.contains("Outputs (1):"));
        assert!(rendered.contains("Witnesses (2):"));
        assert!(rendered.contains("0x010203"));
    }
}
