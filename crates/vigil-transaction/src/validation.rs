//! Static transaction validation.
//!
//! These checks are deterministic and context-free: they look only at the
//! transaction itself, never at the UHS. A transaction that fails here is
//! rejected before any attestation is gathered.

use std::collections::HashSet;

use secp256k1::schnorr;
use secp256k1::All;
use secp256k1::Message;
use secp256k1::Secp256k1;
use secp256k1::XOnlyPublicKey;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use vigil_common::sha256;

use crate::tx_id;
use crate::FullTx;
use crate::PubKey;

/// Byte length of a P2PK witness: an x-only public key followed by a schnorr
/// signature over the transaction id
pub const WITNESS_LEN: usize = 32 + 64;

/// A deterministic reason a transaction cannot be valid
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("transaction has no inputs")]
    NoInputs,
    #[error("transaction has no outputs")]
    NoOutputs,
    #[error("transaction has {witnesses} witnesses for {inputs} inputs")]
    WitnessCountMismatch { witnesses: usize, inputs: usize },
    #[error("input {index} spends an already-spent out point of this transaction")]
    DuplicateInput { index: usize },
    #[error("output {index} has zero value")]
    ZeroValueOutput { index: usize },
    #[error("input or output values overflow")]
    ValueOverflow,
    #[error("input total {input_total} does not match output total {output_total}")]
    UnbalancedValues { input_total: u64, output_total: u64 },
    #[error("witness {index} is malformed")]
    MalformedWitness { index: usize },
    #[error("witness {index} does not match the witness program commitment")]
    WitnessCommitmentMismatch { index: usize },
    #[error("witness {index} carries an invalid signature")]
    InvalidSignature { index: usize },
}

/// Checks a full transaction against every static rule. Returns the first
/// violation found, in a deterministic order.
pub fn check_tx(secp: &Secp256k1<All>, tx: &FullTx) -> Result<(), ValidationError> {
    check_structure(tx)?;
    check_balance(tx)?;
    check_witnesses(secp, tx)
}

fn check_structure(tx: &FullTx) -> Result<(), ValidationError> {
    if tx.inputs.is_empty() {
        return Err(ValidationError::NoInputs);
    }
    if tx.outputs.is_empty() {
        return Err(ValidationError::NoOutputs);
    }
    if tx.witnesses.len() != tx.inputs.len() {
        return Err(ValidationError::WitnessCountMismatch {
            witnesses: tx.witnesses.len(),
            inputs: tx.inputs.len(),
        });
    }

    let mut seen = HashSet::new();
    for (index, input) in tx.inputs.iter().enumerate() {
        if !seen.insert(input.prevout) {
            return Err(ValidationError::DuplicateInput { index });
        }
    }

    Ok(())
}

fn check_balance(tx: &FullTx) -> Result<(), ValidationError> {
    for (index, output) in tx.outputs.iter().enumerate() {
        if output.value == 0 {
            return Err(ValidationError::ZeroValueOutput { index });
        }
    }

    let input_total = sum_values(tx.inputs.iter().map(|input| input.prevout_data.value))?;
    let output_total = sum_values(tx.outputs.iter().map(|output| output.value))?;
    if input_total != output_total {
        return Err(ValidationError::UnbalancedValues {
            input_total,
            output_total,
        });
    }

    Ok(())
}

fn sum_values(values: impl Iterator<Item = u64>) -> Result<u64, ValidationError> {
    let mut total: u64 = 0;
    for value in values {
        total = total
            .checked_add(value)
            .ok_or(ValidationError::ValueOverflow)?;
    }
    Ok(total)
}

fn check_witnesses(secp: &Secp256k1<All>, tx: &FullTx) -> Result<(), ValidationError> {
    let sighash = tx_id(tx);
    let msg = Message::from_digest(sighash);

    for (index, (input, witness)) in tx.inputs.iter().zip(tx.witnesses.iter()).enumerate() {
        if witness.len() != WITNESS_LEN {
            return Err(ValidationError::MalformedWitness { index });
        }

        let pubkey_bytes: PubKey = witness[..32]
            .try_into()
            .expect("witness length checked above");
        if sha256(&pubkey_bytes) != input.prevout_data.witness_program_commitment {
            return Err(ValidationError::WitnessCommitmentMismatch { index });
        }

        let pubkey = XOnlyPublicKey::from_slice(&pubkey_bytes)
            .map_err(|_| ValidationError::MalformedWitness { index })?;
        let sig = schnorr::Signature::from_slice(&witness[32..])
            .map_err(|_| ValidationError::MalformedWitness { index })?;
        secp.verify_schnorr(&sig, &msg, &pubkey)
            .map_err(|_| ValidationError::InvalidSignature { index })?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use secp256k1::Keypair;
    use secp256k1::SecretKey;

    use super::*;
    use crate::Input;
    use crate::OutPoint;
    use crate::Output;

    fn secret(seed: u8) -> SecretKey {
        SecretKey::from_slice(&sha256(&[seed])).unwrap()
    }

    fn pubkey_of(secp: &Secp256k1<All>, key: &SecretKey) -> PubKey {
        let keypair = Keypair::from_secret_key(secp, key);
        XOnlyPublicKey::from_keypair(&keypair).0.serialize()
    }

    /// A balanced single-input transaction spending an output owned by `key`
    fn signed_tx(secp: &Secp256k1<All>, key: &SecretKey, out_values: &[u64]) -> FullTx {
        let pubkey = pubkey_of(secp, key);
        let total: u64 = out_values.iter().sum();

        let mut tx = FullTx {
            inputs: vec![Input {
                prevout: OutPoint::new(sha256(b"genesis"), 0),
                prevout_data: Output::new(sha256(&pubkey), total),
            }],
            outputs: out_values
                .iter()
                .map(|value| Output::new(sha256(b"recipient"), *value))
                .collect(),
            witnesses: Vec::new(),
        };

        let keypair = Keypair::from_secret_key(secp, key);
        let msg = Message::from_digest(tx_id(&tx));
        let sig = secp.sign_schnorr_no_aux_rand(&msg, &keypair);

        let mut witness = pubkey.to_vec();
        witness.extend_from_slice(&sig.serialize());
        tx.witnesses = vec![witness];
        tx
    }

    #[test]
    fn test_valid_tx_passes() {
        let secp = Secp256k1::new();
        let tx = signed_tx(&secp, &secret(1), &[30, 12]);
        assert_eq!(check_tx(&secp, &tx), Ok(()));
    }

    #[test]
    fn test_structure_errors() {
        let secp = Secp256k1::new();
        let valid = signed_tx(&secp, &secret(1), &[10]);

        let mut no_inputs = valid.clone();
        no_inputs.inputs.clear();
        assert_eq!(check_tx(&secp, &no_inputs), Err(ValidationError::NoInputs));

        let mut no_outputs = valid.clone();
        no_outputs.outputs.clear();
        assert_eq!(check_tx(&secp, &no_outputs), Err(ValidationError::NoOutputs));

        let mut missing_witness = valid.clone();
        missing_witness.witnesses.clear();
        assert_eq!(
            check_tx(&secp, &missing_witness),
            Err(ValidationError::WitnessCountMismatch {
                witnesses: 0,
                inputs: 1
            })
        );

        let mut duplicated = valid.clone();
        duplicated.inputs.push(duplicated.inputs[0]);
        duplicated.witnesses.push(duplicated.witnesses[0].clone());
        assert_eq!(
            check_tx(&secp, &duplicated),
            Err(ValidationError::DuplicateInput { index: 1 })
        );
    }

    #[test]
    fn test_balance_errors() {
        let secp = Secp256k1::new();

        let mut zero_output = signed_tx(&secp, &secret(1), &[10, 1]);
        zero_output.outputs[1].value = 0;
        assert_eq!(
            check_tx(&secp, &zero_output),
            Err(ValidationError::ZeroValueOutput { index: 1 })
        );

        let mut unbalanced = signed_tx(&secp, &secret(1), &[10]);
        unbalanced.outputs[0].value = 11;
        assert_eq!(
            check_tx(&secp, &unbalanced),
            Err(ValidationError::UnbalancedValues {
                input_total: 10,
                output_total: 11
            })
        );

        let mut overflowing = signed_tx(&secp, &secret(1), &[10]);
        overflowing.outputs[0].value = u64::MAX;
        overflowing.outputs.push(Output::new(sha256(b"x"), 2));
        assert_eq!(check_tx(&secp, &overflowing), Err(ValidationError::ValueOverflow));
    }

    #[test]
    fn test_witness_errors() {
        let secp = Secp256k1::new();

        let mut truncated = signed_tx(&secp, &secret(1), &[10]);
        truncated.witnesses[0].pop();
        assert_eq!(
            check_tx(&secp, &truncated),
            Err(ValidationError::MalformedWitness { index: 0 })
        );

        // Witness signed by a key the spent output is not committed to
        let mut stolen = signed_tx(&secp, &secret(1), &[10]);
        let thief = signed_tx(&secp, &secret(2), &[10]);
        stolen.witnesses[0] = thief.witnesses[0].clone();
        assert_eq!(
            check_tx(&secp, &stolen),
            Err(ValidationError::WitnessCommitmentMismatch { index: 0 })
        );

        // Right key, corrupted signature
        let mut forged = signed_tx(&secp, &secret(1), &[10]);
        let last = forged.witnesses[0].len() - 1;
        forged.witnesses[0][last] ^= 0x01;
        assert_eq!(
            check_tx(&secp, &forged),
            Err(ValidationError::InvalidSignature { index: 0 })
        );
    }
}
