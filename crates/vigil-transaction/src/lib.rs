// SPDX-License-Identifier: MIT

//! The vigil transaction model: full transactions as clients submit them,
//! compact transactions as the transaction processor consumes them, and the
//! sentinel attestations that travel with the compact form.

use std::collections::BTreeMap;

use secp256k1::schnorr;
use secp256k1::All;
use secp256k1::Keypair;
use secp256k1::Message;
use secp256k1::Secp256k1;
use secp256k1::SecretKey;
use secp256k1::XOnlyPublicKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use vigil_common::Hash;

pub mod proof;
pub mod validation;
#[cfg(feature = "test-utils")]
pub mod test_utils;

/// A schnorr public key in the 32-byte x-only encoding BIP340 signs and
/// verifies against, as attestations carry it
pub type PubKey = [u8; 32];

/// A 64-byte schnorr signature
pub type SigBytes = [u8; 64];

/// The unique identifier of a specific [Output] from a previous transaction
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// The id of the transaction which created the output
    #[serde(with = "vigil_common::serde_hex")]
    pub txid: Hash,

    /// The index of the output in that transaction's output list
    pub index: u64,
}

impl OutPoint {
    pub fn new(txid: Hash, index: u64) -> Self {
        OutPoint { txid, index }
    }
}

/// An output created by a transaction, spendable by whoever can satisfy the
/// committed witness program
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Hash of the witness program
    #[serde(with = "vigil_common::serde_hex")]
    pub witness_program_commitment: Hash,

    /// The integral value of the output, in atomic units of currency
    pub value: u64,
}

impl Output {
    pub fn new(witness_program_commitment: Hash, value: u64) -> Self {
        Output {
            witness_program_commitment,
            value,
        }
    }
}

/// An [OutPoint] and the [Output] it refers to, which a client intends to
/// spend in a new transaction
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// The unique identifier of the output being spent
    pub prevout: OutPoint,

    /// The output's data
    pub prevout_data: Output,
}

impl Input {
    /// The hash committing to this input, used for UHS-id derivation
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hash_input(&mut hasher, self);
        finalize(hasher)
    }
}

/// A complete transaction: the outputs being spent, the outputs being
/// created, and one witness per input, positionally aligned
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTx {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    #[serde(with = "vigil_common::serde_hex::vec_list")]
    pub witnesses: Vec<Vec<u8>>,
}

/// Calculates the unique hash of a full transaction.
///
/// Witnesses are not part of the digest, so the id is stable across signing.
pub fn tx_id(tx: &FullTx) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update((tx.inputs.len() as u64).to_le_bytes());
    for input in &tx.inputs {
        hash_input(&mut hasher, input);
    }
    hasher.update((tx.outputs.len() as u64).to_le_bytes());
    for output in &tx.outputs {
        hash_output(&mut hasher, output);
    }
    finalize(hasher)
}

/// Converts the output at index `index` of `tx` into an [Input], given the
/// already-computed `txid`. Returns `None` if the index is out of bounds.
pub fn input_from_output(tx: &FullTx, index: u64, txid: Hash) -> Option<Input> {
    let prevout_data = *tx.outputs.get(index as usize)?;
    Some(Input {
        prevout: OutPoint::new(txid, index),
        prevout_data,
    })
}

/// Derives the UHS id of an output created at `index` by the transaction
/// identified by `entropy`
pub fn uhs_id_from_output(entropy: &Hash, index: u64, output: &Output) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(entropy);
    hasher.update(index.to_le_bytes());
    hash_output(&mut hasher, output);
    finalize(hasher)
}

/// The minimum data the UHS needs to apply one side of a transaction and the
/// auditor needs to account for it
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UhsElement {
    /// The UHS id of the output
    #[serde(with = "vigil_common::serde_hex")]
    pub id: Hash,

    /// The witness program commitment of the output
    #[serde(with = "vigil_common::serde_hex")]
    pub data: Hash,

    /// The value of the output
    pub value: u64,
}

/// A sentinel attestation: the sentinel's public key and its signature over
/// the attestation-free hash of a compact transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    #[serde(with = "vigil_common::serde_hex")]
    pub pubkey: PubKey,
    #[serde(with = "vigil_common::serde_hex")]
    pub signature: SigBytes,
}

/// A condensed transaction: just the UHS deltas plus sentinel attestations.
///
/// Equality compares the transaction id only, matching how the transaction
/// processor deduplicates submissions.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CompactTx {
    /// The hash of the full transaction, as returned by [tx_id]
    #[serde(with = "vigil_common::serde_hex")]
    pub id: Hash,

    /// The UHS elements consumed by this transaction
    pub inputs: Vec<UhsElement>,

    /// The UHS elements created by this transaction
    pub outputs: Vec<UhsElement>,

    /// Attestations keyed by sentinel public key; duplicates overwrite
    #[serde(with = "attestation_map")]
    pub attestations: BTreeMap<PubKey, SigBytes>,
}

impl PartialEq for CompactTx {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CompactTx {}

impl CompactTx {
    /// Condenses a full transaction into its compact form, with an empty
    /// attestation set
    pub fn from_full(tx: &FullTx) -> Self {
        let id = tx_id(tx);
        let inputs = tx
            .inputs
            .iter()
            .map(|input| UhsElement {
                id: uhs_id_from_output(&input.prevout.txid, input.prevout.index, &input.prevout_data),
                data: input.prevout_data.witness_program_commitment,
                value: input.prevout_data.value,
            })
            .collect();
        let outputs = tx
            .outputs
            .iter()
            .enumerate()
            .map(|(index, output)| UhsElement {
                id: uhs_id_from_output(&id, index as u64, output),
                data: output.witness_program_commitment,
                value: output.value,
            })
            .collect();

        CompactTx {
            id,
            inputs,
            outputs,
            attestations: BTreeMap::new(),
        }
    }

    /// The hash of the compact transaction with the attestation set empty.
    /// This is the message sentinel attestations sign.
    pub fn sighash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.id);
        hasher.update((self.inputs.len() as u64).to_le_bytes());
        for element in &self.inputs {
            hash_element(&mut hasher, element);
        }
        hasher.update((self.outputs.len() as u64).to_le_bytes());
        for element in &self.outputs {
            hash_element(&mut hasher, element);
        }
        finalize(hasher)
    }

    /// Signs the compact transaction, returning the resulting attestation
    pub fn sign(&self, secp: &Secp256k1<All>, key: &SecretKey) -> Attestation {
        let keypair = Keypair::from_secret_key(secp, key);
        let (pubkey, _parity) = XOnlyPublicKey::from_keypair(&keypair);
        let msg = Message::from_digest(self.sighash());
        let sig = secp.sign_schnorr_no_aux_rand(&msg, &keypair);

        Attestation {
            pubkey: pubkey.serialize(),
            signature: sig.serialize(),
        }
    }

    /// Checks that `attestation` carries a valid signature over this compact
    /// transaction
    pub fn verify(&self, secp: &Secp256k1<All>, attestation: &Attestation) -> bool {
        let Ok(pubkey) = XOnlyPublicKey::from_slice(&attestation.pubkey) else {
            return false;
        };
        let Ok(sig) = schnorr::Signature::from_slice(&attestation.signature) else {
            return false;
        };
        let msg = Message::from_digest(self.sighash());
        secp.verify_schnorr(&sig, &msg, &pubkey).is_ok()
    }

    /// Inserts an attestation, overwriting any previous one from the same key
    pub fn insert_attestation(&mut self, attestation: Attestation) {
        self.attestations
            .insert(attestation.pubkey, attestation.signature);
    }
}

/// A compacted output carrying everything the auditor needs: the value
/// commitment, its range proof, and the provenance hash binding it to the
/// out point and encumbrance that created it
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactOutput {
    /// Pedersen commitment to the output value
    #[serde(with = "vigil_common::serde_hex")]
    pub value_commitment: proof::Commitment,

    /// Range proof guaranteeing the committed value does not overflow
    #[serde(with = "vigil_common::serde_hex::vec")]
    pub range: Vec<u8>,

    /// The nested hash of the out point and encumbrance
    #[serde(with = "vigil_common::serde_hex")]
    pub provenance: Hash,
}

/// Calculates the UHS id of a [CompactOutput]. The compact output carries
/// everything the id commits to, so the id can be recomputed from it alone.
pub fn calculate_uhs_id(output: &CompactOutput) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(output.provenance);
    hasher.update(output.value_commitment);
    hasher.update((output.range.len() as u64).to_le_bytes());
    hasher.update(&output.range);
    finalize(hasher)
}

fn hash_input(hasher: &mut Sha256, input: &Input) {
    hasher.update(input.prevout.txid);
    hasher.update(input.prevout.index.to_le_bytes());
    hash_output(hasher, &input.prevout_data);
}

fn hash_output(hasher: &mut Sha256, output: &Output) {
    hasher.update(output.witness_program_commitment);
    hasher.update(output.value.to_le_bytes());
}

fn hash_element(hasher: &mut Sha256, element: &UhsElement) {
    hasher.update(element.id);
    hasher.update(element.data);
    hasher.update(element.value.to_le_bytes());
}

fn finalize(hasher: Sha256) -> Hash {
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Serializes the attestation map as a list of [Attestation] objects, keeping
/// signatures hex-encoded on the wire
mod attestation_map {
    use super::*;

    pub fn serialize<S>(
        map: &BTreeMap<PubKey, SigBytes>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let list: Vec<Attestation> = map
            .iter()
            .map(|(pubkey, signature)| Attestation {
                pubkey: *pubkey,
                signature: *signature,
            })
            .collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<PubKey, SigBytes>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let list = Vec::<Attestation>::deserialize(deserializer)?;
        Ok(list
            .into_iter()
            .map(|att| (att.pubkey, att.signature))
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn secret(seed: u8) -> SecretKey {
        SecretKey::from_slice(&vigil_common::sha256(&[seed])).unwrap()
    }

    fn sample_tx() -> FullTx {
        FullTx {
            inputs: vec![Input {
                prevout: OutPoint::new(vigil_common::sha256(b"prev"), 3),
                prevout_data: Output::new(vigil_common::sha256(b"wpc"), 40),
            }],
            outputs: vec![
                Output::new(vigil_common::sha256(b"alice"), 25),
                Output::new(vigil_common::sha256(b"bob"), 15),
            ],
            witnesses: vec![vec![0u8; 96]],
        }
    }

    #[test]
    fn test_tx_id_ignores_witnesses() {
        let mut tx = sample_tx();
        let id = tx_id(&tx);

        tx.witnesses[0] = vec![0xffu8; 96];
        assert_eq!(tx_id(&tx), id);

        tx.outputs[0].value = 26;
        assert_ne!(tx_id(&tx), id);
    }

    #[test]
    fn test_input_from_output() {
        let tx = sample_tx();
        let id = tx_id(&tx);

        let input = input_from_output(&tx, 1, id).unwrap();
        assert_eq!(input.prevout, OutPoint::new(id, 1));
        assert_eq!(input.prevout_data, tx.outputs[1]);

        assert!(input_from_output(&tx, 2, id).is_none());
    }

    #[test]
    fn test_compact_from_full() {
        let tx = sample_tx();
        let compact = CompactTx::from_full(&tx);

        assert_eq!(compact.id, tx_id(&tx));
        assert_eq!(compact.inputs.len(), 1);
        assert_eq!(compact.outputs.len(), 2);
        assert_eq!(
            compact.outputs[0].id,
            uhs_id_from_output(&compact.id, 0, &tx.outputs[0])
        );
        assert_eq!(compact.inputs[0].value, 40);
        assert!(compact.attestations.is_empty());
    }

    #[test]
    fn test_compact_equality_is_by_id() {
        let tx = sample_tx();
        let mut a = CompactTx::from_full(&tx);
        let b = CompactTx::from_full(&tx);

        let secp = Secp256k1::new();
        a.insert_attestation(a.sign(&secp, &secret(1)));
        assert_eq!(a, b);
    }

    #[test]
    fn test_attestation_roundtrip() {
        let secp = Secp256k1::new();
        let compact = CompactTx::from_full(&sample_tx());

        let att = compact.sign(&secp, &secret(7));
        assert!(compact.verify(&secp, &att));

        // A different signer produces a different, still valid attestation
        let other = compact.sign(&secp, &secret(8));
        assert_ne!(att.pubkey, other.pubkey);
        assert!(compact.verify(&secp, &other));

        // Tampering with the signature must fail verification
        let mut bad = att;
        bad.signature[0] ^= 0x01;
        assert!(!compact.verify(&secp, &bad));
    }

    #[test]
    fn test_sighash_excludes_attestations() {
        let secp = Secp256k1::new();
        let mut compact = CompactTx::from_full(&sample_tx());
        let before = compact.sighash();

        compact.insert_attestation(compact.sign(&secp, &secret(3)));
        assert_eq!(compact.sighash(), before);
    }

    #[test]
    fn test_duplicate_attestations_overwrite() {
        let secp = Secp256k1::new();
        let mut compact = CompactTx::from_full(&sample_tx());

        let att = compact.sign(&secp, &secret(5));
        compact.insert_attestation(att);
        compact.insert_attestation(att);
        assert_eq!(compact.attestations.len(), 1);
    }

    #[test]
    fn test_compact_tx_json_roundtrip() {
        let secp = Secp256k1::new();
        let mut compact = CompactTx::from_full(&sample_tx());
        compact.insert_attestation(compact.sign(&secp, &secret(2)));

        let encoded = serde_json::to_string(&compact).unwrap();
        let decoded: CompactTx = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.id, compact.id);
        assert_eq!(decoded.attestations, compact.attestations);
        assert_eq!(decoded.inputs, compact.inputs);
    }
}
