//! Deterministic helpers for building valid transactions in tests. Only
//! compiled with the `test-utils` feature; nothing here is wired into
//! production paths.

use secp256k1::All;
use secp256k1::Keypair;
use secp256k1::Message;
use secp256k1::Secp256k1;
use secp256k1::SecretKey;
use secp256k1::XOnlyPublicKey;
use vigil_common::sha256;

use crate::tx_id;
use crate::FullTx;
use crate::Input;
use crate::OutPoint;
use crate::Output;
use crate::PubKey;

/// A deterministic secret key derived from a one-byte seed
pub fn secret(seed: u8) -> SecretKey {
    SecretKey::from_slice(&sha256(&[seed])).expect("hash output is a valid scalar")
}

/// The x-only public key for a seed's secret key
pub fn pubkey(secp: &Secp256k1<All>, key: &SecretKey) -> PubKey {
    let keypair = Keypair::from_secret_key(secp, key);
    XOnlyPublicKey::from_keypair(&keypair).0.serialize()
}

/// The witness program commitment of an output spendable by `key`
pub fn p2pk_commitment(secp: &Secp256k1<All>, key: &SecretKey) -> [u8; 32] {
    sha256(&pubkey(secp, key))
}

/// Builds a balanced, fully signed transaction that mints `values` into
/// outputs owned by `key`. The single input is fabricated from seed entropy,
/// the way minting wallets seed value into the system.
pub fn mint_tx(secp: &Secp256k1<All>, key: &SecretKey, seed: u8, values: &[u64]) -> FullTx {
    let owner = p2pk_commitment(secp, key);
    let total = values.iter().sum();

    let mut entropy = *b"mint-entropy-000000000000000000\0";
    entropy[31] = seed;

    let mut tx = FullTx {
        inputs: vec![Input {
            prevout: OutPoint::new(entropy, 0),
            prevout_data: Output::new(owner, total),
        }],
        outputs: values
            .iter()
            .map(|value| Output::new(owner, *value))
            .collect(),
        witnesses: Vec::new(),
    };
    sign_inputs(secp, &mut tx, key);
    tx
}

/// Builds a signed transaction spending output `index` of `prev` into
/// `values`, all owned by `key`
pub fn spend_tx(secp: &Secp256k1<All>, prev: &FullTx, index: u64, key: &SecretKey, values: &[u64]) -> FullTx {
    let prev_id = tx_id(prev);
    let input = crate::input_from_output(prev, index, prev_id).expect("index in range");
    let owner = p2pk_commitment(secp, key);

    let mut tx = FullTx {
        inputs: vec![input],
        outputs: values
            .iter()
            .map(|value| Output::new(owner, *value))
            .collect(),
        witnesses: Vec::new(),
    };
    sign_inputs(secp, &mut tx, key);
    tx
}

/// Replaces the witness stack with one valid P2PK witness per input, all
/// signed by `key`
pub fn sign_inputs(secp: &Secp256k1<All>, tx: &mut FullTx, key: &SecretKey) {
    let keypair = Keypair::from_secret_key(secp, key);
    let owner = pubkey(secp, key);
    let msg = Message::from_digest(tx_id(tx));
    let sig = secp.sign_schnorr_no_aux_rand(&msg, &keypair);

    let mut witness = owner.to_vec();
    witness.extend_from_slice(&sig.serialize());
    tx.witnesses = vec![witness; tx.inputs.len()];
}
