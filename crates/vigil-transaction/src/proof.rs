//! Pedersen value commitments and their range proofs.
//!
//! Commitments are homomorphic: the sum of the commitments to a set of values
//! commits to the sum of the values, which is what the conservation audit
//! relies on. The range proof guarantees a committed value lies in
//! `[0, 2^RANGE_BITS)`, so sums cannot be gamed by overflow.

use bulletproofs::BulletproofGens;
use bulletproofs::PedersenGens;
use bulletproofs::RangeProof;
use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use merlin::Transcript;
use thiserror::Error;
use vigil_common::Hash;

/// A compressed Ristretto point committing to a value
pub type Commitment = [u8; 32];

/// Size in bytes of a serialized [Commitment]
pub const COMMITMENT_SIZE: usize = 32;

/// Bit width covered by range proofs
pub const RANGE_BITS: usize = 64;

const TRANSCRIPT_LABEL: &[u8] = b"vigil.range-proof.v1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("range proof could not be parsed")]
    MalformedProof,
    #[error("commitment is not a valid curve point")]
    MalformedCommitment,
    #[error("range proof rejected")]
    InvalidProof,
    #[error("proving failed: {0}")]
    Proving(String),
}

struct Generators {
    pedersen: PedersenGens,
    bulletproof: BulletproofGens,
}

fn generators() -> &'static Generators {
    use std::sync::OnceLock;
    static GENERATORS: OnceLock<Generators> = OnceLock::new();
    GENERATORS.get_or_init(|| Generators {
        pedersen: PedersenGens::default(),
        bulletproof: BulletproofGens::new(RANGE_BITS, 1),
    })
}

/// Commits to `value` under the given blinding factor
pub fn commit(value: u64, blind: &Hash) -> Commitment {
    let blinding = Scalar::from_bytes_mod_order(*blind);
    generators()
        .pedersen
        .commit(Scalar::from(value), blinding)
        .compress()
        .to_bytes()
}

/// Produces a range proof for `value` and the commitment it verifies against
pub fn prove(value: u64, blind: &Hash) -> Result<(Vec<u8>, Commitment), ProofError> {
    let gens = generators();
    let blinding = Scalar::from_bytes_mod_order(*blind);
    let mut transcript = Transcript::new(TRANSCRIPT_LABEL);

    let (proof, committed) = RangeProof::prove_single(
        &gens.bulletproof,
        &gens.pedersen,
        &mut transcript,
        value,
        &blinding,
        RANGE_BITS,
    )
    .map_err(|e| ProofError::Proving(format!("{e:?}")))?;

    Ok((proof.to_bytes(), committed.to_bytes()))
}

/// Verifies that `proof` proves `commitment` commits to an in-range value
pub fn check_range(commitment: &Commitment, proof: &[u8]) -> Result<(), ProofError> {
    let gens = generators();
    let parsed = RangeProof::from_bytes(proof).map_err(|_| ProofError::MalformedProof)?;
    let committed = CompressedRistretto(*commitment);
    let mut transcript = Transcript::new(TRANSCRIPT_LABEL);

    parsed
        .verify_single(
            &gens.bulletproof,
            &gens.pedersen,
            &mut transcript,
            &committed,
            RANGE_BITS,
        )
        .map_err(|_| ProofError::InvalidProof)
}

/// Sums a set of commitments with elliptic point addition. Returns `None` if
/// any commitment fails to decompress. The operation is commutative, so the
/// result does not depend on input order.
pub fn sum_commitments(commitments: &[Commitment]) -> Option<Commitment> {
    let mut sum = RistrettoPoint::identity();
    for commitment in commitments {
        let point = CompressedRistretto(*commitment).decompress()?;
        sum += point;
    }
    Some(sum.compress().to_bytes())
}
