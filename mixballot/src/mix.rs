//! Verifiable re-encryption shuffle of ElGamal ciphertext sequences.
//!
//! Matrices are indexed `[column][ballot]`: every column holds the i-th chunk
//! of each ballot, and all columns are shuffled with the same permutation.
//! Shuffling and proving is done by cryptid, the points are carried across as
//! compressed Ristretto encodings.

use crate::*;
use cryptid::commit::PedersenCtx;
use cryptid::elgamal::Ciphertext as ElGamalCiphertext;
use cryptid::elgamal::CurveElem;
use cryptid::elgamal::PublicKey as EncryptionPublicKey;
use cryptid::shuffle::{Shuffle, ShuffleProof};
use cryptid::util::AsBase64;
use curve25519_dalek::ristretto::CompressedRistretto;
use rand_core::{CryptoRng, RngCore};

/// Name of the only suite supported
pub const SHUFFLE_SUITE: &str = "Ristretto255";

/// Domain label every Pedersen seed starts with
pub const PROTOCOL_LABEL: &[u8] = b"PairShuffle";

/// A cryptographic suite a shuffle can be verified with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suite {
    Ristretto255,
}

impl Suite {
    /// Look up a suite by name, ignoring case
    pub fn find(name: &str) -> Result<Suite, ShuffleError> {
        if name.eq_ignore_ascii_case(SHUFFLE_SUITE) {
            Ok(Suite::Ristretto255)
        } else {
            Err(ShuffleError::UnknownSuite(name.to_string()))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Suite::Ristretto255 => SHUFFLE_SUITE,
        }
    }
}

/// Output of a shuffle: the shuffled columns and the CBOR encoded proof
#[derive(Debug, Clone)]
pub struct SequenceShuffle {
    pub ks: Vec<Vec<Point>>,
    pub cs: Vec<Vec<Point>>,
    pub proof: Vec<u8>,
}

/// Shuffle and re-randomize a single sequence of ciphertexts
pub fn shuffle<R: RngCore + CryptoRng>(
    rng: &mut R,
    pubkey: &Point,
    ks: &[Point],
    cs: &[Point],
) -> Result<(Vec<Point>, Vec<Point>, Vec<u8>), ShuffleError> {
    let mut shuffled = shuffle_sequences(rng, pubkey, &[ks.to_vec()], &[cs.to_vec()])?;
    let ks = shuffled.ks.remove(0);
    let cs = shuffled.cs.remove(0);
    Ok((ks, cs, shuffled.proof))
}

/// Verify the shuffle of a single sequence of ciphertexts
pub fn verify(
    suite: &str,
    ks: &[Point],
    cs: &[Point],
    pubkey: &Point,
    ks_shuffled: &[Point],
    cs_shuffled: &[Point],
    proof: &[u8],
) -> Result<(), ShuffleError> {
    verify_sequences(
        suite,
        &[ks.to_vec()],
        &[cs.to_vec()],
        pubkey,
        &[ks_shuffled.to_vec()],
        &[cs_shuffled.to_vec()],
        proof,
    )
}

/// Shuffle all columns with one fresh permutation and prove it
///
/// This is an expensive operation, async callers should run it on a blocking thread.
pub fn shuffle_sequences<R: RngCore + CryptoRng>(
    rng: &mut R,
    pubkey: &Point,
    ks: &[Vec<Point>],
    cs: &[Vec<Point>],
) -> Result<SequenceShuffle, ShuffleError> {
    let (n, _) = shape(ks, cs).map_err(|e| match e {
        ShapeError::Empty => ShuffleError::Empty,
        ShapeError::Mismatch(a, b) => CiphertextError::LengthMismatch(a, b).into(),
    })?;

    let encryption_key = encryption_key(pubkey)?;
    let seed = pedersen_seed(Suite::Ristretto255, pubkey);
    let (commit_ctx, generators) = PedersenCtx::with_generators(&seed, n);

    let shuffle = Shuffle::new(rng, to_ciphertexts(ks, cs)?, &encryption_key)
        .map_err(|e| ShuffleError::Crypto(e.to_string()))?;
    let proof = shuffle
        .gen_proof(rng, &commit_ctx, &generators, &encryption_key)
        .map_err(|e| ShuffleError::Crypto(e.to_string()))?;
    let proof = serde_cbor::to_vec(&proof).map_err(|e| ShuffleError::Crypto(e.to_string()))?;

    let (ks, cs) = from_ciphertexts(shuffle.into_outputs())?;
    Ok(SequenceShuffle { ks, cs, proof })
}

/// Verify that the shuffled columns are a re-randomized permutation of the input columns
pub fn verify_sequences(
    suite: &str,
    ks: &[Vec<Point>],
    cs: &[Vec<Point>],
    pubkey: &Point,
    ks_shuffled: &[Vec<Point>],
    cs_shuffled: &[Vec<Point>],
    proof: &[u8],
) -> Result<(), ShuffleError> {
    let suite = Suite::find(suite)?;

    let (n, w) = shape(ks, cs).map_err(|e| match e {
        ShapeError::Empty => ShuffleError::Empty,
        ShapeError::Mismatch(..) => ShuffleError::ProofInvalid,
    })?;
    match shape(ks_shuffled, cs_shuffled) {
        Ok(shuffled) if shuffled == (n, w) => {}
        _ => return Err(ShuffleError::ProofInvalid),
    }

    let proof: ShuffleProof =
        serde_cbor::from_slice(proof).map_err(|_| ShuffleError::ProofInvalid)?;
    let encryption_key = encryption_key(pubkey).map_err(|_| ShuffleError::ProofInvalid)?;
    let input = to_ciphertexts(ks, cs).map_err(|_| ShuffleError::ProofInvalid)?;
    let output = to_ciphertexts(ks_shuffled, cs_shuffled).map_err(|_| ShuffleError::ProofInvalid)?;

    let seed = pedersen_seed(suite, pubkey);
    let (commit_ctx, generators) = PedersenCtx::with_generators(&seed, n);

    if !proof.verify(&commit_ctx, &generators, &input, &output, &encryption_key) {
        return Err(ShuffleError::ProofInvalid);
    }

    Ok(())
}

enum ShapeError {
    Empty,
    Mismatch(usize, usize),
}

// Returns (ballots, columns) of a rectangular, non-empty matrix pair
fn shape(ks: &[Vec<Point>], cs: &[Vec<Point>]) -> Result<(usize, usize), ShapeError> {
    if ks.len() != cs.len() {
        return Err(ShapeError::Mismatch(ks.len(), cs.len()));
    }
    let w = ks.len();
    let n = ks.first().map(Vec::len).unwrap_or(0);
    if w == 0 || n == 0 {
        return Err(ShapeError::Empty);
    }
    for column in ks.iter().chain(cs.iter()) {
        if column.len() != n {
            return Err(ShapeError::Mismatch(column.len(), n));
        }
    }
    Ok((n, w))
}

// Generators are bound to the suite and the election key
fn pedersen_seed(suite: Suite, pubkey: &Point) -> Vec<u8> {
    let mut seed = PROTOCOL_LABEL.to_vec();
    seed.extend_from_slice(suite.name().as_bytes());
    seed.extend_from_slice(pubkey.compress().as_bytes());

    seed
}

fn encryption_key(pubkey: &Point) -> Result<EncryptionPublicKey, ShuffleError> {
    EncryptionPublicKey::try_from_base64(&base64::encode(pubkey.compress().as_bytes()))
        .map_err(|e| ShuffleError::Crypto(e.to_string()))
}

fn to_curve_elem(point: &Point) -> Result<CurveElem, ShuffleError> {
    CurveElem::try_from_base64(&base64::encode(point.compress().as_bytes()))
        .map_err(|e| ShuffleError::Crypto(e.to_string()))
}

fn from_curve_elem(elem: &CurveElem) -> Result<Point, ShuffleError> {
    let bytes = base64::decode(elem.as_base64())
        .map_err(|e| ShuffleError::Crypto(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(ShuffleError::Crypto(format!(
            "point encoding is {} bytes",
            bytes.len()
        )));
    }
    CompressedRistretto::from_slice(&bytes)
        .decompress()
        .ok_or_else(|| ShuffleError::Crypto("point does not decompress".to_string()))
}

fn to_ciphertexts(
    ks: &[Vec<Point>],
    cs: &[Vec<Point>],
) -> Result<Vec<Vec<ElGamalCiphertext>>, ShuffleError> {
    ks.iter()
        .zip(cs)
        .map(|(k_column, c_column)| {
            k_column
                .iter()
                .zip(c_column)
                .map(|(k, c)| {
                    Ok(ElGamalCiphertext {
                        c1: to_curve_elem(k)?,
                        c2: to_curve_elem(c)?,
                    })
                })
                .collect()
        })
        .collect()
}

fn from_ciphertexts(
    columns: Vec<Vec<ElGamalCiphertext>>,
) -> Result<(Vec<Vec<Point>>, Vec<Vec<Point>>), ShuffleError> {
    let mut ks = Vec::with_capacity(columns.len());
    let mut cs = Vec::with_capacity(columns.len());
    for column in columns {
        let mut k_column = Vec::with_capacity(column.len());
        let mut c_column = Vec::with_capacity(column.len());
        for ciphertext in &column {
            k_column.push(from_curve_elem(&ciphertext.c1)?);
            c_column.push(from_curve_elem(&ciphertext.c2)?);
        }
        ks.push(k_column);
        cs.push(c_column);
    }
    Ok((ks, cs))
}
