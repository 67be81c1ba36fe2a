use crate::CiphertextError;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_TABLE;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand_core::{CryptoRng, RngCore};
use std::convert::TryInto;
use std::ops::Deref;

/// A group element of the Ristretto255 suite
pub type Point = RistrettoPoint;

/// Maximum number of bytes a single curve point can carry
pub const EMBED_LEN: usize = 29;

const EMBED_ATTEMPTS: usize = 1000;

/// An ElGamal ciphertext: `K = r*G` and `C = M + r*Y` for public key `Y`
///
/// Both points are kept in their compressed form, exactly as they travel in
/// transactions, and are only decoded when needed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ciphertext {
    #[serde(with = "hex")]
    pub k: Vec<u8>,

    #[serde(with = "hex")]
    pub c: Vec<u8>,
}

impl Ciphertext {
    /// Build a ciphertext from its two points
    pub fn from_point_pair(k: &Point, c: &Point) -> Self {
        Ciphertext {
            k: k.compress().to_bytes().to_vec(),
            c: c.compress().to_bytes().to_vec(),
        }
    }

    /// Encrypt a message point under the given public key
    pub fn encrypt<R: RngCore + CryptoRng>(rng: &mut R, pubkey: &Point, message: &Point) -> Self {
        let r = Scalar::random(rng);
        let k = &r * &RISTRETTO_BASEPOINT_TABLE;
        let c = message + r * pubkey;
        Ciphertext::from_point_pair(&k, &c)
    }

    /// Decode `(K, C)`, returning None if either half is not a valid point
    pub fn points(&self) -> Option<(Point, Point)> {
        Some((decode_point(&self.k)?, decode_point(&self.c)?))
    }
}

/// Decode a canonical compressed Ristretto point
pub fn decode_point(bytes: &[u8]) -> Option<Point> {
    let bytes: [u8; 32] = bytes.try_into().ok()?;
    CompressedRistretto(bytes).decompress()
}

/// An ordered list of ciphertexts, one per chunk of a ballot
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Ciphertexts(pub Vec<Ciphertext>);

impl Ciphertexts {
    /// Split the list into its `K` and `C` points
    pub fn points_of(&self) -> Result<(Vec<Point>, Vec<Point>), CiphertextError> {
        let mut ks = Vec::with_capacity(self.0.len());
        let mut cs = Vec::with_capacity(self.0.len());

        for (i, ciphertext) in self.0.iter().enumerate() {
            let (k, c) = ciphertext
                .points()
                .ok_or(CiphertextError::DecodeError(i))?;
            ks.push(k);
            cs.push(c);
        }

        Ok((ks, cs))
    }

    /// Build a list from index-aligned `K` and `C` points
    pub fn from_points(ks: &[Point], cs: &[Point]) -> Result<Self, CiphertextError> {
        if ks.len() != cs.len() {
            return Err(CiphertextError::LengthMismatch(ks.len(), cs.len()));
        }

        Ok(Ciphertexts(
            ks.iter()
                .zip(cs.iter())
                .map(|(k, c)| Ciphertext::from_point_pair(k, c))
                .collect(),
        ))
    }
}

impl Deref for Ciphertexts {
    type Target = [Ciphertext];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Ciphertext>> for Ciphertexts {
    fn from(item: Vec<Ciphertext>) -> Self {
        Ciphertexts(item)
    }
}

/// Number of chunks needed to carry a ballot of `ballot_size` bytes
pub fn chunks_per_ballot(ballot_size: usize) -> usize {
    std::cmp::max(1, (ballot_size + EMBED_LEN - 1) / EMBED_LEN)
}

/// Embed up to `EMBED_LEN` bytes into a curve point.
///
/// The first encoding byte holds the data length (shifted left by one so the
/// encoding stays non-negative), followed by the data and random filler. Random
/// filler is redrawn until the encoding is a valid point.
pub fn embed<R: RngCore + CryptoRng>(rng: &mut R, data: &[u8]) -> Result<Point, CiphertextError> {
    if data.len() > EMBED_LEN {
        return Err(CiphertextError::EmbedFailed(data.len()));
    }

    for _ in 0..EMBED_ATTEMPTS {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        bytes[0] = (data.len() as u8) << 1;
        bytes[1..1 + data.len()].copy_from_slice(data);
        bytes[31] &= 0x7f;

        if let Some(point) = CompressedRistretto(bytes).decompress() {
            return Ok(point);
        }
    }

    Err(CiphertextError::EmbedFailed(data.len()))
}

/// Recover the bytes embedded with [`embed`]
pub fn extract(point: &Point) -> Result<Vec<u8>, CiphertextError> {
    let bytes = point.compress().to_bytes();
    let len = (bytes[0] >> 1) as usize;
    if bytes[0] & 1 != 0 || len > EMBED_LEN {
        return Err(CiphertextError::ExtractFailed);
    }
    Ok(bytes[1..1 + len].to_vec())
}

/// Encrypt a plaintext ballot into exactly `chunks` ciphertexts.
///
/// Every ballot of an election is padded to the same number of chunks so
/// that the ciphertext length does not leak the answers.
pub fn encrypt_ballot<R: RngCore + CryptoRng>(
    rng: &mut R,
    pubkey: &Point,
    plaintext: &[u8],
    chunks: usize,
) -> Result<Ciphertexts, CiphertextError> {
    if plaintext.len() > chunks * EMBED_LEN {
        return Err(CiphertextError::BallotTooLarge(plaintext.len(), chunks));
    }

    let mut ciphertexts = Vec::with_capacity(chunks);
    for i in 0..chunks {
        let start = std::cmp::min(i * EMBED_LEN, plaintext.len());
        let end = std::cmp::min(start + EMBED_LEN, plaintext.len());
        let message = embed(rng, &plaintext[start..end])?;
        ciphertexts.push(Ciphertext::encrypt(rng, pubkey, &message));
    }

    Ok(Ciphertexts(ciphertexts))
}

/// Convert a list of ballots (rows) into per-chunk columns of `K` and `C` points.
///
/// All ballots must have the same number of chunks.
pub fn ballots_to_columns(
    ballots: &[Ciphertexts],
) -> Result<(Vec<Vec<Point>>, Vec<Vec<Point>>), CiphertextError> {
    let width = ballots.first().map(|b| b.len()).unwrap_or(0);
    let mut ks = vec![Vec::with_capacity(ballots.len()); width];
    let mut cs = vec![Vec::with_capacity(ballots.len()); width];

    for ballot in ballots {
        if ballot.len() != width {
            return Err(CiphertextError::LengthMismatch(ballot.len(), width));
        }

        let (ballot_ks, ballot_cs) = ballot.points_of()?;
        for (column, (k, c)) in ballot_ks.into_iter().zip(ballot_cs).enumerate() {
            ks[column].push(k);
            cs[column].push(c);
        }
    }

    Ok((ks, cs))
}

/// Inverse of [`ballots_to_columns`]
pub fn columns_to_ballots(
    ks: &[Vec<Point>],
    cs: &[Vec<Point>],
) -> Result<Vec<Ciphertexts>, CiphertextError> {
    if ks.len() != cs.len() {
        return Err(CiphertextError::LengthMismatch(ks.len(), cs.len()));
    }

    let rows = ks.first().map(|column| column.len()).unwrap_or(0);
    for (k_column, c_column) in ks.iter().zip(cs) {
        if k_column.len() != rows || c_column.len() != rows {
            return Err(CiphertextError::LengthMismatch(k_column.len(), c_column.len()));
        }
    }

    (0..rows)
        .map(|row| {
            let row_ks: Vec<Point> = ks.iter().map(|column| column[row]).collect();
            let row_cs: Vec<Point> = cs.iter().map(|column| column[row]).collect();
            Ciphertexts::from_points(&row_ks, &row_cs)
        })
        .collect()
}
