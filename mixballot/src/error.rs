use crate::Status;
use thiserror::Error;

/// Errors converting between stored ciphertexts and curve points
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CiphertextError {
    #[error("mixballot: ciphertext {0} does not decode to a pair of curve points")]
    DecodeError(usize),

    #[error("mixballot: length mismatch: {0} != {1}")]
    LengthMismatch(usize, usize),

    #[error("mixballot: ballot of {0} bytes does not fit in {1} chunks")]
    BallotTooLarge(usize, usize),

    #[error("mixballot: unable to embed {0} bytes into a curve point")]
    EmbedFailed(usize),

    #[error("mixballot: curve point does not carry embedded data")]
    ExtractFailed,
}

/// Errors decoding the text wire format of a ballot
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BallotError {
    #[error("mixballot: ballot has an unexpected size {size}, expected <= {max}")]
    OversizeBallot { size: usize, max: usize },

    #[error("mixballot: ballot record {0:?} does not have exactly 3 fields")]
    MalformedRecord(String),

    #[error("mixballot: unknown question kind {0:?}")]
    UnknownQuestionKind(String),

    #[error("mixballot: could not parse value {value:?} for question {question}")]
    InvalidValue { question: String, value: String },
}

/// Errors producing or checking a proof of shuffle
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShuffleError {
    #[error("mixballot: unknown suite {0:?}")]
    UnknownSuite(String),

    #[error("mixballot: shuffle proof is invalid")]
    ProofInvalid,

    #[error("mixballot: nothing to shuffle")]
    Empty,

    #[error("mixballot: shuffle failed: {0}")]
    Crypto(String),

    #[error("mixballot: shuffle input is malformed: {0}")]
    Ciphertext(#[from] CiphertextError),
}

/// Transaction validation errors, raised by the store when applying a transaction
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("mixballot validation: election {0} does not exist")]
    ElectionNotFound(String),

    #[error("mixballot validation: election {0} already exists")]
    ElectionExists(String),

    #[error("mixballot validation: election is {found:?}, expected {expected:?}")]
    WrongStatus { expected: Status, found: Status },

    #[error("mixballot validation: election is already in terminal status {0:?}")]
    TerminalStatus(Status),

    #[error("mixballot validation: user {0} is not the election admin")]
    NotAdmin(String),

    #[error("mixballot validation: the roster is empty")]
    EmptyRoster,

    #[error("mixballot validation: ballot has {found} chunks, expected {expected}")]
    WrongChunkCount { expected: usize, found: usize },

    #[error("mixballot validation: stale shuffle round {found}, expected {expected}")]
    StaleRound { expected: usize, found: usize },

    #[error("mixballot validation: at least two ballots are required, found {0}")]
    NotEnoughBallots(usize),

    #[error("mixballot validation: shuffler is not a member of the roster")]
    NotInRoster,

    #[error("mixballot validation: node already shuffled this election")]
    AlreadyShuffled,

    #[error("mixballot validation: shuffled {found} ballots, expected {expected}")]
    WrongBallotCount { expected: usize, found: usize },

    #[error("mixballot validation: invalid election public key")]
    InvalidPublicKey,

    #[error("mixballot validation: signature error: {0}")]
    SignatureError(#[from] ed25519_dalek::SignatureError),

    #[error("mixballot validation: {0}")]
    Ciphertext(#[from] CiphertextError),

    #[error("mixballot validation: {0}")]
    Shuffle(#[from] ShuffleError),

    #[error("mixballot validation: {0}")]
    Ballot(#[from] BallotError),

    #[error("mixballot validation: encoding error: {0}")]
    Encoding(String),
}

/// Errors surfaced by the store, the coordinator and the responder
#[derive(Debug, Error)]
pub enum Error {
    #[error("mixballot: election {0} does not exist")]
    NotFound(String),

    #[error("mixballot: election id mismatch: {expected:?} != {found:?}")]
    IdentifierMismatch { expected: String, found: String },

    #[error("mixballot: invalid identifier - invalid hexidecimal")]
    IdentifierBadHex,

    #[error("mixballot: the roster is empty")]
    EmptyRoster,

    #[error("mixballot: failed to start shuffle: {0}")]
    BroadcastError(String),

    #[error("mixballot: network: {0}")]
    Network(String),

    #[error("mixballot: threshold of shuffling not reached: {round} < {threshold}")]
    ThresholdNotReached { round: usize, threshold: usize },

    #[error("mixballot: failed to get election: {0}")]
    Store(String),

    #[error("mixballot: CBOR error: {0}")]
    CBORDeserialization(#[from] serde_cbor::Error),

    #[error("mixballot: JSON error: {0}")]
    JSONDeserialization(#[from] serde_json::Error),

    #[error("mixballot: empty payload")]
    EmptyPayload,

    #[error("mixballot: invalid configuration value for {0}: {1}")]
    Config(&'static str, String),

    #[error("mixballot: transaction rejected: {0}")]
    Rejected(#[from] ValidationError),

    #[error("mixballot: {0}")]
    Ciphertext(#[from] CiphertextError),

    #[error("mixballot: {0}")]
    Shuffle(#[from] ShuffleError),

    #[error("mixballot: {0}")]
    Ballot(#[from] BallotError),
}
