use crate::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Lifecycle of an election
///
/// Code 4 was used by a status that no longer exists and is never reused.
#[derive(
    Serialize, Deserialize, TryFromPrimitive, IntoPrimitive, Copy, Debug, Clone, PartialEq, Eq, Hash,
)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum Status {
    Initial = 0,
    Open = 1,
    Closed = 2,
    ShuffledBallots = 3,
    ResultAvailable = 5,
    Canceled = 6,
}

impl Status {
    /// No transaction can change the election anymore
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::ResultAvailable | Status::Canceled)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Status::Initial => "Initial",
            Status::Open => "Open",
            Status::Closed => "Closed",
            Status::ShuffledBallots => "ShuffledBallots",
            Status::ResultAvailable => "ResultAvailable",
            Status::Canceled => "Canceled",
        };
        write!(f, "{}", name)
    }
}

/// One round of shuffling, as committed by a roster member
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ShuffleInstance {
    pub shuffled_ballots: Vec<Ciphertexts>,

    #[serde(with = "hex")]
    pub shuffle_proofs: Vec<u8>,

    #[serde(with = "hex")]
    pub shuffler_public_key: Vec<u8>,
}

/// State of an election, as kept in the store
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Election {
    pub configuration: Configuration,

    /// Hex encoded SHA-256 of the id of the transaction that created the election
    pub election_id: String,

    pub admin_id: String,

    pub status: Status,

    /// Election public key, a compressed Ristretto point. Empty until the election is opened.
    #[serde(with = "hex")]
    pub pubkey: Vec<u8>,

    /// Maximum size in bytes of an encoded ballot
    pub ballot_size: usize,

    pub encrypted_ballots: EncryptedBallots,

    pub shuffle_instances: Vec<ShuffleInstance>,

    /// Number of shuffles needed before ballots can be decrypted
    pub shuffle_threshold: usize,

    pub decrypted_ballots: Vec<Ballot>,

    /// Roster at creation time, CBOR encoded
    #[serde(with = "hex")]
    pub roster_buf: Vec<u8>,
}

impl Election {
    /// Create an election in the Initial state for the given roster
    pub fn new(
        election_id: String,
        configuration: Configuration,
        admin_id: String,
        roster: &Roster,
    ) -> Result<Self, Error> {
        Ok(Election {
            ballot_size: configuration.max_encoded_size(),
            configuration,
            election_id,
            admin_id,
            status: Status::Initial,
            pubkey: vec![],
            encrypted_ballots: EncryptedBallots::new(),
            shuffle_instances: vec![],
            shuffle_threshold: byzantine_threshold(roster.len()),
            decrypted_ballots: vec![],
            roster_buf: roster.to_bytes()?,
        })
    }

    pub fn roster(&self) -> Result<Roster, Error> {
        Roster::from_bytes(&self.roster_buf)
    }

    /// Election public key, None if not set or invalid
    pub fn public_key(&self) -> Option<Point> {
        decode_point(&self.pubkey)
    }

    /// Number of ciphertexts every ballot is made of
    pub fn chunks_per_ballot(&self) -> usize {
        chunks_per_ballot(self.ballot_size)
    }

    /// Index of the next shuffle round
    pub fn round(&self) -> usize {
        self.shuffle_instances.len()
    }

    pub fn threshold_reached(&self) -> bool {
        self.shuffle_instances.len() >= self.shuffle_threshold
    }

    /// Whether the owner of this key already committed a shuffle
    pub fn has_shuffled(&self, public_key: &[u8]) -> bool {
        self.shuffle_instances
            .iter()
            .any(|instance| instance.shuffler_public_key == public_key)
    }

    /// Ballots the next shuffle must take as input: the output of the last
    /// shuffle, or the cast ballots when nothing has been shuffled yet.
    pub fn shuffle_input(&self) -> Vec<Ciphertexts> {
        match self.shuffle_instances.last() {
            Some(instance) => instance.shuffled_ballots.clone(),
            None => self.encrypted_ballots.ballots(),
        }
    }

    /// Check every committed shuffle against its input
    pub fn verify_shuffles(&self) -> Result<(), Error> {
        let pubkey = self
            .public_key()
            .ok_or(ValidationError::InvalidPublicKey)?;

        let mut input = self.encrypted_ballots.ballots();
        for instance in &self.shuffle_instances {
            let (ks, cs) = ballots_to_columns(&input)?;
            let (ks_shuffled, cs_shuffled) = ballots_to_columns(&instance.shuffled_ballots)?;
            verify_sequences(
                SHUFFLE_SUITE,
                &ks,
                &cs,
                &pubkey,
                &ks_shuffled,
                &cs_shuffled,
                &instance.shuffle_proofs,
            )?;
            input = instance.shuffled_ballots.clone();
        }

        Ok(())
    }

    /// Pack into bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_cbor::to_vec(self)?)
    }

    /// Unpack from bytes, either JSON or CBOR
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        match bytes.first() {
            None => Err(Error::EmptyPayload),
            // If it starts with `{` then it's JSON
            Some(b'{') => Ok(serde_json::from_slice(bytes)?),
            Some(_) => Ok(serde_cbor::from_slice(bytes)?),
        }
    }
}

/// Number of shuffles needed so that at least one honest member shuffled,
/// tolerating up to `(n - 1) / 3` byzantine members
pub fn byzantine_threshold(members: usize) -> usize {
    if members <= 1 {
        members
    } else {
        members - (members - 1) / 3
    }
}
