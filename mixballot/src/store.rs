use crate::*;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, info};

/// A value of the store and the key it is stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// An append-only transaction store
pub trait Store: Send + Sync {
    /// Get the value stored under a key
    fn get_proof(&self, key: &[u8]) -> Result<Option<Proof>, Error>;

    /// Validate and apply a transaction
    fn submit(&self, tx: Transaction) -> Result<(), Error>;

    /// Get an election from its hex encoded ID
    fn get_election(&self, election_id: &str) -> Result<Election, Error> {
        let key = hex::decode(election_id).map_err(|_| Error::IdentifierBadHex)?;

        let proof = self
            .get_proof(&key)
            .map_err(|e| Error::Store(e.to_string()))?
            .filter(|proof| !proof.value.is_empty())
            .ok_or_else(|| Error::NotFound(election_id.to_string()))?;

        let election = Election::from_bytes(&proof.value)?;
        if election.election_id != election_id {
            return Err(Error::IdentifierMismatch {
                expected: election_id.to_string(),
                found: election.election_id,
            });
        }

        Ok(election)
    }
}

/// A simple store that keeps elections in an in-memory BTreeMap
///
/// Transactions are applied one at a time.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<MemStoreInner>,
}

#[derive(Default)]
struct MemStoreInner {
    roster: Roster,
    values: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    /// New store for a network made of `roster`
    pub fn new(roster: Roster) -> Self {
        MemStore {
            inner: Mutex::new(MemStoreInner {
                roster,
                values: BTreeMap::new(),
            }),
        }
    }

    /// Store an election as-is, bypassing validation
    pub fn set_election(&self, election: &Election) -> Result<(), Error> {
        let key = hex::decode(&election.election_id).map_err(|_| Error::IdentifierBadHex)?;
        let value = election.to_bytes()?;
        self.lock().values.insert(key, value);
        Ok(())
    }

    /// Store a raw value, bypassing validation
    pub fn set(&self, key: Vec<u8>, value: Vec<u8>) {
        self.lock().values.insert(key, value);
    }

    pub fn roster(&self) -> Roster {
        self.lock().roster.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<MemStoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store for MemStore {
    fn get_proof(&self, key: &[u8]) -> Result<Option<Proof>, Error> {
        Ok(self.lock().values.get(key).map(|value| Proof {
            key: key.to_vec(),
            value: value.clone(),
        }))
    }

    fn submit(&self, tx: Transaction) -> Result<(), Error> {
        let election_id = tx.election_id()?;
        let key = hex::decode(&election_id).map_err(|_| Error::IdentifierBadHex)?;

        let mut inner = self.lock();
        let current = match inner.values.get(&key) {
            Some(value) => Some(Election::from_bytes(value)?),
            None => None,
        };

        let election = tx.apply(&inner.roster, current).map_err(|e| {
            debug!(election = %election_id, error = %e, "transaction rejected");
            e
        })?;
        info!(
            election = %election_id,
            status = %election.status,
            round = election.round(),
            "transaction applied"
        );

        inner.values.insert(key, election.to_bytes()?);
        Ok(())
    }
}
