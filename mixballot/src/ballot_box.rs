use crate::*;
use indexmap::IndexMap;

/// Encrypted ballots of an election, keyed by voter and kept in casting order
///
/// A voter casting again replaces their ballot in place, so the position of a
/// voter is fixed by their first vote.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct EncryptedBallots {
    ballots: IndexMap<String, Ciphertexts>,
}

impl EncryptedBallots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cast or update the ballot of a voter
    pub fn cast_vote(&mut self, user_id: &str, ballot: Ciphertexts) {
        self.ballots.insert(user_id.to_string(), ballot);
    }

    /// Get a copy of the ballot of a voter
    pub fn get_ballot(&self, user_id: &str) -> Option<Ciphertexts> {
        self.ballots.get(user_id).cloned()
    }

    /// Remove the ballot of a voter, returning false if they never voted
    pub fn delete_voter(&mut self, user_id: &str) -> bool {
        self.ballots.shift_remove(user_id).is_some()
    }

    /// Voter ids, in casting order
    pub fn user_ids(&self) -> Vec<String> {
        self.ballots.keys().cloned().collect()
    }

    /// Ballots, index-aligned with `user_ids`
    pub fn ballots(&self) -> Vec<Ciphertexts> {
        self.ballots.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ballots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ballots.is_empty()
    }
}
