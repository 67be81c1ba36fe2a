use crate::*;
use rand::rngs::OsRng;
use std::sync::Arc;
use tracing::{debug, info};

/// Answers StartShuffle messages by shuffling the latest committed ballots
pub struct Responder<S: Store> {
    address: Address,
    signer: Arc<dyn Signer>,
    store: Arc<S>,
}

impl<S: Store> Responder<S> {
    pub fn new(address: Address, signer: Arc<dyn Signer>, store: Arc<S>) -> Self {
        Responder {
            address,
            signer,
            store,
        }
    }

    /// Shuffle the election unless the threshold is reached or this node already did.
    ///
    /// Losing a round to another node is retried against the new state, at
    /// most once per roster member. A rejection after which the threshold is
    /// reached anyway is not an error.
    pub fn handle_start_shuffle(&self, election_id: &str) -> Result<(), Error> {
        let public_key = self.signer.public_key();
        let mut retries = 0;

        loop {
            let election = self.store.get_election(election_id)?;

            if election.threshold_reached() {
                debug!(node = %self.address, election = %election_id, "shuffle threshold already reached");
                return Ok(());
            }
            if election.has_shuffled(public_key.as_bytes()) {
                debug!(node = %self.address, election = %election_id, "already shuffled");
                return Ok(());
            }
            if election.status != Status::Closed {
                return Err(ValidationError::WrongStatus {
                    expected: Status::Closed,
                    found: election.status,
                }
                .into());
            }

            let round = election.round();
            let max_retries = election.roster()?.len();
            let tx = self.shuffle(&election)?;

            match self.store.submit(tx) {
                Ok(()) => {
                    info!(node = %self.address, election = %election_id, round, "shuffle committed");
                    return Ok(());
                }
                Err(Error::Rejected(ValidationError::StaleRound { expected, .. }))
                    if retries < max_retries =>
                {
                    debug!(
                        node = %self.address,
                        election = %election_id,
                        round,
                        expected,
                        "round taken by another node, retrying"
                    );
                    retries += 1;
                }
                Err(e) => {
                    if self.store.get_election(election_id)?.threshold_reached() {
                        debug!(
                            node = %self.address,
                            election = %election_id,
                            round,
                            error = %e,
                            "shuffle threshold reached by other nodes"
                        );
                        return Ok(());
                    }
                    return Err(e);
                }
            }
        }
    }

    fn shuffle(&self, election: &Election) -> Result<Transaction, Error> {
        let pubkey = election
            .public_key()
            .ok_or(ValidationError::InvalidPublicKey)?;

        let (ks, cs) = ballots_to_columns(&election.shuffle_input())?;
        let shuffled = shuffle_sequences(&mut OsRng, &pubkey, &ks, &cs)?;
        let shuffled_ballots = columns_to_ballots(&shuffled.ks, &shuffled.cs)?;

        Ok(Transaction::shuffle_ballots(
            self.signer.as_ref(),
            &election.election_id,
            election.round(),
            shuffled_ballots,
            shuffled.proof,
        ))
    }
}

impl<S: Store> MessageHandler for Responder<S> {
    fn process(&self, from: &Address, message: Message) -> Result<(), Error> {
        match message {
            Message::StartShuffle {
                election_id,
                addresses,
            } => {
                info!(
                    node = %self.address,
                    coordinator = %from,
                    election = %election_id,
                    nodes = addresses.len(),
                    "starting shuffle"
                );
                self.handle_start_shuffle(&election_id)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ciphertext::tests::keypair;
    use crate::configuration::tests::sample_configuration;
    use curve25519_dalek::scalar::Scalar;
    use ed25519_dalek::Keypair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    /// A network of `n` nodes sharing one store
    pub(crate) struct Nodes {
        pub keys: Vec<Arc<Keypair>>,
        pub roster: Roster,
        pub store: Arc<MemStore>,
    }

    pub(crate) fn nodes(n: usize, rng: &mut ChaCha20Rng) -> Nodes {
        let keys: Vec<Arc<Keypair>> = (0..n).map(|_| Arc::new(Keypair::generate(rng))).collect();
        let roster = Roster::new(
            keys.iter()
                .enumerate()
                .map(|(i, key)| Member {
                    address: Address(format!("node{}", i)),
                    public_key: key.public,
                })
                .collect(),
        );
        let store = Arc::new(MemStore::new(roster.clone()));
        Nodes {
            keys,
            roster,
            store,
        }
    }

    impl Nodes {
        pub(crate) fn responder(&self, i: usize) -> Responder<MemStore> {
            Responder::new(
                self.roster.members[i].address.clone(),
                self.keys[i].clone(),
                self.store.clone(),
            )
        }
    }

    /// Create, open, fill and close an election, returning its id and secret key
    pub(crate) fn closed_election(
        store: &MemStore,
        voters: usize,
        threshold: Option<usize>,
        rng: &mut ChaCha20Rng,
    ) -> (String, Scalar) {
        let (secret, pubkey) = keypair(rng);

        let create = Transaction::create_election(sample_configuration(), "admin");
        let election_id = create.election_id().unwrap();
        store.submit(create).unwrap();

        if let Some(threshold) = threshold {
            let mut election = store.get_election(&election_id).unwrap();
            election.shuffle_threshold = threshold;
            store.set_election(&election).unwrap();
        }

        store
            .submit(Transaction::OpenElection {
                election_id: election_id.clone(),
                admin_id: "admin".to_string(),
                pubkey: pubkey.compress().to_bytes().to_vec(),
            })
            .unwrap();

        let chunks = store.get_election(&election_id).unwrap().chunks_per_ballot();
        for voter in 0..voters {
            let plaintext = format!("select:q1:{},false,false", voter % 2 == 0);
            let ballot = encrypt_ballot(rng, &pubkey, plaintext.as_bytes(), chunks).unwrap();
            store
                .submit(Transaction::CastVote {
                    election_id: election_id.clone(),
                    user_id: format!("voter{}", voter),
                    ballot,
                })
                .unwrap();
        }

        store
            .submit(Transaction::CloseElection {
                election_id: election_id.clone(),
                admin_id: "admin".to_string(),
            })
            .unwrap();

        (election_id, secret)
    }

    #[test]
    fn test_responder() {
        let mut rng = ChaCha20Rng::seed_from_u64(50);
        let nodes = nodes(3, &mut rng);
        let (election_id, _) = closed_election(&nodes.store, 3, None, &mut rng);

        let message = Message::StartShuffle {
            election_id: election_id.clone(),
            addresses: nodes.roster.addresses(),
        };
        let from = Address::new("node0");

        nodes.responder(0).process(&from, message.clone()).unwrap();
        let election = nodes.store.get_election(&election_id).unwrap();
        assert_eq!(election.shuffle_instances.len(), 1);

        // Nothing more to do for this node
        nodes.responder(0).process(&from, message.clone()).unwrap();
        assert_eq!(nodes.store.get_election(&election_id).unwrap().round(), 1);

        nodes.responder(1).process(&from, message.clone()).unwrap();
        nodes.responder(2).process(&from, message.clone()).unwrap();
        let election = nodes.store.get_election(&election_id).unwrap();
        assert_eq!(election.status, Status::ShuffledBallots);
        election.verify_shuffles().unwrap();
    }

    #[test]
    fn test_responder_stops_at_threshold() {
        let mut rng = ChaCha20Rng::seed_from_u64(51);
        let nodes = nodes(3, &mut rng);
        let (election_id, _) = closed_election(&nodes.store, 2, Some(1), &mut rng);

        nodes.responder(2).handle_start_shuffle(&election_id).unwrap();
        nodes.responder(1).handle_start_shuffle(&election_id).unwrap();

        let election = nodes.store.get_election(&election_id).unwrap();
        assert_eq!(election.round(), 1);
        assert_eq!(election.status, Status::ShuffledBallots);
    }

    /// Lets another node commit its shuffle right before each submission
    struct RacingStore {
        inner: Arc<MemStore>,
        election_id: String,
        rival: std::sync::Mutex<Option<Responder<MemStore>>>,
    }

    impl Store for RacingStore {
        fn get_proof(&self, key: &[u8]) -> Result<Option<Proof>, Error> {
            self.inner.get_proof(key)
        }

        fn submit(&self, tx: Transaction) -> Result<(), Error> {
            if let Some(rival) = self.rival.lock().unwrap().take() {
                rival.handle_start_shuffle(&self.election_id)?;
            }
            self.inner.submit(tx)
        }
    }

    #[test]
    fn test_responder_loses_last_round() {
        let mut rng = ChaCha20Rng::seed_from_u64(53);
        let nodes = nodes(2, &mut rng);
        let (election_id, _) = closed_election(&nodes.store, 2, Some(1), &mut rng);

        let store = Arc::new(RacingStore {
            inner: nodes.store.clone(),
            election_id: election_id.clone(),
            rival: std::sync::Mutex::new(Some(nodes.responder(1))),
        });
        let responder = Responder::new(
            nodes.roster.members[0].address.clone(),
            nodes.keys[0].clone(),
            store,
        );

        // Our transaction is rejected, but the election got its shuffle
        responder.handle_start_shuffle(&election_id).unwrap();

        let election = nodes.store.get_election(&election_id).unwrap();
        assert_eq!(election.round(), 1);
        assert_eq!(election.status, Status::ShuffledBallots);
        assert!(election.has_shuffled(nodes.keys[1].public.as_bytes()));
        assert!(!election.has_shuffled(nodes.keys[0].public.as_bytes()));
    }

    #[test]
    fn test_responder_errors() {
        let mut rng = ChaCha20Rng::seed_from_u64(52);
        let nodes = nodes(2, &mut rng);

        assert!(matches!(
            nodes.responder(0).handle_start_shuffle("abcd"),
            Err(Error::NotFound(_))
        ));

        // Still open
        let create = Transaction::create_election(sample_configuration(), "admin");
        let election_id = create.election_id().unwrap();
        nodes.store.submit(create).unwrap();
        assert!(matches!(
            nodes.responder(0).handle_start_shuffle(&election_id),
            Err(Error::Rejected(ValidationError::WrongStatus {
                expected: Status::Closed,
                found: Status::Initial
            }))
        ));
    }
}
