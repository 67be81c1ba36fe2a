use crate::*;
use digest::Digest;
use ed25519_dalek::{PublicKey, Signature, Verifier};
use sha2::Sha256;

/// A transaction mutating an election
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Transaction {
    CreateElection {
        configuration: Configuration,
        admin_id: String,

        /// Distinguishes elections created with the same configuration
        nonce: u64,
    },
    OpenElection {
        election_id: String,
        admin_id: String,

        #[serde(with = "hex")]
        pubkey: Vec<u8>,
    },
    CastVote {
        election_id: String,
        user_id: String,
        ballot: Ciphertexts,
    },
    CloseElection {
        election_id: String,
        admin_id: String,
    },
    ShuffleBallots {
        election_id: String,
        round: usize,
        shuffled_ballots: Vec<Ciphertexts>,

        #[serde(with = "hex")]
        proof: Vec<u8>,

        #[serde(with = "EdPublicKeyHex")]
        public_key: PublicKey,

        /// Signature over `shuffle_digest(election_id, round, shuffled_ballots)`
        #[serde(with = "EdSignatureHex")]
        signature: Signature,
    },
    DecryptBallots {
        election_id: String,
        admin_id: String,
        decrypted_ballots: Vec<String>,
    },
    CancelElection {
        election_id: String,
        admin_id: String,
    },
}

impl Transaction {
    /// New CreateElection transaction with a random nonce
    pub fn create_election(configuration: Configuration, admin_id: &str) -> Self {
        Transaction::CreateElection {
            configuration,
            admin_id: admin_id.to_string(),
            nonce: rand::random(),
        }
    }

    /// Sign a shuffle and build the ShuffleBallots transaction carrying it
    pub fn shuffle_ballots<S: Signer + ?Sized>(
        signer: &S,
        election_id: &str,
        round: usize,
        shuffled_ballots: Vec<Ciphertexts>,
        proof: Vec<u8>,
    ) -> Self {
        let signature = signer.sign(&shuffle_digest(election_id, round, &shuffled_ballots));
        Transaction::ShuffleBallots {
            election_id: election_id.to_string(),
            round,
            shuffled_ballots,
            proof,
            public_key: signer.public_key(),
            signature,
        }
    }

    /// Get the transaction ID, the SHA-256 of its CBOR encoding
    pub fn id(&self) -> Result<Vec<u8>, Error> {
        Ok(Sha256::digest(&self.as_bytes()?).to_vec())
    }

    /// Hex encoded ID of the election this transaction applies to
    pub fn election_id(&self) -> Result<String, Error> {
        match self {
            Transaction::CreateElection { .. } => Ok(hex::encode(Sha256::digest(&self.id()?))),
            Transaction::OpenElection { election_id, .. }
            | Transaction::CastVote { election_id, .. }
            | Transaction::CloseElection { election_id, .. }
            | Transaction::ShuffleBallots { election_id, .. }
            | Transaction::DecryptBallots { election_id, .. }
            | Transaction::CancelElection { election_id, .. } => Ok(election_id.clone()),
        }
    }

    /// Pack into bytes
    pub fn as_bytes(&self) -> Result<Vec<u8>, Error> {
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

    /// Validate the transaction against the current state of its election and
    /// return the new state.
    ///
    /// `roster` is the current roster of the store, used by CreateElection only.
    pub fn apply(
        &self,
        roster: &Roster,
        current: Option<Election>,
    ) -> Result<Election, ValidationError> {
        match (self, current) {
            (
                Transaction::CreateElection {
                    configuration,
                    admin_id,
                    ..
                },
                None,
            ) => {
                if roster.is_empty() {
                    return Err(ValidationError::EmptyRoster);
                }
                let election_id = self
                    .election_id()
                    .map_err(|e| ValidationError::Encoding(e.to_string()))?;
                Election::new(election_id, configuration.clone(), admin_id.clone(), roster)
                    .map_err(|e| ValidationError::Encoding(e.to_string()))
            }
            (_, Some(election)) => self.update(election),
            (_, None) => Err(ValidationError::ElectionNotFound(
                self.election_id()
                    .map_err(|e| ValidationError::Encoding(e.to_string()))?,
            )),
        }
    }

    fn update(&self, mut election: Election) -> Result<Election, ValidationError> {
        match self {
            Transaction::CreateElection { .. } => {
                return Err(ValidationError::ElectionExists(election.election_id));
            }

            Transaction::OpenElection {
                admin_id, pubkey, ..
            } => {
                check_admin(&election, admin_id)?;
                check_status(&election, Status::Initial)?;
                decode_point(pubkey).ok_or(ValidationError::InvalidPublicKey)?;

                election.pubkey = pubkey.clone();
                election.status = Status::Open;
            }

            Transaction::CastVote {
                user_id, ballot, ..
            } => {
                check_status(&election, Status::Open)?;

                let expected = election.chunks_per_ballot();
                if ballot.len() != expected {
                    return Err(ValidationError::WrongChunkCount {
                        expected,
                        found: ballot.len(),
                    });
                }
                ballot.points_of()?;

                election.encrypted_ballots.cast_vote(user_id, ballot.clone());
            }

            Transaction::CloseElection { admin_id, .. } => {
                check_admin(&election, admin_id)?;
                check_status(&election, Status::Open)?;

                if election.encrypted_ballots.len() < 2 {
                    return Err(ValidationError::NotEnoughBallots(
                        election.encrypted_ballots.len(),
                    ));
                }

                election.status = Status::Closed;
            }

            Transaction::ShuffleBallots {
                election_id,
                round,
                shuffled_ballots,
                proof,
                public_key,
                signature,
            } => {
                check_status(&election, Status::Closed)?;

                if *round != election.round() {
                    return Err(ValidationError::StaleRound {
                        expected: election.round(),
                        found: *round,
                    });
                }

                let roster = election
                    .roster()
                    .map_err(|e| ValidationError::Encoding(e.to_string()))?;
                if roster.find_key(public_key).is_none() {
                    return Err(ValidationError::NotInRoster);
                }
                if election.has_shuffled(public_key.as_bytes()) {
                    return Err(ValidationError::AlreadyShuffled);
                }

                public_key.verify(
                    &shuffle_digest(election_id, *round, shuffled_ballots),
                    signature,
                )?;

                let input = election.shuffle_input();
                if shuffled_ballots.len() != input.len() {
                    return Err(ValidationError::WrongBallotCount {
                        expected: input.len(),
                        found: shuffled_ballots.len(),
                    });
                }
                let expected = election.chunks_per_ballot();
                for ballot in shuffled_ballots {
                    if ballot.len() != expected {
                        return Err(ValidationError::WrongChunkCount {
                            expected,
                            found: ballot.len(),
                        });
                    }
                }

                let pubkey = election
                    .public_key()
                    .ok_or(ValidationError::InvalidPublicKey)?;
                let (ks, cs) = ballots_to_columns(&input)?;
                let (ks_shuffled, cs_shuffled) = ballots_to_columns(shuffled_ballots)?;
                verify_sequences(
                    SHUFFLE_SUITE,
                    &ks,
                    &cs,
                    &pubkey,
                    &ks_shuffled,
                    &cs_shuffled,
                    proof,
                )?;

                election.shuffle_instances.push(ShuffleInstance {
                    shuffled_ballots: shuffled_ballots.clone(),
                    shuffle_proofs: proof.clone(),
                    shuffler_public_key: public_key.as_bytes().to_vec(),
                });
                if election.threshold_reached() {
                    election.status = Status::ShuffledBallots;
                }
            }

            Transaction::DecryptBallots {
                admin_id,
                decrypted_ballots,
                ..
            } => {
                check_admin(&election, admin_id)?;
                check_status(&election, Status::ShuffledBallots)?;

                let expected = election.encrypted_ballots.len();
                if decrypted_ballots.len() != expected {
                    return Err(ValidationError::WrongBallotCount {
                        expected,
                        found: decrypted_ballots.len(),
                    });
                }

                election.decrypted_ballots = decrypted_ballots
                    .iter()
                    .map(|ballot| Ballot::decode(ballot, election.ballot_size))
                    .collect::<Result<Vec<Ballot>, BallotError>>()?;
                election.status = Status::ResultAvailable;
            }

            Transaction::CancelElection { admin_id, .. } => {
                check_admin(&election, admin_id)?;
                if election.status.is_terminal() {
                    return Err(ValidationError::TerminalStatus(election.status));
                }

                election.status = Status::Canceled;
            }
        }

        Ok(election)
    }
}

/// Digest signed by a shuffler, binding its output to the election and round
pub fn shuffle_digest(election_id: &str, round: usize, shuffled_ballots: &[Ciphertexts]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(election_id.as_bytes());
    hasher.update((round as u64).to_be_bytes());
    for ballot in shuffled_ballots {
        for ciphertext in ballot.iter() {
            hasher.update(&ciphertext.k);
            hasher.update(&ciphertext.c);
        }
    }
    hasher.finalize().to_vec()
}

fn check_admin(election: &Election, admin_id: &str) -> Result<(), ValidationError> {
    if election.admin_id != admin_id {
        return Err(ValidationError::NotAdmin(admin_id.to_string()));
    }
    Ok(())
}

fn check_status(election: &Election, expected: Status) -> Result<(), ValidationError> {
    if election.status != expected {
        return Err(ValidationError::WrongStatus {
            expected,
            found: election.status,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ciphertext::tests::keypair;
    use crate::configuration::tests::sample_configuration;
    use ed25519_dalek::Keypair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    struct Fixture {
        rng: ChaCha20Rng,
        nodes: Vec<Keypair>,
        roster: Roster,
        pubkey: Point,
    }

    fn fixture() -> Fixture {
        let mut rng = ChaCha20Rng::seed_from_u64(30);
        let nodes: Vec<Keypair> = (0..3).map(|_| Keypair::generate(&mut rng)).collect();
        let roster = Roster::new(
            nodes
                .iter()
                .enumerate()
                .map(|(i, node)| Member {
                    address: Address(format!("node{}", i)),
                    public_key: node.public,
                })
                .collect(),
        );
        let (_, pubkey) = keypair(&mut rng);
        Fixture {
            rng,
            nodes,
            roster,
            pubkey,
        }
    }

    fn closed_election(f: &mut Fixture) -> Election {
        let create = Transaction::create_election(sample_configuration(), "admin");
        let election_id = create.election_id().unwrap();
        let election = create.apply(&f.roster, None).unwrap();
        assert_eq!(election.election_id, election_id);
        assert_eq!(election.shuffle_threshold, 3);

        let election = Transaction::OpenElection {
            election_id: election_id.clone(),
            admin_id: "admin".to_string(),
            pubkey: f.pubkey.compress().to_bytes().to_vec(),
        }
        .apply(&f.roster, Some(election))
        .unwrap();

        let mut election = election;
        for voter in &["alice", "bob", "carol"] {
            let ballot = encrypt_ballot(
                &mut f.rng,
                &f.pubkey,
                voter.as_bytes(),
                election.chunks_per_ballot(),
            )
            .unwrap();
            election = Transaction::CastVote {
                election_id: election_id.clone(),
                user_id: voter.to_string(),
                ballot,
            }
            .apply(&f.roster, Some(election))
            .unwrap();
        }

        Transaction::CloseElection {
            election_id,
            admin_id: "admin".to_string(),
        }
        .apply(&f.roster, Some(election))
        .unwrap()
    }

    fn shuffle_tx(f: &mut Fixture, election: &Election, node: usize) -> Transaction {
        let (ks, cs) = ballots_to_columns(&election.shuffle_input()).unwrap();
        let shuffled = shuffle_sequences(&mut f.rng, &f.pubkey, &ks, &cs).unwrap();
        Transaction::shuffle_ballots(
            &f.nodes[node],
            &election.election_id,
            election.round(),
            columns_to_ballots(&shuffled.ks, &shuffled.cs).unwrap(),
            shuffled.proof,
        )
    }

    #[test]
    fn test_election_lifecycle() {
        let mut f = fixture();
        let mut election = closed_election(&mut f);
        assert_eq!(election.status, Status::Closed);
        assert_eq!(election.encrypted_ballots.len(), 3);

        for node in 0..3 {
            let tx = shuffle_tx(&mut f, &election, node);
            election = tx.apply(&f.roster, Some(election)).unwrap();
        }
        assert_eq!(election.status, Status::ShuffledBallots);
        assert_eq!(election.shuffle_instances.len(), 3);
        election.verify_shuffles().unwrap();

        let plaintexts = vec![
            "select:q1:true,false,false".to_string(),
            "select:q1:false,true,false".to_string(),
            "rank:q2:0,1,2,3".to_string(),
        ];
        let election = Transaction::DecryptBallots {
            election_id: election.election_id.clone(),
            admin_id: "admin".to_string(),
            decrypted_ballots: plaintexts,
        }
        .apply(&f.roster, Some(election))
        .unwrap();
        assert_eq!(election.status, Status::ResultAvailable);
        assert_eq!(election.decrypted_ballots.len(), 3);
        assert_eq!(election.decrypted_ballots[2].rank_result, vec![vec![0, 1, 2, 3]]);

        let cancel = Transaction::CancelElection {
            election_id: election.election_id.clone(),
            admin_id: "admin".to_string(),
        };
        assert!(matches!(
            cancel.apply(&f.roster, Some(election)),
            Err(ValidationError::TerminalStatus(Status::ResultAvailable))
        ));
    }

    #[test]
    fn test_create_and_open() {
        let f = fixture();
        let create = Transaction::create_election(sample_configuration(), "admin");

        assert!(matches!(
            create.apply(&Roster::default(), None),
            Err(ValidationError::EmptyRoster)
        ));

        let election = create.apply(&f.roster, None).unwrap();
        assert!(matches!(
            create.apply(&f.roster, Some(election.clone())),
            Err(ValidationError::ElectionExists(_))
        ));

        // Two elections with the same configuration get different ids
        let other = Transaction::create_election(sample_configuration(), "admin");
        assert_ne!(other.election_id().unwrap(), create.election_id().unwrap());

        let election_id = election.election_id.clone();
        let open = move |admin_id: &str, pubkey: Vec<u8>| Transaction::OpenElection {
            election_id: election_id.clone(),
            admin_id: admin_id.to_string(),
            pubkey,
        };
        let pubkey = f.pubkey.compress().to_bytes().to_vec();

        assert!(matches!(
            open("mallory", pubkey.clone()).apply(&f.roster, Some(election.clone())),
            Err(ValidationError::NotAdmin(_))
        ));
        assert!(matches!(
            open("admin", vec![0xff; 32]).apply(&f.roster, Some(election.clone())),
            Err(ValidationError::InvalidPublicKey)
        ));
        assert!(matches!(
            open("admin", pubkey.clone()).apply(&f.roster, None),
            Err(ValidationError::ElectionNotFound(_))
        ));

        let opened = open("admin", pubkey.clone())
            .apply(&f.roster, Some(election))
            .unwrap();
        assert_eq!(opened.status, Status::Open);
        assert!(matches!(
            open("admin", pubkey).apply(&f.roster, Some(opened)),
            Err(ValidationError::WrongStatus {
                expected: Status::Initial,
                found: Status::Open
            })
        ));
    }

    #[test]
    fn test_cast_vote_rejections() {
        let mut f = fixture();
        let election = closed_election(&mut f);
        let chunks = election.chunks_per_ballot();

        let mut open = election.clone();
        open.status = Status::Open;

        let ballot = encrypt_ballot(&mut f.rng, &f.pubkey, b"x", chunks).unwrap();
        let cast = |ballot: Ciphertexts| Transaction::CastVote {
            election_id: election.election_id.clone(),
            user_id: "dave".to_string(),
            ballot,
        };

        assert!(matches!(
            cast(ballot.clone()).apply(&f.roster, Some(election.clone())),
            Err(ValidationError::WrongStatus { .. })
        ));

        let mut short = ballot.clone();
        short.0.pop();
        assert!(matches!(
            cast(short).apply(&f.roster, Some(open.clone())),
            Err(ValidationError::WrongChunkCount { .. })
        ));

        let mut garbage = ballot.clone();
        garbage.0[0].k = vec![0xff; 32];
        assert!(matches!(
            cast(garbage).apply(&f.roster, Some(open.clone())),
            Err(ValidationError::Ciphertext(CiphertextError::DecodeError(0)))
        ));

        let updated = cast(ballot).apply(&f.roster, Some(open)).unwrap();
        assert_eq!(updated.encrypted_ballots.len(), 4);
    }

    #[test]
    fn test_shuffle_rejections() {
        let mut f = fixture();
        let election = closed_election(&mut f);

        // Stale round
        let first = shuffle_tx(&mut f, &election, 0);
        let after_first = first.apply(&f.roster, Some(election.clone())).unwrap();
        assert!(matches!(
            shuffle_tx(&mut f, &election, 1).apply(&f.roster, Some(after_first.clone())),
            Err(ValidationError::StaleRound {
                expected: 1,
                found: 0
            })
        ));

        // Same node twice
        assert!(matches!(
            shuffle_tx(&mut f, &after_first, 0).apply(&f.roster, Some(after_first.clone())),
            Err(ValidationError::AlreadyShuffled)
        ));

        // Outsider
        let outsider = Keypair::generate(&mut f.rng);
        f.nodes.push(outsider);
        assert!(matches!(
            shuffle_tx(&mut f, &election, 3).apply(&f.roster, Some(election.clone())),
            Err(ValidationError::NotInRoster)
        ));

        // Tampered signature
        if let Transaction::ShuffleBallots {
            election_id,
            round,
            shuffled_ballots,
            proof,
            public_key,
            ..
        } = shuffle_tx(&mut f, &election, 1)
        {
            let forged = Transaction::ShuffleBallots {
                signature: Signer::sign(&f.nodes[2], b"something else"),
                election_id,
                round,
                shuffled_ballots,
                proof,
                public_key,
            };
            assert!(matches!(
                forged.apply(&f.roster, Some(election.clone())),
                Err(ValidationError::SignatureError(_))
            ));
        }

        // Valid signature over a truncated proof
        if let Transaction::ShuffleBallots {
            shuffled_ballots,
            mut proof,
            ..
        } = shuffle_tx(&mut f, &election, 1)
        {
            proof.truncate(proof.len() / 2);
            let bad = Transaction::shuffle_ballots(
                &f.nodes[1],
                &election.election_id,
                0,
                shuffled_ballots,
                proof,
            );
            assert!(matches!(
                bad.apply(&f.roster, Some(election.clone())),
                Err(ValidationError::Shuffle(ShuffleError::ProofInvalid))
            ));
        }

        // Wrong number of ballots
        let mut input = election.shuffle_input();
        input.pop();
        let (ks, cs) = ballots_to_columns(&input).unwrap();
        let shuffled = shuffle_sequences(&mut f.rng, &f.pubkey, &ks, &cs).unwrap();
        let short = Transaction::shuffle_ballots(
            &f.nodes[1],
            &election.election_id,
            0,
            columns_to_ballots(&shuffled.ks, &shuffled.cs).unwrap(),
            shuffled.proof,
        );
        assert!(matches!(
            short.apply(&f.roster, Some(election)),
            Err(ValidationError::WrongBallotCount {
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn test_close_and_cancel() {
        let mut f = fixture();
        let election = closed_election(&mut f);

        let mut open = election.clone();
        open.status = Status::Open;
        open.encrypted_ballots.delete_voter("alice");
        open.encrypted_ballots.delete_voter("bob");

        let close = Transaction::CloseElection {
            election_id: election.election_id.clone(),
            admin_id: "admin".to_string(),
        };
        assert!(matches!(
            close.apply(&f.roster, Some(open)),
            Err(ValidationError::NotEnoughBallots(1))
        ));

        let cancel = |admin_id: &str| Transaction::CancelElection {
            election_id: election.election_id.clone(),
            admin_id: admin_id.to_string(),
        };
        assert!(matches!(
            cancel("mallory").apply(&f.roster, Some(election.clone())),
            Err(ValidationError::NotAdmin(_))
        ));
        let canceled = cancel("admin")
            .apply(&f.roster, Some(election.clone()))
            .unwrap();
        assert_eq!(canceled.status, Status::Canceled);
        assert!(matches!(
            cancel("admin").apply(&f.roster, Some(canceled)),
            Err(ValidationError::TerminalStatus(Status::Canceled))
        ));
    }

    #[test]
    fn test_transaction_bytes() {
        let tx = Transaction::CloseElection {
            election_id: "abcd".to_string(),
            admin_id: "admin".to_string(),
        };
        let json = serde_json::to_vec(&tx).unwrap();
        assert!(String::from_utf8_lossy(&json).contains("\"type\":\"close_election\""));

        let decoded = Transaction::from_bytes(&json).unwrap();
        assert_eq!(decoded.id().unwrap(), tx.id().unwrap());
        let decoded = Transaction::from_bytes(&tx.as_bytes().unwrap()).unwrap();
        assert_eq!(decoded.election_id().unwrap(), "abcd");
        assert!(matches!(
            Transaction::from_bytes(&[]),
            Err(Error::EmptyPayload)
        ));
    }
}
