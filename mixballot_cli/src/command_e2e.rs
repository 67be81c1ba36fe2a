use super::{expand, read_configuration};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_TABLE;
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::Keypair;
use mixballot::*;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::info;

const ADMIN_ID: &str = "admin";

struct Options {
    nodes: usize,
    voters: usize,
    threshold: Option<usize>,
    configuration: Configuration,
    shuffle: ShuffleConfig,
}

pub fn command_e2e(matches: &clap::ArgMatches) {
    let options = Options {
        nodes: parse_count(matches, "nodes").unwrap_or(4),
        voters: parse_count(matches, "voters").unwrap_or(3),
        threshold: parse_count(matches, "threshold"),
        configuration: match matches.value_of("configuration") {
            Some(filename) => read_configuration("e2e", filename),
            None => demo_configuration(),
        },
        shuffle: ShuffleConfig::from_env().unwrap_or_else(|e| {
            eprintln!("mixballot e2e: {}", e);
            std::process::exit(1);
        }),
    };

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("mixballot e2e: unable to start runtime: {}", e);
        std::process::exit(1);
    });

    let election = match runtime.block_on(run(options)) {
        Ok(election) => election,
        Err(e) => {
            eprintln!("mixballot e2e: {}", e);
            std::process::exit(1);
        }
    };

    println!("election: {}", election.election_id);
    println!("status: {}", election.status);
    println!(
        "shuffles: {} / {}",
        election.shuffle_instances.len(),
        election.shuffle_threshold
    );
    println!("ballots:");
    for ballot in &election.decrypted_ballots {
        println!("  {}", ballot.encode().replace('\n', " | "));
    }

    if let Some(filename) = matches.value_of("output") {
        let filename = expand(filename);
        let json = serde_json::to_string_pretty(&election).unwrap_or_else(|e| {
            eprintln!("mixballot e2e: {}", e);
            std::process::exit(1);
        });
        if let Err(e) = std::fs::write(&filename, json) {
            eprintln!("mixballot e2e: unable to write {}: {}", filename, e);
            std::process::exit(1);
        }
        println!("> Election written to {}", filename);
    }
}

fn parse_count(matches: &clap::ArgMatches, name: &str) -> Option<usize> {
    let value = matches.value_of(name)?;
    match value.parse() {
        Ok(count) => Some(count),
        Err(e) => {
            eprintln!("mixballot e2e: invalid --{} {}: {}", name, value, e);
            std::process::exit(1);
        }
    }
}

async fn run(options: Options) -> Result<Election, Error> {
    let mut rng = OsRng;

    // Roster, one responder per member, all sharing a store
    let keys: Vec<Arc<Keypair>> = (0..options.nodes)
        .map(|_| Arc::new(Keypair::generate(&mut rng)))
        .collect();
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
    let network = LocalNetwork::new();
    for (member, key) in roster.members.iter().zip(&keys) {
        let responder = Responder::new(member.address.clone(), key.clone(), store.clone());
        network.register(member.address.clone(), Arc::new(responder));
    }

    // Election
    let create = Transaction::create_election(options.configuration, ADMIN_ID);
    let election_id = create.election_id()?;
    store.submit(create)?;

    if let Some(threshold) = options.threshold {
        let mut election = store.get_election(&election_id)?;
        election.shuffle_threshold = threshold;
        store.set_election(&election)?;
    }

    let secret = Scalar::random(&mut rng);
    let pubkey = &secret * &RISTRETTO_BASEPOINT_TABLE;
    store.submit(Transaction::OpenElection {
        election_id: election_id.clone(),
        admin_id: ADMIN_ID.to_string(),
        pubkey: pubkey.compress().to_bytes().to_vec(),
    })?;

    let election = store.get_election(&election_id)?;
    for voter in 0..options.voters {
        let plaintext = random_ballot(&election.configuration, &mut rng).encode();
        let ballot = encrypt_ballot(
            &mut rng,
            &pubkey,
            plaintext.as_bytes(),
            election.chunks_per_ballot(),
        )?;
        store.submit(Transaction::CastVote {
            election_id: election_id.clone(),
            user_id: format!("voter{}", voter),
            ballot,
        })?;
    }
    info!(election = %election_id, voters = options.voters, "ballots cast");

    store.submit(Transaction::CloseElection {
        election_id: election_id.clone(),
        admin_id: ADMIN_ID.to_string(),
    })?;

    // Shuffle, coordinated by the first member
    let coordinator = roster.members[0].address.clone();
    let actor = Actor::new(
        coordinator.clone(),
        network.rpc(coordinator),
        store.clone(),
        options.shuffle,
    );
    let election_id_bytes = hex::decode(&election_id).map_err(|_| Error::IdentifierBadHex)?;
    actor.shuffle(&election_id_bytes).await?;

    // Decrypt the output of the last shuffle
    let election = store.get_election(&election_id)?;
    election.verify_shuffles()?;
    let decrypted_ballots = election
        .shuffle_input()
        .iter()
        .map(|ballot| decrypt(&secret, ballot))
        .collect::<Result<Vec<String>, Error>>()?;

    store.submit(Transaction::DecryptBallots {
        election_id: election_id.clone(),
        admin_id: ADMIN_ID.to_string(),
        decrypted_ballots,
    })?;

    store.get_election(&election_id)
}

fn decrypt(secret: &Scalar, ballot: &Ciphertexts) -> Result<String, Error> {
    let mut plaintext = Vec::new();
    for (i, ciphertext) in ballot.iter().enumerate() {
        let (k, c) = ciphertext
            .points()
            .ok_or(CiphertextError::DecodeError(i))?;
        plaintext.extend(extract(&(c - secret * k))?);
    }
    String::from_utf8(plaintext).map_err(|_| CiphertextError::ExtractFailed.into())
}

/// A single yes/no question
fn demo_configuration() -> Configuration {
    Configuration {
        main_title: "Demo election".to_string(),
        scaffold: vec![Subject {
            id: "s1".to_string(),
            title: "Demo".to_string(),
            order: vec!["q1".to_string()],
            elements: vec![Question::Select(Select {
                id: "q1".to_string(),
                title: "Do you agree?".to_string(),
                max_n: 1,
                min_n: 1,
                choices: vec!["yes".to_string(), "no".to_string()],
            })],
        }],
    }
}

/// Answer every question of the configuration at random
fn random_ballot<R: Rng>(configuration: &Configuration, rng: &mut R) -> Ballot {
    let mut ballot = Ballot::default();
    for subject in &configuration.scaffold {
        answer_subject(subject, &mut ballot, rng);
    }
    ballot
}

fn answer_subject<R: Rng>(subject: &Subject, ballot: &mut Ballot, rng: &mut R) {
    for question in &subject.elements {
        match question {
            Question::Subject(subject) => answer_subject(subject, ballot, rng),
            Question::Select(select) => {
                let mut selection = vec![false; select.choices.len()];
                if select.max_n > 0 && !selection.is_empty() {
                    let choice = rng.gen_range(0, selection.len());
                    selection[choice] = true;
                }
                ballot.select_result_ids.push(select.id.clone());
                ballot.select_result.push(selection);
            }
            Question::Rank(rank) => {
                let mut ranks: Vec<i8> = (0..rank.choices.len()).map(|r| r as i8).collect();
                ranks.shuffle(rng);
                ballot.rank_result_ids.push(rank.id.clone());
                ballot.rank_result.push(ranks);
            }
            Question::Text(text) => {
                let answer = if text.max_length > 0 { "x" } else { "" };
                let answers = (0..text.choices.len())
                    .map(|i| {
                        if i < text.max_n as usize {
                            answer.to_string()
                        } else {
                            String::new()
                        }
                    })
                    .collect();
                ballot.text_result_ids.push(text.id.clone());
                ballot.text_result.push(answers);
            }
        }
    }
}
