use super::read_file;
use mixballot::Election;

pub fn command_verify(matches: &clap::ArgMatches) {
    let filename = matches.value_of("ELECTION").unwrap_or_default();
    let bytes = read_file("verify", filename);

    let election = Election::from_bytes(&bytes).unwrap_or_else(|e| {
        eprintln!("mixballot verify: unable to read election {}: {}", filename, e);
        std::process::exit(1);
    });

    println!("election: {}", election.election_id);
    println!("status: {}", election.status);
    println!("ballots: {}", election.encrypted_ballots.len());
    println!(
        "shuffles: {} / {}",
        election.shuffle_instances.len(),
        election.shuffle_threshold
    );

    if let Err(e) = election.verify_shuffles() {
        eprintln!("mixballot verify: {}", e);
        std::process::exit(1);
    }

    println!("> Shuffles verified OK");
}
