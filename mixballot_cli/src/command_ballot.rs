use super::{read_configuration, read_file};
use mixballot::Ballot;

pub fn command_ballot_size(matches: &clap::ArgMatches) {
    let filename = matches.value_of("CONFIGURATION").unwrap_or_default();
    let configuration = read_configuration("ballot-size", filename);

    let size = configuration.max_encoded_size();
    println!("ballot-size: {}", size);
    println!("chunks: {}", mixballot::chunks_per_ballot(size));
}

pub fn command_decode(matches: &clap::ArgMatches) {
    let configuration =
        read_configuration("decode", matches.value_of("CONFIGURATION").unwrap_or_default());

    let filename = matches.value_of("BALLOT").unwrap_or_default();
    let bytes = read_file("decode", filename);
    let marshalled = String::from_utf8(bytes).unwrap_or_else(|e| {
        eprintln!("mixballot decode: {} is not UTF-8: {}", filename, e);
        std::process::exit(1);
    });

    // Editors like to end files with a newline, the wire format does not
    let marshalled = marshalled.strip_suffix('\n').unwrap_or(&marshalled);

    match Ballot::decode(marshalled, configuration.max_encoded_size()) {
        Ok(ballot) => match serde_json::to_string_pretty(&ballot) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("mixballot decode: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
