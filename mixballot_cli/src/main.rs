use clap::{App, AppSettings, Arg, SubCommand};
use tracing_subscriber::EnvFilter;

mod command_ballot;
mod command_e2e;
mod command_verify;

use command_ballot::*;
use command_e2e::*;
use command_verify::*;

fn main() {
    let matches = App::new("MixBallot CLI")
        .version("0.1")
        .author("Patrick Hayes <patrick.d.hayes@gmail.com>")
        .about("Verifiable shuffling of encrypted ballots")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity, RUST_LOG takes precedence"),
        )
        .subcommand(
            SubCommand::with_name("ballot-size")
                .about("Print the maximum encoded size of a ballot for an election configuration")
                .arg(
                    Arg::with_name("CONFIGURATION")
                        .index(1)
                        .required(true)
                        .help("Election configuration in JSON format"),
                ),
        )
        .subcommand(
            SubCommand::with_name("decode")
                .about("Decode a plaintext ballot and print it as JSON")
                .arg(
                    Arg::with_name("CONFIGURATION")
                        .index(1)
                        .required(true)
                        .help("Election configuration in JSON format"),
                )
                .arg(
                    Arg::with_name("BALLOT")
                        .index(2)
                        .required(true)
                        .help("File holding the encoded ballot"),
                ),
        )
        .subcommand(
            SubCommand::with_name("verify")
                .about("Verify every shuffle of an election")
                .arg(
                    Arg::with_name("ELECTION")
                        .index(1)
                        .required(true)
                        .help("Election state in JSON or CBOR format"),
                ),
        )
        .subcommand(
            SubCommand::with_name("e2e")
                .about("Run an election and its shuffle on a local simulated network")
                .arg(
                    Arg::with_name("nodes")
                        .long("nodes")
                        .takes_value(true)
                        .default_value("4")
                        .help("Number of roster members"),
                )
                .arg(
                    Arg::with_name("voters")
                        .long("voters")
                        .takes_value(true)
                        .default_value("3")
                        .help("Number of ballots to cast"),
                )
                .arg(
                    Arg::with_name("threshold")
                        .long("threshold")
                        .takes_value(true)
                        .help("Number of shuffles required, defaults to the byzantine threshold"),
                )
                .arg(
                    Arg::with_name("configuration")
                        .long("configuration")
                        .takes_value(true)
                        .help("Election configuration in JSON format, a yes/no question by default"),
                )
                .arg(
                    Arg::with_name("output")
                        .long("output")
                        .takes_value(true)
                        .help("Write the final election state as JSON to this file"),
                ),
        )
        .get_matches();

    let level = match matches.occurrences_of("v") {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Subcommands
    if let Some(matches) = matches.subcommand_matches("ballot-size") {
        command_ballot_size(matches);
        std::process::exit(0);
    }

    if let Some(matches) = matches.subcommand_matches("decode") {
        command_decode(matches);
        std::process::exit(0);
    }

    if let Some(matches) = matches.subcommand_matches("verify") {
        command_verify(matches);
        std::process::exit(0);
    }

    if let Some(matches) = matches.subcommand_matches("e2e") {
        command_e2e(matches);
        std::process::exit(0);
    }
}

/// Expand `~` and environment variables in a path
pub fn expand(filename: &str) -> String {
    match shellexpand::full(filename) {
        Ok(expanded) => expanded.into_owned(),
        Err(e) => {
            eprintln!("mixballot: unable to expand {}: {}", filename, e);
            std::process::exit(1);
        }
    }
}

/// Read a file or exit
pub fn read_file(command: &str, filename: &str) -> Vec<u8> {
    let filename = expand(filename);
    match std::fs::read(&filename) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("mixballot {}: unable to read {}: {}", command, filename, e);
            std::process::exit(1);
        }
    }
}

/// Read an election configuration in JSON format or exit
pub fn read_configuration(command: &str, filename: &str) -> mixballot::Configuration {
    let bytes = read_file(command, filename);
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        eprintln!("mixballot {}: invalid configuration {}: {}", command, filename, e);
        std::process::exit(1);
    })
}
