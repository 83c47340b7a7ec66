use clap::{App, AppSettings, Arg, SubCommand};

mod command_credential;
mod command_keygen;
mod command_tally;
mod command_vote;
mod config;

use config::Config;

fn main() {
    let matches = App::new("AIV CLI")
        .version("0.1")
        .about("Anonymous, individually verifiable voting: keys, credentials, ballots and tally")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity"),
        )
        .arg(
            Arg::with_name("keys")
                .long("keys")
                .takes_value(true)
                .global(true)
                .help("Election key file - can also be set with AIV_KEYS"),
        )
        .arg(
            Arg::with_name("ledger")
                .long("ledger")
                .takes_value(true)
                .global(true)
                .help("JSON ledger dump - can also be set with AIV_LEDGER"),
        )
        .subcommand(SubCommand::with_name("keygen").about("Generate an election key file"))
        .subcommand(
            SubCommand::with_name("public-keys")
                .about("Print the public half of an election key file"),
        )
        .subcommand(
            SubCommand::with_name("blind")
                .about("Blind a ledger address for a verification request")
                .arg(
                    Arg::with_name("ADDRESS")
                        .index(1)
                        .required(true)
                        .help("Voter's ledger address"),
                ),
        )
        .subcommand(
            SubCommand::with_name("sign")
                .about("Blind-sign a blinded message (election authority)")
                .arg(
                    Arg::with_name("BLINDED")
                        .index(1)
                        .required(true)
                        .help("Base64 blinded message"),
                ),
        )
        .subcommand(
            SubCommand::with_name("finalize")
                .about("Unblind a blind signature into an eligibility proof")
                .arg(
                    Arg::with_name("REQUEST")
                        .index(1)
                        .required(true)
                        .help("Credential request file written by `blind`"),
                )
                .arg(
                    Arg::with_name("SIGNATURE")
                        .index(2)
                        .required(true)
                        .help("Base64 blind signature"),
                ),
        )
        .subcommand(
            SubCommand::with_name("verify")
                .about("Check an eligibility proof against an address")
                .arg(Arg::with_name("ADDRESS").index(1).required(true))
                .arg(
                    Arg::with_name("PROOF")
                        .index(2)
                        .required(true)
                        .help("Base64 eligibility proof"),
                ),
        )
        .subcommand(
            SubCommand::with_name("vote")
                .about("Encrypt a ballot and print the ledger call arguments")
                .arg(
                    Arg::with_name("CANDIDATE")
                        .index(1)
                        .required(true)
                        .help("Candidate id"),
                )
                .arg(
                    Arg::with_name("PROOF")
                        .index(2)
                        .required(false)
                        .help("Base64 eligibility proof to attach"),
                ),
        )
        .subcommand(
            SubCommand::with_name("tally")
                .about("Count the ballots in a ledger dump")
                .arg(
                    Arg::with_name("OBJECT-ID")
                        .index(1)
                        .required(true)
                        .help("The election's on-chain object id"),
                )
                .arg(
                    Arg::with_name("exclude")
                        .long("exclude")
                        .takes_value(true)
                        .multiple(true)
                        .help("Address whose ballots must not count"),
                )
                .arg(
                    Arg::with_name("candidate")
                        .long("candidate")
                        .takes_value(true)
                        .multiple(true)
                        .help("Candidate id on the ballot; others are not counted"),
                )
                .arg(
                    Arg::with_name("package")
                        .long("package")
                        .takes_value(true)
                        .help("Only count ballot calls into this package"),
                ),
        )
        .get_matches();

    let level = match matches.occurrences_of("v") {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    // Global flags may come before or after the subcommand
    let config = Config::from_env().with_matches(&matches);
    let config = match matches.subcommand() {
        (_, Some(m)) => config.with_matches(m),
        _ => config,
    };

    // Subcommands
    let result = match matches.subcommand() {
        ("keygen", Some(_)) => command_keygen::command_keygen(),
        ("public-keys", Some(_)) => command_keygen::command_public_keys(&config),
        ("blind", Some(m)) => command_credential::command_blind(m, &config),
        ("sign", Some(m)) => command_credential::command_sign(m, &config),
        ("finalize", Some(m)) => command_credential::command_finalize(m, &config),
        ("verify", Some(m)) => command_credential::command_verify(m, &config),
        ("vote", Some(m)) => command_vote::command_vote(m, &config),
        ("tally", Some(m)) => command_tally::command_tally(m, &config),
        _ => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// Anything a subcommand can fail with
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Aiv(#[from] aiv::Error),

    #[error("invalid {0}: {1}")]
    Argument(&'static str, String),
}

/// Decode a base64 command-line argument
pub fn b64_arg(name: &'static str, value: &str) -> Result<Vec<u8>, CliError> {
    aiv::serde_b64::decode(value).map_err(|e| CliError::Argument(name, e.to_string()))
}

/// Pretty JSON on stdout
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(aiv::Error::from)?;
    println!("{}", json);
    Ok(())
}
