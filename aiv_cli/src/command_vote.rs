use crate::config::Config;
use crate::{b64_arg, print_json, CliError};
use aiv::{encrypt_ballot, DecodedCall, DEFAULT_BALLOT_FUNCTION};

/// Encrypt a ballot and print the `vote` call to submit from the voter's wallet
pub fn command_vote(matches: &clap::ArgMatches, config: &Config) -> Result<(), CliError> {
    let candidate = matches.value_of("CANDIDATE").unwrap_or_default();
    let proof = match matches.value_of("PROOF") {
        Some(proof) => b64_arg("proof", proof)?,
        None => vec![],
    };
    let encryption_key = config.public_keys()?.encryption_key()?;

    let encrypted_content = encrypt_ballot(candidate, &encryption_key)?;
    let call = DecodedCall {
        package: String::new(),
        module: String::new(),
        function: DEFAULT_BALLOT_FUNCTION.to_owned(),
        args: vec![encrypted_content, proof],
    };
    print_json(&call)
}
