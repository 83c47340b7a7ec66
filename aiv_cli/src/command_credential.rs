use crate::config::Config;
use crate::{b64_arg, print_json, CliError};
use aiv::{blind, CredentialRequest, ElectionKeys, StoredCredentialRequest};
use aiv::serde_b64;
use std::fs::read_to_string;

/// Voter: blind an address. Prints the credential request to keep until approval.
///
/// The printed `inverse` is the only way to use the signature that comes
/// back; losing it means starting over.
pub fn command_blind(matches: &clap::ArgMatches, config: &Config) -> Result<(), CliError> {
    let address = matches.value_of("ADDRESS").unwrap_or_default();
    let public_key = config.public_keys()?.signing_key()?;

    let request = CredentialRequest::new(&public_key, address)?;
    print_json(&request.to_stored(&public_key)?)
}

/// Authority: blind-sign a blinded message
pub fn command_sign(matches: &clap::ArgMatches, config: &Config) -> Result<(), CliError> {
    let blinded = b64_arg("blinded message", matches.value_of("BLINDED").unwrap_or_default())?;
    let keys = ElectionKeys::from_stored(&config.election_keys()?)?;

    let blind_signature = blind::blind_sign(&keys.signing.secret, &blinded)?;
    println!("{}", serde_b64::encode(&blind_signature));
    Ok(())
}

/// Voter: turn the authority's blind signature into an eligibility proof
pub fn command_finalize(matches: &clap::ArgMatches, config: &Config) -> Result<(), CliError> {
    let path = matches.value_of("REQUEST").unwrap_or_default();
    let blind_signature = b64_arg("blind signature", matches.value_of("SIGNATURE").unwrap_or_default())?;
    let public_key = config.public_keys()?.signing_key()?;

    let contents = read_to_string(path).map_err(|e| CliError::Argument("request file", e.to_string()))?;
    let stored: StoredCredentialRequest =
        serde_json::from_str(&contents).map_err(aiv::Error::from)?;
    let request = CredentialRequest::from_stored(&public_key, &stored)?;

    let proof = request.finalize(&public_key, &blind_signature)?;
    println!("{}", serde_b64::encode(&proof));
    Ok(())
}

/// Anyone: check a proof. Fails when it does not verify.
pub fn command_verify(matches: &clap::ArgMatches, config: &Config) -> Result<(), CliError> {
    let address = matches.value_of("ADDRESS").unwrap_or_default();
    let proof = b64_arg("proof", matches.value_of("PROOF").unwrap_or_default())?;
    let public_key = config.public_keys()?.signing_key()?;

    if !blind::verify(&public_key, &proof, address.as_bytes()) {
        return Err(aiv::Error::InvalidSignature.into());
    }
    println!("valid");
    Ok(())
}
