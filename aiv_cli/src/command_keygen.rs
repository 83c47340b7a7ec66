use crate::config::Config;
use crate::{print_json, CliError};
use aiv::ElectionKeys;

/// Print a fresh election key file. Keep it secret: it holds both private keys.
pub fn command_keygen() -> Result<(), CliError> {
    let keys = ElectionKeys::generate()?;
    print_json(&keys.to_stored()?)
}

/// Print the keys voters need, from the authority's key file
pub fn command_public_keys(config: &Config) -> Result<(), CliError> {
    let stored = config.election_keys()?;
    let keys = ElectionKeys::from_stored(&stored)?;
    print_json(&keys.public())
}
