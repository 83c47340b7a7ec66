//! Anonymous, individually verifiable voting.
//!
//! Voters obtain an RSA blind signature over their ledger address from the
//! election authority after an identity check, cast ballots encrypted to the
//! election's X25519 key together with that signature, and the authority
//! tallies straight from the public ledger.

#[macro_use]
extern crate serde;

mod authority;
pub mod ballot;
pub mod blind;
mod election;
mod error;
mod keys;
mod ledger;
mod participation;
pub mod serde_b64;
mod store;
mod tally;
mod verification;

pub use authority::*;
pub use ballot::{decrypt_ballot, encrypt_ballot, BallotPayload};
pub use blind::{BlindingInverse, CredentialRequest, Preparation, StoredCredentialRequest};
pub use election::*;
pub use error::*;
pub use keys::*;
pub use ledger::*;
pub use participation::*;
pub use serde_b64::{b64, b64_option, b64_vec};
pub use store::*;
pub use tally::*;
pub use verification::*;

#[cfg(test)]
mod tests;
