use crate::*;

use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("aiv: election has no signing key configured")]
    MissingSigningKey,

    #[error("aiv: election has no encryption key configured")]
    MissingEncryptionKey,

    #[error("aiv: malformed key material: {0}")]
    MalformedKey(String),

    #[error("aiv: RSA error: {0}")]
    Rsa(#[from] rsa::errors::Error),

    #[error("aiv: malformed ciphertext - blob shorter than ephemeral key and nonce")]
    MalformedCiphertext,

    #[error("aiv: failed to decrypt ballot")]
    DecryptionFailed,

    #[error("aiv: failed to encrypt ballot")]
    EncryptionFailed,

    #[error("aiv: signature does not verify")]
    InvalidSignature,

    #[error("aiv: message representative is not invertible modulo n")]
    MessageRepresentative,

    #[error("aiv: blind signing produced an inconsistent signature")]
    SigningFailure,

    #[error("aiv: unexpected length: expected {expected} bytes, found {found}")]
    UnexpectedLength { expected: usize, found: usize },

    #[error("aiv: malformed ballot payload: {0}")]
    MalformedPayload(String),

    #[error("aiv: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("aiv: ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("aiv: ledger scan cancelled")]
    ScanCancelled,

    #[error("aiv: ledger scan exceeded the limit of {0} transactions")]
    ScanLimitExceeded(usize),

    #[error("aiv: storage error: {0}")]
    Store(#[from] StoreError),

    #[error("aiv: {0}")]
    Validation(#[from] ValidationError),
}

impl Error {
    /// Errors that need an administrator to fix key material or setup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MissingSigningKey
                | Error::MissingEncryptionKey
                | Error::MalformedKey(_)
                | Error::Rsa(_)
        )
    }

    /// Errors worth retrying without changing the input.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Ledger(e) => e.is_transient(),
            Error::Store(StoreError::Unavailable(_)) => true,
            _ => false,
        }
    }
}

/// Business-rule rejections
///
/// Always recoverable by the caller: fix the input, or wait for the
/// election or request to change state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("only voters can request verification")]
    NotVoter,

    #[error("not authorized for this election")]
    NotAuthority,

    #[error("only organizers can create elections")]
    NotOrganizer,

    #[error("voting is not active for this election")]
    ElectionNotActive,

    #[error("election has already ended")]
    ElectionEnded,

    #[error("election has not been published to the ledger")]
    NotPublished,

    #[error("election {0} not found")]
    ElectionNotFound(uuid::Uuid),

    #[error("verification request {0} not found")]
    RequestNotFound(uuid::Uuid),

    #[error("verification request already exists")]
    DuplicateRequest,

    #[error("ID number already used in a pending or verified request")]
    DuplicateIdentity,

    #[error("request is already {from}, cannot become {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("blinded message must be {expected} bytes, found {found}")]
    BlindedMessageLength { expected: usize, found: usize },

    #[error("election must have at least one candidate")]
    NoCandidates,

    #[error("candidate id {0} is used more than once")]
    DuplicateCandidateId(String),

    #[error("participation already recorded for this election")]
    DuplicateParticipation,

    #[error("participation record {0} not found")]
    ParticipationNotFound(uuid::Uuid),
}
