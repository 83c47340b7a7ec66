//! The public ledger, as seen by the tally.
//!
//! The ledger is an external append-only log. The tally only needs to page
//! through every transaction that touched an election's on-chain object and,
//! for each, learn who signed it and which calls it made with which byte-vector
//! arguments. Both concerns sit behind traits so no particular ledger SDK leaks
//! into the tally.

use crate::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Ledger query failures. The scan that hit one is aborted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger unreachable: {0}")]
    Unreachable(String),

    #[error("ledger request timed out")]
    Timeout,

    #[error("invalid pagination cursor: {0}")]
    InvalidCursor(String),

    #[error("malformed ledger response: {0}")]
    Malformed(String),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unreachable(_) | LedgerError::Timeout)
    }
}

/// Opaque pagination cursor
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub String);

/// One page of query results
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub next_cursor: Option<Cursor>,
    pub has_next_page: bool,
}

/// Read access to the ledger
pub trait Ledger {
    type Transaction;

    /// Transactions that changed `object_id`, oldest first, starting after `cursor`.
    fn query_transactions(
        &self,
        object_id: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page<Self::Transaction>, LedgerError>;
}

/// A call made by a transaction, with its pure byte-vector arguments
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DecodedCall {
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub module: String,
    pub function: String,
    #[serde(with = "b64_vec")]
    pub args: Vec<Vec<u8>>,
}

/// The parts of a ledger transaction the tally relies on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub digest: String,
    /// Position in the ledger's total order
    pub sequence: u64,
    /// Address of the cryptographic signer
    pub sender: String,
    pub calls: Vec<DecodedCall>,
}

/// Adapter from a ledger SDK's transaction shape to `DecodedTransaction`.
///
/// Returns `None` for transactions that cannot be decoded (unknown kinds,
/// missing sender); those never count.
pub trait CallDecoder<T> {
    fn decode(&self, tx: &T) -> Option<DecodedTransaction>;
}

/// A transaction that is already in decoded form
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub digest: String,
    pub sequence: u64,
    pub sender: String,
    /// The on-chain objects this transaction changed
    pub changed_objects: Vec<String>,
    pub calls: Vec<DecodedCall>,
}

impl LedgerRecord {
    /// A ballot-cast transaction with the two arguments the `vote` call takes
    pub fn ballot(
        digest: impl Into<String>,
        sequence: u64,
        sender: impl Into<String>,
        object_id: impl Into<String>,
        encrypted_content: Vec<u8>,
        eligibility_proof: Vec<u8>,
    ) -> Self {
        LedgerRecord {
            digest: digest.into(),
            sequence,
            sender: sender.into(),
            changed_objects: vec![object_id.into()],
            calls: vec![DecodedCall {
                package: String::new(),
                module: String::new(),
                function: DEFAULT_BALLOT_FUNCTION.to_owned(),
                args: vec![encrypted_content, eligibility_proof],
            }],
        }
    }
}

/// Decoder for `LedgerRecord`, which needs no decoding
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordDecoder;

impl CallDecoder<LedgerRecord> for RecordDecoder {
    fn decode(&self, tx: &LedgerRecord) -> Option<DecodedTransaction> {
        if tx.sender.is_empty() {
            return None;
        }
        Some(DecodedTransaction {
            digest: tx.digest.clone(),
            sequence: tx.sequence,
            sender: tx.sender.clone(),
            calls: tx.calls.clone(),
        })
    }
}

/// Append-only in-memory ledger.
///
/// Cursors are decimal positions in the log. Cloning shares the log.
#[derive(Default, Clone, Debug)]
pub struct MemLedger {
    inner: Arc<RwLock<Vec<LedgerRecord>>>,
}

impl MemLedger {
    /// Append a transaction. The log is never rewritten.
    pub fn append(&self, tx: LedgerRecord) {
        let mut log = self.inner.write().unwrap_or_else(|e| e.into_inner());
        log.push(tx);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load a JSON array of `LedgerRecord`s, e.g. a dump of a real ledger
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let records: Vec<LedgerRecord> = serde_json::from_str(json)?;
        Ok(MemLedger::from(records))
    }
}

impl From<Vec<LedgerRecord>> for MemLedger {
    fn from(records: Vec<LedgerRecord>) -> Self {
        MemLedger {
            inner: Arc::new(RwLock::new(records)),
        }
    }
}

impl Ledger for MemLedger {
    type Transaction = LedgerRecord;

    fn query_transactions(
        &self,
        object_id: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page<LedgerRecord>, LedgerError> {
        let start = match cursor {
            Some(Cursor(c)) => c
                .parse::<usize>()
                .map_err(|_| LedgerError::InvalidCursor(c.clone()))?,
            None => 0,
        };

        let log = self.inner.read().unwrap_or_else(|e| e.into_inner());
        if start > log.len() {
            return Err(LedgerError::InvalidCursor(start.to_string()));
        }

        let mut data = Vec::new();
        let mut position = start;
        while position < log.len() && data.len() < limit.max(1) {
            let tx = &log[position];
            if tx.changed_objects.iter().any(|o| o == object_id) {
                data.push(tx.clone());
            }
            position += 1;
        }

        let has_next_page = position < log.len();
        Ok(Page {
            data,
            next_cursor: Some(Cursor(position.to_string())),
            has_next_page,
        })
    }
}

/// Cooperative cancellation for long ledger scans. Clones share the flag.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
