//! Counting ballots straight from the ledger.
//!
//! A scan collects every transaction that touched the election's on-chain
//! object, orders them by ledger sequence (digest breaks ties), and walks them
//! once. For each ballot call the checks run in a fixed order: exclusion,
//! one-ballot-per-sender, eligibility proof, decryption, payload. Failing any
//! check skips that one transaction; only ledger failures, cancellation or the
//! scan limit abort the whole scan, and then no result is produced.
//!
//! Nothing is cached between scans, so running twice over the same ledger and
//! exclusion list yields the same result.

use crate::*;
use indexmap::IndexMap;
use log::{debug, info};
use rsa::RsaPublicKey;
use std::collections::HashSet;
use x25519_dalek::StaticSecret;

/// Name of the ballot-cast function on the ledger
pub const DEFAULT_BALLOT_FUNCTION: &str = "vote";

/// Transactions requested per ledger page
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Upper bound on transactions in one scan
pub const DEFAULT_MAX_TRANSACTIONS: usize = 10_000;

/// Scan settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TallyConfig {
    /// Function name that marks a ballot-cast call
    pub ballot_function: String,

    /// Only count calls into this package, when set
    pub package: Option<String>,

    pub page_size: usize,

    /// Abort with `ScanLimitExceeded` past this many transactions
    pub max_transactions: usize,
}

impl Default for TallyConfig {
    fn default() -> Self {
        TallyConfig {
            ballot_function: DEFAULT_BALLOT_FUNCTION.to_owned(),
            package: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_transactions: DEFAULT_MAX_TRANSACTIONS,
        }
    }
}

/// A ballot that made it into the count
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CountedBallot {
    pub digest: String,
    pub sequence: u64,
    pub sender: String,
    pub candidate_id: String,
}

/// Why transactions were left out of the count
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipCounts {
    /// Not a ballot-cast call, or undecodable
    pub not_ballot: usize,
    /// Sender is on the exclusion list
    pub excluded: usize,
    /// Sender already has a counted ballot
    pub duplicate: usize,
    /// Eligibility proof does not verify for the sender
    pub invalid_proof: usize,
    pub undecryptable: usize,
    /// Wrong argument count or unparseable payload
    pub malformed: usize,
    /// Candidate id not on the ballot
    pub unknown_candidate: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.not_ballot
            + self.excluded
            + self.duplicate
            + self.invalid_proof
            + self.undecryptable
            + self.malformed
            + self.unknown_candidate
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TallyResult {
    /// Votes per candidate id
    pub tally: IndexMap<String, u64>,

    /// Counted ballots, in count order
    pub valid_votes: Vec<CountedBallot>,

    /// Number of counted ballots
    pub total: usize,

    /// Number of transactions examined
    pub scanned: usize,

    pub skipped: SkipCounts,
}

enum Outcome {
    Counted(CountedBallot),
    Skipped(Skip),
}

#[derive(Debug, Clone, Copy)]
enum Skip {
    NotBallot,
    Excluded,
    Duplicate,
    InvalidProof,
    Undecryptable,
    Malformed,
    UnknownCandidate,
}

/// Reconstructs vote counts for one election.
///
/// Holds the election's encryption secret (to open ballots) and signing public
/// key (to check eligibility proofs).
pub struct TallyEngine {
    encryption_secret: StaticSecret,
    signing_public: RsaPublicKey,
    candidates: Option<Vec<String>>,
    config: TallyConfig,
}

impl TallyEngine {
    pub fn new(encryption_secret: StaticSecret, signing_public: RsaPublicKey) -> Self {
        TallyEngine {
            encryption_secret,
            signing_public,
            candidates: None,
            config: TallyConfig::default(),
        }
    }

    /// Build an engine from an election's full key material
    pub fn for_keys(keys: &ElectionKeys) -> Self {
        TallyEngine::new(keys.encryption.secret.clone(), keys.signing.public.clone())
    }

    pub fn with_config(mut self, config: TallyConfig) -> Self {
        self.config = config;
        self
    }

    /// Restrict the count to these candidates, listed with zero votes up front
    pub fn with_candidates(mut self, candidates: &[Candidate]) -> Self {
        self.candidates = Some(candidates.iter().map(|c| c.id.clone()).collect());
        self
    }

    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    /// Scan the ledger and count.
    pub fn run<L, D>(
        &self,
        ledger: &L,
        decoder: &D,
        object_id: &str,
        exclusions: &ExclusionList,
        cancel: &CancelToken,
    ) -> Result<TallyResult, Error>
    where
        L: Ledger,
        D: CallDecoder<L::Transaction>,
    {
        let transactions = self.collect(ledger, decoder, object_id, cancel)?;
        self.count(transactions, exclusions, cancel)
    }

    /// Page through every transaction that touched `object_id`.
    ///
    /// Undecodable transactions come back as `None` so they still count as scanned.
    fn collect<L, D>(
        &self,
        ledger: &L,
        decoder: &D,
        object_id: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<Option<DecodedTransaction>>, Error>
    where
        L: Ledger,
        D: CallDecoder<L::Transaction>,
    {
        let mut transactions = Vec::new();
        let mut cursor: Option<Cursor> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::ScanCancelled);
            }

            let page = ledger.query_transactions(object_id, cursor.as_ref(), self.config.page_size)?;
            for tx in page.data.iter() {
                transactions.push(decoder.decode(tx));
            }
            if transactions.len() > self.config.max_transactions {
                return Err(Error::ScanLimitExceeded(self.config.max_transactions));
            }

            match page.next_cursor {
                Some(next) if page.has_next_page => cursor = Some(next),
                _ => break,
            }
        }

        debug!(
            "collected {} transactions for {}",
            transactions.len(),
            object_id
        );
        Ok(transactions)
    }

    /// Count already collected transactions.
    pub fn count(
        &self,
        transactions: Vec<Option<DecodedTransaction>>,
        exclusions: &ExclusionList,
        cancel: &CancelToken,
    ) -> Result<TallyResult, Error> {
        let mut result = TallyResult {
            scanned: transactions.len(),
            ..TallyResult::default()
        };
        if let Some(candidates) = &self.candidates {
            for id in candidates {
                result.tally.insert(id.clone(), 0);
            }
        }

        let mut decoded: Vec<DecodedTransaction> = Vec::with_capacity(transactions.len());
        for tx in transactions {
            match tx {
                Some(tx) => decoded.push(tx),
                None => result.skipped.not_ballot += 1,
            }
        }
        decoded.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then_with(|| a.digest.cmp(&b.digest))
        });

        let mut counted_senders: HashSet<String> = HashSet::new();
        for tx in decoded.iter() {
            if cancel.is_cancelled() {
                return Err(Error::ScanCancelled);
            }

            match self.evaluate(tx, exclusions, &counted_senders) {
                Outcome::Counted(ballot) => {
                    *result.tally.entry(ballot.candidate_id.clone()).or_insert(0) += 1;
                    counted_senders.insert(ballot.sender.clone());
                    result.valid_votes.push(ballot);
                }
                Outcome::Skipped(reason) => {
                    debug!("skipping transaction {}: {:?}", tx.digest, reason);
                    let skipped = &mut result.skipped;
                    match reason {
                        Skip::NotBallot => skipped.not_ballot += 1,
                        Skip::Excluded => skipped.excluded += 1,
                        Skip::Duplicate => skipped.duplicate += 1,
                        Skip::InvalidProof => skipped.invalid_proof += 1,
                        Skip::Undecryptable => skipped.undecryptable += 1,
                        Skip::Malformed => skipped.malformed += 1,
                        Skip::UnknownCandidate => skipped.unknown_candidate += 1,
                    }
                }
            }
        }

        result.total = result.valid_votes.len();
        info!(
            "tally complete: {} counted, {} scanned, {} skipped",
            result.total,
            result.scanned,
            result.skipped.total()
        );
        Ok(result)
    }

    fn is_ballot_call(&self, call: &DecodedCall) -> bool {
        call.function == self.config.ballot_function
            && self
                .config
                .package
                .as_ref()
                .map_or(true, |package| &call.package == package)
    }

    fn evaluate(
        &self,
        tx: &DecodedTransaction,
        exclusions: &ExclusionList,
        counted_senders: &HashSet<String>,
    ) -> Outcome {
        let call = match tx.calls.iter().find(|c| self.is_ballot_call(c)) {
            Some(call) => call,
            None => return Outcome::Skipped(Skip::NotBallot),
        };

        if exclusions.contains(&tx.sender) {
            return Outcome::Skipped(Skip::Excluded);
        }
        if counted_senders.contains(&tx.sender) {
            return Outcome::Skipped(Skip::Duplicate);
        }

        let (encrypted_content, eligibility_proof) = match call.args.as_slice() {
            [content, proof] => (content, proof),
            _ => return Outcome::Skipped(Skip::Malformed),
        };

        if !blind::verify(&self.signing_public, eligibility_proof, tx.sender.as_bytes()) {
            return Outcome::Skipped(Skip::InvalidProof);
        }

        let plaintext = match ballot::decrypt(encrypted_content, &self.encryption_secret) {
            Ok(plaintext) => plaintext,
            Err(_) => return Outcome::Skipped(Skip::Undecryptable),
        };

        let payload = match BallotPayload::from_bytes(&plaintext) {
            Ok(payload) => payload,
            Err(_) => return Outcome::Skipped(Skip::Malformed),
        };

        if let Some(candidates) = &self.candidates {
            if !candidates.contains(&payload.candidate_id) {
                return Outcome::Skipped(Skip::UnknownCandidate);
            }
        }

        Outcome::Counted(CountedBallot {
            digest: tx.digest.clone(),
            sequence: tx.sequence,
            sender: tx.sender.clone(),
            candidate_id: payload.candidate_id,
        })
    }
}

/// Tally an election's ballots with the default scan settings.
pub fn run_tally<L, D>(
    ledger: &L,
    decoder: &D,
    object_id: &str,
    encryption_secret: StaticSecret,
    signing_public: RsaPublicKey,
    exclusions: &ExclusionList,
) -> Result<TallyResult, Error>
where
    L: Ledger,
    D: CallDecoder<L::Transaction>,
{
    TallyEngine::new(encryption_secret, signing_public).run(
        ledger,
        decoder,
        object_id,
        exclusions,
        &CancelToken::new(),
    )
}
