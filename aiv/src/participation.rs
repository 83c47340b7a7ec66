//! Application-side vote records.
//!
//! The ledger knows addresses, not people. A `ParticipationRecord` is the
//! off-chain link between a voter's identity check and the wallet address they
//! vote from. Together with rejected verification requests, rejected records
//! are what feed the tally's exclusion list.

use crate::*;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParticipationStatus {
    Pending,
    Verified,
    Rejected,
    /// Replaced by a later submission after rejection. Kept for audit.
    Superseded,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ParticipationRecord {
    pub id: Uuid,
    pub election: Uuid,
    pub voter: Uuid,
    pub identity: IdentityClaim,

    /// Ledger address the voter casts from, when known
    pub wallet_address: Option<String>,

    pub status: ParticipationStatus,
    pub created_at: DateTime<Utc>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl ParticipationRecord {
    pub fn new(
        election: Uuid,
        voter: Uuid,
        identity: IdentityClaim,
        wallet_address: Option<String>,
    ) -> Self {
        ParticipationRecord {
            id: Uuid::new_v4(),
            election,
            voter,
            identity,
            wallet_address,
            status: ParticipationStatus::Pending,
            created_at: Utc::now(),
            evaluated_at: None,
        }
    }

    /// Whether this is the voter's current record
    pub fn is_current(&self) -> bool {
        self.status != ParticipationStatus::Superseded
    }
}

/// Addresses whose ballots must not be counted
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionList {
    pub addresses: BTreeSet<String>,

    /// Rejected records with no wallet address on file. Their ballots, if
    /// any, cannot be excluded.
    pub unresolved: usize,
}

impl ExclusionList {
    /// Build the list from an election's participation records alone
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ParticipationRecord>,
    {
        Self::from_history(records, std::iter::empty())
    }

    /// Build the list from an election's participation records and its
    /// verification requests.
    ///
    /// A voter is excluded when their current record was rejected, or when
    /// their verification request is rejected now (an identity check
    /// reversed after issuance). Either way the wallet on the current
    /// record is what gets listed.
    pub fn from_history<'a, R, Q>(records: R, requests: Q) -> Self
    where
        R: IntoIterator<Item = &'a ParticipationRecord>,
        Q: IntoIterator<Item = &'a VerificationRequest>,
    {
        let revoked: BTreeSet<Uuid> = requests
            .into_iter()
            .filter(|r| r.status == RequestStatus::Rejected)
            .map(|r| r.voter)
            .collect();

        let mut list = ExclusionList::default();
        for record in records {
            let excluded = match record.status {
                ParticipationStatus::Rejected => true,
                ParticipationStatus::Superseded => false,
                _ => revoked.contains(&record.voter),
            };
            if !excluded {
                continue;
            }
            match &record.wallet_address {
                Some(address) if !address.is_empty() => {
                    list.addresses.insert(address.clone());
                }
                _ => list.unresolved += 1,
            }
        }
        list
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.contains(address)
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ExclusionList {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        ExclusionList {
            addresses: iter.into_iter().map(Into::into).collect(),
            unresolved: 0,
        }
    }
}
