use crate::*;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record changed since it was read
    #[error("record was modified concurrently")]
    Conflict,

    #[error("a record already exists for this election and voter")]
    DuplicatePair,

    #[error("ID number already used in a pending or verified request")]
    DuplicateIdentity,

    #[error("record not found")]
    NotFound,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The document store behind an election authority.
///
/// Implementations must apply each method atomically. The uniqueness rules
/// on insert and the status compare-and-swap on update are what serialize
/// concurrent lifecycle transitions.
pub trait Store {
    fn insert_election(&self, election: Election) -> Result<(), StoreError>;

    fn get_election(&self, id: Uuid) -> Result<Option<Election>, StoreError>;

    /// Replace an election if its stored status is still `expected`
    fn update_election(&self, election: Election, expected: ElectionStatus)
        -> Result<(), StoreError>;

    /// Insert a new verification request.
    ///
    /// Fails with `DuplicatePair` if any request exists for the same
    /// (election, voter), and with `DuplicateIdentity` if a non-rejected
    /// request from another voter in the same election has the same ID number.
    fn insert_request(&self, request: VerificationRequest) -> Result<(), StoreError>;

    fn get_request(&self, id: Uuid) -> Result<Option<VerificationRequest>, StoreError>;

    fn find_request(
        &self,
        election: Uuid,
        voter: Uuid,
    ) -> Result<Option<VerificationRequest>, StoreError>;

    /// Replace a request if its stored status is still `expected`.
    ///
    /// When the new status is not `Rejected`, the ID number rule of
    /// `insert_request` is checked again.
    fn update_request(
        &self,
        request: VerificationRequest,
        expected: RequestStatus,
    ) -> Result<(), StoreError>;

    /// All requests of an election in submission order
    fn requests_for_election(&self, election: Uuid)
        -> Result<Vec<VerificationRequest>, StoreError>;

    /// Insert a participation record.
    ///
    /// A voter has at most one current record per election. A current record
    /// that was rejected is marked `Superseded` in the same step; any other
    /// current record fails with `DuplicatePair`.
    fn insert_participation(&self, record: ParticipationRecord) -> Result<(), StoreError>;

    fn get_participation(&self, id: Uuid) -> Result<Option<ParticipationRecord>, StoreError>;

    /// Replace a participation record if its stored status is still `expected`
    fn update_participation(
        &self,
        record: ParticipationRecord,
        expected: ParticipationStatus,
    ) -> Result<(), StoreError>;

    /// All participation records of an election, superseded ones included
    fn participation_for_election(
        &self,
        election: Uuid,
    ) -> Result<Vec<ParticipationRecord>, StoreError>;
}

#[derive(Default, Debug)]
struct Tables {
    elections: BTreeMap<Uuid, Election>,
    requests: IndexMap<Uuid, VerificationRequest>,
    participation: IndexMap<Uuid, ParticipationRecord>,
}

impl Tables {
    fn identity_taken(&self, request: &VerificationRequest) -> bool {
        self.requests.values().any(|other| {
            other.id != request.id
                && other.election == request.election
                && other.voter != request.voter
                && other.is_live()
                && other.identity.id_number == request.identity.id_number
        })
    }
}

/// A simple store that keeps everything in memory.
///
/// Clones share the same tables.
#[derive(Default, Clone, Debug)]
pub struct MemStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemStore {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_owned()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_owned()))
    }
}

impl Store for MemStore {
    fn insert_election(&self, election: Election) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.elections.contains_key(&election.id) {
            return Err(StoreError::Conflict);
        }
        tables.elections.insert(election.id, election);
        Ok(())
    }

    fn get_election(&self, id: Uuid) -> Result<Option<Election>, StoreError> {
        Ok(self.read()?.elections.get(&id).cloned())
    }

    fn update_election(
        &self,
        election: Election,
        expected: ElectionStatus,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let stored = tables
            .elections
            .get_mut(&election.id)
            .ok_or(StoreError::NotFound)?;
        if stored.status != expected {
            return Err(StoreError::Conflict);
        }
        *stored = election;
        Ok(())
    }

    fn insert_request(&self, request: VerificationRequest) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables
            .requests
            .values()
            .any(|r| r.election == request.election && r.voter == request.voter)
        {
            return Err(StoreError::DuplicatePair);
        }
        if tables.identity_taken(&request) {
            return Err(StoreError::DuplicateIdentity);
        }
        tables.requests.insert(request.id, request);
        Ok(())
    }

    fn get_request(&self, id: Uuid) -> Result<Option<VerificationRequest>, StoreError> {
        Ok(self.read()?.requests.get(&id).cloned())
    }

    fn find_request(
        &self,
        election: Uuid,
        voter: Uuid,
    ) -> Result<Option<VerificationRequest>, StoreError> {
        Ok(self
            .read()?
            .requests
            .values()
            .find(|r| r.election == election && r.voter == voter)
            .cloned())
    }

    fn update_request(
        &self,
        request: VerificationRequest,
        expected: RequestStatus,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let stored_status = tables
            .requests
            .get(&request.id)
            .ok_or(StoreError::NotFound)?
            .status;
        if stored_status != expected {
            return Err(StoreError::Conflict);
        }
        if request.is_live() && tables.identity_taken(&request) {
            return Err(StoreError::DuplicateIdentity);
        }
        tables.requests.insert(request.id, request);
        Ok(())
    }

    fn requests_for_election(
        &self,
        election: Uuid,
    ) -> Result<Vec<VerificationRequest>, StoreError> {
        Ok(self
            .read()?
            .requests
            .values()
            .filter(|r| r.election == election)
            .cloned()
            .collect())
    }

    fn insert_participation(&self, record: ParticipationRecord) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let current = tables
            .participation
            .values_mut()
            .find(|p| p.election == record.election && p.voter == record.voter && p.is_current());

        if let Some(current) = current {
            if current.status != ParticipationStatus::Rejected {
                return Err(StoreError::DuplicatePair);
            }
            current.status = ParticipationStatus::Superseded;
        }
        tables.participation.insert(record.id, record);
        Ok(())
    }

    fn get_participation(&self, id: Uuid) -> Result<Option<ParticipationRecord>, StoreError> {
        Ok(self.read()?.participation.get(&id).cloned())
    }

    fn update_participation(
        &self,
        record: ParticipationRecord,
        expected: ParticipationStatus,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let stored = tables
            .participation
            .get_mut(&record.id)
            .ok_or(StoreError::NotFound)?;
        if stored.status != expected {
            return Err(StoreError::Conflict);
        }
        *stored = record;
        Ok(())
    }

    fn participation_for_election(
        &self,
        election: Uuid,
    ) -> Result<Vec<ParticipationRecord>, StoreError> {
        Ok(self
            .read()?
            .participation
            .values()
            .filter(|p| p.election == election)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(election: Uuid, voter: Uuid, id_number: &str) -> VerificationRequest {
        VerificationRequest::new(
            election,
            voter,
            IdentityClaim::new("Voter", id_number),
            vec![1, 2, 3],
        )
    }

    #[test]
    fn test_request_uniqueness() {
        let store = MemStore::default();
        let election = Uuid::new_v4();
        let (v1, v2) = (Uuid::new_v4(), Uuid::new_v4());

        store.insert_request(request(election, v1, "123")).unwrap();
        assert_eq!(
            store.insert_request(request(election, v1, "999")),
            Err(StoreError::DuplicatePair)
        );
        assert_eq!(
            store.insert_request(request(election, v2, "123")),
            Err(StoreError::DuplicateIdentity)
        );

        // Same ID number in another election is fine
        store.insert_request(request(Uuid::new_v4(), v2, "123")).unwrap();
    }

    #[test]
    fn test_rejected_identity_is_free() {
        let store = MemStore::default();
        let election = Uuid::new_v4();
        let (v1, v2) = (Uuid::new_v4(), Uuid::new_v4());

        let mut first = request(election, v1, "123");
        store.insert_request(first.clone()).unwrap();
        first.reject();
        store
            .update_request(first.clone(), RequestStatus::Pending)
            .unwrap();

        store.insert_request(request(election, v2, "123")).unwrap();

        // The first voter cannot resubmit with the number now in use
        first.resubmit(IdentityClaim::new("Voter", "123"), vec![7]);
        assert_eq!(
            store.update_request(first, RequestStatus::Rejected),
            Err(StoreError::DuplicateIdentity)
        );
    }

    #[test]
    fn test_update_is_compare_and_swap() {
        let store = MemStore::default();
        let mut r = request(Uuid::new_v4(), Uuid::new_v4(), "1");
        store.insert_request(r.clone()).unwrap();

        r.verify(vec![1]);
        store.update_request(r.clone(), RequestStatus::Pending).unwrap();
        // A second approval racing on the same stale read loses
        assert_eq!(
            store.update_request(r.clone(), RequestStatus::Pending),
            Err(StoreError::Conflict)
        );

        let mut unknown = request(Uuid::new_v4(), Uuid::new_v4(), "2");
        unknown.reject();
        assert_eq!(
            store.update_request(unknown, RequestStatus::Pending),
            Err(StoreError::NotFound)
        );
    }

    #[test]
    fn test_participation_supersede() {
        let store = MemStore::default();
        let (election, voter) = (Uuid::new_v4(), Uuid::new_v4());
        let identity = IdentityClaim::new("Voter", "5");

        let mut first = ParticipationRecord::new(election, voter, identity.clone(), None);
        store.insert_participation(first.clone()).unwrap();
        assert_eq!(
            store.insert_participation(ParticipationRecord::new(
                election,
                voter,
                identity.clone(),
                None
            )),
            Err(StoreError::DuplicatePair)
        );

        first.status = ParticipationStatus::Rejected;
        store
            .update_participation(first.clone(), ParticipationStatus::Pending)
            .unwrap();

        let second = ParticipationRecord::new(election, voter, identity, Some("0x1".to_owned()));
        store.insert_participation(second.clone()).unwrap();

        let all = store.participation_for_election(election).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].status, ParticipationStatus::Superseded);
        assert_eq!(all[1].id, second.id);
    }

    #[test]
    fn test_clones_share_tables() {
        let store = MemStore::default();
        let clone = store.clone();
        let r = request(Uuid::new_v4(), Uuid::new_v4(), "1");
        store.insert_request(r.clone()).unwrap();
        assert_eq!(clone.get_request(r.id).unwrap(), Some(r));
    }
}
