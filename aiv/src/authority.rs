//! The election authority's side of the protocol.
//!
//! `Authority` is what an HTTP or UI layer calls into. It owns no state of its
//! own beyond the store handle; every transition is a read, a check and a
//! compare-and-swap write, so two racing approvals of the same request cannot
//! both issue a blind signature.

use crate::*;
use log::{info, warn};
use rsa::traits::PublicKeyParts;
use uuid::Uuid;

/// The authority's decision on a participation record
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Verified,
    Rejected,
}

impl From<Verdict> for ParticipationStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Verified => ParticipationStatus::Verified,
            Verdict::Rejected => ParticipationStatus::Rejected,
        }
    }
}

/// What `end_election` hands back
#[derive(Debug, Clone)]
pub struct EndedElection {
    pub election: Election,

    /// Base64 encryption secret, publishable now that voting is over
    pub encryption_secret: String,
}

pub struct Authority<S: Store> {
    store: S,
    tally_config: TallyConfig,
}

impl<S: Store> Authority<S> {
    pub fn new(store: S) -> Self {
        Authority {
            store,
            tally_config: TallyConfig::default(),
        }
    }

    pub fn with_tally_config(mut self, config: TallyConfig) -> Self {
        self.tally_config = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn election(&self, id: Uuid) -> Result<Election, Error> {
        self.store
            .get_election(id)?
            .ok_or_else(|| ValidationError::ElectionNotFound(id).into())
    }

    fn authorized_election(&self, caller: &Caller, id: Uuid) -> Result<Election, Error> {
        let election = self.election(id)?;
        if !election.is_authority(caller) {
            return Err(ValidationError::NotAuthority.into());
        }
        Ok(election)
    }

    fn request(&self, id: Uuid) -> Result<VerificationRequest, Error> {
        self.store
            .get_request(id)?
            .ok_or_else(|| ValidationError::RequestNotFound(id).into())
    }

    /// Create an election with fresh keys. Organizers only.
    pub fn create_election(
        &self,
        caller: &Caller,
        title: &str,
        description: &str,
        candidates: Vec<Candidate>,
        status: ElectionStatus,
    ) -> Result<Election, Error> {
        if caller.role != Role::Organizer {
            return Err(ValidationError::NotOrganizer.into());
        }

        let (mut election, _keys) = Election::new(caller.id, title, candidates)?;
        election.description = description.to_owned();
        election.status = status;
        self.store.insert_election(election.clone())?;

        info!("created election {} ({:?})", election.id, election.status);
        Ok(election)
    }

    /// Record the id of the election's object on the ledger
    pub fn publish_election(
        &self,
        caller: &Caller,
        election_id: Uuid,
        on_chain_id: &str,
    ) -> Result<Election, Error> {
        let mut election = self.authorized_election(caller, election_id)?;
        if election.status == ElectionStatus::Ended {
            return Err(ValidationError::ElectionEnded.into());
        }

        let status = election.status;
        election.on_chain_id = Some(on_chain_id.to_owned());
        self.store.update_election(election.clone(), status)?;

        info!("election {} published as {}", election.id, on_chain_id);
        Ok(election)
    }

    /// Move an upcoming election into its voting window
    pub fn open_election(&self, caller: &Caller, election_id: Uuid) -> Result<Election, Error> {
        let mut election = self.authorized_election(caller, election_id)?;
        match election.status {
            ElectionStatus::Upcoming => {}
            ElectionStatus::Ongoing => return Ok(election),
            ElectionStatus::Ended => return Err(ValidationError::ElectionEnded.into()),
        }

        election.status = ElectionStatus::Ongoing;
        self.store
            .update_election(election.clone(), ElectionStatus::Upcoming)?;

        info!("election {} opened", election.id);
        Ok(election)
    }

    /// Public keys for voters. Anyone may ask.
    pub fn public_keys(&self, election_id: Uuid) -> Result<ElectionPublicKeys, Error> {
        self.election(election_id)?.public_keys()
    }

    fn require_active(election: &Election) -> Result<(), ValidationError> {
        if election.is_active() {
            return Ok(());
        }
        match election.status {
            ElectionStatus::Ended => Err(ValidationError::ElectionEnded),
            _ => Err(ValidationError::ElectionNotActive),
        }
    }

    /// Submit an identity claim and a blinded address for signing.
    ///
    /// A rejected request for the same voter is reused; any other existing
    /// request fails with `DuplicateRequest`. An ID number held by another
    /// voter's pending or verified request fails with `DuplicateIdentity`.
    pub fn request_verification(
        &self,
        caller: &Caller,
        election_id: Uuid,
        identity: IdentityClaim,
        blinded_message: Vec<u8>,
    ) -> Result<VerificationRequest, Error> {
        if caller.role != Role::Voter {
            return Err(ValidationError::NotVoter.into());
        }
        let election = self.election(election_id)?;
        Self::require_active(&election)?;

        let modulus_len = election.public_keys()?.signing_key()?.size();
        if blinded_message.len() != modulus_len {
            return Err(ValidationError::BlindedMessageLength {
                expected: modulus_len,
                found: blinded_message.len(),
            }
            .into());
        }

        let request = match self.store.find_request(election_id, caller.id)? {
            Some(existing) if existing.is_live() => {
                return Err(ValidationError::DuplicateRequest.into())
            }
            Some(mut rejected) => {
                rejected.resubmit(identity, blinded_message);
                self.store
                    .update_request(rejected.clone(), RequestStatus::Rejected)
                    .map_err(duplicate_error)?;
                info!("verification request {} resubmitted", rejected.id);
                rejected
            }
            None => {
                let request =
                    VerificationRequest::new(election_id, caller.id, identity, blinded_message);
                self.store
                    .insert_request(request.clone())
                    .map_err(duplicate_error)?;
                info!("verification request {} submitted", request.id);
                request
            }
        };

        Ok(request)
    }

    /// Approve a pending request and blind-sign its blinded address
    pub fn approve_verification(
        &self,
        request_id: Uuid,
        caller: &Caller,
    ) -> Result<VerificationRequest, Error> {
        let mut request = self.request(request_id)?;
        let election = self.authorized_election(caller, request.election)?;
        if election.status == ElectionStatus::Ended {
            return Err(ValidationError::ElectionEnded.into());
        }
        if request.status != RequestStatus::Pending {
            return Err(ValidationError::InvalidTransition {
                from: request.status,
                to: RequestStatus::Verified,
            }
            .into());
        }

        let keys = election.keys()?;
        let blind_signature = blind::blind_sign(&keys.signing.secret, &request.blinded_message)?;

        request.verify(blind_signature);
        self.store
            .update_request(request.clone(), RequestStatus::Pending)
            .map_err(|e| self.lost_race(e, request_id, RequestStatus::Verified))?;

        info!("verification request {} approved", request.id);
        Ok(request)
    }

    /// Reject a request.
    ///
    /// Verified requests may be rejected too, when an identity check is
    /// reversed after issuance. From then on the wallet on the voter's
    /// participation record is on the exclusion list.
    pub fn reject_verification(
        &self,
        request_id: Uuid,
        caller: &Caller,
    ) -> Result<VerificationRequest, Error> {
        let mut request = self.request(request_id)?;
        self.authorized_election(caller, request.election)?;

        let from = request.status;
        if from == RequestStatus::Rejected {
            return Err(ValidationError::InvalidTransition {
                from,
                to: RequestStatus::Rejected,
            }
            .into());
        }

        request.reject();
        self.store
            .update_request(request.clone(), from)
            .map_err(|e| self.lost_race(e, request_id, RequestStatus::Rejected))?;

        info!("verification request {} rejected (was {})", request.id, from);
        Ok(request)
    }

    // A compare-and-swap lost against a concurrent transition
    fn lost_race(&self, err: StoreError, request_id: Uuid, to: RequestStatus) -> Error {
        if err != StoreError::Conflict {
            return err.into();
        }
        match self.store.get_request(request_id) {
            Ok(Some(current)) => ValidationError::InvalidTransition {
                from: current.status,
                to,
            }
            .into(),
            Ok(None) => ValidationError::RequestNotFound(request_id).into(),
            Err(e) => e.into(),
        }
    }

    /// Requests awaiting a decision, oldest first. Authority only.
    pub fn pending_requests(
        &self,
        caller: &Caller,
        election_id: Uuid,
    ) -> Result<Vec<VerificationRequest>, Error> {
        self.authorized_election(caller, election_id)?;
        let mut pending: Vec<VerificationRequest> = self
            .store
            .requests_for_election(election_id)?
            .into_iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .collect();
        pending.sort_by_key(|r| r.created_at);
        Ok(pending)
    }

    /// A voter's own request status, with the blind signature once verified
    pub fn check_status(
        &self,
        caller: &Caller,
        election_id: Uuid,
    ) -> Result<VerificationStatus, Error> {
        self.election(election_id)?;
        Ok(self
            .store
            .find_request(election_id, caller.id)?
            .map(|r| r.status_response())
            .unwrap_or_default())
    }

    /// Record that a voter is taking part, with the wallet they vote from
    pub fn record_participation(
        &self,
        caller: &Caller,
        election_id: Uuid,
        identity: IdentityClaim,
        wallet_address: Option<String>,
    ) -> Result<ParticipationRecord, Error> {
        if caller.role != Role::Voter {
            return Err(ValidationError::NotVoter.into());
        }
        let election = self.election(election_id)?;
        Self::require_active(&election)?;

        let record = ParticipationRecord::new(election_id, caller.id, identity, wallet_address);
        self.store
            .insert_participation(record.clone())
            .map_err(|e| match e {
                StoreError::DuplicatePair => ValidationError::DuplicateParticipation.into(),
                e => Error::from(e),
            })?;

        info!("participation {} recorded", record.id);
        Ok(record)
    }

    /// Verify or reject a voter's current participation record
    pub fn evaluate_participation(
        &self,
        caller: &Caller,
        record_id: Uuid,
        verdict: Verdict,
    ) -> Result<ParticipationRecord, Error> {
        let mut record = self
            .store
            .get_participation(record_id)?
            .ok_or(ValidationError::ParticipationNotFound(record_id))?;
        self.authorized_election(caller, record.election)?;
        if !record.is_current() {
            return Err(ValidationError::ParticipationNotFound(record_id).into());
        }

        let from = record.status;
        record.status = verdict.into();
        record.evaluated_at = Some(chrono::Utc::now());
        self.store.update_participation(record.clone(), from)?;

        info!("participation {} marked {:?}", record.id, record.status);
        Ok(record)
    }

    /// Wallet addresses whose ballots must not count
    pub fn exclusion_list(&self, caller: &Caller, election_id: Uuid) -> Result<ExclusionList, Error> {
        self.authorized_election(caller, election_id)?;
        let records = self.store.participation_for_election(election_id)?;
        let requests = self.store.requests_for_election(election_id)?;
        let list = ExclusionList::from_history(&records, &requests);
        if list.unresolved > 0 {
            warn!(
                "election {}: {} excluded participants have no wallet on file and cannot be excluded",
                election_id, list.unresolved
            );
        }
        Ok(list)
    }

    fn scan<L, D>(
        &self,
        election: &Election,
        exclusions: &ExclusionList,
        ledger: &L,
        decoder: &D,
        cancel: &CancelToken,
    ) -> Result<TallyResult, Error>
    where
        L: Ledger,
        D: CallDecoder<L::Transaction>,
    {
        let object_id = election
            .on_chain_id
            .as_deref()
            .ok_or(ValidationError::NotPublished)?;
        let keys = election.keys()?;

        TallyEngine::for_keys(&keys)
            .with_config(self.tally_config.clone())
            .with_candidates(&election.candidates)
            .run(ledger, decoder, object_id, exclusions, cancel)
    }

    /// Count the ballots so far without changing the election
    pub fn preview_tally<L, D>(
        &self,
        caller: &Caller,
        election_id: Uuid,
        ledger: &L,
        decoder: &D,
        cancel: &CancelToken,
    ) -> Result<TallyResult, Error>
    where
        L: Ledger,
        D: CallDecoder<L::Transaction>,
    {
        let election = self.authorized_election(caller, election_id)?;
        if let Some(result) = &election.result {
            return Ok(result.clone());
        }
        let exclusions = self.exclusion_list(caller, election_id)?;
        self.scan(&election, &exclusions, ledger, decoder, cancel)
    }

    /// Run the final tally, freeze it on the election and close voting.
    ///
    /// A failed or cancelled scan leaves the election untouched.
    pub fn end_election<L, D>(
        &self,
        caller: &Caller,
        election_id: Uuid,
        ledger: &L,
        decoder: &D,
        cancel: &CancelToken,
    ) -> Result<EndedElection, Error>
    where
        L: Ledger,
        D: CallDecoder<L::Transaction>,
    {
        let mut election = self.authorized_election(caller, election_id)?;
        Self::require_active(&election)?;

        let exclusions = self.exclusion_list(caller, election_id)?;
        let result = self.scan(&election, &exclusions, ledger, decoder, cancel)?;
        let encryption_secret = election.keys()?.disclose_encryption_secret();

        election.result = Some(result);
        election.status = ElectionStatus::Ended;
        self.store
            .update_election(election.clone(), ElectionStatus::Ongoing)
            .map_err(|e| match e {
                StoreError::Conflict => ValidationError::ElectionEnded.into(),
                e => Error::from(e),
            })?;

        info!("election {} ended", election.id);
        Ok(EndedElection {
            election,
            encryption_secret,
        })
    }
}

fn duplicate_error(err: StoreError) -> Error {
    match err {
        StoreError::DuplicatePair | StoreError::Conflict => ValidationError::DuplicateRequest.into(),
        StoreError::DuplicateIdentity => ValidationError::DuplicateIdentity.into(),
        e => e.into(),
    }
}
