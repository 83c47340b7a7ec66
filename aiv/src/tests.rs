use super::*;
use uuid::Uuid;

const ELECTION_OBJECT: &str = "0x5ca1ab1e";

/// A voter's device: a wallet address plus the credential run in progress
struct Voter {
    caller: Caller,
    address: String,
    credential: Option<CredentialRequest>,
    proof: Option<Vec<u8>>,
}

impl Voter {
    fn new(address: &str) -> Self {
        Voter {
            caller: Caller::voter(Uuid::new_v4()),
            address: address.to_owned(),
            credential: None,
            proof: None,
        }
    }

    fn request(
        &mut self,
        authority: &Authority<MemStore>,
        election: &Election,
        id_number: &str,
    ) -> Result<VerificationRequest, Error> {
        let keys = authority.public_keys(election.id)?;
        let credential = CredentialRequest::new(&keys.signing_key()?, &self.address)?;
        let blinded = credential.blinded_message().to_vec();
        self.credential = Some(credential);
        authority.request_verification(
            &self.caller,
            election.id,
            IdentityClaim::new("Voter", id_number),
            blinded,
        )
    }

    fn finalize(&mut self, authority: &Authority<MemStore>, election: &Election) {
        let status = authority.check_status(&self.caller, election.id).unwrap();
        assert_eq!(status.status, Some(RequestStatus::Verified));

        let keys = authority.public_keys(election.id).unwrap();
        let credential = self.credential.take().unwrap();
        let proof = credential
            .finalize(&keys.signing_key().unwrap(), &status.signature.unwrap())
            .unwrap();
        self.proof = Some(proof);
    }

    fn cast(
        &self,
        authority: &Authority<MemStore>,
        election: &Election,
        ledger: &MemLedger,
        sequence: u64,
        candidate: &str,
    ) {
        let keys = authority.public_keys(election.id).unwrap();
        let content = encrypt_ballot(candidate, &keys.encryption_key().unwrap()).unwrap();
        ledger.append(LedgerRecord::ballot(
            format!("tx-{}", sequence),
            sequence,
            self.address.clone(),
            ELECTION_OBJECT,
            content,
            self.proof.clone().unwrap(),
        ));
    }
}

fn new_election(authority: &Authority<MemStore>, organizer: &Caller) -> Election {
    let election = authority
        .create_election(
            organizer,
            "Student union",
            "Annual vote",
            vec![Candidate::new("A", "Alice"), Candidate::new("B", "Bob")],
            ElectionStatus::Ongoing,
        )
        .unwrap();
    authority
        .publish_election(organizer, election.id, ELECTION_OBJECT)
        .unwrap()
}

#[test]
fn end_to_end_election() {
    let authority = Authority::new(MemStore::default());
    let organizer = Caller::organizer(Uuid::new_v4());
    let election = new_election(&authority, &organizer);
    let ledger = MemLedger::default();

    // V1 is verified and votes for A
    let mut v1 = Voter::new("0x600a76a1b2c3d4e5f60718293a4b5c6d7e8f9012345678901234567890120335");
    let request = v1.request(&authority, &election, "123").unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    authority.approve_verification(request.id, &organizer).unwrap();
    v1.finalize(&authority, &election);
    v1.cast(&authority, &election, &ledger, 1, "A");

    // V2 claims the same ID number while V1 is verified
    let mut v2 = Voter::new("0x02");
    let err = v2.request(&authority, &election, "123").unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::DuplicateIdentity)
    ));
    assert_eq!(
        err.to_string(),
        "aiv: ID number already used in a pending or verified request"
    );

    // Someone without a credential tries to vote
    ledger.append(LedgerRecord::ballot(
        "tx-forged",
        2,
        "0x03",
        ELECTION_OBJECT,
        encrypt_ballot("B", &authority.public_keys(election.id).unwrap().encryption_key().unwrap())
            .unwrap(),
        vec![0u8; 256],
    ));

    let preview = authority
        .preview_tally(&organizer, election.id, &ledger, &RecordDecoder, &CancelToken::new())
        .unwrap();

    let ended = authority
        .end_election(&organizer, election.id, &ledger, &RecordDecoder, &CancelToken::new())
        .unwrap();
    let result = ended.election.result.unwrap();
    assert_eq!(result, preview);
    assert_eq!(result.tally["A"], 1);
    assert_eq!(result.tally["B"], 0);
    assert_eq!(result.total, 1);
    assert_eq!(result.scanned, 2);
    assert_eq!(result.skipped.invalid_proof, 1);

    // With the secret disclosed, anyone can recount and get the same answer
    let secret = encryption_secret_from_base64(&ended.encryption_secret).unwrap();
    let signing = authority
        .public_keys(election.id)
        .unwrap()
        .signing_key()
        .unwrap();
    let recount = run_tally(
        &ledger,
        &RecordDecoder,
        ELECTION_OBJECT,
        secret,
        signing,
        &ExclusionList::default(),
    )
    .unwrap();
    assert_eq!(recount.valid_votes, result.valid_votes);

    // Voting is over
    let err = v2.request(&authority, &election, "456").unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::ElectionEnded)
    ));
}

#[test]
fn rejection_then_retry() {
    let authority = Authority::new(MemStore::default());
    let organizer = Caller::organizer(Uuid::new_v4());
    let election = new_election(&authority, &organizer);

    let mut v3 = Voter::new("0x33");
    let count = || {
        authority
            .store()
            .requests_for_election(election.id)
            .unwrap()
            .len()
    };

    let first = v3.request(&authority, &election, "999").unwrap();
    assert_eq!(count(), 1);

    // A second request while the first is pending is a duplicate
    let err = v3.request(&authority, &election, "999").unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::DuplicateRequest)
    ));

    authority.reject_verification(first.id, &organizer).unwrap();
    assert_eq!(count(), 1);

    let second = v3.request(&authority, &election, "999").unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.status, RequestStatus::Pending);
    assert_eq!(count(), 1);

    authority.approve_verification(second.id, &organizer).unwrap();
    assert_eq!(count(), 1);

    v3.finalize(&authority, &election);
    let stored = authority.store().find_request(election.id, v3.caller.id).unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Verified);
}

#[test]
fn shared_identity_frees_up_after_rejection() {
    let authority = Authority::new(MemStore::default());
    let organizer = Caller::organizer(Uuid::new_v4());
    let election = new_election(&authority, &organizer);

    let mut first = Voter::new("0x01");
    let mut second = Voter::new("0x02");

    let request = first.request(&authority, &election, "555").unwrap();
    assert!(matches!(
        second.request(&authority, &election, "555"),
        Err(Error::Validation(ValidationError::DuplicateIdentity))
    ));

    authority.reject_verification(request.id, &organizer).unwrap();
    second.request(&authority, &election, "555").unwrap();

    // Now the first voter is the one colliding
    assert!(matches!(
        first.request(&authority, &election, "555"),
        Err(Error::Validation(ValidationError::DuplicateIdentity))
    ));
}

#[test]
fn reversed_identity_check_excludes_ballot() {
    let authority = Authority::new(MemStore::default());
    let organizer = Caller::organizer(Uuid::new_v4());
    let election = new_election(&authority, &organizer);
    let ledger = MemLedger::default();

    let mut honest = Voter::new("0xhonest");
    let mut impostor = Voter::new("0ximpostor");
    for (sequence, (voter, id_number, candidate)) in [
        (&mut honest, "1", "A"),
        (&mut impostor, "2", "B"),
    ]
    .into_iter()
    .enumerate()
    {
        let request = voter.request(&authority, &election, id_number).unwrap();
        authority.approve_verification(request.id, &organizer).unwrap();
        voter.finalize(&authority, &election);
        authority
            .record_participation(
                &voter.caller,
                election.id,
                IdentityClaim::new("Voter", id_number),
                Some(voter.address.clone()),
            )
            .unwrap();
        voter.cast(&authority, &election, &ledger, sequence as u64, candidate);
    }

    // Both ballots verify, and the honest voter's second ballot is a duplicate
    honest.cast(&authority, &election, &ledger, 10, "B");
    let before = authority
        .preview_tally(&organizer, election.id, &ledger, &RecordDecoder, &CancelToken::new())
        .unwrap();
    assert_eq!(before.total, 2);
    assert_eq!(before.skipped.duplicate, 1);

    // The impostor's identity check is reversed after they voted
    let impostor_request = authority
        .store()
        .find_request(election.id, impostor.caller.id)
        .unwrap()
        .unwrap();
    authority
        .reject_verification(impostor_request.id, &organizer)
        .unwrap();

    let after = authority
        .end_election(&organizer, election.id, &ledger, &RecordDecoder, &CancelToken::new())
        .unwrap()
        .election
        .result
        .unwrap();
    assert_eq!(after.total, 1);
    assert_eq!(after.tally["A"], 1);
    assert_eq!(after.tally["B"], 0);
    assert_eq!(after.skipped.excluded, 1);
    assert_eq!(after.valid_votes[0].sender, "0xhonest");
}
