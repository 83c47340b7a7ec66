use crate::*;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

/// Who is calling an application-facing operation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn voter(id: Uuid) -> Self {
        Caller {
            id,
            role: Role::Voter,
        }
    }

    pub fn organizer(id: Uuid) -> Self {
        Caller {
            id,
            role: Role::Organizer,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Voter,
    Organizer,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    Upcoming,
    Ongoing,
    Ended,
}

impl Default for ElectionStatus {
    fn default() -> Self {
        ElectionStatus::Ongoing
    }
}

/// A choice on the ballot.
///
/// The id is assigned by the organizer and is what ballots carry, so the
/// display order of candidates can change without affecting the tally.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub name: String,
}

impl Candidate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Candidate {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// An election, as held by its authority
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Election {
    pub id: Uuid,
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// The organizer who created the election, and its authority
    pub creator: Uuid,

    /// Identifier of the election's object on the public ledger
    pub on_chain_id: Option<String>,

    pub candidates: Vec<Candidate>,

    #[serde(default)]
    pub status: ElectionStatus,

    /// Both key pairs. `None` until keys are provisioned.
    pub keys: Option<StoredElectionKeys>,

    /// The frozen tally, set when the election ends
    pub result: Option<TallyResult>,

    pub created_at: DateTime<Utc>,
}

impl Election {
    /// Create a new ongoing election with freshly generated keys
    pub fn new(
        creator: Uuid,
        title: impl Into<String>,
        candidates: Vec<Candidate>,
    ) -> Result<(Self, ElectionKeys), Error> {
        let keys = ElectionKeys::generate()?;
        let election = Election {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            creator,
            on_chain_id: None,
            candidates,
            status: ElectionStatus::default(),
            keys: Some(keys.to_stored()?),
            result: None,
            created_at: Utc::now(),
        };
        election.validate()?;

        Ok((election, keys))
    }

    /// Check the candidate list
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.candidates.is_empty() {
            return Err(ValidationError::NoCandidates);
        }
        let mut seen = HashSet::new();
        for candidate in self.candidates.iter() {
            if !seen.insert(candidate.id.as_str()) {
                return Err(ValidationError::DuplicateCandidateId(candidate.id.clone()));
            }
        }
        Ok(())
    }

    pub fn get_candidate(&self, candidate_id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == candidate_id)
    }

    pub fn is_active(&self) -> bool {
        self.status == ElectionStatus::Ongoing
    }

    /// Whether `caller` holds the authority role for this election
    pub fn is_authority(&self, caller: &Caller) -> bool {
        caller.role == Role::Organizer && caller.id == self.creator
    }

    /// The full key material, or a configuration error if none is on file
    pub fn keys(&self) -> Result<ElectionKeys, Error> {
        match &self.keys {
            Some(stored) => ElectionKeys::from_stored(stored),
            None => Err(Error::MissingSigningKey),
        }
    }

    /// The public keys voters need to blind and encrypt
    pub fn public_keys(&self) -> Result<ElectionPublicKeys, Error> {
        match &self.keys {
            Some(stored) => Ok(ElectionPublicKeys {
                encryption_public: stored.encryption_public.clone(),
                signing_public: stored.signing_public.clone(),
            }),
            None => Err(Error::MissingEncryptionKey),
        }
    }

    /// Name a candidate id from a tally, falling back to the id itself
    pub fn candidate_name<'a>(&'a self, candidate_id: &'a str) -> &'a str {
        self.get_candidate(candidate_id)
            .map(|c| c.name.as_str())
            .unwrap_or(candidate_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn election(candidates: Vec<Candidate>) -> Election {
        Election {
            id: Uuid::new_v4(),
            title: "Student council".to_owned(),
            description: String::new(),
            creator: Uuid::new_v4(),
            on_chain_id: None,
            candidates,
            status: ElectionStatus::default(),
            keys: None,
            result: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_candidate_validation() {
        let ok = election(vec![Candidate::new("A", "Alice"), Candidate::new("B", "Bob")]);
        assert!(ok.validate().is_ok());
        assert_eq!(ok.candidate_name("B"), "Bob");
        assert_eq!(ok.candidate_name("Z"), "Z");

        assert_eq!(
            election(vec![]).validate(),
            Err(ValidationError::NoCandidates)
        );
        assert_eq!(
            election(vec![Candidate::new("A", "Alice"), Candidate::new("A", "Anna")]).validate(),
            Err(ValidationError::DuplicateCandidateId("A".to_owned()))
        );
    }

    #[test]
    fn test_authority_and_status() {
        let e = election(vec![Candidate::new("A", "Alice")]);
        assert!(e.is_active());
        assert!(e.is_authority(&Caller::organizer(e.creator)));
        assert!(!e.is_authority(&Caller::voter(e.creator)));
        assert!(!e.is_authority(&Caller::organizer(Uuid::new_v4())));

        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["status"], "ongoing");
    }

    #[test]
    fn test_missing_keys_is_configuration_error() {
        let e = election(vec![Candidate::new("A", "Alice")]);
        assert!(e.keys().unwrap_err().is_configuration());
        assert!(e.public_keys().unwrap_err().is_configuration());
    }
}
