use crate::*;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// The identity a voter declares when asking for an eligibility credential
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaim {
    pub real_name: String,
    pub id_number: String,
}

impl IdentityClaim {
    pub fn new(real_name: impl Into<String>, id_number: impl Into<String>) -> Self {
        IdentityClaim {
            real_name: real_name.into(),
            id_number: id_number.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Verified,
    Rejected,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Verified => "verified",
            RequestStatus::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// A voter's request for a blind signature over their blinded address.
///
/// At most one exists per (election, voter). A rejected request is
/// overwritten in place when the voter resubmits.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub id: Uuid,
    pub election: Uuid,
    pub voter: Uuid,
    pub identity: IdentityClaim,

    #[serde(with = "b64")]
    pub blinded_message: Vec<u8>,

    /// The authority's blind signature, present only once verified
    #[serde(with = "b64_option")]
    #[serde(default)]
    pub signature: Option<Vec<u8>>,

    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

impl VerificationRequest {
    pub fn new(
        election: Uuid,
        voter: Uuid,
        identity: IdentityClaim,
        blinded_message: Vec<u8>,
    ) -> Self {
        VerificationRequest {
            id: Uuid::new_v4(),
            election,
            voter,
            identity,
            blinded_message,
            signature: None,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Whether this request blocks another for the same voter or ID number
    pub fn is_live(&self) -> bool {
        self.status != RequestStatus::Rejected
    }

    /// Reuse a rejected request for a new submission
    pub(crate) fn resubmit(&mut self, identity: IdentityClaim, blinded_message: Vec<u8>) {
        self.identity = identity;
        self.blinded_message = blinded_message;
        self.signature = None;
        self.status = RequestStatus::Pending;
        self.created_at = Utc::now();
    }

    pub(crate) fn verify(&mut self, blind_signature: Vec<u8>) {
        self.signature = Some(blind_signature);
        self.status = RequestStatus::Verified;
    }

    pub(crate) fn reject(&mut self) {
        self.signature = None;
        self.status = RequestStatus::Rejected;
    }

    /// What the voter sees when polling their request
    pub fn status_response(&self) -> VerificationStatus {
        VerificationStatus {
            status: Some(self.status),
            signature: self.signature.clone(),
            identity: Some(self.identity.clone()),
        }
    }
}

/// Answer to a voter's status poll.
///
/// `status` is `None` when the voter has not asked yet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct VerificationStatus {
    pub status: Option<RequestStatus>,

    #[serde(with = "b64_option")]
    #[serde(default)]
    pub signature: Option<Vec<u8>>,

    pub identity: Option<IdentityClaim>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_clear_signature() {
        let mut request = VerificationRequest::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            IdentityClaim::new("Ada", "123"),
            vec![1, 2, 3],
        );
        assert!(request.is_live());

        request.verify(vec![9; 4]);
        assert_eq!(request.status, RequestStatus::Verified);
        assert_eq!(request.signature, Some(vec![9; 4]));

        request.reject();
        assert!(!request.is_live());
        assert_eq!(request.signature, None);

        let id = request.id;
        request.resubmit(IdentityClaim::new("Ada", "124"), vec![4]);
        assert_eq!(request.id, id);
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.identity.id_number, "124");
        assert_eq!(request.blinded_message, vec![4]);
    }

    #[test]
    fn test_status_json() {
        let mut request = VerificationRequest::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            IdentityClaim::new("Ada", "123"),
            vec![0, 1],
        );
        request.verify(vec![0xff]);

        let json = serde_json::to_value(request.status_response()).unwrap();
        assert_eq!(json["status"], "verified");
        assert_eq!(json["signature"], "/w==");
        assert_eq!(json["identity"]["id_number"], "123");

        let none = serde_json::to_value(VerificationStatus::default()).unwrap();
        assert!(none["status"].is_null());
        assert!(none["signature"].is_null());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(RequestStatus::Rejected.to_string(), "rejected");
        assert_eq!(
            ValidationError::InvalidTransition {
                from: RequestStatus::Verified,
                to: RequestStatus::Verified
            }
            .to_string(),
            "request is already verified, cannot become verified"
        );
    }
}
