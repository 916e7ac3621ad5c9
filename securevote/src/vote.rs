use crate::*;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Hash a voter's identity so the ledger never carries it in the clear
pub fn hash_voter_id(salt: &str, voter_id: &str) -> String {
    sha256_hex(format!("{}:{}", salt, normalize_email(voter_id)))
}

/// A single cast vote, as recorded in the ledger
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VoteRecord {
    pub voter_hash: String,
    pub election_id: Uuid,
    pub candidate_id: Uuid,
    pub cast_at: DateTime<Utc>,
}

impl VoteRecord {
    pub fn as_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("securevote: unexpected error serializing vote")
    }

    /// The receipt handed back to the voter
    pub fn receipt(&self) -> String {
        sha256_hex(self.as_bytes())
    }
}

/// What a voter gets back after casting a vote
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VoteReceipt {
    pub receipt: String,
    pub election_id: Uuid,
    pub cast_at: DateTime<Utc>,
}

impl From<&VoteRecord> for VoteReceipt {
    fn from(vote: &VoteRecord) -> Self {
        VoteReceipt {
            receipt: vote.receipt(),
            election_id: vote.election_id,
            cast_at: vote.cast_at,
        }
    }
}

/// Where a receipt currently sits
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReceiptStatus {
    Pending,
    Sealed { block: u64, block_hash: String },
}

/// Check everything about a ballot that the store can answer
pub fn validate_ballot<S: Store>(
    store: &S,
    election_id: Uuid,
    candidate_id: Uuid,
    voter_id: &str,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    match store.registration_for_email(voter_id) {
        Some(record) if record.is_approved() => {}
        _ => return Err(ValidationError::VoterNotApproved),
    }

    let election = store.election(election_id)?;
    if !election.accepts_votes(now) {
        return Err(ValidationError::ElectionNotActive(election_id));
    }

    let candidate = store.candidate(candidate_id)?;
    if candidate.election_id != election_id {
        return Err(ValidationError::CandidateNotInElection(
            candidate_id,
            election_id,
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voter_hash_is_salted_and_normalised() {
        let a = hash_voter_id("salt", "Asha@Example.com");
        let b = hash_voter_id("salt", "asha@example.com ");
        let c = hash_voter_id("pepper", "asha@example.com");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(!a.contains("asha"));
    }

    #[test]
    fn receipt_depends_on_every_field() {
        let vote = VoteRecord {
            voter_hash: hash_voter_id("salt", "asha@example.com"),
            election_id: Uuid::new_v4(),
            candidate_id: Uuid::new_v4(),
            cast_at: now(),
        };
        let mut other = vote.clone();
        other.candidate_id = Uuid::new_v4();

        assert_eq!(vote.receipt(), vote.clone().receipt());
        assert_ne!(vote.receipt(), other.receipt());

        let receipt = VoteReceipt::from(&vote);
        assert_eq!(receipt.receipt, vote.receipt());
        assert_eq!(receipt.election_id, vote.election_id);
    }

    #[test]
    fn receipt_status_wire_format() {
        let sealed = ReceiptStatus::Sealed {
            block: 3,
            block_hash: "ab".to_owned(),
        };
        let value = serde_json::to_value(&sealed).unwrap();
        assert_eq!(value["status"], "sealed");
        assert_eq!(value["block"], 3);
        let value = serde_json::to_value(&ReceiptStatus::Pending).unwrap();
        assert_eq!(value["status"], "pending");
    }
}
