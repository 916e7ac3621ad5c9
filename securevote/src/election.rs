use crate::*;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    Draft,
    Active,
    Closed,
}

impl fmt::Display for ElectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ElectionStatus::Draft => "draft",
            ElectionStatus::Active => "active",
            ElectionStatus::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NewElection {
    pub title: String,
    #[serde(default)]
    pub description: String,

    /// Free-form election type, e.g. "general" or "municipal"
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl NewElection {
    pub fn validate(&self) -> Result<(), Error> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidField {
                field: "title",
                reason: "required".to_owned(),
            });
        }
        if self.end_date <= self.start_date {
            return Err(Error::InvalidField {
                field: "end_date",
                reason: "must be after start_date".to_owned(),
            });
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Election {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: ElectionStatus,
    pub created_at: DateTime<Utc>,
}

impl Election {
    /// Create a new draft election
    pub fn new(new: NewElection, now: DateTime<Utc>) -> Result<Self, Error> {
        new.validate()?;
        Ok(Election {
            id: Uuid::new_v4(),
            title: new.title.trim().to_owned(),
            description: new.description.trim().to_owned(),
            kind: new.kind.trim().to_owned(),
            start_date: new.start_date,
            end_date: new.end_date,
            status: ElectionStatus::Draft,
            created_at: now,
        })
    }

    /// Open the election for voting
    pub fn start(&mut self) -> Result<(), Error> {
        self.transition(ElectionStatus::Draft, ElectionStatus::Active)
    }

    /// Close the election. A closed election cannot be reopened.
    pub fn stop(&mut self) -> Result<(), Error> {
        self.transition(ElectionStatus::Active, ElectionStatus::Closed)
    }

    fn transition(&mut self, from: ElectionStatus, to: ElectionStatus) -> Result<(), Error> {
        if self.status != from {
            return Err(Error::InvalidTransition {
                entity: "election",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn accepts_votes(&self, now: DateTime<Utc>) -> bool {
        self.status == ElectionStatus::Active && now <= self.end_date
    }

    pub fn accepts_candidates(&self) -> Result<(), Error> {
        if self.status == ElectionStatus::Closed {
            return Err(Error::ElectionClosed(self.id));
        }
        Ok(())
    }

    /// Candidates can be edited or withdrawn only before voting starts
    pub fn accepts_candidate_changes(&self) -> Result<(), Error> {
        match self.status {
            ElectionStatus::Draft => Ok(()),
            _ => Err(Error::CandidatesLocked(self.id)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NewCandidate {
    /// May be left out when the election is given elsewhere, e.g. in a bulk upload
    #[serde(default)]
    pub election_id: Uuid,
    pub name: String,
    pub party: String,
    pub age: u32,
    #[serde(default)]
    pub qualification: String,
    #[serde(default)]
    pub manifesto: String,
}

pub const MINIMUM_CANDIDATE_AGE: u32 = 18;

impl NewCandidate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidField {
                field: "name",
                reason: "required".to_owned(),
            });
        }
        if self.party.trim().is_empty() {
            return Err(Error::InvalidField {
                field: "party",
                reason: "required".to_owned(),
            });
        }
        if self.age < MINIMUM_CANDIDATE_AGE {
            return Err(Error::InvalidField {
                field: "age",
                reason: format!("candidates must be at least {}", MINIMUM_CANDIDATE_AGE),
            });
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Candidate {
    pub id: Uuid,
    pub election_id: Uuid,
    pub name: String,
    pub party: String,
    pub age: u32,
    pub qualification: String,
    pub manifesto: String,
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(new: NewCandidate, now: DateTime<Utc>) -> Result<Self, Error> {
        new.validate()?;
        Ok(Candidate {
            id: Uuid::new_v4(),
            election_id: new.election_id,
            name: new.name.trim().to_owned(),
            party: new.party.trim().to_owned(),
            age: new.age,
            qualification: new.qualification.trim().to_owned(),
            manifesto: new.manifesto.trim().to_owned(),
            created_at: now,
        })
    }

    /// Replace the editable fields, keeping id, election and creation time
    pub fn update(&mut self, new: NewCandidate) -> Result<(), Error> {
        new.validate()?;
        self.name = new.name.trim().to_owned();
        self.party = new.party.trim().to_owned();
        self.age = new.age;
        self.qualification = new.qualification.trim().to_owned();
        self.manifesto = new.manifesto.trim().to_owned();
        Ok(())
    }
}

/// Validate a batch of candidates for one election, all or nothing
pub fn candidates_for_election(
    election: &Election,
    batch: Vec<NewCandidate>,
    now: DateTime<Utc>,
) -> Result<Vec<Candidate>, Error> {
    election.accepts_candidates()?;
    batch
        .into_iter()
        .map(|new| {
            if new.election_id != election.id {
                return Err(Error::InvalidField {
                    field: "election_id",
                    reason: format!("candidate {} belongs to another election", new.name),
                });
            }
            Candidate::new(new, now)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub fn general_election(now: DateTime<Utc>) -> NewElection {
        NewElection {
            title: "General Election 2024".to_owned(),
            description: "Lok Sabha constituency 12".to_owned(),
            kind: "general".to_owned(),
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(1),
        }
    }

    pub fn candidate(election_id: Uuid, name: &str, party: &str) -> NewCandidate {
        NewCandidate {
            election_id,
            name: name.to_owned(),
            party: party.to_owned(),
            age: 45,
            qualification: "Graduate".to_owned(),
            manifesto: String::new(),
        }
    }

    #[test]
    fn create_new_election() {
        let now = now();
        let mut election = Election::new(general_election(now), now).unwrap();
        assert_eq!(election.status, ElectionStatus::Draft);
        assert!(!election.accepts_votes(now));

        // Can't close a draft
        assert!(election.stop().is_err());

        election.start().unwrap();
        assert!(election.accepts_votes(now));
        assert!(!election.accepts_votes(now + Duration::days(2)));
        assert!(election.start().is_err());

        election.stop().unwrap();
        assert!(!election.accepts_votes(now));
        assert!(matches!(
            election.start(),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(matches!(
            election.accepts_candidates(),
            Err(Error::ElectionClosed(_))
        ));
    }

    #[test]
    fn election_dates_must_be_ordered() {
        let now = now();
        let mut new = general_election(now);
        new.end_date = new.start_date;
        assert!(matches!(
            Election::new(new, now),
            Err(Error::InvalidField {
                field: "end_date",
                ..
            })
        ));

        let mut new = general_election(now);
        new.title = " ".to_owned();
        assert!(Election::new(new, now).is_err());
    }

    #[test]
    fn election_type_field() {
        let json = r#"{
            "title": "Ward 7 by-election",
            "type": "municipal",
            "start_date": "2024-05-01T00:00:00Z",
            "end_date": "2024-05-02T00:00:00Z"
        }"#;
        let new: NewElection = serde_json::from_str(json).unwrap();
        assert_eq!(new.kind, "municipal");
        assert!(new.description.is_empty());

        let election = Election::new(new, now()).unwrap();
        let value = serde_json::to_value(&election).unwrap();
        assert_eq!(value["type"], "municipal");
        assert_eq!(value["status"], "draft");
    }

    #[test]
    fn candidate_rules() {
        let now = now();
        let election = Election::new(general_election(now), now).unwrap();

        let mut young = candidate(election.id, "Kiran", "Independent");
        young.age = 17;
        assert!(matches!(
            young.validate(),
            Err(Error::InvalidField { field: "age", .. })
        ));

        let batch = vec![
            candidate(election.id, "Alice Johnson", "Democratic Party"),
            candidate(election.id, "Robert Smith", "Republican Party"),
        ];
        let candidates = candidates_for_election(&election, batch, now).unwrap();
        assert_eq!(candidates.len(), 2);

        // One bad entry rejects the whole batch
        let batch = vec![
            candidate(election.id, "Maria Garcia", "Independent"),
            candidate(Uuid::new_v4(), "Stray", "Elsewhere"),
        ];
        assert!(candidates_for_election(&election, batch, now).is_err());
    }

    #[test]
    fn candidates_change_only_in_draft() {
        let now = now();
        let mut election = Election::new(general_election(now), now).unwrap();
        let typo = candidate(election.id, "Alice Jonson", "Democratic Party");
        let mut alice = Candidate::new(typo, now).unwrap();
        let id = alice.id;

        election.accepts_candidate_changes().unwrap();
        alice
            .update(candidate(election.id, " Alice Johnson ", "Democratic Party"))
            .unwrap();
        assert_eq!(alice.name, "Alice Johnson");
        assert_eq!(alice.id, id);

        let mut blank = candidate(election.id, "", "Democratic Party");
        blank.age = 50;
        assert!(alice.update(blank).is_err());
        assert_eq!(alice.name, "Alice Johnson");

        election.start().unwrap();
        assert!(matches!(
            election.accepts_candidate_changes(),
            Err(Error::CandidatesLocked(_))
        ));
        // New candidates may still join a running election
        election.accepts_candidates().unwrap();
    }
}
