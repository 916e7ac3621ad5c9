use crate::*;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
#[error("{kind} {id} not found")]
pub struct NotFound {
    pub kind: &'static str,
    pub id: String,
}

impl NotFound {
    pub fn new(kind: &'static str, id: impl ToString) -> Self {
        NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Read access to elections, candidates, registrations and admins
pub trait Store {
    fn get_election(&self, id: Uuid) -> Option<Election>;

    fn get_candidate(&self, id: Uuid) -> Option<Candidate>;

    /// Candidates standing in an election, in the order they were added
    fn candidates_for(&self, election_id: Uuid) -> Vec<Candidate>;

    fn get_registration(&self, id: Uuid) -> Option<RegistrationRecord>;

    /// The most recent registration for an email address
    fn registration_for_email(&self, email: &str) -> Option<RegistrationRecord>;

    fn get_admin(&self, id: Uuid) -> Option<AdminAccount>;

    fn admin_by_official_id(&self, official_id: &str) -> Option<AdminAccount>;

    fn election(&self, id: Uuid) -> Result<Election, NotFound> {
        self.get_election(id)
            .ok_or_else(|| NotFound::new("election", id))
    }

    fn candidate(&self, id: Uuid) -> Result<Candidate, NotFound> {
        self.get_candidate(id)
            .ok_or_else(|| NotFound::new("candidate", id))
    }

    fn registration(&self, id: Uuid) -> Result<RegistrationRecord, NotFound> {
        self.get_registration(id)
            .ok_or_else(|| NotFound::new("registration", id))
    }

    fn admin(&self, id: Uuid) -> Result<AdminAccount, NotFound> {
        self.get_admin(id)
            .ok_or_else(|| NotFound::new("admin", id))
    }
}

/// A simple store that uses in-memory BTreeMaps
#[derive(Default, Clone)]
pub struct MemStore {
    elections: BTreeMap<Uuid, Election>,
    candidates: BTreeMap<Uuid, Candidate>,
    registrations: BTreeMap<Uuid, RegistrationRecord>,
    latest_registration: BTreeMap<String, Uuid>,
    admins: BTreeMap<Uuid, AdminAccount>,
}

impl MemStore {
    pub fn set_election(&mut self, election: Election) {
        self.elections.insert(election.id, election);
    }

    pub fn set_candidate(&mut self, candidate: Candidate) {
        self.candidates.insert(candidate.id, candidate);
    }

    pub fn remove_candidate(&mut self, id: Uuid) -> Option<Candidate> {
        self.candidates.remove(&id)
    }

    pub fn set_registration(&mut self, record: RegistrationRecord) {
        let newer = match self
            .latest_registration
            .get(&record.email)
            .and_then(|id| self.registrations.get(id))
        {
            Some(current) => current.id == record.id || current.created_at <= record.created_at,
            None => true,
        };
        if newer {
            self.latest_registration
                .insert(record.email.clone(), record.id);
        }
        self.registrations.insert(record.id, record);
    }

    pub fn set_admin(&mut self, admin: AdminAccount) {
        self.admins.insert(admin.id, admin);
    }

    /// All elections, newest first
    pub fn elections(&self) -> Vec<Election> {
        let mut elections: Vec<Election> = self.elections.values().cloned().collect();
        elections.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        elections
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self.candidates.values().cloned().collect();
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        candidates
    }

    /// Registrations, newest first, optionally filtered by status
    pub fn registrations(&self, status: Option<RegistrationStatus>) -> Vec<RegistrationRecord> {
        let mut records: Vec<RegistrationRecord> = self
            .registrations
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Counts over the latest registration of every address
    pub fn registration_stats(&self) -> RegistrationStats {
        RegistrationStats::collect(
            self.latest_registration
                .values()
                .filter_map(|id| self.registrations.get(id)),
        )
    }

    pub fn admins(&self) -> Vec<AdminAccount> {
        let mut admins: Vec<AdminAccount> = self.admins.values().cloned().collect();
        admins.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        admins
    }
}

impl Store for MemStore {
    fn get_election(&self, id: Uuid) -> Option<Election> {
        self.elections.get(&id).cloned()
    }

    fn get_candidate(&self, id: Uuid) -> Option<Candidate> {
        self.candidates.get(&id).cloned()
    }

    fn candidates_for(&self, election_id: Uuid) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .candidates
            .values()
            .filter(|c| c.election_id == election_id)
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        candidates
    }

    fn get_registration(&self, id: Uuid) -> Option<RegistrationRecord> {
        self.registrations.get(&id).cloned()
    }

    fn registration_for_email(&self, email: &str) -> Option<RegistrationRecord> {
        self.latest_registration
            .get(&normalize_email(email))
            .and_then(|id| self.registrations.get(id))
            .cloned()
    }

    fn get_admin(&self, id: Uuid) -> Option<AdminAccount> {
        self.admins.get(&id).cloned()
    }

    fn admin_by_official_id(&self, official_id: &str) -> Option<AdminAccount> {
        let official_id = official_id.trim().to_uppercase();
        self.admins
            .values()
            .find(|a| a.official_id == official_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::tests::application;
    use chrono::Duration;

    #[test]
    fn latest_registration_wins() {
        let mut store = MemStore::default();
        let t = now();

        let mut first = RegistrationRecord::new(application("asha@example.com"), t);
        first.reject(t).unwrap();
        store.set_registration(first.clone());

        let second =
            RegistrationRecord::new(application("ASHA@example.com"), t + Duration::seconds(5));
        store.set_registration(second.clone());

        // Updating the older record must not shadow the newer one
        store.set_registration(first.clone());

        let latest = store.registration_for_email("asha@example.com").unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(store.registrations(None).len(), 2);
        assert_eq!(
            store
                .registrations(Some(RegistrationStatus::Rejected))
                .len(),
            1
        );

        let stats = store.registration_stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.pending, 1);
    }

    #[test]
    fn lookups() {
        let mut store = MemStore::default();
        let t = now();
        let election =
            Election::new(crate::election::tests::general_election(t), t).unwrap();
        store.set_election(election.clone());

        let a = Candidate::new(
            crate::election::tests::candidate(election.id, "Alice Johnson", "Democratic Party"),
            t,
        )
        .unwrap();
        let b = Candidate::new(
            crate::election::tests::candidate(election.id, "Robert Smith", "Republican Party"),
            t + Duration::seconds(1),
        )
        .unwrap();
        store.set_candidate(b.clone());
        store.set_candidate(a.clone());

        let listed: Vec<String> = store
            .candidates_for(election.id)
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(listed, vec!["Alice Johnson", "Robert Smith"]);
        assert!(store.candidates_for(Uuid::new_v4()).is_empty());

        assert_eq!(store.remove_candidate(b.id).map(|c| c.name), Some(b.name.clone()));
        assert!(store.remove_candidate(b.id).is_none());
        assert_eq!(store.candidates_for(election.id).len(), 1);

        assert_eq!(store.election(election.id).unwrap().title, election.title);
        let missing = store.election(Uuid::new_v4()).unwrap_err();
        assert_eq!(missing.kind, "election");
        assert!(store.candidate(Uuid::new_v4()).is_err());

        let admin =
            AdminAccount::bootstrap("ADMIN001", "admin@example.org", "changeme", t).unwrap();
        store.set_admin(admin.clone());
        assert_eq!(store.admin_by_official_id("admin001").unwrap().id, admin.id);
        assert!(store.admin(admin.id).is_ok());
    }
}
