use crate::*;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Who a bearer token speaks for
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Role {
    Voter { email: String },
    Admin { admin_id: Uuid },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Session {
    pub token: String,
    #[serde(flatten)]
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

/// Live bearer tokens
#[derive(Clone)]
pub struct SessionBook {
    ttl: Duration,
    sessions: HashMap<String, Session>,
}

impl Default for SessionBook {
    fn default() -> Self {
        SessionBook::new(Duration::hours(1))
    }
}

impl SessionBook {
    pub fn new(ttl: Duration) -> Self {
        SessionBook {
            ttl,
            sessions: HashMap::new(),
        }
    }

    pub fn issue(&mut self, role: Role, now: DateTime<Utc>) -> Session {
        let session = Session {
            token: random_hex(32),
            role,
            expires_at: now + self.ttl,
        };
        self.sessions
            .insert(session.token.clone(), session.clone());
        session
    }

    pub fn resolve(&mut self, token: &str, now: DateTime<Utc>) -> Result<Session, Error> {
        let expired = match self.sessions.get(token) {
            None => return Err(Error::InvalidSession),
            Some(session) => now > session.expires_at,
        };
        if expired {
            self.sessions.remove(token);
            return Err(Error::InvalidSession);
        }
        self.sessions
            .get(token)
            .cloned()
            .ok_or(Error::InvalidSession)
    }

    pub fn revoke(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| now <= session.expires_at);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_resolve_revoke() {
        let mut book = SessionBook::default();
        let t = now();
        let voter = Role::Voter {
            email: "asha@example.com".to_owned(),
        };

        let session = book.issue(voter.clone(), t);
        assert_eq!(session.token.len(), 64);
        assert_eq!(book.resolve(&session.token, t).unwrap().role, voter);
        assert!(matches!(
            book.resolve("not-a-token", t),
            Err(Error::InvalidSession)
        ));

        assert!(book.revoke(&session.token));
        assert!(!book.revoke(&session.token));
        assert!(book.resolve(&session.token, t).is_err());
    }

    #[test]
    fn expired_tokens_are_dropped() {
        let mut book = SessionBook::new(Duration::seconds(10));
        let t = now();
        let admin = book.issue(
            Role::Admin {
                admin_id: Uuid::new_v4(),
            },
            t,
        );
        let voter = book.issue(
            Role::Voter {
                email: "asha@example.com".to_owned(),
            },
            t + Duration::seconds(5),
        );

        assert!(book.resolve(&admin.token, t + Duration::seconds(11)).is_err());
        assert_eq!(book.len(), 1);
        assert_eq!(book.purge_expired(t + Duration::seconds(16)), 1);
        assert!(book.is_empty());
        assert!(book.resolve(&voter.token, t).is_err());
    }

    #[test]
    fn session_serializes_flat() {
        let mut book = SessionBook::default();
        let session = book.issue(
            Role::Voter {
                email: "asha@example.com".to_owned(),
            },
            now(),
        );
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["role"], "voter");
        assert_eq!(json["email"], "asha@example.com");
    }
}
