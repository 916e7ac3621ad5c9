use crate::*;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;

/// What a one-time password was issued for
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Login,
    Registration,
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            OtpPurpose::Login => "login",
            OtpPurpose::Registration => "registration",
        };
        write!(f, "{}", name)
    }
}

/// Lifetime and guessing limits for issued codes
#[derive(Clone, Debug)]
pub struct OtpPolicy {
    pub ttl: Duration,
    pub max_attempts: u32,

    /// Minimum gap between two codes for the same address while the first is still live
    pub resend_interval: Duration,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        OtpPolicy {
            ttl: Duration::seconds(120),
            max_attempts: 5,
            resend_interval: Duration::seconds(30),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OtpEntry {
    pub code: String,
    pub purpose: OtpPurpose,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OtpStatus {
    pub exists: bool,
    pub purpose: Option<OtpPurpose>,

    /// Whole seconds until expiry
    pub time_remaining: i64,
}

/// Six decimal digits, never starting with zero
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Issued one-time passwords, keyed by normalised email address
#[derive(Default, Clone)]
pub struct OtpBook {
    policy: OtpPolicy,
    entries: HashMap<String, OtpEntry>,
}

enum Check {
    Expired,
    WrongPurpose(OtpPurpose),
    WrongCode { exhausted: bool, remaining: u32 },
    Ok,
}

impl OtpBook {
    pub fn new(policy: OtpPolicy) -> Self {
        OtpBook {
            policy,
            entries: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    /// Issue a fresh code for `email`, replacing any earlier one
    pub fn issue(
        &mut self,
        email: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<String, Error> {
        let key = normalize_email(email);

        if let Some(existing) = self.entries.get(&key) {
            let next_allowed = existing.issued_at + self.policy.resend_interval;
            if now <= existing.expires_at && now < next_allowed {
                let wait = (next_allowed - now).num_seconds().max(1);
                return Err(Error::OtpResendTooSoon(wait));
            }
        }

        let code = generate_code();
        self.entries.insert(
            key,
            OtpEntry {
                code: code.clone(),
                purpose,
                issued_at: now,
                expires_at: now + self.policy.ttl,
                attempts: 0,
            },
        );

        Ok(code)
    }

    /// Check a submitted code. A successful check consumes the code.
    pub fn verify(
        &mut self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.attempt(email, code, purpose, now, true)
    }

    /// Like `verify`, but a correct code stays valid for a later `verify`.
    /// Wrong guesses still count against the attempt limit.
    pub fn check(
        &mut self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.attempt(email, code, purpose, now, false)
    }

    fn attempt(
        &mut self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
        consume: bool,
    ) -> Result<(), Error> {
        let key = normalize_email(email);
        let max_attempts = self.policy.max_attempts;

        let check = {
            let entry = self.entries.get_mut(&key).ok_or(Error::OtpNotFound)?;
            if now > entry.expires_at {
                Check::Expired
            } else if entry.purpose != purpose {
                Check::WrongPurpose(entry.purpose)
            } else if entry.code != code.trim() {
                entry.attempts += 1;
                Check::WrongCode {
                    exhausted: entry.attempts >= max_attempts,
                    remaining: max_attempts.saturating_sub(entry.attempts),
                }
            } else {
                Check::Ok
            }
        };

        match check {
            Check::Expired => {
                self.entries.remove(&key);
                Err(Error::OtpExpired)
            }
            Check::WrongPurpose(issued_for) => Err(Error::OtpPurposeMismatch(issued_for)),
            Check::WrongCode { exhausted: true, .. } => {
                self.entries.remove(&key);
                Err(Error::OtpAttemptsExceeded)
            }
            Check::WrongCode { remaining, .. } => Err(Error::OtpInvalid { remaining }),
            Check::Ok => {
                if consume {
                    self.entries.remove(&key);
                }
                Ok(())
            }
        }
    }

    pub fn status(&self, email: &str, now: DateTime<Utc>) -> OtpStatus {
        match self.entries.get(&normalize_email(email)) {
            Some(entry) if now <= entry.expires_at => OtpStatus {
                exists: true,
                purpose: Some(entry.purpose),
                time_remaining: (entry.expires_at - now).num_seconds(),
            },
            _ => OtpStatus {
                exists: false,
                purpose: None,
                time_remaining: 0,
            },
        }
    }

    /// Drop expired codes, returning how many were removed
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.expires_at);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An outgoing OTP email
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OtpMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OtpMail {
    pub fn compose(email: &str, code: &str, purpose: OtpPurpose, ttl: Duration) -> Self {
        let (subject, action) = match purpose {
            OtpPurpose::Login => ("SecureVote Login OTP", "log in to"),
            OtpPurpose::Registration => (
                "SecureVote Registration OTP",
                "complete your registration with",
            ),
        };

        let body = format!(
            "Your SecureVote one-time password is {code}\n\n\
             Use this code to {action} SecureVote. It expires in {lifetime}.\n\n\
             Never share this code with anyone. SecureVote will never ask for it by phone or email.\n\
             If you did not request this code, ignore this email.\n",
            code = code,
            action = action,
            lifetime = describe_duration(ttl),
        );

        OtpMail {
            to: normalize_email(email),
            subject: subject.to_owned(),
            body,
        }
    }
}

fn describe_duration(d: Duration) -> String {
    let secs = d.num_seconds();
    if secs % 60 == 0 && secs >= 60 {
        let minutes = secs / 60;
        format!("{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        format!("{} second{}", secs, if secs == 1 { "" } else { "s" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn code_is_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(code.chars().next(), Some('0'));
        }
    }

    #[test]
    fn code_is_single_use() {
        let mut book = OtpBook::default();
        let code = book.issue("Voter@Example.com ", OtpPurpose::Login, t0()).unwrap();
        assert_eq!(book.len(), 1);

        book.verify("voter@example.com", &code, OtpPurpose::Login, t0())
            .unwrap();
        assert!(book.is_empty());

        let again = book.verify("voter@example.com", &code, OtpPurpose::Login, t0());
        assert!(matches!(again, Err(Error::OtpNotFound)));
    }

    #[test]
    fn check_keeps_the_code() {
        let mut book = OtpBook::default();
        let code = book
            .issue("voter@example.com", OtpPurpose::Registration, t0())
            .unwrap();
        let wrong = if code == "123456" { "654321" } else { "123456" };

        let res = book.check("voter@example.com", wrong, OtpPurpose::Registration, t0());
        assert!(matches!(res, Err(Error::OtpInvalid { remaining: 4 })));

        book.check("voter@example.com", &code, OtpPurpose::Registration, t0())
            .unwrap();
        assert_eq!(book.len(), 1);

        book.verify("voter@example.com", &code, OtpPurpose::Registration, t0())
            .unwrap();
        assert!(book.is_empty());
    }

    #[test]
    fn expired_code_is_removed() {
        let mut book = OtpBook::default();
        let code = book
            .issue("voter@example.com", OtpPurpose::Login, t0())
            .unwrap();

        let late = t0() + Duration::seconds(121);
        let res = book.verify("voter@example.com", &code, OtpPurpose::Login, late);
        assert!(matches!(res, Err(Error::OtpExpired)));
        assert!(book.is_empty());
    }

    #[test]
    fn wrong_guesses_burn_the_code() {
        let policy = OtpPolicy {
            max_attempts: 3,
            ..OtpPolicy::default()
        };
        let mut book = OtpBook::new(policy);
        let code = book
            .issue("voter@example.com", OtpPurpose::Registration, t0())
            .unwrap();
        let wrong = if code == "123456" { "654321" } else { "123456" };

        let res = book.verify("voter@example.com", wrong, OtpPurpose::Registration, t0());
        assert!(matches!(res, Err(Error::OtpInvalid { remaining: 2 })));
        let res = book.verify("voter@example.com", wrong, OtpPurpose::Registration, t0());
        assert!(matches!(res, Err(Error::OtpInvalid { remaining: 1 })));
        let res = book.verify("voter@example.com", wrong, OtpPurpose::Registration, t0());
        assert!(matches!(res, Err(Error::OtpAttemptsExceeded)));

        // The right code no longer works either
        let res = book.verify("voter@example.com", &code, OtpPurpose::Registration, t0());
        assert!(matches!(res, Err(Error::OtpNotFound)));
    }

    #[test]
    fn purpose_must_match() {
        let mut book = OtpBook::default();
        let code = book
            .issue("voter@example.com", OtpPurpose::Registration, t0())
            .unwrap();

        let res = book.verify("voter@example.com", &code, OtpPurpose::Login, t0());
        assert!(matches!(
            res,
            Err(Error::OtpPurposeMismatch(OtpPurpose::Registration))
        ));

        // A purpose mismatch does not consume the code
        book.verify("voter@example.com", &code, OtpPurpose::Registration, t0())
            .unwrap();
    }

    #[test]
    fn resend_is_throttled() {
        let mut book = OtpBook::default();
        let first = book
            .issue("voter@example.com", OtpPurpose::Login, t0())
            .unwrap();

        let res = book.issue(
            "voter@example.com",
            OtpPurpose::Login,
            t0() + Duration::seconds(10),
        );
        assert!(matches!(res, Err(Error::OtpResendTooSoon(20))));

        let second = book
            .issue(
                "voter@example.com",
                OtpPurpose::Login,
                t0() + Duration::seconds(30),
            )
            .unwrap();
        assert_eq!(book.len(), 1);

        // Only the newest code is accepted
        if first != second {
            let res = book.verify(
                "voter@example.com",
                &first,
                OtpPurpose::Login,
                t0() + Duration::seconds(31),
            );
            assert!(matches!(res, Err(Error::OtpInvalid { .. })));
        }
        book.verify(
            "voter@example.com",
            &second,
            OtpPurpose::Login,
            t0() + Duration::seconds(31),
        )
        .unwrap();
    }

    #[test]
    fn status_and_purge() {
        let mut book = OtpBook::default();
        book.issue("a@example.com", OtpPurpose::Login, t0()).unwrap();
        book.issue(
            "b@example.com",
            OtpPurpose::Login,
            t0() + Duration::seconds(60),
        )
        .unwrap();

        let status = book.status("a@example.com", t0() + Duration::seconds(45));
        assert!(status.exists);
        assert_eq!(status.purpose, Some(OtpPurpose::Login));
        assert_eq!(status.time_remaining, 75);

        let missing = book.status("c@example.com", t0());
        assert!(!missing.exists);
        assert_eq!(missing.time_remaining, 0);

        assert_eq!(book.purge_expired(t0() + Duration::seconds(150)), 1);
        assert_eq!(book.len(), 1);
        assert!(!book.status("a@example.com", t0() + Duration::seconds(150)).exists);
    }

    #[test]
    fn mail_mentions_code_and_lifetime() {
        let mail = OtpMail::compose(
            "Voter@Example.com",
            "482913",
            OtpPurpose::Registration,
            Duration::seconds(120),
        );
        assert_eq!(mail.to, "voter@example.com");
        assert_eq!(mail.subject, "SecureVote Registration OTP");
        assert!(mail.body.contains("482913"));
        assert!(mail.body.contains("2 minutes"));

        let mail = OtpMail::compose("v@example.com", "1", OtpPurpose::Login, Duration::seconds(45));
        assert_eq!(mail.subject, "SecureVote Login OTP");
        assert!(mail.body.contains("45 seconds"));
    }
}
