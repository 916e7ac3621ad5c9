use crate::*;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Where a voter application stands in the admin approval flow
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Rejected => "rejected",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for RegistrationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(RegistrationStatus::Pending),
            "approved" => Ok(RegistrationStatus::Approved),
            "rejected" => Ok(RegistrationStatus::Rejected),
            other => Err(Error::InvalidField {
                field: "status",
                reason: format!("unknown status '{}'", other),
            }),
        }
    }
}

/// A voter application as submitted
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NewRegistration {
    /// Name as printed on the voter's identity document
    #[serde(alias = "aadhar_name")]
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub country: String,
    pub state: String,
    pub voting_type: String,

    /// `data:image/...` URL of the captured face
    #[serde(default)]
    pub face_image: Option<String>,

    /// `data:image/...` URL of the identity document photo
    #[serde(default)]
    pub document_image: Option<String>,
}

fn require(field: &'static str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::InvalidField {
            field,
            reason: "required".to_owned(),
        });
    }
    Ok(())
}

fn require_image(field: &'static str, value: &Option<String>) -> Result<(), Error> {
    match value {
        Some(data) if !data.starts_with("data:image/") => Err(Error::InvalidField {
            field,
            reason: "expected a data:image URL".to_owned(),
        }),
        _ => Ok(()),
    }
}

pub fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.trim().strip_prefix('+').unwrap_or_else(|| phone.trim());
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

impl NewRegistration {
    pub fn validate(&self) -> Result<(), Error> {
        require("full_name", &self.full_name)?;
        require("email", &self.email)?;
        require("phone", &self.phone)?;
        require("address", &self.address)?;
        require("country", &self.country)?;
        require("state", &self.state)?;
        require("voting_type", &self.voting_type)?;

        if !is_valid_email(&self.email) {
            return Err(Error::InvalidField {
                field: "email",
                reason: "not a valid email address".to_owned(),
            });
        }
        if !is_valid_phone(&self.phone) {
            return Err(Error::InvalidField {
                field: "phone",
                reason: "expected 7 to 15 digits".to_owned(),
            });
        }

        require_image("face_image", &self.face_image)?;
        require_image("document_image", &self.document_image)?;

        Ok(())
    }
}

/// A stored voter application
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegistrationRecord {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub country: String,
    pub state: String,
    pub voting_type: String,
    pub face_image: Option<String>,
    pub document_image: Option<String>,

    /// Outcome of an admin looking at the captured face, if they have
    pub face_verified: Option<bool>,
    pub status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl RegistrationRecord {
    /// Create a pending record. The caller is expected to have validated `new`.
    pub fn new(new: NewRegistration, now: DateTime<Utc>) -> Self {
        RegistrationRecord {
            id: Uuid::new_v4(),
            full_name: new.full_name.trim().to_owned(),
            email: normalize_email(&new.email),
            phone: new.phone.trim().to_owned(),
            address: new.address.trim().to_owned(),
            country: new.country.trim().to_owned(),
            state: new.state.trim().to_owned(),
            voting_type: new.voting_type.trim().to_owned(),
            face_image: new.face_image,
            document_image: new.document_image,
            face_verified: None,
            status: RegistrationStatus::Pending,
            created_at: now,
            reviewed_at: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == RegistrationStatus::Approved
    }

    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        self.review(RegistrationStatus::Approved, now)
    }

    pub fn reject(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        self.review(RegistrationStatus::Rejected, now)
    }

    fn review(&mut self, to: RegistrationStatus, now: DateTime<Utc>) -> Result<(), Error> {
        if self.status != RegistrationStatus::Pending {
            return Err(Error::InvalidTransition {
                entity: "registration",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.reviewed_at = Some(now);
        Ok(())
    }

    pub fn set_face_verified(&mut self, verified: bool) -> Result<(), Error> {
        if self.face_image.is_none() {
            return Err(Error::InvalidField {
                field: "face_image",
                reason: "no face image was captured for this registration".to_owned(),
            });
        }
        self.face_verified = Some(verified);
        Ok(())
    }

    pub fn summary(&self) -> RegistrationSummary {
        RegistrationSummary {
            id: self.id,
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            country: self.country.clone(),
            state: self.state.clone(),
            voting_type: self.voting_type.clone(),
            status: self.status,
            has_face_data: self.face_image.is_some(),
            has_document: self.document_image.is_some(),
            face_verified: self.face_verified,
            created_at: self.created_at,
            reviewed_at: self.reviewed_at,
        }
    }
}

/// Refuse a new application while an earlier one is pending or approved
pub fn ensure_can_register(existing: Option<&RegistrationRecord>) -> Result<(), Error> {
    match existing {
        Some(record) if record.status != RegistrationStatus::Rejected => Err(
            Error::AlreadyRegistered(record.email.clone(), record.status),
        ),
        _ => Ok(()),
    }
}

/// Refuse a login unless the latest application was approved
pub fn ensure_can_login(email: &str, existing: Option<&RegistrationRecord>) -> Result<(), Error> {
    match existing {
        None => Err(Error::NotRegistered(normalize_email(email))),
        Some(record) if !record.is_approved() => {
            Err(Error::RegistrationNotApproved(record.status))
        }
        Some(_) => Ok(()),
    }
}

/// List view of a registration, without image payloads
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegistrationSummary {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub country: String,
    pub state: String,
    pub voting_type: String,
    pub status: RegistrationStatus,
    pub has_face_data: bool,
    pub has_document: bool,
    pub face_verified: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Answer to "may this address log in?"
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserCheck {
    pub is_registered: bool,
    pub is_approved: bool,
    pub status: Option<RegistrationStatus>,
}

impl From<Option<&RegistrationRecord>> for UserCheck {
    fn from(record: Option<&RegistrationRecord>) -> Self {
        match record {
            Some(record) => UserCheck {
                is_registered: true,
                is_approved: record.is_approved(),
                status: Some(record.status),
            },
            None => UserCheck {
                is_registered: false,
                is_approved: false,
                status: None,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistrationStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

impl RegistrationStats {
    pub fn collect<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a RegistrationRecord>,
    {
        let mut stats = RegistrationStats::default();
        for record in records {
            stats.total += 1;
            match record.status {
                RegistrationStatus::Pending => stats.pending += 1,
                RegistrationStatus::Approved => stats.approved += 1,
                RegistrationStatus::Rejected => stats.rejected += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn application(email: &str) -> NewRegistration {
        NewRegistration {
            full_name: "Asha Verma".to_owned(),
            email: email.to_owned(),
            phone: "+919876543210".to_owned(),
            address: "12 MG Road".to_owned(),
            country: "India".to_owned(),
            state: "Karnataka".to_owned(),
            voting_type: "general".to_owned(),
            face_image: Some("data:image/jpeg;base64,AAAA".to_owned()),
            document_image: None,
        }
    }

    #[test]
    fn validation() {
        application("asha@example.com").validate().unwrap();

        let mut bad = application("asha@example.com");
        bad.address = "  ".to_owned();
        assert!(matches!(
            bad.validate(),
            Err(Error::InvalidField { field: "address", .. })
        ));

        let bad = application("asha.example.com");
        assert!(matches!(
            bad.validate(),
            Err(Error::InvalidField { field: "email", .. })
        ));

        let mut bad = application("asha@example.com");
        bad.phone = "12-34".to_owned();
        assert!(matches!(
            bad.validate(),
            Err(Error::InvalidField { field: "phone", .. })
        ));

        let mut bad = application("asha@example.com");
        bad.document_image = Some("https://example.com/doc.png".to_owned());
        assert!(matches!(
            bad.validate(),
            Err(Error::InvalidField {
                field: "document_image",
                ..
            })
        ));
    }

    #[test]
    fn legacy_field_name_is_accepted() {
        let json = r#"{
            "aadhar_name": "Asha Verma",
            "email": "asha@example.com",
            "phone": "9876543210",
            "address": "12 MG Road",
            "country": "India",
            "state": "Karnataka",
            "voting_type": "general"
        }"#;
        let new: NewRegistration = serde_json::from_str(json).unwrap();
        assert_eq!(new.full_name, "Asha Verma");
        assert!(new.face_image.is_none());
        new.validate().unwrap();
    }

    #[test]
    fn approval_flow() {
        let now = util::now();
        let mut record = RegistrationRecord::new(application(" Asha@Example.com"), now);
        assert_eq!(record.email, "asha@example.com");
        assert_eq!(record.status, RegistrationStatus::Pending);
        assert!(ensure_can_register(Some(&record)).is_err());
        assert!(matches!(
            ensure_can_login("asha@example.com", Some(&record)),
            Err(Error::RegistrationNotApproved(RegistrationStatus::Pending))
        ));

        record.approve(now).unwrap();
        assert!(record.is_approved());
        assert_eq!(record.reviewed_at, Some(now));
        ensure_can_login("asha@example.com", Some(&record)).unwrap();

        // Reviewed records cannot be reviewed again
        assert!(matches!(
            record.reject(now),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(record.approve(now).is_err());
    }

    #[test]
    fn rejected_voter_may_apply_again() {
        let now = util::now();
        let mut record = RegistrationRecord::new(application("asha@example.com"), now);
        record.reject(now).unwrap();

        ensure_can_register(Some(&record)).unwrap();
        ensure_can_register(None).unwrap();
        assert!(matches!(
            ensure_can_login("asha@example.com", None),
            Err(Error::NotRegistered(_))
        ));
    }

    #[test]
    fn face_review_needs_a_face() {
        let now = util::now();
        let mut record = RegistrationRecord::new(application("asha@example.com"), now);
        record.set_face_verified(true).unwrap();
        assert_eq!(record.face_verified, Some(true));

        let mut no_face = application("ravi@example.com");
        no_face.face_image = None;
        let mut record = RegistrationRecord::new(no_face, now);
        assert!(record.set_face_verified(true).is_err());
    }

    #[test]
    fn checks_and_stats() {
        let now = util::now();
        let pending = RegistrationRecord::new(application("a@example.com"), now);
        let mut approved = RegistrationRecord::new(application("b@example.com"), now);
        approved.approve(now).unwrap();
        let mut rejected = RegistrationRecord::new(application("c@example.com"), now);
        rejected.reject(now).unwrap();

        let check = UserCheck::from(Some(&approved));
        assert!(check.is_registered && check.is_approved);
        let check = UserCheck::from(Some(&pending));
        assert_eq!(check.status, Some(RegistrationStatus::Pending));
        assert!(!check.is_approved);
        assert!(!UserCheck::from(None).is_registered);

        let stats = RegistrationStats::collect(vec![&pending, &approved, &rejected]);
        assert_eq!(
            stats,
            RegistrationStats {
                total: 3,
                pending: 1,
                approved: 1,
                rejected: 1
            }
        );

        let summary = pending.summary();
        assert!(summary.has_face_data);
        assert!(!summary.has_document);
        assert_eq!("approved".parse::<RegistrationStatus>().unwrap(), RegistrationStatus::Approved);
        assert!("unknown".parse::<RegistrationStatus>().is_err());
    }
}
