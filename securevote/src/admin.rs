use crate::*;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// An election official asking for an admin account
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NewAdmin {
    pub official_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub designation: String,
    pub password: String,
    pub confirm_password: String,
}

pub fn is_valid_official_id(id: &str) -> bool {
    id.len() >= 6 && id.chars().all(|c| c.is_ascii_alphanumeric())
}

fn validate_password(password: &str) -> Result<(), Error> {
    if password.chars().count() < 6 {
        return Err(Error::InvalidField {
            field: "password",
            reason: "must be at least 6 characters".to_owned(),
        });
    }
    Ok(())
}

impl NewAdmin {
    pub fn validate(&self) -> Result<(), Error> {
        if !is_valid_official_id(self.official_id.trim()) {
            return Err(Error::InvalidField {
                field: "official_id",
                reason: "expected at least 6 letters or digits".to_owned(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidField {
                field: "name",
                reason: "required".to_owned(),
            });
        }
        if !is_valid_email(&self.email) {
            return Err(Error::InvalidField {
                field: "email",
                reason: "not a valid email address".to_owned(),
            });
        }
        validate_password(&self.password)?;
        if self.password != self.confirm_password {
            return Err(Error::InvalidField {
                field: "confirm_password",
                reason: "passwords do not match".to_owned(),
            });
        }
        Ok(())
    }
}

/// A stored admin account. Passwords are kept as salted SHA-256 digests.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AdminAccount {
    pub id: Uuid,
    pub official_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub department: String,
    pub designation: String,
    pub password_hash: String,
    pub salt: String,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

fn hash_password(salt: &str, password: &str) -> String {
    sha256_hex(format!("{}{}", salt, password))
}

impl AdminAccount {
    /// Create an account awaiting approval. The caller is expected to have validated `new`.
    pub fn new(new: NewAdmin, now: DateTime<Utc>) -> Self {
        let salt = random_hex(16);
        AdminAccount {
            id: Uuid::new_v4(),
            official_id: new.official_id.trim().to_uppercase(),
            name: new.name.trim().to_owned(),
            email: normalize_email(&new.email),
            phone: new.phone.trim().to_owned(),
            department: new.department.trim().to_owned(),
            designation: new.designation.trim().to_owned(),
            password_hash: hash_password(&salt, &new.password),
            salt,
            approved: false,
            created_at: now,
        }
    }

    /// The approved account configured at startup
    pub fn bootstrap(
        official_id: &str,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let new = NewAdmin {
            official_id: official_id.to_owned(),
            name: "Chief Election Officer".to_owned(),
            email: email.to_owned(),
            phone: String::new(),
            department: String::new(),
            designation: String::new(),
            password: password.to_owned(),
            confirm_password: password.to_owned(),
        };
        new.validate()?;

        let mut account = AdminAccount::new(new, now);
        account.approved = true;
        Ok(account)
    }

    pub fn verify_password(&self, password: &str) -> bool {
        hash_password(&self.salt, password) == self.password_hash
    }

    /// Check a login attempt against this account
    pub fn check_login(&self, email: &str, password: &str) -> Result<(), Error> {
        if normalize_email(email) != self.email || !self.verify_password(password) {
            return Err(Error::InvalidCredentials);
        }
        if !self.approved {
            return Err(Error::AdminNotApproved);
        }
        Ok(())
    }

    pub fn approve(&mut self) -> Result<(), Error> {
        if self.approved {
            return Err(Error::InvalidTransition {
                entity: "admin account",
                from: "approved".to_owned(),
                to: "approved".to_owned(),
            });
        }
        self.approved = true;
        Ok(())
    }

    pub fn profile(&self) -> AdminProfile {
        AdminProfile {
            id: self.id,
            official_id: self.official_id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            department: self.department.clone(),
            designation: self.designation.clone(),
            approved: self.approved,
            created_at: self.created_at,
        }
    }
}

/// An admin account without its credentials
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AdminProfile {
    pub id: Uuid,
    pub official_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub department: String,
    pub designation: String,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn official() -> NewAdmin {
        NewAdmin {
            official_id: "eco2024a".to_owned(),
            name: "R. Iyer".to_owned(),
            email: "iyer@eci.example.org".to_owned(),
            phone: "9876500000".to_owned(),
            department: "Elections".to_owned(),
            designation: "Returning Officer".to_owned(),
            password: "hunter22".to_owned(),
            confirm_password: "hunter22".to_owned(),
        }
    }

    #[test]
    fn validation() {
        official().validate().unwrap();

        let mut bad = official();
        bad.official_id = "ab-12".to_owned();
        assert!(bad.validate().is_err());

        let mut bad = official();
        bad.confirm_password = "hunter23".to_owned();
        assert!(matches!(
            bad.validate(),
            Err(Error::InvalidField {
                field: "confirm_password",
                ..
            })
        ));

        let mut bad = official();
        bad.password = "abc".to_owned();
        bad.confirm_password = "abc".to_owned();
        assert!(matches!(
            bad.validate(),
            Err(Error::InvalidField {
                field: "password",
                ..
            })
        ));
    }

    #[test]
    fn login_requires_approval() {
        let mut account = AdminAccount::new(official(), now());
        assert_eq!(account.official_id, "ECO2024A");
        assert_ne!(account.password_hash, "hunter22");

        assert!(matches!(
            account.check_login("iyer@eci.example.org", "hunter22"),
            Err(Error::AdminNotApproved)
        ));
        assert!(matches!(
            account.check_login("iyer@eci.example.org", "wrong-password"),
            Err(Error::InvalidCredentials)
        ));

        account.approve().unwrap();
        assert!(account.approve().is_err());
        account
            .check_login(" IYER@eci.example.org", "hunter22")
            .unwrap();
        assert!(matches!(
            account.check_login("someone@eci.example.org", "hunter22"),
            Err(Error::InvalidCredentials)
        ));
    }

    #[test]
    fn salts_differ() {
        let a = AdminAccount::new(official(), now());
        let b = AdminAccount::new(official(), now());
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[test]
    fn bootstrap_account_is_approved() {
        let account =
            AdminAccount::bootstrap("ADMIN001", "admin@example.org", "changeme", now()).unwrap();
        assert!(account.approved);
        account.check_login("admin@example.org", "changeme").unwrap();

        assert!(AdminAccount::bootstrap("ADMIN001", "admin@example.org", "short", now()).is_err());

        let profile = account.profile();
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("password"));
    }
}
