use chrono::Duration;
use ed25519_dalek::SigningKey;
use securevote::OtpPolicy;
use std::env::var;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("securevoted: invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("securevoted: SECUREVOTE_ADMIN_ID, SECUREVOTE_ADMIN_EMAIL and SECUREVOTE_ADMIN_PASSWORD must be set together")]
    PartialAdmin,
}

/// Credentials for the admin account created at startup
#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub official_id: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone)]
pub struct Config {
    /// Sealing key. When unset, the key generated on first start is kept in the database.
    pub secret_key: Option<SigningKey>,
    pub db_path: String,

    /// Salt for voter hashes. When unset, a random salt is generated on first start.
    /// Either way the salt is pinned in the database with the chain.
    pub voter_salt: Option<String>,
    pub otp_policy: OtpPolicy,
    pub block_interval: Duration,
    pub session_ttl: Duration,
    pub bootstrap_admin: Option<BootstrapAdmin>,

    /// Write OTP codes to the log. Development only.
    pub log_otp: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            secret_key: None,
            db_path: "./securevote.db".to_owned(),
            voter_salt: None,
            otp_policy: OtpPolicy::default(),
            block_interval: Duration::seconds(15),
            session_ttl: Duration::seconds(3600),
            bootstrap_admin: None,
            log_otp: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(val) = var("SECUREVOTE_SECRET_KEY") {
            let key = securevote::secret_key_from_hex(&val).map_err(|e| ConfigError::Invalid {
                name: "SECUREVOTE_SECRET_KEY",
                reason: e.to_string(),
            })?;
            config.secret_key = Some(key);
        }
        if let Ok(val) = var("SECUREVOTE_DB_PATH") {
            config.db_path = val;
        }
        if let Ok(val) = var("SECUREVOTE_VOTER_SALT") {
            if val.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    name: "SECUREVOTE_VOTER_SALT",
                    reason: "must not be empty".to_owned(),
                });
            }
            config.voter_salt = Some(val);
        }

        config.otp_policy.ttl = seconds_var("SECUREVOTE_OTP_TTL_SECS", config.otp_policy.ttl)?;
        config.otp_policy.max_attempts = parse_var(
            "SECUREVOTE_OTP_MAX_ATTEMPTS",
            config.otp_policy.max_attempts,
        )?;
        config.otp_policy.resend_interval = seconds_var(
            "SECUREVOTE_OTP_RESEND_SECS",
            config.otp_policy.resend_interval,
        )?;
        config.block_interval = seconds_var("SECUREVOTE_BLOCK_INTERVAL_SECS", config.block_interval)?;
        config.session_ttl = seconds_var("SECUREVOTE_SESSION_TTL_SECS", config.session_ttl)?;
        config.log_otp = parse_var("SECUREVOTE_LOG_OTP", false)?;

        config.bootstrap_admin = match (
            var("SECUREVOTE_ADMIN_ID"),
            var("SECUREVOTE_ADMIN_EMAIL"),
            var("SECUREVOTE_ADMIN_PASSWORD"),
        ) {
            (Ok(official_id), Ok(email), Ok(password)) => Some(BootstrapAdmin {
                official_id,
                email,
                password,
            }),
            (Err(_), Err(_), Err(_)) => None,
            _ => return Err(ConfigError::PartialAdmin),
        };

        Ok(config)
    }
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Ok(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        Err(_e) => Ok(default),
    }
}

fn seconds_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let secs: u32 = parse_var(name, default.num_seconds() as u32)?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".to_owned(),
        });
    }
    Ok(Duration::seconds(secs as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_variables() {
        std::env::set_var("SECUREVOTE_TEST_TTL", "300");
        std::env::set_var("SECUREVOTE_TEST_ZERO", "0");
        std::env::set_var("SECUREVOTE_TEST_JUNK", "soon");

        let default = Duration::seconds(120);
        assert_eq!(
            seconds_var("SECUREVOTE_TEST_TTL", default).unwrap(),
            Duration::seconds(300)
        );
        assert_eq!(seconds_var("SECUREVOTE_TEST_UNSET", default).unwrap(), default);
        assert!(matches!(
            seconds_var("SECUREVOTE_TEST_ZERO", default),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(seconds_var("SECUREVOTE_TEST_JUNK", default).is_err());
        assert!(parse_var::<bool>("SECUREVOTE_TEST_JUNK", false).is_err());
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.secret_key.is_none());
        assert!(config.voter_salt.is_none());
        assert_eq!(config.db_path, "./securevote.db");
        assert_eq!(config.otp_policy.max_attempts, 5);
        assert_eq!(config.block_interval, Duration::seconds(15));
        assert!(config.bootstrap_admin.is_none());
        assert!(!config.log_otp);
    }
}
