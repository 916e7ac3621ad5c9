use crate::*;
use chrono::{DateTime, SubsecRound, Utc};
use digest::Digest;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use rand::Rng;

pub fn generate_keypair() -> (SigningKey, VerifyingKey) {
    let mut csprng = rand::rngs::OsRng {};
    let secret = SigningKey::generate(&mut csprng);
    let public = secret.verifying_key();
    (secret, public)
}

/// Parse a hex-encoded 32 byte ed25519 secret key
pub fn secret_key_from_hex(hex_str: &str) -> Result<SigningKey, Error> {
    let bytes = hex::decode(hex_str.trim()).map_err(|_| Error::BadHex)?;
    let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| Error::BadKeyLength)?;
    Ok(SigningKey::from_bytes(&bytes))
}

pub fn secret_key_to_hex(secret: &SigningKey) -> String {
    hex::encode(secret.to_bytes())
}

pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(sha2::Sha256::digest(data.as_ref()))
}

/// Random hex string of `len` bytes
pub fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}

/// Current time, truncated to milliseconds so that it survives a JSON round trip unchanged
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// `local@domain.tld` with no whitespace and a dot somewhere after the `@`
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return false,
    };
    if local.is_empty() {
        return false;
    }
    match domain.rfind('.') {
        Some(dot) => dot > 0 && dot < domain.len() - 1,
        None => false,
    }
}

/// Hide most of the local part of an address, e.g. `jo***@example.com`
pub fn mask_email(email: &str) -> String {
    let email = email.trim();
    match email.find('@') {
        Some(at) if at >= 2 => {
            let visible: String = email[..at].chars().take(2).collect();
            format!("{}***{}", visible, &email[at..])
        }
        Some(at) => format!("***{}", &email[at..]),
        None => "***".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("voter@example.com"));
        assert!(is_valid_email("  first.last@mail.example.org "));
        assert!(!is_valid_email("voter@example"));
        assert!(!is_valid_email("voter@.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("vo ter@example.com"));
        assert!(!is_valid_email("a@b@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn email_masking() {
        assert_eq!(mask_email("john.doe@example.com"), "jo***@example.com");
        assert_eq!(mask_email("ab@example.com"), "ab***@example.com");
        assert_eq!(mask_email("a@example.com"), "***@example.com");
        assert_eq!(mask_email("nonsense"), "***");
    }

    #[test]
    fn secret_key_parsing() {
        let (secret, public) = generate_keypair();
        let parsed = secret_key_from_hex(&secret_key_to_hex(&secret)).unwrap();
        assert_eq!(parsed.verifying_key(), public);

        assert!(matches!(secret_key_from_hex("zz"), Err(Error::BadHex)));
        assert!(matches!(secret_key_from_hex("abcd"), Err(Error::BadKeyLength)));
    }

    #[test]
    fn now_has_millisecond_precision() {
        let t = now();
        assert_eq!(t.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
