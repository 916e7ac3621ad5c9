use ed25519_dalek::Signature;
use ed25519_dalek::SignatureError;
use ed25519_dalek::VerifyingKey;
use std::borrow::Cow;
use std::convert::TryFrom;

pub use hex_buffer_serde::Hex;

// a single-purpose type for use in `#[serde(with)]`
pub enum EdPublicKeyHex {}

impl Hex<VerifyingKey> for EdPublicKeyHex {
    type Error = SignatureError;

    fn create_bytes(public_key: &VerifyingKey) -> Cow<'_, [u8]> {
        Cow::from(public_key.as_bytes().to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> Result<VerifyingKey, SignatureError> {
        VerifyingKey::try_from(bytes)
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum EdSignatureHex {}

impl Hex<Signature> for EdSignatureHex {
    type Error = SignatureError;

    fn create_bytes(sig: &Signature) -> Cow<'_, [u8]> {
        Cow::from(sig.to_bytes().to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Signature, SignatureError> {
        Signature::from_slice(bytes)
    }
}
