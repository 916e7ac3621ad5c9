use crate::*;
use thiserror::Error;
use uuid::Uuid;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("securevote: signature error: {0}")]
    SignatureError(#[from] ed25519_dalek::SignatureError),

    #[error("securevote: mismatched public keys")]
    MismatchedPublicKeys,

    #[error("securevote: invalid hexidecimal")]
    BadHex,

    #[error("securevote: invalid key length")]
    BadKeyLength,

    #[error("securevote: JSON error: {0}")]
    JSONSerialization(#[from] serde_json::Error),

    #[error("securevote: invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("securevote: no OTP found for this email, request a new one")]
    OtpNotFound,

    #[error("securevote: OTP expired, request a new one")]
    OtpExpired,

    #[error("securevote: invalid OTP, {remaining} attempt(s) remaining")]
    OtpInvalid { remaining: u32 },

    #[error("securevote: too many wrong OTP attempts, request a new one")]
    OtpAttemptsExceeded,

    #[error("securevote: OTP was issued for {0}")]
    OtpPurposeMismatch(OtpPurpose),

    #[error("securevote: wait {0} second(s) before requesting a new OTP")]
    OtpResendTooSoon(i64),

    #[error("securevote: {0} already has a {1} registration")]
    AlreadyRegistered(String, RegistrationStatus),

    #[error("securevote: {0} is not registered, register before logging in")]
    NotRegistered(String),

    #[error("securevote: registration is {0}")]
    RegistrationNotApproved(RegistrationStatus),

    #[error("securevote: cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("securevote: official id {0} is already registered")]
    AdminExists(String),

    #[error("securevote: invalid credentials")]
    InvalidCredentials,

    #[error("securevote: admin account is awaiting approval")]
    AdminNotApproved,

    #[error("securevote: session expired or unknown")]
    InvalidSession,

    #[error("securevote: election {0} is closed")]
    ElectionClosed(Uuid),

    #[error("securevote: candidates of election {0} can only change while it is a draft")]
    CandidatesLocked(Uuid),

    #[error("securevote: {0}")]
    NotFound(#[from] NotFound),

    #[error("securevote: {0}")]
    Validation(#[from] ValidationError),
}

/// Vote and chain validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("securevote validation: voter is not approved to vote")]
    VoterNotApproved,

    #[error("securevote validation: election {0} is not accepting votes")]
    ElectionNotActive(Uuid),

    #[error("securevote validation: candidate {0} does not stand in election {1}")]
    CandidateNotInElection(Uuid, Uuid),

    #[error("securevote validation: voter has already cast a vote in this election")]
    AlreadyVoted,

    #[error("securevote validation: {0}")]
    NotFound(#[from] NotFound),

    #[error("securevote validation: chain has no genesis block")]
    MissingGenesis,

    #[error("securevote validation: malformed genesis block")]
    BadGenesis,

    #[error("securevote validation: expected block {expected}, found block {found}")]
    IndexMismatch { expected: u64, found: u64 },

    #[error("securevote validation: hash mismatch in block {0}")]
    HashMismatch(u64),

    #[error("securevote validation: block {0} does not link to its predecessor")]
    BrokenLink(u64),

    #[error("securevote validation: block {0} was sealed by an unknown key")]
    WrongSealer(u64),

    #[error("securevote validation: block {0} is older than its predecessor")]
    TimestampRegression(u64),

    #[error("securevote validation: block {0} contains a duplicate vote")]
    DuplicateVote(u64),

    #[error("securevote validation: signature error: {0}")]
    SignatureError(#[from] ed25519_dalek::SignatureError),
}
