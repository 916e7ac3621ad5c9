use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use securevote::{Error, NotFound, ValidationError};
use serde_json::json;
use thiserror::Error;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Core(#[from] Error),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("securevote: {0}")]
    NotFound(#[from] NotFound),

    #[error("securevoted: database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("securevoted: {0}")]
    BadRequest(String),

    #[error("securevoted: {0}")]
    Unauthorized(String),

    #[error("securevoted: {0}")]
    Forbidden(String),

    #[error("securevoted: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Core(Error::JSONSerialization(e))
    }
}

fn core_status(e: &Error) -> Status {
    match e {
        Error::BadHex
        | Error::BadKeyLength
        | Error::InvalidField { .. }
        | Error::OtpNotFound
        | Error::OtpExpired
        | Error::OtpInvalid { .. }
        | Error::OtpPurposeMismatch(_) => Status::BadRequest,
        Error::OtpAttemptsExceeded | Error::OtpResendTooSoon(_) => Status::TooManyRequests,
        Error::InvalidCredentials | Error::InvalidSession => Status::Unauthorized,
        Error::NotRegistered(_) | Error::RegistrationNotApproved(_) | Error::AdminNotApproved => {
            Status::Forbidden
        }
        Error::AlreadyRegistered(..)
        | Error::InvalidTransition { .. }
        | Error::AdminExists(_)
        | Error::ElectionClosed(_)
        | Error::CandidatesLocked(_) => Status::Conflict,
        Error::NotFound(_) => Status::NotFound,
        Error::Validation(v) => validation_status(v),
        Error::SignatureError(_) | Error::MismatchedPublicKeys | Error::JSONSerialization(_) => {
            Status::InternalServerError
        }
    }
}

fn validation_status(e: &ValidationError) -> Status {
    match e {
        ValidationError::VoterNotApproved => Status::Forbidden,
        ValidationError::ElectionNotActive(_) | ValidationError::AlreadyVoted => Status::Conflict,
        ValidationError::CandidateNotInElection(..) => Status::BadRequest,
        ValidationError::NotFound(_) => Status::NotFound,
        _ => Status::InternalServerError,
    }
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::Core(e) => core_status(e),
            ApiError::Validation(e) => validation_status(e),
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::BadRequest(_) => Status::BadRequest,
            ApiError::Unauthorized(_) => Status::Unauthorized,
            ApiError::Forbidden(_) => Status::Forbidden,
            ApiError::Database(_) | ApiError::Internal(_) => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status == Status::InternalServerError {
            log::error!("{} {}: {}", req.method(), req.uri(), self);
        }
        (status, Json(json!({ "error": self.to_string() }))).respond_to(req)
    }
}

/// Message left by a failing request guard for the catchers to render
pub struct GuardFailure(pub Option<String>);

#[catch(400)]
pub fn bad_request(req: &Request<'_>) -> Json<serde_json::Value> {
    render(req, "bad request")
}

#[catch(401)]
pub fn unauthorized(req: &Request<'_>) -> Json<serde_json::Value> {
    render(req, "missing or invalid bearer token")
}

#[catch(403)]
pub fn forbidden(req: &Request<'_>) -> Json<serde_json::Value> {
    render(req, "forbidden")
}

#[catch(404)]
pub fn not_found(req: &Request<'_>) -> Json<serde_json::Value> {
    render(req, "not found")
}

#[catch(422)]
pub fn unprocessable(req: &Request<'_>) -> Json<serde_json::Value> {
    render(req, "malformed request body")
}

#[catch(500)]
pub fn internal(req: &Request<'_>) -> Json<serde_json::Value> {
    render(req, "internal server error")
}

fn render(req: &Request<'_>, fallback: &str) -> Json<serde_json::Value> {
    let message = req
        .local_cache(|| GuardFailure(None))
        .0
        .clone()
        .unwrap_or_else(|| fallback.to_owned());
    Json(json!({ "error": message }))
}
