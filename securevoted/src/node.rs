use crate::config::Config;
use crate::error::{ApiError, GuardFailure};
use ed25519_dalek::SigningKey;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::tokio::sync::Mutex;
use securevote::*;
use std::sync::Arc;

/// Shared in-memory state of the daemon. The database stays the source of truth.
#[derive(Clone)]
pub struct Node {
    pub config: Arc<Config>,
    pub sealing_key: Arc<SigningKey>,
    pub store: Arc<Mutex<MemStore>>,
    pub ledger: Arc<Mutex<Ledger>>,
    pub otps: Arc<Mutex<OtpBook>>,
    pub sessions: Arc<Mutex<SessionBook>>,
}

impl Node {
    pub fn new(config: Config, sealing_key: SigningKey, store: MemStore, ledger: Ledger) -> Self {
        let otps = OtpBook::new(config.otp_policy.clone());
        let sessions = SessionBook::new(config.session_ttl);
        Node {
            config: Arc::new(config),
            sealing_key: Arc::new(sealing_key),
            store: Arc::new(Mutex::new(store)),
            ledger: Arc::new(Mutex::new(ledger)),
            otps: Arc::new(Mutex::new(otps)),
            sessions: Arc::new(Mutex::new(sessions)),
        }
    }
}

/// A logged in voter
pub struct VoterSession {
    pub email: String,
    pub token: String,
}

/// A logged in, approved admin
pub struct AdminSession {
    pub admin: AdminAccount,
    pub token: String,
}

fn bearer_token<'r>(req: &'r Request<'_>) -> Option<&'r str> {
    req.headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn fail<S>(req: &Request<'_>, error: ApiError) -> Outcome<S, ApiError> {
    let status = error.status();
    req.local_cache(|| GuardFailure(Some(error.to_string())));
    Outcome::Error((status, error))
}

async fn resolve_session(req: &Request<'_>) -> Result<(Node, Session), ApiError> {
    let node = req
        .rocket()
        .state::<Node>()
        .cloned()
        .ok_or_else(|| ApiError::Internal("node state is not initialised".to_owned()))?;
    let token = bearer_token(req)
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_owned()))?;
    let session = node.sessions.lock().await.resolve(token, now())?;
    Ok((node, session))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for VoterSession {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let session = match resolve_session(req).await {
            Ok((_, session)) => session,
            Err(e) => return fail(req, e),
        };
        match session.role {
            Role::Voter { email } => Outcome::Success(VoterSession {
                email,
                token: session.token,
            }),
            Role::Admin { .. } => fail(
                req,
                ApiError::Forbidden("voter login required".to_owned()),
            ),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminSession {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let (node, session) = match resolve_session(req).await {
            Ok(resolved) => resolved,
            Err(e) => return fail(req, e),
        };
        let admin_id = match session.role {
            Role::Admin { admin_id } => admin_id,
            Role::Voter { .. } => {
                return fail(req, ApiError::Forbidden("admin login required".to_owned()))
            }
        };

        let admin = node.store.lock().await.get_admin(admin_id);
        match admin {
            Some(admin) if admin.approved => Outcome::Success(AdminSession {
                admin,
                token: session.token,
            }),
            Some(_) => fail(req, Error::AdminNotApproved.into()),
            None => fail(req, Error::InvalidSession.into()),
        }
    }
}
