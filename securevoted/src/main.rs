use crate::error::{ApiError, Result};
use crate::node::{Node, VoterSession};
use config::Config;
use db::Db;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{Build, Rocket, State};
use securevote::*;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[macro_use]
extern crate rocket;

mod admin;
mod config;
mod db;
mod error;
mod mail;
mod node;
mod tasks;


pub(crate) fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim()).map_err(|_| ApiError::BadRequest(format!("invalid id '{}'", id)))
}

#[get("/api/health")]
async fn health(node: &State<Node>) -> Json<Value> {
    let otps = node.otps.lock().await.len();
    let ledger = node.ledger.lock().await;
    Json(json!({
        "status": "ok",
        "timestamp": now(),
        "otp_store_size": otps,
        "block_height": ledger.height(),
        "pending_votes": ledger.pending().len(),
    }))
}

#[derive(Deserialize)]
struct SendOtp {
    email: String,
    purpose: OtpPurpose,
}

#[post("/api/send-otp", data = "<req>")]
async fn send_otp(node: &State<Node>, db: &State<Db>, req: Json<SendOtp>) -> Result<Json<Value>> {
    if !is_valid_email(&req.email) {
        return Err(Error::InvalidField {
            field: "email",
            reason: "not a valid email address".to_owned(),
        }
        .into());
    }

    {
        let store = node.store.lock().await;
        let existing = store.registration_for_email(&req.email);
        match req.purpose {
            OtpPurpose::Login => ensure_can_login(&req.email, existing.as_ref())?,
            OtpPurpose::Registration => ensure_can_register(existing.as_ref())?,
        }
    }

    let code = node
        .otps
        .lock()
        .await
        .issue(&req.email, req.purpose, now())?;
    mail::send_otp(node, db, &req.email, &code, req.purpose).await?;

    Ok(Json(json!({
        "message": "OTP sent",
        "email": mask_email(&req.email),
        "purpose": req.purpose,
        "expires_in": node.config.otp_policy.ttl.num_seconds(),
    })))
}

#[derive(Deserialize)]
struct VerifyOtp {
    email: String,
    otp: String,
    #[serde(default = "login_purpose")]
    purpose: OtpPurpose,
}

fn login_purpose() -> OtpPurpose {
    OtpPurpose::Login
}

#[post("/api/verify-otp", data = "<req>")]
async fn verify_otp(node: &State<Node>, req: Json<VerifyOtp>) -> Result<Json<Value>> {
    // Registration codes are consumed by complete-registration
    if req.purpose == OtpPurpose::Registration {
        node.otps
            .lock()
            .await
            .check(&req.email, &req.otp, req.purpose, now())?;
        return Ok(Json(json!({ "message": "OTP verified" })));
    }

    node.otps
        .lock()
        .await
        .verify(&req.email, &req.otp, req.purpose, now())?;

    // Approval may have been withdrawn since the code was sent
    let record = node.store.lock().await.registration_for_email(&req.email);
    ensure_can_login(&req.email, record.as_ref())?;

    let email = normalize_email(&req.email);
    let session = node
        .sessions
        .lock()
        .await
        .issue(Role::Voter { email: email.clone() }, now());
    log::info!("Voter {} logged in", mask_email(&email));

    Ok(Json(json!({
        "message": "OTP verified",
        "token": session.token,
        "expires_at": session.expires_at,
        "user": record.map(|r| r.summary()),
    })))
}

#[get("/api/otp-status/<email>")]
async fn otp_status(node: &State<Node>, email: &str) -> Json<OtpStatus> {
    Json(node.otps.lock().await.status(email, now()))
}

#[derive(Deserialize)]
struct CheckUser {
    email: String,
}

#[post("/api/check-user", data = "<req>")]
async fn check_user(node: &State<Node>, req: Json<CheckUser>) -> Json<UserCheck> {
    let record = node.store.lock().await.registration_for_email(&req.email);
    Json(UserCheck::from(record.as_ref()))
}

#[derive(Deserialize)]
struct CompleteRegistration {
    email: String,
    otp: String,
    #[serde(alias = "registration_data")]
    registration: NewRegistration,
}

#[post("/api/complete-registration", data = "<req>")]
async fn complete_registration(
    node: &State<Node>,
    db: &State<Db>,
    req: Json<CompleteRegistration>,
) -> Result<Created<Json<RegistrationSummary>>> {
    let req = req.into_inner();
    if normalize_email(&req.registration.email) != normalize_email(&req.email) {
        return Err(Error::InvalidField {
            field: "email",
            reason: "does not match the verified address".to_owned(),
        }
        .into());
    }
    req.registration.validate()?;

    let mut store = node.store.lock().await;
    ensure_can_register(store.registration_for_email(&req.email).as_ref())?;
    node.otps
        .lock()
        .await
        .verify(&req.email, &req.otp, OtpPurpose::Registration, now())?;

    let record = RegistrationRecord::new(req.registration, now());
    db::save_registration(db, &record).await?;
    log::info!("New registration from {}", mask_email(&record.email));

    let summary = record.summary();
    store.set_registration(record);
    Ok(Created::new("/api/check-user").body(Json(summary)))
}

/// Elections open to the public. Drafts stay hidden until started.
fn published(store: &MemStore, id: &str) -> Result<Election> {
    let election = store.election(parse_id(id)?)?;
    if election.status == ElectionStatus::Draft {
        return Err(NotFound::new("election", id).into());
    }
    Ok(election)
}

#[get("/api/elections")]
async fn list_elections(node: &State<Node>) -> Json<Vec<Election>> {
    let elections = node
        .store
        .lock()
        .await
        .elections()
        .into_iter()
        .filter(|e| e.status != ElectionStatus::Draft)
        .collect();
    Json(elections)
}

#[get("/api/elections/<id>")]
async fn read_election(node: &State<Node>, id: &str) -> Result<Json<Value>> {
    let store = node.store.lock().await;
    let election = published(&store, id)?;
    let candidates = store.candidates_for(election.id);
    Ok(Json(json!({
        "election": election,
        "candidates": candidates,
    })))
}

#[get("/api/elections/<id>/results")]
async fn election_results(node: &State<Node>, id: &str) -> Result<Json<ElectionTally>> {
    let store = node.store.lock().await;
    let election = published(&store, id)?;
    let candidates = store.candidates_for(election.id);
    let tally = node.ledger.lock().await.tally(election.id, &candidates);
    Ok(Json(tally))
}

#[derive(Deserialize)]
struct CastVote {
    election_id: Uuid,
    candidate_id: Uuid,
}

#[post("/api/vote", data = "<req>")]
async fn vote(
    node: &State<Node>,
    db: &State<Db>,
    voter: VoterSession,
    req: Json<CastVote>,
) -> Result<Created<Json<VoteReceipt>>> {
    let store = node.store.lock().await;
    let mut ledger = node.ledger.lock().await;

    let record = ledger.prepare_vote(
        &*store,
        req.election_id,
        req.candidate_id,
        &voter.email,
        now(),
    )?;
    db::save_pending_vote(db, &record).await?;
    let receipt = ledger.push_pending(record)?;

    log::info!("Vote recorded in election {}", req.election_id);
    let location = format!("/api/votes/{}", receipt.receipt);
    Ok(Created::new(location).body(Json(receipt)))
}

#[get("/api/votes/<receipt>")]
async fn read_receipt(node: &State<Node>, receipt: &str) -> Result<Json<ReceiptStatus>> {
    node.ledger
        .lock()
        .await
        .receipt_status(receipt)
        .map(Json)
        .ok_or_else(|| NotFound::new("receipt", receipt).into())
}

#[get("/api/chain/stats")]
async fn chain_stats(node: &State<Node>) -> Json<ChainStats> {
    Json(node.ledger.lock().await.stats())
}

pub(crate) const MAX_RECENT_BLOCKS: usize = 100;

#[get("/api/chain/blocks?<count>")]
async fn recent_blocks(node: &State<Node>, count: Option<usize>) -> Json<Vec<BlockSummary>> {
    let count = count.unwrap_or(10).min(MAX_RECENT_BLOCKS);
    Json(node.ledger.lock().await.recent_blocks(count, now()))
}

#[get("/api/chain/blocks/<index>")]
async fn read_block(node: &State<Node>, index: u64) -> Result<Json<Block>> {
    node.ledger
        .lock()
        .await
        .block(index)
        .cloned()
        .map(Json)
        .ok_or_else(|| NotFound::new("block", index).into())
}

#[get("/api/chain/verify")]
async fn verify_chain(node: &State<Node>) -> Json<Value> {
    let ledger = node.ledger.lock().await;
    let result = ledger.validate_chain();
    Json(json!({
        "valid": result.is_ok(),
        "error": result.err().map(|e| e.to_string()),
        "height": ledger.height(),
    }))
}

pub fn build(config: Config) -> Rocket<Build> {
    let mut routes = routes![
        health,
        send_otp,
        verify_otp,
        otp_status,
        check_user,
        complete_registration,
        list_elections,
        read_election,
        election_results,
        vote,
        read_receipt,
        chain_stats,
        recent_blocks,
        read_block,
        verify_chain,
    ];
    routes.extend(admin::routes());

    rocket::build()
        .manage(config)
        .attach(db::stage())
        .attach(tasks::stage())
        .mount("/", routes)
        .register(
            "/",
            catchers![
                error::bad_request,
                error::unauthorized,
                error::forbidden,
                error::not_found,
                error::unprocessable,
                error::internal
            ],
        )
}

#[launch]
fn rocket() -> _ {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    build(config)
}
