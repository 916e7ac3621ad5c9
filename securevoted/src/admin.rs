use crate::db::{self, Db};
use crate::error::{ApiError, Result};
use crate::node::{AdminSession, Node};
use crate::parse_id;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{Route, State};
use securevote::*;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[post("/api/admin/register", data = "<req>")]
async fn register(
    node: &State<Node>,
    db: &State<Db>,
    req: Json<NewAdmin>,
) -> Result<Created<Json<AdminProfile>>> {
    let req = req.into_inner();
    req.validate()?;

    let mut store = node.store.lock().await;
    if store.admin_by_official_id(&req.official_id).is_some() {
        return Err(Error::AdminExists(req.official_id.trim().to_uppercase()).into());
    }

    let admin = AdminAccount::new(req, now());
    db::save_admin(db, &admin).await?;
    log::info!("Admin account {} awaiting approval", admin.official_id);

    let profile = admin.profile();
    store.set_admin(admin);
    Ok(Created::new("/api/admin/accounts").body(Json(profile)))
}

#[derive(Deserialize)]
struct Login {
    official_id: String,
    email: String,
    password: String,
}

#[post("/api/admin/login", data = "<req>")]
async fn login(node: &State<Node>, req: Json<Login>) -> Result<Json<Value>> {
    let admin = node
        .store
        .lock()
        .await
        .admin_by_official_id(&req.official_id)
        .ok_or(Error::InvalidCredentials)?;
    admin.check_login(&req.email, &req.password)?;

    let session = node
        .sessions
        .lock()
        .await
        .issue(Role::Admin { admin_id: admin.id }, now());
    log::info!("Admin {} logged in", admin.official_id);

    Ok(Json(json!({
        "token": session.token,
        "expires_at": session.expires_at,
        "admin": admin.profile(),
    })))
}

#[post("/api/admin/logout")]
async fn logout(node: &State<Node>, session: AdminSession) -> Json<Value> {
    node.sessions.lock().await.revoke(&session.token);
    Json(json!({ "message": "Logged out" }))
}

#[get("/api/admin/accounts")]
async fn accounts(node: &State<Node>, _session: AdminSession) -> Json<Vec<AdminProfile>> {
    let admins = node.store.lock().await.admins();
    Json(admins.iter().map(AdminAccount::profile).collect())
}

#[post("/api/admin/accounts/<id>/approve")]
async fn approve_account(
    node: &State<Node>,
    db: &State<Db>,
    session: AdminSession,
    id: &str,
) -> Result<Json<AdminProfile>> {
    let mut store = node.store.lock().await;
    let mut admin = store.admin(parse_id(id)?)?;
    admin.approve()?;
    db::save_admin(db, &admin).await?;
    log::info!(
        "Admin {} approved by {}",
        admin.official_id,
        session.admin.official_id
    );

    let profile = admin.profile();
    store.set_admin(admin);
    Ok(Json(profile))
}

#[get("/api/admin/stats")]
async fn stats(node: &State<Node>, _session: AdminSession) -> Json<Value> {
    let store = node.store.lock().await;
    let elections = store.elections();
    let active = elections
        .iter()
        .filter(|e| e.status == ElectionStatus::Active)
        .count();
    let chain = node.ledger.lock().await.stats();

    Json(json!({
        "registrations": store.registration_stats(),
        "elections": {
            "total": elections.len(),
            "active": active,
        },
        "candidates": store.candidates().len(),
        "chain": chain,
    }))
}

#[get("/api/admin/elections")]
async fn list_elections(node: &State<Node>, _session: AdminSession) -> Json<Vec<Election>> {
    Json(node.store.lock().await.elections())
}

#[post("/api/admin/elections", data = "<req>")]
async fn create_election(
    node: &State<Node>,
    db: &State<Db>,
    _session: AdminSession,
    req: Json<NewElection>,
) -> Result<Created<Json<Election>>> {
    let election = Election::new(req.into_inner(), now())?;
    db::save_election(db, &election).await?;
    log::info!("Created election {} ({})", election.id, election.title);

    node.store.lock().await.set_election(election.clone());
    let location = format!("/api/elections/{}", election.id);
    Ok(Created::new(location).body(Json(election)))
}

async fn transition(
    node: &Node,
    db: &Db,
    id: &str,
    change: fn(&mut Election) -> std::result::Result<(), Error>,
) -> Result<Json<Election>> {
    let mut store = node.store.lock().await;
    let mut election = store.election(parse_id(id)?)?;
    change(&mut election)?;
    db::save_election(db, &election).await?;
    log::info!("Election {} is now {}", election.id, election.status);

    store.set_election(election.clone());
    Ok(Json(election))
}

#[post("/api/admin/elections/<id>/start")]
async fn start_election(
    node: &State<Node>,
    db: &State<Db>,
    _session: AdminSession,
    id: &str,
) -> Result<Json<Election>> {
    transition(node, db, id, Election::start).await
}

#[post("/api/admin/elections/<id>/stop")]
async fn stop_election(
    node: &State<Node>,
    db: &State<Db>,
    _session: AdminSession,
    id: &str,
) -> Result<Json<Election>> {
    transition(node, db, id, Election::stop).await
}

#[get("/api/admin/candidates?<election_id>")]
async fn list_candidates(
    node: &State<Node>,
    _session: AdminSession,
    election_id: Option<&str>,
) -> Result<Json<Vec<Candidate>>> {
    let store = node.store.lock().await;
    let candidates = match election_id {
        Some(id) => store.candidates_for(parse_id(id)?),
        None => store.candidates(),
    };
    Ok(Json(candidates))
}

async fn add_candidates(
    node: &Node,
    db: &Db,
    election_id: Uuid,
    batch: Vec<NewCandidate>,
) -> Result<Vec<Candidate>> {
    let mut store = node.store.lock().await;
    let election = store.election(election_id)?;
    let candidates = candidates_for_election(&election, batch, now())?;
    db::save_candidates(db, &candidates).await?;
    log::info!(
        "Added {} candidate(s) to election {}",
        candidates.len(),
        election.id
    );

    for candidate in &candidates {
        store.set_candidate(candidate.clone());
    }
    Ok(candidates)
}

#[post("/api/admin/candidates", data = "<req>")]
async fn create_candidate(
    node: &State<Node>,
    db: &State<Db>,
    _session: AdminSession,
    req: Json<NewCandidate>,
) -> Result<Created<Json<Candidate>>> {
    let req = req.into_inner();
    let mut added = add_candidates(node, db, req.election_id, vec![req]).await?;
    let candidate = added
        .pop()
        .ok_or_else(|| ApiError::Internal("candidate was not stored".to_owned()))?;
    Ok(Created::new("/api/admin/candidates").body(Json(candidate)))
}

#[derive(Deserialize)]
struct BulkCandidates {
    election_id: Uuid,
    candidates: Vec<NewCandidate>,
}

#[post("/api/admin/candidates/bulk", data = "<req>")]
async fn create_candidates(
    node: &State<Node>,
    db: &State<Db>,
    _session: AdminSession,
    req: Json<BulkCandidates>,
) -> Result<Created<Json<Vec<Candidate>>>> {
    let mut req = req.into_inner();
    if req.candidates.is_empty() {
        return Err(ApiError::BadRequest("no candidates given".to_owned()));
    }
    for candidate in req.candidates.iter_mut().filter(|c| c.election_id.is_nil()) {
        candidate.election_id = req.election_id;
    }
    let added = add_candidates(node, db, req.election_id, req.candidates).await?;
    Ok(Created::new("/api/admin/candidates").body(Json(added)))
}

/// A candidate of a draft election, the election still open to changes
fn draft_candidate(store: &MemStore, id: &str) -> Result<Candidate> {
    let candidate = store.candidate(parse_id(id)?)?;
    store
        .election(candidate.election_id)?
        .accepts_candidate_changes()?;
    Ok(candidate)
}

#[put("/api/admin/candidates/<id>", data = "<req>")]
async fn update_candidate(
    node: &State<Node>,
    db: &State<Db>,
    _session: AdminSession,
    id: &str,
    req: Json<NewCandidate>,
) -> Result<Json<Candidate>> {
    let mut store = node.store.lock().await;
    let mut candidate = draft_candidate(&store, id)?;
    candidate.update(req.into_inner())?;
    db::save_candidates(db, std::slice::from_ref(&candidate)).await?;
    log::info!("Updated candidate {} ({})", candidate.id, candidate.name);

    store.set_candidate(candidate.clone());
    Ok(Json(candidate))
}

#[delete("/api/admin/candidates/<id>")]
async fn delete_candidate(
    node: &State<Node>,
    db: &State<Db>,
    _session: AdminSession,
    id: &str,
) -> Result<Json<Value>> {
    let mut store = node.store.lock().await;
    let candidate = draft_candidate(&store, id)?;
    db::delete_candidate(db, candidate.id).await?;
    log::info!(
        "Withdrew candidate {} from election {}",
        candidate.id,
        candidate.election_id
    );

    store.remove_candidate(candidate.id);
    Ok(Json(json!({ "deleted": candidate.id })))
}

#[get("/api/admin/registrations?<status>")]
async fn list_registrations(
    node: &State<Node>,
    _session: AdminSession,
    status: Option<&str>,
) -> Result<Json<Vec<RegistrationSummary>>> {
    let status = status.map(str::parse::<RegistrationStatus>).transpose()?;
    let records = node.store.lock().await.registrations(status);
    Ok(Json(records.iter().map(RegistrationRecord::summary).collect()))
}

async fn review(
    node: &Node,
    db: &Db,
    admin: &AdminAccount,
    id: &str,
    decision: RegistrationStatus,
) -> Result<Json<RegistrationSummary>> {
    let mut store = node.store.lock().await;
    let mut record = store.registration(parse_id(id)?)?;
    match decision {
        RegistrationStatus::Approved => record.approve(now())?,
        RegistrationStatus::Rejected => record.reject(now())?,
        RegistrationStatus::Pending => {
            return Err(ApiError::BadRequest("cannot return a registration to pending".to_owned()))
        }
    }
    db::save_registration(db, &record).await?;
    log::info!(
        "Registration of {} {} by {}",
        mask_email(&record.email),
        record.status,
        admin.official_id
    );

    let summary = record.summary();
    store.set_registration(record);
    Ok(Json(summary))
}

#[post("/api/admin/approve/<id>")]
async fn approve_registration(
    node: &State<Node>,
    db: &State<Db>,
    session: AdminSession,
    id: &str,
) -> Result<Json<RegistrationSummary>> {
    review(node, db, &session.admin, id, RegistrationStatus::Approved).await
}

#[post("/api/admin/reject/<id>")]
async fn reject_registration(
    node: &State<Node>,
    db: &State<Db>,
    session: AdminSession,
    id: &str,
) -> Result<Json<RegistrationSummary>> {
    review(node, db, &session.admin, id, RegistrationStatus::Rejected).await
}

#[get("/api/admin/user-face/<id>")]
async fn user_face(node: &State<Node>, _session: AdminSession, id: &str) -> Result<Json<Value>> {
    let record = node.store.lock().await.registration(parse_id(id)?)?;
    let image = record
        .face_image
        .ok_or_else(|| NotFound::new("face image for registration", id))?;
    Ok(Json(json!({
        "id": record.id,
        "face_image": image,
        "face_verified": record.face_verified,
    })))
}

#[get("/api/admin/user-document/<id>")]
async fn user_document(
    node: &State<Node>,
    _session: AdminSession,
    id: &str,
) -> Result<Json<Value>> {
    let record = node.store.lock().await.registration(parse_id(id)?)?;
    let image = record
        .document_image
        .ok_or_else(|| NotFound::new("document for registration", id))?;
    Ok(Json(json!({
        "id": record.id,
        "document_image": image,
    })))
}

#[derive(Deserialize)]
struct FaceCheck {
    verified: bool,
}

#[post("/api/admin/verify-face/<id>", data = "<req>")]
async fn verify_face(
    node: &State<Node>,
    db: &State<Db>,
    _session: AdminSession,
    id: &str,
    req: Json<FaceCheck>,
) -> Result<Json<RegistrationSummary>> {
    let mut store = node.store.lock().await;
    let mut record = store.registration(parse_id(id)?)?;
    record.set_face_verified(req.verified)?;
    db::save_registration(db, &record).await?;

    let summary = record.summary();
    store.set_registration(record);
    Ok(Json(summary))
}

#[post("/api/admin/seal")]
async fn seal(node: &State<Node>, db: &State<Db>, _session: AdminSession) -> Result<Json<Value>> {
    let block = crate::tasks::seal_pending(node, db).await?;
    Ok(Json(json!({
        "sealed": block.is_some(),
        "block": block.map(|b| b.summary(now())),
    })))
}

pub fn routes() -> Vec<Route> {
    routes![
        register,
        login,
        logout,
        accounts,
        approve_account,
        stats,
        list_elections,
        create_election,
        start_election,
        stop_election,
        list_candidates,
        create_candidate,
        create_candidates,
        update_candidate,
        delete_candidate,
        list_registrations,
        approve_registration,
        reject_registration,
        user_face,
        user_document,
        verify_face,
        seal,
    ]
}
