use crate::config::Config;
use crate::error::ApiError;
use crate::node::Node;
use ed25519_dalek::SigningKey;
use rocket::fairing::{self, AdHoc};
use rocket::{Build, Rocket};
use securevote::*;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::str::FromStr;
use uuid::Uuid;

pub type Db = sqlx::SqlitePool;

async fn connect(db_path: &str) -> Result<Db, sqlx::Error> {
    let in_memory = db_path == ":memory:";
    let opts = if in_memory {
        SqliteConnectOptions::from_str("sqlite::memory:")?
    } else {
        SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
    };
    let opts = opts.disable_statement_logging();

    // An in-memory database lives and dies with its only connection
    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };
    pool.connect_with(opts).await
}

async fn init_db(rocket: Rocket<Build>) -> fairing::Result {
    let config = match rocket.state::<Config>() {
        Some(config) => config.clone(),
        None => {
            log::error!("securevoted: no configuration attached");
            return Err(rocket);
        }
    };

    let db = match connect(&config.db_path).await {
        Ok(db) => db,
        Err(e) => {
            log::error!("Failed to connect to SQLx database: {}", e);
            return Err(rocket);
        }
    };

    if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
        log::error!("Failed to initialize SQLx database: {}", e);
        return Err(rocket);
    }

    let node = match load(&db, config).await {
        Ok(node) => node,
        Err(e) => {
            log::error!("Failed to load SecureVote state: {}", e);
            return Err(rocket);
        }
    };

    Ok(rocket.manage(db).manage(node))
}

pub fn stage() -> AdHoc {
    AdHoc::on_ignite("SQLx Stage", |rocket| async {
        rocket.attach(AdHoc::try_on_ignite("SQLx Database", init_db))
    })
}

/// Fill the in-memory store and ledger from the database
async fn load(db: &Db, config: Config) -> crate::error::Result<Node> {
    let sealing_key = sealing_key(db, &config).await?;
    let voter_salt = voter_salt(db, &config).await?;
    let store = fill_store(db).await?;

    let blocks: Vec<Block> = values(db, "SELECT value FROM blocks ORDER BY idx").await?;
    let pending: Vec<VoteRecord> =
        values(db, "SELECT value FROM pending_votes ORDER BY rowid").await?;

    let ledger = if blocks.is_empty() {
        let ledger = Ledger::new(&sealing_key, &voter_salt, now());
        save_block(db, ledger.tip()).await?;
        log::info!("Started a new chain, genesis {}", ledger.tip().hash);
        ledger
    } else {
        let ledger = Ledger::from_blocks(blocks, pending, &voter_salt)?;
        ledger.validate_chain()?;
        if ledger.authority() != sealing_key.verifying_key() {
            return Err(Error::MismatchedPublicKeys.into());
        }
        log::info!(
            "Loaded chain of {} blocks with {} pending votes",
            ledger.height(),
            ledger.pending().len()
        );
        ledger
    };

    let node = Node::new(config, sealing_key, store, ledger);
    bootstrap_admin(db, &node).await?;
    Ok(node)
}

/// The configured sealing key, or the one generated on first start
async fn sealing_key(db: &Db, config: &Config) -> crate::error::Result<SigningKey> {
    if let Some(key) = &config.secret_key {
        return Ok(key.clone());
    }
    if let Some(stored) = setting(db, "sealing_key").await? {
        return Ok(secret_key_from_hex(&stored)?);
    }

    let (key, _) = generate_keypair();
    save_setting(db, "sealing_key", &secret_key_to_hex(&key)).await?;
    log::warn!(
        "SECUREVOTE_SECRET_KEY is not set, generated a sealing key and stored it in {}",
        config.db_path
    );
    Ok(key)
}

/// The salt is fixed by the first start. Changing it would unlink every recorded voter.
async fn voter_salt(db: &Db, config: &Config) -> crate::error::Result<String> {
    match (setting(db, "voter_salt").await?, &config.voter_salt) {
        (Some(stored), Some(configured)) if &stored != configured => Err(ApiError::Internal(
            "SECUREVOTE_VOTER_SALT differs from the salt this database was started with"
                .to_owned(),
        )),
        (Some(stored), _) => Ok(stored),
        (None, configured) => {
            let salt = configured.clone().unwrap_or_else(|| random_hex(32));
            save_setting(db, "voter_salt", &salt).await?;
            Ok(salt)
        }
    }
}

async fn setting(db: &Db, name: &str) -> crate::error::Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE name = ?")
        .bind(name)
        .fetch_optional(db)
        .await?;
    Ok(row.map(|(value,)| value))
}

async fn save_setting(db: &Db, name: &str, value: &str) -> crate::error::Result<()> {
    sqlx::query("INSERT INTO settings (name, value) VALUES (?, ?)")
        .bind(name)
        .bind(value)
        .execute(db)
        .await?;
    Ok(())
}

async fn fill_store(db: &Db) -> crate::error::Result<MemStore> {
    let mut store = MemStore::default();

    let elections: Vec<Election> = values(db, "SELECT value FROM elections").await?;
    for election in elections {
        store.set_election(election);
    }

    let candidates: Vec<Candidate> = values(db, "SELECT value FROM candidates").await?;
    for candidate in candidates {
        store.set_candidate(candidate);
    }

    let registrations: Vec<RegistrationRecord> =
        values(db, "SELECT value FROM registrations").await?;
    for record in registrations {
        store.set_registration(record);
    }

    let admins: Vec<AdminAccount> = values(db, "SELECT value FROM admins").await?;
    for admin in admins {
        store.set_admin(admin);
    }

    Ok(store)
}

async fn bootstrap_admin(db: &Db, node: &Node) -> crate::error::Result<()> {
    let bootstrap = match &node.config.bootstrap_admin {
        Some(bootstrap) => bootstrap,
        None => return Ok(()),
    };

    let mut store = node.store.lock().await;
    if store.admin_by_official_id(&bootstrap.official_id).is_some() {
        return Ok(());
    }

    let admin = AdminAccount::bootstrap(
        &bootstrap.official_id,
        &bootstrap.email,
        &bootstrap.password,
        now(),
    )?;
    save_admin(db, &admin).await?;
    log::info!("Created admin account {}", admin.official_id);
    store.set_admin(admin);
    Ok(())
}

async fn values<T: serde::de::DeserializeOwned>(
    db: &Db,
    query: &str,
) -> crate::error::Result<Vec<T>> {
    let rows: Vec<(String,)> = sqlx::query_as(query).fetch_all(db).await?;
    rows.iter()
        .map(|(value,)| serde_json::from_str(value).map_err(Into::into))
        .collect()
}

pub async fn save_election(db: &Db, election: &Election) -> crate::error::Result<()> {
    let value = serde_json::to_string(election)?;
    sqlx::query("INSERT OR REPLACE INTO elections (id, value) VALUES (?, ?)")
        .bind(election.id.to_string())
        .bind(value)
        .execute(db)
        .await?;
    Ok(())
}

/// Insert candidates in one transaction
pub async fn save_candidates(db: &Db, candidates: &[Candidate]) -> crate::error::Result<()> {
    let mut tx = db.begin().await?;
    for candidate in candidates {
        let value = serde_json::to_string(candidate)?;
        sqlx::query("INSERT OR REPLACE INTO candidates (id, election_id, value) VALUES (?, ?, ?)")
            .bind(candidate.id.to_string())
            .bind(candidate.election_id.to_string())
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn delete_candidate(db: &Db, id: Uuid) -> crate::error::Result<()> {
    sqlx::query("DELETE FROM candidates WHERE id = ?")
        .bind(id.to_string())
        .execute(db)
        .await?;
    Ok(())
}

pub async fn save_registration(db: &Db, record: &RegistrationRecord) -> crate::error::Result<()> {
    let value = serde_json::to_string(record)?;
    sqlx::query(
        "INSERT OR REPLACE INTO registrations (id, email, status, value) VALUES (?, ?, ?, ?)",
    )
    .bind(record.id.to_string())
    .bind(&record.email)
    .bind(record.status.to_string())
    .bind(value)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn save_admin(db: &Db, admin: &AdminAccount) -> crate::error::Result<()> {
    let value = serde_json::to_string(admin)?;
    sqlx::query("INSERT OR REPLACE INTO admins (id, official_id, value) VALUES (?, ?, ?)")
        .bind(admin.id.to_string())
        .bind(&admin.official_id)
        .bind(value)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn save_pending_vote(db: &Db, vote: &VoteRecord) -> crate::error::Result<()> {
    let value = serde_json::to_string(vote)?;
    sqlx::query("INSERT INTO pending_votes (receipt, value) VALUES (?, ?)")
        .bind(vote.receipt())
        .bind(value)
        .execute(db)
        .await?;
    Ok(())
}

/// Store a block and drop its votes from the pending table
pub async fn save_block(db: &Db, block: &Block) -> crate::error::Result<()> {
    let value = serde_json::to_string(block)?;
    let mut tx = db.begin().await?;
    sqlx::query("INSERT INTO blocks (idx, hash, value) VALUES (?, ?, ?)")
        .bind(block.index as i64)
        .bind(&block.hash)
        .bind(value)
        .execute(&mut *tx)
        .await?;
    for vote in &block.votes {
        sqlx::query("DELETE FROM pending_votes WHERE receipt = ?")
            .bind(vote.receipt())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Queue an email for the outbound relay
pub async fn queue_mail(db: &Db, mail: &OtpMail) -> crate::error::Result<()> {
    sqlx::query("INSERT INTO outbox (recipient, subject, body, created_at) VALUES (?, ?, ?, ?)")
        .bind(&mail.to)
        .bind(&mail.subject)
        .bind(&mail.body)
        .bind(now().to_rfc3339())
        .execute(db)
        .await?;
    Ok(())
}
