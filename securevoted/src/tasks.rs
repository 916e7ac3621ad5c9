use crate::db::{self, Db};
use crate::node::Node;
use rocket::fairing::AdHoc;
use rocket::tokio;
use securevote::*;
use std::time::Duration;

/// Seal the pending pool into a block, storing it before it is appended
pub async fn seal_pending(node: &Node, db: &Db) -> crate::error::Result<Option<Block>> {
    let mut ledger = node.ledger.lock().await;
    let block = match ledger.next_block(&node.sealing_key, now())? {
        Some(block) => block,
        None => return Ok(None),
    };

    db::save_block(db, &block).await?;
    ledger.append_block(block.clone())?;

    log::info!(
        "Sealed block {} with {} vote(s)",
        block.index,
        block.votes.len()
    );
    Ok(Some(block))
}

async fn sealer(node: Node, db: Db) {
    let period = node
        .config
        .block_interval
        .to_std()
        .unwrap_or(Duration::from_secs(15));
    loop {
        tokio::time::sleep(period).await;
        if let Err(e) = seal_pending(&node, &db).await {
            log::error!("Failed to seal pending votes: {}", e);
        }
    }
}

async fn janitor(node: Node) {
    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
        let t = now();
        let otps = node.otps.lock().await.purge_expired(t);
        let sessions = node.sessions.lock().await.purge_expired(t);
        if otps + sessions > 0 {
            log::debug!("Purged {} expired OTP(s) and {} session(s)", otps, sessions);
        }
    }
}

pub fn stage() -> AdHoc {
    AdHoc::on_liftoff("Background tasks", |rocket| {
        Box::pin(async move {
            let node = rocket.state::<Node>().cloned();
            let db = rocket.state::<Db>().cloned();
            if let (Some(node), Some(db)) = (node, db) {
                tokio::spawn(sealer(node.clone(), db));
                tokio::spawn(janitor(node));
            }
        })
    })
}
