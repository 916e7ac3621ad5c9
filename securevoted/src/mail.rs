use crate::db::{self, Db};
use crate::node::Node;
use securevote::*;

/// Compose an OTP email and queue it in the outbox table
pub async fn send_otp(
    node: &Node,
    db: &Db,
    email: &str,
    code: &str,
    purpose: OtpPurpose,
) -> crate::error::Result<()> {
    let mail = OtpMail::compose(email, code, purpose, node.config.otp_policy.ttl);
    db::queue_mail(db, &mail).await?;

    if node.config.log_otp {
        log::info!("Queued {} OTP for {}: {}", purpose, mask_email(email), code);
    } else {
        log::info!("Queued {} OTP for {}", purpose, mask_email(email));
    }
    Ok(())
}
