use anyhow::Context;
use tracing::error;

/// bcrypt cost factor for new hashes.
pub const HASH_COST: u32 = 10;

/// Hashes on the blocking pool; bcrypt at this cost is too slow for a runtime worker.
pub async fn hash_password(plain: &str) -> anyhow::Result<String> {
    let plain = plain.to_owned();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(plain, HASH_COST))
        .await
        .context("bcrypt hash task")?
        .map_err(|e| {
            error!(error = %e, "bcrypt hash error");
            anyhow::anyhow!(e.to_string())
        })?;
    Ok(hash)
}

pub async fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let (plain, hash) = (plain.to_owned(), hash.to_owned());
    tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hash))
        .await
        .context("bcrypt verify task")?
        .map_err(|e| anyhow::anyhow!("bcrypt verify: {e}"))
}
