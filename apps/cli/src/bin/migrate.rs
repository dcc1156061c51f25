#![deny(warnings)]

//! Create or upgrade the schema, reading the same configuration as `realm`.
//!
//! usage: realm-migrate [config.yaml]

use persistence::{ensure_admin, ensure_parent_dir, init_db};
use realm_runtime::AppConfig;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(path.as_deref())?;
    let url = &config.database_url;
    ensure_parent_dir(url)?;
    let pool = init_db(url).await?;
    // Optional bootstrap account so a fresh install has someone to manage roles.
    match &config.admin_email {
        Some(email) => {
            let admin = ensure_admin(&pool, email).await?;
            println!("DB migrated at {} | admin: {}", url, admin.email);
        }
        None => println!("DB migrated at {}", url),
    }
    Ok(())
}
