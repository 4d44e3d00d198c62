//! Status command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use stratus::lock::lease::format_duration;
use stratus::Session;

use crate::OutputFormat;

#[derive(Serialize)]
struct LockStatus {
    holder: String,
    acquired_at: i64,
    age_secs: u64,
    remaining_secs: u64,
    expired: bool,
}

#[derive(Serialize)]
struct StatusOutput {
    key: String,
    local_path: String,
    coordinated: bool,
    remote_exists: bool,
    lock: Option<LockStatus>,
}

pub async fn run(session: &Session, format: OutputFormat) -> Result<()> {
    let marker = session
        .inspect()
        .await
        .context("failed to read lock marker")?;
    let remote_exists = session
        .remote_exists()
        .await
        .context("failed to reach storage")?;

    let output = StatusOutput {
        key: session.file().key().to_string(),
        local_path: session.local_path().display().to_string(),
        coordinated: session.file().is_coordinated(),
        remote_exists,
        lock: marker.map(|info| LockStatus {
            holder: info.holder,
            acquired_at: info.acquired_at,
            age_secs: info.age.as_secs(),
            remaining_secs: info.remaining.as_secs(),
            expired: info.expired,
        }),
    };

    match format {
        OutputFormat::Text => {
            println!("Database: {}", output.key);
            println!("Cache:    {}", output.local_path);
            if !output.coordinated {
                println!("Lock:     not required (local storage)");
            } else if !output.remote_exists {
                println!("Lock:     - (database not created yet)");
            }
            match &output.lock {
                None if output.coordinated && output.remote_exists => {
                    println!("Lock:     free");
                }
                None => {}
                Some(lock) if lock.expired => {
                    println!(
                        "Lock:     expired, last held by '{}' ({} ago)",
                        lock.holder,
                        format_duration(std::time::Duration::from_secs(lock.age_secs))
                    );
                }
                Some(lock) => {
                    println!(
                        "Lock:     held by '{}' for {}, released automatically in {}",
                        lock.holder,
                        format_duration(std::time::Duration::from_secs(lock.age_secs)),
                        format_duration(std::time::Duration::from_secs(lock.remaining_secs))
                    );
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
