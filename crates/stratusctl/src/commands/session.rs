//! Checkout/checkin command implementations.

use anyhow::{Context, Result};
use serde::Serialize;
use stratus::{instance, Session};

use crate::OutputFormat;

#[derive(Serialize)]
struct SessionOutput {
    action: &'static str,
    key: String,
    local_path: String,
    locked: bool,
}

impl SessionOutput {
    fn new(action: &'static str, session: &Session) -> Self {
        Self {
            action,
            key: session.file().key().to_string(),
            local_path: session.local_path().display().to_string(),
            locked: session.is_held() && session.is_coordinated(),
        }
    }
}

fn print(output: &SessionOutput, message: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{message}");
            println!("  Database: {}", output.key);
            println!("  Cache:    {}", output.local_path);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(output)?);
        }
    }
    Ok(())
}

pub async fn init(session: &mut Session, format: OutputFormat) -> Result<()> {
    instance::init(session)
        .await
        .context("failed to initialize instance")?;
    let output = SessionOutput::new("init", session);
    print(&output, "Instance database published.", format)
}

pub async fn load(session: &mut Session, no_lock: bool, format: OutputFormat) -> Result<()> {
    if no_lock {
        instance::load_unlocked(session)
            .await
            .context("failed to fetch instance snapshot")?;
        let output = SessionOutput::new("snapshot", session);
        return print(&output, "Fetched read-only snapshot (not locked).", format);
    }

    instance::load(session)
        .await
        .context("failed to load instance")?;
    let output = SessionOutput::new("load", session);
    let message = if output.locked {
        "Checked out. Run `stratusctl close` to publish changes and unlock."
    } else {
        "Checked out without a lock (read-only access to the lock marker)."
    };
    print(&output, message, format)
}

pub async fn close(session: &mut Session, format: OutputFormat) -> Result<()> {
    instance::close(session)
        .await
        .context("failed to check in instance")?;
    let output = SessionOutput::new("close", session);
    print(&output, "Published local changes and released the lock.", format)
}

pub async fn push(session: &mut Session, format: OutputFormat) -> Result<()> {
    session.checkout().await.context("failed to lock instance")?;
    instance::push(session)
        .await
        .context("failed to publish local changes")?;
    let output = SessionOutput::new("push", session);
    print(&output, "Published local changes; the lock is still held.", format)
}
