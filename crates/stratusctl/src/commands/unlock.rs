//! Unlock command implementation.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use stratus::Session;

use crate::OutputFormat;

#[derive(Serialize)]
struct UnlockOutput {
    key: String,
    previous_holder: Option<String>,
}

pub async fn run(session: &mut Session, force: bool, format: OutputFormat) -> Result<()> {
    let previous = session
        .inspect()
        .await
        .context("failed to read lock marker")?;

    if let Some(info) = &previous {
        let own = info.holder == session.identity();
        if !own && !force && !info.expired {
            bail!(
                "lock is held by '{}'; pass --force to break it anyway",
                info.holder
            );
        }
    }

    session.break_lock().await.context("failed to remove lock marker")?;

    let output = UnlockOutput {
        key: session.file().key().to_string(),
        previous_holder: previous.map(|info| info.holder),
    };

    match format {
        OutputFormat::Text => match &output.previous_holder {
            Some(holder) => println!("Removed lock held by '{}' on {}", holder, output.key),
            None => println!("No lock on {}", output.key),
        },
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
