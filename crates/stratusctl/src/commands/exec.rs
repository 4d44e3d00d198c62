//! Exec command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use stratus::{instance, Session};

use crate::OutputFormat;

#[derive(Serialize)]
struct ExecOutput {
    key: String,
    statements: usize,
}

pub async fn run(session: &mut Session, sql: &str, format: OutputFormat) -> Result<()> {
    instance::execute_batch(session, sql)
        .await
        .with_context(|| format!("failed to execute SQL on {}", session.file().key()))?;

    let output = ExecOutput {
        key: session.file().key().to_string(),
        statements: sql.split(';').filter(|s| !s.trim().is_empty()).count(),
    };

    match format {
        OutputFormat::Text => {
            println!(
                "Executed {} statement(s) and published {}",
                output.statements, output.key
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
