//! Record retrieval by ID.
//!
//! Fetches a stored report or audio record from the database. Used by the
//! `clearview get` CLI command; the HTTP server goes through
//! [`Pipeline::fetch`](crate::pipeline::Pipeline::fetch), which applies the
//! same kind check.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::models::{suggested_filename, ArtifactKind, Record};
use crate::store::{RecordStore, SqliteRecordStore, StoreError};

/// Look up `id` and require it to be of `kind`.
pub async fn get_record(config: &Config, kind: ArtifactKind, id: &str) -> Result<Record> {
    let store = SqliteRecordStore::open(&config.db.path).await?;
    let result = store.get(id).await;
    store.close().await;

    match result {
        Ok(record) if record.kind == kind => Ok(record),
        Ok(_) | Err(StoreError::NotFound(_)) => bail!("{} not found: {}", kind.as_str(), id),
        Err(e) => Err(e.into()),
    }
}

/// CLI entry point: write the record to `out` (or a name derived from its
/// title) and print its metadata.
pub async fn run_get(config: &Config, kind: ArtifactKind, id: &str, out: Option<PathBuf>) -> Result<()> {
    let record = match get_record(config, kind, id).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let path = out.unwrap_or_else(|| PathBuf::from(suggested_filename(&record.title, kind)));
    write_output(&path, &record.bytes)?;

    println!("--- Record ---");
    println!("id:           {}", record.id);
    println!("kind:         {}", record.kind.as_str());
    println!("title:        {}", record.title);
    println!("content_type: {}", record.content_type);
    println!("bytes:        {}", record.bytes.len());
    println!("sha256:       {}", record.digest);
    println!("created_at:   {}", format_ts_iso(record.created_at));
    println!("written to:   {}", path.display());

    Ok(())
}

pub(crate) fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
