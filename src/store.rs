//! Record persistence.
//!
//! The [`RecordStore`] trait keeps produced artifacts under generated ids.
//! Ids are UUID v4, minted inside [`RecordStore::put`] once the payload is
//! in hand, so a record is only ever written once and never overwritten.
//!
//! Two backends:
//! - [`SqliteRecordStore`]: the `records` table created by [`crate::migrate`].
//! - [`InMemoryRecordStore`]: `HashMap` behind `std::sync::RwLock`, for tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::models::{ArtifactKind, Record};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new record and return its id.
    async fn put(&self, kind: ArtifactKind, title: &str, bytes: &[u8]) -> Result<String, StoreError>;

    async fn get(&self, id: &str) -> Result<Record, StoreError>;
}

fn new_record(kind: ArtifactKind, title: &str, bytes: &[u8]) -> Record {
    Record {
        id: uuid::Uuid::new_v4().to_string(),
        kind,
        title: title.to_string(),
        content_type: kind.content_type().to_string(),
        bytes: bytes.to_vec(),
        digest: hex::encode(Sha256::digest(bytes)),
        created_at: chrono::Utc::now().timestamp(),
    }
}

// ============ SQLite ============

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Wrap a pool whose schema is already migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `path` and make sure the schema exists.
    pub async fn open(path: &std::path::Path) -> anyhow::Result<Self> {
        let pool = crate::db::connect_path(path).await?;
        crate::migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn put(&self, kind: ArtifactKind, title: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let record = new_record(kind, title, bytes);

        sqlx::query(
            r#"
            INSERT INTO records (id, kind, title, content_type, bytes, digest, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.kind.as_str())
        .bind(&record.title)
        .bind(&record.content_type)
        .bind(&record.bytes)
        .bind(&record.digest)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(id = %record.id, kind = %record.kind.as_str(), bytes = bytes.len(), "record stored");
        Ok(record.id)
    }

    async fn get(&self, id: &str) -> Result<Record, StoreError> {
        let row = sqlx::query(
            "SELECT id, kind, title, content_type, bytes, digest, created_at FROM records WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let kind: String = row.get("kind");
        let kind = kind
            .parse::<ArtifactKind>()
            .map_err(StoreError::Backend)?;

        Ok(Record {
            id: row.get("id"),
            kind,
            title: row.get("title"),
            content_type: row.get("content_type"),
            bytes: row.get("bytes"),
            digest: row.get("digest"),
            created_at: row.get("created_at"),
        })
    }
}

// ============ In-memory ============

#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, Record>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put(&self, kind: ArtifactKind, title: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let record = new_record(kind, title, bytes);
        let id = record.id.clone();
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Backend("record map poisoned".to_string()))?;
        records.insert(id.clone(), record);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Record, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Backend("record map poisoned".to_string()))?;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn round_trip(store: &dyn RecordStore) {
        let large: Vec<u8> = (0..3_000_000u32).map(|i| (i % 251) as u8).collect();
        for (kind, title, bytes) in [
            (ArtifactKind::Report, "Empty", Vec::new()),
            (ArtifactKind::Audio, "Big", large),
            (ArtifactKind::Report, "Ünïcode title", b"%PDF-1.5".to_vec()),
        ] {
            let id = store.put(kind, title, &bytes).await.unwrap();
            let record = store.get(&id).await.unwrap();
            assert_eq!(record.id, id);
            assert_eq!(record.kind, kind);
            assert_eq!(record.title, title);
            assert_eq!(record.bytes, bytes);
            assert_eq!(record.content_type, kind.content_type());
            assert_eq!(record.digest, hex::encode(Sha256::digest(&bytes)));
        }
    }

    #[tokio::test]
    async fn memory_round_trip() {
        round_trip(&InMemoryRecordStore::new()).await;
    }

    #[tokio::test]
    async fn sqlite_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = SqliteRecordStore::open(&tmp.path().join("records.sqlite"))
            .await
            .unwrap();
        round_trip(&store).await;
        store.close().await;
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = InMemoryRecordStore::new();
        assert_eq!(
            store.get("missing").await.unwrap_err(),
            StoreError::NotFound("missing".to_string())
        );
    }

    #[tokio::test]
    async fn ids_are_unique_per_put() {
        let store = InMemoryRecordStore::new();
        let a = store.put(ArtifactKind::Audio, "same", b"x").await.unwrap();
        let b = store.put(ArtifactKind::Audio, "same", b"x").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }
}
