//! SQLite credential store implementation.
//!
//! Implements `CredentialStore` from `linkbot-core` using sqlx with split
//! read/write pools. Blobs are encrypted with [`CredentialCipher`] before they
//! touch the database when a cipher is configured; the `encrypted` column
//! records which rows need decrypting. Never logs credential bytes.

use std::sync::Arc;

use chrono::Utc;
use linkbot_core::repository::CredentialStore;
use linkbot_types::error::RepositoryError;
use linkbot_types::session::SessionId;
use linkbot_types::socket::Credentials;
use sqlx::Row;

use super::pool::DatabasePool;
use crate::crypto::cipher::CredentialCipher;

/// SQLite-backed implementation of `CredentialStore`.
pub struct SqliteCredentialStore {
    pool: DatabasePool,
    cipher: Option<Arc<CredentialCipher>>,
}

impl SqliteCredentialStore {
    /// Store blobs as-is.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool, cipher: None }
    }

    /// Encrypt blobs at rest with `cipher`.
    pub fn encrypted(pool: DatabasePool, cipher: Arc<CredentialCipher>) -> Self {
        Self {
            pool,
            cipher: Some(cipher),
        }
    }
}

impl CredentialStore for SqliteCredentialStore {
    async fn load(&self, id: &SessionId) -> Result<Option<Credentials>, RepositoryError> {
        let row = sqlx::query(
            "SELECT credentials, encrypted FROM session_credentials WHERE session_id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let blob: Vec<u8> = row
            .try_get("credentials")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let encrypted: bool = row
            .try_get("encrypted")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let bytes = match (encrypted, &self.cipher) {
            (false, _) => blob,
            (true, Some(cipher)) => cipher
                .decrypt(&blob)
                .map_err(|e| RepositoryError::Crypto(e.to_string()))?,
            (true, None) => {
                return Err(RepositoryError::Crypto(
                    "stored credentials are encrypted but no key is configured".to_string(),
                ));
            }
        };
        Ok(Some(Credentials::new(bytes)))
    }

    async fn save(&self, id: &SessionId, credentials: &Credentials) -> Result<(), RepositoryError> {
        let (blob, encrypted) = match &self.cipher {
            Some(cipher) => (
                cipher
                    .encrypt(credentials.as_bytes())
                    .map_err(|e| RepositoryError::Crypto(e.to_string()))?,
                true,
            ),
            None => (credentials.as_bytes().to_vec(), false),
        };
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO session_credentials (session_id, credentials, encrypted, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                 credentials = excluded.credentials,
                 encrypted = excluded.encrypted,
                 updated_at = excluded.updated_at",
        )
        .bind(id.as_str())
        .bind(&blob)
        .bind(encrypted)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM session_credentials WHERE session_id = ?")
            .bind(id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>, RepositoryError> {
        let rows = sqlx::query("SELECT session_id FROM session_credentials ORDER BY session_id")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row
                .try_get("session_id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            match SessionId::parse(raw) {
                Ok(id) => ids.push(id),
                Err(e) => tracing::warn!(error = %e, "skipping stored credentials with invalid id"),
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> (DatabasePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (pool, dir)
    }

    fn cipher() -> Arc<CredentialCipher> {
        Arc::new(CredentialCipher::new(&[7u8; 32]))
    }

    fn sid(raw: &str) -> SessionId {
        SessionId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::new(pool);
        assert!(store.load(&sid("nobody")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_is_an_upsert() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::new(pool);
        let id = sid("bot-1");

        store.save(&id, &Credentials::new(b"v1".to_vec())).await.unwrap();
        store.save(&id, &Credentials::new(b"v2".to_vec())).await.unwrap();

        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded.as_bytes(), b"v2");
        assert_eq!(store.list_ids().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_encrypted_at_rest() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::encrypted(pool.clone(), cipher());
        let id = sid("bot-1");
        let creds = Credentials::new(b"plain-noise-key".to_vec());

        store.save(&id, &creds).await.unwrap();

        let (raw, encrypted): (Vec<u8>, bool) = sqlx::query_as(
            "SELECT credentials, encrypted FROM session_credentials WHERE session_id = ?",
        )
        .bind(id.as_str())
        .fetch_one(&pool.reader)
        .await
        .unwrap();
        assert!(encrypted);
        assert_ne!(raw, creds.as_bytes());

        assert_eq!(store.load(&id).await.unwrap(), Some(creds));
    }

    #[tokio::test]
    async fn test_encrypted_row_without_key_is_an_error() {
        let (pool, _dir) = test_pool().await;
        let id = sid("bot-1");
        SqliteCredentialStore::encrypted(pool.clone(), cipher())
            .save(&id, &Credentials::new(b"x".to_vec()))
            .await
            .unwrap();

        let plain = SqliteCredentialStore::new(pool);
        assert!(matches!(
            plain.load(&id).await,
            Err(RepositoryError::Crypto(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::new(pool);
        let id = sid("bot-1");
        store.save(&id, &Credentials::new(b"x".to_vec())).await.unwrap();

        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(store.load(&id).await.unwrap().is_none());
        assert!(store.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_ids_sorted() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::new(pool);
        for raw in ["zeta", "alpha", "mid"] {
            store.save(&sid(raw), &Credentials::new(vec![1])).await.unwrap();
        }
        let ids: Vec<String> = store
            .list_ids()
            .await
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
    }
}
