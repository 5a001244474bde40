//! In-memory credential store.
//!
//! Credentials live only as long as the process. Useful for ephemeral runs
//! (`linkbot serve --ephemeral`) where every session pairs from scratch.

use dashmap::DashMap;
use linkbot_core::repository::CredentialStore;
use linkbot_types::error::RepositoryError;
use linkbot_types::session::SessionId;
use linkbot_types::socket::Credentials;

/// DashMap-backed implementation of `CredentialStore`.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: DashMap<SessionId, Credentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, id: &SessionId) -> Result<Option<Credentials>, RepositoryError> {
        Ok(self.entries.get(id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, id: &SessionId, credentials: &Credentials) -> Result<(), RepositoryError> {
        self.entries.insert(id.clone(), credentials.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), RepositoryError> {
        self.entries.remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>, RepositoryError> {
        let mut ids: Vec<SessionId> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_delete() {
        let store = MemoryCredentialStore::new();
        let id = SessionId::parse("bot-1").unwrap();
        assert!(store.load(&id).await.unwrap().is_none());

        store.save(&id, &Credentials::new(vec![1, 2])).await.unwrap();
        store.save(&id, &Credentials::new(vec![3])).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(&id).await.unwrap().unwrap().as_bytes(), &[3]);

        store.delete(&id).await.unwrap();
        assert!(store.is_empty());
        assert!(store.list_ids().await.unwrap().is_empty());
    }
}
