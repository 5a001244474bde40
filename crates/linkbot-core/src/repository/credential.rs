//! Credential store trait definition.

use linkbot_types::error::RepositoryError;
use linkbot_types::session::SessionId;
use linkbot_types::socket::Credentials;

/// Durable per-session persistence of pairing credentials.
///
/// `save` is called on every key-material rotation, so implementations must
/// perform an atomic upsert: a concurrent `load` sees either the previous
/// blob or the new one, never a partial write. Last writer wins per id; no
/// cross-id transactionality is required.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in linkbot-infra.
pub trait CredentialStore: Send + Sync + 'static {
    /// Load the stored blob. Returns None if the session never paired.
    fn load(
        &self,
        id: &SessionId,
    ) -> impl std::future::Future<Output = Result<Option<Credentials>, RepositoryError>> + Send;

    /// Insert or replace the blob for a session.
    fn save(
        &self,
        id: &SessionId,
        credentials: &Credentials,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete the blob. No-op if nothing is stored.
    fn delete(
        &self,
        id: &SessionId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List every session id with stored credentials.
    fn list_ids(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<SessionId>, RepositoryError>> + Send;
}
