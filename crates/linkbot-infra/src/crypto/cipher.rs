//! AES-256-GCM encryption for credential blobs at rest.
//!
//! The 32-byte key lives hex-encoded in `{data_dir}/credentials.key`, created
//! with owner-only permissions on first use.
//!
//! Encrypted format: `nonce (12 bytes) || ciphertext`
//!
//! SECURITY: Error types never contain plaintext or key material.

use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use thiserror::Error;

/// Nonce size for AES-256-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Key size for AES-256 (32 bytes).
const KEY_SIZE: usize = 32;

/// Errors from credential encryption operations.
///
/// Never includes plaintext, key material, or ciphertext in Display/Debug.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid ciphertext: too short")]
    CiphertextTooShort,

    #[error("invalid key file: {0}")]
    InvalidKeyFile(String),

    #[error("key file i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// AES-256-GCM cipher for stored credentials.
///
/// Each encryption call generates a random 12-byte nonce, prepended to the
/// ciphertext, so encrypting the same blob twice produces different output.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Create a cipher from a raw 32-byte key.
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Load the key from `path`, generating and writing a fresh random key
    /// when the file does not exist yet.
    pub async fn from_key_file(path: &Path) -> Result<Self, CipherError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let bytes = hex_decode(contents.trim()).map_err(CipherError::InvalidKeyFile)?;
                let key: [u8; KEY_SIZE] = bytes
                    .try_into()
                    .map_err(|_| CipherError::InvalidKeyFile("expected 64 hex characters".to_string()))?;
                Ok(Self::new(&key))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let key = rand_bytes();
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                write_key_file(path, &hex_encode(&key)).await?;
                tracing::info!("generated credential encryption key at {}", path.display());
                Ok(Self::new(&key))
            }
            Err(e) => Err(CipherError::Io(e)),
        }
    }

    /// Encrypt with a random nonce. Returns `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CipherError::EncryptionFailed)?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt data produced by `encrypt()`.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        if data.len() < NONCE_SIZE {
            return Err(CipherError::CiphertextTooShort);
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CipherError::DecryptionFailed)
    }
}

#[cfg(unix)]
async fn write_key_file(path: &Path, contents: &str) -> Result<(), std::io::Error> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await
}

#[cfg(not(unix))]
async fn write_key_file(path: &Path, contents: &str) -> Result<(), std::io::Error> {
    tokio::fs::write(path, contents).await
}

/// Generate 32 random bytes using the OS CSPRNG.
fn rand_bytes() -> [u8; KEY_SIZE] {
    use aes_gcm::aead::rand_core::RngCore;
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

/// Hex-encode bytes to a lowercase string.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Hex-decode a string to bytes.
pub(crate) fn hex_decode(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("odd length hex string".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .ok_or_else(|| format!("invalid hex at position {i}"))
                .and_then(|pair| {
                    u8::from_str_radix(pair, 16).map_err(|e| format!("invalid hex at position {i}: {e}"))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        key
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = CredentialCipher::new(&test_key());
        let blob = br#"{"noiseKey":"abc","signedIdentityKey":"def"}"#;

        let encrypted = cipher.encrypt(blob).unwrap();
        assert_ne!(&encrypted[NONCE_SIZE..], blob.as_slice());
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), blob);
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let cipher1 = CredentialCipher::new(&test_key());
        let mut wrong_key = test_key();
        wrong_key[0] = 0xFF;
        let cipher2 = CredentialCipher::new(&wrong_key);

        let encrypted = cipher1.encrypt(b"creds").unwrap();
        assert!(matches!(
            cipher2.decrypt(&encrypted).unwrap_err(),
            CipherError::DecryptionFailed
        ));
    }

    #[test]
    fn test_random_nonce_produces_different_ciphertexts() {
        let cipher = CredentialCipher::new(&test_key());
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_ciphertext_too_short() {
        let cipher = CredentialCipher::new(&test_key());
        assert!(matches!(
            cipher.decrypt(&[0u8; 5]).unwrap_err(),
            CipherError::CiphertextTooShort
        ));
    }

    #[tokio::test]
    async fn test_key_file_created_then_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.key");

        let first = CredentialCipher::from_key_file(&path).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.trim().len(), 64);

        let second = CredentialCipher::from_key_file(&path).await.unwrap();
        let encrypted = first.encrypt(b"persisted").unwrap();
        assert_eq!(second.decrypt(&encrypted).unwrap(), b"persisted");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.key");
        CredentialCipher::from_key_file(&path).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_corrupted_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.key");
        tokio::fs::write(&path, "not-hex").await.unwrap();

        assert!(matches!(
            CredentialCipher::from_key_file(&path).await,
            Err(CipherError::InvalidKeyFile(_))
        ));
    }

    #[test]
    fn test_hex_roundtrip() {
        let bytes = [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0xFF];
        let encoded = hex_encode(&bytes);
        assert_eq!(encoded, "deadbeef00ff");
        assert_eq!(hex_decode(&encoded).unwrap(), bytes);
        assert!(hex_decode("abc").is_err());
    }

    #[test]
    fn test_cipher_error_never_contains_secrets() {
        let secret = "noise-private-key";
        let errors = [
            CipherError::EncryptionFailed,
            CipherError::DecryptionFailed,
            CipherError::CiphertextTooShort,
            CipherError::InvalidKeyFile("expected 64 hex characters".to_string()),
        ];
        for err in &errors {
            assert!(!err.to_string().contains(secret));
        }
    }
}
