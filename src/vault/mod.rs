//! Credential vault subsystem.
//!
//! # Data Flow
//! ```text
//! Admin PUT /admin/credentials/{owner}/{provider}
//!     → cipher.rs (AES-256-GCM, fresh nonce, (owner, provider) bound as associated data)
//!     → store.rs (one EncryptedSecret per (owner, provider), overwrite on store)
//!
//! Gateway request:
//!     → store.rs (fetch EncryptedSecret)
//!     → cipher.rs (verify tag, fail closed)
//!     → ApiKey, dropped when the provider call returns
//! ```
//!
//! # Security
//! - The master key comes from the environment, never from the config file or the store
//! - `ApiKey` has no Display/Serialize and a redacted Debug
//! - Decryption never returns unverified plaintext

pub mod cipher;
pub mod store;

use std::sync::Arc;

use thiserror::Error;

use crate::providers::ProviderKind;

pub use cipher::{ApiKey, CredentialVault, EncryptedSecret, MasterKey, MASTER_KEY_ENV_VAR};
pub use store::{CredentialStore, MemoryCredentialStore, StoreError};

/// Errors raised by the vault.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The master key is missing or malformed.
    #[error("master key error: {0}")]
    MasterKey(String),

    /// Encryption failed.
    #[error("encryption failed")]
    Encrypt,

    /// Authentication tag did not verify: tampered data or wrong key.
    #[error("credential failed authentication")]
    Tampered,

    /// Ciphertext or nonce has an impossible shape.
    #[error("malformed secret: {0}")]
    Malformed(String),

    /// Decrypted bytes are not a valid credential string.
    #[error("credential is not valid UTF-8")]
    Encoding,

    /// No credential stored for this owner and provider.
    #[error("no credential stored for owner '{owner}' and provider '{provider}'")]
    NotFound { owner: String, provider: ProviderKind },

    #[error("credential store error: {0}")]
    Store(#[from] StoreError),
}

/// Vault + store: what the gateway and the admin API use.
#[derive(Clone)]
pub struct Credentials {
    vault: Arc<CredentialVault>,
    store: Arc<dyn CredentialStore>,
}

impl Credentials {
    pub fn new(vault: Arc<CredentialVault>, store: Arc<dyn CredentialStore>) -> Self {
        Self { vault, store }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Encrypt and store `api_key`, replacing any previous credential.
    pub async fn put(
        &self,
        owner: &str,
        provider: ProviderKind,
        api_key: &str,
    ) -> Result<(), VaultError> {
        let aad = binding(owner, provider);
        let secret = self.vault.encrypt_with_aad(api_key.as_bytes(), &aad)?;
        self.store.put(owner, provider, secret).await?;
        tracing::info!(owner = %owner, provider = %provider, "Credential stored");
        Ok(())
    }

    /// Remove a stored credential. Returns whether one existed.
    pub async fn remove(&self, owner: &str, provider: ProviderKind) -> Result<bool, VaultError> {
        let removed = self.store.remove(owner, provider).await?;
        if removed {
            tracing::info!(owner = %owner, provider = %provider, "Credential removed");
        }
        Ok(removed)
    }

    /// Decrypt the credential for one provider call.
    pub async fn load(&self, owner: &str, provider: ProviderKind) -> Result<ApiKey, VaultError> {
        let secret = self
            .store
            .get(owner, provider)
            .await?
            .ok_or_else(|| VaultError::NotFound {
                owner: owner.to_string(),
                provider,
            })?;

        let aad = binding(owner, provider);
        let plaintext = self.vault.decrypt_with_aad(&secret, &aad).inspect_err(|e| {
            tracing::error!(
                owner = %owner,
                provider = %provider,
                error = %e,
                "Credential decryption failed"
            );
        })?;
        ApiKey::from_bytes(plaintext)
    }
}

/// Associated data tying a ciphertext to its owner and provider.
fn binding(owner: &str, provider: ProviderKind) -> Vec<u8> {
    format!("llm-gateway/credential/v1\0{}\0{}", owner, provider.as_str()).into_bytes()
}
