//! AES-256-GCM encryption of provider credentials.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::VaultError;

/// Environment variable holding the base64-encoded master key.
pub const MASTER_KEY_ENV_VAR: &str = "GATEWAY_MASTER_KEY";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// 256-bit master key.
#[derive(Clone)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode a base64 key; anything other than 32 bytes is rejected.
    pub fn from_base64(encoded: &str) -> Result<Self, VaultError> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| VaultError::MasterKey(format!("invalid base64: {}", e)))?;
        let bytes: [u8; KEY_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            VaultError::MasterKey(format!("expected {} bytes, got {}", KEY_LEN, v.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Read from the environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self, VaultError> {
        let encoded = std::env::var(var)
            .map_err(|_| VaultError::MasterKey(format!("{} is not set", var)))?;
        Self::from_base64(&encoded)
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Ciphertext (with appended tag) and the nonce it was sealed under.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedSecret")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("nonce_len", &self.nonce.len())
            .finish()
    }
}

/// A decrypted provider key. Lives for one provider call.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Result<Self, VaultError> {
        String::from_utf8(bytes).map(Self).map_err(|_| VaultError::Encoding)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Authenticated encryption under a single master key.
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    pub fn new(key: &MasterKey) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key.0);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedSecret, VaultError> {
        self.encrypt_with_aad(plaintext, &[])
    }

    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<Vec<u8>, VaultError> {
        self.decrypt_with_aad(secret, &[])
    }

    /// Seal under a fresh random nonce. `aad` must be presented again to decrypt.
    pub fn encrypt_with_aad(
        &self,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<EncryptedSecret, VaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, Payload { msg: plaintext, aad })
            .map_err(|_| VaultError::Encrypt)?;

        Ok(EncryptedSecret {
            ciphertext,
            nonce: nonce.to_vec(),
        })
    }

    /// Verify and open. Any modification, wrong key or wrong `aad` is an error.
    pub fn decrypt_with_aad(
        &self,
        secret: &EncryptedSecret,
        aad: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        if secret.nonce.len() != NONCE_LEN {
            return Err(VaultError::Malformed(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LEN,
                secret.nonce.len()
            )));
        }
        if secret.ciphertext.len() < TAG_LEN {
            return Err(VaultError::Malformed(format!(
                "ciphertext shorter than the {}-byte tag",
                TAG_LEN
            )));
        }

        let nonce = Nonce::from_slice(&secret.nonce);
        self.cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &secret.ciphertext,
                    aad,
                },
            )
            .map_err(|_| VaultError::Tampered)
    }
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
