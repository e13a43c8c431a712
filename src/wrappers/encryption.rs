//! Encryption Wrapper
//!
//! Encrypts the JSON encoding of every payload with AES-256-GCM before it
//! reaches the inner store:
//!
//! - each write uses a fresh random 96-bit nonce
//! - the stored document is `{ __encrypted_data__, __encryption_version__, __nonce__ }`
//!   with base64 ciphertext and nonce
//! - reads of untagged documents return them unchanged

use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde_json::{json, Value};
use tracing::warn;

use crate::contract::{KeyValue, StoreId, TtlInfo};
use crate::entry::{BatchTtl, Document};
use crate::error::{KvError, Result};

/// Key size in bytes (256 bits for AES-256)
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Nonce size in bytes (96 bits for AES-GCM)
const NONCE_SIZE: usize = 12;

const ENCRYPTED_DATA_KEY: &str = "__encrypted_data__";
const ENCRYPTION_VERSION_KEY: &str = "__encryption_version__";
const NONCE_KEY: &str = "__nonce__";
const ENCRYPTION_VERSION: u64 = 1;

pub struct EncryptionWrapper {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    cipher: Aes256Gcm,
    raise_on_decryption_error: bool,
}

impl EncryptionWrapper {
    // == Constructor ==
    /// Wraps `inner`, encrypting with a 32-byte key.
    pub fn new(inner: Arc<dyn KeyValue>, key: &[u8]) -> Result<Self> {
        if key.len() != ENCRYPTION_KEY_SIZE {
            return Err(KvError::InvalidArgument(format!(
                "encryption key must be {ENCRYPTION_KEY_SIZE} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| KvError::InvalidArgument("failed to create cipher".to_string()))?;

        Ok(Self {
            id: StoreId::next(),
            inner,
            cipher,
            raise_on_decryption_error: true,
        })
    }

    /// Generates a random key suitable for [`EncryptionWrapper::new`].
    pub fn generate_key() -> [u8; ENCRYPTION_KEY_SIZE] {
        let mut key = [0u8; ENCRYPTION_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// When false, payloads that fail to decrypt read as missing.
    pub fn raise_on_decryption_error(mut self, raise: bool) -> Self {
        self.raise_on_decryption_error = raise;
        self
    }

    fn encrypt(&self, value: &Document) -> Result<Document> {
        let json_bytes =
            serde_json::to_vec(value).map_err(|e| KvError::Serialization(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let encrypted = self
            .cipher
            .encrypt(nonce, json_bytes.as_ref())
            .map_err(|e| KvError::Serialization(format!("encryption failed: {e}")))?;

        let mut tagged = Document::new();
        tagged.insert(ENCRYPTED_DATA_KEY.into(), json!(BASE64.encode(&encrypted)));
        tagged.insert(ENCRYPTION_VERSION_KEY.into(), json!(ENCRYPTION_VERSION));
        tagged.insert(NONCE_KEY.into(), json!(BASE64.encode(nonce_bytes)));
        Ok(tagged)
    }

    fn decrypt(&self, value: Option<Document>) -> Result<Option<Document>> {
        let Some(value) = value else {
            return Ok(None);
        };
        if !value.contains_key(ENCRYPTED_DATA_KEY) {
            return Ok(Some(value));
        }

        match self.open(&value) {
            Ok(original) => Ok(Some(original)),
            Err(e) if self.raise_on_decryption_error => Err(e),
            Err(e) => {
                warn!(error = %e, "Treating undecryptable payload as missing");
                Ok(None)
            }
        }
    }

    fn open(&self, value: &Document) -> Result<Document> {
        let corrupted = |what: &str| KvError::Deserialization(format!("corrupted payload: {what}"));

        match value.get(ENCRYPTION_VERSION_KEY).and_then(Value::as_u64) {
            Some(ENCRYPTION_VERSION) => {}
            Some(other) => return Err(corrupted(&format!("unknown version {other}"))),
            None => return Err(corrupted("missing encryption version")),
        }
        let data = value
            .get(ENCRYPTED_DATA_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| corrupted("encrypted data is not a string"))?;
        let nonce = value
            .get(NONCE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| corrupted("missing nonce"))?;

        let nonce_bytes = BASE64
            .decode(nonce)
            .map_err(|e| corrupted(&format!("invalid nonce: {e}")))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(corrupted("nonce has the wrong length"));
        }
        let encrypted = BASE64
            .decode(data)
            .map_err(|e| corrupted(&format!("invalid encrypted data: {e}")))?;

        let decrypted = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), encrypted.as_ref())
            .map_err(|e| KvError::Deserialization(format!("decryption failed: {e}")))?;

        serde_json::from_slice(&decrypted).map_err(|e| KvError::Deserialization(e.to_string()))
    }
}

#[async_trait]
impl KeyValue for EncryptionWrapper {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        let value = self.inner.get(key, collection).await?;
        self.decrypt(value)
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        let values = self.inner.get_many(keys, collection).await?;
        values.into_iter().map(|v| self.decrypt(v)).collect()
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        let (value, ttl) = self.inner.ttl(key, collection).await?;
        let value = self.decrypt(value)?;
        let ttl = value.as_ref().and(ttl);
        Ok((value, ttl))
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        let infos = self.inner.ttl_many(keys, collection).await?;
        infos
            .into_iter()
            .map(|(value, ttl)| {
                let value = self.decrypt(value)?;
                let ttl = value.as_ref().and(ttl);
                Ok((value, ttl))
            })
            .collect()
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        let value = self.encrypt(&value)?;
        self.inner.put(key, value, collection, ttl).await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        let values = values
            .iter()
            .map(|v| self.encrypt(v))
            .collect::<Result<Vec<_>>>()?;
        self.inner.put_many(keys, values, collection, ttl).await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.inner.delete(key, collection).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.inner.delete_many(keys, collection).await
    }

    wrapper_identity!("EncryptionWrapper", inner);
    forward_capabilities!(inner);
}
