//! Compression Wrapper
//!
//! Gzips payloads whose JSON encoding is larger than a threshold and stores
//! them as a tagged document:
//!
//! ```text
//! { "__compressed_data__": <base64 gzip>, "__compression_version__": 1,
//!   "__compression_algorithm__": "gzip" }
//! ```
//!
//! Smaller payloads are stored unmodified and untagged. Reads detect the tag
//! and decompress transparently.

use std::io::{Read, Write};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use tracing::warn;

use crate::contract::{KeyValue, StoreId, TtlInfo};
use crate::entry::{BatchTtl, Document};
use crate::error::{KvError, Result};

/// Default size in bytes above which payloads are compressed
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

const COMPRESSED_DATA_KEY: &str = "__compressed_data__";
const COMPRESSION_VERSION_KEY: &str = "__compression_version__";
const COMPRESSION_ALGORITHM_KEY: &str = "__compression_algorithm__";
const COMPRESSION_VERSION: u64 = 1;
const COMPRESSION_ALGORITHM: &str = "gzip";

pub struct CompressionWrapper {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    threshold: usize,
    level: Compression,
}

impl CompressionWrapper {
    pub fn new(inner: Arc<dyn KeyValue>) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            threshold: DEFAULT_COMPRESSION_THRESHOLD,
            level: Compression::default(),
        }
    }

    /// Payloads whose JSON encoding exceeds `threshold` bytes get compressed.
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Gzip level, 0 (none) to 9 (best).
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    fn compress(&self, value: Document) -> Result<Document> {
        let json_bytes =
            serde_json::to_vec(&value).map_err(|e| KvError::Serialization(e.to_string()))?;
        if json_bytes.len() <= self.threshold {
            return Ok(value);
        }

        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(&json_bytes)
            .map_err(|e| KvError::Serialization(format!("gzip failed: {e}")))?;
        let compressed = encoder
            .finish()
            .map_err(|e| KvError::Serialization(format!("gzip failed: {e}")))?;

        let mut tagged = Document::new();
        tagged.insert(COMPRESSED_DATA_KEY.into(), json!(BASE64.encode(compressed)));
        tagged.insert(COMPRESSION_VERSION_KEY.into(), json!(COMPRESSION_VERSION));
        tagged.insert(COMPRESSION_ALGORITHM_KEY.into(), json!(COMPRESSION_ALGORITHM));
        Ok(tagged)
    }

    /// Returns the payload behind a tagged document. Untagged documents, and
    /// tagged ones that cannot be decoded, come back unchanged.
    fn decompress(value: Option<Document>) -> Option<Document> {
        let value = value?;
        let Some(Value::String(data)) = value.get(COMPRESSED_DATA_KEY) else {
            return Some(value);
        };

        match Self::inflate(data) {
            Ok(original) => Some(original),
            Err(e) => {
                warn!(error = %e, "Returning undecodable compressed payload as stored");
                Some(value)
            }
        }
    }

    fn inflate(data: &str) -> Result<Document> {
        let compressed = BASE64
            .decode(data)
            .map_err(|e| KvError::Deserialization(format!("invalid base64: {e}")))?;

        let mut json_bytes = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut json_bytes)
            .map_err(|e| KvError::Deserialization(format!("gunzip failed: {e}")))?;

        serde_json::from_slice(&json_bytes).map_err(|e| KvError::Deserialization(e.to_string()))
    }
}

#[async_trait]
impl KeyValue for CompressionWrapper {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        let value = self.inner.get(key, collection).await?;
        Ok(Self::decompress(value))
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        let values = self.inner.get_many(keys, collection).await?;
        Ok(values.into_iter().map(Self::decompress).collect())
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        let (value, ttl) = self.inner.ttl(key, collection).await?;
        Ok((Self::decompress(value), ttl))
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        let infos = self.inner.ttl_many(keys, collection).await?;
        Ok(infos
            .into_iter()
            .map(|(value, ttl)| (Self::decompress(value), ttl))
            .collect())
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        let value = self.compress(value)?;
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
            .into_iter()
            .map(|v| self.compress(v))
            .collect::<Result<Vec<_>>>()?;
        self.inner.put_many(keys, values, collection, ttl).await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.inner.delete(key, collection).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.inner.delete_many(keys, collection).await
    }

    wrapper_identity!("CompressionWrapper", inner);
    forward_capabilities!(inner);
}
