//! Object storage for uploaded videos and analysis artifacts (S3 or in-memory).

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    types::ObjectCannedAcl,
    Client,
};
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::StorageConfig;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("URL does not belong to this store: {0}")]
    ForeignUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Put/get by key; every stored object is addressable by URL.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key` and return its reference URL.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String>;

    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Reference URL for `key` (no I/O).
    fn url_for(&self, key: &str) -> String;

    /// Inverse of [`ObjectStore::url_for`].
    fn key_for_url(&self, url: &str) -> StorageResult<String>;
}

/// Keep ASCII alphanumerics plus `.`, `-`, `_`; everything else becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(['.', '_']).is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Collision-resistant key: `{folder}/{unix_millis}-{sanitized name}`.
pub fn timestamped_key(folder: &str, file_name: &str) -> String {
    format!(
        "{}/{}-{}",
        folder.trim_end_matches('/'),
        chrono::Utc::now().timestamp_millis(),
        sanitize_file_name(file_name)
    )
}

fn strip_base<'a>(base: &str, url: &'a str) -> Option<&'a str> {
    url.strip_prefix(base.trim_end_matches('/'))
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|key| !key.is_empty())
}

// ============================================================================
// S3
// ============================================================================

/// S3 connection settings; credentials come from the environment.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub prefix: String,
    pub public_base_url: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl From<&StorageConfig> for S3Config {
    fn from(cfg: &StorageConfig) -> Self {
        Self {
            bucket: cfg.bucket.clone(),
            region: cfg.region.clone(),
            endpoint: cfg.endpoint.clone(),
            prefix: cfg.prefix.clone(),
            public_base_url: cfg.public_base_url.clone(),
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
        }
    }
}

impl S3Config {
    /// Base URL objects are addressed under.
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    prefix: String,
    base_url: String,
}

impl S3ObjectStore {
    /// Build a client from the static credentials in `config`.
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vidscope",
        );

        let builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .behavior_version_latest();

        Self::from_builder(builder, config)
    }

    /// Use static credentials when present, otherwise the default AWS
    /// provider chain (profile, web identity, instance role).
    pub async fn connect(config: S3Config) -> Self {
        if !config.access_key_id.is_empty() {
            return Self::new(config);
        }

        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        tracing::info!("S3 credentials not set, using the default AWS provider chain");

        Self::from_builder(aws_sdk_s3::config::Builder::from(&shared), config)
    }

    fn from_builder(mut builder: aws_sdk_s3::config::Builder, config: S3Config) -> Self {
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            base_url: config.base_url(),
            bucket: config.bucket,
            prefix: config.prefix,
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String> {
        let full_key = self.full_key(key);
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .acl(ObjectCannedAcl::Private)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        tracing::info!(key = %full_key, bytes = size, "Stored object");
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let full_key = self.full_key(key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::NotFound(full_key.clone())
                } else {
                    StorageError::S3(e.to_string())
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(data.into_bytes())
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, self.full_key(key))
    }

    fn key_for_url(&self, url: &str) -> StorageResult<String> {
        strip_base(&self.base_url, url)
            .and_then(|full| full.strip_prefix(self.prefix.as_str()))
            .map(str::to_string)
            .ok_or_else(|| StorageError::ForeignUrl(url.to_string()))
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local store for tests and `--ephemeral` runs.
pub struct MemoryObjectStore {
    base_url: String,
    objects: RwLock<HashMap<String, (Bytes, String)>>,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().await.get(key).map(|(_, ct)| ct.clone())
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn key_for_url(&self, url: &str) -> StorageResult<String> {
        strip_base(&self.base_url, url)
            .map(str::to_string)
            .ok_or_else(|| StorageError::ForeignUrl(url.to_string()))
    }
}
