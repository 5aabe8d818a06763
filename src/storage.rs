use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use thiserror::Error;

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Flat key → blob store for attachments and their thumbnails.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket recorded in `Attachment::path`.
    fn bucket(&self) -> &str;
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
    /// Bytes and content type.
    async fn get(&self, key: &str) -> Result<(Vec<u8>, String), StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    /// URL a browser can fetch the object from.
    async fn url_for(&self, key: &str) -> Result<String, StorageError>;
}

/// Sniffed from the bytes, falling back to the key's extension.
pub fn content_type_for(key: &str, bytes: &[u8]) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    let ext = key.rsplit_once('.').map(|(_, e)| e.to_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
    .to_string()
}

// ---------------- S3 Implementation (MinIO compatible) ----------------
pub struct S3ObjectStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    presign_ttl: Duration,
}

impl S3ObjectStore {
    pub async fn new(cfg: &StorageConfig) -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let bucket = cfg.bucket.clone();
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(cfg.region.clone()));
        if let Some(endpoint) = &cfg.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access), Some(secret)) = (&cfg.access_key, &cfg.secret_key) {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // custom endpoints (MinIO) rarely have wildcard DNS
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(cfg.endpoint.is_some())
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("initialized S3 client for bucket '{bucket}'");

        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            let mut attempt = 0u32;
            let max_attempts = 8;
            loop {
                attempt += 1;
                match client.create_bucket().bucket(&bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{bucket}' (attempt {attempt})");
                        break;
                    }
                    Err(e2) if attempt >= max_attempts => {
                        error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                        return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                    }
                    Err(e2) => {
                        let backoff_ms = 200 * attempt.pow(2);
                        warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                        tokio::time::sleep(Duration::from_millis(u64::from(backoff_ms))).await;
                    }
                }
            }
        }

        Ok(Self { bucket, client, presign_ttl: cfg.presign_ttl })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        use aws_sdk_s3::primitives::ByteStream;
        let content_type = content_type_for(key, &bytes);
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes));
        if let Err(e) = put.send().await {
            error!("put_object failed key={key} bucket={} err={:?}", self.bucket, e);
            let hint = if e.to_string().contains("NoSuchBucket") {
                " (bucket missing or not yet propagated)"
            } else if e.to_string().contains("AccessDenied") {
                " (check S3_ACCESS_KEY/S3_SECRET_KEY permissions)"
            } else {
                ""
            };
            return Err(StorageError::Other(format!("{e}{hint}")));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<(Vec<u8>, String), StorageError> {
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                err if err.is_no_such_key() => StorageError::NotFound,
                err => StorageError::Other(err.to_string()),
            })?;
        let stored_type = obj.content_type().map(str::to_string);
        let data = obj
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let bytes = data.into_bytes().to_vec();
        let mime = stored_type.unwrap_or_else(|| content_type_for(key, &bytes));
        Ok((bytes, mime))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!("delete_object failed key={key} bucket={} err={:?}", self.bucket, e);
                StorageError::Other(e.to_string())
            })?;
        Ok(())
    }

    async fn url_for(&self, key: &str) -> Result<String, StorageError> {
        use aws_sdk_s3::presigning::PresigningConfig;
        let presign = PresigningConfig::expires_in(self.presign_ttl)
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let req = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(req.uri().to_string())
    }
}

// ---------------- Local filesystem (development) ----------------
pub struct LocalObjectStore {
    dir: PathBuf,
    bucket: String,
}

impl LocalObjectStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let bucket = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local".into());
        Self { dir, bucket }
    }

    /// Keys are flat file names; anything path-like is unknown.
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
            return Err(StorageError::NotFound);
        }
        Ok(self.dir.join(key))
    }
}

fn io_error(e: std::io::Error) -> StorageError {
    match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::NotFound,
        _ => StorageError::Other(e.to_string()),
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_error)?;
        tokio::fs::write(path, bytes).await.map_err(io_error)
    }

    async fn get(&self, key: &str) -> Result<(Vec<u8>, String), StorageError> {
        let bytes = tokio::fs::read(self.path_for(key)?).await.map_err(io_error)?;
        let mime = content_type_for(key, &bytes);
        Ok((bytes, mime))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)?).await.map_err(io_error) {
            Ok(()) | Err(StorageError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn url_for(&self, key: &str) -> Result<String, StorageError> {
        Ok(format!("/files/{key}"))
    }
}

/// Local directory when `STORAGE_DIR` is set, S3 otherwise.
pub async fn build_object_store(cfg: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match &cfg.local_dir {
        Some(dir) => {
            info!("storing attachments under '{}'", dir.display());
            Ok(Arc::new(LocalObjectStore::new(dir)))
        }
        None => Ok(Arc::new(S3ObjectStore::new(cfg).await?)),
    }
}
