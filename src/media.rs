//! Image storage for card avatars and covers. Two backends: local
//! filesystem (default) and S3/MinIO when `S3_ENDPOINT` is configured.

use async_trait::async_trait;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("unsupported media type")]
    UnsupportedType,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Sniff the content and return the mime type if it is an allowed image.
pub fn sniff_image(bytes: &[u8]) -> Result<String, MediaStoreError> {
    let kind = infer::get(bytes).ok_or(MediaStoreError::UnsupportedType)?;
    let mime = kind.mime_type();
    if !ALLOWED_MIME.contains(&mime) {
        return Err(MediaStoreError::UnsupportedType);
    }
    Ok(mime.to_string())
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store the bytes under a fresh key and return the public URL path.
    async fn put(&self, bytes: &[u8]) -> Result<String, MediaStoreError>;
    async fn get(&self, key: &str) -> Result<(Vec<u8>, String), MediaStoreError>;
}

fn new_key(mime: &str) -> String {
    let ext = match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        _ => "webp",
    };
    format!("{}.{ext}", uuid::Uuid::new_v4())
}

// ---------------- Filesystem Implementation ----------------

pub struct FsMediaStore {
    dir: PathBuf,
}

impl FsMediaStore {
    pub fn from_env() -> std::io::Result<Self> {
        let dir = std::env::var("TAPDECK_MEDIA_DIR").unwrap_or_else(|_| "data/media".into());
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        // Keys are uuid.ext; reject anything that could escape the dir.
        if key.contains('/') || key.contains("..") {
            return None;
        }
        Some(self.dir.join(key))
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn put(&self, bytes: &[u8]) -> Result<String, MediaStoreError> {
        let mime = sniff_image(bytes)?;
        let key = new_key(&mime);
        let path = self.dir.join(&key);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| MediaStoreError::Other(e.to_string()))?;
        Ok(format!("/media/{key}"))
    }

    async fn get(&self, key: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        let path = self.path_for(key).ok_or(MediaStoreError::NotFound)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| MediaStoreError::NotFound)?;
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }
}

// ---------------- S3 Implementation (MinIO compatible) ----------------

pub struct S3MediaStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    prefix: String,
    public_base: String,
}

impl S3MediaStore {
    pub async fn new() -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "tapdeck-media".into());
        let endpoint = std::env::var("S3_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("S3_ENDPOINT must be set (MinIO / S3 endpoint)"))?;
        let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let access = std::env::var("S3_ACCESS_KEY").unwrap_or_default();
        let secret = std::env::var("S3_SECRET_KEY").unwrap_or_default();
        let public_base = std::env::var("S3_PUBLIC_BASE")
            .unwrap_or_else(|_| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region));
        loader = loader.endpoint_url(endpoint);
        if !access.is_empty() && !secret.is_empty() {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // Path-style addressing is required for most MinIO/local endpoints
        // without wildcard DNS.
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("Initialized S3/MinIO media client (path-style addressing enabled)");

        // Ensure bucket exists (create if missing)
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
                    Err(e2) => {
                        if attempt >= max_attempts {
                            error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                            return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                        }
                        let backoff_ms = 200 * attempt.pow(2);
                        warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64))
                            .await;
                    }
                }
            }
        }

        Ok(Self {
            bucket,
            client,
            prefix: "media".into(),
            public_base,
        })
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key)
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn put(&self, bytes: &[u8]) -> Result<String, MediaStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        let mime = sniff_image(bytes)?;
        let key = new_key(&mime);
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key_for(&key))
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(&mime);
        if let Err(e) = put.send().await {
            error!("put_object failed key={key} bucket={} err={:?}", self.bucket, e);
            return Err(MediaStoreError::Other(e.to_string()));
        }
        Ok(format!("{}/{}/{key}", self.public_base, self.prefix))
    }

    async fn get(&self, key: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key_for(key))
            .send()
            .await
            .map_err(|_| MediaStoreError::NotFound)?;
        let data = obj
            .body
            .collect()
            .await
            .map_err(|e| MediaStoreError::Other(e.to_string()))?;
        let bytes = Vec::from(data.into_bytes().as_ref());
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }
}

/// Factory used in main: S3 when S3_ENDPOINT is set, filesystem otherwise.
pub async fn build_media_store() -> anyhow::Result<Arc<dyn MediaStore>> {
    if std::env::var("S3_ENDPOINT").is_ok() {
        Ok(Arc::new(S3MediaStore::new().await?))
    } else {
        Ok(Arc::new(FsMediaStore::from_env()?))
    }
}
