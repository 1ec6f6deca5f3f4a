//! Media storage for uploaded cover images
//!
//! Backends are picked from [`StorageConfig`] at startup and always wrapped
//! in [`UuidNameStore`] so two uploads with the same name never collide.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    config::StorageConfig,
    error::{AppError, AppResult},
};

/// Capability to persist and address media files
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Name a new upload will be stored under
    fn generate_filename(&self, upload_to: &str, original: &str) -> String {
        join_upload_path(upload_to, &valid_name(original))
    }

    async fn save(&self, name: &str, content: Vec<u8>, content_type: &str) -> AppResult<()>;

    /// Remove a stored file; a missing file is not an error
    async fn delete(&self, name: &str) -> AppResult<()>;

    /// Public URL of a stored file
    fn url(&self, name: &str) -> String;
}

/// Reduce a client-supplied file name to a safe single path segment
pub fn valid_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();

    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

fn join_upload_path(upload_to: &str, name: &str) -> String {
    let dir = upload_to.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

fn join_url(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name.trim_start_matches('/'))
}

/// Appends a random suffix to every generated file name
pub struct UuidNameStore<S> {
    inner: S,
}

impl<S: Store> UuidNameStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: Store> Store for UuidNameStore<S> {
    fn generate_filename(&self, upload_to: &str, original: &str) -> String {
        let filename = self.inner.generate_filename(upload_to, original);

        let (dir, file) = match filename.rsplit_once('/') {
            Some((dir, file)) => (Some(dir), file),
            None => (None, filename.as_str()),
        };

        let Some((stem, ext)) = file.rsplit_once('.') else {
            tracing::error!("Filename {} has no extension", filename);
            return filename;
        };

        let suffixed = format!("{}_{}.{}", stem, Uuid::new_v4().simple(), ext);
        match dir {
            Some(dir) => format!("{}/{}", dir, suffixed),
            None => suffixed,
        }
    }

    async fn save(&self, name: &str, content: Vec<u8>, content_type: &str) -> AppResult<()> {
        self.inner.save(name, content, content_type).await
    }

    async fn delete(&self, name: &str) -> AppResult<()> {
        self.inner.delete(name).await
    }

    fn url(&self, name: &str) -> String {
        self.inner.url(name)
    }
}

/// Files under a local directory, served by the app under `base_url`
pub struct FileSystemStore {
    root: PathBuf,
    base_url: String,
}

impl FileSystemStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> AppResult<PathBuf> {
        let relative = Path::new(name);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(AppError::Validation(format!("Invalid file name: {}", name)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Store for FileSystemStore {
    async fn save(&self, name: &str, content: Vec<u8>, _content_type: &str) -> AppResult<()> {
        let path = self.path_of(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Cannot create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| AppError::Storage(format!("Cannot write {}: {}", path.display(), e)))
    }

    async fn delete(&self, name: &str) -> AppResult<()> {
        let path = self.path_of(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("Cannot delete {}: {}", path.display(), e))),
        }
    }

    fn url(&self, name: &str) -> String {
        join_url(&self.base_url, name)
    }
}

type HmacSha256 = Hmac<Sha256>;

const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

/// S3-compatible bucket (AWS, R2, MinIO) addressed path-style
pub struct S3Store {
    client: reqwest::Client,
    endpoint: String,
    host: String,
    bucket: String,
    region: String,
    access_key: String,
    secret_key: String,
    public_url: String,
}

impl S3Store {
    pub fn new(
        endpoint: &str,
        bucket: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        public_url: &str,
    ) -> AppResult<Self> {
        let parsed = reqwest::Url::parse(endpoint)
            .map_err(|e| AppError::Internal(format!("Invalid S3 endpoint {}: {}", endpoint, e)))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(AppError::Internal(format!("S3 endpoint {} has no host", endpoint)))
            }
        };

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            host,
            bucket: bucket.to_string(),
            region: region.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            public_url: public_url.to_string(),
        })
    }

    fn object_path(&self, name: &str) -> String {
        let key = name
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("/{}/{}", urlencoding::encode(&self.bucket), key)
    }

    /// Headers authenticating one request with AWS Signature Version 4
    fn sign(
        &self,
        method: &str,
        path: &str,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Vec<(&'static str, String)> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/s3/aws4_request", date, self.region);

        let canonical_request = format!(
            "{method}\n{path}\n\nhost:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{payload_hash}",
            host = self.host,
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let key = signing_key(&self.secret_key, &date, &self.region, "s3");
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

        vec![
            ("x-amz-date", amz_date),
            ("x-amz-content-sha256", payload_hash.to_string()),
            (
                "authorization",
                format!(
                    "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
                    self.access_key, scope, SIGNED_HEADERS, signature
                ),
            ),
        ]
    }

    async fn send(
        &self,
        method: reqwest::Method,
        name: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> AppResult<reqwest::Response> {
        let path = self.object_path(name);
        let payload_hash = hex::encode(Sha256::digest(&body));

        let mut request = self
            .client
            .request(method.clone(), format!("{}{}", self.endpoint, path));
        for (header, value) in self.sign(method.as_str(), &path, &payload_hash, Utc::now()) {
            request = request.header(header, value);
        }
        if let Some(content_type) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }

        request
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 {} {} failed: {}", method, name, e)))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the SigV4 signing key for one day, region and service
fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

#[async_trait]
impl Store for S3Store {
    async fn save(&self, name: &str, content: Vec<u8>, content_type: &str) -> AppResult<()> {
        let response = self
            .send(reqwest::Method::PUT, name, content, Some(content_type))
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Storage(format!(
                "S3 rejected upload of {}: {}",
                name,
                response.status()
            )));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> AppResult<()> {
        let response = self
            .send(reqwest::Method::DELETE, name, Vec::new(), None)
            .await?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(AppError::Storage(format!("S3 rejected delete of {}: {}", name, status)))
        }
    }

    fn url(&self, name: &str) -> String {
        join_url(&self.public_url, name)
    }
}

/// Build the configured backend, wrapped with collision-free naming
pub fn from_config(config: &StorageConfig) -> AppResult<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config {
        StorageConfig::Filesystem { root, base_url } => {
            tracing::info!("Storing media under {}", root.display());
            Arc::new(UuidNameStore::new(FileSystemStore::new(root.clone(), base_url.clone())))
        }
        StorageConfig::S3 {
            endpoint,
            bucket,
            region,
            access_key,
            secret_key,
            public_url,
        } => {
            tracing::info!("Storing media in bucket {} at {}", bucket, endpoint);
            Arc::new(UuidNameStore::new(S3Store::new(
                endpoint, bucket, region, access_key, secret_key, public_url,
            )?))
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockall::predicate::eq;

    #[test]
    fn test_uuid_suffix_keeps_directory_and_extension() {
        let store = UuidNameStore::new(FileSystemStore::new("media", "/media/"));
        let name = store.generate_filename("cover-images/", "my cover.png");

        let (dir, file) = name.rsplit_once('/').unwrap();
        assert_eq!(dir, "cover-images");
        assert!(file.starts_with("my_cover_"));
        assert!(file.ends_with(".png"));
        // stem + '_' + 32 hex chars + ".png"
        assert_eq!(file.len(), "my_cover".len() + 1 + 32 + 4);

        let again = store.generate_filename("cover-images/", "my cover.png");
        assert_ne!(name, again);
    }

    #[test]
    fn test_name_without_extension_is_kept() {
        let store = UuidNameStore::new(FileSystemStore::new("media", "/media/"));
        assert_eq!(
            store.generate_filename("cover-images/", "README"),
            "cover-images/README"
        );
    }

    #[test]
    fn test_valid_name_strips_paths() {
        assert_eq!(valid_name("../../etc/passwd"), "passwd");
        assert_eq!(valid_name("C:\\covers\\dune.jpg"), "dune.jpg");
        assert_eq!(valid_name("..."), "upload");
    }

    #[tokio::test]
    async fn test_wrapper_delegates_to_inner_store() {
        let mut inner = MockStore::new();
        inner
            .expect_save()
            .withf(|name, content, content_type| {
                name == "cover-images/a_1.png" && content.len() == 3 && content_type == "image/png"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        inner
            .expect_url()
            .with(eq("cover-images/a_1.png"))
            .returning(|name| format!("https://media.example.org/{}", name));

        let store = UuidNameStore::new(inner);
        store
            .save("cover-images/a_1.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert_eq!(
            store.url("cover-images/a_1.png"),
            "https://media.example.org/cover-images/a_1.png"
        );
    }

    #[tokio::test]
    async fn test_filesystem_round_trip() {
        let root = std::env::temp_dir().join(format!("library-media-{}", Uuid::new_v4().simple()));
        let store = FileSystemStore::new(&root, "/user-media/");

        store
            .save("cover-images/x.png", b"png".to_vec(), "image/png")
            .await
            .unwrap();
        assert_eq!(std::fs::read(root.join("cover-images/x.png")).unwrap(), b"png");
        assert_eq!(store.url("cover-images/x.png"), "/user-media/cover-images/x.png");

        store.delete("cover-images/x.png").await.unwrap();
        store.delete("cover-images/x.png").await.unwrap();
        assert!(!root.join("cover-images/x.png").exists());

        assert!(store.save("../escape.png", vec![], "image/png").await.is_err());
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn test_signing_key_derivation() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_signed_headers() {
        let store = S3Store::new(
            "https://account.r2.cloudflarestorage.com",
            "covers",
            "auto",
            "AKID",
            "secret",
            "https://media.example.org/",
        )
        .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let empty_hash = hex::encode(Sha256::digest(b""));

        let headers = store.sign("DELETE", "/covers/cover-images/a.png", &empty_hash, now);
        let get = |name: &str| {
            headers
                .iter()
                .find(|(h, _)| *h == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };

        assert_eq!(get("x-amz-date"), "20240501T123000Z");
        let auth = get("authorization");
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKID/20240501/auto/s3/aws4_request, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature="
        ));
        let signature = auth.rsplit('=').next().unwrap();
        assert_eq!(signature.len(), 64);

        let other = store.sign("PUT", "/covers/cover-images/a.png", &empty_hash, now);
        assert_ne!(other[2].1, auth);
    }

    #[test]
    fn test_object_path_encodes_segments() {
        let store = S3Store::new("http://localhost:9000", "media", "auto", "a", "b", "http://cdn")
            .unwrap();
        assert_eq!(store.host, "localhost:9000");
        assert_eq!(
            store.object_path("cover-images/a b.png"),
            "/media/cover-images/a%20b.png"
        );
        assert_eq!(store.url("cover-images/x.png"), "http://cdn/cover-images/x.png");
    }
}
