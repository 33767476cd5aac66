use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::copy::CopyObjectRequest;
use google_cloud_storage::http::objects::delete::DeleteObjectRequest;
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};

use crate::config::{StorageBackend, StorageConfig};

/// Where staged and published images live.
///
/// Keys are `/`-separated paths such as `media/recipe/12/main-1f2e3d4c.png`.
/// Every method blocks, so call them from `spawn_blocking` rather than directly
/// on the async executor.
pub trait BlobStore: Send + Sync {
    fn put(&self, key: &str, content: &[u8]) -> Result<()>;
    fn copy(&self, source: &str, destination: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn read(&self, key: &str) -> Result<Vec<u8>>;
    /// The URL a browser can fetch the blob from
    fn public_url(&self, key: &str) -> String;
}

pub type SharedBlobStore = Arc<dyn BlobStore>;

/// Build the configured backend.
pub async fn from_config(config: &StorageConfig) -> Result<SharedBlobStore> {
    Ok(match &config.backend {
        StorageBackend::Local {
            base_dir,
            public_base_url,
        } => Arc::new(LocalBlobStore::new(base_dir, public_base_url)?),
        StorageBackend::Gcs { bucket } => Arc::new(GcsBlobStore::new(bucket).await?),
    })
}

/// Join key segments with `/`, ignoring empty segments so that an empty
/// bucket root does not produce a leading slash.
pub fn join_key<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments
        .into_iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// The last segment of a key
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Permanent location of a blob that belongs to a published recipe
pub fn recipe_key(bucket_root: &str, recipe_id: i64, source: &str) -> String {
    join_key([
        bucket_root,
        "recipe",
        &recipe_id.to_string(),
        basename(source),
    ])
}

/// Blobs on the local filesystem, under one base directory.
pub struct LocalBlobStore {
    base_dir: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(base_dir: impl Into<PathBuf>, public_base_url: &str) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)
            .with_context(|| format!("Creating blob directory {}", base_dir.display()))?;
        Ok(Self {
            base_dir,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a key to a path, refusing anything that would escape the base directory.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        anyhow::ensure!(
            !key.is_empty()
                && relative
                    .components()
                    .all(|c| matches!(c, Component::Normal(_))),
            "Invalid blob key: {key}"
        );
        Ok(self.base_dir.join(relative))
    }
}

impl BlobStore for LocalBlobStore {
    fn put(&self, key: &str, content: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content).with_context(|| format!("Writing blob {key}"))
    }

    fn copy(&self, source: &str, destination: &str) -> Result<()> {
        let from = self.resolve(source)?;
        let to = self.resolve(destination)?;
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&from, &to)
            .with_context(|| format!("Copying blob {source} to {destination}"))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        std::fs::remove_file(self.resolve(key)?).with_context(|| format!("Deleting blob {key}"))
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        std::fs::read(self.resolve(key)?).with_context(|| format!("Reading blob {key}"))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

/// Blobs in a Google Cloud Storage bucket.
///
/// The client is async, so each call is driven to completion on the runtime
/// that built the store.
pub struct GcsBlobStore {
    gcs_client: Client,
    bucket: String,
    runtime: tokio::runtime::Handle,
}

impl GcsBlobStore {
    pub async fn new(bucket: &str) -> Result<Self> {
        let config = ClientConfig::default().with_auth().await?;
        let gcs_client = Client::new(config);
        Ok(Self {
            gcs_client,
            bucket: bucket.into(),
            runtime: tokio::runtime::Handle::current(),
        })
    }
}

impl BlobStore for GcsBlobStore {
    fn put(&self, key: &str, content: &[u8]) -> Result<()> {
        let media = Media::new(key.to_string());
        let request = UploadObjectRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };
        self.runtime.block_on(self.gcs_client.upload_object(
            &request,
            content.to_vec(),
            &UploadType::Simple(media),
        ))?;
        Ok(())
    }

    fn copy(&self, source: &str, destination: &str) -> Result<()> {
        let request = CopyObjectRequest {
            source_bucket: self.bucket.clone(),
            source_object: source.into(),
            destination_bucket: self.bucket.clone(),
            destination_object: destination.into(),
            ..Default::default()
        };
        self.runtime
            .block_on(self.gcs_client.copy_object(&request))
            .with_context(|| format!("Copying gs://{}/{source}", self.bucket))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let request = DeleteObjectRequest {
            bucket: self.bucket.clone(),
            object: key.into(),
            ..Default::default()
        };
        self.runtime.block_on(self.gcs_client.delete_object(&request))?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            object: key.into(),
            ..Default::default()
        };
        let bytes = self
            .runtime
            .block_on(self.gcs_client.download_object(&request, &Range::default()))?;
        Ok(bytes)
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://storage.googleapis.com/{}/{}", self.bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipe_keys_are_scoped_by_recipe() {
        assert_eq!(
            recipe_key("media", 42, "media/temp/7/step_2-00ff00ff.png"),
            "media/recipe/42/step_2-00ff00ff.png"
        );
        assert_eq!(recipe_key("", 1, "main.jpeg"), "recipe/1/main.jpeg");
        assert_eq!(
            join_key(["/media/", "temp", "", "7"]),
            "media/temp/7"
        );
    }

    #[test]
    fn local_store_copies_and_refuses_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "/media/").unwrap();
        store.put("media/temp/1/main.png", b"abc").unwrap();
        store
            .copy("media/temp/1/main.png", "media/recipe/9/main.png")
            .unwrap();
        assert_eq!(store.read("media/recipe/9/main.png").unwrap(), b"abc");
        assert_eq!(
            store.public_url("media/recipe/9/main.png"),
            "/media/media/recipe/9/main.png"
        );
        store.delete("media/temp/1/main.png").unwrap();
        assert!(store.read("media/temp/1/main.png").is_err());
        assert!(store.read("../outside").is_err());
        assert!(store.put("/etc/passwd", b"").is_err());
    }
}
