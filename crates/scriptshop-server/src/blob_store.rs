//! Filesystem bucket store with keyed-hash signed retrieval links.
//!
//! Objects live at `<base>/<bucket>/<path>`. Items keep a stored reference
//! of the form `<base-url>/storage/v1/object/public/<bucket>/<path>`; the
//! preview bucket is served directly, the file bucket only through links
//! signed with [`BlobStore::signed_url`].

use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use scriptshop_shared::constants::{
    FILE_BUCKET, PREVIEW_BUCKET, PUBLIC_OBJECT_PREFIX, SIGNED_OBJECT_PREFIX,
};

use crate::error::ServerError;

/// Verify that a resolved path stays within the expected base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ServerError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target.strip_prefix(base).unwrap_or(target).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::ParentDir => {
                return Err(ServerError::BadRequest("Path traversal detected".to_string()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ServerError::BadRequest("Path traversal detected".to_string()));
    }
    Ok(resolved)
}

/// A validated `(bucket, path)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    bucket: String,
    path: String,
}

impl ObjectRef {
    pub fn new(bucket: &str, path: &str) -> Option<Self> {
        if !is_known_bucket(bucket) || !is_safe_path(path) {
            return None;
        }
        Some(Self {
            bucket: bucket.to_string(),
            path: path.to_string(),
        })
    }

    /// Extract the object from a stored reference URL. Anything that does
    /// not match `.../storage/v1/object/public/<bucket>/<path>` is rejected.
    pub fn parse_reference(reference: &str) -> Option<Self> {
        let start = reference.find(PUBLIC_OBJECT_PREFIX)? + PUBLIC_OBJECT_PREFIX.len();
        let rest = &reference[start..];
        let (bucket, path) = rest.split_once('/')?;
        Self::new(bucket, path)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_public(&self) -> bool {
        self.bucket == PREVIEW_BUCKET
    }

    /// Last path segment, used as the download filename.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    fn signing_input(&self, expires: i64) -> String {
        format!("{}/{}:{}", self.bucket, self.path, expires)
    }
}

fn is_known_bucket(bucket: &str) -> bool {
    bucket == PREVIEW_BUCKET || bucket == FILE_BUCKET
}

fn is_safe_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        })
}

#[derive(Clone)]
pub struct BlobStore {
    base_path: PathBuf,
    public_base_url: String,
    signing_key: [u8; 32],
}

impl BlobStore {
    pub async fn new(
        base_path: PathBuf,
        public_base_url: &str,
        signing_key: [u8; 32],
    ) -> Result<Self, ServerError> {
        for bucket in [PREVIEW_BUCKET, FILE_BUCKET] {
            let dir = base_path.join(bucket);
            fs::create_dir_all(&dir).await.map_err(|e| {
                ServerError::Storage(format!(
                    "Failed to create bucket directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        info!(path = %base_path.display(), "Bucket store initialized");

        Ok(Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signing_key,
        })
    }

    /// Store `data` under `<unix-millis>_<uuid>_<kind>.<ext>` in `bucket`.
    /// Existing objects are never overwritten.
    pub async fn put_object(
        &self,
        bucket: &str,
        kind: &str,
        ext: &str,
        data: &[u8],
    ) -> Result<ObjectRef, ServerError> {
        if data.is_empty() {
            return Err(ServerError::BadRequest("Empty upload".to_string()));
        }
        let name = format!(
            "{}_{}_{}.{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            kind,
            ext
        );
        let object = ObjectRef::new(bucket, &name)
            .ok_or_else(|| ServerError::BadRequest(format!("Invalid object name: {name}")))?;

        let path = self.object_path(&object)?;
        let write_err =
            |e: std::io::Error| ServerError::Storage(format!("Failed to write object {}: {}", name, e));
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(write_err)?;
        file.write_all(data).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;

        debug!(bucket, object = %name, size = data.len(), "Stored object");
        Ok(object)
    }

    pub async fn read_object(&self, object: &ObjectRef) -> Result<Vec<u8>, ServerError> {
        let path = self.object_path(object)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ServerError::NotFound("Object not found".to_string()))
            }
            Err(e) => Err(ServerError::Storage(format!(
                "Failed to read object {}: {}",
                object.path, e
            ))),
        }
    }

    pub async fn exists(&self, object: &ObjectRef) -> bool {
        match self.object_path(object) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn delete_object(&self, object: &ObjectRef) -> Result<(), ServerError> {
        let path = self.object_path(object)?;
        fs::remove_file(&path).await.map_err(|e| {
            ServerError::Storage(format!("Failed to delete object {}: {}", object.path, e))
        })?;
        debug!(bucket = %object.bucket, object = %object.path, "Deleted object");
        Ok(())
    }

    /// Reference stored on the item row.
    pub fn public_url(&self, object: &ObjectRef) -> String {
        format!(
            "{}{}{}/{}",
            self.public_base_url, PUBLIC_OBJECT_PREFIX, object.bucket, object.path
        )
    }

    /// Issue a retrieval link valid for `ttl_secs`. The object must exist.
    pub async fn signed_url(&self, object: &ObjectRef, ttl_secs: u64) -> Result<String, ServerError> {
        if !self.exists(object).await {
            return Err(ServerError::Storage(
                "Failed to create download URL".to_string(),
            ));
        }
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(ttl);
        Ok(format!(
            "{}{}{}/{}?expires={}&sig={}",
            self.public_base_url,
            SIGNED_OBJECT_PREFIX,
            object.bucket,
            object.path,
            expires,
            self.sign(object, expires)
        ))
    }

    fn sign(&self, object: &ObjectRef, expires: i64) -> String {
        blake3::keyed_hash(&self.signing_key, object.signing_input(expires).as_bytes())
            .to_hex()
            .to_string()
    }

    /// Check a link's signature and expiry. `blake3::Hash` equality is
    /// constant time.
    pub fn verify(&self, object: &ObjectRef, expires: i64, sig: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        let Ok(provided) = blake3::Hash::from_hex(sig) else {
            return false;
        };
        provided == blake3::keyed_hash(&self.signing_key, object.signing_input(expires).as_bytes())
    }

    fn object_path(&self, object: &ObjectRef) -> Result<PathBuf, ServerError> {
        let raw = self.base_path.join(&object.bucket).join(&object.path);
        ensure_within(&self.base_path, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (BlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path().to_path_buf(), "http://shop.test/", [7u8; 32])
            .await
            .unwrap();
        (store, dir)
    }

    #[test]
    fn parses_well_formed_reference() {
        let object = ObjectRef::parse_reference(
            "http://shop.test/storage/v1/object/public/item-files/1700000000000_file.zip",
        )
        .unwrap();
        assert_eq!(object.bucket(), FILE_BUCKET);
        assert_eq!(object.path(), "1700000000000_file.zip");
        assert!(!object.is_public());
    }

    #[test]
    fn rejects_malformed_references() {
        for bad in [
            "",
            "http://shop.test/files/script.zip",
            "http://shop.test/storage/v1/object/public/item-files",
            "http://shop.test/storage/v1/object/public/item-files/",
            "http://shop.test/storage/v1/object/public/item-files/../secret",
            "http://shop.test/storage/v1/object/public/other-bucket/a.zip",
            "http://shop.test/storage/v1/object/public/item-files/a b.zip",
        ] {
            assert!(ObjectRef::parse_reference(bad).is_none(), "accepted {bad:?}");
        }
    }

    #[tokio::test]
    async fn store_read_and_delete() {
        let (store, _dir) = test_store().await;
        let object = store
            .put_object(FILE_BUCKET, "file", "zip", b"archive-bytes")
            .await
            .unwrap();

        assert!(store.exists(&object).await);
        assert_eq!(store.read_object(&object).await.unwrap(), b"archive-bytes");
        assert!(store.public_url(&object).starts_with(
            "http://shop.test/storage/v1/object/public/item-files/"
        ));

        store.delete_object(&object).await.unwrap();
        assert!(matches!(
            store.read_object(&object).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn back_to_back_uploads_get_distinct_objects() {
        let (store, _dir) = test_store().await;
        let mut seen = std::collections::HashSet::new();
        for i in 0..50 {
            let first = store
                .put_object(FILE_BUCKET, "file", "zip", format!("archive A{i}").as_bytes())
                .await
                .unwrap();
            let second = store
                .put_object(FILE_BUCKET, "file", "zip", format!("archive B{i}").as_bytes())
                .await
                .unwrap();
            assert_ne!(first, second);
            assert_eq!(
                store.read_object(&first).await.unwrap(),
                format!("archive A{i}").as_bytes()
            );
            assert!(seen.insert(first.path().to_string()));
            assert!(seen.insert(second.path().to_string()));
        }
    }

    #[tokio::test]
    async fn empty_upload_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.put_object(PREVIEW_BUCKET, "preview", "png", b"").await.is_err());
    }

    #[tokio::test]
    async fn signed_links_verify_until_expiry() {
        let (store, _dir) = test_store().await;
        let object = store
            .put_object(FILE_BUCKET, "file", "zip", b"zip")
            .await
            .unwrap();

        let url = store.signed_url(&object, 300).await.unwrap();
        let query = url.split_once('?').unwrap().1;
        let mut expires = 0i64;
        let mut sig = String::new();
        for pair in query.split('&') {
            match pair.split_once('=').unwrap() {
                ("expires", v) => expires = v.parse().unwrap(),
                ("sig", v) => sig = v.to_string(),
                _ => {}
            }
        }

        assert!(store.verify(&object, expires, &sig));
        assert!(!store.verify(&object, expires + 1, &sig));
        assert!(!store.verify(&object, expires, "not-hex"));

        let stale = Utc::now().timestamp() - 10;
        let stale_sig = store.sign(&object, stale);
        assert!(!store.verify(&object, stale, &stale_sig));
    }

    #[tokio::test]
    async fn signing_a_missing_object_fails() {
        let (store, _dir) = test_store().await;
        let object = ObjectRef::new(FILE_BUCKET, "missing.zip").unwrap();
        assert!(matches!(
            store.signed_url(&object, 300).await,
            Err(ServerError::Storage(_))
        ));
    }
}
