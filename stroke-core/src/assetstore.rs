//! Content-addressed blob storage on the local filesystem.
//!
//! Blobs live at `<root>/<aa>/<bb>/<sha256>`. Writes go to a uniquely named
//! temp file under `<root>/tmp`, are fsynced, then hard-linked into place so a
//! reader never observes a partial blob and concurrent writers of identical
//! content converge on one file.
//!
//! Each digest has an in-process lock. A writer holds it from linking the blob
//! until its file record exists ([`BlobLease`]), and [`AssetStore::release_file`]
//! takes it before deciding a blob is unreferenced.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::database::ports::files::FilesRepository;
use crate::error::{CatalogError, Result};
use crate::types::{FileId, FileRecord};

const READ_CHUNK: usize = 64 * 1024;

/// Address and length of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub sha256: String,
    pub size: i64,
}

type DigestLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Exclusive hold on one digest. The map entry is dropped with the last holder.
struct DigestGuard {
    sha256: String,
    locks: DigestLocks,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for DigestGuard {
    fn drop(&mut self) {
        // map + this guard; anyone waiting holds another clone
        self.locks
            .remove_if(&self.sha256, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

/// A stored blob that cannot be released until the lease is dropped.
pub struct BlobLease {
    blob: StoredBlob,
    _guard: DigestGuard,
}

impl fmt::Debug for BlobLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobLease").field("blob", &self.blob).finish()
    }
}

impl BlobLease {
    pub fn blob(&self) -> &StoredBlob {
        &self.blob
    }
}

#[derive(Clone)]
pub struct AssetStore {
    root: PathBuf,
    locks: DigestLocks,
}

impl fmt::Debug for AssetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetStore").field("root", &self.root).finish()
    }
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and temp directories if missing.
    pub async fn ensure_layout(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.root.join("tmp")).await?;
        Ok(())
    }

    pub fn path_for(&self, sha256: &str) -> Result<PathBuf> {
        if sha256.len() != 64 || !sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CatalogError::validation(format!(
                "invalid blob address: {sha256}"
            )));
        }
        Ok(self
            .root
            .join(&sha256[0..2])
            .join(&sha256[2..4])
            .join(sha256))
    }

    async fn lock_digest(&self, sha256: &str) -> DigestGuard {
        let lock = Arc::clone(&self.locks.entry(sha256.to_string()).or_default());
        DigestGuard {
            sha256: sha256.to_string(),
            locks: self.locks.clone(),
            _guard: lock.lock_owned().await,
        }
    }

    pub async fn put_bytes(&self, bytes: &[u8]) -> Result<StoredBlob> {
        Ok(self.put_reader(bytes).await?.blob().clone())
    }

    pub async fn put_file(&self, path: &Path) -> Result<BlobLease> {
        let file = tokio::fs::File::open(path).await?;
        self.put_reader(file).await
    }

    /// Stream `reader` into the store, hashing as it goes. The blob stays
    /// pinned while the returned lease is alive; create its file record
    /// before dropping it.
    pub async fn put_reader<R>(&self, mut reader: R) -> Result<BlobLease>
    where
        R: AsyncRead + Unpin + Send,
    {
        let tmp_dir = self.root.join("tmp");
        tokio::fs::create_dir_all(&tmp_dir).await?;
        let tmp_path = tmp_dir.join(format!("upload.{}", Uuid::new_v4().simple()));

        let written = self.write_temp(&mut reader, &tmp_path).await;
        let blob = match written {
            Ok(blob) => blob,
            Err(err) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };

        let final_path = match self.path_for(&blob.sha256) {
            Ok(path) => path,
            Err(err) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };
        let guard = self.lock_digest(&blob.sha256).await;
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let linked = tokio::fs::hard_link(&tmp_path, &final_path).await;
        let _ = tokio::fs::remove_file(&tmp_path).await;
        match linked {
            Ok(()) => debug!("stored blob {} ({} bytes)", blob.sha256, blob.size),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!("blob {} already present", blob.sha256);
            }
            Err(e) => return Err(e.into()),
        }

        Ok(BlobLease {
            blob,
            _guard: guard,
        })
    }

    async fn write_temp<R>(&self, reader: &mut R, tmp_path: &Path) -> Result<StoredBlob>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut file = tokio::fs::File::create(tmp_path).await?;
        let mut hasher = Sha256::new();
        let mut size: i64 = 0;
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
            size += n as i64;
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok(StoredBlob {
            sha256: hex::encode(hasher.finalize()),
            size,
        })
    }

    pub async fn open(&self, sha256: &str) -> Result<tokio::fs::File> {
        let path = self.path_for(sha256)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CatalogError::not_found(
                format!("blob {sha256} is missing from the asset store"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read(&self, sha256: &str) -> Result<Vec<u8>> {
        let mut file = self.open(sha256).await?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).await?;
        Ok(bytes)
    }

    pub async fn exists(&self, sha256: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(sha256)?).await?)
    }

    /// Delete a blob. Missing blobs are not an error.
    pub async fn remove(&self, sha256: &str) -> Result<()> {
        let path = self.path_for(sha256)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("released blob {}", sha256);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("blob {} was already gone", sha256);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a file record, then its blob once no other record shares the
    /// same content.
    pub async fn release_file(
        &self,
        files: &dyn FilesRepository,
        id: FileId,
    ) -> Result<Option<FileRecord>> {
        let Some(removed) = files.delete_file(id).await? else {
            return Ok(None);
        };
        self.release_blob(files, &removed.sha256).await?;
        Ok(Some(removed))
    }

    /// Remove a blob whose record is already gone, unless another record
    /// still shares it.
    pub async fn release_blob(&self, files: &dyn FilesRepository, sha256: &str) -> Result<()> {
        let _guard = self.lock_digest(sha256).await;
        if files.count_by_sha256(sha256).await? == 0 {
            self.remove(sha256).await?;
        }
        Ok(())
    }

    /// Give up a lease whose file record was never created, removing the
    /// blob unless another record shares it.
    pub async fn discard(&self, lease: BlobLease, files: &dyn FilesRepository) -> Result<()> {
        if files.count_by_sha256(&lease.blob.sha256).await? == 0 {
            self.remove(&lease.blob.sha256).await?;
        }
        drop(lease);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::types::{ItemId, Upload};

    fn record_for(blob: &StoredBlob, name: &str) -> FileRecord {
        Upload {
            item_id: ItemId::new(),
            name: name.to_string(),
            mime_type: "image/png".to_string(),
            size: blob.size,
            creator_id: None,
            reference: None,
        }
        .to_file(blob.sha256.clone())
    }

    #[tokio::test]
    async fn identical_content_shares_one_blob() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let store = AssetStore::new(dir.path());

        let a = store.put_bytes(b"slice").await.unwrap();
        let b = store.put_bytes(b"slice").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a.size, 5);
        assert_eq!(a.sha256, hex::encode(Sha256::digest(b"slice")));
        assert!(store.path_for(&a.sha256).unwrap().is_file());
        assert_eq!(store.read(&a.sha256).await.unwrap(), b"slice");

        let tmp_entries = std::fs::read_dir(dir.path().join("tmp")).unwrap().count();
        assert_eq!(tmp_entries, 0);
    }

    #[tokio::test]
    async fn removed_blob_reads_as_not_found() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let store = AssetStore::new(dir.path());
        let blob = store.put_bytes(b"x").await.unwrap();

        store.remove(&blob.sha256).await.unwrap();
        assert!(!store.exists(&blob.sha256).await.unwrap());
        assert!(store.open(&blob.sha256).await.unwrap_err().is_not_found());
        store.remove(&blob.sha256).await.unwrap();
    }

    #[test]
    fn rejects_non_hex_addresses() {
        let store = AssetStore::new("/tmp/unused");
        assert!(store.path_for("../../etc/passwd").is_err());
        let path = store.path_for(&"ab".repeat(32)).unwrap();
        assert!(path.ends_with(format!("ab/ab/{}", "ab".repeat(32))));
    }

    #[tokio::test]
    async fn release_waits_for_pending_record_on_shared_blob() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let store = AssetStore::new(dir.path());
        let files = Arc::new(MemoryStore::new());

        let blob = store.put_bytes(b"blank slice").await.unwrap();
        let first = files.create_file(record_for(&blob, "a.png")).await.unwrap();

        let lease = store.put_reader(&b"blank slice"[..]).await.unwrap();
        let release = tokio::spawn({
            let store = store.clone();
            let files = files.clone();
            async move { store.release_file(files.as_ref(), first.id).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        assert!(!release.is_finished());

        let second = files
            .create_file(record_for(lease.blob(), "b.png"))
            .await
            .unwrap();
        drop(lease);
        assert!(release.await.unwrap().unwrap().is_some());

        assert!(store.exists(&blob.sha256).await.unwrap());
        assert_eq!(store.read(&second.sha256).await.unwrap(), b"blank slice");
        assert!(store.locks.is_empty());

        store.release_file(files.as_ref(), second.id).await.unwrap();
        assert!(!store.exists(&blob.sha256).await.unwrap());
    }

    #[tokio::test]
    async fn discarded_lease_keeps_blobs_other_records_use() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let store = AssetStore::new(dir.path());
        let files = MemoryStore::new();

        let lease = store.put_reader(&b"orphan"[..]).await.unwrap();
        let sha256 = lease.blob().sha256.clone();
        store.discard(lease, &files).await.unwrap();
        assert!(!store.exists(&sha256).await.unwrap());

        let blob = store.put_bytes(b"shared").await.unwrap();
        files.create_file(record_for(&blob, "kept.png")).await.unwrap();
        let lease = store.put_reader(&b"shared"[..]).await.unwrap();
        store.discard(lease, &files).await.unwrap();
        assert!(store.exists(&blob.sha256).await.unwrap());
    }
}
