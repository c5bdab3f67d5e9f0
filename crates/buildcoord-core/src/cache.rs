use std::io;
use std::path::{Path, PathBuf};

use fs_err::tokio as fs;
use thiserror::Error;
use tracing::{debug, warn};

use crate::digest::{cache_filename, Digest};
use crate::workdir::Workdir;

/// The on-disk, content-addressed artifact store.
///
/// Every file under `<workdir>/cache/` is named by the hex-encoded SHA-256 of its own contents.
/// Two package descriptors that carry the same digest always refer to the same cache file,
/// regardless of which `CATEGORY/NAME` either of them names.
#[derive(Debug, Clone)]
pub struct Cache {
    workdir: Workdir,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("artifact digest does not match its contents")]
    InvalidPackage,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Cache {
    pub fn new(workdir: Workdir) -> Self {
        Self { workdir }
    }

    fn path_for(&self, digest: &Digest) -> PathBuf {
        self.workdir.cache_path(&cache_filename(digest))
    }

    /// Stat the cache path for `digest`. Any I/O error other than "not found" propagates.
    pub async fn has(&self, digest: &Digest) -> Result<bool, CacheError> {
        match fs::metadata(self.path_for(digest)).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Verify that `tmp_path`'s contents hash to `digest`, then atomically rename it into the
    /// cache. On any failure (I/O or digest mismatch) `tmp_path` is removed.
    ///
    /// Two concurrent inserts of the same digest race harmlessly: the last writer's rename wins,
    /// and since both are digest-verified the file on disk is identical either way.
    pub async fn insert(&self, digest: &Digest, tmp_path: &Path) -> Result<(), CacheError> {
        let result = self.insert_inner(digest, tmp_path).await;
        if result.is_err() {
            let _ = fs::remove_file(tmp_path).await;
        }
        result
    }

    async fn insert_inner(&self, digest: &Digest, tmp_path: &Path) -> Result<(), CacheError> {
        let bytes = fs::read(tmp_path).await?;
        if Digest::compute(&bytes) != *digest {
            return Err(CacheError::InvalidPackage);
        }
        let dest = self.path_for(digest);
        fs::rename(tmp_path, &dest).await?;
        debug!(digest = %digest, "inserted artifact into cache");
        Ok(())
    }

    /// Link `digest`'s cache file into `sid`'s binpkg directory at `binpkg_path`
    /// (`<category>/<name>.tbz2`), creating parent directories (mode 0700) as needed.
    ///
    /// If the link already exists this succeeds without replacing it: two streams racing on the
    /// same CPV for the same sid both attempting the symlink is benign, not a conflict.
    pub fn link_into_session(
        &self,
        sid: &str,
        binpkg_path: &Path,
        digest: &Digest,
    ) -> Result<(), CacheError> {
        let link_path = self.workdir.binpkg_dir(sid).join(binpkg_path);
        let parent = link_path
            .parent()
            .expect("binpkg path always has a parent");
        create_dir_private(parent)?;

        match symlink(&self.path_for(digest), &link_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(err) => {
                warn!(sid, error = %err, "failed to link artifact into session");
                Err(err.into())
            }
        }
    }
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::fs::copy(original, link).map(|_| ())
}

#[cfg(unix)]
fn create_dir_private(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    match std::fs::DirBuilder::new().mode(0o700).recursive(true).create(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(not(unix))]
fn create_dir_private(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)
}
