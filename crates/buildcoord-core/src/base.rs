use std::io;
use std::path::Path;

use fs_err::tokio as fs;
use thiserror::Error;
use tracing::warn;

use crate::digest::{Digest, DIGEST_LEN};
use crate::session;
use crate::workdir::Workdir;

#[derive(Debug, Error)]
pub enum BaseError {
    #[error("archive checksum must be {DIGEST_LEN} bytes")]
    BadChecksumSize,
    #[error("archive checksum does not match its contents")]
    ChecksumNotMatch,
    #[error("a base already exists for this session")]
    BaseExists,
    #[error("archive extraction failed")]
    BadArchive,
    #[error(transparent)]
    Internal(#[from] io::Error),
}

/// Ingests a base system image: verifies its digest, stages it to a temp file, and extracts it
/// into the session's private base directory.
///
/// `extract` is injected so tests can stub out the external `tar` process; in production it
/// invokes the real extractor (see [`spawn_tar_xz`]).
pub struct BaseIngester<'a> {
    workdir: &'a Workdir,
}

impl<'a> BaseIngester<'a> {
    pub fn new(workdir: &'a Workdir) -> Self {
        Self { workdir }
    }

    /// Run the full `SetupBase` sequence of §4.D: checksum-size check, digest verification,
    /// staging, "base already exists" check, and extraction. Every exit path removes the
    /// staging file.
    pub async fn setup_base(
        &self,
        sid: &str,
        archive_bytes: &[u8],
        archive_digest_bytes: &[u8],
    ) -> Result<(), BaseError> {
        if !session::is_canonical_sid(sid) {
            // Not a wire-visible error code in §6.2, but refusing here is what keeps every
            // other check in this function from ever touching an attacker-chosen path.
            return Err(BaseError::BadArchive);
        }

        if archive_digest_bytes.len() != DIGEST_LEN {
            return Err(BaseError::BadChecksumSize);
        }
        let expected = Digest::from_bytes(archive_digest_bytes)
            .map_err(|_| BaseError::BadChecksumSize)?;
        if Digest::compute(archive_bytes) != expected {
            return Err(BaseError::ChecksumNotMatch);
        }

        let staging = tempfile::Builder::new()
            .prefix("archive")
            .tempfile_in(self.workdir.tmp_root())?
            .into_temp_path();
        fs::write(&staging, archive_bytes).await?;

        let result = self.extract(sid, &staging).await;
        let _ = fs::remove_file(&staging).await;
        result
    }

    async fn extract(&self, sid: &str, staging: &Path) -> Result<(), BaseError> {
        let target_dir = self.workdir.base_dir(sid);
        if fs::metadata(&target_dir).await.is_ok() {
            return Err(BaseError::BaseExists);
        }

        create_dir_private(&target_dir)?;
        spawn_tar_xz(staging, &target_dir).await?;
        Ok(())
    }
}

/// Invoke `tar -Jxf <archive> -C <target_dir>` and fail with [`BaseError::BadArchive`] on any
/// non-zero exit or spawn failure.
async fn spawn_tar_xz(archive: &Path, target_dir: &Path) -> Result<(), BaseError> {
    let status = tokio::process::Command::new("tar")
        .arg("-Jxf")
        .arg(archive)
        .arg("-C")
        .arg(target_dir)
        .status()
        .await
        .map_err(|err| {
            warn!(error = %err, "failed to spawn tar");
            BaseError::BadArchive
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(BaseError::BadArchive)
    }
}

#[cfg(unix)]
fn create_dir_private(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_dir_private(dir: &Path) -> io::Result<()> {
    std::fs::create_dir(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;

    fn new_workdir() -> (tempfile::TempDir, Workdir) {
        let tmp = tempfile::tempdir().unwrap();
        let workdir = Workdir::init(tmp.path()).unwrap();
        (tmp, workdir)
    }

    #[tokio::test]
    async fn rejects_short_checksum() {
        let (_tmp, workdir) = new_workdir();
        let ingester = BaseIngester::new(&workdir);
        let sid = uuid::Uuid::new_v4().to_string();
        let err = ingester
            .setup_base(&sid, b"irrelevant", &[0u8; 4])
            .await
            .unwrap_err();
        assert!(matches!(err, BaseError::BadChecksumSize));
    }

    #[tokio::test]
    async fn rejects_mismatched_checksum() {
        let (_tmp, workdir) = new_workdir();
        let ingester = BaseIngester::new(&workdir);
        let sid = uuid::Uuid::new_v4().to_string();
        let zero_digest = [0u8; DIGEST_LEN];
        let err = ingester
            .setup_base(&sid, b"some archive bytes", &zero_digest)
            .await
            .unwrap_err();
        assert!(matches!(err, BaseError::ChecksumNotMatch));
    }

    #[tokio::test]
    async fn rejects_non_canonical_sid() {
        let (_tmp, workdir) = new_workdir();
        let ingester = BaseIngester::new(&workdir);
        let bytes = b"archive bytes";
        let digest = Digest::compute(bytes);
        let err = ingester
            .setup_base("../../etc", bytes, digest.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, BaseError::BadArchive));
    }

    #[tokio::test]
    async fn base_exists_on_second_call() {
        let (_tmp, workdir) = new_workdir();
        let sid = uuid::Uuid::new_v4().to_string();
        std::fs::create_dir_all(workdir.base_dir(&sid)).unwrap();

        let ingester = BaseIngester::new(&workdir);
        let bytes = b"archive bytes";
        let digest = Digest::compute(bytes);
        let err = ingester
            .setup_base(&sid, bytes, digest.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, BaseError::BaseExists));
    }
}
