use std::io;

use fs_err::tokio as fs;
use thiserror::Error;

use crate::cache::{Cache, CacheError};
use crate::digest::{Digest, PackageDescriptor};
use crate::workdir::Workdir;

/// What the server decided about a single descriptor received over a `CheckPackages` stream.
#[derive(Debug, PartialEq, Eq)]
pub enum PackageOutcome {
    /// Not cached; the client must upload it via `DeployPackage`.
    NeedsUpload,
    /// Already cached; the artifact has been linked into the session's binpkg directory.
    Linked,
}

/// §4.E's per-descriptor decision: consult the cache, and either report that an upload is
/// needed or link the cached artifact into `sid`'s binpkg directory.
pub async fn check_package(
    cache: &Cache,
    sid: &str,
    desc: &PackageDescriptor,
) -> Result<PackageOutcome, CacheError> {
    if cache.has(&desc.digest).await? {
        cache.link_into_session(sid, &desc.cpv.binpkg_path(), &desc.digest)?;
        Ok(PackageOutcome::Linked)
    } else {
        Ok(PackageOutcome::NeedsUpload)
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("checksum must be 32 bytes")]
    BadChecksum,
    #[error("artifact digest does not match its contents")]
    InvalidPackage,
    #[error(transparent)]
    Internal(#[from] io::Error),
}

impl From<CacheError> for DeployError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InvalidPackage => Self::InvalidPackage,
            CacheError::Io(err) => Self::Internal(err),
        }
    }
}

/// §4.F's `DeployPackage`: stage `data` to a temp file, verify its digest against `desc.digest`,
/// atomically insert it into the cache, then link it into `sid`'s binpkg directory.
///
/// Does not check that `sid` is a live session — see the design note on orphaned symlinks.
pub async fn deploy_package(
    workdir: &Workdir,
    cache: &Cache,
    sid: &str,
    desc: &PackageDescriptor,
    data: &[u8],
) -> Result<(), DeployError> {
    let staging = tempfile::Builder::new()
        .prefix("pkg")
        .tempfile_in(workdir.tmp_root())?
        .into_temp_path();
    fs::write(&staging, data).await?;

    cache.insert(&desc.digest, &staging).await?;
    cache.link_into_session(sid, &desc.cpv.binpkg_path(), &desc.digest)?;
    Ok(())
}

/// Validates a raw wire checksum before it's used to build a [`PackageDescriptor`].
pub fn parse_digest(bytes: &[u8]) -> Result<Digest, DeployError> {
    Digest::from_bytes(bytes).map_err(|_| DeployError::BadChecksum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Cpv;

    fn new_cache(tmp: &std::path::Path) -> Cache {
        Cache::new(Workdir::init(tmp).unwrap())
    }

    #[tokio::test]
    async fn check_package_reports_needs_upload_when_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = new_cache(tmp.path());
        let desc = PackageDescriptor {
            cpv: Cpv::parse("dev-lang/rust").unwrap(),
            digest: Digest::compute(b"rust tarball"),
        };
        let outcome = check_package(&cache, "sid-1", &desc).await.unwrap();
        assert_eq!(outcome, PackageOutcome::NeedsUpload);
    }

    #[tokio::test]
    async fn deploy_then_check_reports_linked() {
        let tmp = tempfile::tempdir().unwrap();
        let workdir = Workdir::init(tmp.path()).unwrap();
        let cache = Cache::new(workdir.clone());
        let data = b"rust tarball bytes";
        let desc = PackageDescriptor {
            cpv: Cpv::parse("dev-lang/rust").unwrap(),
            digest: Digest::compute(data),
        };

        deploy_package(&workdir, &cache, "sid-1", &desc, data)
            .await
            .unwrap();

        let outcome = check_package(&cache, "sid-2", &desc).await.unwrap();
        assert_eq!(outcome, PackageOutcome::Linked);

        let link = workdir.binpkg_dir("sid-2").join(desc.cpv.binpkg_path());
        assert!(link.exists());
    }

    #[tokio::test]
    async fn deploy_rejects_digest_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let workdir = Workdir::init(tmp.path()).unwrap();
        let cache = Cache::new(workdir.clone());
        let desc = PackageDescriptor {
            cpv: Cpv::parse("dev-lang/rust").unwrap(),
            digest: Digest::compute(b"expected bytes"),
        };

        let err = deploy_package(&workdir, &cache, "sid-1", &desc, b"different bytes")
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidPackage));
    }

    #[tokio::test]
    async fn redeploying_same_artifact_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let workdir = Workdir::init(tmp.path()).unwrap();
        let cache = Cache::new(workdir.clone());
        let data = b"idempotent bytes";
        let desc = PackageDescriptor {
            cpv: Cpv::parse("dev-lang/rust").unwrap(),
            digest: Digest::compute(data),
        };

        deploy_package(&workdir, &cache, "sid-1", &desc, data)
            .await
            .unwrap();
        deploy_package(&workdir, &cache, "sid-1", &desc, data)
            .await
            .unwrap();

        let contents = fs_err::read(workdir.cache_path(&crate::digest::cache_filename(&desc.digest))).unwrap();
        assert_eq!(contents, data);
    }
}
