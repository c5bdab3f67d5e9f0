use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::DirBuilderExt;

/// The server's private working directory, laid out as:
///
/// ```text
/// <root>/
///   base/<sid>/             extracted base filesystems, one per live session
///   binpkgs/<sid>/<cat>/<name>.tbz2   symlinks into cache
///   cache/<hex(digest)>.tbz2          content-addressed artifacts
///   tmp/                    staging for uploads; contents ephemeral
/// ```
#[derive(Debug, Clone)]
pub struct Workdir {
    root: PathBuf,
}

impl Workdir {
    /// Create the four top-level directories under `root` with mode 0700, if they don't
    /// already exist.
    pub fn init(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        let workdir = Self { root };
        for dir in [
            workdir.base_root(),
            workdir.binpkgs_root(),
            workdir.cache_root(),
            workdir.tmp_root(),
        ] {
            create_dir_private(&dir)?;
        }
        Ok(workdir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_root(&self) -> PathBuf {
        self.root.join("base")
    }

    pub fn binpkgs_root(&self) -> PathBuf {
        self.root.join("binpkgs")
    }

    pub fn cache_root(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn tmp_root(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// `<root>/base/<sid>/`.
    pub fn base_dir(&self, sid: &str) -> PathBuf {
        self.base_root().join(sid)
    }

    /// `<root>/binpkgs/<sid>/`.
    pub fn binpkg_dir(&self, sid: &str) -> PathBuf {
        self.binpkgs_root().join(sid)
    }

    /// `<root>/cache/<file>`.
    pub fn cache_path(&self, file: &str) -> PathBuf {
        self.cache_root().join(file)
    }
}

#[cfg(unix)]
fn create_dir_private(dir: &Path) -> io::Result<()> {
    match std::fs::DirBuilder::new().mode(0o700).create(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(not(unix))]
fn create_dir_private(dir: &Path) -> io::Result<()> {
    match std::fs::create_dir(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err),
    }
}
