use std::fmt;

use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// Length in bytes of a SHA-256 digest.
pub const DIGEST_LEN: usize = 32;

/// A verified SHA-256 digest of an artifact's bytes.
///
/// `Digest` is only ever constructed from a byte slice of the right length; there is no path
/// that lets a caller forge one from an arbitrary string without going through [`Digest::compute`]
/// or [`Digest::from_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Hash `data` and wrap the result.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Wrap an already-computed digest, failing if it isn't exactly [`DIGEST_LEN`] bytes.
    ///
    /// This is the only entry point a wire message's raw `checksum` bytes should go through:
    /// every caller that accepts a client-reported digest must route it here so a too-short or
    /// too-long checksum surfaces as [`InvalidChecksum`] instead of panicking deeper in a path
    /// computation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InvalidChecksum> {
        let array: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| InvalidChecksum { len: bytes.len() })?;
        Ok(Self(array))
    }

    /// Parse a lowercase hex-encoded digest, e.g. a cache file's stem.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut buf = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut buf).ok()?;
        Some(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// The client's reported checksum was not 32 bytes.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("checksum must be {DIGEST_LEN} bytes, got {len}")]
pub struct InvalidChecksum {
    pub len: usize,
}

/// A `CATEGORY/NAME` package identifier.
///
/// Validation is deliberately shallow: a CPV is only required to contain exactly one `/`.
/// Everything before it is the category (used as a subdirectory), everything after is the name
/// (used as a filename stem).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cpv {
    category: String,
    name: String,
}

impl Cpv {
    /// Parse and validate a CPV string, failing if it doesn't contain exactly one `/`.
    ///
    /// No other validation is performed: an empty category or name (`"a/"`, `"/b"`) is a valid
    /// CPV as far as this parser is concerned, matching `split('/')[0]`/`split('/')[1]`
    /// semantics with no further policing of either half.
    pub fn parse(s: &str) -> Result<Self, InvalidCpv> {
        let mut parts = s.split('/');
        let (Some(category), Some(name), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(InvalidCpv { cpv: s.to_owned() });
        };
        Ok(Self {
            category: category.to_owned(),
            name: name.to_owned(),
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The binpkg-relative path, `CATEGORY/NAME.tbz2`.
    pub fn binpkg_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.category).join(format!("{}.tbz2", self.name))
    }
}

impl fmt::Display for Cpv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

/// A CPV string did not contain exactly one `/`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid package identifier: {cpv:?}")]
pub struct InvalidCpv {
    pub cpv: String,
}

/// A `(cpv, digest)` pair identifying a specific artifact a client wants to install.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageDescriptor {
    pub cpv: Cpv,
    pub digest: Digest,
}

/// The cache filename for a digest, `<hex(digest)>.tbz2`.
pub fn cache_filename(digest: &Digest) -> String {
    format!("{digest}.tbz2")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_cpv_without_slash() {
        assert!(Cpv::parse("nodash").is_err());
    }

    #[test]
    fn rejects_cpv_with_two_slashes() {
        assert!(Cpv::parse("a/b/c").is_err());
    }

    #[test]
    fn accepts_well_formed_cpv() {
        let cpv = Cpv::parse("dev-lang/rust").unwrap();
        assert_eq!(cpv.category(), "dev-lang");
        assert_eq!(cpv.name(), "rust");
        assert_eq!(cpv.binpkg_path(), std::path::Path::new("dev-lang/rust.tbz2"));
    }

    #[test]
    fn accepts_empty_category_or_name_with_exactly_one_slash() {
        let empty_name = Cpv::parse("a/").unwrap();
        assert_eq!(empty_name.category(), "a");
        assert_eq!(empty_name.name(), "");

        let empty_category = Cpv::parse("/b").unwrap();
        assert_eq!(empty_category.category(), "");
        assert_eq!(empty_category.name(), "b");
    }

    #[test]
    fn digest_roundtrips_through_hex() {
        let digest = Digest::compute(b"hello world");
        let hex = digest.to_string();
        assert_eq!(Digest::from_hex(&hex), Some(digest));
    }

    #[test]
    fn digest_from_bytes_rejects_wrong_length() {
        let err = Digest::from_bytes(&[0u8; 4]).unwrap_err();
        assert_eq!(err.len, 4);
    }

    proptest::proptest! {
        #[test]
        fn cpv_parse_never_panics(s in ".*") {
            let _ = Cpv::parse(&s);
        }

        #[test]
        fn valid_cpv_always_has_one_slash(category in "[^/]+", name in "[^/]+") {
            let s = format!("{category}/{name}");
            let cpv = Cpv::parse(&s).unwrap();
            proptest::prop_assert_eq!(cpv.to_string(), s);
        }
    }
}
