//! Maps the core crate's typed errors onto the wire's generic enum codes (§7 of the spec).
//!
//! Kept in one module so the mapping stays auditable in a single place rather than scattered
//! across each RPC handler.

use tracing::error;

use buildcoord_core::{BaseError, CacheError, DeployError};
use buildcoord_proto::{BaseErrorCode, DeployErrorCode, PackageErrorCode};

pub fn base_error_code(err: &BaseError) -> BaseErrorCode {
    match err {
        BaseError::BadChecksumSize => BaseErrorCode::BaseBadChecksumSize,
        BaseError::ChecksumNotMatch => BaseErrorCode::BaseChecksumNotMatch,
        BaseError::BaseExists => BaseErrorCode::BaseExists,
        BaseError::BadArchive => BaseErrorCode::BaseBadArchive,
        BaseError::Internal(io_err) => {
            error!(error = %io_err, "internal error during SetupBase");
            BaseErrorCode::BaseInternalError
        }
    }
}

pub fn deploy_error_code(err: &DeployError) -> DeployErrorCode {
    match err {
        DeployError::BadChecksum => DeployErrorCode::DeployBadChecksum,
        DeployError::InvalidPackage => DeployErrorCode::DeployInvalidPackage,
        DeployError::Internal(io_err) => {
            error!(error = %io_err, "internal error during DeployPackage");
            DeployErrorCode::DeployInternalError
        }
    }
}

pub fn package_error_code(err: &CacheError) -> PackageErrorCode {
    match err {
        CacheError::InvalidPackage => {
            // Not reachable from a pure cache lookup, but `CacheError` is shared with insert.
            PackageErrorCode::PkgInternalError
        }
        CacheError::Io(io_err) => {
            error!(error = %io_err, "internal error during CheckPackages");
            PackageErrorCode::PkgInternalError
        }
    }
}
