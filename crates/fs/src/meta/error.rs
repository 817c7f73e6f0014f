//! Error type for the metadata store, with its errno mapping.

/// Errors surfaced by metadata operations.
///
/// The node layer translates each variant into a standard filesystem error
/// number via [`MetaError::errno`] before replying to the kernel.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("filesystem is not formatted")]
    NotFormatted,

    #[error("format descriptor is corrupt: {0}")]
    BadFormat(#[from] serde_json::Error),

    #[error("no such entry")]
    NotFound,

    #[error("entry already exists")]
    Exists,

    #[error("not a directory")]
    NotDir,

    #[error("is a directory")]
    IsDir,

    #[error("directory not empty")]
    NotEmpty,

    #[error("entry is not visible to this user")]
    Access,

    #[error("operation not permitted")]
    Perm,

    #[error("invalid argument")]
    Invalid,

    #[error("operation interrupted")]
    Interrupted,
}

impl MetaError {
    /// The errno this error surfaces as at the FUSE boundary.
    pub fn errno(&self) -> libc::c_int {
        match self {
            MetaError::Database(_) => libc::EIO,
            MetaError::NotFormatted => libc::EIO,
            MetaError::BadFormat(_) => libc::EIO,
            MetaError::NotFound => libc::ENOENT,
            MetaError::Exists => libc::EEXIST,
            MetaError::NotDir => libc::ENOTDIR,
            MetaError::IsDir => libc::EISDIR,
            MetaError::NotEmpty => libc::ENOTEMPTY,
            MetaError::Access => libc::EACCES,
            MetaError::Perm => libc::EPERM,
            MetaError::Invalid => libc::EINVAL,
            MetaError::Interrupted => libc::EINTR,
        }
    }

    /// Whether this is a transient driver failure worth retrying.
    ///
    /// Matches the driver messages for lock contention and connection
    /// exhaustion; everything else aborts the retry loop immediately.
    pub(crate) fn should_retry(&self) -> bool {
        match self {
            MetaError::Database(e) => {
                let msg = e.to_string().to_lowercase();
                msg.contains("database is locked")
                    || msg.contains("database table is locked")
                    || msg.contains("too many connections")
                    || msg.contains("too many clients")
            }
            _ => false,
        }
    }

    /// Whether the underlying database error is a uniqueness violation.
    pub(crate) fn is_unique_violation(&self) -> bool {
        match self {
            MetaError::Database(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(MetaError::NotFound.errno(), libc::ENOENT);
        assert_eq!(MetaError::Exists.errno(), libc::EEXIST);
        assert_eq!(MetaError::NotEmpty.errno(), libc::ENOTEMPTY);
        assert_eq!(MetaError::Perm.errno(), libc::EPERM);
        assert_eq!(MetaError::Access.errno(), libc::EACCES);
        assert_eq!(MetaError::Invalid.errno(), libc::EINVAL);
        assert_eq!(MetaError::Interrupted.errno(), libc::EINTR);
        assert_eq!(MetaError::NotFormatted.errno(), libc::EIO);
    }

    #[test]
    fn test_only_transient_errors_retry() {
        assert!(!MetaError::NotFound.should_retry());
        assert!(!MetaError::Exists.should_retry());
        let locked = MetaError::Database(sqlx::Error::Protocol("database is locked".into()));
        assert!(locked.should_retry());
    }
}
