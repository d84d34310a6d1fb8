use cask_types::DigestAlgorithm;

/// Errors from read-side store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// The object exists but has no file at the given path.
    #[error("no file {path} in object {object_id}")]
    FileNotFound { object_id: String, path: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for read-side store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Ways a commit can be refused or fail.
///
/// `OutOfSync` and `Fixity` are the store's two refusal outcomes; everything
/// else is a hard failure that propagates to the caller unchanged.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// The commit target no longer matches the store's state -- another
    /// writer committed first (or created the object out from under a
    /// create). The loser of the race always lands here.
    #[error("object {0} out of sync")]
    OutOfSync(String),

    /// A checksummed source's computed digest did not match its declared
    /// digest at end-of-stream.
    #[error("fixity check failed: expected {algorithm} {expected}, got {actual}")]
    Fixity {
        algorithm: DigestAlgorithm,
        expected: String,
        actual: String,
    },

    /// Reading one of the staged sources failed.
    #[error("failed to read source: {0}")]
    Source(#[source] std::io::Error),

    /// Backend failure unrelated to the staged sources.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommitError {
    /// Classify an I/O error raised while draining a staged source.
    ///
    /// A digest mismatch travels inside the error as a
    /// [`FixityMismatch`](crate::source::FixityMismatch) payload; everything
    /// else stays a generic source failure.
    pub fn from_read_error(err: std::io::Error) -> Self {
        match err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<crate::source::FixityMismatch>())
        {
            Some(mismatch) => Self::Fixity {
                algorithm: mismatch.algorithm,
                expected: mismatch.expected.clone(),
                actual: mismatch.actual.clone(),
            },
            None => Self::Source(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FixityMismatch;
    use std::io;

    #[test]
    fn read_error_with_mismatch_becomes_fixity() {
        let mismatch = FixityMismatch {
            algorithm: DigestAlgorithm::Md5,
            expected: "aaa".into(),
            actual: "bbb".into(),
        };
        let err = CommitError::from_read_error(io::Error::new(io::ErrorKind::InvalidData, mismatch));
        match err {
            CommitError::Fixity { algorithm, expected, actual } => {
                assert_eq!(algorithm, DigestAlgorithm::Md5);
                assert_eq!(expected, "aaa");
                assert_eq!(actual, "bbb");
            }
            other => panic!("expected fixity, got {other:?}"),
        }
    }

    #[test]
    fn plain_read_error_stays_source() {
        let err = CommitError::from_read_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(matches!(err, CommitError::Source(_)));
    }

    #[test]
    fn fixity_message_carries_both_digests() {
        let err = CommitError::Fixity {
            algorithm: DigestAlgorithm::Md5,
            expected: "deadbeef".into(),
            actual: "cafef00d".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("deadbeef"));
        assert!(msg.contains("cafef00d"));
    }
}
