use std::collections::BTreeMap;
use std::io::Read;

use cask_types::{DigestAlgorithm, VersionMetadata, VersionNum};
use chrono::{DateTime, Utc};

use crate::error::{CommitError, StoreResult};
use crate::source::FileEntry;

/// Commit target, distinguishing create from update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetVersion {
    /// The object must not exist yet; the commit writes `v1`.
    New,
    /// The object's head must still be this version; the commit writes its
    /// successor. A stale expectation means another writer got there first.
    Expect(VersionNum),
}

/// One file in an object's current version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// Logical path of the file within the object.
    pub path: String,
    /// Primary fixity digest of the file's content, lowercase hex.
    pub digest: String,
}

/// An open stream over one stored file, plus the metadata the gateway needs
/// to serve it.
pub struct FileContent {
    pub reader: Box<dyn Read + Send>,
    /// Total size of the file in bytes.
    pub size: u64,
    /// Algorithm of the primary digest below.
    pub digest_algorithm: DigestAlgorithm,
    /// Primary fixity digest, lowercase hex. Doubles as the HTTP ETag.
    pub digest: String,
    /// Path of the content relative to the storage root.
    pub storage_relative_path: String,
    /// All fixity digests recorded for this file, keyed by algorithm.
    pub fixity: BTreeMap<DigestAlgorithm, String>,
}

impl std::fmt::Debug for FileContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContent")
            .field("size", &self.size)
            .field("digest_algorithm", &self.digest_algorithm)
            .field("digest", &self.digest)
            .field("storage_relative_path", &self.storage_relative_path)
            .finish()
    }
}

/// Versioned object store.
///
/// All implementations must satisfy these invariants:
/// - Versions are immutable once committed; a commit only ever appends.
/// - Commits to the same object are serialized; when two writers race, at
///   most one succeeds and the rest fail with [`CommitError::OutOfSync`].
/// - A commit is all-or-nothing: if any staged source fails to read or
///   verify, no version is written.
/// - Concurrent reads are always safe, including concurrently with commits.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Whether an object with this ID has at least one committed version.
    fn contains_object(&self, object_id: &str) -> StoreResult<bool>;

    /// The current head version of an object, or `None` if it does not exist.
    fn head_version(&self, object_id: &str) -> StoreResult<Option<VersionNum>>;

    /// The files of the object's current version.
    ///
    /// With `include_deleted` set, lists every path that appeared in any
    /// version, whether or not it survives in the head.
    /// Fails with [`StoreError::ObjectNotFound`] for unknown objects.
    ///
    /// [`StoreError::ObjectNotFound`]: crate::error::StoreError::ObjectNotFound
    fn current_version_files(
        &self,
        object_id: &str,
        include_deleted: bool,
    ) -> StoreResult<Vec<FileInfo>>;

    /// Open a file of the current version for reading.
    fn file_content(&self, object_id: &str, path: &str) -> StoreResult<FileContent>;

    /// UTC instant of the most recent version that changed the file's content.
    fn most_recent_change(&self, object_id: &str, path: &str) -> StoreResult<DateTime<Utc>>;

    /// Commit the staged entries as one new immutable version.
    ///
    /// `target` carries the caller's precondition (see [`TargetVersion`]);
    /// the store validates it under its own serialization, so the caller's
    /// earlier existence/collision checks are only an optimization. With
    /// `overwrite` unset, an entry whose name already exists in the head is
    /// refused. Consumes every staged source exactly once.
    fn commit(
        &self,
        object_id: &str,
        target: TargetVersion,
        metadata: &VersionMetadata,
        entries: Vec<FileEntry>,
        overwrite: bool,
    ) -> Result<VersionNum, CommitError>;
}
