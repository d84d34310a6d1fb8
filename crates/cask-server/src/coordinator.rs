use cask_store::{CommitError, FileEntry, ObjectStore, TargetVersion};
use cask_types::{DigestAlgorithm, VersionMetadata, VersionNum};

use crate::error::GatewayResult;

/// Which HTTP write method the commit came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMethod {
    /// `POST`: the object must not exist yet.
    Create,
    /// `PUT`: the object must already exist.
    Update,
}

/// One staged write against an object, built per request and discarded after
/// commit or failure.
#[derive(Debug)]
pub struct IngestionRequest {
    pub object_id: String,
    pub entries: Vec<FileEntry>,
    pub metadata: VersionMetadata,
    pub overwrite_existing: bool,
}

/// How a commit attempt ended. Never an escaping exception: every refusal
/// the store can produce is classified here for the transport layer.
#[derive(Debug)]
pub enum CommitOutcome {
    /// A new version was written.
    Created(VersionNum),
    /// The write was refused; the request conflicts with current state.
    Conflict(String),
    /// `PUT` against an object that does not exist.
    NotFound(String),
    /// A declared checksum did not match the bytes read.
    Fixity {
        algorithm: DigestAlgorithm,
        expected: String,
        actual: String,
    },
}

/// Decide create-vs-update legality and commit through the store.
///
/// The existence and collision pre-checks are a fast-reject optimization
/// only: between them and the commit another writer may get in. The store
/// revalidates the target under its own serialization and its rejection is
/// the authoritative signal, surfaced as `Conflict`.
pub fn commit(
    store: &dyn ObjectStore,
    method: WriteMethod,
    request: IngestionRequest,
) -> GatewayResult<CommitOutcome> {
    let object_id = request.object_id;
    let exists = store.contains_object(&object_id)?;

    let target = match method {
        WriteMethod::Create => {
            if exists {
                return Ok(CommitOutcome::Conflict(format!(
                    "object {object_id} already exists. Use PUT to update it."
                )));
            }
            TargetVersion::New
        }
        WriteMethod::Update => {
            if !exists {
                return Ok(CommitOutcome::NotFound(format!(
                    "{object_id} doesn't exist. Use POST to create it."
                )));
            }
            let Some(head) = store.head_version(&object_id)? else {
                return Ok(CommitOutcome::NotFound(format!(
                    "{object_id} doesn't exist. Use POST to create it."
                )));
            };
            if !request.overwrite_existing {
                let current = store.current_version_files(&object_id, false)?;
                let mut collisions: Vec<&str> = request
                    .entries
                    .iter()
                    .filter(|entry| current.iter().any(|f| f.path == entry.name))
                    .map(|entry| entry.name.as_str())
                    .collect();
                if !collisions.is_empty() {
                    collisions.sort_unstable();
                    return Ok(CommitOutcome::Conflict(format!(
                        "files {} already exist, set updateExisting flag",
                        collisions.join(", ")
                    )));
                }
            }
            TargetVersion::Expect(head)
        }
    };

    match store.commit(
        &object_id,
        target,
        &request.metadata,
        request.entries,
        request.overwrite_existing,
    ) {
        Ok(version) => {
            tracing::info!(object_id = %object_id, version = %version, "committed new version");
            Ok(CommitOutcome::Created(version))
        }
        Err(err @ CommitError::OutOfSync(_)) => {
            tracing::warn!(object_id = %object_id, "commit lost to a concurrent writer");
            Ok(CommitOutcome::Conflict(err.to_string()))
        }
        Err(CommitError::Fixity {
            algorithm,
            expected,
            actual,
        }) => Ok(CommitOutcome::Fixity {
            algorithm,
            expected,
            actual,
        }),
        Err(CommitError::Source(e)) => Err(e.into()),
        Err(CommitError::Store(e)) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cask_store::{ByteSource, FileContent, FileInfo, InMemoryObjectStore, StoreResult};
    use chrono::{DateTime, Utc};

    fn entry(name: &str, data: &'static [u8]) -> FileEntry {
        FileEntry::new(name, ByteSource::inline(data))
    }

    fn request(id: &str, entries: Vec<FileEntry>, overwrite: bool) -> IngestionRequest {
        IngestionRequest {
            object_id: id.to_string(),
            entries,
            metadata: VersionMetadata::new(),
            overwrite_existing: overwrite,
        }
    }

    #[test]
    fn create_on_fresh_object() {
        let store = InMemoryObjectStore::new();
        let outcome = commit(
            &store,
            WriteMethod::Create,
            request("obj:1", vec![entry("a.txt", b"abc")], false),
        )
        .unwrap();
        assert!(matches!(outcome, CommitOutcome::Created(v) if v == VersionNum::first()));
        assert!(store.contains_object("obj:1").unwrap());
    }

    #[test]
    fn create_on_existing_object_conflicts_without_writing() {
        let store = InMemoryObjectStore::new();
        commit(
            &store,
            WriteMethod::Create,
            request("obj:1", vec![entry("a.txt", b"abc")], false),
        )
        .unwrap();

        let outcome = commit(
            &store,
            WriteMethod::Create,
            request("obj:1", vec![entry("b.txt", b"xyz")], false),
        )
        .unwrap();
        match outcome {
            CommitOutcome::Conflict(msg) => {
                assert_eq!(msg, "object obj:1 already exists. Use PUT to update it.");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        // No write happened: still one version, no b.txt.
        assert_eq!(store.head_version("obj:1").unwrap(), Some(VersionNum::first()));
        assert!(store.file_content("obj:1", "b.txt").is_err());
    }

    #[test]
    fn update_on_missing_object_is_not_found() {
        let store = InMemoryObjectStore::new();
        let outcome = commit(
            &store,
            WriteMethod::Update,
            request("ghost", vec![entry("a.txt", b"abc")], false),
        )
        .unwrap();
        match outcome {
            CommitOutcome::NotFound(msg) => {
                assert_eq!(msg, "ghost doesn't exist. Use POST to create it.");
            }
            other => panic!("expected not-found, got {other:?}"),
        }
    }

    #[test]
    fn update_without_collisions_needs_no_flag() {
        let store = InMemoryObjectStore::new();
        commit(
            &store,
            WriteMethod::Create,
            request("obj:1", vec![entry("a.txt", b"abc")], false),
        )
        .unwrap();

        let outcome = commit(
            &store,
            WriteMethod::Update,
            request("obj:1", vec![entry("b.txt", b"xyz")], false),
        )
        .unwrap();
        assert!(matches!(outcome, CommitOutcome::Created(v) if v.number() == 2));
    }

    #[test]
    fn update_with_collisions_and_no_flag_conflicts() {
        let store = InMemoryObjectStore::new();
        commit(
            &store,
            WriteMethod::Create,
            request("obj:1", vec![entry("b.txt", b"2"), entry("a.txt", b"1")], false),
        )
        .unwrap();

        let outcome = commit(
            &store,
            WriteMethod::Update,
            request(
                "obj:1",
                vec![entry("b.txt", b"new"), entry("a.txt", b"new"), entry("c.txt", b"3")],
                false,
            ),
        )
        .unwrap();
        match outcome {
            CommitOutcome::Conflict(msg) => {
                assert_eq!(msg, "files a.txt, b.txt already exist, set updateExisting flag");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        // Nothing was written, including the non-colliding c.txt.
        assert_eq!(store.head_version("obj:1").unwrap(), Some(VersionNum::first()));
    }

    #[test]
    fn update_with_collisions_and_flag_overwrites() {
        let store = InMemoryObjectStore::new();
        commit(
            &store,
            WriteMethod::Create,
            request("obj:1", vec![entry("a.txt", b"old"), entry("keep.txt", b"keep")], false),
        )
        .unwrap();

        let outcome = commit(
            &store,
            WriteMethod::Update,
            request("obj:1", vec![entry("a.txt", b"new")], true),
        )
        .unwrap();
        assert!(matches!(outcome, CommitOutcome::Created(_)));

        let mut content = store.file_content("obj:1", "a.txt").unwrap();
        let mut data = Vec::new();
        std::io::Read::read_to_end(&mut content.reader, &mut data).unwrap();
        assert_eq!(data, b"new");
        assert!(store.file_content("obj:1", "keep.txt").is_ok());
    }

    #[test]
    fn fixity_failure_is_classified_with_both_digests() {
        let store = InMemoryObjectStore::new();
        let bad = FileEntry::new(
            "a.txt",
            ByteSource::inline(&b"abc"[..])
                .with_checksum(DigestAlgorithm::Md5, "00000000000000000000000000000000"),
        );
        let outcome = commit(&store, WriteMethod::Create, request("obj:1", vec![bad], false))
            .unwrap();
        match outcome {
            CommitOutcome::Fixity { algorithm, expected, actual } => {
                assert_eq!(algorithm, DigestAlgorithm::Md5);
                assert_eq!(expected, "00000000000000000000000000000000");
                assert_eq!(actual, DigestAlgorithm::Md5.hash_hex(b"abc"));
            }
            other => panic!("expected fixity, got {other:?}"),
        }
        assert!(!store.contains_object("obj:1").unwrap());
    }

    /// Store wrapper that commits a competing version during the caller's
    /// pre-check reads, forcing the race the pre-checks cannot close.
    struct RacingStore {
        inner: InMemoryObjectStore,
        interloper: std::sync::atomic::AtomicBool,
    }

    impl RacingStore {
        fn new(inner: InMemoryObjectStore) -> Self {
            Self {
                inner,
                interloper: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn sneak_commit(&self, object_id: &str) {
            if self.interloper.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return;
            }
            let target = match self.inner.head_version(object_id).unwrap() {
                Some(head) => TargetVersion::Expect(head),
                None => TargetVersion::New,
            };
            self.inner
                .commit(
                    object_id,
                    target,
                    &VersionMetadata::new(),
                    vec![FileEntry::new("interloper.txt", ByteSource::inline(&b"!"[..]))],
                    true,
                )
                .unwrap();
        }
    }

    impl ObjectStore for RacingStore {
        fn contains_object(&self, object_id: &str) -> StoreResult<bool> {
            self.inner.contains_object(object_id)
        }

        fn head_version(&self, object_id: &str) -> StoreResult<Option<VersionNum>> {
            let head = self.inner.head_version(object_id)?;
            self.sneak_commit(object_id);
            Ok(head)
        }

        fn current_version_files(
            &self,
            object_id: &str,
            include_deleted: bool,
        ) -> StoreResult<Vec<FileInfo>> {
            self.inner.current_version_files(object_id, include_deleted)
        }

        fn file_content(&self, object_id: &str, path: &str) -> StoreResult<FileContent> {
            self.inner.file_content(object_id, path)
        }

        fn most_recent_change(&self, object_id: &str, path: &str) -> StoreResult<DateTime<Utc>> {
            self.inner.most_recent_change(object_id, path)
        }

        fn commit(
            &self,
            object_id: &str,
            target: TargetVersion,
            metadata: &VersionMetadata,
            entries: Vec<FileEntry>,
            overwrite: bool,
        ) -> Result<VersionNum, CommitError> {
            self.inner.commit(object_id, target, metadata, entries, overwrite)
        }
    }

    #[test]
    fn concurrent_update_surfaces_out_of_sync() {
        let inner = InMemoryObjectStore::new();
        inner
            .commit(
                "obj:1",
                TargetVersion::New,
                &VersionMetadata::new(),
                vec![entry("a.txt", b"abc")],
                false,
            )
            .unwrap();
        let store = RacingStore::new(inner);

        // The interloper commits v2 right after our pre-check reads v1.
        let outcome = commit(
            &store,
            WriteMethod::Update,
            request("obj:1", vec![entry("b.txt", b"xyz")], false),
        )
        .unwrap();
        match outcome {
            CommitOutcome::Conflict(msg) => assert!(msg.contains("out of sync"), "{msg}"),
            other => panic!("expected conflict, got {other:?}"),
        }
        // The interloper's version is the head; ours never landed.
        assert_eq!(store.inner.head_version("obj:1").unwrap().unwrap().number(), 2);
        assert!(store.inner.file_content("obj:1", "b.txt").is_err());
    }
}
