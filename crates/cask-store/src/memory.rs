use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Cursor;
use std::sync::RwLock;

use bytes::Bytes;
use cask_types::{DigestAlgorithm, VersionMetadata, VersionNum};
use chrono::{DateTime, Utc};

use crate::error::{CommitError, StoreError, StoreResult};
use crate::source::FileEntry;
use crate::traits::{FileContent, FileInfo, ObjectStore, TargetVersion};

/// In-memory, versioned object store.
///
/// Intended for tests and embedding. Objects live behind a `RwLock`; the
/// write lock serializes commits, which is what turns a stale
/// [`TargetVersion`] into an [`CommitError::OutOfSync`] rejection for the
/// losing writer.
pub struct InMemoryObjectStore {
    algorithm: DigestAlgorithm,
    objects: RwLock<HashMap<String, StoredObject>>,
}

struct StoredObject {
    versions: Vec<VersionRecord>,
}

impl StoredObject {
    fn head(&self) -> &VersionRecord {
        self.versions.last().expect("object has at least one version")
    }
}

struct VersionRecord {
    num: VersionNum,
    metadata: VersionMetadata,
    files: BTreeMap<String, StoredFile>,
}

#[derive(Clone)]
struct StoredFile {
    data: Bytes,
    digest: String,
    // Instant of the version that last changed this file's content.
    last_modified: DateTime<Utc>,
}

impl InMemoryObjectStore {
    /// Create an empty store using sha256 as the primary fixity algorithm.
    pub fn new() -> Self {
        Self::with_digest_algorithm(DigestAlgorithm::Sha256)
    }

    /// Create an empty store with an explicit primary fixity algorithm.
    pub fn with_digest_algorithm(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// The primary fixity algorithm for this store.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Number of objects with at least one committed version.
    pub fn object_count(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no object has been committed yet.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Metadata recorded for one committed version.
    pub fn version_metadata(&self, object_id: &str, version: VersionNum) -> Option<VersionMetadata> {
        let map = self.objects.read().expect("lock poisoned");
        map.get(object_id)?
            .versions
            .iter()
            .find(|v| v.num == version)
            .map(|v| v.metadata.clone())
    }

    /// Drain and hash every staged source. Runs before the write lock is
    /// taken so slow or failing reads never stall other writers.
    fn drain_entries(
        &self,
        entries: Vec<FileEntry>,
    ) -> Result<Vec<(String, StoredFile)>, CommitError> {
        let now = Utc::now();
        let mut drained = Vec::with_capacity(entries.len());
        for mut entry in entries {
            let data = entry
                .source
                .read_to_vec()
                .map_err(CommitError::from_read_error)?;
            let digest = self.algorithm.hash_hex(&data);
            drained.push((
                entry.name,
                StoredFile {
                    data: Bytes::from(data),
                    digest,
                    last_modified: now,
                },
            ));
        }
        Ok(drained)
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn contains_object(&self, object_id: &str) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(object_id))
    }

    fn head_version(&self, object_id: &str) -> StoreResult<Option<VersionNum>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(object_id).map(|obj| obj.head().num))
    }

    fn current_version_files(
        &self,
        object_id: &str,
        include_deleted: bool,
    ) -> StoreResult<Vec<FileInfo>> {
        let map = self.objects.read().expect("lock poisoned");
        let obj = map
            .get(object_id)
            .ok_or_else(|| StoreError::ObjectNotFound(object_id.to_string()))?;
        if !include_deleted {
            return Ok(obj
                .head()
                .files
                .iter()
                .map(|(path, file)| FileInfo {
                    path: path.clone(),
                    digest: file.digest.clone(),
                })
                .collect());
        }
        // Every path that ever appeared, with the digest of its most recent
        // occurrence.
        let mut paths = BTreeSet::new();
        for version in &obj.versions {
            paths.extend(version.files.keys().cloned());
        }
        Ok(paths
            .into_iter()
            .map(|path| {
                let digest = obj
                    .versions
                    .iter()
                    .rev()
                    .find_map(|v| v.files.get(&path))
                    .map(|f| f.digest.clone())
                    .unwrap_or_default();
                FileInfo { path, digest }
            })
            .collect())
    }

    fn file_content(&self, object_id: &str, path: &str) -> StoreResult<FileContent> {
        let map = self.objects.read().expect("lock poisoned");
        let obj = map
            .get(object_id)
            .ok_or_else(|| StoreError::ObjectNotFound(object_id.to_string()))?;
        let head = obj.head();
        let file = head.files.get(path).ok_or_else(|| StoreError::FileNotFound {
            object_id: object_id.to_string(),
            path: path.to_string(),
        })?;
        let mut fixity = BTreeMap::new();
        fixity.insert(self.algorithm, file.digest.clone());
        Ok(FileContent {
            reader: Box::new(Cursor::new(file.data.clone())),
            size: file.data.len() as u64,
            digest_algorithm: self.algorithm,
            digest: file.digest.clone(),
            storage_relative_path: format!("{object_id}/{}/content/{path}", head.num),
            fixity,
        })
    }

    fn most_recent_change(&self, object_id: &str, path: &str) -> StoreResult<DateTime<Utc>> {
        let map = self.objects.read().expect("lock poisoned");
        let obj = map
            .get(object_id)
            .ok_or_else(|| StoreError::ObjectNotFound(object_id.to_string()))?;
        let file = obj
            .head()
            .files
            .get(path)
            .ok_or_else(|| StoreError::FileNotFound {
                object_id: object_id.to_string(),
                path: path.to_string(),
            })?;
        Ok(file.last_modified)
    }

    fn commit(
        &self,
        object_id: &str,
        target: TargetVersion,
        metadata: &VersionMetadata,
        entries: Vec<FileEntry>,
        overwrite: bool,
    ) -> Result<VersionNum, CommitError> {
        let drained = self.drain_entries(entries)?;

        let mut map = self.objects.write().expect("lock poisoned");
        let (num, mut files) = match target {
            TargetVersion::New => {
                if map.contains_key(object_id) {
                    return Err(CommitError::OutOfSync(object_id.to_string()));
                }
                (VersionNum::first(), BTreeMap::new())
            }
            TargetVersion::Expect(expected) => {
                let obj = map
                    .get(object_id)
                    .ok_or_else(|| CommitError::OutOfSync(object_id.to_string()))?;
                let head = obj.head();
                if head.num != expected {
                    return Err(CommitError::OutOfSync(object_id.to_string()));
                }
                if !overwrite {
                    // Only reachable when the caller skipped its collision
                    // check: the Expect precondition freezes the head.
                    if let Some((name, _)) =
                        drained.iter().find(|(name, _)| head.files.contains_key(name))
                    {
                        tracing::warn!(object_id, file = %name, "uncoordinated overwrite refused");
                        return Err(CommitError::OutOfSync(object_id.to_string()));
                    }
                }
                (expected.next(), head.files.clone())
            }
        };

        for (name, staged) in drained {
            match files.get(&name) {
                // Identical content: the file did not change in this version,
                // so its last-modified instant is preserved.
                Some(existing) if existing.digest == staged.digest => {}
                _ => {
                    files.insert(name, staged);
                }
            }
        }

        map.entry(object_id.to_string())
            .or_insert_with(|| StoredObject { versions: Vec::new() })
            .versions
            .push(VersionRecord {
                num,
                metadata: metadata.clone(),
                files,
            });
        tracing::debug!(object_id, version = %num, "committed version");
        Ok(num)
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("algorithm", &self.algorithm)
            .field("object_count", &self.object_count())
            .finish()
    }
}
