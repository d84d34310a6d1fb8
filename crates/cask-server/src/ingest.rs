use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use bytes::Bytes;
use cask_store::{ByteSource, FileEntry};
use cask_types::DigestAlgorithm;
use percent_encoding::percent_decode_str;
use serde::Deserialize;

use crate::error::{GatewayError, GatewayResult};

/// Multipart part carrying the per-file descriptor document.
pub const PARAMS_PART: &str = "params";
/// Multipart parts carrying inline file bodies.
pub const FILES_PART: &str = "files";

/// Per-file descriptor from the `params` part. All fields optional; an empty
/// string counts as absent.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileDescriptor {
    /// URI-encoded filesystem path to read the file from instead of an
    /// inline body.
    pub location: Option<String>,
    /// Expected digest of the file's bytes, verified during commit.
    pub checksum: Option<String>,
    /// Digest algorithm for `checksum`; md5 when omitted.
    #[serde(rename = "checksumType")]
    pub checksum_type: Option<String>,
}

/// Parse a multipart upload into staged file entries.
///
/// All-or-nothing: on any failure every source opened so far, inline and
/// file-backed alike, is dropped (closed) before the error is surfaced, and
/// no partial result is ever returned. Duplicate file names are
/// last-write-wins, keeping the first occurrence's position.
pub async fn assemble(
    mut multipart: Multipart,
    allowed_dirs: &[PathBuf],
) -> GatewayResult<Vec<FileEntry>> {
    let mut entries: Vec<FileEntry> = Vec::new();
    let mut descriptors: BTreeMap<String, Option<FileDescriptor>> = BTreeMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("malformed multipart request: {e}")))?
    {
        let part_name = field.name().map(str::to_owned);
        match part_name.as_deref() {
            Some(PARAMS_PART) => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| GatewayError::BadRequest(format!("unreadable params part: {e}")))?;
                descriptors = serde_json::from_slice(&data)
                    .map_err(|e| GatewayError::BadRequest(format!("invalid params document: {e}")))?;
            }
            Some(FILES_PART) => {
                let name = field
                    .file_name()
                    .map(str::to_owned)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        GatewayError::BadRequest("file part is missing a filename".into())
                    })?;
                let data = field.bytes().await.map_err(|e| {
                    GatewayError::BadRequest(format!("unreadable body for file {name}: {e}"))
                })?;
                stage(&mut entries, FileEntry::new(name, ByteSource::inline(data)));
            }
            other => {
                tracing::debug!(part = ?other, "ignoring unrecognized multipart part");
            }
        }
    }

    apply_descriptors(entries, descriptors, allowed_dirs)
}

/// Insert an entry, replacing any earlier entry with the same name in place.
fn stage(entries: &mut Vec<FileEntry>, entry: FileEntry) {
    match entries.iter_mut().find(|e| e.name == entry.name) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

fn apply_descriptors(
    mut entries: Vec<FileEntry>,
    descriptors: BTreeMap<String, Option<FileDescriptor>>,
    allowed_dirs: &[PathBuf],
) -> GatewayResult<Vec<FileEntry>> {
    for (name, descriptor) in descriptors {
        let descriptor = descriptor.unwrap_or_default();
        let location = non_empty(descriptor.location.as_deref());
        let checksum = non_empty(descriptor.checksum.as_deref());

        let position = entries.iter().position(|e| e.name == name);
        if location.is_none() && checksum.is_none() {
            if position.is_none() {
                return Err(GatewayError::BadRequest(format!(
                    "no content supplied for file {name}"
                )));
            }
            continue;
        }

        // A location reference replaces any inline body for the same name.
        let base = match location {
            Some(raw) => open_location(raw, allowed_dirs)?,
            None => match position {
                Some(i) => std::mem::replace(&mut entries[i].source, ByteSource::inline(Bytes::new())),
                None => {
                    return Err(GatewayError::BadRequest(format!(
                        "no content supplied for file {name}"
                    )))
                }
            },
        };

        let source = match checksum {
            Some(expected) => {
                let algorithm = match non_empty(descriptor.checksum_type.as_deref()) {
                    Some(spec) => spec
                        .parse::<DigestAlgorithm>()
                        .map_err(|e| GatewayError::BadRequest(e.to_string()))?,
                    None => DigestAlgorithm::Md5,
                };
                base.with_checksum(algorithm, expected)
            }
            None => base,
        };

        match position {
            Some(i) => entries[i].source = source,
            None => entries.push(FileEntry::new(name, source)),
        }
    }
    Ok(entries)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Decode a URI-encoded location and open it for reading, enforcing the
/// upload-directory allow-list when one is configured.
fn open_location(raw: &str, allowed_dirs: &[PathBuf]) -> GatewayResult<ByteSource> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| GatewayError::InvalidLocation(format!("invalid file location {raw}")))?;
    let path = PathBuf::from(decoded.as_ref());

    if !allowed_dirs.is_empty() {
        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        if !allowed_dirs.iter().any(|dir| parent.starts_with(dir)) {
            return Err(GatewayError::UploadDirNotAllowed(path.display().to_string()));
        }
    }

    match ByteSource::from_path(&path) {
        Ok(source) => Ok(source),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(GatewayError::InvalidLocation(
            format!("no file exists at {}", path.display()),
        )),
        Err(e) => Err(e.into()),
    }
}
