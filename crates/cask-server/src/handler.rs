use std::io::BufRead;
use std::io::BufReader;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use cask_store::{FileContent, ObjectStore};
use cask_types::VersionMetadata;
use futures_util::stream;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::json;

use crate::config::GatewayConfig;
use crate::coordinator::{self, CommitOutcome, IngestionRequest, WriteMethod};
use crate::error::{fixity_message, GatewayError, GatewayResult};
use crate::ingest;
use crate::range::{http_date, plan, CachingContext, Plan, RequestConditions};
use crate::resolve::{resolve_content_type, SNIFF_LEN};
use crate::stream::SpanChunks;

/// Shared per-process state: the injected store and static configuration.
/// The store is the only component whose lifetime outlives a request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub config: Arc<GatewayConfig>,
}

// RFC 5987 attr-char: what may stay literal in `filename*=UTF-8''...`.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// `GET /` — report the store root path.
pub async fn storage_root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "storageRoot": state.config.storage_root.display().to_string() }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    #[serde(rename = "includeDeleted")]
    pub include_deleted: Option<String>,
}

/// `GET /{objectId}/files` — list the current version's file paths.
pub async fn list_files(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
    Query(params): Query<ListParams>,
) -> GatewayResult<Response> {
    let include_deleted = yes_flag(params.include_deleted.as_deref());
    let files = state
        .store
        .current_version_files(&object_id, include_deleted)?;
    let listing: serde_json::Map<String, serde_json::Value> =
        files.into_iter().map(|f| (f.path, json!({}))).collect();
    Ok(Json(json!({ "files": listing })).into_response())
}

/// Version-write request parameters, shared by POST and PUT.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WriteParams {
    pub message: Option<String>,
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
    #[serde(rename = "userAddress")]
    pub user_address: Option<String>,
    #[serde(rename = "updateExisting")]
    pub update_existing: Option<String>,
}

impl WriteParams {
    fn metadata(&self) -> VersionMetadata {
        VersionMetadata {
            message: owned_non_empty(self.message.as_deref()),
            user_name: owned_non_empty(self.user_name.as_deref()),
            user_address: owned_non_empty(self.user_address.as_deref()),
        }
    }
}

/// `POST /{objectId}/files` — create a new object from a multipart upload.
pub async fn create_object(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
    Query(params): Query<WriteParams>,
    multipart: Multipart,
) -> GatewayResult<Response> {
    ingest_and_commit(state, WriteMethod::Create, object_id, params, multipart).await
}

/// `PUT /{objectId}/files` — commit a new version of an existing object.
pub async fn update_object(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
    Query(params): Query<WriteParams>,
    multipart: Multipart,
) -> GatewayResult<Response> {
    ingest_and_commit(state, WriteMethod::Update, object_id, params, multipart).await
}

async fn ingest_and_commit(
    state: AppState,
    method: WriteMethod,
    object_id: String,
    params: WriteParams,
    multipart: Multipart,
) -> GatewayResult<Response> {
    let entries = ingest::assemble(multipart, &state.config.upload_allow_dirs).await?;
    let request = IngestionRequest {
        object_id,
        entries,
        metadata: params.metadata(),
        overwrite_existing: yes_flag(params.update_existing.as_deref()),
    };
    let outcome = coordinator::commit(state.store.as_ref(), method, request)?;
    Ok(match outcome {
        CommitOutcome::Created(_) => StatusCode::CREATED.into_response(),
        CommitOutcome::Conflict(message) => (StatusCode::CONFLICT, message).into_response(),
        CommitOutcome::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
        CommitOutcome::Fixity {
            algorithm,
            expected,
            actual,
        } => (
            StatusCode::CONFLICT,
            fixity_message(algorithm, &expected, &actual),
        )
            .into_response(),
    })
}

/// `GET|HEAD /{objectId}/files/{path}/content` — serve one stored file with
/// range and conditional-GET semantics.
///
/// The wildcard tail carries `<path>/content`, letting file paths contain
/// slashes. A tail without the `/content` suffix is an unmatched route.
pub async fn file_content(
    State(state): State<AppState>,
    method: Method,
    Path((object_id, tail)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let Some(path) = tail.strip_suffix("/content").filter(|p| !p.is_empty()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match serve_file(&state, &method, &object_id, path, &headers) {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

fn serve_file(
    state: &AppState,
    method: &Method,
    object_id: &str,
    path: &str,
    headers: &HeaderMap,
) -> GatewayResult<Response> {
    let content = state.store.file_content(object_id, path)?;
    let last_modified = state.store.most_recent_change(object_id, path)?;
    let caching = CachingContext {
        etag: content.digest.clone(),
        last_modified,
    };
    let size = content.size;

    match plan(&RequestConditions::from_headers(headers), size, &caching) {
        Plan::NotModified => not_modified(&caching),
        Plan::Unsatisfiable => Err(GatewayError::RangeNotSatisfiable { size }),
        Plan::Full => send_span(state, method, content, &caching, path, Span::full(size)),
        Plan::Partial { start, end } => {
            send_span(state, method, content, &caching, path, Span::partial(start, end, size))
        }
    }
}

struct Span {
    start: u64,
    end: u64,
    size: u64,
    full: bool,
}

impl Span {
    fn full(size: u64) -> Self {
        Self {
            start: 0,
            end: size.saturating_sub(1),
            size,
            full: true,
        }
    }

    fn partial(start: u64, end: u64, size: u64) -> Self {
        Self { start, end, size, full: false }
    }

    fn len(&self) -> u64 {
        if self.size == 0 {
            0
        } else {
            self.end.saturating_add(1).saturating_sub(self.start)
        }
    }
}

fn send_span(
    state: &AppState,
    method: &Method,
    content: FileContent,
    caching: &CachingContext,
    path: &str,
    span: Span,
) -> GatewayResult<Response> {
    // The buffered wrapper lets the resolver peek the leading bytes without
    // consuming them; streaming then starts from byte zero.
    let mut reader = BufReader::new(content.reader);
    let head: Vec<u8> = reader.fill_buf()?.iter().take(SNIFF_LEN).copied().collect();
    let content_type = resolve_content_type(&head, path);

    let status = if span.full {
        StatusCode::OK
    } else {
        StatusCode::PARTIAL_CONTENT
    };
    let body = if *method == Method::HEAD || span.len() == 0 {
        Body::empty()
    } else {
        Body::from_stream(stream::iter(SpanChunks::new(
            reader,
            span.start,
            span.end,
            state.config.chunk_size,
        )))
    };

    let mut response = (status, body).into_response();
    set_header(&mut response, header::ACCEPT_RANGES, "bytes".to_string())?;
    set_header(&mut response, header::CONTENT_TYPE, content_type)?;
    set_header(&mut response, header::CONTENT_LENGTH, span.len().to_string())?;
    set_header(&mut response, header::ETAG, format!("\"{}\"", caching.etag))?;
    set_header(
        &mut response,
        header::LAST_MODIFIED,
        http_date(caching.last_modified),
    )?;
    if span.full {
        set_header(
            &mut response,
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename*=UTF-8''{}",
                utf8_percent_encode(path, ATTR_CHAR)
            ),
        )?;
    } else {
        set_header(
            &mut response,
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", span.start, span.end, span.size),
        )?;
    }
    Ok(response)
}

fn not_modified(caching: &CachingContext) -> GatewayResult<Response> {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    set_header(&mut response, header::ETAG, format!("\"{}\"", caching.etag))?;
    set_header(
        &mut response,
        header::LAST_MODIFIED,
        http_date(caching.last_modified),
    )?;
    Ok(response)
}

fn set_header(
    response: &mut Response,
    name: header::HeaderName,
    value: String,
) -> GatewayResult<()> {
    let value = axum::http::HeaderValue::try_from(value)
        .map_err(|e| GatewayError::Internal(format!("invalid {name} header: {e}")))?;
    response.headers_mut().insert(name, value);
    Ok(())
}

fn yes_flag(value: Option<&str>) -> bool {
    matches!(value, Some("yes"))
}

fn owned_non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_flag_requires_exact_yes() {
        assert!(yes_flag(Some("yes")));
        assert!(!yes_flag(Some("true")));
        assert!(!yes_flag(Some("YES")));
        assert!(!yes_flag(Some("")));
        assert!(!yes_flag(None));
    }

    #[test]
    fn metadata_drops_empty_values() {
        let params = WriteParams {
            message: Some("load".into()),
            user_name: Some("   ".into()),
            user_address: None,
            update_existing: None,
        };
        let meta = params.metadata();
        assert_eq!(meta.message.as_deref(), Some("load"));
        assert!(meta.user_name.is_none());
        assert!(meta.user_address.is_none());
    }

    #[test]
    fn span_lengths() {
        assert_eq!(Span::full(10).len(), 10);
        assert_eq!(Span::full(0).len(), 0);
        assert_eq!(Span::partial(2, 5, 10).len(), 4);
        assert_eq!(Span::partial(9, 9, 10).len(), 1);
    }

    #[test]
    fn attachment_filename_is_rfc5987_encoded() {
        let encoded = utf8_percent_encode("dir/å b.txt", ATTR_CHAR).to_string();
        assert_eq!(encoded, "dir%2F%C3%A5%20b.txt");
    }
}
