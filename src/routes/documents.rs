use std::collections::HashMap;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use diesel::result::DatabaseErrorKind;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Document, NewDocument, NewTag, Report, Tag};
use crate::routes::reports::{load_owned_report, to_iso};
use crate::schema::{documents, reports, tags};
use crate::state::AppState;

pub const DUPLICATE_FILE_MESSAGE: &str =
    "a document with identical content already exists in this report";

#[derive(Deserialize)]
pub struct TagInput {
    pub name: String,
    pub color: Option<String>,
}

#[derive(Serialize)]
pub struct TagResponse {
    pub id: Uuid,
    pub name: String,
    pub color: Option<String>,
}

impl From<Tag> for TagResponse {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            color: tag.color,
        }
    }
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub report_id: Uuid,
    pub filename: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub parsed_text: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
    pub tags: Vec<TagResponse>,
}

struct UploadRequest {
    bytes: Vec<u8>,
    filename: String,
    mime_type: String,
    tags: Vec<TagInput>,
}

pub async fn upload_document(
    State(state): State<AppState>,
    Path(report_id): Path<Uuid>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut tag_inputs: Vec<TagInput> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                filename = field.file_name().map(|n| n.to_string());
                content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("tags") => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid tags payload: {err}"))
                })?;
                tag_inputs = serde_json::from_str(&value).map_err(|err| {
                    AppError::bad_request(format!("tags must be a JSON array: {err}"))
                })?;
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| AppError::bad_request("file field is required"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("file field must not be empty"));
    }
    let filename = filename
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::bad_request("filename is required"))?;

    validate_tag_inputs(&mut tag_inputs)?;

    let mime_type = content_type.unwrap_or_else(|| infer_mime_type(&filename));

    let request = UploadRequest {
        bytes,
        filename,
        mime_type,
        tags: tag_inputs,
    };

    let filename_for_log = request.filename.clone();
    match process_upload(&state, report_id, user.user_id, request).await {
        Ok(response) => {
            info!(
                document_id = %response.id,
                report_id = %report_id,
                filename = %response.filename,
                size_bytes = response.size_bytes,
                "document upload succeeded"
            );
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(err) => {
            error!(error = ?err, report_id = %report_id, filename = %filename_for_log, "document upload failed");
            Err(err)
        }
    }
}

async fn process_upload(
    state: &AppState,
    report_id: Uuid,
    user_id: Uuid,
    request: UploadRequest,
) -> AppResult<DocumentResponse> {
    let UploadRequest {
        bytes,
        filename,
        mime_type,
        tags: tag_inputs,
    } = request;

    let content_hash = hex::encode(Sha256::digest(&bytes));
    let size_bytes = bytes.len() as i64;
    let document_id = Uuid::new_v4();
    let storage_path = format!("documents/{report_id}/{document_id}");

    {
        let mut conn = state.db()?;
        load_owned_report(&mut conn, report_id, user_id)?;

        // Fast path for the common case. The partial unique index on
        // (report_id, content_hash) remains the authoritative guard when two
        // identical uploads race past this check.
        let duplicate: Option<Uuid> = documents::table
            .filter(documents::report_id.eq(report_id))
            .filter(documents::content_hash.eq(&content_hash))
            .filter(documents::deleted_at.is_null())
            .select(documents::id)
            .first(&mut conn)
            .optional()?;

        if duplicate.is_some() {
            return Err(AppError::conflict(DUPLICATE_FILE_MESSAGE));
        }
    }

    let parsed_text = match state.extractor.extract(&bytes, &mime_type).await {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, report_id = %report_id, "text extraction failed, storing without parsed text");
            None
        }
    };

    state
        .storage
        .put_object(&storage_path, bytes)
        .await
        .map_err(|err| {
            error!(error = %err, key = %storage_path, "failed to store document");
            AppError::internal(format!("failed to store document: {err}"))
        })?;

    let insert_result = {
        let mut conn = state.db()?;
        conn.transaction::<(Document, Vec<Tag>), diesel::result::Error, _>(|conn| {
            let new_document = NewDocument {
                id: document_id,
                report_id,
                filename: filename.clone(),
                content_hash: content_hash.clone(),
                storage_path: storage_path.clone(),
                size_bytes,
                mime_type: mime_type.clone(),
                parsed_text: parsed_text.clone(),
            };
            diesel::insert_into(documents::table)
                .values(&new_document)
                .execute(conn)?;

            let new_tags: Vec<NewTag> = tag_inputs
                .iter()
                .map(|input| NewTag {
                    id: Uuid::new_v4(),
                    document_id,
                    name: input.name.clone(),
                    color: input.color.clone(),
                })
                .collect();

            if !new_tags.is_empty() {
                diesel::insert_into(tags::table)
                    .values(&new_tags)
                    .execute(conn)?;
            }

            let document: Document = documents::table.find(document_id).first(conn)?;
            let tag_rows: Vec<Tag> = tags::table
                .filter(tags::document_id.eq(document_id))
                .order(tags::created_at.asc())
                .load(conn)?;

            Ok((document, tag_rows))
        })
    };

    match insert_result {
        Ok((document, tag_rows)) => Ok(to_document_response(document, tag_rows)),
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            // Lost the race against a concurrent identical upload. The row
            // that won keeps its blob; ours is orphaned and gets removed.
            if let Err(err) = state.storage.delete_object(&storage_path).await {
                warn!(error = %err, key = %storage_path, "failed to remove orphaned blob after duplicate insert");
            }
            Err(AppError::conflict(DUPLICATE_FILE_MESSAGE))
        }
        Err(err) => Err(AppError::from(err)),
    }
}

pub async fn list_report_documents(
    State(state): State<AppState>,
    Path(report_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let mut conn = state.db()?;
    load_owned_report(&mut conn, report_id, user.user_id)?;

    let docs: Vec<Document> = documents::table
        .filter(documents::report_id.eq(report_id))
        .filter(documents::deleted_at.is_null())
        .order(documents::created_at.desc())
        .load(&mut conn)?;

    let doc_ids: Vec<Uuid> = docs.iter().map(|doc| doc.id).collect();
    let mut tags_map = load_tags_for_documents(&mut conn, &doc_ids)?;

    let response = docs
        .into_iter()
        .map(|doc| {
            let tags = tags_map.remove(&doc.id).unwrap_or_default();
            to_document_response(doc, tags)
        })
        .collect();

    Ok(Json(response))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let (document, _report) = load_owned_document(&mut conn, document_id, user.user_id)?;

    let mut tags_map = load_tags_for_documents(&mut conn, &[document_id])?;
    let tags = tags_map.remove(&document_id).unwrap_or_default();

    Ok(Json(to_document_response(document, tags)))
}

pub async fn download_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;
    let (document, _report) = load_owned_document(&mut conn, document_id, user.user_id)?;
    drop(conn);

    let bytes = state
        .storage
        .get_object(&document.storage_path)
        .await
        .map_err(|err| {
            error!(error = %err, key = %document.storage_path, "failed to read stored document");
            AppError::internal(format!("failed to read stored document: {err}"))
        })?;

    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_str(&document.mime_type)
            .unwrap_or_else(|_| header::HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(disposition) = attachment_content_disposition(&document.filename) {
        if let Ok(value) = header::HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }

    Ok((headers, bytes))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;
    load_owned_document(&mut conn, document_id, user.user_id)?;

    let now = Utc::now().naive_utc();
    diesel::update(documents::table.find(document_id))
        .set((
            documents::deleted_at.eq(Some(now)),
            documents::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    info!(document_id = %document_id, "document soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Loads a document together with its parent report, enforcing soft-delete
/// visibility and report ownership in one place.
pub(crate) fn load_owned_document(
    conn: &mut PgConnection,
    document_id: Uuid,
    user_id: Uuid,
) -> AppResult<(Document, Report)> {
    let (document, report): (Document, Report) = documents::table
        .inner_join(reports::table)
        .filter(documents::id.eq(document_id))
        .select((documents::all_columns, reports::all_columns))
        .first(conn)?;

    if document.deleted_at.is_some() || report.deleted_at.is_some() {
        return Err(AppError::not_found());
    }
    if report.user_id != user_id {
        return Err(AppError::forbidden());
    }

    Ok((document, report))
}

pub(crate) fn load_tags_for_documents(
    conn: &mut PgConnection,
    document_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Vec<Tag>>> {
    if document_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<Tag> = tags::table
        .filter(tags::document_id.eq_any(document_ids))
        .order(tags::created_at.asc())
        .load(conn)?;

    let mut map: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    for tag in rows {
        map.entry(tag.document_id).or_default().push(tag);
    }
    Ok(map)
}

pub(crate) fn to_document_response(document: Document, tag_rows: Vec<Tag>) -> DocumentResponse {
    DocumentResponse {
        id: document.id,
        report_id: document.report_id,
        filename: document.filename,
        content_hash: document.content_hash,
        size_bytes: document.size_bytes,
        mime_type: document.mime_type,
        parsed_text: document.parsed_text,
        created_at: to_iso(document.created_at),
        updated_at: to_iso(document.updated_at),
        deleted_at: document.deleted_at.map(to_iso),
        tags: tag_rows.into_iter().map(TagResponse::from).collect(),
    }
}

pub(crate) fn validate_tag_inputs(inputs: &mut [TagInput]) -> AppResult<()> {
    let mut seen = std::collections::HashSet::new();
    for input in inputs.iter_mut() {
        input.name = input.name.trim().to_string();
        if input.name.is_empty() {
            return Err(AppError::bad_request("tag name must not be empty"));
        }
        if !seen.insert(input.name.clone()) {
            return Err(AppError::bad_request(format!(
                "duplicate tag name '{}'",
                input.name
            )));
        }
    }
    Ok(())
}

fn infer_mime_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

fn attachment_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    ))
}
