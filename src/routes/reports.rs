use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{NewReport, Report};
use crate::routes::documents::{load_tags_for_documents, to_document_response, DocumentResponse};
use crate::schema::{documents, reports};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateReportRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize)]
pub struct UpdateReportRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Serialize)]
pub struct ReportResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Serialize)]
pub struct ReportDetailResponse {
    pub report: ReportResponse,
    pub documents: Vec<DocumentResponse>,
}

pub async fn create_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateReportRequest>,
) -> AppResult<(StatusCode, Json<ReportResponse>)> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let mut conn = state.db()?;
    let new_report = NewReport {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        title: title.to_string(),
        content: payload.content,
    };

    diesel::insert_into(reports::table)
        .values(&new_report)
        .execute(&mut conn)?;

    let report: Report = reports::table.find(new_report.id).first(&mut conn)?;
    info!(report_id = %report.id, user_id = %user.user_id, "report created");

    Ok((StatusCode::CREATED, Json(to_report_response(report))))
}

pub async fn list_reports(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ReportResponse>>> {
    let mut conn = state.db()?;

    let rows: Vec<Report> = reports::table
        .filter(reports::user_id.eq(user.user_id))
        .filter(reports::deleted_at.is_null())
        .order(reports::updated_at.desc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(to_report_response).collect()))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(report_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<ReportDetailResponse>> {
    let mut conn = state.db()?;
    let report = load_owned_report(&mut conn, report_id, user.user_id)?;

    let docs: Vec<crate::models::Document> = documents::table
        .filter(documents::report_id.eq(report_id))
        .filter(documents::deleted_at.is_null())
        .order(documents::created_at.desc())
        .load(&mut conn)?;

    let doc_ids: Vec<Uuid> = docs.iter().map(|doc| doc.id).collect();
    let mut tags_map = load_tags_for_documents(&mut conn, &doc_ids)?;

    let documents = docs
        .into_iter()
        .map(|doc| {
            let tags = tags_map.remove(&doc.id).unwrap_or_default();
            to_document_response(doc, tags)
        })
        .collect();

    Ok(Json(ReportDetailResponse {
        report: to_report_response(report),
        documents,
    }))
}

pub async fn update_report(
    State(state): State<AppState>,
    Path(report_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateReportRequest>,
) -> AppResult<Json<ReportResponse>> {
    let new_title = match payload.title {
        Some(ref title) => {
            let trimmed = title.trim();
            if trimmed.is_empty() {
                return Err(AppError::bad_request("title must not be empty"));
            }
            Some(trimmed.to_string())
        }
        None => None,
    };

    if new_title.is_none() && payload.content.is_none() {
        return Err(AppError::bad_request("no changes provided"));
    }

    let mut conn = state.db()?;
    load_owned_report(&mut conn, report_id, user.user_id)?;

    let now = Utc::now().naive_utc();
    if let Some(title) = new_title.as_ref() {
        diesel::update(reports::table.find(report_id))
            .set((reports::title.eq(title), reports::updated_at.eq(now)))
            .execute(&mut conn)?;
    }
    if let Some(content) = payload.content.as_ref() {
        diesel::update(reports::table.find(report_id))
            .set((reports::content.eq(content), reports::updated_at.eq(now)))
            .execute(&mut conn)?;
    }

    let report: Report = reports::table.find(report_id).first(&mut conn)?;
    Ok(Json(to_report_response(report)))
}

pub async fn delete_report(
    State(state): State<AppState>,
    Path(report_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;
    load_owned_report(&mut conn, report_id, user.user_id)?;

    let now = Utc::now().naive_utc();
    diesel::update(reports::table.find(report_id))
        .set((
            reports::deleted_at.eq(Some(now)),
            reports::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    info!(report_id = %report_id, user_id = %user.user_id, "report soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Loads a report and enforces the two read-path invariants: soft-deleted
/// rows read as absent, and only the owner may see the row at all.
pub(crate) fn load_owned_report(
    conn: &mut PgConnection,
    report_id: Uuid,
    user_id: Uuid,
) -> AppResult<Report> {
    let report: Report = reports::table.find(report_id).first(conn)?;
    if report.deleted_at.is_some() {
        return Err(AppError::not_found());
    }
    if report.user_id != user_id {
        return Err(AppError::forbidden());
    }
    Ok(report)
}

pub(crate) fn to_report_response(report: Report) -> ReportResponse {
    ReportResponse {
        id: report.id,
        title: report.title,
        content: report.content,
        created_at: to_iso(report.created_at),
        updated_at: to_iso(report.updated_at),
        deleted_at: report.deleted_at.map(to_iso),
    }
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}
