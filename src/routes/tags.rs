use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{NewTag, Tag};
use crate::routes::documents::{load_owned_document, TagInput, TagResponse};
use crate::schema::tags;
use crate::state::AppState;

pub async fn attach_tag(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<TagInput>,
) -> AppResult<(StatusCode, Json<TagResponse>)> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("tag name must not be empty"));
    }

    let mut conn = state.db()?;
    load_owned_document(&mut conn, document_id, user.user_id)?;

    let new_tag = NewTag {
        id: Uuid::new_v4(),
        document_id,
        name,
        color: payload.color,
    };

    match diesel::insert_into(tags::table)
        .values(&new_tag)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => {
            return Err(AppError::conflict(
                "tag with this name already exists on the document",
            ));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let tag: Tag = tags::table.find(new_tag.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(TagResponse::from(tag))))
}

pub async fn detach_tag(
    State(state): State<AppState>,
    Path((document_id, tag_id)): Path<(Uuid, Uuid)>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    load_owned_document(&mut conn, document_id, user.user_id)?;

    let deleted = diesel::delete(
        tags::table
            .filter(tags::id.eq(tag_id))
            .filter(tags::document_id.eq(document_id)),
    )
    .execute(&mut conn)?;

    if deleted == 0 {
        return Err(AppError::not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}
