use axum::{extract::State, http::StatusCode, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{oauth::OAuthError, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{NewUser, User},
    schema::users,
    state::AppState,
};

#[derive(Deserialize)]
pub struct SignInRequest {
    pub provider: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct SignInResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub provider: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            provider: user.provider,
        }
    }
}

pub async fn signin(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> AppResult<(StatusCode, Json<SignInResponse>)> {
    let provider = payload.provider.trim().to_lowercase();

    let profile = state
        .oauth
        .exchange_code(&provider, &payload.code)
        .await
        .map_err(|err| match err {
            OAuthError::UnknownProvider(_) | OAuthError::ProviderNotConfigured(_) => {
                AppError::bad_request(err.to_string())
            }
            OAuthError::MissingEmail => AppError::bad_request(err.to_string()),
            OAuthError::Exchange(_) => AppError::unauthorized(),
        })?;

    let mut conn = state.db()?;

    let existing: Option<User> = users::table
        .filter(users::email.eq(&profile.email))
        .first(&mut conn)
        .optional()?;

    let (user, created) = match existing {
        Some(user) => {
            // Provider and email are immutable after the first sign-in.
            if user.provider != provider {
                return Err(AppError::conflict(format!(
                    "account already registered via '{}'",
                    user.provider
                )));
            }
            (user, false)
        }
        None => {
            let new_user = NewUser {
                id: Uuid::new_v4(),
                email: profile.email.clone(),
                name: profile.name.clone(),
                provider: provider.clone(),
            };
            diesel::insert_into(users::table)
                .values(&new_user)
                .execute(&mut conn)?;
            let user: User = users::table.find(new_user.id).first(&mut conn)?;
            info!(user_id = %user.id, provider = %provider, "user created on first sign-in");
            (user, true)
        }
    };
    drop(conn);

    if created {
        if let Err(err) = state.mailer.send_welcome(&user.email, &user.name).await {
            warn!(error = %err, user_id = %user.id, "failed to send welcome email");
        }
    }

    let access_token = state
        .jwt
        .generate_token(user.id, &user.email, &user.name)
        .map_err(AppError::from)?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(SignInResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.jwt_expiry_minutes * 60,
            user: UserResponse::from(user),
        }),
    ))
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}
