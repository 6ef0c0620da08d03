use axum::{
    extract::State,
    http::StatusCode,
    routing::patch,
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{PublicUser, UpdateUserRequest},
    services::UserService,
};
use crate::{auth::extractors::AuthUser, error::AppError, state::AppState};

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/users/me", patch(update_me).delete(delete_me))
}

#[instrument(skip(users, payload))]
pub async fn update_me(
    State(users): State<UserService>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>, AppError> {
    let user = users.update(user_id, payload).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(users))]
pub async fn delete_me(
    State(users): State<UserService>,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, AppError> {
    users.delete(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
