use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get},
};
use uuid::Uuid;

use crate::{
    dto::wishlist::{AddWishlistRequest, WishlistProductList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::WishlistItem,
    response::ApiResponse,
    routes::params::Pagination,
    services::wishlist_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_wishlist).post(add_to_wishlist))
        .route("/{product_id}", delete(remove_from_wishlist))
}

#[utoipa::path(get, path = "/api/wishlist", security(("bearer_auth" = [])), tag = "Wishlist")]
pub async fn list_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<WishlistProductList>>> {
    let resp = wishlist_service::list_wishlist(&state.pool, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/wishlist",
    request_body = AddWishlistRequest,
    security(("bearer_auth" = [])),
    tag = "Wishlist"
)]
pub async fn add_to_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddWishlistRequest>,
) -> AppResult<Json<ApiResponse<WishlistItem>>> {
    let resp = wishlist_service::add_to_wishlist(&state.pool, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/wishlist/{product_id}",
    security(("bearer_auth" = [])),
    tag = "Wishlist"
)]
pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = wishlist_service::remove_from_wishlist(&state.pool, &user, product_id).await?;
    Ok(Json(resp))
}
