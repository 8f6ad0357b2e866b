use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query},
    http::StatusCode,
    routing::get,
};
use tracing::instrument;

#[cfg(test)]
use crate::services::MockPostStore as PostStore;
#[cfg(not(test))]
use crate::services::PostStore;
use crate::services::{
    ListQuery, NewPost, Post, PostChanges, PostWithVotes, Principal, StoreError,
};

pub fn post_routes() -> Router {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
}

#[instrument(level = "debug", skip(post_store))]
async fn list_posts(
    Extension(post_store): Extension<Arc<PostStore>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PostWithVotes>>, StoreError> {
    post_store.list(&principal, &query).await.map(Json)
}

#[instrument(level = "debug", skip(post_store))]
async fn create_post(
    Extension(post_store): Extension<Arc<PostStore>>,
    Extension(principal): Extension<Principal>,
    Json(new_post): Json<NewPost>,
) -> Result<(StatusCode, Json<Post>), StoreError> {
    let post = post_store.create(&principal, new_post).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

#[instrument(level = "debug", skip(post_store))]
async fn get_post(
    Extension(post_store): Extension<Arc<PostStore>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i32>,
) -> Result<Json<PostWithVotes>, StoreError> {
    post_store.get(&principal, id).await.map(Json)
}

#[instrument(level = "debug", skip(post_store))]
async fn update_post(
    Extension(post_store): Extension<Arc<PostStore>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i32>,
    Json(changes): Json<PostChanges>,
) -> Result<Json<Post>, StoreError> {
    post_store.update(&principal, id, changes).await.map(Json)
}

#[instrument(level = "debug", skip(post_store))]
async fn delete_post(
    Extension(post_store): Extension<Arc<PostStore>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i32>,
) -> Result<StatusCode, StoreError> {
    post_store.delete(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
