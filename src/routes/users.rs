use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    routing::{get, post},
};
use tracing::instrument;

#[cfg(test)]
use crate::services::MockUserStore as UserStore;
#[cfg(not(test))]
use crate::services::UserStore;
use crate::services::{NewUser, StoreError, User};

pub fn user_routes() -> Router {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/{id}", get(get_user))
}

#[instrument(level = "debug", skip(user_store))]
async fn create_user(
    Extension(user_store): Extension<Arc<UserStore>>,
    Json(new_user): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), StoreError> {
    let user = user_store.create(new_user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(level = "debug", skip(user_store))]
async fn get_user(
    Extension(user_store): Extension<Arc<UserStore>>,
    Path(id): Path<i32>,
) -> Result<Json<User>, StoreError> {
    user_store.get(id).await.map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use test_log::test;
    use tower::ServiceExt;

    fn app(user_store: UserStore) -> Router {
        user_routes().layer(Extension(Arc::new(user_store)))
    }

    #[test(tokio::test)]
    async fn create_returns_created_without_password() {
        let mut user_store = UserStore::new();
        user_store
            .expect_create()
            .withf(|new_user| new_user.email == "a@x.com" && new_user.password == "secret")
            .once()
            .returning(|new_user| {
                Ok(User::builder()
                    .id(1)
                    .email(new_user.email)
                    .password(String::from("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"))
                    .created_at(Utc::now())
                    .build())
            });

        let response = app(user_store)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/users")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"email": "a@x.com", "password": "secret"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(StatusCode::CREATED, response.status());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let user: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!("a@x.com", user["email"]);
        assert!(user.get("password").is_none());
    }

    #[test(tokio::test)]
    async fn duplicate_email_conflicts() {
        let mut user_store = UserStore::new();
        user_store.expect_create().returning(|_| {
            Err(StoreError::ConstraintViolation(String::from(
                "duplicate key value violates unique constraint \"users_email_key\"",
            )))
        });

        let response = app(user_store)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/users")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"email": "a@x.com", "password": "secret"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(StatusCode::CONFLICT, response.status());
    }

    #[test(tokio::test)]
    async fn missing_user_is_not_found() {
        let mut user_store = UserStore::new();
        user_store
            .expect_get()
            .returning(|id| Err(StoreError::NotFound(format!("user with id: {id} does not exist"))));

        let response = app(user_store)
            .oneshot(Request::builder().uri("/users/8").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(StatusCode::NOT_FOUND, response.status());
    }
}
