use std::sync::Arc;

use axum::{Extension, Json, Router, http::StatusCode, routing::post};
use tracing::instrument;

use super::Message;
#[cfg(test)]
use crate::services::MockVoteStore as VoteStore;
#[cfg(not(test))]
use crate::services::VoteStore;
use crate::services::{Principal, StoreError, VoteOutcome, VoteRequest};

pub fn vote_routes() -> Router {
    Router::new().route("/vote", post(vote))
}

#[instrument(level = "debug", skip(vote_store))]
async fn vote(
    Extension(vote_store): Extension<Arc<VoteStore>>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<VoteRequest>,
) -> Result<(StatusCode, Json<Message>), StoreError> {
    let message = match vote_store.vote(&principal, request).await? {
        VoteOutcome::Added => "successfully added vote",
        VoteOutcome::Removed => "successfully deleted vote",
    };
    Ok((StatusCode::CREATED, Json(Message::new(message))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::VoteDirection;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use test_log::test;
    use tower::ServiceExt;

    const VOTER: Principal = Principal { id: 4 };

    fn vote_request(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/vote")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    fn app(vote_store: VoteStore) -> Router {
        vote_routes()
            .layer(Extension(VOTER))
            .layer(Extension(Arc::new(vote_store)))
    }

    #[test(tokio::test)]
    async fn vote_added() {
        let mut vote_store = VoteStore::new();
        vote_store
            .expect_vote()
            .with(
                eq(VOTER),
                eq(VoteRequest {
                    post_id: 3,
                    dir: VoteDirection::Up,
                }),
            )
            .once()
            .returning(|_, _| Ok(VoteOutcome::Added));

        let response = app(vote_store)
            .oneshot(vote_request(r#"{"post_id": 3, "dir": 1}"#))
            .await
            .unwrap();

        assert_eq!(StatusCode::CREATED, response.status());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let message: Message = serde_json::from_slice(&body).unwrap();
        assert_eq!(Message::new("successfully added vote"), message);
    }

    #[test(tokio::test)]
    async fn repeated_vote_conflicts() {
        let mut vote_store = VoteStore::new();
        vote_store.expect_vote().returning(|principal, request| {
            Err(StoreError::Conflict(format!(
                "user {} has already voted on post {}",
                principal.id, request.post_id
            )))
        });

        let response = app(vote_store)
            .oneshot(vote_request(r#"{"post_id": 3, "dir": 1}"#))
            .await
            .unwrap();

        assert_eq!(StatusCode::CONFLICT, response.status());
    }

    #[test(tokio::test)]
    async fn invalid_direction_is_rejected() {
        let mut vote_store = VoteStore::new();
        vote_store.expect_vote().never();

        let response = app(vote_store)
            .oneshot(vote_request(r#"{"post_id": 3, "dir": 2}"#))
            .await
            .unwrap();

        assert_eq!(StatusCode::UNPROCESSABLE_ENTITY, response.status());
    }
}
