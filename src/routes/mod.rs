use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use serde::{Deserialize, Serialize};

use crate::authentication::{TokenKeys, authenticate, login_routes};

mod home;
mod posts;
mod users;
mod votes;

/// Plain `{"message": ".."}` response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        Self {
            message: message.into(),
        }
    }
}

/// All routes of the api, the stores are expected as `Arc` extensions
pub fn create_routes(keys: &TokenKeys) -> Router {
    let protected = posts::post_routes()
        .merge(votes::vote_routes())
        .route_layer(from_fn_with_state(keys.clone(), authenticate));

    Router::new()
        .route("/", get(home::home))
        .merge(users::user_routes())
        .merge(login_routes(keys.clone()))
        .merge(protected)
}
