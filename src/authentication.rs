use std::sync::Arc;

use anyhow::Context;
use axum::{
    Extension, Form, Json, Router,
    extract::{Request, State},
    middleware::Next,
    response::Response,
    routing::post,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use quorum_server::Problem;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::services::Principal;
#[cfg(not(test))]
use crate::services::UserStore;
#[cfg(test)]
use crate::services::MockUserStore as UserStore;

#[derive(Debug, Serialize, Deserialize)]
struct UserClaims {
    user_id: i32,
    exp: i64,
}

/// Signs and verifies the HS256 access tokens handed out by `/login`
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl TokenKeys {
    pub fn new<S>(secret: S, lifetime_minutes: i64) -> Self
    where
        S: AsRef<[u8]>,
    {
        Self {
            encoding: EncodingKey::from_secret(secret.as_ref()),
            decoding: DecodingKey::from_secret(secret.as_ref()),
            lifetime: Duration::minutes(lifetime_minutes),
        }
    }

    pub fn issue(&self, principal: &Principal) -> anyhow::Result<String> {
        let claims = UserClaims {
            user_id: principal.id,
            exp: (Utc::now() + self.lifetime).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .with_context(|| format!("failed to encode token for user {}", principal.id))
    }

    pub fn verify<T>(&self, token: T) -> anyhow::Result<Principal>
    where
        T: AsRef<str>,
    {
        let claims = decode::<UserClaims>(
            token.as_ref(),
            &self.decoding,
            &Validation::new(Algorithm::HS256),
        )
        .with_context(|| "failed to decode access token")?
        .claims;

        Ok(Principal { id: claims.user_id })
    }
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
}

pub fn login_routes(keys: TokenKeys) -> Router {
    Router::new().route("/login", post(login)).with_state(keys)
}

#[instrument(level = "info", skip_all, fields(username = %form.username))]
async fn login(
    State(keys): State<TokenKeys>,
    Extension(user_store): Extension<Arc<UserStore>>,
    Form(form): Form<LoginForm>,
) -> Result<Json<AccessToken>, Problem> {
    let invalid = || Problem::forbidden("invalid credentials");

    let user = match user_store.for_email(&form.username).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::debug!("no user registered for '{}'", form.username);
            return Err(invalid());
        }
        Err(e) => return Err(e.into()),
    };

    if !user.check_password(&form.password) {
        tracing::debug!(user = ?user, "{user} failed to authenticate");
        return Err(invalid());
    }

    let access_token = keys.issue(&Principal { id: user.id }).map_err(|e| {
        tracing::error!(user = ?user, "failed to issue token: {e:#}");
        Problem::internal()
    })?;

    tracing::info!(user = ?user, "authenticated user {user}");
    Ok(Json(AccessToken {
        access_token,
        token_type: String::from("bearer"),
    }))
}

/// Middleware placing the [Principal] of a valid bearer token into the
/// request, requests without one never reach the wrapped routes
pub async fn authenticate(
    State(keys): State<TokenKeys>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, Problem> {
    let unauthorized = || Problem::unauthorized("could not validate credentials");

    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        tracing::debug!("request without a bearer token");
        return Err(unauthorized());
    };

    let principal = keys.verify(bearer.token()).map_err(|e| {
        tracing::debug!("rejected access token: {e:#}");
        unauthorized()
    })?;

    tracing::debug!(principal = principal.id, "authenticated request");
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
