use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use axum::{Router, http::Request};
use tokio::{
    net::TcpListener,
    signal::unix::{SignalKind, signal},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::Span;

pub struct Server;

impl Server {
    pub async fn serve(port: u16, app: Router) -> Result<()> {
        let app = Self::apply_layers(app);

        let address = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("failed to bind to {address}"))?;

        tracing::info!(
            "serving traffic on {:?}",
            listener.local_addr().unwrap_or(address)
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(Self::monitor_shutdown())
        .await?;

        Ok(())
    }

    /// Tracing, a request timeout and a CORS policy accepting any origin
    pub fn apply_layers(app: Router) -> Router {
        app.layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request<_>| match request.method().as_str() {
                            "GET" => tracing::debug_span!("http_get"),
                            "POST" => tracing::debug_span!("http_post"),
                            "PUT" => tracing::debug_span!("http_put"),
                            "DELETE" => tracing::debug_span!("http_delete"),
                            "OPTIONS" => tracing::debug_span!("http_options"),
                            method => tracing::debug_span!("http", method = ?method),
                        })
                        .on_request(|request: &Request<_>, _span: &Span| {
                            tracing::debug!("request {} '{}'", request.method(), request.uri());
                        }),
                )
                .layer(TimeoutLayer::new(Duration::from_secs(45)))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
    }

    /// Monitors external shutdown sources to close the server
    async fn monitor_shutdown() {
        let sigterm = async {
            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    terminate.recv().await;
                }
                Err(e) => {
                    tracing::warn!("unable to install a termination handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl+c shutting down");
            },
            _ = sigterm => {
                tracing::info!("received SIGTERM shutting down");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Method, StatusCode, header},
        routing::get,
    };
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let app = Server::apply_layers(Router::new().route("/", get(|| async { "ok" })));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/")
                    .header(header::ORIGIN, "https://example.org")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(
            "*",
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap()
        );
    }
}
