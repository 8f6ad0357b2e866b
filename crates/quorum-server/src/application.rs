use anyhow::Result;
use axum::{Extension, Router, http::Uri};

use bon::bon;

use crate::problem::Problem;

pub struct Application {}

#[bon]
impl Application {
    /// Serve the registered routes on `port` until ctrl+c or SIGTERM is received
    #[builder(finish_fn = finish)]
    pub async fn run(#[builder(field)] routes: Router, port: u16) -> Result<()> {
        let routes = routes.fallback(Self::not_found);
        crate::server::Server::serve(port, routes).await?;
        Ok(())
    }

    async fn not_found(uri: Uri) -> Problem {
        Problem::not_found(format!("no route for '{}'", uri.path()))
    }
}

impl<S> ApplicationRunBuilder<S>
where
    S: application_run_builder::State,
{
    pub fn extension<E>(mut self, extension: E) -> Self
    where
        E: Clone + Send + Sync + 'static,
    {
        self.routes = self.routes.layer(Extension(extension));
        self
    }

    pub fn routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }
}
