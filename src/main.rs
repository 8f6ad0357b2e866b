use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::{
    authentication::TokenKeys,
    config::Config,
    database::initialize_database,
    services::{PostStore, UserStore, VoteStore},
};

mod authentication;
mod config;
mod database;
mod migrations;
mod routes;
mod services;

fn setup_tracing(args: &Config) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(!args.no_ansi)
        .with_level(true)
        .with_thread_ids(true)
        .with_target(cfg!(debug_assertions))
        .with_env_filter(EnvFilter::from_default_env())
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to create formatting subscriber: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();
    let args = Config::parse();
    setup_tracing(&args)?;

    tracing::debug!(
        port = args.port,
        max_connections = args.max_connections,
        "starting new server"
    );
    let database_pool = initialize_database(&args)
        .await
        .with_context(|| "failed to initialize the database")?;

    if args.migrate_only {
        tracing::info!("migration finished, not serving traffic");
        database_pool.close();
        return Ok(());
    }

    let keys = TokenKeys::new(&args.token_secret, args.token_expire_minutes);

    quorum_server::Application::run()
        .port(args.port)
        .routes(routes::create_routes(&keys))
        .extension(Arc::new(
            PostStore::builder()
                .database_pool(database_pool.clone())
                .build(),
        ))
        .extension(Arc::new(
            UserStore::builder()
                .database_pool(database_pool.clone())
                .build(),
        ))
        .extension(Arc::new(
            VoteStore::builder()
                .database_pool(database_pool.clone())
                .build(),
        ))
        .finish()
        .await?;

    database_pool.close();

    Ok(())
}
