mod error;
mod post_store;
mod user_store;
mod vote_store;

pub use error::StoreError;
pub use post_store::{ListQuery, NewPost, Post, PostChanges, PostStore, PostWithVotes};
pub use user_store::{NewUser, User, UserStore};
#[cfg(test)]
pub use user_store::hash_password;
#[cfg(test)]
pub use vote_store::VoteDirection;
pub use vote_store::{VoteOutcome, VoteRequest, VoteStore};

#[cfg(test)]
pub use post_store::MockPostStore;
#[cfg(test)]
pub use user_store::MockUserStore;
#[cfg(test)]
pub use vote_store::MockVoteStore;

/// The authenticated user a store operation runs on behalf of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: i32,
}

/// Database backed tests only run when `TEST_DATABASE_URL` points at a
/// scratch postgres database, the revisions are applied once per test binary.
#[cfg(test)]
pub(crate) mod testing {
    use std::str::FromStr;

    use deadpool_postgres::{Manager, Pool};
    use quorum_migration::{MigrationBuilder, RevisionChain};
    use tokio::sync::OnceCell;
    use tokio_postgres::NoTls;

    use super::{NewUser, User, UserStore};
    use crate::migrations::DATABASE_REVISIONS;

    static MIGRATED: OnceCell<()> = OnceCell::const_new();

    pub async fn test_pool() -> Option<Pool> {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            tracing::warn!("TEST_DATABASE_URL is not set, skipping database test");
            return None;
        };

        let config = tokio_postgres::Config::from_str(&url).expect("invalid TEST_DATABASE_URL");
        let pool = Pool::builder(Manager::new(config, NoTls))
            .max_size(4)
            .build()
            .expect("failed to create test pool");

        MIGRATED
            .get_or_init(|| async {
                let chain = RevisionChain::new(DATABASE_REVISIONS).expect("invalid revisions");
                MigrationBuilder::postgres()
                    .chain(chain)
                    .database_pool(&pool)
                    .build()
                    .upgrade()
                    .await
                    .expect("failed to migrate test database");
            })
            .await;

        Some(pool)
    }

    /// A schema of its own for tests that migrate and revert, the shared
    /// schema stays untouched for the store tests running alongside
    pub struct ScratchSchema {
        name: String,
        pool: Pool,
    }

    impl ScratchSchema {
        pub async fn create() -> Option<Self> {
            let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
                tracing::warn!("TEST_DATABASE_URL is not set, skipping database test");
                return None;
            };
            let name = format!("quorum_{}", uuid::Uuid::new_v4().simple());

            let (client, connection) = tokio_postgres::connect(&url, NoTls)
                .await
                .expect("failed to connect to the test database");
            tokio::spawn(connection);
            client
                .batch_execute(&format!("CREATE SCHEMA {name}"))
                .await
                .expect("failed to create scratch schema");

            let mut config =
                tokio_postgres::Config::from_str(&url).expect("invalid TEST_DATABASE_URL");
            config.options(&format!("-c search_path={name}"));
            let pool = Pool::builder(Manager::new(config, NoTls))
                .max_size(2)
                .build()
                .expect("failed to create scratch pool");

            Some(Self { name, pool })
        }

        pub fn pool(&self) -> &Pool {
            &self.pool
        }

        pub async fn tables(&self) -> Vec<String> {
            self.pool
                .get()
                .await
                .expect("failed to check out a connection")
                .query(
                    "SELECT table_name::text FROM information_schema.tables WHERE table_schema::text = $1 ORDER BY table_name",
                    &[&self.name],
                )
                .await
                .expect("failed to list tables")
                .iter()
                .map(|row| row.get(0))
                .collect()
        }

        pub async fn remove(self) {
            self.pool
                .get()
                .await
                .expect("failed to check out a connection")
                .batch_execute(&format!("DROP SCHEMA {} CASCADE", self.name))
                .await
                .expect("failed to drop scratch schema");
        }
    }

    pub fn unique_email() -> String {
        format!("{}@example.com", uuid::Uuid::new_v4())
    }

    pub async fn create_user(pool: &Pool) -> User {
        UserStore::builder()
            .database_pool(pool.clone())
            .build()
            .create(
                NewUser::builder()
                    .email(unique_email())
                    .password("password")
                    .build(),
            )
            .await
            .expect("failed to create test user")
    }
}
