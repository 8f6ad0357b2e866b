pub mod applied_revision;
pub mod chain;
pub mod migrate_store;
pub mod migration;
#[cfg(feature = "postgres")]
pub mod postgres_revision_storage;
pub mod revision;
pub mod revision_list;
pub mod schema;

#[cfg(feature = "postgres")]
use crate::migrate_store::RevisionDatabase;
#[cfg(feature = "postgres")]
use crate::postgres_revision_storage::PostgresRevisionStorage;
use bon::bon;
pub use chain::{ChainError, RevisionChain};
pub use migration::{Direction, Migration, MigrationError};
pub use revision::Revision;
pub use revision_list::{RevisionList, RevisionStatus};
pub use schema::{Change, Column, ColumnType, ForeignKey, OnDelete, Schema, SchemaError, Table};

pub struct MigrationBuilder;

#[bon]
impl MigrationBuilder {
    /// Create a migration of the validated chain against a postgres pool, this
    /// requires the 'postgres' feature
    #[builder(finish_fn = build)]
    #[cfg(feature = "postgres")]
    pub fn postgres(
        chain: RevisionChain,
        database_pool: &deadpool_postgres::Pool,
    ) -> Migration<RevisionDatabase<PostgresRevisionStorage>> {
        let storage = PostgresRevisionStorage::new(database_pool);
        let store = RevisionDatabase::builder().storage(storage).build();

        Migration::<RevisionDatabase<PostgresRevisionStorage>>::builder()
            .store(store)
            .chain(chain)
            .build()
    }
}
