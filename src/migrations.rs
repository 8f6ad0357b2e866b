use quorum_migration::{
    Change, Column, ColumnType, ForeignKey, OnDelete, Revision, Table, revision,
};

const POSTS: Table = Table {
    name: "posts",
    columns: &[
        Column::new("id", ColumnType::Integer).identity(),
        Column::new("title", ColumnType::Text),
    ],
    primary_key: &["id"],
    foreign_keys: &[],
};

const USERS: Table = Table {
    name: "users",
    columns: &[
        Column::new("id", ColumnType::Integer).identity(),
        Column::new("email", ColumnType::Text).unique(),
        Column::new("password", ColumnType::Text),
        Column::new("created_at", ColumnType::TimestampTz).default("now()"),
    ],
    primary_key: &["id"],
    foreign_keys: &[],
};

const VOTES: Table = Table {
    name: "votes",
    columns: &[
        Column::new("user_id", ColumnType::Integer),
        Column::new("post_id", ColumnType::Integer),
    ],
    primary_key: &["user_id", "post_id"],
    foreign_keys: &[
        ForeignKey {
            name: "votes_post_id_fkey",
            columns: &["post_id"],
            references: "posts",
            referenced_columns: &["id"],
            on_delete: OnDelete::Cascade,
        },
        ForeignKey {
            name: "votes_user_id_fkey",
            columns: &["user_id"],
            references: "users",
            referenced_columns: &["id"],
            on_delete: OnDelete::Cascade,
        },
    ],
};

const POST_OWNER: ForeignKey = ForeignKey {
    name: "post_users_fk",
    columns: &["owner_id"],
    references: "users",
    referenced_columns: &["id"],
    on_delete: OnDelete::Cascade,
};

pub const DATABASE_REVISIONS: &[Revision] = &[
    revision!(
        "f4995d96295a",
        root,
        apply = [Change::CreateTable(POSTS)],
        revert = [Change::DropTable("posts")],
    ),
    // no default, fails against a table which already holds posts
    revision!(
        "5cef5d72b8ee",
        "f4995d96295a",
        apply = [Change::AddColumn {
            table: "posts",
            column: Column::new("content", ColumnType::Text),
        }],
        revert = [Change::DropColumn {
            table: "posts",
            column: "content",
        }],
    ),
    revision!(
        "35640bc20c75",
        "5cef5d72b8ee",
        apply = [Change::CreateTable(USERS)],
        revert = [Change::DropTable("users")],
    ),
    revision!(
        "b11bb33003af",
        "35640bc20c75",
        apply = [
            Change::AddColumn {
                table: "posts",
                column: Column::new("owner_id", ColumnType::Integer),
            },
            Change::AddForeignKey {
                table: "posts",
                foreign_key: POST_OWNER,
            },
        ],
        revert = [
            Change::DropForeignKey {
                table: "posts",
                name: "post_users_fk",
            },
            Change::DropColumn {
                table: "posts",
                column: "owner_id",
            },
        ],
    ),
    revision!(
        "976d3b9337bd",
        "b11bb33003af",
        apply = [
            Change::AddColumn {
                table: "posts",
                column: Column::new("published", ColumnType::Boolean).default("TRUE"),
            },
            Change::AddColumn {
                table: "posts",
                column: Column::new("created_at", ColumnType::TimestampTz).default("now()"),
            },
        ],
        revert = [
            Change::DropColumn {
                table: "posts",
                column: "published",
            },
            Change::DropColumn {
                table: "posts",
                column: "created_at",
            },
        ],
    ),
    revision!(
        "a92ef59864d9",
        "976d3b9337bd",
        apply = [
            Change::CreateTable(VOTES),
            Change::SetNullable {
                table: "users",
                column: "password",
                nullable: true,
            },
        ],
        revert = [
            Change::SetNullable {
                table: "users",
                column: "password",
                nullable: false,
            },
            Change::DropTable("votes"),
        ],
    ),
    revision!(
        "66a9923c4326",
        "a92ef59864d9",
        apply = [Change::AddColumn {
            table: "users",
            column: Column::new("phone_number", ColumnType::Text).nullable(),
        }],
        revert = [Change::DropColumn {
            table: "users",
            column: "phone_number",
        }],
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quorum_migration::{ChainError, MigrationBuilder, RevisionChain, SchemaError};

    use crate::services::testing::ScratchSchema;

    #[test]
    fn revisions_form_a_valid_chain() {
        let chain = RevisionChain::new(DATABASE_REVISIONS).unwrap();
        assert_eq!(7, chain.len());
        assert_eq!("f4995d96295a", chain.root().unwrap().revision());
        assert_eq!("66a9923c4326", chain.head().unwrap().revision());
    }

    #[test]
    fn head_matches_persisted_layout() {
        let chain = RevisionChain::new(DATABASE_REVISIONS).unwrap();
        let schema = chain.head_snapshot();

        let users = schema.table("users").unwrap();
        assert_eq!(
            vec!["id", "email", "password", "created_at", "phone_number"],
            users.column_names()
        );
        assert!(users.column("email").unwrap().unique);
        assert!(!users.column("email").unwrap().nullable);
        assert!(users.column("password").unwrap().nullable);
        assert!(users.column("phone_number").unwrap().nullable);
        assert_eq!(Some("now()"), users.column("created_at").unwrap().default);

        let posts = schema.table("posts").unwrap();
        assert_eq!(
            vec!["id", "title", "content", "owner_id", "published", "created_at"],
            posts.column_names()
        );
        assert!(!posts.column("title").unwrap().nullable);
        assert!(!posts.column("content").unwrap().nullable);
        assert_eq!(Some("TRUE"), posts.column("published").unwrap().default);
        assert_eq!(&[POST_OWNER], posts.foreign_keys());

        let votes = schema.table("votes").unwrap();
        assert_eq!(&["user_id", "post_id"], votes.primary_key());
        assert!(
            votes
                .foreign_keys()
                .iter()
                .all(|foreign_key| foreign_key.on_delete == OnDelete::Cascade)
        );
    }

    #[test]
    fn password_becomes_nullable_with_votes() {
        let chain = RevisionChain::new(DATABASE_REVISIONS).unwrap();
        let before = chain.snapshot_at(Some("976d3b9337bd")).unwrap();
        let after = chain.snapshot_at(Some("a92ef59864d9")).unwrap();

        assert!(!before.column("users", "password").unwrap().nullable);
        assert!(before.table("votes").is_none());
        assert!(after.column("users", "password").unwrap().nullable);
    }

    static VOTES_BEFORE_USERS: [Revision; 3] = [
        revision!(
            "f4995d96295a",
            root,
            apply = [Change::CreateTable(POSTS)],
            revert = [Change::DropTable("posts")],
        ),
        revision!(
            "a92ef59864d9",
            "f4995d96295a",
            apply = [Change::CreateTable(VOTES)],
            revert = [Change::DropTable("votes")],
        ),
        revision!(
            "35640bc20c75",
            "a92ef59864d9",
            apply = [Change::CreateTable(USERS)],
            revert = [Change::DropTable("users")],
        ),
    ];

    #[test]
    fn rejects_votes_before_users() {
        assert_eq!(
            ChainError::InvalidStep {
                revision: "a92ef59864d9",
                source: SchemaError::UnknownReference {
                    table: "votes",
                    name: "votes_user_id_fkey",
                    references: "users",
                },
            },
            RevisionChain::new(&VOTES_BEFORE_USERS).unwrap_err()
        );
    }

    #[test_log::test(tokio::test)]
    async fn upgrade_and_downgrade_against_postgres() {
        let Some(scratch) = ScratchSchema::create().await else {
            return;
        };
        let migration = MigrationBuilder::postgres()
            .chain(RevisionChain::new(DATABASE_REVISIONS).unwrap())
            .database_pool(scratch.pool())
            .build();

        assert_eq!(7, migration.upgrade().await.unwrap());
        assert_eq!(
            vec!["migrations", "posts", "users", "votes"],
            scratch.tables().await
        );
        assert!(!migration.needs_migration().await.unwrap());

        assert_eq!(7, migration.downgrade(None).await.unwrap());
        assert_eq!(vec!["migrations"], scratch.tables().await);
        assert!(migration.current().await.unwrap().is_none());

        scratch.remove().await;
    }
}
