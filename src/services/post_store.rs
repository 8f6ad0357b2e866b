use bon::Builder;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Pool, Transaction};
#[cfg(test)]
use mockall::automock;
use postgres_from_row::FromRow;
use serde::{Deserialize, Serialize};

use super::{Principal, StoreError};

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, Builder)]
#[builder(on(String, into))]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub owner_id: i32,
}

/// A post together with the number of votes cast for it
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PostWithVotes {
    #[serde(rename = "Post")]
    #[from_row(flatten)]
    pub post: Post,
    pub votes: i64,
}

/// Pagination and title filter for [PostStore::list]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Builder)]
#[builder(on(String, into))]
pub struct ListQuery {
    #[serde(default = "ListQuery::default_limit")]
    #[builder(default = ListQuery::default_limit())]
    pub limit: u32,
    #[serde(default)]
    #[builder(default)]
    pub skip: u32,
    /// Substring the title has to contain, empty matches everything
    #[serde(default)]
    #[builder(default)]
    pub search: String,
}

impl ListQuery {
    fn default_limit() -> u32 {
        10
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Builder)]
#[builder(on(String, into))]
pub struct NewPost {
    pub title: String,
    pub content: String,
    /// Left to the column default (`TRUE`) when omitted
    pub published: Option<bool>,
}

/// Field updates for [PostStore::update], omitted fields keep their value
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Builder)]
#[builder(on(String, into))]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub published: Option<bool>,
}

const SELECT_WITH_VOTES: &str = r#"
    SELECT
        posts.*,
        COUNT(votes.post_id) AS votes
    FROM posts LEFT OUTER JOIN votes
        ON votes.post_id = posts.id
"#;

#[derive(Builder)]
pub struct PostStore {
    database_pool: Pool,
}

/// Posts and their vote counts, mutations are scoped to the owning principal
#[cfg_attr(test, automock)]
impl PostStore {
    pub async fn list(
        &self,
        principal: &Principal,
        query: &ListQuery,
    ) -> Result<Vec<PostWithVotes>, StoreError> {
        tracing::debug!(principal = principal.id, query = ?query, "listing posts");
        let statement = format!(
            r#"{SELECT_WITH_VOTES}
            WHERE strpos(posts.title, $1) > 0
            GROUP BY posts.id
            ORDER BY posts.id
            LIMIT $2 OFFSET $3
            "#
        );

        let client = self.database_pool.get().await?;
        let rows = client
            .query(
                statement.as_str(),
                &[
                    &query.search,
                    &i64::from(query.limit),
                    &i64::from(query.skip),
                ],
            )
            .await?;

        Ok(rows
            .iter()
            .map(PostWithVotes::try_from_row)
            .collect::<Result<Vec<PostWithVotes>, _>>()?)
    }

    pub async fn get(&self, principal: &Principal, id: i32) -> Result<PostWithVotes, StoreError> {
        tracing::debug!(principal = principal.id, post = id, "fetching post");
        let statement = format!(
            r#"{SELECT_WITH_VOTES}
            WHERE posts.id = $1
            GROUP BY posts.id
            "#
        );

        let client = self.database_pool.get().await?;
        let row = client
            .query_opt(
                statement.as_str(),
                &[&id],
            )
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("post with id: {id} was not found")))?;

        Ok(PostWithVotes::try_from_row(&row)?)
    }

    /// Insert a post owned by `principal`, the returned row carries the
    /// database generated id, timestamp and defaults
    pub async fn create(&self, principal: &Principal, new_post: NewPost) -> Result<Post, StoreError> {
        let client = self.database_pool.get().await?;
        let row = match new_post.published {
            Some(published) => {
                client
                    .query_one(
                        r#"
                        INSERT INTO posts
                            (title, content, owner_id, published)
                        VALUES
                            ($1, $2, $3, $4)
                        RETURNING *
                        "#,
                        &[&new_post.title, &new_post.content, &principal.id, &published],
                    )
                    .await?
            }
            None => {
                client
                    .query_one(
                        r#"
                        INSERT INTO posts
                            (title, content, owner_id)
                        VALUES
                            ($1, $2, $3)
                        RETURNING *
                        "#,
                        &[&new_post.title, &new_post.content, &principal.id],
                    )
                    .await?
            }
        };

        let post = Post::try_from_row(&row)?;
        tracing::info!(post = post.id, owner = principal.id, "created post");
        Ok(post)
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: i32,
        changes: PostChanges,
    ) -> Result<Post, StoreError> {
        let mut client = self.database_pool.get().await?;
        let transaction = client.transaction().await?;
        check_owner(&transaction, principal, id).await?;

        let row = transaction
            .query_one(
                r#"
                UPDATE posts SET
                    title = COALESCE($2, title),
                    content = COALESCE($3, content),
                    published = COALESCE($4, published)
                WHERE
                    id = $1
                RETURNING *
                "#,
                &[&id, &changes.title, &changes.content, &changes.published],
            )
            .await?;
        let post = Post::try_from_row(&row)?;

        transaction.commit().await?;
        tracing::info!(post = id, owner = principal.id, "updated post");
        Ok(post)
    }

    /// Delete a post owned by `principal`, the votes cast for it go with it
    pub async fn delete(&self, principal: &Principal, id: i32) -> Result<(), StoreError> {
        let mut client = self.database_pool.get().await?;
        let transaction = client.transaction().await?;
        check_owner(&transaction, principal, id).await?;

        transaction
            .execute("DELETE FROM posts WHERE id = $1", &[&id])
            .await?;

        transaction.commit().await?;
        tracing::info!(post = id, owner = principal.id, "deleted post");
        Ok(())
    }
}

/// Missing posts are reported before ownership so a foreign post never
/// yields anything but Forbidden
async fn check_owner(
    transaction: &Transaction<'_>,
    principal: &Principal,
    id: i32,
) -> Result<(), StoreError> {
    let owner_id: i32 = transaction
        .query_opt("SELECT owner_id FROM posts WHERE id = $1", &[&id])
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("post with id: {id} does not exist")))?
        .try_get(0)?;

    if owner_id != principal.id {
        tracing::debug!(post = id, owner = owner_id, principal = principal.id, "ownership check failed");
        return Err(StoreError::Forbidden(String::from(
            "not authorized to perform requested action",
        )));
    }

    Ok(())
}
