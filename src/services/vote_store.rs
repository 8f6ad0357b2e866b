use bon::Builder;
use deadpool_postgres::Pool;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use super::{Principal, StoreError};

/// `1` casts a vote, `0` withdraws it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum VoteDirection {
    Down,
    Up,
}

impl TryFrom<u8> for VoteDirection {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VoteDirection::Down),
            1 => Ok(VoteDirection::Up),
            other => Err(format!("vote direction must be 0 or 1, got {other}")),
        }
    }
}

impl From<VoteDirection> for u8 {
    fn from(value: VoteDirection) -> Self {
        match value {
            VoteDirection::Down => 0,
            VoteDirection::Up => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub post_id: i32,
    pub dir: VoteDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Added,
    Removed,
}

#[derive(Builder)]
pub struct VoteStore {
    database_pool: Pool,
}

#[cfg_attr(test, automock)]
impl VoteStore {
    pub async fn vote(
        &self,
        principal: &Principal,
        request: VoteRequest,
    ) -> Result<VoteOutcome, StoreError> {
        let VoteRequest { post_id, dir } = request;
        let client = self.database_pool.get().await?;

        if client
            .query_opt("SELECT id FROM posts WHERE id = $1", &[&post_id])
            .await?
            .is_none()
        {
            return Err(StoreError::NotFound(format!(
                "post with id: {post_id} does not exist"
            )));
        }

        match dir {
            VoteDirection::Up => {
                let inserted = client
                    .execute(
                        r#"
                        INSERT INTO votes
                            (post_id, user_id)
                        VALUES
                            ($1, $2)
                        ON CONFLICT DO NOTHING
                        "#,
                        &[&post_id, &principal.id],
                    )
                    .await?;

                if inserted == 0 {
                    return Err(StoreError::Conflict(format!(
                        "user {} has already voted on post {post_id}",
                        principal.id
                    )));
                }

                tracing::info!(post = post_id, user = principal.id, "vote added");
                Ok(VoteOutcome::Added)
            }
            VoteDirection::Down => {
                let deleted = client
                    .execute(
                        "DELETE FROM votes WHERE post_id = $1 AND user_id = $2",
                        &[&post_id, &principal.id],
                    )
                    .await?;

                if deleted == 0 {
                    return Err(StoreError::NotFound(String::from("vote does not exist")));
                }

                tracing::info!(post = post_id, user = principal.id, "vote removed");
                Ok(VoteOutcome::Removed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{create_user, test_pool};
    use crate::services::{NewPost, PostStore};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("0", Some(VoteDirection::Down))]
    #[case("1", Some(VoteDirection::Up))]
    #[case("2", None)]
    #[case("-1", None)]
    fn parse_direction(#[case] json: &str, #[case] expected: Option<VoteDirection>) {
        assert_eq!(expected, serde_json::from_str::<VoteDirection>(json).ok());
    }

    #[test_log::test(tokio::test)]
    async fn vote_and_withdraw() {
        let Some(pool) = test_pool().await else { return };
        let voter = Principal {
            id: create_user(&pool).await.id,
        };
        let post = PostStore::builder()
            .database_pool(pool.clone())
            .build()
            .create(&voter, NewPost::builder().title("T").content("C").build())
            .await
            .unwrap();
        let store = VoteStore::builder().database_pool(pool.clone()).build();

        let up = VoteRequest {
            post_id: post.id,
            dir: VoteDirection::Up,
        };
        let down = VoteRequest {
            post_id: post.id,
            dir: VoteDirection::Down,
        };

        assert_eq!(VoteOutcome::Added, store.vote(&voter, up).await.unwrap());
        assert!(matches!(
            store.vote(&voter, up).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(VoteOutcome::Removed, store.vote(&voter, down).await.unwrap());
        assert!(matches!(
            store.vote(&voter, down).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn vote_on_missing_post() {
        let Some(pool) = test_pool().await else { return };
        let voter = Principal {
            id: create_user(&pool).await.id,
        };
        let store = VoteStore::builder().database_pool(pool.clone()).build();

        assert!(matches!(
            store
                .vote(
                    &voter,
                    VoteRequest {
                        post_id: -1,
                        dir: VoteDirection::Up,
                    },
                )
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn deleting_a_user_removes_their_votes() {
        let Some(pool) = test_pool().await else { return };
        let author = Principal {
            id: create_user(&pool).await.id,
        };
        let voter = Principal {
            id: create_user(&pool).await.id,
        };
        let post = PostStore::builder()
            .database_pool(pool.clone())
            .build()
            .create(&author, NewPost::builder().title("T").content("C").build())
            .await
            .unwrap();

        VoteStore::builder()
            .database_pool(pool.clone())
            .build()
            .vote(
                &voter,
                VoteRequest {
                    post_id: post.id,
                    dir: VoteDirection::Up,
                },
            )
            .await
            .unwrap();

        let client = pool.get().await.unwrap();
        client
            .execute("DELETE FROM users WHERE id = $1", &[&voter.id])
            .await
            .unwrap();
        let votes: i64 = client
            .query_one("SELECT COUNT(*) FROM votes WHERE user_id = $1", &[&voter.id])
            .await
            .unwrap()
            .get(0);
        assert_eq!(0, votes);
    }
}
