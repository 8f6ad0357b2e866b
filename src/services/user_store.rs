use std::fmt::{Debug, Display};

use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use bon::Builder;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
#[cfg(test)]
use mockall::automock;
use postgres_from_row::FromRow;
use serde::{Deserialize, Serialize};

use super::StoreError;

#[derive(Clone, PartialEq, FromRow, Serialize, Deserialize, Builder)]
#[builder(on(String, into))]
pub struct User {
    pub id: i32,
    pub email: String,
    /// argon2 PHC string, never serialized
    #[serde(skip_serializing, default)]
    password: Option<String>,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Deserialize, Builder)]
#[builder(on(String, into))]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub phone_number: Option<String>,
}

impl Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("password", &String::from("<redacted>"))
            .field("phone_number", &self.phone_number)
            .finish()
    }
}

#[derive(Builder)]
pub struct UserStore {
    database_pool: Pool,
}

/// Registered users, passwords are stored as argon2 hashes
#[cfg_attr(test, automock)]
impl UserStore {
    pub async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let password = hash_password(&new_user.password)?;
        let client = self.database_pool.get().await?;
        let row = client
            .query_one(
                r#"
                INSERT INTO users
                    (email, password, phone_number)
                VALUES
                    ($1, $2, $3)
                RETURNING *
                "#,
                &[&new_user.email, &password, &new_user.phone_number],
            )
            .await?;

        let user = User::try_from_row(&row)?;
        tracing::info!(user = ?user, "created user {user}");
        Ok(user)
    }

    pub async fn get(&self, id: i32) -> Result<User, StoreError> {
        let client = self.database_pool.get().await?;
        let row = client
            .query_opt("SELECT * FROM users WHERE id = $1", &[&id])
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user with id: {id} does not exist")))?;

        Ok(User::try_from_row(&row)?)
    }

    pub async fn for_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let client = self.database_pool.get().await?;
        match client
            .query_opt("SELECT * FROM users WHERE email = $1", &[&email])
            .await?
        {
            Some(row) => Ok(Some(User::try_from_row(&row)?)),
            None => Ok(None),
        }
    }
}

pub fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Database(anyhow!("failed to hash password: {e}")))
}

impl User {
    /// Users without a password can never authenticate
    pub fn check_password<P>(&self, password: P) -> bool
    where
        P: AsRef<str>,
    {
        let Some(stored) = self.password.as_deref() else {
            return false;
        };

        match PasswordHash::new(stored) {
            Ok(hash) => Argon2::default()
                .verify_password(password.as_ref().as_bytes(), &hash)
                .is_ok(),
            Err(e) => {
                tracing::error!("stored password for {self} is not a valid hash: {e}");
                false
            }
        }
    }
}

impl Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password", &String::from("<redacted>"))
            .field("phone_number", &self.phone_number)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.email, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{create_user, test_pool, unique_email};
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn user_with_password(password: Option<String>) -> User {
        User::builder()
            .id(1)
            .email("test@example.com")
            .maybe_password(password)
            .created_at(Utc::now())
            .build()
    }

    #[test]
    fn user_check_password() {
        let user = user_with_password(Some(hash_password("password").unwrap()));
        assert!(user.check_password("password"));
        assert!(!user.check_password("Password"));
    }

    #[test]
    fn user_without_password() {
        assert!(!user_with_password(None).check_password(""));
        assert!(!user_with_password(Some(String::from("plain"))).check_password("plain"));
    }

    #[test]
    fn password_is_not_serialized() {
        let user = user_with_password(Some(hash_password("password").unwrap()));
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password").is_none());
        assert_eq!("test@example.com", value["email"]);
        assert!(!format!("{user:?}").contains("argon2"));
    }

    #[test(tokio::test)]
    async fn create_and_find() {
        let Some(pool) = test_pool().await else { return };
        let store = UserStore::builder().database_pool(pool.clone()).build();
        let email = unique_email();

        let created = store
            .create(
                NewUser::builder()
                    .email(email.as_str())
                    .password("secret")
                    .phone_number(String::from("555-0100"))
                    .build(),
            )
            .await
            .unwrap();
        assert!(created.check_password("secret"));
        assert_eq!(Some(String::from("555-0100")), created.phone_number);

        assert_eq!(created, store.get(created.id).await.unwrap());
        assert_eq!(Some(created), store.for_email(&email).await.unwrap());
        assert_eq!(None, store.for_email(&unique_email()).await.unwrap());
    }

    #[test(tokio::test)]
    async fn duplicate_email_is_a_constraint_violation() {
        let Some(pool) = test_pool().await else { return };
        let existing = create_user(&pool).await;
        let store = UserStore::builder().database_pool(pool.clone()).build();

        assert!(matches!(
            store
                .create(
                    NewUser::builder()
                        .email(existing.email)
                        .password("password")
                        .build()
                )
                .await,
            Err(StoreError::ConstraintViolation(_))
        ));
    }

    #[test(tokio::test)]
    async fn get_missing_user() {
        let Some(pool) = test_pool().await else { return };
        let store = UserStore::builder().database_pool(pool.clone()).build();
        assert!(matches!(store.get(-1).await, Err(StoreError::NotFound(_))));
    }
}
