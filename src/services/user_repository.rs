use async_trait::async_trait;
use sqlx::SqlitePool;

use super::repository::{RepositoryError, RepositoryResult, is_unique_violation};
use crate::models::User;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Store a new user. A duplicate email surfaces as a storage error.
    async fn create(&self, user: &User) -> RepositoryResult<()>;

    async fn find_by_email(&self, email: &str) -> RepositoryResult<User>;
}

#[derive(Clone)]
pub struct SqliteUserRepository {
    db: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: &User) -> RepositoryResult<()> {
        sqlx::query("INSERT INTO users (id, name, email, password_hash) VALUES (?, ?, ?, ?)")
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .execute(&self.db)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    tracing::warn!("user email already registered");
                }
                RepositoryError::Storage(err)
            })?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<User> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, email, password_hash FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_one(&self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            other => RepositoryError::Storage(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn repository() -> SqliteUserRepository {
        SqliteUserRepository::new(db::connect_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_create_and_find_by_email() {
        let repo = repository().await;
        let user = User::new("John Doe", "j@j.com", "123456").unwrap();
        repo.create(&user).await.unwrap();

        let found = repo.find_by_email("j@j.com").await.unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.name, "John Doe");
        assert!(found.validate_password("123456"));
    }

    #[tokio::test]
    async fn test_find_by_email_missing() {
        let repo = repository().await;
        assert!(matches!(
            repo.find_by_email("nobody@example.com").await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_storage_error() {
        let repo = repository().await;
        let first = User::new("John Doe", "j@j.com", "123456").unwrap();
        let second = User::new("Jane Doe", "j@j.com", "abcdef").unwrap();

        repo.create(&first).await.unwrap();
        assert!(matches!(
            repo.create(&second).await,
            Err(RepositoryError::Storage(_))
        ));
    }
}
