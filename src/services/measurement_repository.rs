//! Persistence contract for measurements and its SQLite implementation.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::repository::{Page, RepositoryError, RepositoryResult, SortOrder};
use crate::models::{Id, Measurement};

const COLUMNS: &str = "id, value, image, kind, confirmed, user, created_at";

/// Operations the HTTP handlers need from measurement storage.
#[async_trait]
pub trait MeasurementRepository: Send + Sync {
    async fn create(&self, measurement: Measurement) -> RepositoryResult<Measurement>;

    /// One page of measurements ordered by creation time.
    ///
    /// `page < 1` is treated as the first page and `limit < 1` as the default
    /// page size.
    async fn find_all(
        &self,
        page: i64,
        limit: i64,
        sort: SortOrder,
    ) -> RepositoryResult<Vec<Measurement>>;

    async fn find_by_id(&self, id: Id) -> RepositoryResult<Measurement>;

    /// Replace every mutable field of an existing record.
    async fn update(&self, measurement: &Measurement) -> RepositoryResult<()>;

    async fn delete(&self, id: Id) -> RepositoryResult<()>;
}

#[derive(Clone)]
pub struct SqliteMeasurementRepository {
    db: SqlitePool,
}

impl SqliteMeasurementRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MeasurementRepository for SqliteMeasurementRepository {
    async fn create(&self, measurement: Measurement) -> RepositoryResult<Measurement> {
        sqlx::query(
            "INSERT INTO measurements (id, value, image, kind, confirmed, user, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(measurement.id)
        .bind(measurement.value)
        .bind(&measurement.image)
        .bind(&measurement.kind)
        .bind(measurement.confirmed)
        .bind(&measurement.user)
        .bind(measurement.created_at)
        .execute(&self.db)
        .await?;

        tracing::debug!("inserted measurement {}", measurement.id);
        Ok(measurement)
    }

    async fn find_all(
        &self,
        page: i64,
        limit: i64,
        sort: SortOrder,
    ) -> RepositoryResult<Vec<Measurement>> {
        let window = Page::new(page, limit);
        let direction = sort.as_sql();
        let sql = format!(
            "SELECT {COLUMNS} FROM measurements
             ORDER BY created_at {direction}, id {direction}
             LIMIT ? OFFSET ?"
        );

        let rows = sqlx::query_as::<_, Measurement>(&sql)
            .bind(window.limit)
            .bind(window.offset())
            .fetch_all(&self.db)
            .await?;

        Ok(rows)
    }

    async fn find_by_id(&self, id: Id) -> RepositoryResult<Measurement> {
        sqlx::query_as::<_, Measurement>(&format!(
            "SELECT {COLUMNS} FROM measurements WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            other => RepositoryError::Storage(other),
        })
    }

    async fn update(&self, measurement: &Measurement) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE measurements
             SET value = ?, image = ?, kind = ?, confirmed = ?, user = ?
             WHERE id = ?",
        )
        .bind(measurement.value)
        .bind(&measurement.image)
        .bind(&measurement.kind)
        .bind(measurement.confirmed)
        .bind(&measurement.user)
        .bind(measurement.id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM measurements WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
