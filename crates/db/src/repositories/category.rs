use backoffice_core::domain::category::{Category, CategoryId};

use super::{decode_payload, encode_payload, CategoryRepository, Predicate, RepositoryError};
use crate::DbPool;

pub struct SqlCategoryRepository {
    pool: DbPool,
}

impl SqlCategoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CategoryRepository for SqlCategoryRepository {
    async fn find_by_id(&self, id: &CategoryId) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query("SELECT payload_json FROM category WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_payload).transpose()
    }

    async fn save(&self, category: Category) -> Result<(), RepositoryError> {
        let payload = encode_payload(&category)?;

        sqlx::query(
            "INSERT INTO category (id, name, active, payload_json)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 active = excluded.active,
                 payload_json = excluded.payload_json",
        )
        .bind(&category.id.0)
        .bind(&category.name)
        .bind(category.active)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &CategoryId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM category WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(
        &self,
        predicate: Predicate<'_, Category>,
    ) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query("SELECT payload_json FROM category ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut categories = Vec::with_capacity(rows.len());
        for row in &rows {
            let category: Category = decode_payload(row)?;
            if predicate(&category) {
                categories.push(category);
            }
        }
        Ok(categories)
    }
}
