//! Pipeline statuses: the Kanban board's columns.

use anyhow::Context;
use serde::Deserialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::info;

use crm_core::error::{CrmError, CrmResult, Entity};

use crate::db::is_unique_violation;
use crate::models::StatusView;
use crate::timestamp;

#[derive(Debug, Deserialize)]
pub struct StatusInput {
    pub name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusPatch {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub order: Vec<String>,
}

fn clean_name(name: &str) -> CrmResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CrmError::invalid("status name must not be empty"));
    }
    Ok(name.to_string())
}

/// Insert a status at the end of the board and return its id.
pub(crate) async fn insert_status(
    conn: &mut SqliteConnection,
    name: &str,
    is_active: bool,
) -> CrmResult<String> {
    let next: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(sort_order), 0) + 1 FROM statuses")
        .fetch_one(&mut *conn)
        .await
        .context("Failed to read status order")?;

    let id = uuid::Uuid::new_v4().to_string();
    let result = sqlx::query(
        "INSERT INTO statuses (id, name, sort_order, is_active, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(next)
    .bind(is_active)
    .bind(timestamp::now())
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => {
            info!(%id, name, sort_order = next, "created status");
            Ok(id)
        }
        Err(e) if is_unique_violation(&e) => Err(CrmError::conflict(format!(
            "status '{}' already exists",
            name
        ))),
        Err(e) => Err(anyhow::Error::from(e).context("Failed to insert status").into()),
    }
}

async fn name_taken(conn: &mut SqliteConnection, name: &str, except: Option<&str>) -> CrmResult<bool> {
    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM statuses WHERE name = ? COLLATE NOCASE")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to look up status")?;
    Ok(matches!(existing, Some(id) if Some(id.as_str()) != except))
}

pub async fn list_statuses(pool: &SqlitePool, include_inactive: bool) -> CrmResult<Vec<StatusView>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.name, s.sort_order, s.is_active, COUNT(c.id) AS contact_count
        FROM statuses s
        LEFT JOIN contacts c ON c.status_id = s.id
        WHERE s.is_active = 1 OR ?
        GROUP BY s.id
        ORDER BY s.sort_order ASC, s.name ASC
        "#,
    )
    .bind(include_inactive)
    .fetch_all(pool)
    .await
    .context("Failed to list statuses")?;

    Ok(rows
        .iter()
        .map(|row| StatusView {
            id: row.get("id"),
            name: row.get("name"),
            sort_order: row.get("sort_order"),
            is_active: row.get("is_active"),
            contact_count: row.get("contact_count"),
        })
        .collect())
}

pub async fn get_status(pool: &SqlitePool, id: &str) -> CrmResult<StatusView> {
    let row = sqlx::query(
        r#"
        SELECT s.id, s.name, s.sort_order, s.is_active,
               (SELECT COUNT(*) FROM contacts c WHERE c.status_id = s.id) AS contact_count
        FROM statuses s
        WHERE s.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to read status")?
    .ok_or_else(|| CrmError::not_found(Entity::Status, id))?;

    Ok(StatusView {
        id: row.get("id"),
        name: row.get("name"),
        sort_order: row.get("sort_order"),
        is_active: row.get("is_active"),
        contact_count: row.get("contact_count"),
    })
}

pub async fn create_status(pool: &SqlitePool, input: &StatusInput) -> CrmResult<StatusView> {
    let name = clean_name(&input.name)?;
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    if name_taken(&mut tx, &name, None).await? {
        return Err(CrmError::conflict(format!("status '{}' already exists", name)));
    }
    let id = insert_status(&mut tx, &name, input.is_active).await?;
    tx.commit().await.context("Failed to commit status")?;
    get_status(pool, &id).await
}

pub async fn update_status(pool: &SqlitePool, id: &str, patch: &StatusPatch) -> CrmResult<StatusView> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM statuses WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read status")?;
    if exists.is_none() {
        return Err(CrmError::not_found(Entity::Status, id));
    }

    if let Some(name) = &patch.name {
        let name = clean_name(name)?;
        if name_taken(&mut tx, &name, Some(id)).await? {
            return Err(CrmError::conflict(format!("status '{}' already exists", name)));
        }
        sqlx::query("UPDATE statuses SET name = ? WHERE id = ?")
            .bind(&name)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to rename status")?;
    }
    if let Some(is_active) = patch.is_active {
        sqlx::query("UPDATE statuses SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to update status")?;
    }

    tx.commit().await.context("Failed to commit status")?;
    get_status(pool, id).await
}

/// Set `sort_order = index + 1` for every id in `order`, atomically.
pub async fn reorder_statuses(pool: &SqlitePool, order: &[String]) -> CrmResult<Vec<StatusView>> {
    if order.is_empty() {
        return Err(CrmError::invalid("order must not be empty"));
    }
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    for (index, id) in order.iter().enumerate() {
        let result = sqlx::query("UPDATE statuses SET sort_order = ? WHERE id = ?")
            .bind(index as i64 + 1)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to reorder statuses")?;
        if result.rows_affected() == 0 {
            return Err(CrmError::not_found(Entity::Status, id.as_str()));
        }
    }
    tx.commit().await.context("Failed to commit reorder")?;
    info!(count = order.len(), "reordered statuses");
    list_statuses(pool, true).await
}

/// Delete a status. Refused while any contact still sits in it.
pub async fn delete_status(pool: &SqlitePool, id: &str) -> CrmResult<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts WHERE status_id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to count contacts")?;

    let result = sqlx::query("DELETE FROM statuses WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete status")?;
    if result.rows_affected() == 0 {
        return Err(CrmError::not_found(Entity::Status, id));
    }
    if in_use > 0 {
        return Err(CrmError::conflict(format!(
            "status is used by {} contact(s)",
            in_use
        )));
    }
    tx.commit().await.context("Failed to commit status delete")?;
    info!(%id, "deleted status");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn input(name: &str) -> StatusInput {
        StatusInput {
            name: name.to_string(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_seeded_statuses_listed_in_order() {
        let (_tmp, pool) = test_pool().await;
        let statuses = list_statuses(&pool, true).await.unwrap();
        let names: Vec<&str> = statuses.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["New", "Active", "Inactive", "Archived"]);
        assert!(statuses.iter().all(|s| s.contact_count == 0));
    }

    #[tokio::test]
    async fn test_create_appends_and_rejects_duplicates() {
        let (_tmp, pool) = test_pool().await;
        let created = create_status(&pool, &input("Follow up")).await.unwrap();
        assert_eq!(created.sort_order, 5);

        let err = create_status(&pool, &input("follow UP")).await.unwrap_err();
        assert!(matches!(err, CrmError::Conflict(_)));
        let err = create_status(&pool, &input("  ")).await.unwrap_err();
        assert!(matches!(err, CrmError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_inactive_hidden_by_default() {
        let (_tmp, pool) = test_pool().await;
        let archived = list_statuses(&pool, true)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.name == "Archived")
            .unwrap();
        let patch = StatusPatch {
            name: None,
            is_active: Some(false),
        };
        update_status(&pool, &archived.id, &patch).await.unwrap();

        assert_eq!(list_statuses(&pool, false).await.unwrap().len(), 3);
        assert_eq!(list_statuses(&pool, true).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_reorder_is_atomic() {
        let (_tmp, pool) = test_pool().await;
        let before = list_statuses(&pool, true).await.unwrap();
        let mut order: Vec<String> = before.iter().rev().map(|s| s.id.clone()).collect();

        let reordered = reorder_statuses(&pool, &order).await.unwrap();
        assert_eq!(reordered[0].name, "Archived");

        order.push("missing".to_string());
        order.swap(0, 1);
        let err = reorder_statuses(&pool, &order).await.unwrap_err();
        assert!(matches!(err, CrmError::NotFound { .. }));
        let after = list_statuses(&pool, true).await.unwrap();
        assert_eq!(after[0].name, "Archived");
    }

    #[tokio::test]
    async fn test_delete_in_use_conflicts() {
        let (_tmp, pool) = test_pool().await;
        let new = list_statuses(&pool, true).await.unwrap().remove(0);
        let now = timestamp::now();
        sqlx::query(
            "INSERT INTO contacts (id, first_name, status_id, sort_order_in_status, created_at, updated_at) VALUES ('c1', 'Ann', ?, 0, ?, ?)",
        )
        .bind(&new.id)
        .bind(&now)
        .bind(&now)
        .execute(&pool)
        .await
        .unwrap();

        let err = delete_status(&pool, &new.id).await.unwrap_err();
        assert!(matches!(err, CrmError::Conflict(_)));
        let err = delete_status(&pool, "missing").await.unwrap_err();
        assert!(matches!(err, CrmError::NotFound { .. }));

        let created = create_status(&pool, &input("Temp")).await.unwrap();
        delete_status(&pool, &created.id).await.unwrap();
    }
}
