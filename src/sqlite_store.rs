//! SQLite-backed [`Store`] implementation.
//!
//! Each [`StoreTx`] wraps one sqlx transaction. Dropping it without calling
//! `commit` rolls the transaction back, which is how the reindexer and the
//! clusterer discard partial work after a failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use crm_core::models::{ContactPlacement, EdgeEndpoints, Sibling, Status};
use crm_core::store::{Store, StoreTx};

use crate::timestamp;

/// SQLite implementation of the [`Store`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(Box::new(SqliteTx { tx: Some(tx) }))
    }
}

/// One open SQLite transaction.
pub struct SqliteTx {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteTx {
    fn conn(&mut self) -> Result<&mut SqliteConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => anyhow::bail!("transaction already committed"),
        }
    }
}

/// Read the siblings of a column on any connection.
pub(crate) async fn column_siblings(
    conn: &mut SqliteConnection,
    status_id: &str,
) -> Result<Vec<Sibling>> {
    let rows = sqlx::query(
        "SELECT id, sort_order_in_status FROM contacts WHERE status_id = ? ORDER BY sort_order_in_status ASC, id ASC",
    )
    .bind(status_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Sibling {
            contact_id: row.get("id"),
            position: row.get("sort_order_in_status"),
        })
        .collect())
}

/// Write one contact's placement on any connection.
pub(crate) async fn write_position(
    conn: &mut SqliteConnection,
    contact_id: &str,
    status_id: &str,
    position: i64,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE contacts SET status_id = ?, sort_order_in_status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status_id)
    .bind(position)
    .bind(timestamp::now())
    .bind(contact_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("no contact row to update: {}", contact_id);
    }
    Ok(())
}

#[async_trait]
impl StoreTx for SqliteTx {
    async fn get_contact(&mut self, contact_id: &str) -> Result<Option<ContactPlacement>> {
        let row = sqlx::query("SELECT id, status_id, sort_order_in_status FROM contacts WHERE id = ?")
            .bind(contact_id)
            .fetch_optional(self.conn()?)
            .await?;

        Ok(row.map(|row| ContactPlacement {
            contact_id: row.get("id"),
            status_id: row.get("status_id"),
            position: row.get("sort_order_in_status"),
        }))
    }

    async fn get_status(&mut self, status_id: &str) -> Result<Option<Status>> {
        let row = sqlx::query("SELECT id, name, sort_order, is_active FROM statuses WHERE id = ?")
            .bind(status_id)
            .fetch_optional(self.conn()?)
            .await?;

        Ok(row.map(|row| Status {
            id: row.get("id"),
            name: row.get("name"),
            sort_order: row.get("sort_order"),
            is_active: row.get("is_active"),
        }))
    }

    async fn list_siblings(&mut self, status_id: &str) -> Result<Vec<Sibling>> {
        column_siblings(self.conn()?, status_id).await
    }

    async fn list_all_contacts(&mut self) -> Result<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM contacts ORDER BY created_at ASC, rowid ASC")
                .fetch_all(self.conn()?)
                .await?;
        Ok(ids)
    }

    async fn list_all_edges(&mut self) -> Result<Vec<EdgeEndpoints>> {
        let rows = sqlx::query(
            "SELECT source_contact_id, target_contact_id FROM contact_associations ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(self.conn()?)
        .await?;

        Ok(rows
            .iter()
            .map(|row| EdgeEndpoints {
                source_id: row.get("source_contact_id"),
                target_id: row.get("target_contact_id"),
            })
            .collect())
    }

    async fn update_position(
        &mut self,
        contact_id: &str,
        status_id: &str,
        position: i64,
    ) -> Result<()> {
        write_position(self.conn()?, contact_id, status_id, position).await
    }

    async fn update_cluster_label(&mut self, contact_id: &str, label: i64) -> Result<()> {
        sqlx::query("UPDATE contacts SET cluster_id = ? WHERE id = ?")
            .bind(label)
            .bind(contact_id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().context("transaction already committed")?;
        tx.commit().await.context("Failed to commit transaction")?;
        Ok(())
    }
}
