//! Tags, interests, occupations: resolution, linking, and autocomplete.
//!
//! Contact payloads refer to lookup rows through [`LookupRef`]. Before a
//! contact is written, every reference is resolved to a row id here: an
//! `Existing` id must exist, a `New` name is looked up case-insensitively
//! and created only if no row carries it yet.

use anyhow::Context;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crm_core::error::{CrmError, CrmResult, Entity};
use crm_core::lookup::{LookupKind, LookupRef};

use crate::models::{NamedRef, SuggestionItem};
use crate::timestamp;

/// Largest `limit` accepted by [`suggest`].
pub const MAX_SUGGESTIONS: i64 = 50;

/// Resolve one lookup reference to a row id, creating the row if needed.
pub async fn resolve(
    conn: &mut SqliteConnection,
    kind: LookupKind,
    reference: &LookupRef,
) -> CrmResult<String> {
    let table = kind.table();
    match reference.normalized()? {
        LookupRef::Existing(id) => {
            let found: Option<String> =
                sqlx::query_scalar(&format!("SELECT id FROM {} WHERE id = ?", table))
                    .bind(&id)
                    .fetch_optional(&mut *conn)
                    .await
                    .with_context(|| format!("Failed to look up {}", table))?;
            found.ok_or_else(|| CrmError::not_found(kind.entity(), id))
        }
        LookupRef::New { name } => {
            let existing: Option<String> = sqlx::query_scalar(&format!(
                "SELECT id FROM {} WHERE name = ? COLLATE NOCASE",
                table
            ))
            .bind(&name)
            .fetch_optional(&mut *conn)
            .await
            .with_context(|| format!("Failed to look up {}", table))?;
            if let Some(id) = existing {
                return Ok(id);
            }

            let id = uuid::Uuid::new_v4().to_string();
            sqlx::query(&format!(
                "INSERT INTO {} (id, name, created_at) VALUES (?, ?, ?)",
                table
            ))
            .bind(&id)
            .bind(&name)
            .bind(timestamp::now())
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to create {}", table))?;
            debug!(table, %name, %id, "created lookup row");
            Ok(id)
        }
    }
}

/// Resolve a list of references, dropping duplicates while keeping order.
pub async fn resolve_all(
    conn: &mut SqliteConnection,
    kind: LookupKind,
    references: &[LookupRef],
) -> CrmResult<Vec<String>> {
    let mut ids: Vec<String> = Vec::with_capacity(references.len());
    for reference in references {
        let id = resolve(conn, kind, reference).await?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Resolve a status reference. New statuses go to the end of the board.
pub async fn resolve_status(conn: &mut SqliteConnection, reference: &LookupRef) -> CrmResult<String> {
    match reference.normalized()? {
        LookupRef::Existing(id) => {
            let found: Option<String> = sqlx::query_scalar("SELECT id FROM statuses WHERE id = ?")
                .bind(&id)
                .fetch_optional(&mut *conn)
                .await
                .context("Failed to look up status")?;
            found.ok_or_else(|| CrmError::not_found(Entity::Status, id))
        }
        LookupRef::New { name } => {
            let existing: Option<String> =
                sqlx::query_scalar("SELECT id FROM statuses WHERE name = ? COLLATE NOCASE")
                    .bind(&name)
                    .fetch_optional(&mut *conn)
                    .await
                    .context("Failed to look up status")?;
            if let Some(id) = existing {
                return Ok(id);
            }
            crate::statuses::insert_status(conn, &name, true).await
        }
    }
}

/// Replace the set of `kind` rows linked to a contact.
pub async fn replace_links(
    conn: &mut SqliteConnection,
    contact_id: &str,
    kind: LookupKind,
    ids: &[String],
) -> anyhow::Result<()> {
    sqlx::query(&format!(
        "DELETE FROM {} WHERE contact_id = ?",
        kind.join_table()
    ))
    .bind(contact_id)
    .execute(&mut *conn)
    .await?;

    for id in ids {
        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} (contact_id, {}) VALUES (?, ?)",
            kind.join_table(),
            kind.join_column()
        ))
        .bind(contact_id)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Lookup rows linked to a contact, ordered by name.
pub async fn linked(
    conn: &mut SqliteConnection,
    contact_id: &str,
    kind: LookupKind,
) -> anyhow::Result<Vec<NamedRef>> {
    let sql = format!(
        "SELECT l.id, l.name FROM {table} l JOIN {join} j ON j.{col} = l.id WHERE j.contact_id = ? ORDER BY l.name ASC",
        table = kind.table(),
        join = kind.join_table(),
        col = kind.join_column()
    );
    let rows = sqlx::query(&sql)
        .bind(contact_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows
        .iter()
        .map(|row| NamedRef {
            id: row.get("id"),
            name: row.get("name"),
        })
        .collect())
}

/// Autocomplete: rows whose name contains `q`, most used first.
pub async fn suggest(
    pool: &SqlitePool,
    kind: LookupKind,
    q: &str,
    limit: i64,
) -> CrmResult<Vec<SuggestionItem>> {
    let q = q.trim();
    if q.is_empty() {
        return Err(CrmError::invalid("q must not be empty"));
    }
    if !(1..=MAX_SUGGESTIONS).contains(&limit) {
        return Err(CrmError::invalid(format!(
            "limit must be between 1 and {}",
            MAX_SUGGESTIONS
        )));
    }

    let sql = format!(
        r#"
        SELECT l.id, l.name, COUNT(j.contact_id) AS usage_count
        FROM {table} l
        LEFT JOIN {join} j ON j.{col} = l.id
        WHERE l.name LIKE '%' || ? || '%' ESCAPE '\'
        GROUP BY l.id, l.name
        ORDER BY usage_count DESC, l.name ASC
        LIMIT ?
        "#,
        table = kind.table(),
        join = kind.join_table(),
        col = kind.join_column()
    );
    let rows = sqlx::query(&sql)
        .bind(escape_like(q))
        .bind(limit)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to search {}", kind.table()))?;

    Ok(rows
        .iter()
        .map(|row| SuggestionItem {
            id: row.get("id"),
            name: row.get("name"),
            usage_count: row.get("usage_count"),
        })
        .collect())
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
