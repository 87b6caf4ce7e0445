//! Contact CRUD, listing, and column bookkeeping.
//!
//! Every write runs in one sqlx transaction. Lookup references are resolved
//! (and created when new) inside that transaction before the contact row is
//! touched. A contact entering a column is appended at its end; a contact
//! leaving one (status change or delete) closes the gap it leaves, so every
//! column stays dense.

use anyhow::Context;
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crm_core::error::{CrmError, CrmResult, Entity};
use crm_core::kanban::plan_removal;
use crm_core::lookup::{LookupKind, LookupRef};
use crm_core::models::{canonical_pair, ContactPlacement};

use crate::config::PaginationConfig;
use crate::lookups;
use crate::models::{
    photo_url, ContactBrief, ContactListItem, ContactPage, ContactView, NamedRef, Pagination,
};
use crate::sqlite_store::{column_siblings, write_position};
use crate::timestamp;

/// Payload for creating a contact.
#[derive(Debug, Default, Deserialize)]
pub struct ContactInput {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub telegram_username: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_username: Option<String>,
    pub met_at: Option<String>,
    pub notes: Option<String>,
    #[serde(alias = "status_id")]
    pub status: Option<LookupRef>,
    #[serde(default, alias = "tag_ids")]
    pub tags: Vec<LookupRef>,
    #[serde(default, alias = "interest_ids")]
    pub interests: Vec<LookupRef>,
    #[serde(default, alias = "occupation_ids")]
    pub occupations: Vec<LookupRef>,
    #[serde(default)]
    pub association_contact_ids: Vec<String>,
}

/// Partial update. Absent fields are left alone; provided lists replace.
#[derive(Debug, Default, Deserialize)]
pub struct ContactPatch {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub telegram_username: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_username: Option<String>,
    pub met_at: Option<String>,
    pub notes: Option<String>,
    #[serde(alias = "status_id")]
    pub status: Option<LookupRef>,
    #[serde(alias = "tag_ids")]
    pub tags: Option<Vec<LookupRef>>,
    #[serde(alias = "interest_ids")]
    pub interests: Option<Vec<LookupRef>>,
    #[serde(alias = "occupation_ids")]
    pub occupations: Option<Vec<LookupRef>>,
    pub association_contact_ids: Option<Vec<String>>,
}

/// Query string of `GET /api/v1/contacts`.
///
/// Id lists are comma-separated (`tag_ids=a,b`); dates are `YYYY-MM-DD`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub status_id: Option<String>,
    pub tag_ids: Option<String>,
    pub interest_ids: Option<String>,
    pub occupation_ids: Option<String>,
    pub created_from: Option<String>,
    pub created_to: Option<String>,
    pub met_from: Option<String>,
    pub met_to: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// Validated list filters, ready to be pushed into SQL.
#[derive(Debug, Default)]
struct Filters {
    status_id: Option<String>,
    lookups: Vec<(LookupKind, Vec<String>)>,
    created_from: Option<String>,
    created_to: Option<String>,
    met_from: Option<String>,
    met_to: Option<String>,
    words: Vec<String>,
}

const SORTABLE: &[&str] = &["created_at", "updated_at", "first_name", "last_name", "met_at"];

fn split_ids(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_day(field: &str, raw: &Option<String>) -> CrmResult<Option<chrono::NaiveDate>> {
    match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => timestamp::parse_date(s)
            .map(Some)
            .ok_or_else(|| CrmError::invalid(format!("{} must be a YYYY-MM-DD date", field))),
    }
}

impl ListQuery {
    fn filters(&self) -> CrmResult<Filters> {
        let mut by_lookup = Vec::new();
        for (kind, raw) in [
            (LookupKind::Tag, &self.tag_ids),
            (LookupKind::Interest, &self.interest_ids),
            (LookupKind::Occupation, &self.occupation_ids),
        ] {
            let ids = split_ids(raw);
            if !ids.is_empty() {
                by_lookup.push((kind, ids));
            }
        }

        let words = self
            .search
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .map(lookups::escape_like)
            .collect();

        Ok(Filters {
            status_id: self.status_id.clone().filter(|s| !s.trim().is_empty()),
            lookups: by_lookup,
            created_from: parse_day("created_from", &self.created_from)?.map(timestamp::start_of_day),
            created_to: parse_day("created_to", &self.created_to)?.map(timestamp::end_of_day),
            met_from: parse_day("met_from", &self.met_from)?.map(|d| d.to_string()),
            met_to: parse_day("met_to", &self.met_to)?.map(|d| d.to_string()),
            words,
        })
    }

    fn pagination(&self, config: &PaginationConfig, total_items: i64) -> CrmResult<Pagination> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(CrmError::invalid("page must be >= 1"));
        }
        let page_size = self.page_size.unwrap_or(config.default_page_size);
        if !(1..=config.max_page_size).contains(&page_size) {
            return Err(CrmError::invalid(format!(
                "page_size must be between 1 and {}",
                config.max_page_size
            )));
        }
        if (page - 1).checked_mul(page_size).is_none() {
            return Err(CrmError::invalid("page out of range"));
        }
        Ok(Pagination::new(page, page_size, total_items))
    }

    fn order_by(&self) -> CrmResult<String> {
        let column = self.sort_by.as_deref().unwrap_or("created_at");
        if !SORTABLE.contains(&column) {
            return Err(CrmError::invalid(format!("cannot sort by '{}'", column)));
        }
        let direction = match self.sort_order.as_deref().unwrap_or("desc") {
            "asc" => "ASC",
            "desc" => "DESC",
            other => {
                return Err(CrmError::invalid(format!(
                    "sort_order must be asc or desc, got '{}'",
                    other
                )))
            }
        };
        Ok(format!(" ORDER BY c.{} {}, c.id {}", column, direction, direction))
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filters: &Filters) {
    qb.push(" WHERE 1 = 1");
    if let Some(status_id) = &filters.status_id {
        qb.push(" AND c.status_id = ").push_bind(status_id.clone());
    }
    for (kind, ids) in &filters.lookups {
        qb.push(format!(
            " AND c.id IN (SELECT contact_id FROM {} WHERE {} IN (",
            kind.join_table(),
            kind.join_column()
        ));
        let mut list = qb.separated(", ");
        for id in ids {
            list.push_bind(id.clone());
        }
        qb.push("))");
    }
    if let Some(from) = &filters.created_from {
        qb.push(" AND c.created_at >= ").push_bind(from.clone());
    }
    if let Some(to) = &filters.created_to {
        qb.push(" AND c.created_at <= ").push_bind(to.clone());
    }
    if let Some(from) = &filters.met_from {
        qb.push(" AND c.met_at >= ").push_bind(from.clone());
    }
    if let Some(to) = &filters.met_to {
        qb.push(" AND c.met_at <= ").push_bind(to.clone());
    }
    // Every word must hit at least one name field.
    for word in &filters.words {
        qb.push(" AND (");
        for (i, field) in ["first_name", "middle_name", "last_name"].iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(format!(" c.{} LIKE '%' || ", field))
                .push_bind(word.clone())
                .push(" || '%' ESCAPE '\\'");
        }
        qb.push(")");
    }
}

pub async fn list_contacts(
    pool: &SqlitePool,
    config: &PaginationConfig,
    query: &ListQuery,
) -> CrmResult<ContactPage> {
    let filters = query.filters()?;
    let order_by = query.order_by()?;

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM contacts c");
    push_filters(&mut count, &filters);
    let total_items: i64 = count
        .build_query_scalar()
        .fetch_one(pool)
        .await
        .context("Failed to count contacts")?;

    let pagination = query.pagination(config, total_items)?;

    let mut select = QueryBuilder::<Sqlite>::new(
        "SELECT c.id, c.first_name, c.middle_name, c.last_name, c.photo_path, c.created_at, \
         c.status_id, s.name AS status_name \
         FROM contacts c LEFT JOIN statuses s ON s.id = c.status_id",
    );
    push_filters(&mut select, &filters);
    select.push(order_by);
    select
        .push(" LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let rows = select
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list contacts")?;

    let mut conn = pool.acquire().await.context("Failed to acquire connection")?;
    let mut data = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: String = row.get("id");
        let tags = lookups::linked(&mut conn, &id, LookupKind::Tag).await?;
        let photo_path: Option<String> = row.get("photo_path");
        data.push(ContactListItem {
            first_name: row.get("first_name"),
            middle_name: row.get("middle_name"),
            last_name: row.get("last_name"),
            status: status_ref(row),
            photo_url: photo_url(photo_path.as_deref()),
            tags,
            created_at: row.get("created_at"),
            id,
        });
    }

    Ok(ContactPage { data, pagination })
}

fn status_ref(row: &SqliteRow) -> Option<NamedRef> {
    let id: Option<String> = row.get("status_id");
    let name: Option<String> = row.get("status_name");
    match (id, name) {
        (Some(id), Some(name)) => Some(NamedRef { id, name }),
        _ => None,
    }
}

/// Full contact view, read on an existing connection.
async fn load_contact(conn: &mut SqliteConnection, id: &str) -> CrmResult<ContactView> {
    let row = sqlx::query(
        "SELECT c.*, s.name AS status_name FROM contacts c LEFT JOIN statuses s ON s.id = c.status_id WHERE c.id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to read contact")?
    .ok_or_else(|| CrmError::not_found(Entity::Contact, id))?;

    let tags = lookups::linked(conn, id, LookupKind::Tag).await?;
    let interests = lookups::linked(conn, id, LookupKind::Interest).await?;
    let occupations = lookups::linked(conn, id, LookupKind::Occupation).await?;
    let associations = neighbors(conn, id).await?;
    let photo_path: Option<String> = row.get("photo_path");

    Ok(ContactView {
        id: row.get("id"),
        first_name: row.get("first_name"),
        middle_name: row.get("middle_name"),
        last_name: row.get("last_name"),
        telegram_username: row.get("telegram_username"),
        linkedin_url: row.get("linkedin_url"),
        github_username: row.get("github_username"),
        met_at: row.get("met_at"),
        status_id: row.get("status_id"),
        status: status_ref(&row),
        notes: row.get("notes"),
        photo_url: photo_url(photo_path.as_deref()),
        photo_path,
        tags,
        interests,
        occupations,
        associations,
        sort_order_in_status: row.get("sort_order_in_status"),
        cluster_id: row.get("cluster_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Contacts linked to `id` in either direction, each listed once.
async fn neighbors(conn: &mut SqliteConnection, id: &str) -> anyhow::Result<Vec<ContactBrief>> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT c.id, c.first_name, c.middle_name, c.last_name
        FROM contact_associations a
        JOIN contacts c
          ON c.id = CASE WHEN a.source_contact_id = ?1 THEN a.target_contact_id ELSE a.source_contact_id END
        WHERE a.source_contact_id = ?1 OR a.target_contact_id = ?1
        ORDER BY c.first_name ASC, c.id ASC
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ContactBrief {
            id: row.get("id"),
            first_name: row.get("first_name"),
            middle_name: row.get("middle_name"),
            last_name: row.get("last_name"),
        })
        .collect())
}

pub async fn get_contact(pool: &SqlitePool, id: &str) -> CrmResult<ContactView> {
    let mut conn = pool.acquire().await.context("Failed to acquire connection")?;
    load_contact(&mut conn, id).await
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_name(name: &str) -> CrmResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CrmError::invalid("first_name must not be empty"));
    }
    Ok(name.to_string())
}

fn clean_met_at(raw: &Option<String>) -> CrmResult<Option<String>> {
    Ok(parse_day("met_at", raw)?.map(|d| d.to_string()))
}

async fn column_len(conn: &mut SqliteConnection, status_id: &str) -> anyhow::Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts WHERE status_id = ?")
        .bind(status_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Close the gap a departed contact left in `status_id`.
async fn compact_column(
    conn: &mut SqliteConnection,
    status_id: &str,
    removed: &ContactPlacement,
) -> anyhow::Result<()> {
    let siblings = column_siblings(conn, status_id).await?;
    let updates = plan_removal(status_id, removed, &siblings);
    for update in &updates {
        write_position(conn, &update.contact_id, &update.status_id, update.position).await?;
    }
    debug!(%status_id, shifted = updates.len(), "compacted column");
    Ok(())
}

/// Link `contact_id` to each of `targets`, optionally dropping its existing
/// edges first. Duplicates collapse onto one canonical pair.
async fn replace_associations(
    conn: &mut SqliteConnection,
    contact_id: &str,
    targets: &[String],
    replace: bool,
) -> CrmResult<()> {
    if replace {
        sqlx::query("DELETE FROM contact_associations WHERE source_contact_id = ? OR target_contact_id = ?")
            .bind(contact_id)
            .bind(contact_id)
            .execute(&mut *conn)
            .await
            .context("Failed to clear associations")?;
    }

    for target in targets {
        let target = target.trim();
        if target == contact_id {
            return Err(CrmError::invalid("a contact cannot be associated with itself"));
        }
        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM contacts WHERE id = ?")
            .bind(target)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to look up contact")?;
        if exists.is_none() {
            return Err(CrmError::not_found(Entity::Contact, target));
        }

        let (source, target) = canonical_pair(contact_id, target);
        sqlx::query(
            "INSERT OR IGNORE INTO contact_associations (id, source_contact_id, target_contact_id, label, created_at) VALUES (?, ?, ?, NULL, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(source)
        .bind(target)
        .bind(timestamp::now())
        .execute(&mut *conn)
        .await
        .context("Failed to insert association")?;
    }
    Ok(())
}

pub async fn create_contact(pool: &SqlitePool, input: &ContactInput) -> CrmResult<ContactView> {
    let first_name = required_name(&input.first_name)?;
    let met_at = clean_met_at(&input.met_at)?;

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let status_id = match &input.status {
        Some(reference) => Some(lookups::resolve_status(&mut tx, reference).await?),
        None => None,
    };
    let tags = lookups::resolve_all(&mut tx, LookupKind::Tag, &input.tags).await?;
    let interests = lookups::resolve_all(&mut tx, LookupKind::Interest, &input.interests).await?;
    let occupations =
        lookups::resolve_all(&mut tx, LookupKind::Occupation, &input.occupations).await?;

    let position = match &status_id {
        Some(status_id) => column_len(&mut tx, status_id).await?,
        None => 0,
    };

    let id = uuid::Uuid::new_v4().to_string();
    let now = timestamp::now();
    sqlx::query(
        r#"
        INSERT INTO contacts (
            id, first_name, middle_name, last_name, telegram_username, linkedin_url,
            github_username, met_at, status_id, notes, sort_order_in_status, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&first_name)
    .bind(clean(&input.middle_name))
    .bind(clean(&input.last_name))
    .bind(clean(&input.telegram_username))
    .bind(clean(&input.linkedin_url))
    .bind(clean(&input.github_username))
    .bind(&met_at)
    .bind(&status_id)
    .bind(clean(&input.notes))
    .bind(position)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .context("Failed to insert contact")?;

    lookups::replace_links(&mut tx, &id, LookupKind::Tag, &tags).await?;
    lookups::replace_links(&mut tx, &id, LookupKind::Interest, &interests).await?;
    lookups::replace_links(&mut tx, &id, LookupKind::Occupation, &occupations).await?;
    replace_associations(&mut tx, &id, &input.association_contact_ids, false).await?;

    let view = load_contact(&mut tx, &id).await?;
    tx.commit().await.context("Failed to commit contact")?;
    info!(%id, status_id = ?view.status_id, position, "created contact");
    Ok(view)
}

pub async fn update_contact(
    pool: &SqlitePool,
    id: &str,
    patch: &ContactPatch,
) -> CrmResult<ContactView> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row = sqlx::query("SELECT status_id, sort_order_in_status FROM contacts WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read contact")?
        .ok_or_else(|| CrmError::not_found(Entity::Contact, id))?;
    let old_status: Option<String> = row.get("status_id");
    let old_position: i64 = row.get("sort_order_in_status");

    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE contacts SET updated_at = ");
    qb.push_bind(timestamp::now());
    if let Some(name) = &patch.first_name {
        qb.push(", first_name = ").push_bind(required_name(name)?);
    }
    for (column, value) in [
        ("middle_name", &patch.middle_name),
        ("last_name", &patch.last_name),
        ("telegram_username", &patch.telegram_username),
        ("linkedin_url", &patch.linkedin_url),
        ("github_username", &patch.github_username),
        ("notes", &patch.notes),
    ] {
        if value.is_some() {
            qb.push(format!(", {} = ", column)).push_bind(clean(value));
        }
    }
    if patch.met_at.is_some() {
        qb.push(", met_at = ").push_bind(clean_met_at(&patch.met_at)?);
    }
    qb.push(" WHERE id = ").push_bind(id.to_string());
    qb.build()
        .execute(&mut *tx)
        .await
        .context("Failed to update contact")?;

    if let Some(reference) = &patch.status {
        let new_status = lookups::resolve_status(&mut tx, reference).await?;
        if old_status.as_deref() != Some(new_status.as_str()) {
            if let Some(old) = &old_status {
                let placement = ContactPlacement {
                    contact_id: id.to_string(),
                    status_id: Some(old.clone()),
                    position: old_position,
                };
                compact_column(&mut tx, old, &placement).await?;
            }
            let end = column_len(&mut tx, &new_status).await?;
            write_position(&mut tx, id, &new_status, end).await?;
            debug!(%id, from = ?old_status, to = %new_status, position = end, "status changed");
        }
    }

    for (kind, refs) in [
        (LookupKind::Tag, &patch.tags),
        (LookupKind::Interest, &patch.interests),
        (LookupKind::Occupation, &patch.occupations),
    ] {
        if let Some(refs) = refs {
            let ids = lookups::resolve_all(&mut tx, kind, refs).await?;
            lookups::replace_links(&mut tx, id, kind, &ids).await?;
        }
    }
    if let Some(targets) = &patch.association_contact_ids {
        replace_associations(&mut tx, id, targets, true).await?;
    }

    let view = load_contact(&mut tx, id).await?;
    tx.commit().await.context("Failed to commit contact")?;
    info!(%id, "updated contact");
    Ok(view)
}

/// Delete a contact and compact its column. Returns the stored photo name,
/// if any, so the caller can remove the file once the row is gone.
pub async fn delete_contact(pool: &SqlitePool, id: &str) -> CrmResult<Option<String>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row = sqlx::query("SELECT status_id, sort_order_in_status, photo_path FROM contacts WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read contact")?
        .ok_or_else(|| CrmError::not_found(Entity::Contact, id))?;
    let status_id: Option<String> = row.get("status_id");
    let position: i64 = row.get("sort_order_in_status");
    let photo_path: Option<String> = row.get("photo_path");

    sqlx::query("DELETE FROM contacts WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete contact")?;

    if let Some(status_id) = &status_id {
        let placement = ContactPlacement {
            contact_id: id.to_string(),
            status_id: Some(status_id.clone()),
            position,
        };
        compact_column(&mut tx, status_id, &placement).await?;
    }

    tx.commit().await.context("Failed to commit contact delete")?;
    info!(%id, "deleted contact");
    Ok(photo_path)
}

/// Point a contact at a stored photo. Returns the replaced photo name.
pub async fn set_photo_path(
    pool: &SqlitePool,
    id: &str,
    photo_path: Option<&str>,
) -> CrmResult<Option<String>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let previous: Option<Option<String>> =
        sqlx::query_scalar("SELECT photo_path FROM contacts WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to read contact")?;
    let previous = previous.ok_or_else(|| CrmError::not_found(Entity::Contact, id))?;

    sqlx::query("UPDATE contacts SET photo_path = ?, updated_at = ? WHERE id = ?")
        .bind(photo_path)
        .bind(timestamp::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update photo")?;
    tx.commit().await.context("Failed to commit photo")?;
    Ok(previous)
}
