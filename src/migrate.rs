//! Database schema bootstrap (idempotent).
//!
//! Creates every table and index if missing and seeds the default pipeline
//! statuses into an empty `statuses` table. Running it repeatedly is safe.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::timestamp;

/// Statuses created on first initialization, in board order.
pub const DEFAULT_STATUSES: [&str; 4] = ["New", "Active", "Inactive", "Archived"];

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS statuses (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        sort_order INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contacts (
        id TEXT PRIMARY KEY,
        first_name TEXT NOT NULL,
        middle_name TEXT,
        last_name TEXT,
        telegram_username TEXT,
        linkedin_url TEXT,
        github_username TEXT,
        met_at TEXT,
        status_id TEXT REFERENCES statuses(id) ON DELETE SET NULL,
        notes TEXT,
        photo_path TEXT,
        sort_order_in_status INTEGER NOT NULL DEFAULT 0,
        cluster_id INTEGER,
        position_x REAL,
        position_y REAL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS interests (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS occupations (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contact_tags (
        contact_id TEXT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
        tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        PRIMARY KEY (contact_id, tag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contact_interests (
        contact_id TEXT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
        interest_id TEXT NOT NULL REFERENCES interests(id) ON DELETE CASCADE,
        PRIMARY KEY (contact_id, interest_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contact_occupations (
        contact_id TEXT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
        occupation_id TEXT NOT NULL REFERENCES occupations(id) ON DELETE CASCADE,
        PRIMARY KEY (contact_id, occupation_id)
    )
    "#,
    // Edges are stored with source < target, so the ordered UNIQUE pair
    // covers both directions and the CHECK also rules out self-loops.
    r#"
    CREATE TABLE IF NOT EXISTS contact_associations (
        id TEXT PRIMARY KEY,
        source_contact_id TEXT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
        target_contact_id TEXT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
        label TEXT,
        created_at TEXT NOT NULL,
        CHECK (source_contact_id < target_contact_id),
        UNIQUE (source_contact_id, target_contact_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_contacts_status ON contacts(status_id, sort_order_in_status)",
    "CREATE INDEX IF NOT EXISTS idx_contacts_created_at ON contacts(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_contacts_met_at ON contacts(met_at)",
    "CREATE INDEX IF NOT EXISTS idx_associations_target ON contact_associations(target_contact_id)",
];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an already-open pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    let status_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM statuses")
        .fetch_one(pool)
        .await?;

    if status_count == 0 {
        let now = timestamp::now();
        for (i, name) in DEFAULT_STATUSES.iter().enumerate() {
            sqlx::query(
                "INSERT INTO statuses (id, name, sort_order, is_active, created_at) VALUES (?, ?, ?, 1, ?)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(name)
            .bind(i as i64 + 1)
            .bind(&now)
            .execute(pool)
            .await?;
        }
        info!(count = DEFAULT_STATUSES.len(), "seeded default statuses");
    }

    Ok(())
}
