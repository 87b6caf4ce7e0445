//! Association graph: the view the frontend draws, and edge maintenance.
//!
//! Cluster labels themselves are computed in `crm_core::cluster`; this
//! module only reads them back and attaches palette colors.

use anyhow::Context;
use serde::Deserialize;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crm_core::cluster::cluster_color;
use crm_core::error::{CrmError, CrmResult, Entity};
use crm_core::models::canonical_pair;

use crate::db::is_unique_violation;
use crate::models::{photo_url, EdgeView, GraphCluster, GraphEdge, GraphNode, GraphView};
use crate::timestamp;

/// Longest accepted edge label, in characters.
pub const MAX_LABEL_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct EdgeInput {
    pub source_id: String,
    pub target_id: String,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NodePosition {
    pub position_x: f64,
    pub position_y: f64,
}

pub async fn get_graph(pool: &SqlitePool) -> CrmResult<GraphView> {
    let rows = sqlx::query(
        "SELECT id, first_name, last_name, photo_path, cluster_id, position_x, position_y FROM contacts ORDER BY created_at ASC, rowid ASC",
    )
    .fetch_all(pool)
    .await
    .context("Failed to read graph nodes")?;
    let nodes: Vec<GraphNode> = rows
        .iter()
        .map(|row| {
            let photo_path: Option<String> = row.get("photo_path");
            GraphNode {
                id: row.get("id"),
                first_name: row.get("first_name"),
                last_name: row.get("last_name"),
                photo_url: photo_url(photo_path.as_deref()),
                cluster_id: row.get("cluster_id"),
                position_x: row.get("position_x"),
                position_y: row.get("position_y"),
            }
        })
        .collect();

    let rows = sqlx::query(
        "SELECT id, source_contact_id, target_contact_id, label FROM contact_associations ORDER BY created_at ASC, rowid ASC",
    )
    .fetch_all(pool)
    .await
    .context("Failed to read graph edges")?;
    let edges = rows
        .iter()
        .map(|row| GraphEdge {
            id: row.get("id"),
            source_id: row.get("source_contact_id"),
            target_id: row.get("target_contact_id"),
            label: row.get("label"),
        })
        .collect();

    let rows = sqlx::query(
        "SELECT cluster_id, COUNT(*) AS contact_count FROM contacts WHERE cluster_id IS NOT NULL GROUP BY cluster_id ORDER BY cluster_id ASC",
    )
    .fetch_all(pool)
    .await
    .context("Failed to read clusters")?;
    let clusters = rows
        .iter()
        .map(|row| {
            let id: i64 = row.get("cluster_id");
            GraphCluster {
                id,
                contact_count: row.get("contact_count"),
                color: cluster_color(id).to_string(),
            }
        })
        .collect();

    Ok(GraphView {
        nodes,
        edges,
        clusters,
    })
}

async fn contact_exists(pool: &SqlitePool, id: &str) -> CrmResult<()> {
    let found: Option<String> = sqlx::query_scalar("SELECT id FROM contacts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to look up contact")?;
    found
        .map(|_| ())
        .ok_or_else(|| CrmError::not_found(Entity::Contact, id))
}

/// Link two contacts. The pair is stored with the smaller id as source, so
/// A→B and B→A are the same edge.
pub async fn create_edge(pool: &SqlitePool, input: &EdgeInput) -> CrmResult<EdgeView> {
    if input.source_id == input.target_id {
        return Err(CrmError::invalid("a contact cannot be linked to itself"));
    }
    let label = input
        .label
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if let Some(label) = &label {
        if label.chars().count() > MAX_LABEL_CHARS {
            return Err(CrmError::invalid(format!(
                "label must be at most {} characters",
                MAX_LABEL_CHARS
            )));
        }
    }
    contact_exists(pool, &input.source_id).await?;
    contact_exists(pool, &input.target_id).await?;

    let (source, target) = canonical_pair(&input.source_id, &input.target_id);
    let id = uuid::Uuid::new_v4().to_string();
    let created_at = timestamp::now();
    let result = sqlx::query(
        "INSERT INTO contact_associations (id, source_contact_id, target_contact_id, label, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(source)
    .bind(target)
    .bind(&label)
    .bind(&created_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => {
            info!(%id, %source, %target, "created edge");
            Ok(EdgeView {
                id,
                source_id: source.to_string(),
                target_id: target.to_string(),
                label,
                created_at,
            })
        }
        Err(e) if is_unique_violation(&e) => {
            Err(CrmError::conflict("these contacts are already linked"))
        }
        Err(e) => Err(anyhow::Error::from(e).context("Failed to insert edge").into()),
    }
}

pub async fn delete_edge(pool: &SqlitePool, id: &str) -> CrmResult<()> {
    let result = sqlx::query("DELETE FROM contact_associations WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete edge")?;
    if result.rows_affected() == 0 {
        return Err(CrmError::not_found(Entity::Edge, id));
    }
    info!(%id, "deleted edge");
    Ok(())
}

/// Store layout coordinates for a node. Does not touch `updated_at`.
pub async fn update_node_position(
    pool: &SqlitePool,
    contact_id: &str,
    position: &NodePosition,
) -> CrmResult<()> {
    if !position.position_x.is_finite() || !position.position_y.is_finite() {
        return Err(CrmError::invalid("coordinates must be finite numbers"));
    }
    let result = sqlx::query("UPDATE contacts SET position_x = ?, position_y = ? WHERE id = ?")
        .bind(position.position_x)
        .bind(position.position_y)
        .bind(contact_id)
        .execute(pool)
        .await
        .context("Failed to store node position")?;
    if result.rows_affected() == 0 {
        return Err(CrmError::not_found(Entity::Contact, contact_id));
    }
    Ok(())
}
