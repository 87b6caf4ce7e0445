//! Connected-components clustering over the contact association graph.
//!
//! Each pass starts from scratch: a Union-Find structure gets one singleton
//! per contact, every edge unions its two endpoints, and each resulting
//! component receives a dense integer label. Labels are handed out in the
//! order components are first met while walking contacts in their stable
//! (creation) order, so rerunning on an unchanged graph yields the very same
//! labels, not just the same partition.
//!
//! A cluster's display color is `PALETTE[label % PALETTE.len()]`.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{CrmError, CrmResult};
use crate::models::EdgeEndpoints;
use crate::store::Store;

/// Name reported in recompute responses.
pub const ALGORITHM: &str = "connected_components";

/// Cluster colors, indexed by `label % PALETTE.len()`.
pub const PALETTE: [&str; 10] = [
    "#3B82F6", // blue
    "#EF4444", // red
    "#10B981", // green
    "#F59E0B", // amber
    "#8B5CF6", // purple
    "#EC4899", // pink
    "#06B6D4", // cyan
    "#84CC16", // lime
    "#F97316", // orange
    "#6366F1", // indigo
];

pub fn cluster_color(label: i64) -> &'static str {
    PALETTE[label.rem_euclid(PALETTE.len() as i64) as usize]
}

/// Disjoint-set forest with union by rank and path compression.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u32>,
}

impl UnionFind {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Merge the sets of `a` and `b`. Returns `false` if already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.rank[ra] < self.rank[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        if self.rank[ra] == self.rank[rb] {
            self.rank[ra] += 1;
        }
        true
    }
}

/// Labels computed by one clustering pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clustering {
    /// `(contact_id, label)` in the order contacts were given.
    pub labels: Vec<(String, i64)>,
    pub cluster_count: usize,
}

/// Partition `contact_ids` into connected components of `edges`.
///
/// Edges that mention an unknown contact are ignored. Self-loops are
/// harmless.
pub fn assign_labels(contact_ids: &[String], edges: &[EdgeEndpoints]) -> Clustering {
    let index: HashMap<&str, usize> = contact_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut sets = UnionFind::new(contact_ids.len());
    for edge in edges {
        if let (Some(&a), Some(&b)) = (
            index.get(edge.source_id.as_str()),
            index.get(edge.target_id.as_str()),
        ) {
            sets.union(a, b);
        }
    }

    let mut root_labels: HashMap<usize, i64> = HashMap::new();
    let mut labels = Vec::with_capacity(contact_ids.len());
    for (i, id) in contact_ids.iter().enumerate() {
        let root = sets.find(i);
        let next = root_labels.len() as i64;
        let label = *root_labels.entry(root).or_insert(next);
        labels.push((id.clone(), label));
    }

    Clustering {
        labels,
        cluster_count: root_labels.len(),
    }
}

/// Response body of `POST /api/v1/graph/clusters/recompute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecomputeSummary {
    pub clusters_found: usize,
    pub contacts_updated: usize,
    pub algorithm: String,
}

/// Recompute every contact's `cluster_id` from the full graph.
///
/// All label writes go through one unit of work; if any of them fails the
/// previous labels stay in place and the caller should simply rerun.
pub async fn recompute(store: &dyn Store) -> CrmResult<RecomputeSummary> {
    let mut tx = store.begin().await.map_err(CrmError::Transaction)?;

    let contact_ids = tx.list_all_contacts().await?;
    if contact_ids.is_empty() {
        return Ok(RecomputeSummary {
            clusters_found: 0,
            contacts_updated: 0,
            algorithm: ALGORITHM.to_string(),
        });
    }
    let edges = tx.list_all_edges().await?;

    let clustering = assign_labels(&contact_ids, &edges);

    let mut contacts_updated = 0;
    for (contact_id, label) in &clustering.labels {
        tx.update_cluster_label(contact_id, *label)
            .await
            .map_err(CrmError::Transaction)?;
        contacts_updated += 1;
    }
    tx.commit().await.map_err(CrmError::Transaction)?;

    Ok(RecomputeSummary {
        clusters_found: clustering.cluster_count,
        contacts_updated,
        algorithm: ALGORITHM.to_string(),
    })
}
