//! Response shapes returned by the HTTP API and printed by the CLI.
//!
//! These are views assembled from several tables; the types the core
//! algorithms work on live in `crm_core::models`.

use serde::Serialize;

/// `{id, name}` pair for statuses and lookups embedded in a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

/// A neighbor in the association graph, as embedded in a contact.
#[derive(Debug, Clone, Serialize)]
pub struct ContactBrief {
    pub id: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
}

/// Full contact, as returned by get/create/update.
#[derive(Debug, Clone, Serialize)]
pub struct ContactView {
    pub id: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub telegram_username: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_username: Option<String>,
    pub met_at: Option<String>,
    pub status_id: Option<String>,
    pub status: Option<NamedRef>,
    pub notes: Option<String>,
    pub photo_path: Option<String>,
    pub photo_url: Option<String>,
    pub tags: Vec<NamedRef>,
    pub interests: Vec<NamedRef>,
    pub occupations: Vec<NamedRef>,
    pub associations: Vec<ContactBrief>,
    pub sort_order_in_status: i64,
    pub cluster_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Row of a contact listing.
#[derive(Debug, Clone, Serialize)]
pub struct ContactListItem {
    pub id: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub status: Option<NamedRef>,
    pub photo_url: Option<String>,
    pub tags: Vec<NamedRef>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, page_size: i64, total_items: i64) -> Self {
        let total_pages = if total_items > 0 {
            (total_items + page_size - 1) / page_size
        } else {
            0
        };
        Self {
            page,
            page_size,
            total_items,
            total_pages,
        }
    }

    /// Row offset of the first item on this page; saturates instead of
    /// overflowing for pages past `i64::MAX` rows.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactPage {
    pub data: Vec<ContactListItem>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub id: String,
    pub name: String,
    pub sort_order: i64,
    pub is_active: bool,
    pub contact_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestionItem {
    pub id: String,
    pub name: String,
    pub usage_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub photo_url: Option<String>,
    pub cluster_id: Option<i64>,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphCluster {
    pub id: i64,
    pub contact_count: i64,
    pub color: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub clusters: Vec<GraphCluster>,
}

/// A freshly created association.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeView {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub label: Option<String>,
    pub created_at: String,
}

/// URL under which a stored photo is served.
pub fn photo_url(photo_path: Option<&str>) -> Option<String> {
    photo_path.map(|name| format!("/api/v1/photos/{}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_math() {
        let p = Pagination::new(1, 20, 0);
        assert_eq!(p.total_pages, 0);
        let p = Pagination::new(3, 20, 41);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset(), 40);
        let p = Pagination::new(1, 20, 40);
        assert_eq!(p.total_pages, 2);
    }

    #[test]
    fn test_offset_saturates_on_huge_page() {
        let p = Pagination::new(i64::MAX, 20, 5);
        assert_eq!(p.offset(), i64::MAX);
    }
}
