//! Core data types shared by the reindexer, the clusterer, and the stores.

use serde::{Deserialize, Serialize};

/// A pipeline stage (Kanban column).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub name: String,
    pub sort_order: i64,
    pub is_active: bool,
}

/// Where a contact currently sits on the board.
///
/// `status_id` is `None` for contacts that were never placed in a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactPlacement {
    pub contact_id: String,
    pub status_id: Option<String>,
    pub position: i64,
}

/// One contact in a status column, as returned by `list_siblings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sibling {
    pub contact_id: String,
    pub position: i64,
}

/// A single-row position write produced by the move planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionUpdate {
    pub contact_id: String,
    pub status_id: String,
    pub position: i64,
}

/// An association edge as read for clustering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeEndpoints {
    pub source_id: String,
    pub target_id: String,
}

impl EdgeEndpoints {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
        }
    }
}

/// Orders a pair of contact ids so that an unordered edge has exactly one
/// stored representation.
pub fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_pair_is_order_independent() {
        assert_eq!(canonical_pair("b", "a"), ("a", "b"));
        assert_eq!(canonical_pair("a", "b"), ("a", "b"));
    }
}
