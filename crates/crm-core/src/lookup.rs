//! References to lookup rows (tags, interests, occupations, statuses) as
//! they arrive in contact payloads.
//!
//! A client either points at a row it already knows, by id, or names a row
//! that may not exist yet:
//!
//! ```json
//! { "tags": ["5f0c…", { "name": "climbing" }] }
//! ```
//!
//! `New` references are resolved by an explicit upsert step before the
//! contact itself is written; an existing row with the same name is reused.

use serde::{Deserialize, Serialize};

use crate::error::{CrmError, CrmResult};

/// A reference to a lookup row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LookupRef {
    Existing(String),
    New { name: String },
}

impl LookupRef {
    /// Reject empty ids and blank names; trims names.
    pub fn normalized(&self) -> CrmResult<LookupRef> {
        match self {
            LookupRef::Existing(id) if id.trim().is_empty() => {
                Err(CrmError::invalid("lookup id must not be empty"))
            }
            LookupRef::Existing(id) => Ok(LookupRef::Existing(id.trim().to_string())),
            LookupRef::New { name } => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(CrmError::invalid("lookup name must not be empty"));
                }
                Ok(LookupRef::New {
                    name: name.to_string(),
                })
            }
        }
    }
}

/// The lookup tables that hang off a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Tag,
    Interest,
    Occupation,
}

impl LookupKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tags" | "tag" => Some(LookupKind::Tag),
            "interests" | "interest" => Some(LookupKind::Interest),
            "occupations" | "occupation" => Some(LookupKind::Occupation),
            _ => None,
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            LookupKind::Tag => "tags",
            LookupKind::Interest => "interests",
            LookupKind::Occupation => "occupations",
        }
    }

    /// Join table linking contacts to this lookup.
    pub fn join_table(self) -> &'static str {
        match self {
            LookupKind::Tag => "contact_tags",
            LookupKind::Interest => "contact_interests",
            LookupKind::Occupation => "contact_occupations",
        }
    }

    /// Foreign-key column in [`join_table`](Self::join_table).
    pub fn join_column(self) -> &'static str {
        match self {
            LookupKind::Tag => "tag_id",
            LookupKind::Interest => "interest_id",
            LookupKind::Occupation => "occupation_id",
        }
    }

    pub fn entity(self) -> crate::error::Entity {
        match self {
            LookupKind::Tag => crate::error::Entity::Tag,
            LookupKind::Interest => crate::error::Entity::Interest,
            LookupKind::Occupation => crate::error::Entity::Occupation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_and_object_forms() {
        let refs: Vec<LookupRef> =
            serde_json::from_str(r#"["abc", {"name": "climbing"}]"#).unwrap();
        assert_eq!(
            refs,
            vec![
                LookupRef::Existing("abc".to_string()),
                LookupRef::New {
                    name: "climbing".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_blank_name_rejected() {
        let r = LookupRef::New {
            name: "   ".to_string(),
        };
        assert!(r.normalized().is_err());
        let r = LookupRef::New {
            name: " rust ".to_string(),
        };
        assert_eq!(
            r.normalized().unwrap(),
            LookupRef::New {
                name: "rust".to_string()
            }
        );
    }

    #[test]
    fn test_kind_tables() {
        let kind = LookupKind::parse("interests").unwrap();
        assert_eq!(kind.table(), "interests");
        assert_eq!(kind.join_table(), "contact_interests");
        assert_eq!(kind.join_column(), "interest_id");
        assert!(LookupKind::parse("statuses").is_none());
    }
}
