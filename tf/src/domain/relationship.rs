//! Relationships - directed edges between tasks
//!
//! `blocks` is the inverse arrow of `depends_on`; storage canonicalises it,
//! so the `relationships` table only ever holds `depends_on` for the
//! scheduling subgraph.

use serde::{Deserialize, Serialize};
use workstore::now_ms;

use super::id::generate_id;

/// Edge kind between two tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    DependsOn,
    Blocks,
    Related,
    DuplicateOf,
    Supersedes,
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DependsOn => "depends_on",
            Self::Blocks => "blocks",
            Self::Related => "related",
            Self::DuplicateOf => "duplicate_of",
            Self::Supersedes => "supersedes",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for RelationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "depends_on" => Ok(Self::DependsOn),
            "blocks" => Ok(Self::Blocks),
            "related" => Ok(Self::Related),
            "duplicate_of" => Ok(Self::DuplicateOf),
            "supersedes" => Ok(Self::Supersedes),
            _ => Err(format!("Unknown relation kind: {}", s)),
        }
    }
}

/// A directed edge `from_task --kind--> to_task`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub from_task: String,
    pub to_task: String,
    pub kind: RelationKind,
    pub created_at: i64,
}

impl Relationship {
    /// Create an edge, canonicalising `blocks(a, b)` to `depends_on(b, a)`
    pub fn new(from_task: impl Into<String>, to_task: impl Into<String>, kind: RelationKind) -> Self {
        let from_task = from_task.into();
        let to_task = to_task.into();
        let (from_task, to_task, kind) = match kind {
            RelationKind::Blocks => (to_task, from_task, RelationKind::DependsOn),
            other => (from_task, to_task, other),
        };
        Self {
            id: generate_id("rel", &format!("{}-{}", from_task, to_task)),
            from_task,
            to_task,
            kind,
            created_at: now_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depends_on_kept_as_is() {
        let rel = Relationship::new("a", "b", RelationKind::DependsOn);
        assert_eq!(rel.from_task, "a");
        assert_eq!(rel.to_task, "b");
        assert_eq!(rel.kind, RelationKind::DependsOn);
    }

    #[test]
    fn test_blocks_canonicalised_to_depends_on() {
        // a blocks b  ==  b depends_on a
        let rel = Relationship::new("a", "b", RelationKind::Blocks);
        assert_eq!(rel.from_task, "b");
        assert_eq!(rel.to_task, "a");
        assert_eq!(rel.kind, RelationKind::DependsOn);
    }

    #[test]
    fn test_other_kinds_untouched() {
        let rel = Relationship::new("a", "b", RelationKind::Related);
        assert_eq!(rel.from_task, "a");
        assert_eq!(rel.kind, RelationKind::Related);
    }

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in [
            RelationKind::DependsOn,
            RelationKind::Blocks,
            RelationKind::Related,
            RelationKind::DuplicateOf,
            RelationKind::Supersedes,
        ] {
            assert_eq!(kind.to_string().parse::<RelationKind>().unwrap(), kind);
        }
    }
}
