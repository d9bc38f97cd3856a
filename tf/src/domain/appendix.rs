//! Appendices - typed supplementary content attached to a task
//!
//! Two kinds gate readiness: `test_context` and `acceptance_criteria`.

use serde::{Deserialize, Serialize};
use workstore::now_ms;

use super::id::generate_id;

/// Closed set of appendix kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendixKind {
    CodeContext,
    TestContext,
    AcceptanceCriteria,
    GotchaList,
    RollbackPlan,
    PrdReference,
    ArchitectureDecision,
    ResearchNotes,
    DependencyNotes,
    UserStory,
    DiscoveryNotes,
}

impl std::fmt::Display for AppendixKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CodeContext => "code_context",
            Self::TestContext => "test_context",
            Self::AcceptanceCriteria => "acceptance_criteria",
            Self::GotchaList => "gotcha_list",
            Self::RollbackPlan => "rollback_plan",
            Self::PrdReference => "prd_reference",
            Self::ArchitectureDecision => "architecture_decision",
            Self::ResearchNotes => "research_notes",
            Self::DependencyNotes => "dependency_notes",
            Self::UserStory => "user_story",
            Self::DiscoveryNotes => "discovery_notes",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AppendixKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code_context" => Ok(Self::CodeContext),
            "test_context" => Ok(Self::TestContext),
            "acceptance_criteria" => Ok(Self::AcceptanceCriteria),
            "gotcha_list" => Ok(Self::GotchaList),
            "rollback_plan" => Ok(Self::RollbackPlan),
            "prd_reference" => Ok(Self::PrdReference),
            "architecture_decision" => Ok(Self::ArchitectureDecision),
            "research_notes" => Ok(Self::ResearchNotes),
            "dependency_notes" => Ok(Self::DependencyNotes),
            "user_story" => Ok(Self::UserStory),
            "discovery_notes" => Ok(Self::DiscoveryNotes),
            _ => Err(format!("Unknown appendix kind: {}", s)),
        }
    }
}

/// How the appendix body is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendixBody {
    /// Literal content
    Inline { content: String },
    /// Foreign row reference
    Reference { ref_id: String, ref_table: String },
}

/// Supplementary document attached to a task, ordered by position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appendix {
    pub id: String,
    pub task_id: String,
    pub kind: AppendixKind,
    pub body: AppendixBody,
    pub position: i64,
    pub created_at: i64,
}

impl Appendix {
    pub fn inline(task_id: impl Into<String>, kind: AppendixKind, content: impl Into<String>) -> Self {
        let task_id = task_id.into();
        Self {
            id: generate_id("appendix", &kind.to_string()),
            task_id,
            kind,
            body: AppendixBody::Inline {
                content: content.into(),
            },
            position: 0,
            created_at: now_ms(),
        }
    }

    pub fn reference(
        task_id: impl Into<String>,
        kind: AppendixKind,
        ref_id: impl Into<String>,
        ref_table: impl Into<String>,
    ) -> Self {
        let task_id = task_id.into();
        Self {
            id: generate_id("appendix", &kind.to_string()),
            task_id,
            kind,
            body: AppendixBody::Reference {
                ref_id: ref_id.into(),
                ref_table: ref_table.into(),
            },
            position: 0,
            created_at: now_ms(),
        }
    }

    pub fn with_position(mut self, position: i64) -> Self {
        self.position = position;
        self
    }

    /// True for inline appendices with non-empty content; references count as
    /// non-empty since the row they point at exists.
    pub fn has_content(&self) -> bool {
        match &self.body {
            AppendixBody::Inline { content } => !content.trim().is_empty(),
            AppendixBody::Reference { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_appendix() {
        let appendix = Appendix::inline("task-1", AppendixKind::TestContext, "run cargo test");
        assert_eq!(appendix.kind, AppendixKind::TestContext);
        assert!(appendix.has_content());
    }

    #[test]
    fn test_empty_inline_has_no_content() {
        let appendix = Appendix::inline("task-1", AppendixKind::AcceptanceCriteria, "   ");
        assert!(!appendix.has_content());
    }

    #[test]
    fn test_reference_appendix_counts_as_content() {
        let appendix = Appendix::reference("task-1", AppendixKind::PrdReference, "prd-1", "prds");
        assert!(appendix.has_content());
    }

    #[test]
    fn test_kind_parse_roundtrip() {
        let kinds = [
            AppendixKind::CodeContext,
            AppendixKind::TestContext,
            AppendixKind::AcceptanceCriteria,
            AppendixKind::GotchaList,
            AppendixKind::RollbackPlan,
            AppendixKind::PrdReference,
            AppendixKind::ArchitectureDecision,
            AppendixKind::ResearchNotes,
            AppendixKind::DependencyNotes,
            AppendixKind::UserStory,
            AppendixKind::DiscoveryNotes,
        ];
        assert_eq!(kinds.len(), 11);
        for kind in kinds {
            assert_eq!(kind.to_string().parse::<AppendixKind>().unwrap(), kind);
        }
    }
}
