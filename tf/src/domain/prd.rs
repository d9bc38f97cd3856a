//! PRD link table and coverage computation
//!
//! The core consumes only the `prd -> task` link table with an optional
//! requirement reference of form `success_criteria[i]` or `constraints[j]`.

use serde::{Deserialize, Serialize};
use workstore::now_ms;

use super::id::generate_id;

/// External requirements document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prd {
    pub id: String,
    pub title: String,
    pub success_criteria: Vec<String>,
    pub constraints: Vec<String>,
    pub created_at: i64,
}

impl Prd {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: generate_id("prd", &title),
            title,
            success_criteria: Vec::new(),
            constraints: Vec::new(),
            created_at: now_ms(),
        }
    }
}

/// Link from a PRD requirement to a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrdLink {
    pub id: String,
    pub prd_id: String,
    pub task_id: String,
    /// `implements` for success criteria, `tests` for constraints
    pub link_type: String,
    /// `success_criteria[i]` or `constraints[j]`
    pub requirement_ref: Option<String>,
    pub created_at: i64,
}

impl PrdLink {
    pub fn new(prd_id: impl Into<String>, task_id: impl Into<String>, link_type: impl Into<String>) -> Self {
        let prd_id = prd_id.into();
        let task_id = task_id.into();
        Self {
            id: generate_id("prdlink", &format!("{}-{}", prd_id, task_id)),
            prd_id,
            task_id,
            link_type: link_type.into(),
            requirement_ref: None,
            created_at: now_ms(),
        }
    }

    pub fn with_requirement(mut self, requirement_ref: impl Into<String>) -> Self {
        self.requirement_ref = Some(requirement_ref.into());
        self
    }
}

/// Coverage of a PRD's requirements by linked tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrdCoverage {
    pub prd_id: String,
    pub total_requirements: usize,
    pub covered_requirements: usize,
    pub coverage_percent: u32,
    pub uncovered: Vec<String>,
}

/// Compute coverage.
///
/// A success criterion `i` is covered iff some link carries
/// `requirement_ref = success_criteria[i]`; a constraint `j` is covered iff
/// some link has `link_type = tests` and `requirement_ref = constraints[j]`.
/// An empty requirement set is fully covered by definition.
pub fn calculate_coverage(prd: &Prd, links: &[PrdLink]) -> PrdCoverage {
    let total = prd.success_criteria.len() + prd.constraints.len();
    if total == 0 {
        return PrdCoverage {
            prd_id: prd.id.clone(),
            total_requirements: 0,
            covered_requirements: 0,
            coverage_percent: 100,
            uncovered: Vec::new(),
        };
    }

    let mut covered = 0;
    let mut uncovered = Vec::new();

    for i in 0..prd.success_criteria.len() {
        let wanted = format!("success_criteria[{}]", i);
        if links.iter().any(|l| l.requirement_ref.as_deref() == Some(wanted.as_str())) {
            covered += 1;
        } else {
            uncovered.push(wanted);
        }
    }

    for j in 0..prd.constraints.len() {
        let wanted = format!("constraints[{}]", j);
        let hit = links
            .iter()
            .any(|l| l.link_type == "tests" && l.requirement_ref.as_deref() == Some(wanted.as_str()));
        if hit {
            covered += 1;
        } else {
            uncovered.push(wanted);
        }
    }

    PrdCoverage {
        prd_id: prd.id.clone(),
        total_requirements: total,
        covered_requirements: covered,
        coverage_percent: ((covered as f64 / total as f64) * 100.0).round() as u32,
        uncovered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_prd_is_fully_covered() {
        let prd = Prd::new("Empty PRD");
        let coverage = calculate_coverage(&prd, &[]);
        assert_eq!(coverage.coverage_percent, 100);
        assert_eq!(coverage.total_requirements, 0);
        assert!(coverage.uncovered.is_empty());
    }

    #[test]
    fn test_coverage_two_of_three() {
        let mut prd = Prd::new("Auth PRD");
        prd.success_criteria = vec!["login works".into(), "logout works".into()];
        prd.constraints = vec!["p95 < 200ms".into()];

        let links = vec![
            PrdLink::new(&prd.id, "task-1", "implements").with_requirement("success_criteria[0]"),
            PrdLink::new(&prd.id, "task-2", "tests").with_requirement("constraints[0]"),
        ];

        let coverage = calculate_coverage(&prd, &links);
        assert_eq!(coverage.total_requirements, 3);
        assert_eq!(coverage.covered_requirements, 2);
        assert_eq!(coverage.coverage_percent, 67);
        assert_eq!(coverage.uncovered, vec!["success_criteria[1]".to_string()]);
    }

    #[test]
    fn test_constraint_requires_tests_link_type() {
        let mut prd = Prd::new("PRD");
        prd.constraints = vec!["no panics".into()];

        // An implements link to a constraint does not cover it
        let links = vec![PrdLink::new(&prd.id, "task-1", "implements").with_requirement("constraints[0]")];
        let coverage = calculate_coverage(&prd, &links);
        assert_eq!(coverage.covered_requirements, 0);
    }

    #[test]
    fn test_full_coverage() {
        let mut prd = Prd::new("PRD");
        prd.success_criteria = vec!["a".into()];
        let links = vec![PrdLink::new(&prd.id, "task-1", "implements").with_requirement("success_criteria[0]")];
        let coverage = calculate_coverage(&prd, &links);
        assert_eq!(coverage.coverage_percent, 100);
    }
}
