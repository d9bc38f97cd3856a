//! Atomicity (readiness) scoring
//!
//! Six weighted dimensions; a task is ready iff the rounded weighted score
//! reaches 70. Scoring is pure; the surrounding Gatekeeper adds a short-TTL
//! cache with a cooperative debounce for edit bursts.

use serde::{Deserialize, Serialize};

use crate::domain::{Appendix, AppendixKind, Effort, Impact, ImpactKind, Task};

/// Tasks at or above this score may be scheduled
pub const READY_THRESHOLD: u8 = 70;

/// The six scored dimensions with their fixed weights (sum 1.00)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    SingleConcern,
    BoundedFiles,
    TimeBounded,
    Testable,
    Independent,
    ClearCompletion,
}

impl Dimension {
    pub fn weight(&self) -> f64 {
        match self {
            Self::SingleConcern => 0.15,
            Self::BoundedFiles => 0.15,
            Self::TimeBounded => 0.10,
            Self::Testable => 0.25,
            Self::Independent => 0.10,
            Self::ClearCompletion => 0.25,
        }
    }

    pub fn all() -> [Self; 6] {
        [
            Self::SingleConcern,
            Self::BoundedFiles,
            Self::TimeBounded,
            Self::Testable,
            Self::Independent,
            Self::ClearCompletion,
        ]
    }
}

/// Score of a single dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: Dimension,
    pub score: u8,
}

/// Full readiness report for a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub task_id: String,
    /// Weighted total in [0, 100]
    pub score: u8,
    pub is_ready: bool,
    pub dimensions: Vec<DimensionScore>,
    /// Human-readable missing items and warnings
    pub missing: Vec<String>,
}

/// Component keywords counted by the single-concern dimension
const COMPONENT_KEYWORDS: [&str; 6] = ["database", "api", "ui", "frontend", "backend", "test"];

fn word_count(haystack: &str, word: &str) -> usize {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.eq_ignore_ascii_case(word))
        .count()
}

fn has_numbered_list(text: &str) -> bool {
    text.lines().any(|line| {
        let trimmed = line.trim_start();
        trimmed
            .split_once(['.', ')'])
            .is_some_and(|(head, _)| !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()))
    })
}

fn score_single_concern(task: &Task, missing: &mut Vec<String>) -> u8 {
    let text = format!("{} {}", task.title, task.description);

    let conjunctive = word_count(&text, "and") > 1 || word_count(&text, "also") > 0 || has_numbered_list(&text);
    let keyword_hits = COMPONENT_KEYWORDS
        .iter()
        .filter(|k| word_count(&text, k) > 0)
        .count();
    let scattered = keyword_hits > 2;

    match (conjunctive, scattered) {
        (false, false) => 100,
        (true, true) => {
            missing.push("Title/description suggests multiple concerns".to_string());
            0
        }
        _ => {
            missing.push("Title/description hints at more than one concern".to_string());
            50
        }
    }
}

fn score_bounded_files(impacts: &[Impact], missing: &mut Vec<String>) -> u8 {
    let file_count = impacts.iter().filter(|i| i.kind == ImpactKind::File).count();
    match file_count {
        0 => {
            missing.push("No file impacts declared".to_string());
            100
        }
        1..=3 => 100,
        4..=6 => {
            missing.push(format!("Touches {} files; consider splitting", file_count));
            50
        }
        _ => {
            missing.push(format!("Touches {} files; not atomic", file_count));
            0
        }
    }
}

fn score_time_bounded(task: &Task, missing: &mut Vec<String>) -> u8 {
    match task.effort {
        Effort::Trivial | Effort::Small | Effort::Medium => 100,
        Effort::Large => {
            missing.push("Effort is large; consider splitting".to_string());
            50
        }
        Effort::Epic => {
            missing.push("Effort is epic; must be decomposed".to_string());
            0
        }
    }
}

fn score_testable(appendices: &[Appendix], missing: &mut Vec<String>) -> u8 {
    if appendices.iter().any(|a| a.kind == AppendixKind::TestContext) {
        100
    } else {
        missing.push("Missing test_context appendix".to_string());
        0
    }
}

fn score_independent(unmet_deps: usize, missing: &mut Vec<String>) -> u8 {
    match unmet_deps {
        0 => 100,
        1..=2 => {
            missing.push(format!("{} unresolved dependencies", unmet_deps));
            50
        }
        _ => {
            missing.push(format!("{} unresolved dependencies; too entangled", unmet_deps));
            0
        }
    }
}

fn score_clear_completion(appendices: &[Appendix], missing: &mut Vec<String>) -> u8 {
    let criteria = appendices
        .iter()
        .find(|a| a.kind == AppendixKind::AcceptanceCriteria);
    match criteria {
        Some(a) if a.has_content() => 100,
        Some(_) => {
            missing.push("Empty acceptance_criteria appendix".to_string());
            0
        }
        None => {
            missing.push("Missing acceptance_criteria appendix".to_string());
            0
        }
    }
}

/// Score a task against the six atomicity dimensions.
///
/// Deterministic given (task, impacts, appendices, unmet dependency count).
pub fn score_task(task: &Task, impacts: &[Impact], appendices: &[Appendix], unmet_deps: usize) -> ReadinessReport {
    let mut missing = Vec::new();
    let mut dimensions = Vec::with_capacity(6);

    for dimension in Dimension::all() {
        let score = match dimension {
            Dimension::SingleConcern => score_single_concern(task, &mut missing),
            Dimension::BoundedFiles => score_bounded_files(impacts, &mut missing),
            Dimension::TimeBounded => score_time_bounded(task, &mut missing),
            Dimension::Testable => score_testable(appendices, &mut missing),
            Dimension::Independent => score_independent(unmet_deps, &mut missing),
            Dimension::ClearCompletion => score_clear_completion(appendices, &mut missing),
        };
        dimensions.push(DimensionScore { dimension, score });
    }

    let total: f64 = dimensions
        .iter()
        .map(|d| d.dimension.weight() * d.score as f64)
        .sum();
    let score = total.round().clamp(0.0, 100.0) as u8;

    ReadinessReport {
        task_id: task.id.clone(),
        score,
        is_ready: score >= READY_THRESHOLD,
        dimensions,
        missing,
    }
}
