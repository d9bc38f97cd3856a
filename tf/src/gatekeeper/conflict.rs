//! File-conflict matrix
//!
//! Two tasks may run in the same wave iff no pair of their impacts on a
//! shared (target, kind) is blocking. Warnings are surfaced but never
//! enforced; READ-UPDATE is a warning.

use serde::{Deserialize, Serialize};

use crate::domain::{Impact, ImpactKind, ImpactOp};

/// Severity of an operation pair on a shared target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictClass {
    None,
    Warning,
    Blocking(ConflictKind),
}

impl ConflictClass {
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking(_))
    }
}

/// Named blocking conflict kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    WriteWrite,
    WriteDelete,
    DeleteRead,
    DeleteDelete,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::WriteWrite => "write-write",
            Self::WriteDelete => "write-delete",
            Self::DeleteRead => "delete-read",
            Self::DeleteDelete => "delete-delete",
        };
        write!(f, "{}", s)
    }
}

/// Classify a pair of operations on the same target. Symmetric.
pub fn classify_ops(a: ImpactOp, b: ImpactOp) -> ConflictClass {
    use ImpactOp::*;
    match (a, b) {
        (Read, Read) => ConflictClass::None,
        (Delete, Delete) => ConflictClass::Blocking(ConflictKind::DeleteDelete),
        (Delete, Read) | (Read, Delete) => ConflictClass::Blocking(ConflictKind::DeleteRead),
        (Delete, _) | (_, Delete) => ConflictClass::Blocking(ConflictKind::WriteDelete),
        (Read, _) | (_, Read) => ConflictClass::Warning,
        // Both remaining ops are writes (CREATE/UPDATE)
        _ => ConflictClass::Blocking(ConflictKind::WriteWrite),
    }
}

/// One conflicting impact pair between two tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactConflict {
    pub target: String,
    pub kind: ImpactKind,
    pub a_op: ImpactOp,
    pub b_op: ImpactOp,
    pub class: ConflictClass,
}

/// All warning and blocking pairs between two impact sets
pub fn conflict_details(a_impacts: &[Impact], b_impacts: &[Impact]) -> Vec<ImpactConflict> {
    let mut conflicts = Vec::new();
    for a in a_impacts {
        for b in b_impacts {
            if a.target != b.target || a.kind != b.kind {
                continue;
            }
            let class = classify_ops(a.op, b.op);
            if class != ConflictClass::None {
                conflicts.push(ImpactConflict {
                    target: a.target.clone(),
                    kind: a.kind,
                    a_op: a.op,
                    b_op: b.op,
                    class,
                });
            }
        }
    }
    conflicts
}

/// True iff no impact pair is blocking
pub fn can_run_parallel(a_impacts: &[Impact], b_impacts: &[Impact]) -> bool {
    !has_blocking_conflict(a_impacts, b_impacts)
}

/// Short-circuit check used by the planner's wave partitioning
pub fn has_blocking_conflict(a_impacts: &[Impact], b_impacts: &[Impact]) -> bool {
    a_impacts.iter().any(|a| {
        b_impacts
            .iter()
            .any(|b| a.target == b.target && a.kind == b.kind && classify_ops(a.op, b.op).is_blocking())
    })
}
