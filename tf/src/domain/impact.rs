//! Impacts - declared touches on named resources
//!
//! The unit of file-conflict analysis. Target paths are opaque, case- and
//! separator-sensitive strings.

use serde::{Deserialize, Serialize};
use workstore::now_ms;

use super::id::generate_id;

/// Resource kind an impact touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImpactKind {
    #[default]
    File,
    Api,
    Database,
    Type,
    Function,
}

impl std::fmt::Display for ImpactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::File => "file",
            Self::Api => "api",
            Self::Database => "database",
            Self::Type => "type",
            Self::Function => "function",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ImpactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "api" => Ok(Self::Api),
            "database" => Ok(Self::Database),
            "type" => Ok(Self::Type),
            "function" => Ok(Self::Function),
            _ => Err(format!("Unknown impact kind: {}", s)),
        }
    }
}

/// Operation performed on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImpactOp {
    #[serde(rename = "CREATE")]
    Create,
    #[serde(rename = "READ")]
    Read,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

impl ImpactOp {
    /// Does the operation mutate the target?
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl std::fmt::Display for ImpactOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ImpactOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "READ" => Ok(Self::Read),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(format!("Unknown impact op: {}", s)),
        }
    }
}

/// Where the impact prediction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Ai,
    User,
    Validated,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ai => "ai",
            Self::User => "user",
            Self::Validated => "validated",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Provenance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai" => Ok(Self::Ai),
            "user" => Ok(Self::User),
            "validated" => Ok(Self::Validated),
            _ => Err(format!("Unknown provenance: {}", s)),
        }
    }
}

/// Declaration that a task will touch a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Impact {
    pub id: String,
    pub task_id: String,
    pub kind: ImpactKind,
    pub op: ImpactOp,
    /// Opaque target path; conflict analysis compares it exactly
    pub target: String,
    pub symbol: Option<String>,
    pub signature: Option<String>,
    /// Prediction confidence in [0, 1]; decays for wrong predictions and
    /// converges toward 1 after validation against actual changes
    pub confidence: f64,
    pub provenance: Provenance,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Impact {
    pub fn new(task_id: impl Into<String>, kind: ImpactKind, op: ImpactOp, target: impl Into<String>) -> Self {
        let task_id = task_id.into();
        let target = target.into();
        let now = now_ms();
        Self {
            id: generate_id("impact", &target),
            task_id,
            kind,
            op,
            target,
            symbol: None,
            signature: None,
            confidence: 0.5,
            provenance: Provenance::Ai,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Validation against actual changes moves confidence toward 1
    pub fn confirm(&mut self) {
        self.confidence = (self.confidence + 1.0) / 2.0;
        self.provenance = Provenance::Validated;
        self.updated_at = now_ms();
    }

    /// A wrong prediction decays confidence toward 0
    pub fn refute(&mut self) {
        self.confidence /= 2.0;
        self.updated_at = now_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_new_defaults() {
        let impact = Impact::new("task-1", ImpactKind::File, ImpactOp::Update, "src/auth.rs");
        assert_eq!(impact.confidence, 0.5);
        assert_eq!(impact.provenance, Provenance::Ai);
        assert_eq!(impact.target, "src/auth.rs");
    }

    #[test]
    fn test_confidence_clamped() {
        let impact = Impact::new("t", ImpactKind::File, ImpactOp::Read, "x").with_confidence(1.5);
        assert_eq!(impact.confidence, 1.0);
        let impact = Impact::new("t", ImpactKind::File, ImpactOp::Read, "x").with_confidence(-0.2);
        assert_eq!(impact.confidence, 0.0);
    }

    #[test]
    fn test_confirm_converges_toward_one() {
        let mut impact = Impact::new("t", ImpactKind::File, ImpactOp::Update, "x");
        for _ in 0..10 {
            impact.confirm();
        }
        assert!(impact.confidence > 0.99);
        assert_eq!(impact.provenance, Provenance::Validated);
    }

    #[test]
    fn test_refute_decays_toward_zero() {
        let mut impact = Impact::new("t", ImpactKind::File, ImpactOp::Update, "x");
        for _ in 0..10 {
            impact.refute();
        }
        assert!(impact.confidence < 0.01);
    }

    #[test]
    fn test_op_is_write() {
        assert!(ImpactOp::Create.is_write());
        assert!(ImpactOp::Update.is_write());
        assert!(ImpactOp::Delete.is_write());
        assert!(!ImpactOp::Read.is_write());
    }

    #[test]
    fn test_op_serde_uppercase() {
        let json = serde_json::to_string(&ImpactOp::Update).unwrap();
        assert_eq!(json, "\"UPDATE\"");
        assert_eq!("delete".parse::<ImpactOp>().unwrap(), ImpactOp::Delete);
    }
}
