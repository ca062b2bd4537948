use serde::{Deserialize, Serialize};

/// Decision lattice: `pass < warn < high < block`.
///
/// The report decision is the maximum severity across all findings in the
/// lattice. `high` marks escalated findings that do not gate a merge on
/// their own.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Pass,
    Warn,
    High,
    Block,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Pass => "pass",
            Severity::Warn => "warn",
            Severity::High => "high",
            Severity::Block => "block",
        }
    }

    /// Whether this severity gates a merge.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::Block)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a decision to the process exit code contract consumed by CI gates:
/// `0 = pass|warn`, `1 = block`, fatal non-decision errors map to `2` at the
/// caller. `dry_run` forces `0` regardless of decision.
pub fn exit_code(decision: Severity, dry_run: bool) -> i32 {
    if dry_run {
        return 0;
    }
    match decision {
        Severity::Block => 1,
        _ => 0,
    }
}
