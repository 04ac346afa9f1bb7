use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority of an affected file or task.
///
/// Declaration order is execution order: `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Numeric rank, 0 for `Critical`
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Pick the more urgent of two priorities
    pub fn most_urgent(self, other: Priority) -> Priority {
        self.min(other)
    }

    /// Whether completing a task at this priority warrants its own snapshot
    pub fn warrants_snapshot(self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }

    /// Priority for a cascading neighbour discovered at `depth` via `relationship`.
    ///
    /// Direct imports are critical, close `depends_on` edges are high, and
    /// everything further out decays to medium and then low.
    pub fn for_cascade(relationship: crate::index::Relationship, depth: u32) -> Priority {
        use crate::index::Relationship;
        match (relationship, depth) {
            (Relationship::Imports, 0..=1) => Priority::Critical,
            (Relationship::DependsOn, 0..=2) => Priority::High,
            (_, 0..=2) => Priority::Medium,
            _ => Priority::Low,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        write!(f, "{}", label)
    }
}
