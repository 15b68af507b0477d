use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How the decomposition engine remembers topics it has already expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleGuard {
    /// One visited set for the whole build. A topic that already appeared in an
    /// earlier sibling subtree becomes a cycle-break LEAF.
    #[default]
    Shared,
    /// Copy-on-branch ancestor set. Only a topic repeated on its own
    /// root-to-leaf path is cut.
    Path,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown cycle guard '{0}', expected 'shared' or 'path'")]
pub struct ParseCycleGuardError(String);

impl FromStr for CycleGuard {
    type Err = ParseCycleGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shared" => Ok(CycleGuard::Shared),
            "path" => Ok(CycleGuard::Path),
            other => Err(ParseCycleGuardError(other.to_string())),
        }
    }
}

/// Tunables of the tutoring core.
#[derive(Debug, Clone, PartialEq)]
pub struct TutorConfig {
    pub max_tree_depth: usize,
    pub cache_ttl_days: u32,
    pub synthesis_difficulty: String,
    pub max_attempts: u32,
    pub cycle_guard: CycleGuard,
    /// Learner whose mastery records are read and written.
    pub learner_id: String,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: 5,
            cache_ttl_days: 7,
            synthesis_difficulty: "medium".to_string(),
            max_attempts: 3,
            cycle_guard: CycleGuard::Shared,
            learner_id: "default".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_guard_parses_case_insensitively() {
        assert_eq!("PATH".parse::<CycleGuard>().unwrap(), CycleGuard::Path);
        assert_eq!(" shared ".parse::<CycleGuard>().unwrap(), CycleGuard::Shared);
        let err = "tree".parse::<CycleGuard>().unwrap_err();
        assert!(err.to_string().contains("'tree'"));
    }

    #[test]
    fn defaults() {
        let config = TutorConfig::default();
        assert_eq!(config.max_tree_depth, 5);
        assert_eq!(config.cache_ttl_days, 7);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.cycle_guard, CycleGuard::Shared);
    }
}
