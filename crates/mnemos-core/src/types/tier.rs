use serde::{Deserialize, Serialize};

/// Importance tier a node occupies. Ordered: task < session < longterm < archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Task = 0,
    Session = 1,
    LongTerm = 2,
    Archive = 3,
}

impl Tier {
    /// Numeric order used for "is this a demotion" checks. Lower is warmer.
    pub fn order(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Task => "task",
            Tier::Session => "session",
            Tier::LongTerm => "longterm",
            Tier::Archive => "archive",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_order_task_session_longterm_archive() {
        assert!(Tier::Task < Tier::Session);
        assert!(Tier::Session < Tier::LongTerm);
        assert!(Tier::LongTerm < Tier::Archive);
    }

    #[test]
    fn order_values() {
        assert_eq!(Tier::Task.order(), 0);
        assert_eq!(Tier::Session.order(), 1);
        assert_eq!(Tier::LongTerm.order(), 2);
        assert_eq!(Tier::Archive.order(), 3);
    }
}
