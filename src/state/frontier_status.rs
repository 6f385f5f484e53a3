/// Frontier item state definitions for tracking crawl progress
///
/// This module defines the states a frontier URL moves through.
use std::fmt;

/// Represents the current state of a URL in the crawl frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontierStatus {
    /// URL is known and waiting for a worker
    Pending,

    /// URL is held by exactly one worker
    InProgress,

    /// URL was processed (or abandoned after exhausting its retries)
    Completed,
}

impl FrontierStatus {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Checks a transition against the frontier rules
    ///
    /// Allowed: pending → in_progress, in_progress → completed, and
    /// in_progress → pending when a failed attempt is requeued.
    pub fn can_transition_to(&self, next: FrontierStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Pending)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn all_states() -> [Self; 3] {
        [Self::Pending, Self::InProgress, Self::Completed]
    }
}

impl fmt::Display for FrontierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Number of frontier URLs in each status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl FrontierCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed
    }

    /// No URL is pending or being worked on
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.in_progress == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!FrontierStatus::Pending.is_terminal());
        assert!(!FrontierStatus::InProgress.is_terminal());
        assert!(FrontierStatus::Completed.is_terminal());
    }

    #[test]
    fn test_allowed_transitions() {
        use FrontierStatus::*;

        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Pending));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!InProgress.can_transition_to(InProgress));
    }

    #[test]
    fn test_completed_never_moves() {
        for next in FrontierStatus::all_states() {
            assert!(!FrontierStatus::Completed.can_transition_to(next));
        }
    }

    #[test]
    fn test_from_db_string() {
        assert_eq!(
            FrontierStatus::from_db_string("in_progress"),
            Some(FrontierStatus::InProgress)
        );
        assert_eq!(FrontierStatus::from_db_string("fetching"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", FrontierStatus::Pending), "pending");
        assert_eq!(format!("{}", FrontierStatus::InProgress), "in_progress");
    }

    #[test]
    fn test_counts_drained() {
        let mut counts = FrontierCounts {
            pending: 0,
            in_progress: 1,
            completed: 4,
        };
        assert!(!counts.is_drained());
        assert_eq!(counts.total(), 5);

        counts.in_progress = 0;
        assert!(counts.is_drained());
    }
}
