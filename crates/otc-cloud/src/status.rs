//! Resource status classification
//!
//! Every resource type declares its statuses as an enum and, per lifecycle
//! phase, a [`Transition`] naming which of them are still in progress and
//! which count as done. Anything outside both sets is a failure.

use std::fmt;

/// Status reported by the API for one resource type
pub trait ResourceStatus: Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync {
    /// Pseudo-status used when the object is no longer found
    fn deleted() -> Self;
}

/// Classification of an observed status within one transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Pending,
    Target,
    Failure,
}

/// Pending and target sets for one lifecycle phase
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<S> {
    pub pending: Vec<S>,
    pub target: Vec<S>,
}

impl<S: ResourceStatus> Transition<S> {
    pub fn new(
        pending: impl IntoIterator<Item = S>,
        target: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            pending: pending.into_iter().collect(),
            target: target.into_iter().collect(),
        }
    }

    /// Transition ending with the object gone
    pub fn to_deleted(pending: impl IntoIterator<Item = S>) -> Self {
        Self::new(pending, [S::deleted()])
    }

    /// Target wins when a status is listed in both sets
    pub fn classify(&self, status: &S) -> StatusClass {
        if self.target.contains(status) {
            StatusClass::Target
        } else if self.pending.contains(status) {
            StatusClass::Pending
        } else {
            StatusClass::Failure
        }
    }

    pub fn expects_deletion(&self) -> bool {
        self.target.contains(&S::deleted())
    }

    pub(crate) fn target_display(&self) -> String {
        join(&self.target)
    }
}

fn join<S: fmt::Display>(statuses: &[S]) -> String {
    statuses
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Status set shared by the core tests
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum TestStatus {
        Building,
        Active,
        Error,
        Deleted,
    }

    impl fmt::Display for TestStatus {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let s = match self {
                TestStatus::Building => "BUILDING",
                TestStatus::Active => "ACTIVE",
                TestStatus::Error => "ERROR",
                TestStatus::Deleted => "DELETED",
            };
            f.write_str(s)
        }
    }

    impl ResourceStatus for TestStatus {
        fn deleted() -> Self {
            TestStatus::Deleted
        }
    }

    #[test]
    fn test_classify() {
        let t = Transition::new([TestStatus::Building], [TestStatus::Active]);
        assert_eq!(t.classify(&TestStatus::Building), StatusClass::Pending);
        assert_eq!(t.classify(&TestStatus::Active), StatusClass::Target);
        assert_eq!(t.classify(&TestStatus::Error), StatusClass::Failure);
        assert!(!t.expects_deletion());
    }

    #[test]
    fn test_to_deleted() {
        let t = Transition::to_deleted([TestStatus::Active]);
        assert!(t.expects_deletion());
        assert_eq!(t.classify(&TestStatus::Deleted), StatusClass::Target);
        assert_eq!(t.target_display(), "DELETED");
    }
}
