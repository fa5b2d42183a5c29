//! Result of a single reconciler invocation.

use serde::Serialize;

/// What a reconciler did to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Registry already matches the hypervisor (or nothing could be derived)
    NoChangeNeeded,
    /// A write was issued and acknowledged
    Applied,
    /// A write was needed but did not go through
    Failed(String),
}

impl ReconcileOutcome {
    /// Boolean view: whether the registry was changed.
    pub fn changed(&self) -> bool {
        matches!(self, ReconcileOutcome::Applied)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ReconcileOutcome::Failed(_))
    }

    pub(crate) fn failed(reason: impl std::fmt::Display) -> Self {
        ReconcileOutcome::Failed(reason.to_string())
    }
}

impl From<ReconcileOutcome> for bool {
    fn from(outcome: ReconcileOutcome) -> Self {
        outcome.changed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_view() {
        assert!(ReconcileOutcome::Applied.changed());
        assert!(!ReconcileOutcome::NoChangeNeeded.changed());
        assert!(!ReconcileOutcome::Failed("HTTP 500".into()).changed());
        assert!(ReconcileOutcome::Failed("x".into()).is_failed());
        assert!(!bool::from(ReconcileOutcome::NoChangeNeeded));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(ReconcileOutcome::Failed("HTTP 500".into())).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "failed", "reason": "HTTP 500"}));
    }
}
