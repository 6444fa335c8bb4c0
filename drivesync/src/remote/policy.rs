//! Declarative mapping from error signatures to recovery actions.

use gdrive_core::ErrorSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Retry,
    Skip,
    Fail,
}

/// One row of a [`PolicyTable`]. The warning is a template where `{rid}` is
/// replaced with the id of the failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPolicy {
    codes: Vec<String>,
    reasons: Option<Vec<String>>,
    pub action: Action,
    warning: String,
    pub always_warn: bool,
}

impl ErrorPolicy {
    pub fn new(codes: &[&str], action: Action, warning: impl Into<String>) -> Self {
        Self {
            codes: codes.iter().map(|code| code.to_string()).collect(),
            reasons: None,
            action,
            warning: warning.into(),
            always_warn: false,
        }
    }

    /// Restricts the policy to the given reasons. Without this call any
    /// reason (or none) matches.
    pub fn with_reasons(mut self, reasons: &[&str]) -> Self {
        self.reasons = Some(reasons.iter().map(|reason| reason.to_string()).collect());
        self
    }

    pub fn always_warn(mut self) -> Self {
        self.always_warn = true;
        self
    }

    pub fn matches(&self, signature: &ErrorSignature) -> bool {
        if !self.codes.iter().any(|code| *code == signature.code) {
            return false;
        }
        match (&self.reasons, &signature.reason) {
            (None, _) => true,
            (Some(reasons), Some(reason)) => reasons.iter().any(|r| r == reason),
            (Some(_), None) => false,
        }
    }

    pub fn warning_for(&self, rid: &str) -> String {
        self.warning.replace("{rid}", rid)
    }
}

/// Ordered list of policies. The first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    policies: Vec<ErrorPolicy>,
}

impl PolicyTable {
    pub fn new(policies: Vec<ErrorPolicy>) -> Self {
        Self { policies }
    }

    pub fn defaults() -> Self {
        Self::new(vec![
            ErrorPolicy::new(
                &["104"],
                Action::Retry,
                "Connection reset by peer while processing {rid}.",
            )
            .always_warn(),
            ErrorPolicy::new(
                &["404"],
                Action::Skip,
                "Request {rid} resulted in a 404 (not found) and has been skipped. Is your snapshot stale?",
            )
            .always_warn(),
            ErrorPolicy::new(
                &["403", "429"],
                Action::Retry,
                "Request {rid} resulted in a 4XX. Slowing down.",
            )
            .with_reasons(&["rateLimitExceeded", "userRateLimitExceeded"]),
            ErrorPolicy::new(
                &["500"],
                Action::Retry,
                "The API returned a server error (500) for {rid}. Retrying.",
            ),
        ])
    }

    /// Defaults with 404 turned into a hard failure, for fetches where the
    /// target is known to exist.
    pub fn fail_on_missing() -> Self {
        Self::defaults().with_policy_for(
            "404",
            ErrorPolicy::new(
                &["404"],
                Action::Fail,
                "Request {rid} resulted in a 404 (not found).",
            )
            .always_warn(),
        )
    }

    /// Returns a table where every policy covering `code` is replaced by
    /// `policy`, keeping its position.
    pub fn with_policy_for(self, code: &str, policy: ErrorPolicy) -> Self {
        let mut replacement = Some(policy);
        let policies = self
            .policies
            .into_iter()
            .filter_map(|existing| {
                if existing.codes.iter().any(|c| c == code) {
                    replacement.take()
                } else {
                    Some(existing)
                }
            })
            .collect::<Vec<_>>();
        let mut table = Self { policies };
        if let Some(policy) = replacement {
            table.policies.push(policy);
        }
        table
    }

    pub fn matching(&self, signature: &ErrorSignature) -> Option<&ErrorPolicy> {
        self.policies.iter().find(|policy| policy.matches(signature))
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(code: &str, reason: Option<&str>) -> ErrorSignature {
        ErrorSignature::new(code, reason)
    }

    #[test]
    fn default_table_actions() {
        let table = PolicyTable::defaults();
        let action = |code, reason| table.matching(&sig(code, reason)).map(|p| p.action);

        assert_eq!(action("104", None), Some(Action::Retry));
        assert_eq!(action("404", Some("notFound")), Some(Action::Skip));
        assert_eq!(action("403", Some("userRateLimitExceeded")), Some(Action::Retry));
        assert_eq!(action("429", Some("rateLimitExceeded")), Some(Action::Retry));
        assert_eq!(action("500", None), Some(Action::Retry));
    }

    #[test]
    fn reason_restricted_policy_rejects_other_reasons() {
        let table = PolicyTable::defaults();
        assert!(table.matching(&sig("403", Some("insufficientPermissions"))).is_none());
        assert!(table.matching(&sig("403", None)).is_none());
        assert!(table.matching(&sig("401", None)).is_none());
    }

    #[test]
    fn first_match_wins() {
        let table = PolicyTable::new(vec![
            ErrorPolicy::new(&["500"], Action::Fail, "first"),
            ErrorPolicy::new(&["500"], Action::Retry, "second"),
        ]);
        assert_eq!(table.matching(&sig("500", None)).unwrap().action, Action::Fail);
    }

    #[test]
    fn fail_on_missing_replaces_only_404() {
        let table = PolicyTable::fail_on_missing();
        let policy = table.matching(&sig("404", None)).unwrap();
        assert_eq!(policy.action, Action::Fail);
        assert_eq!(
            policy.warning_for("abc"),
            "Request abc resulted in a 404 (not found)."
        );
        assert_eq!(
            table.matching(&sig("500", None)).unwrap().action,
            Action::Retry
        );
        assert_eq!(
            PolicyTable::defaults().matching(&sig("404", None)).unwrap().action,
            Action::Skip
        );
    }

    #[test]
    fn warning_substitutes_request_id() {
        let table = PolicyTable::defaults();
        let policy = table.matching(&sig("104", None)).unwrap();
        assert!(policy.always_warn);
        assert_eq!(
            policy.warning_for("/a.jpg (x1)"),
            "Connection reset by peer while processing /a.jpg (x1)."
        );
    }
}
