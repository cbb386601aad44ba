//! Reconcile planner - collects invocations for a batch run

use crate::error::{Error, Result};
use crate::reconcile::Invocation;
use crate::resource::ResourceKind;

/// An ordered set of invocations, at most one per resource
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    invocations: Vec<Invocation>,
}

impl ReconcilePlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a plan, failing on the first duplicate resource.
    pub fn from_invocations(invocations: impl IntoIterator<Item = Invocation>) -> Result<Self> {
        let mut plan = Self::new();
        for invocation in invocations {
            plan.add(invocation)?;
        }
        Ok(plan)
    }

    /// Add an invocation to the plan
    ///
    /// Two invocations for the same kind and identity would race on the
    /// server, so the second is refused.
    pub fn add(&mut self, invocation: Invocation) -> Result<()> {
        if self
            .invocations
            .iter()
            .any(|i| i.kind == invocation.kind && i.identity == invocation.identity)
        {
            return Err(Error::DuplicateIdentity {
                kind: invocation.kind,
                identity: invocation.identity,
            });
        }
        self.invocations.push(invocation);
        Ok(())
    }

    /// Filter plan to only include invocations matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&Invocation) -> bool,
    {
        Self {
            invocations: self.invocations.into_iter().filter(predicate).collect(),
        }
    }

    /// Filter plan to only include invocations matching a target pattern
    ///
    /// Target format: "kind" or "kind.name"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (kind, name) = parse_target(t);
                self.filter(|i| matches_filter(i, kind, name.as_deref()))
            }
        }
    }

    /// Force check mode on every invocation
    pub fn into_check_mode(self) -> Self {
        Self {
            invocations: self
                .invocations
                .into_iter()
                .map(|mut i| {
                    i.check_mode = true;
                    i
                })
                .collect(),
        }
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// Total number of invocations in the plan
    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }
}

/// Parse a target string like "kind.name" into (kind, name)
///
/// Names may contain dots; only the first one separates. A target whose
/// first part is not a kind is matched against names alone.
fn parse_target(target: &str) -> (Option<ResourceKind>, Option<String>) {
    match target.split_once('.') {
        Some((kind, name)) => match ResourceKind::from_name(kind) {
            Some(kind) => (Some(kind), Some(name.to_string())),
            None => (None, Some(target.to_string())),
        },
        None => match ResourceKind::from_name(target) {
            Some(kind) => (Some(kind), None),
            None => (None, Some(target.to_string())),
        },
    }
}

/// Check if an invocation matches the filter criteria
fn matches_filter(invocation: &Invocation, kind: Option<ResourceKind>, name: Option<&str>) -> bool {
    if let Some(k) = kind
        && invocation.kind != k
    {
        return false;
    }

    if let Some(n) = name
        && !invocation.identity.contains(n)
    {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeclaredSpec;

    fn inv(kind: ResourceKind, identity: &str) -> Invocation {
        Invocation::new(kind, identity, DeclaredSpec::new())
    }

    fn sample() -> ReconcilePlan {
        ReconcilePlan::from_invocations([
            inv(ResourceKind::Account, "jdoe"),
            inv(ResourceKind::Group, "Testers"),
            inv(ResourceKind::Group, "Release.Managers"),
            inv(ResourceKind::Project, "tools"),
        ])
        .unwrap()
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("group"), (Some(ResourceKind::Group), None));
        assert_eq!(
            parse_target("projects.tools"),
            (Some(ResourceKind::Project), Some("tools".to_string()))
        );
        assert_eq!(
            parse_target("group.Release.Managers"),
            (Some(ResourceKind::Group), Some("Release.Managers".to_string()))
        );
        assert_eq!(parse_target("tools"), (None, Some("tools".to_string())));
    }

    #[test]
    fn test_duplicate_identity_is_rejected() {
        let mut plan = ReconcilePlan::new();
        plan.add(inv(ResourceKind::Group, "Testers")).unwrap();
        // Same name, different kind is fine
        plan.add(inv(ResourceKind::Project, "Testers")).unwrap();

        let err = plan.add(inv(ResourceKind::Group, "Testers")).unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentity { .. }));
        let err = plan.add(inv(ResourceKind::Group, "Testers ")).unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentity { .. }));
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_filter_by_target() {
        assert_eq!(sample().filter_by_target(Some("group")).len(), 2);
        assert_eq!(sample().filter_by_target(Some("group.Testers")).len(), 1);
        assert_eq!(sample().filter_by_target(Some("tools")).len(), 1);
        assert_eq!(sample().filter_by_target(None).len(), 4);
        assert!(sample().filter_by_target(Some("account.ghost")).is_empty());
    }

    #[test]
    fn test_into_check_mode() {
        let plan = sample().into_check_mode();
        assert!(plan.invocations().iter().all(|i| i.check_mode));
    }
}
