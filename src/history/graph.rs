//! Migration History Graph
//!
//! The primary chain of revisions. The chain only grows by appending a new tip;
//! forks, duplicate ids and dangling parents are rejected at append time.

use crate::error::{GovernanceError, GovernanceResult};
use crate::history::Revision;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

static REVISION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static revision id pattern"));

/// `<anchor>+N` / `<anchor>-N`, anchor optional
static RELATIVE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<anchor>[A-Za-z0-9_]+)?(?P<sign>[+-])(?P<steps>\d+)$")
        .expect("static relative reference pattern")
});

/// Symbolic reference to the newest revision
pub const HEAD: &str = "head";
/// Symbolic reference to the applied revision
pub const CURRENT: &str = "current";

/// Ordered revision chain with an optional applied marker
#[derive(Debug, Clone)]
pub struct MigrationHistory {
    revisions: HashMap<String, Revision>,
    tip: Option<String>,
    current: Option<String>,
}

impl MigrationHistory {
    pub fn new() -> Self {
        Self {
            revisions: HashMap::new(),
            tip: None,
            current: None,
        }
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn tip(&self) -> Option<&str> {
        self.tip.as_deref()
    }

    /// Append a revision as the new tip of the chain
    pub fn append(&mut self, revision: Revision) -> GovernanceResult<()> {
        if !REVISION_ID.is_match(&revision.id) {
            return Err(GovernanceError::chain(
                &revision.id,
                "revision id must be alphanumeric or underscore",
            ));
        }

        if self.revisions.contains_key(&revision.id) {
            return Err(GovernanceError::chain(&revision.id, "revision id already exists"));
        }

        match (&revision.parent_id, &self.tip) {
            (None, None) => {}
            (Some(parent), Some(tip)) if parent == tip => {}
            (None, Some(tip)) => {
                return Err(GovernanceError::chain(
                    &revision.id,
                    format!("second root revision; chain tip is {}", tip),
                ));
            }
            (Some(parent), None) => {
                return Err(GovernanceError::chain(
                    &revision.id,
                    format!("parent {} does not exist in an empty chain", parent),
                ));
            }
            (Some(parent), Some(tip)) => {
                let reason = if self.revisions.contains_key(parent) {
                    format!("parent {} is not the chain tip {} (fork)", parent, tip)
                } else {
                    format!("parent {} does not exist", parent)
                };
                return Err(GovernanceError::chain(&revision.id, reason));
            }
        }

        debug!("Appended revision {} (parent: {:?})", revision.id, revision.parent_id);
        self.tip = Some(revision.id.clone());
        self.revisions.insert(revision.id.clone(), revision);
        Ok(())
    }

    /// Record which revision is applied to the live database
    pub fn set_current(&mut self, reference: &str) -> GovernanceResult<()> {
        let id = self.resolve(reference)?;
        self.current = Some(id);
        Ok(())
    }

    /// Map `head`, `current`, a literal id or a relative offset
    /// (`head-1`, `current+1`, `<id>+2`, or bare `+1` from current) to an id
    pub fn resolve(&self, reference: &str) -> GovernanceResult<String> {
        let reference = reference.trim();

        if let Some(caps) = RELATIVE_REF.captures(reference) {
            let anchor = caps.name("anchor").map(|m| m.as_str()).unwrap_or(CURRENT);
            let steps: usize = caps["steps"]
                .parse()
                .map_err(|_| GovernanceError::UnknownRevision(reference.to_string()))?;
            let anchor_id = self.resolve_anchor(anchor, reference)?;

            let chain = self.linearize()?;
            let position = chain
                .iter()
                .position(|r| r.id == anchor_id)
                .ok_or_else(|| GovernanceError::UnknownRevision(reference.to_string()))?;

            let target = if &caps["sign"] == "+" {
                position.checked_add(steps)
            } else {
                position.checked_sub(steps)
            };

            return target
                .and_then(|index| chain.get(index))
                .map(|r| r.id.clone())
                .ok_or_else(|| GovernanceError::UnknownRevision(reference.to_string()));
        }

        self.resolve_anchor(reference, reference)
    }

    fn resolve_anchor(&self, anchor: &str, reference: &str) -> GovernanceResult<String> {
        let resolved = match anchor {
            HEAD => self.tip.clone(),
            CURRENT => self.current.clone(),
            id if self.revisions.contains_key(id) => Some(id.to_string()),
            _ => None,
        };
        resolved.ok_or_else(|| GovernanceError::UnknownRevision(reference.to_string()))
    }

    /// Revisions ordered from root to tip
    pub fn linearize(&self) -> GovernanceResult<Vec<&Revision>> {
        let mut chain = Vec::with_capacity(self.revisions.len());
        let mut cursor = self.tip.as_deref();

        while let Some(id) = cursor {
            if chain.len() >= self.revisions.len() {
                return Err(GovernanceError::CycleDetected { visited: chain.len() });
            }
            let revision = self
                .revisions
                .get(id)
                .ok_or_else(|| GovernanceError::chain(id, "referenced revision is missing"))?;
            chain.push(revision);
            cursor = revision.parent_id.as_deref();
        }

        chain.reverse();
        Ok(chain)
    }

    /// Root-to-tip chain truncated at `upto` (inclusive)
    pub fn chain_until(&self, upto: &str) -> GovernanceResult<Vec<&Revision>> {
        let mut chain = self.linearize()?;
        let end = chain
            .iter()
            .position(|r| r.id == upto)
            .ok_or_else(|| GovernanceError::UnknownRevision(upto.to_string()))?;
        chain.truncate(end + 1);
        Ok(chain)
    }

    /// Build a history without append checks
    #[cfg(test)]
    pub(crate) fn from_parts(revisions: Vec<Revision>, tip: Option<&str>) -> Self {
        let mut history = Self::new();
        history.revisions = revisions.into_iter().map(|r| (r.id.clone(), r)).collect();
        history.tip = tip.map(str::to_string);
        history
    }
}

impl Default for MigrationHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ColumnSpec, Operation};

    fn revision(id: &str, parent: Option<&str>) -> Revision {
        Revision::new(
            id,
            parent,
            vec![Operation::AddColumn {
                table: "students".to_string(),
                column: ColumnSpec::new(format!("col_{}", id), "text"),
            }],
        )
    }

    fn chain_of(ids: &[&str]) -> MigrationHistory {
        let mut history = MigrationHistory::new();
        let mut parent = None;
        for id in ids {
            history.append(revision(id, parent)).unwrap();
            parent = Some(*id);
        }
        history
    }

    #[test]
    fn test_append_and_linearize() {
        let history = chain_of(&["a1", "b2", "c3"]);
        let ids: Vec<_> = history.linearize().unwrap().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b2", "c3"]);
        assert_eq!(history.tip(), Some("c3"));
    }

    #[test]
    fn test_append_with_unknown_parent_leaves_tip_unchanged() {
        let mut history = chain_of(&["a1", "b2"]);
        let err = history.append(revision("c3", Some("zz"))).unwrap_err();

        assert!(matches!(err, GovernanceError::ChainError { ref revision, .. } if revision == "c3"));
        assert_eq!(history.tip(), Some("b2"));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_append_rejects_fork_and_duplicate() {
        let mut history = chain_of(&["a1", "b2"]);
        assert!(matches!(
            history.append(revision("c3", Some("a1"))),
            Err(GovernanceError::ChainError { .. })
        ));
        assert!(matches!(
            history.append(revision("b2", Some("b2"))),
            Err(GovernanceError::ChainError { .. })
        ));
        assert!(matches!(
            history.append(revision("r2", None)),
            Err(GovernanceError::ChainError { .. })
        ));
        assert!(matches!(
            history.append(revision("bad-id", Some("b2"))),
            Err(GovernanceError::ChainError { .. })
        ));
        assert_eq!(history.tip(), Some("b2"));
    }

    #[test]
    fn test_resolve_references() {
        let mut history = chain_of(&["a1", "b2", "c3", "d4"]);
        history.set_current("b2").unwrap();

        assert_eq!(history.resolve("head").unwrap(), "d4");
        assert_eq!(history.resolve("current").unwrap(), "b2");
        assert_eq!(history.resolve("c3").unwrap(), "c3");
        assert_eq!(history.resolve("current+1").unwrap(), "c3");
        assert_eq!(history.resolve("+2").unwrap(), "d4");
        assert_eq!(history.resolve("head-3").unwrap(), "a1");
        assert_eq!(history.resolve("a1+1").unwrap(), "b2");
    }

    #[test]
    fn test_resolve_unknown_references() {
        let history = chain_of(&["a1", "b2"]);

        assert!(matches!(history.resolve("zz"), Err(GovernanceError::UnknownRevision(_))));
        assert!(matches!(history.resolve("head+1"), Err(GovernanceError::UnknownRevision(_))));
        assert!(matches!(history.resolve("a1-1"), Err(GovernanceError::UnknownRevision(_))));
        // no applied marker yet
        assert!(matches!(history.resolve("current"), Err(GovernanceError::UnknownRevision(_))));
    }

    #[test]
    fn test_linearize_detects_cycle() {
        let history = MigrationHistory::from_parts(
            vec![revision("a1", Some("b2")), revision("b2", Some("a1"))],
            Some("b2"),
        );
        assert!(matches!(
            history.linearize(),
            Err(GovernanceError::CycleDetected { visited: 2 })
        ));
    }

    #[test]
    fn test_chain_until() {
        let history = chain_of(&["a1", "b2", "c3"]);
        let ids: Vec<_> = history.chain_until("b2").unwrap().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec!["a1", "b2"]);
        assert!(history.chain_until("zz").is_err());
    }
}
