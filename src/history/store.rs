//! Revision store
//!
//! Loads revision documents (`*.json`, one revision per file) from a directory
//! and orders them into a [`MigrationHistory`].

use crate::error::{GovernanceError, GovernanceResult};
use crate::history::{MigrationHistory, Revision};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Directory-backed source of revisions
pub struct RevisionStore {
    dir: PathBuf,
}

impl RevisionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Read every revision document in the directory
    pub fn read_all(&self) -> GovernanceResult<Vec<Revision>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut revisions = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = std::fs::read_to_string(&path)?;
            let revision: Revision = serde_json::from_str(&raw).map_err(|e| {
                GovernanceError::chain(
                    path.file_stem().and_then(|s| s.to_str()).unwrap_or("<unnamed>"),
                    format!("unreadable revision document: {}", e),
                )
            })?;
            debug!("Read revision {} from {}", revision.id, path.display());
            revisions.push(revision);
        }

        Ok(revisions)
    }

    /// Load and order the chain
    pub fn load(&self) -> GovernanceResult<MigrationHistory> {
        let history = order_chain(self.read_all()?)?;
        info!(
            "📚 Loaded {} revisions from {} (head: {})",
            history.len(),
            self.dir.display(),
            history.tip().unwrap_or("<empty>")
        );
        Ok(history)
    }
}

/// Append revisions root-first by following the unique child of each tip
pub fn order_chain(revisions: Vec<Revision>) -> GovernanceResult<MigrationHistory> {
    let mut history = MigrationHistory::new();
    if revisions.is_empty() {
        return Ok(history);
    }

    let mut children: HashMap<Option<String>, Vec<Revision>> = HashMap::new();
    for revision in revisions {
        children.entry(revision.parent_id.clone()).or_default().push(revision);
    }

    let mut parent: Option<String> = None;
    loop {
        let mut next = match children.remove(&parent) {
            Some(next) => next,
            None => break,
        };

        if next.len() > 1 {
            let ids: Vec<_> = next.iter().map(|r| r.id.as_str()).collect();
            let at = parent.as_deref().unwrap_or("<root>");
            return Err(GovernanceError::chain(
                at,
                format!("history forks into {}", ids.join(", ")),
            ));
        }

        let revision = next.remove(0);
        parent = Some(revision.id.clone());
        history.append(revision)?;
    }

    if let Some(orphan) = children.into_values().flatten().next() {
        return Err(GovernanceError::chain(
            &orphan.id,
            format!(
                "parent {} is not reachable from the root",
                orphan.parent_id.as_deref().unwrap_or("<none>")
            ),
        ));
    }

    Ok(history)
}
