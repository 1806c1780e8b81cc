//! Side-effect records kept by an environment until cleanup.
//!
//! Resources are appended in creation order and never edited afterwards.
//! Cleanup walks them newest first so files go before the directory that
//! holds them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    File,
    Directory,
    /// Flagged by source scanning; there is no concrete path to remove.
    SideEffect,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::File => f.write_str("file"),
            ResourceType::Directory => f.write_str("directory"),
            ResourceType::SideEffect => f.write_str("side_effect"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub resource_type: ResourceType,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Resource {
    pub fn new(resource_type: ResourceType, identifier: impl Into<String>) -> Self {
        Self {
            resource_type,
            identifier: identifier.into(),
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn file(path: &Path) -> Self {
        Self::new(ResourceType::File, path.to_string_lossy())
    }

    pub fn directory(path: &Path) -> Self {
        Self::new(ResourceType::Directory, path.to_string_lossy())
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.identifier)
    }
}

/// Append-only list of resources owned by a single environment.
///
/// Not synchronized: mutation requires `&mut`, so concurrent use of one
/// ledger is ruled out by the borrow checker rather than a lock.
#[derive(Debug, Default, Clone)]
pub struct ResourceLedger {
    entries: Vec<Resource>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, resource: Resource) {
        log::debug!(
            "Registered {} resource {}",
            resource.resource_type,
            resource.identifier
        );
        self.entries.push(resource);
    }

    pub fn snapshot(&self) -> Vec<Resource> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, resource_type: ResourceType, identifier: &str) -> bool {
        self.entries
            .iter()
            .any(|r| r.resource_type == resource_type && r.identifier == identifier)
    }

    /// Remove and return every entry, newest first.
    pub fn take_newest_first(&mut self) -> Vec<Resource> {
        let mut taken = std::mem::take(&mut self.entries);
        taken.reverse();
        taken
    }

    /// Put back entries handed out by `take_newest_first` (still newest
    /// first) ahead of anything recorded since.
    pub fn reinstate(&mut self, mut newest_first: Vec<Resource>) {
        newest_first.reverse();
        newest_first.append(&mut self.entries);
        self.entries = newest_first;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_take_is_newest_first_and_reinstate_keeps_order() {
        let mut ledger = ResourceLedger::new();
        ledger.record(Resource::directory(&PathBuf::from("/tmp/ws")));
        ledger.record(Resource::file(&PathBuf::from("/tmp/ws/a.sh")));
        ledger.record(Resource::file(&PathBuf::from("/tmp/ws/b.sh")));

        let taken = ledger.take_newest_first();
        let order: Vec<_> = taken.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(order, vec!["/tmp/ws/b.sh", "/tmp/ws/a.sh", "/tmp/ws"]);
        assert!(ledger.is_empty());

        let failed: Vec<_> = taken.into_iter().filter(|r| r.identifier != "/tmp/ws/b.sh").collect();
        ledger.reinstate(failed);
        let remaining: Vec<_> = ledger.snapshot().into_iter().map(|r| r.identifier).collect();
        assert_eq!(remaining, vec!["/tmp/ws", "/tmp/ws/a.sh"]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut ledger = ResourceLedger::new();
        ledger.record(Resource::file(&PathBuf::from("/tmp/x")).with_metadata("purpose", "script"));
        let snapshot = ledger.snapshot();
        let _ = ledger.take_newest_first();
        assert!(ledger.is_empty());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].metadata.get("purpose").map(String::as_str), Some("script"));
    }
}
