//! Append-only log of resolved variable values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A recorded variable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Position in the log.
    pub index: usize,
    /// Variable name.
    pub variable: String,
    /// Produced value.
    pub value: String,
    /// Name of the resolver that produced it.
    pub resolver: String,
    /// When the value was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Session-scoped record of every value the resolution chain produced.
///
/// Entries are never removed or rewritten; callers refer to them by index.
#[derive(Debug, Default)]
pub struct SnapshotLog {
    entries: RwLock<Vec<SnapshotEntry>>,
}

impl SnapshotLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a value and returns its index.
    pub async fn append(
        &self,
        variable: impl Into<String>,
        value: impl Into<String>,
        resolver: impl Into<String>,
    ) -> usize {
        let mut guard = self.entries.write().await;
        let index = guard.len();
        guard.push(SnapshotEntry {
            index,
            variable: variable.into(),
            value: value.into(),
            resolver: resolver.into(),
            recorded_at: Utc::now(),
        });
        index
    }

    /// Returns the entry at `index`.
    pub async fn get(&self, index: usize) -> Option<SnapshotEntry> {
        self.entries.read().await.get(index).cloned()
    }

    /// Returns a copy of all entries in recording order.
    pub async fn entries(&self) -> Vec<SnapshotEntry> {
        self.entries.read().await.clone()
    }

    /// Returns the number of recorded entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when nothing has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_with_sequential_indices() {
        let log = SnapshotLog::new();
        assert!(log.is_empty().await);

        let first = log.append("branch", "main", "toolchain").await;
        let second = log.append("os", "linux", "system").await;
        assert_eq!((first, second), (0, 1));
        assert_eq!(log.len().await, 2);

        let entry = log.get(1).await.unwrap();
        assert_eq!(entry.variable, "os");
        assert_eq!(entry.resolver, "system");
        assert!(log.get(2).await.is_none());

        let all = log.entries().await;
        assert!(all[0].recorded_at <= all[1].recorded_at);
    }
}
