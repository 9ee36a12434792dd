// Bounded audit trail shared by every coordination component
//
// Components only append; external callers only read. The in-memory ring
// keeps the newest `capacity` entries and evicts from the oldest end.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::audit::{AuditAction, AuditEntry};
use crate::domain::repositories::AuditRepository;

pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

struct AuditLog {
    next_sequence: u64,
    entries: VecDeque<AuditEntry>,
}

pub struct AuditRecorder {
    capacity: usize,
    log: Mutex<AuditLog>,
    sink: Option<mpsc::UnboundedSender<AuditEntry>>,
}

impl AuditRecorder {
    /// Creates an in-memory recorder retaining at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            log: Mutex::new(AuditLog {
                next_sequence: 1,
                entries: VecDeque::with_capacity(capacity),
            }),
            sink: None,
        }
    }

    /// Creates a recorder that also forwards every entry to `repository`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_repository(capacity: usize, repository: Arc<dyn AuditRepository>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEntry>();

        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if let Err(e) = repository.append(&entry).await {
                    warn!(error = %e, sequence = entry.sequence, "Failed to persist audit entry");
                }
            }
        });

        let mut recorder = Self::new(capacity);
        recorder.sink = Some(tx);
        recorder
    }

    /// Appends an entry and returns its sequence number
    pub fn record(&self, actor: &str, action: AuditAction, summary: impl Into<String>) -> u64 {
        let entry = {
            let mut log = self.lock();
            let entry = AuditEntry {
                sequence: log.next_sequence,
                timestamp: Utc::now(),
                actor: actor.to_string(),
                action,
                summary: summary.into(),
            };
            log.next_sequence += 1;
            log.entries.push_back(entry.clone());
            while log.entries.len() > self.capacity {
                log.entries.pop_front();
            }
            entry
        };

        let sequence = entry.sequence;
        if let Some(sink) = &self.sink {
            if sink.send(entry).is_err() {
                warn!(sequence, "Audit sink closed; entry kept in memory only");
            }
        }
        sequence
    }

    /// Returns the newest `limit` entries in ascending sequence order
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let log = self.lock();
        let skip = log.entries.len().saturating_sub(limit);
        log.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding the lock leaves the ring consistent, so keep going.
    fn lock(&self) -> MutexGuard<'_, AuditLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for AuditRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    #[test]
    fn sequences_increase_from_one() {
        let audit = AuditRecorder::new(10);

        assert_eq!(audit.record("a", AuditAction::WorkAdded, "x"), 1);
        assert_eq!(audit.record("a", AuditAction::WorkDispatched, "x"), 2);
        assert_eq!(audit.len(), 2);
    }

    #[test]
    fn ring_evicts_oldest_entries() {
        let audit = AuditRecorder::new(3);
        for i in 0..5 {
            audit.record("actor", AuditAction::MessageSent, format!("m{}", i));
        }

        let entries = audit.recent(10);
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();

        assert_eq!(sequences, vec![3, 4, 5]);
        assert_eq!(entries[2].summary, "m4");
    }

    #[test]
    fn recent_returns_newest_in_ascending_order() {
        let audit = AuditRecorder::new(10);
        for i in 0..6 {
            audit.record("actor", AuditAction::WorkAdded, format!("w{}", i));
        }

        let entries = audit.recent(2);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sequence, 5);
        assert_eq!(entries[1].sequence, 6);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let audit = AuditRecorder::new(0);
        audit.record("a", AuditAction::WorkAdded, "1");
        audit.record("a", AuditAction::WorkAdded, "2");

        assert_eq!(audit.capacity(), 1);
        assert_eq!(audit.recent(5)[0].summary, "2");
    }

    struct CollectingRepository {
        entries: tokio::sync::Mutex<Vec<AuditEntry>>,
    }

    #[async_trait]
    impl AuditRepository for CollectingRepository {
        async fn append(&self, entry: &AuditEntry) -> Result<(), String> {
            self.entries.lock().await.push(entry.clone());
            Ok(())
        }

        async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, String> {
            let entries = self.entries.lock().await;
            let skip = entries.len().saturating_sub(limit);
            Ok(entries[skip..].to_vec())
        }
    }

    #[tokio::test]
    async fn entries_are_forwarded_to_repository() {
        let repo = Arc::new(CollectingRepository {
            entries: tokio::sync::Mutex::new(Vec::new()),
        });
        let audit = AuditRecorder::with_repository(2, repo.clone());

        for i in 0..4 {
            audit.record("actor", AuditAction::Handoff, format!("h{}", i));
        }

        for _ in 0..50 {
            if repo.entries.lock().await.len() == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // repository keeps everything even though the ring holds two
        assert_eq!(repo.recent(10).await.unwrap().len(), 4);
        assert_eq!(audit.len(), 2);
    }
}
