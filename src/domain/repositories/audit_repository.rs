use async_trait::async_trait;

use crate::domain::audit::AuditEntry;

/// Repository trait for the audit trail
///
/// Defines the contract for durably appending audit entries.
/// Implementations must never rewrite or reorder stored entries.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append an entry
    async fn append(&self, entry: &AuditEntry) -> Result<(), String>;

    /// Fetch the newest `limit` entries, oldest first
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, String>;
}
