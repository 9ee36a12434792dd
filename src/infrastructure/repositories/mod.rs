// Repository implementations (data access layer)
// Adapters that implement domain repository interfaces

pub mod postgres_audit_repository;

pub use postgres_audit_repository::PostgresAuditRepository;
