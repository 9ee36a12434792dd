// Repository interfaces (ports)
// Implementations live in the infrastructure layer

pub mod audit_repository;

pub use audit_repository::AuditRepository;
