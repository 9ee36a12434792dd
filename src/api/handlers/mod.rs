// HTTP handlers (driving adapters over the coordinator)

pub mod approvals;
pub mod audit;
pub mod health;
pub mod work;
pub mod workflow;
