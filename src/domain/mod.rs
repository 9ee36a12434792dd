// Domain layer module exports
// Following Hexagonal Architecture and DDD principles
// Domain is independent of infrastructure concerns

pub mod audit;
pub mod gate;
pub mod repositories;
pub mod work_item;
