// Work item domain module
// Contains the work item entity and its status value objects

#![allow(clippy::module_inception)]

pub mod value_objects;
pub mod work_item;

// Re-export main types for convenience
pub use value_objects::{AgentId, InvalidTransition, Priority, WorkItemId, WorkStatus};
pub use work_item::WorkItem;
