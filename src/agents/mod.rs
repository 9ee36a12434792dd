// Agent coordination modules
//
// Work queue, event bus, messenger, quality gates and audit log, composed
// by the workflow coordinator and driven by worker agents.

pub mod approvals;
pub mod audit;
pub mod errors;
pub mod events;
pub mod gates;
pub mod manager;
pub mod messages;
pub mod prompts;
pub mod provider;
pub mod queue;
pub mod state;
pub mod types;
pub mod worker;

// Re-export main types
pub use approvals::{ApprovalSource, AutoApprove, PendingApprovals};
pub use audit::AuditRecorder;
pub use errors::{CoordinationError, CoordinationResult};
pub use events::{AgentEvent, AgentEventKind, EventBus};
pub use gates::{GateController, GateScope, QualityGate};
pub use manager::{CompletionOutcome, WorkflowCoordinator};
pub use messages::{AgentMessage, AgentMessenger};
pub use queue::WorkQueue;
pub use worker::{Agent, WorkerAgent};
