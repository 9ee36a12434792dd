// Agent message passing system
//
// Per-recipient FIFO mailboxes for point-to-point messages, plus the phase
// handoff helper that carries one phase's work product to the next agent.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::audit::AuditRecorder;
use super::errors::{CoordinationError, CoordinationResult};
use crate::domain::audit::AuditAction;

pub const DEFAULT_MAILBOX_WARN_THRESHOLD: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Handoff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub correlation_id: String,
    pub from: String,
    pub to: String,
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    /// Set only on handoffs
    #[serde(default)]
    pub phase_transition: bool,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: MessageKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            kind,
            payload,
            phase_transition: false,
            timestamp: Utc::now(),
        }
    }

    /// Builds a handoff carrying a completed work product
    pub fn handoff(
        from: impl Into<String>,
        to: impl Into<String>,
        work_product: serde_json::Value,
    ) -> Self {
        let mut message = Self::new(from, to, MessageKind::Handoff, work_product);
        message.phase_transition = true;
        message
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Rejects structurally malformed messages
    pub fn validate(&self) -> CoordinationResult<()> {
        if self.correlation_id.trim().is_empty() {
            return Err(CoordinationError::Communication(
                "message has no correlation id".to_string(),
            ));
        }
        if self.from.trim().is_empty() {
            return Err(CoordinationError::Communication(format!(
                "message {} has no sender",
                self.correlation_id
            )));
        }
        if self.to.trim().is_empty() {
            return Err(CoordinationError::Communication(format!(
                "message {} has no recipient",
                self.correlation_id
            )));
        }
        match (self.kind, self.phase_transition) {
            (MessageKind::Handoff, false) => Err(CoordinationError::Communication(format!(
                "handoff {} is missing the phase_transition marker",
                self.correlation_id
            ))),
            (MessageKind::Handoff, true) if self.payload.is_null() => {
                Err(CoordinationError::Communication(format!(
                    "handoff {} carries no work product",
                    self.correlation_id
                )))
            }
            (MessageKind::Request | MessageKind::Response | MessageKind::Notification, true) => {
                Err(CoordinationError::Communication(format!(
                    "{:?} message {} cannot carry a phase_transition marker",
                    self.kind, self.correlation_id
                )))
            }
            _ => Ok(()),
        }
    }
}

pub struct AgentMessenger {
    mailboxes: Mutex<HashMap<String, VecDeque<AgentMessage>>>,
    warn_threshold: usize,
    audit: Arc<AuditRecorder>,
}

impl AgentMessenger {
    pub fn new(audit: Arc<AuditRecorder>, warn_threshold: usize) -> Self {
        Self {
            mailboxes: Mutex::new(HashMap::new()),
            warn_threshold,
            audit,
        }
    }

    /// Appends to the recipient's mailbox, creating it on first use
    pub async fn send(&self, message: AgentMessage) -> CoordinationResult<()> {
        message.validate()?;

        let summary = format!(
            "{:?} {} -> {} ({})",
            message.kind, message.from, message.to, message.correlation_id
        );
        let sender = message.from.clone();
        let recipient = message.to.clone();

        let depth = {
            let mut mailboxes = self.mailboxes.lock().await;
            let mailbox = mailboxes.entry(recipient.clone()).or_default();
            mailbox.push_back(message);
            mailbox.len()
        };

        if depth > self.warn_threshold {
            warn!(recipient = %recipient, depth, threshold = self.warn_threshold, "Mailbox backlog above threshold");
        }
        debug!(from = %sender, to = %recipient, depth, "Message enqueued");
        self.audit.record(&sender, AuditAction::MessageSent, summary);
        Ok(())
    }

    /// Drains every queued message for `agent_id` in arrival order
    pub async fn receive(&self, agent_id: &str) -> Vec<AgentMessage> {
        let drained: Vec<AgentMessage> = {
            let mut mailboxes = self.mailboxes.lock().await;
            mailboxes
                .get_mut(agent_id)
                .map(|mailbox| mailbox.drain(..).collect())
                .unwrap_or_default()
        };

        if !drained.is_empty() {
            self.audit.record(
                agent_id,
                AuditAction::MessagesDrained,
                format!("drained {} message(s)", drained.len()),
            );
        }
        drained
    }

    /// Sends `work_product` from one phase's agent to the next one's
    pub async fn handoff(
        &self,
        from_agent: &str,
        to_agent: &str,
        work_product: serde_json::Value,
    ) -> CoordinationResult<AgentMessage> {
        let message = AgentMessage::handoff(from_agent, to_agent, work_product);
        self.send(message.clone()).await?;
        self.audit.record(
            from_agent,
            AuditAction::Handoff,
            format!("{} -> {} ({})", from_agent, to_agent, message.correlation_id),
        );
        Ok(message)
    }

    /// Number of messages waiting for `agent_id`
    pub async fn pending(&self, agent_id: &str) -> usize {
        self.mailboxes
            .lock()
            .await
            .get(agent_id)
            .map_or(0, VecDeque::len)
    }
}
