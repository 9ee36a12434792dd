// Agent event system
//
// Topic-based publish/subscribe keyed by event kind. A publish fans out to
// every handler of the kind concurrently, joins all of them, and reports
// per-handler failures to the caller instead of aborting the dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::audit::AuditRecorder;
use crate::domain::audit::AuditAction;

const BUS_ACTOR: &str = "event_bus";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    WorkCompleted,
    GatePassed,
    GateFailed,
    PhaseTransition,
    Error,
}

impl std::fmt::Display for AgentEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentEventKind::WorkCompleted => write!(f, "work_completed"),
            AgentEventKind::GatePassed => write!(f, "gate_passed"),
            AgentEventKind::GateFailed => write!(f, "gate_failed"),
            AgentEventKind::PhaseTransition => write!(f, "phase_transition"),
            AgentEventKind::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub kind: AgentEventKind,
    pub source: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(kind: AgentEventKind, source: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind,
            source: source.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Receives events of the kinds it was subscribed to
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &AgentEvent) -> Result<(), String>;
}

/// Adapts an async closure into an [`EventHandler`]
pub struct FnHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(AgentEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), String>> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(AgentEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), String>> + Send,
{
    async fn handle(&self, event: &AgentEvent) -> Result<(), String> {
        (self.f)(event.clone()).await
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionToken(Uuid);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub token: SubscriptionToken,
    pub error: String,
}

/// Outcome of one publish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Number of handlers invoked
    pub delivered: usize,
    pub failures: Vec<HandlerFailure>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

type Subscribers = HashMap<AgentEventKind, Vec<(SubscriptionToken, Arc<dyn EventHandler>)>>;

pub struct EventBus {
    subscribers: RwLock<Subscribers>,
    audit: Arc<AuditRecorder>,
}

impl EventBus {
    pub fn new(audit: Arc<AuditRecorder>) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            audit,
        }
    }

    pub async fn subscribe(
        &self,
        kind: AgentEventKind,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionToken {
        let token = SubscriptionToken(Uuid::new_v4());
        self.subscribers
            .write()
            .await
            .entry(kind)
            .or_default()
            .push((token, handler));
        token
    }

    /// Subscribes an async closure
    pub async fn subscribe_fn<F, Fut>(&self, kind: AgentEventKind, f: F) -> SubscriptionToken
    where
        F: Fn(AgentEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.subscribe(kind, Arc::new(FnHandler::new(f))).await
    }

    /// Removes a subscription. Returns false if the token was unknown.
    pub async fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let mut removed = false;
        for handlers in subscribers.values_mut() {
            let before = handlers.len();
            handlers.retain(|(t, _)| *t != token);
            removed |= handlers.len() != before;
        }
        removed
    }

    pub async fn subscriber_count(&self, kind: AgentEventKind) -> usize {
        self.subscribers
            .read()
            .await
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Dispatches `event` to every handler of its kind.
    ///
    /// Handlers run concurrently on their own tasks; this returns once all
    /// of them finished. Errors and panics are collected per handler.
    pub async fn publish(&self, event: AgentEvent) -> PublishReport {
        let handlers: Vec<(SubscriptionToken, Arc<dyn EventHandler>)> = self
            .subscribers
            .read()
            .await
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();

        let event = Arc::new(event);
        let tasks = handlers.into_iter().map(|(token, handler)| {
            let event = Arc::clone(&event);
            let task = tokio::spawn(async move { handler.handle(&event).await });
            async move {
                match task.await {
                    Ok(Ok(())) => None,
                    Ok(Err(error)) => Some(HandlerFailure { token, error }),
                    Err(join_error) => Some(HandlerFailure {
                        token,
                        error: format!("handler panicked: {}", join_error),
                    }),
                }
            }
        });
        let outcomes = join_all(tasks).await;

        let report = PublishReport {
            delivered: outcomes.len(),
            failures: outcomes.into_iter().flatten().collect(),
        };
        for failure in &report.failures {
            warn!(kind = %event.kind, source = %event.source, error = %failure.error, "Event handler failed");
        }
        self.audit.record(
            BUS_ACTOR,
            AuditAction::EventDispatched,
            format!(
                "{} from {} to {} handler(s), {} failed",
                event.kind,
                event.source,
                report.delivered,
                report.failures.len()
            ),
        );
        report
    }
}
