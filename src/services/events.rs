// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Best-effort domain event publication.
//!
//! Callers enqueue onto a bounded channel and never wait for delivery. A
//! single background worker drains the channel and publishes each event
//! under its own timeout. Delivery is at most once: a full queue, a failed
//! publish or a timed-out publish all drop the event with a log line.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const TOPIC_USER_CREATED: &str = "user.created";
pub const TOPIC_RECOVERY_REQUESTED: &str = "user.recovery_requested";

/// Events emitted by the auth core.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    UserCreated {
        user_id: Uuid,
        username: String,
        email: String,
        created_at: String,
    },
    /// Carries the recovery token to the mailer; never log the payload.
    RecoveryRequested {
        user_id: Uuid,
        email: String,
        token: String,
        expires_in: u64,
    },
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::UserCreated { .. } => TOPIC_USER_CREATED,
            DomainEvent::RecoveryRequested { .. } => TOPIC_RECOVERY_REQUESTED,
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            DomainEvent::UserCreated { user_id, .. }
            | DomainEvent::RecoveryRequested { user_id, .. } => *user_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event transport failed: {0}")]
    Transport(String),

    #[error("event endpoint rejected {topic} with status {status}")]
    Rejected { topic: String, status: u16 },
}

/// Sink for domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, event: &DomainEvent) -> Result<(), PublishError>;
}

/// Writes a log line per event and delivers nothing. Used when no event
/// endpoint is configured.
#[derive(Debug, Default, Clone)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, topic: &str, event: &DomainEvent) -> Result<(), PublishError> {
        tracing::info!(topic, user_id = %event.user_id(), "Domain event (not delivered)");
        Ok(())
    }
}

/// POSTs each event as JSON to `{endpoint}/{topic}`.
#[derive(Clone)]
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPublisher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EventPublisher for HttpPublisher {
    async fn publish(&self, topic: &str, event: &DomainEvent) -> Result<(), PublishError> {
        let url = format!("{}/{}", self.endpoint, topic);
        let response = self
            .client
            .post(&url)
            .json(event)
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected {
                topic: topic.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// What happened to an enqueued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    Dropped,
}

/// Producer side of the event queue.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<DomainEvent>,
}

impl EventQueue {
    /// Create a queue without a worker. The caller owns the receiver.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<DomainEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Create a queue and spawn its publishing worker.
    pub fn start(
        capacity: usize,
        publisher: Arc<dyn EventPublisher>,
        publish_timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (queue, rx) = Self::bounded(capacity);
        let worker = spawn_worker(rx, publisher, publish_timeout);
        (queue, worker)
    }

    /// Hand an event to the worker without waiting.
    pub fn enqueue(&self, event: DomainEvent) -> EnqueueOutcome {
        let topic = event.topic();
        match self.tx.try_send(event) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(topic, "Event queue full, dropping event");
                EnqueueOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(topic, "Event worker stopped, dropping event");
                EnqueueOutcome::Dropped
            }
        }
    }
}

/// Drain `rx` until every sender is gone.
pub fn spawn_worker(
    mut rx: mpsc::Receiver<DomainEvent>,
    publisher: Arc<dyn EventPublisher>,
    publish_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let topic = event.topic();
            let user_id = event.user_id();
            match tokio::time::timeout(publish_timeout, publisher.publish(topic, &event)).await {
                Ok(Ok(())) => tracing::debug!(topic, user_id = %user_id, "Event published"),
                Ok(Err(e)) => {
                    tracing::warn!(topic, user_id = %user_id, error = %e, "Event publish failed")
                }
                Err(_) => tracing::warn!(
                    topic,
                    user_id = %user_id,
                    timeout_ms = publish_timeout.as_millis() as u64,
                    "Event publish timed out"
                ),
            }
        }
        tracing::debug!("Event worker exiting");
    })
}
