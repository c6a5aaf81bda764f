// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use roost::config::Config;
use roost::db::{FirestoreDb, MemoryUserRepository};
use roost::models::{Gender, SignInRequest, SignUpRequest};
use roost::routes::create_router;
use roost::services::{
    AuthService, AuthSettings, AvatarUploader, DomainEvent, EventPublisher, EventQueue,
    MemoryObjectStore, PasswordService, PublishError, TokenIssuer,
};
use roost::session::MemorySessionStore;
use roost::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const ACCESS_PRIVATE_PEM: &str = include_str!("../fixtures/access_private.pem");
pub const ACCESS_PUBLIC_PEM: &str = include_str!("../fixtures/access_public.pem");
#[allow(dead_code)]
pub const OTHER_PRIVATE_PEM: &str = include_str!("../fixtures/other_private.pem");
#[allow(dead_code)]
pub const OTHER_PUBLIC_PEM: &str = include_str!("../fixtures/other_public.pem");

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Firestore client pointed at the emulator.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    let project_id =
        std::env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "roost-test".to_string());
    FirestoreDb::new(&project_id)
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Forwards every published event to a channel the test can read.
#[allow(dead_code)]
pub struct RecordingPublisher {
    tx: mpsc::UnboundedSender<DomainEvent>,
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, _topic: &str, event: &DomainEvent) -> Result<(), PublishError> {
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

/// Publisher that always fails.
#[allow(dead_code)]
pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _topic: &str, _event: &DomainEvent) -> Result<(), PublishError> {
        Err(PublishError::Transport("broker unreachable".to_string()))
    }
}

/// An auth service wired to in-memory backends, with handles on each.
#[allow(dead_code)]
pub struct TestHarness {
    pub config: Config,
    pub auth: AuthService,
    pub users: MemoryUserRepository,
    pub sessions: Arc<MemorySessionStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub events: mpsc::UnboundedReceiver<DomainEvent>,
}

#[allow(dead_code)]
impl TestHarness {
    /// Next published event, or `None` if nothing arrives within a second.
    pub async fn next_event(&mut self) -> Option<DomainEvent> {
        tokio::time::timeout(Duration::from_secs(1), self.events.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            config: self.config.clone(),
            auth: self.auth.clone(),
            sessions: self.sessions.clone(),
        })
    }

    pub fn router(&self) -> axum::Router {
        create_router(self.state())
    }
}

#[allow(dead_code)]
pub fn token_issuer(access_ttl: Duration) -> TokenIssuer {
    TokenIssuer::from_pem(
        ACCESS_PRIVATE_PEM.as_bytes(),
        ACCESS_PUBLIC_PEM.as_bytes(),
        access_ttl,
    )
    .expect("fixture keys load")
}

#[allow(dead_code)]
pub fn harness() -> TestHarness {
    harness_with(Config::test_default())
}

#[allow(dead_code)]
pub fn harness_with(config: Config) -> TestHarness {
    let (tx, events) = mpsc::unbounded_channel();
    let mut harness = harness_with_publisher(config, Arc::new(RecordingPublisher { tx }));
    harness.events = events;
    harness
}

/// Harness whose events go to `publisher`; its `events` channel is closed.
#[allow(dead_code)]
pub fn harness_with_publisher(config: Config, publisher: Arc<dyn EventPublisher>) -> TestHarness {
    let users = MemoryUserRepository::new();
    let sessions = Arc::new(MemorySessionStore::new());
    let objects = Arc::new(MemoryObjectStore::new(config.media_base_url.clone()));
    let media = Arc::new(AvatarUploader::new(objects.clone()));

    let (events, _worker) = EventQueue::start(
        config.event_queue_capacity,
        publisher,
        config.event_publish_timeout,
    );

    let auth = AuthService::new(
        Arc::new(users.clone()),
        sessions.clone(),
        media,
        events,
        token_issuer(config.access_ttl),
        PasswordService::new(&config.argon2).expect("cheap argon2 params are valid"),
        AuthSettings::from_config(&config),
    );

    let (_unused_tx, events) = mpsc::unbounded_channel();
    TestHarness {
        config,
        auth,
        users,
        sessions,
        objects,
        events,
    }
}

#[allow(dead_code)]
pub fn alice_request() -> SignUpRequest {
    SignUpRequest {
        username: "alice".to_string(),
        email: "alice@x.com".to_string(),
        password: "Password1".to_string(),
        gender: Gender::Female,
        bio: String::new(),
    }
}

#[allow(dead_code)]
pub fn sign_in_request(email: &str, password: &str) -> SignInRequest {
    SignInRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

/// Build a request with a JSON body.
#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// All `Set-Cookie` header values of a response.
#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

#[allow(dead_code)]
pub fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}
