// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Roost API Server
//!
//! Authentication and session service for the Roost social network.

use roost::{
    config::{Config, StorageBackend},
    db::{FirestoreDb, MemoryUserRepository, UserRepository},
    services::{
        AuthService, AuthSettings, AvatarUploader, EventPublisher, EventQueue, FsObjectStore,
        HttpPublisher, LogPublisher, PasswordService, TokenIssuer,
    },
    session::{MemorySessionStore, RedisSessionStore, SessionStore},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Roost API");

    let sessions: Arc<dyn SessionStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisSessionStore::connect(url)
                .await
                .expect("Failed to connect to Redis"),
        ),
        None => {
            tracing::warn!("REDIS_URL not set, sessions are kept in process memory");
            Arc::new(MemorySessionStore::new())
        }
    };

    let users: Arc<dyn UserRepository> = match config.storage_backend {
        StorageBackend::Firestore => Arc::new(
            FirestoreDb::new(&config.gcp_project_id)
                .await
                .expect("Failed to connect to Firestore"),
        ),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory user storage; data is lost on restart");
            Arc::new(MemoryUserRepository::new())
        }
    };

    let object_store = Arc::new(FsObjectStore::new(
        config.media_dir.clone(),
        config.media_base_url.clone(),
    ));
    let media = Arc::new(AvatarUploader::new(object_store));

    let publisher: Arc<dyn EventPublisher> = match &config.events_url {
        Some(url) => Arc::new(
            HttpPublisher::new(url.as_str(), config.event_publish_timeout)
                .expect("Failed to build event publisher"),
        ),
        None => Arc::new(LogPublisher),
    };
    let (events, _event_worker) = EventQueue::start(
        config.event_queue_capacity,
        publisher,
        config.event_publish_timeout,
    );
    tracing::info!(
        capacity = config.event_queue_capacity,
        "Event queue started"
    );

    let tokens = match &config.jwt_keys {
        Some(keys) => TokenIssuer::from_pem(
            keys.private_pem.as_bytes(),
            keys.public_pem.as_bytes(),
            config.access_ttl,
        )
        .expect("Failed to load JWT key pair"),
        None => {
            tracing::warn!("No JWT key pair configured, generating an ephemeral one");
            TokenIssuer::generate_ephemeral(config.access_ttl)
                .expect("Failed to generate JWT key pair")
        }
    };

    let passwords =
        PasswordService::new(&config.argon2).expect("Failed to initialize password hashing");

    let auth = AuthService::new(
        users,
        sessions.clone(),
        media,
        events,
        tokens,
        passwords,
        AuthSettings::from_config(&config),
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        auth,
        sessions,
    });

    // Build router
    let app = roost::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("roost=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
