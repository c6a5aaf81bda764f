// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process session store for tests and single-instance development.
//!
//! One mutex guards all maps, so every compound operation is atomic.
//! Expiry uses tokio's clock. Expired entries are dropped when touched, and
//! every `SWEEP_EVERY` stores a full sweep reclaims entries nobody came back
//! for.

use super::{effective_ttl, SessionError, SessionStore};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Stores between two full sweeps of expired entries.
const SWEEP_EVERY: u64 = 256;

#[derive(Debug, Clone, Copy)]
struct Entry {
    user_id: Uuid,
    expires_at: Instant,
}

#[derive(Debug)]
struct SessionSet {
    tokens: HashSet<String>,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    refresh: HashMap<String, Entry>,
    sessions: HashMap<Uuid, SessionSet>,
    recovery: HashMap<String, Entry>,
    stores: u64,
}

impl State {
    fn live_entry(map: &mut HashMap<String, Entry>, token: &str, now: Instant) -> Option<Entry> {
        match map.get(token).copied() {
            Some(entry) if entry.expires_at > now => Some(entry),
            Some(_) => {
                map.remove(token);
                None
            }
            None => None,
        }
    }

    fn take_refresh(&mut self, token: &str, now: Instant) -> Option<Uuid> {
        let entry = Self::live_entry(&mut self.refresh, token, now)?;
        self.refresh.remove(token);
        if let Some(set) = self.sessions.get_mut(&entry.user_id) {
            set.tokens.remove(token);
            if set.tokens.is_empty() {
                self.sessions.remove(&entry.user_id);
            }
        }
        Some(entry.user_id)
    }

    /// Count a store and sweep once every `SWEEP_EVERY` of them.
    fn note_store(&mut self, now: Instant) {
        self.stores = self.stores.wrapping_add(1);
        if self.stores % SWEEP_EVERY == 0 {
            self.purge_expired(now);
        }
    }

    fn purge_expired(&mut self, now: Instant) {
        let State {
            refresh,
            sessions,
            recovery,
            ..
        } = self;

        refresh.retain(|_, entry| entry.expires_at > now);
        recovery.retain(|_, entry| entry.expires_at > now);
        sessions.retain(|_, set| {
            if set.expires_at <= now {
                return false;
            }
            set.tokens.retain(|token| refresh.contains_key(token));
            !set.tokens.is_empty()
        });
    }
}

/// Session store backed by process memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    state: Mutex<State>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, SessionError> {
        self.state
            .lock()
            .map_err(|_| SessionError::Backend("session state lock poisoned".to_string()))
    }

    /// Live refresh tokens currently in the user's session set.
    pub fn session_tokens(&self, user_id: Uuid) -> Vec<String> {
        let now = Instant::now();
        let Ok(state) = self.lock() else {
            return Vec::new();
        };
        state
            .sessions
            .get(&user_id)
            .filter(|set| set.expires_at > now)
            .map(|set| {
                set.tokens
                    .iter()
                    .filter(|token| {
                        state
                            .refresh
                            .get(*token)
                            .is_some_and(|entry| entry.expires_at > now)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn store_refresh(
        &self,
        token: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        let now = Instant::now();
        let expires_at = now + effective_ttl(ttl);
        let mut state = self.lock()?;
        state.note_store(now);

        let set = state.sessions.entry(user_id).or_insert_with(|| SessionSet {
            tokens: HashSet::new(),
            expires_at,
        });
        if set.expires_at <= now {
            set.tokens.clear();
        }
        set.tokens.insert(token.to_string());
        set.expires_at = expires_at;

        state
            .refresh
            .insert(token.to_string(), Entry { user_id, expires_at });
        Ok(())
    }

    async fn lookup_user_by_refresh(&self, token: &str) -> Result<Option<Uuid>, SessionError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        Ok(State::live_entry(&mut state.refresh, token, now).map(|entry| entry.user_id))
    }

    async fn consume_refresh(&self, token: &str) -> Result<Option<Uuid>, SessionError> {
        let now = Instant::now();
        Ok(self.lock()?.take_refresh(token, now))
    }

    async fn remove_refresh(&self, token: &str) -> Result<(), SessionError> {
        let now = Instant::now();
        self.lock()?.take_refresh(token, now);
        Ok(())
    }

    async fn close_all_sessions(&self, user_id: Uuid) -> Result<usize, SessionError> {
        let now = Instant::now();
        let mut state = self.lock()?;

        let Some(set) = state.sessions.remove(&user_id) else {
            return Ok(0);
        };

        let mut closed = 0;
        for token in &set.tokens {
            if let Some(entry) = state.refresh.remove(token) {
                if entry.expires_at > now {
                    closed += 1;
                }
            }
        }
        Ok(closed)
    }

    async fn store_recovery(
        &self,
        token: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        let now = Instant::now();
        let expires_at = now + effective_ttl(ttl);
        let mut state = self.lock()?;
        state.note_store(now);
        state
            .recovery
            .insert(token.to_string(), Entry { user_id, expires_at });
        Ok(())
    }

    async fn lookup_user_by_recovery(&self, token: &str) -> Result<Option<Uuid>, SessionError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        Ok(State::live_entry(&mut state.recovery, token, now).map(|entry| entry.user_id))
    }

    async fn consume_recovery(&self, token: &str) -> Result<Option<Uuid>, SessionError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        let entry = State::live_entry(&mut state.recovery, token, now);
        state.recovery.remove(token);
        Ok(entry.map(|entry| entry.user_id))
    }

    async fn ping(&self) -> Result<(), SessionError> {
        self.lock().map(|_| ())
    }
}
