// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Redis session store.
//!
//! Compound mutations run as Lua scripts so they are atomic on the server.
//! The scripts derive the session-set key from the stored owner, so they
//! assume a single Redis node rather than a cluster.

use super::{
    effective_ttl, parse_user_id, recovery_key, refresh_key, sessions_key, SessionError,
    SessionStore, REFRESH_PREFIX, SESSIONS_PREFIX,
};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use std::time::Duration;
use uuid::Uuid;

/// KEYS[1] = refresh key, ARGV[1] = token, ARGV[2] = session set prefix.
/// Returns the owner id, or nil if the token was not live.
const TAKE_REFRESH_LUA: &str = r#"
local owner = redis.call('GET', KEYS[1])
if not owner then
  return false
end
redis.call('DEL', KEYS[1])
redis.call('SREM', ARGV[2] .. owner, ARGV[1])
return owner
"#;

/// KEYS[1] = session set key, ARGV[1] = refresh key prefix.
/// Returns the number of refresh keys that were still live.
const CLOSE_ALL_LUA: &str = r#"
local tokens = redis.call('SMEMBERS', KEYS[1])
local closed = 0
for _, token in ipairs(tokens) do
  closed = closed + redis.call('DEL', ARGV[1] .. token)
end
redis.call('DEL', KEYS[1])
return closed
"#;

/// Session store backed by a Redis connection manager.
#[derive(Clone)]
pub struct RedisSessionStore {
    connection_manager: ConnectionManager,
    take_refresh: Script,
    close_all: Script,
}

impl RedisSessionStore {
    /// Open a managed connection to `redis_url` and check it with PING.
    pub async fn connect(redis_url: &str) -> Result<Self, SessionError> {
        let client = Client::open(redis_url).map_err(backend)?;
        let connection_manager = ConnectionManager::new(client).await.map_err(backend)?;

        let store = Self {
            connection_manager,
            take_refresh: Script::new(TAKE_REFRESH_LUA),
            close_all: Script::new(CLOSE_ALL_LUA),
        };
        store.ping().await?;

        tracing::info!("Connected to Redis session store");
        Ok(store)
    }

    async fn get_user(&self, key: &str) -> Result<Option<Uuid>, SessionError> {
        let mut conn = self.connection_manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        raw.map(|raw| parse_user_id(key, &raw)).transpose()
    }

    async fn take_refresh(&self, token: &str) -> Result<Option<Uuid>, SessionError> {
        let key = refresh_key(token);
        let mut conn = self.connection_manager.clone();
        let owner: Option<String> = self
            .take_refresh
            .key(&key)
            .arg(token)
            .arg(SESSIONS_PREFIX)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        owner.map(|raw| parse_user_id(&key, &raw)).transpose()
    }
}

/// Redis takes whole seconds and rejects 0.
fn ttl_secs(ttl: Duration) -> u64 {
    effective_ttl(ttl).as_secs()
}

fn backend(err: RedisError) -> SessionError {
    SessionError::Backend(err.to_string())
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn store_refresh(
        &self,
        token: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        let set_key = sessions_key(user_id);
        let secs = ttl_secs(ttl);
        let mut conn = self.connection_manager.clone();

        let _: () = redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(&set_key)
            .arg(token)
            .ignore()
            .cmd("EXPIRE")
            .arg(&set_key)
            .arg(secs)
            .ignore()
            .cmd("SET")
            .arg(refresh_key(token))
            .arg(user_id.to_string())
            .arg("EX")
            .arg(secs)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn lookup_user_by_refresh(&self, token: &str) -> Result<Option<Uuid>, SessionError> {
        self.get_user(&refresh_key(token)).await
    }

    async fn consume_refresh(&self, token: &str) -> Result<Option<Uuid>, SessionError> {
        self.take_refresh(token).await
    }

    async fn remove_refresh(&self, token: &str) -> Result<(), SessionError> {
        self.take_refresh(token).await.map(|_| ())
    }

    async fn close_all_sessions(&self, user_id: Uuid) -> Result<usize, SessionError> {
        let mut conn = self.connection_manager.clone();
        let closed: usize = self
            .close_all
            .key(sessions_key(user_id))
            .arg(REFRESH_PREFIX)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(closed)
    }

    async fn store_recovery(
        &self,
        token: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        let mut conn = self.connection_manager.clone();
        let _: () = redis::cmd("SET")
            .arg(recovery_key(token))
            .arg(user_id.to_string())
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn lookup_user_by_recovery(&self, token: &str) -> Result<Option<Uuid>, SessionError> {
        self.get_user(&recovery_key(token)).await
    }

    async fn consume_recovery(&self, token: &str) -> Result<Option<Uuid>, SessionError> {
        let key = recovery_key(token);
        let mut conn = self.connection_manager.clone();
        let raw: Option<String> = redis::cmd("GETDEL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        raw.map(|raw| parse_user_id(&key, &raw)).transpose()
    }

    async fn ping(&self) -> Result<(), SessionError> {
        let mut conn = self.connection_manager.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(SessionError::Backend(format!(
                "unexpected PING reply: {reply}"
            )))
        }
    }
}
