use crate::{CacheLink, LinkState};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use relaycore::{ContextError, ContextKey, ContextLease, SharedContext};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Compare-token delete: only the holder that acquired the lock may release
/// it, so an expired-and-reacquired lock is never stolen back.
const UNLOCK_SCRIPT: &str =
    "if redis.call('get', KEYS[1]) == ARGV[1] then return redis.call('del', KEYS[1]) else return 0 end";

/// Configuration for the Redis context store.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub key_prefix: String,
    /// Backstop expiry on held locks; reclaims keys whose holder died.
    pub lock_ttl: Duration,
    /// Acquisition budget before `ContextError::LockTimeout`.
    pub lock_timeout: Duration,
    pub retry_delay: Duration,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: "relay".to_string(),
            lock_ttl: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(50),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

/// Distributed context store over a Redis cache link.
///
/// Locks are `SET NX PX` tokens with a TTL backstop; content lives under
/// the rendered context-key path. The link reconnects lazily, and every
/// reconnect flushes the local read cache first.
pub struct RedisContextStore {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    link: CacheLink,
    config: RedisConfig,
}

impl RedisContextStore {
    /// Open the client and probe the connection so misconfiguration
    /// surfaces here instead of at the first lock attempt.
    pub async fn connect(config: RedisConfig) -> Result<Self, ContextError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| ContextError::Backend(e.to_string()))?;
        let store = Self {
            client,
            conn: Mutex::new(None),
            link: CacheLink::new(),
            config,
        };
        let mut conn = store.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ContextError::Backend(e.to_string()))?;
        Ok(store)
    }

    pub fn link(&self) -> &CacheLink {
        &self.link
    }

    async fn conn(&self) -> Result<MultiplexedConnection, ContextError> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        if self.link.state() != LinkState::Connected {
            self.link.mark_reconnecting();
        }
        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                *slot = Some(conn.clone());
                self.link.mark_connected();
                Ok(conn)
            }
            Err(e) => {
                self.link.mark_disconnected();
                tracing::warn!(error = %e, "redis handshake failed");
                Err(ContextError::Disconnected)
            }
        }
    }

    async fn fail(&self, e: redis::RedisError) -> ContextError {
        if e.is_connection_dropped() || e.is_io_error() {
            *self.conn.lock().await = None;
            self.link.mark_disconnected();
        }
        ContextError::Backend(e.to_string())
    }

    fn data_key(&self, key: &ContextKey) -> String {
        format!("{}:ctx:{}", self.config.key_prefix, key)
    }

    fn lock_key(&self, key: &ContextKey) -> String {
        format!("{}:lock:{}", self.config.key_prefix, key)
    }

    fn parse_content(raw: Option<String>) -> Value {
        raw.and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(Value::Null)
    }

    async fn release(&self, lock_key: &str, token: &str) -> Result<i32, ContextError> {
        let mut conn = self.conn().await?;
        let script = redis::Script::new(UNLOCK_SCRIPT);
        match script
            .key(lock_key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
        {
            Ok(n) => Ok(n),
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn read_scoped(&self, cache_key: &str, redis_key: &str) -> Result<Value, ContextError> {
        if let Some(value) = self.link.get(cache_key) {
            return Ok(value);
        }
        let mut conn = self.conn().await?;
        let raw: Option<String> = match conn.get(redis_key).await {
            Ok(raw) => raw,
            Err(e) => return Err(self.fail(e).await),
        };
        let value = Self::parse_content(raw);
        self.link.put(cache_key, value.clone());
        Ok(value)
    }
}

#[async_trait]
impl SharedContext for RedisContextStore {
    async fn lock_and_read(
        &self,
        key: &ContextKey,
    ) -> Result<(ContextLease, Value), ContextError> {
        let lease = ContextLease::new(key.clone());
        let token = lease.token().to_string();
        let lock_key = self.lock_key(key);
        let ttl_ms = self.config.lock_ttl.as_millis() as u64;
        let deadline = Instant::now() + self.config.lock_timeout;

        loop {
            let mut conn = self.conn().await?;
            let acquired: Option<String> = match redis::cmd("SET")
                .arg(&lock_key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await
            {
                Ok(reply) => reply,
                Err(e) => return Err(self.fail(e).await),
            };
            if acquired.is_some() {
                break;
            }
            if Instant::now() + self.config.retry_delay >= deadline {
                return Err(ContextError::LockTimeout {
                    key: key.to_string(),
                });
            }
            sleep(self.config.retry_delay).await;
        }

        let mut conn = self.conn().await?;
        let raw: Option<String> = match conn.get(self.data_key(key)).await {
            Ok(raw) => raw,
            Err(e) => {
                // The lock was granted; release it before surfacing the
                // read failure so the key is not stuck until TTL.
                let err = self.fail(e).await;
                let _ = self.release(&lock_key, &token).await;
                return Err(err);
            }
        };

        Ok((lease, Self::parse_content(raw)))
    }

    async fn save_and_unlock(
        &self,
        lease: ContextLease,
        content: Value,
    ) -> Result<(), ContextError> {
        let key = lease.key().clone();
        let token = lease.token().to_string();
        let data_key = self.data_key(&key);
        let lock_key = self.lock_key(&key);

        let payload = serde_json::to_string(&content)
            .map_err(|e| ContextError::Backend(e.to_string()))?;

        let write_result: Result<(), ContextError> = match self.conn().await {
            Ok(mut conn) => match conn.set::<_, _, ()>(&data_key, payload).await {
                Ok(()) => Ok(()),
                Err(e) => Err(ContextError::WriteFailed {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            },
            Err(e) => Err(ContextError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        };

        // Released regardless of the write outcome; if the release itself
        // cannot reach the backend, the TTL reclaims the lock.
        match self.release(&lock_key, &token).await {
            Ok(1) => {}
            Ok(_) => {
                write_result?;
                return Err(ContextError::StaleLease {
                    key: key.to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "lock release did not reach backend");
            }
        }

        write_result
    }

    async fn tenant_context(&self, tenant: &str, name: &str) -> Result<Value, ContextError> {
        let cache_key = format!("tenant:{}:{}", tenant, name);
        let redis_key = format!("{}:tenant:{}:{}", self.config.key_prefix, tenant, name);
        self.read_scoped(&cache_key, &redis_key).await
    }

    async fn flow_context(
        &self,
        tenant: &str,
        flow_id: &str,
        name: &str,
    ) -> Result<Value, ContextError> {
        let cache_key = format!("flow:{}:{}:{}", tenant, flow_id, name);
        let redis_key = format!(
            "{}:flow:{}:{}:{}",
            self.config.key_prefix, tenant, flow_id, name
        );
        self.read_scoped(&cache_key, &redis_key).await
    }
}
