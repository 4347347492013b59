use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

/// Connection state of the underlying cache link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
    Reconnecting,
}

impl LinkState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => LinkState::Connected,
            2 => LinkState::Reconnecting,
            _ => LinkState::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LinkState::Disconnected => 0,
            LinkState::Connected => 1,
            LinkState::Reconnecting => 2,
        }
    }
}

/// Cache-link state machine with a local read cache.
///
/// While the link is down, invalidation events from the backend may be
/// missed, so everything cached before the outage is presumed stale: the
/// transition to `Connected` flushes the cache before any subsequent read.
/// The state flag is written only by the link's own event callbacks and
/// read without tearing by everyone else.
#[derive(Debug, Default)]
pub struct CacheLink {
    state: AtomicU8,
    cache: Mutex<HashMap<String, Value>>,
}

impl CacheLink {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LinkState::Disconnected.as_u8()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Handshake completed. Flushes the cache before the state flips so no
    /// reader can observe pre-outage content on a connected link.
    pub fn mark_connected(&self) {
        self.cache.lock().expect("cache poisoned").clear();
        let prev = self
            .state
            .swap(LinkState::Connected.as_u8(), Ordering::AcqRel);
        if LinkState::from_u8(prev) != LinkState::Connected {
            tracing::info!("cache link connected, local cache flushed");
        }
    }

    pub fn mark_disconnected(&self) {
        self.state
            .store(LinkState::Disconnected.as_u8(), Ordering::Release);
        tracing::warn!("cache link disconnected");
    }

    /// Informational only; behavior does not change until the handshake
    /// completes.
    pub fn mark_reconnecting(&self) {
        self.state
            .store(LinkState::Reconnecting.as_u8(), Ordering::Release);
        tracing::info!("cache link reconnecting");
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if !self.is_connected() {
            return None;
        }
        self.cache.lock().expect("cache poisoned").get(key).cloned()
    }

    pub fn put(&self, key: impl Into<String>, value: Value) {
        if !self.is_connected() {
            return;
        }
        self.cache
            .lock()
            .expect("cache poisoned")
            .insert(key.into(), value);
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().expect("cache poisoned").len()
    }
}
