//! Locked shared-context store
//!
//! Stateful nodes perform atomic read-modify-write cycles against state
//! shared across concurrent executions of the same flow. This crate
//! provides the lock-and-read / save-and-unlock protocol over two backends:
//! an in-memory table for tests and single-process deployments, and a Redis
//! cache whose link can disconnect and resynchronize.

mod link;
mod memory;
mod redis_store;
mod store;

pub use link::{CacheLink, LinkState};
pub use memory::MemoryContextStore;
pub use redis_store::{RedisConfig, RedisContextStore};
pub use store::update;
