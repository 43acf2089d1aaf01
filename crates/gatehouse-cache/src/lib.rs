//! Fixed-capacity, access-ordered response cache with per-entry TTL.
//!
//! The cache is an intrusive doubly-linked list stored in an arena
//! (`u32` indices instead of pointers) plus a key→index map. Every hit
//! promotes the entry to the head; evictions pop the tail. Expiry is
//! checked lazily on lookup — there is no background sweep thread.
//!
//! `LruCache` is single-threaded (`&mut self`); `SharedLru` wraps it in
//! a single mutex so the ordering list and the lookup map can never
//! disagree under concurrent access.

pub mod arena;
pub mod lru;
pub mod shared;

pub use lru::{CacheStats, LruCache, NO_EXPIRY};
pub use shared::SharedLru;
