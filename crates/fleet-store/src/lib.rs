//! Persistent state repository for the fleet control plane.
//!
//! Durable state lives in a key-value store with hash, set and sorted-set
//! primitives. This crate defines:
//!
//! - [`KvBackend`]: the batched command interface, with two backends:
//!   [`MemoryBackend`] (process-local) and [`RedisBackend`].
//! - [`KeySpace`]: the flat key templates external tooling relies on.
//! - [`StateStore`]: the typed repository the control plane talks to.
//!
//! Writes touching a record and its index go out as one pipelined batch.
//! Batches are not transactions: a crash between the two halves can leave
//! a stale index entry, which readers tolerate by filtering on the record's
//! own `lastActivityTime`.

pub mod backend;
mod codec;
mod error;
mod keys;
mod state;

pub use backend::{Command, KvBackend, MemoryBackend, RedisBackend, Reply};
pub use error::StoreError;
pub use keys::KeySpace;
pub use state::{NodeAppFilter, StateStore, INDEX_MAX_SCORE, NODE_APP_TTL};
