#![forbid(unsafe_code)]

pub mod errors;
pub mod keys;
pub mod kv;
pub mod model;
pub mod store;

pub use errors::{StoreError, StoreErrorKind};
pub use kv::{FsKv, KvStore, MemoryKv};
pub use model::{minutes_between, Checkpoint, TraceLink};
pub use store::CheckpointStore;
