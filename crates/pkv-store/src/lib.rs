//! Persistence engine for PKV.
//!
//! A [`Kvs`] instance is a persistent map of names to
//! [`KvsValue`](pkv_types::KvsValue)s, stored as a human-auditable JSON
//! document with an Adler-32 integrity tag. Flushing publishes the live
//! map and rotates the previous version into a bounded snapshot ring that
//! [`Kvs::snapshot_restore`] can bring back. Keys never written fall back
//! to a read-only defaults document loaded at open.
//!
//! # Opening a store
//!
//! Use [`KvsBuilder`] for shared, per-id deduplicated instances, or
//! [`Kvs::open`] for a directly owned one:
//!
//! ```no_run
//! use pkv_store::{InstanceId, KvsBuilder};
//!
//! # fn main() -> Result<(), pkv_store::KvsError> {
//! let kvs = KvsBuilder::new(InstanceId::new(0)).dir("/var/lib/app").build()?;
//! kvs.set_value("counter", 1i32)?;
//! kvs.flush()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency contract
//!
//! Every operation acquires the instance mutex with `try_lock`: if the
//! instance is busy on another thread, the call fails with
//! `MutexLockFailed` immediately instead of blocking. I/O during a flush
//! happens under the lock, so on-disk transitions are serialized per
//! instance; separate instances proceed in parallel.

pub mod builder;
pub mod fs;
pub mod json;
pub mod kvs;

pub use builder::{clear_cache, KvsBuilder};
pub use fs::{Filesystem, StdFilesystem};
pub use json::{JsonCodec, SerdeJsonCodec};
pub use kvs::{Kvs, OpenNeed, KVS_MAX_KEYS, KVS_MAX_SNAPSHOTS};

// Re-exported so callers need only this crate for everyday use.
pub use pkv_types::{InstanceId, KvsError, KvsMap, KvsValue, SnapshotId};
