//! Instance builder and process-wide registry.
//!
//! [`KvsBuilder`] is a fluent configuration surface over [`Kvs::open`].
//! `build()` consults a process-wide registry keyed by the numeric
//! instance id: while any previously built instance for that id is still
//! alive, the same shared handle is returned and the configured open
//! parameters are ignored. The registry holds weak references only, so an
//! instance dies — and its terminal flush runs — when the last outside
//! handle is dropped.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use tracing::debug;

use pkv_types::{InstanceId, KvsError};

use crate::kvs::{Kvs, OpenNeed};

/// Registry of live instances. Locked before any instance mutex, never
/// while one is held.
static REGISTRY: OnceLock<Mutex<HashMap<u32, Weak<Kvs>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<u32, Weak<Kvs>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Fluent configuration for opening a shared [`Kvs`] instance.
#[derive(Clone, Debug)]
pub struct KvsBuilder {
    instance_id: InstanceId,
    need_defaults: OpenNeed,
    need_kvs: OpenNeed,
    dir: PathBuf,
}

impl KvsBuilder {
    /// Start configuring the instance with the given id. No side effects
    /// happen until [`build`](Self::build).
    pub fn new(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            need_defaults: OpenNeed::Optional,
            need_kvs: OpenNeed::Optional,
            dir: PathBuf::new(),
        }
    }

    /// Require the defaults document to exist at open.
    pub fn need_defaults_flag(mut self, need: bool) -> Self {
        self.need_defaults = if need {
            OpenNeed::Required
        } else {
            OpenNeed::Optional
        };
        self
    }

    /// Require the current document to exist at open.
    pub fn need_kvs_flag(mut self, need: bool) -> Self {
        self.need_kvs = if need {
            OpenNeed::Required
        } else {
            OpenNeed::Optional
        };
        self
    }

    /// The directory holding the instance's files. Defaults to the
    /// current working directory.
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Return the live instance for this id, or open a new one.
    ///
    /// When an instance for the id is already alive anywhere in the
    /// process, that same handle is returned and this builder's
    /// configuration is not applied.
    pub fn build(self) -> Result<Arc<Kvs>, KvsError> {
        let mut entries = registry().lock().map_err(|_| KvsError::MutexLockFailed)?;

        let id = self.instance_id.value();
        if let Some(existing) = entries.get(&id).and_then(Weak::upgrade) {
            debug!(instance = %self.instance_id, "reusing live KVS instance");
            return Ok(existing);
        }

        let kvs = Arc::new(Kvs::open(
            self.instance_id,
            self.need_defaults,
            self.need_kvs,
            self.dir,
        )?);
        entries.retain(|_, entry| entry.strong_count() > 0);
        entries.insert(id, Arc::downgrade(&kvs));
        Ok(kvs)
    }
}

/// Drop all registry entries.
///
/// Outstanding shared handles keep working; they simply stop being
/// discoverable, and a subsequent `build()` for the same id opens a fresh
/// instance. Intended for tests and controlled shutdown.
pub fn clear_cache() -> Result<(), KvsError> {
    let mut entries = registry().lock().map_err(|_| KvsError::MutexLockFailed)?;
    entries.clear();
    Ok(())
}
