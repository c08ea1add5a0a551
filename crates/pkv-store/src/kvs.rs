//! The persistence engine.
//!
//! A [`Kvs`] owns one on-disk store: a current document plus integrity tag
//! (`kvs_<id>_0.json` / `.hash`), an optional read-only defaults document
//! (`kvs_<id>_default.json` / `.hash`), and a bounded ring of snapshots
//! (`kvs_<id>_1..` up to [`KVS_MAX_SNAPSHOTS`]).
//!
//! All in-memory state and every filesystem transition on the instance's
//! files are serialized by a single mutex. The mutex is acquired with
//! `try_lock` on every operation: a contended lock reports
//! `MutexLockFailed` immediately instead of blocking, so misuse surfaces
//! deterministically. Callers must not invoke the store re-entrantly while
//! holding a result that borrows it.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use pkv_codec::{decode_document, encode_document, tag_bytes, tag_matches};
use pkv_types::{InstanceId, KvsError, KvsMap, KvsValue, SnapshotId};

use crate::fs::{Filesystem, StdFilesystem};
use crate::json::{JsonCodec, SerdeJsonCodec};

/// Size of the snapshot ring: slots `1..=KVS_MAX_SNAPSHOTS` hold previous
/// committed versions, `1` being the most recent.
pub const KVS_MAX_SNAPSHOTS: usize = 3;

/// Maximum number of keys the live map may hold.
pub const KVS_MAX_KEYS: usize = 1000;

/// Whether a document must exist when the store is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenNeed {
    /// A missing document yields an empty map. A present document is
    /// still verified and parsed.
    #[default]
    Optional,
    /// A missing document fails the open.
    Required,
}

struct KvsInner {
    /// Live writes.
    kvs: KvsMap,
    /// Read-only defaults, loaded once at open.
    default_values: KvsMap,
    /// Whether a terminal flush runs when the instance is dropped.
    flush_on_exit: bool,
}

/// A persistent key-value store instance.
///
/// Created through [`Kvs::open`] or via
/// [`KvsBuilder`](crate::builder::KvsBuilder). Reads fall back to the
/// defaults document for keys that were never written. [`Kvs::flush`]
/// publishes the live map to disk, rotating the previous current version
/// into the snapshot ring; by default a terminal flush also runs on drop.
pub struct Kvs {
    instance_id: InstanceId,
    directory: PathBuf,
    /// `<directory>/kvs_<id>`; all file names derive from this.
    filename_prefix: PathBuf,
    inner: Mutex<KvsInner>,
    fs: Box<dyn Filesystem>,
    json: Box<dyn JsonCodec>,
}

impl std::fmt::Debug for Kvs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kvs")
            .field("instance_id", &self.instance_id)
            .field("directory", &self.directory)
            .field("filename_prefix", &self.filename_prefix)
            .finish_non_exhaustive()
    }
}

impl Kvs {
    /// Open a store instance in `dir`.
    ///
    /// The defaults document and the current document are loaded according
    /// to `need_defaults` / `need_kvs`. An empty `dir` is treated as the
    /// current working directory. Flush-on-exit starts enabled.
    pub fn open(
        instance_id: InstanceId,
        need_defaults: OpenNeed,
        need_kvs: OpenNeed,
        dir: impl Into<PathBuf>,
    ) -> Result<Self, KvsError> {
        Self::open_with(
            instance_id,
            need_defaults,
            need_kvs,
            dir,
            Box::new(StdFilesystem),
            Box::new(SerdeJsonCodec),
        )
    }

    /// Open with injected filesystem and JSON collaborators.
    pub fn open_with(
        instance_id: InstanceId,
        need_defaults: OpenNeed,
        need_kvs: OpenNeed,
        dir: impl Into<PathBuf>,
        fs: Box<dyn Filesystem>,
        json: Box<dyn JsonCodec>,
    ) -> Result<Self, KvsError> {
        let mut directory = dir.into();
        if directory.as_os_str().is_empty() {
            directory = PathBuf::from("./");
        }
        let filename_prefix = directory.join(format!("kvs_{instance_id}"));

        let default_values = Self::open_json(
            fs.as_ref(),
            json.as_ref(),
            &slot_base(&filename_prefix, "default"),
            need_defaults,
        )?;
        let kvs = Self::open_json(
            fs.as_ref(),
            json.as_ref(),
            &slot_base(&filename_prefix, "0"),
            need_kvs,
        )?;

        debug!(
            instance = %instance_id,
            dir = %directory.display(),
            keys = kvs.len(),
            defaults = default_values.len(),
            "opened KVS instance"
        );

        Ok(Self {
            instance_id,
            directory,
            filename_prefix,
            inner: Mutex::new(KvsInner {
                kvs,
                default_values,
                flush_on_exit: true,
            }),
            fs,
            json,
        })
    }

    /// Read and decode one document (`<base>.json` + `<base>.hash`).
    ///
    /// A missing document is an error only under `OpenNeed::Required`; a
    /// present document is always verified against its tag and parsed.
    fn open_json(
        fs: &dyn Filesystem,
        json: &dyn JsonCodec,
        base: &Path,
        need: OpenNeed,
    ) -> Result<KvsMap, KvsError> {
        let json_path = base.with_extension("json");
        let hash_path = base.with_extension("hash");

        let present = fs
            .exists(&json_path)
            .map_err(|_| KvsError::PhysicalStorageFailure)?;
        if !present {
            return match need {
                OpenNeed::Required => {
                    warn!(file = %json_path.display(), "required document missing");
                    Err(KvsError::KvsFileReadError)
                }
                OpenNeed::Optional => Ok(KvsMap::new()),
            };
        }

        let data = fs
            .read(&json_path)
            .map_err(|_| KvsError::KvsFileReadError)?;
        let tag = fs
            .read(&hash_path)
            .map_err(|_| KvsError::KvsHashFileReadError)?;
        if tag.len() != pkv_codec::TAG_LEN {
            return Err(KvsError::KvsHashFileReadError);
        }
        if !tag_matches(&data, &tag) {
            warn!(file = %json_path.display(), "integrity tag mismatch");
            return Err(KvsError::ValidationFailed);
        }

        let root = json.parse(&data).map_err(|_| KvsError::JsonParserError)?;
        let root = root.as_object().ok_or(KvsError::JsonParserError)?;
        decode_document(root)
    }

    fn lock(&self) -> Result<MutexGuard<'_, KvsInner>, KvsError> {
        // Covers both contention and poisoning; a blocked lock is reported,
        // never waited on.
        self.inner.try_lock().map_err(|_| KvsError::MutexLockFailed)
    }

    /// The instance id this store was opened with.
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// The directory holding this instance's files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    // -----------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------

    /// Read the value for `key`, falling back to its default when the key
    /// was never written.
    pub fn get_value(&self, key: &str) -> Result<KvsValue, KvsError> {
        let inner = self.lock()?;
        if let Some(value) = inner.kvs.get(key) {
            Ok(value.clone())
        } else if let Some(value) = inner.default_values.get(key) {
            Ok(value.clone())
        } else {
            Err(KvsError::KeyNotFound)
        }
    }

    /// Typed read: [`Kvs::get_value`] converted via `TryFrom<KvsValue>`.
    ///
    /// A value of a different variant fails with `ConversionFailed`.
    pub fn get_value_as<T>(&self, key: &str) -> Result<T, KvsError>
    where
        T: TryFrom<KvsValue, Error = KvsError>,
    {
        T::try_from(self.get_value(key)?)
    }

    /// Read the default value for `key`, ignoring any written value.
    pub fn get_default_value(&self, key: &str) -> Result<KvsValue, KvsError> {
        let inner = self.lock()?;
        inner
            .default_values
            .get(key)
            .cloned()
            .ok_or(KvsError::KeyNotFound)
    }

    /// Whether `key` has a default value.
    pub fn has_default_value(&self, key: &str) -> Result<bool, KvsError> {
        let inner = self.lock()?;
        Ok(inner.default_values.contains_key(key))
    }

    /// Whether a read of `key` would currently serve its default: `true`
    /// when the key is unwritten but has a default, `false` when written.
    /// `KeyNotFound` when the key exists in neither map.
    pub fn is_value_default(&self, key: &str) -> Result<bool, KvsError> {
        let inner = self.lock()?;
        if inner.kvs.contains_key(key) {
            Ok(false)
        } else if inner.default_values.contains_key(key) {
            Ok(true)
        } else {
            Err(KvsError::KeyNotFound)
        }
    }

    /// Whether `key` was explicitly written. Defaults do not count.
    pub fn key_exists(&self, key: &str) -> Result<bool, KvsError> {
        let inner = self.lock()?;
        Ok(inner.kvs.contains_key(key))
    }

    /// All explicitly written keys. Order is unspecified but stable
    /// between calls as long as the map is not mutated.
    pub fn get_all_keys(&self) -> Result<Vec<String>, KvsError> {
        let inner = self.lock()?;
        Ok(inner.kvs.keys().cloned().collect())
    }

    // -----------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------

    /// Insert or overwrite the value for `key`.
    ///
    /// Inserting a new key when the live map already holds
    /// [`KVS_MAX_KEYS`] entries fails with `QuotaExceeded`; overwriting is
    /// always allowed.
    pub fn set_value<K, V>(&self, key: K, value: V) -> Result<(), KvsError>
    where
        K: Into<String>,
        V: Into<KvsValue>,
    {
        let key = key.into();
        let mut inner = self.lock()?;
        if !inner.kvs.contains_key(&key) && inner.kvs.len() >= KVS_MAX_KEYS {
            return Err(KvsError::QuotaExceeded);
        }
        inner.kvs.insert(key, value.into());
        Ok(())
    }

    /// Remove `key` from the live map. `KeyNotFound` when absent.
    pub fn remove_key(&self, key: &str) -> Result<(), KvsError> {
        let mut inner = self.lock()?;
        if inner.kvs.remove(key).is_some() {
            Ok(())
        } else {
            Err(KvsError::KeyNotFound)
        }
    }

    /// Revert `key` to its default by removing any written value.
    ///
    /// Requires the key to have a default (`KeyDefaultNotFound`
    /// otherwise); idempotent when the key was never written.
    pub fn reset_key(&self, key: &str) -> Result<(), KvsError> {
        let mut inner = self.lock()?;
        if !inner.default_values.contains_key(key) {
            return Err(KvsError::KeyDefaultNotFound);
        }
        inner.kvs.remove(key);
        Ok(())
    }

    /// Clear the live map. Defaults are untouched.
    pub fn reset(&self) -> Result<(), KvsError> {
        let mut inner = self.lock()?;
        inner.kvs.clear();
        Ok(())
    }

    /// Control whether the terminal flush runs when the instance drops.
    pub fn set_flush_on_exit(&self, flush_on_exit: bool) -> Result<(), KvsError> {
        let mut inner = self.lock()?;
        inner.flush_on_exit = flush_on_exit;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Flush and snapshots
    // -----------------------------------------------------------------

    /// Publish the live map to the current document and its integrity
    /// tag, rotating any previous current version into the snapshot ring.
    pub fn flush(&self) -> Result<(), KvsError> {
        let inner = self.lock()?;
        self.flush_locked(&inner)
    }

    /// Flush body. Caller holds the instance lock.
    fn flush_locked(&self, inner: &KvsInner) -> Result<(), KvsError> {
        let current = self.json_path(0);
        if self
            .fs
            .exists(&current)
            .map_err(|_| KvsError::PhysicalStorageFailure)?
        {
            self.snapshot_rotate()?;
        }

        let root = encode_document(&inner.kvs)?;
        let data = self
            .json
            .generate(&root)
            .map_err(|_| KvsError::JsonGeneratorError)?;
        self.write_json_data(&data)?;

        debug!(instance = %self.instance_id, keys = inner.kvs.len(), "flushed KVS");
        Ok(())
    }

    /// Write the current document, then its tag. The tag goes last so a
    /// reader of a partially written state fails verification instead of
    /// seeing stale-but-valid data.
    fn write_json_data(&self, data: &[u8]) -> Result<(), KvsError> {
        self.fs
            .create_dir_all(&self.directory)
            .map_err(|_| KvsError::PhysicalStorageFailure)?;
        self.fs
            .write(&self.json_path(0), data)
            .map_err(|_| KvsError::PhysicalStorageFailure)?;
        self.fs
            .write(&self.hash_path(0), &tag_bytes(data))
            .map_err(|_| KvsError::PhysicalStorageFailure)?;
        Ok(())
    }

    /// Shift the snapshot ring one slot down and move the current version
    /// into slot 1. The oldest snapshot falls off the end of the ring.
    /// Caller holds the instance lock.
    fn snapshot_rotate(&self) -> Result<(), KvsError> {
        let count = self.probe_snapshot_count()?;

        for slot in (1..=count.min(KVS_MAX_SNAPSHOTS)).rev() {
            if slot + 1 > KVS_MAX_SNAPSHOTS {
                self.remove_slot_file(&self.json_path(slot))?;
                self.remove_slot_file(&self.hash_path(slot))?;
            } else {
                self.shift_slot_file(&self.json_path(slot), &self.json_path(slot + 1))?;
                self.shift_slot_file(&self.hash_path(slot), &self.hash_path(slot + 1))?;
            }
        }

        self.shift_slot_file(&self.json_path(0), &self.json_path(1))?;
        self.shift_slot_file(&self.hash_path(0), &self.hash_path(1))?;

        debug!(instance = %self.instance_id, snapshots = count, "rotated snapshots");
        Ok(())
    }

    fn shift_slot_file(&self, from: &Path, to: &Path) -> Result<(), KvsError> {
        let present = self
            .fs
            .exists(from)
            .map_err(|_| KvsError::PhysicalStorageFailure)?;
        if present {
            self.fs
                .rename(from, to)
                .map_err(|_| KvsError::PhysicalStorageFailure)?;
        }
        Ok(())
    }

    fn remove_slot_file(&self, path: &Path) -> Result<(), KvsError> {
        let present = self
            .fs
            .exists(path)
            .map_err(|_| KvsError::PhysicalStorageFailure)?;
        if present {
            self.fs
                .remove(path)
                .map_err(|_| KvsError::PhysicalStorageFailure)?;
        }
        Ok(())
    }

    /// The number of restorable snapshots currently on disk.
    pub fn snapshot_count(&self) -> Result<usize, KvsError> {
        let _inner = self.lock()?;
        self.probe_snapshot_count()
    }

    /// The largest populated snapshot slot, without taking the lock.
    fn probe_snapshot_count(&self) -> Result<usize, KvsError> {
        for slot in (1..=KVS_MAX_SNAPSHOTS).rev() {
            let present = self
                .fs
                .exists(&self.json_path(slot))
                .map_err(|_| KvsError::PhysicalStorageFailure)?;
            if present {
                return Ok(slot);
            }
        }
        Ok(0)
    }

    /// The maximum number of snapshots kept on disk.
    pub const fn snapshot_max_count() -> usize {
        KVS_MAX_SNAPSHOTS
    }

    /// Replace the live map with the content of snapshot `id`.
    ///
    /// Slot `0` (the current version) and empty slots are not restorable.
    /// Defaults are untouched.
    pub fn snapshot_restore(&self, id: SnapshotId) -> Result<(), KvsError> {
        let mut inner = self.lock()?;

        if id.is_current() {
            return Err(KvsError::InvalidSnapshotId);
        }
        if id.value() > self.probe_snapshot_count()? {
            return Err(KvsError::InvalidSnapshotId);
        }

        let map = Self::open_json(
            self.fs.as_ref(),
            self.json.as_ref(),
            &slot_base(&self.filename_prefix, &id.to_string()),
            OpenNeed::Required,
        )?;

        debug!(instance = %self.instance_id, snapshot = %id, keys = map.len(), "restored snapshot");
        inner.kvs = map;
        Ok(())
    }

    /// The document filename for snapshot `id`, if that file exists.
    pub fn get_kvs_filename(&self, id: SnapshotId) -> Result<PathBuf, KvsError> {
        let _inner = self.lock()?;
        self.existing_file(self.json_path(id.value()))
    }

    /// The integrity tag filename for snapshot `id`, if that file exists.
    pub fn get_hash_filename(&self, id: SnapshotId) -> Result<PathBuf, KvsError> {
        let _inner = self.lock()?;
        self.existing_file(self.hash_path(id.value()))
    }

    fn existing_file(&self, path: PathBuf) -> Result<PathBuf, KvsError> {
        let present = self
            .fs
            .exists(&path)
            .map_err(|_| KvsError::PhysicalStorageFailure)?;
        if present {
            Ok(path)
        } else {
            Err(KvsError::FileNotFound)
        }
    }

    fn json_path(&self, slot: usize) -> PathBuf {
        slot_base(&self.filename_prefix, &slot.to_string()).with_extension("json")
    }

    fn hash_path(&self, slot: usize) -> PathBuf {
        slot_base(&self.filename_prefix, &slot.to_string()).with_extension("hash")
    }
}

impl Drop for Kvs {
    fn drop(&mut self) {
        // Nowhere to report failures here; log and move on.
        let Ok(inner) = self.inner.try_lock() else {
            warn!(instance = %self.instance_id, "terminal flush skipped: lock unavailable");
            return;
        };
        if inner.flush_on_exit {
            if let Err(err) = self.flush_locked(&inner) {
                warn!(instance = %self.instance_id, error = %err, "terminal flush failed");
            }
        }
    }
}

/// `<prefix>_<slot>` as a path; extension is added by the caller.
fn slot_base(prefix: &Path, slot: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!("_{slot}"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn open_fresh(dir: &Path, id: u32) -> Kvs {
        Kvs::open(
            InstanceId::new(id),
            OpenNeed::Optional,
            OpenNeed::Optional,
            dir,
        )
        .unwrap()
    }

    /// Write `<dir>/<name>.json` with the given text and a matching tag.
    fn write_doc(dir: &Path, name: &str, text: &str) {
        fs::write(dir.join(format!("{name}.json")), text).unwrap();
        fs::write(dir.join(format!("{name}.hash")), tag_bytes(text.as_bytes())).unwrap();
    }

    #[test]
    fn defaults_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(
            dir.path(),
            "kvs_123_default",
            r#"{"default":{"t":"i32","v":5}}"#,
        );
        write_doc(dir.path(), "kvs_123_0", r#"{"kvs":{"t":"i32","v":2}}"#);

        let kvs = Kvs::open(
            InstanceId::new(123),
            OpenNeed::Required,
            OpenNeed::Required,
            dir.path(),
        )
        .unwrap();

        assert_eq!(kvs.get_value("kvs").unwrap(), KvsValue::I32(2));
        assert_eq!(kvs.get_value("default").unwrap(), KvsValue::I32(5));
        assert!(kvs.key_exists("kvs").unwrap());
        assert!(!kvs.key_exists("default").unwrap());
        assert!(kvs.has_default_value("default").unwrap());
        kvs.set_flush_on_exit(false).unwrap();
    }

    #[test]
    fn object_roundtrip_through_flush() {
        let dir = tempfile::tempdir().unwrap();
        let value = KvsValue::Object(KvsMap::from([
            ("flag".to_string(), KvsValue::Boolean(true)),
            ("count".to_string(), KvsValue::F64(42.0)),
        ]));

        {
            let kvs = open_fresh(dir.path(), 1);
            kvs.set_value("o", value.clone()).unwrap();
            kvs.flush().unwrap();
            kvs.set_flush_on_exit(false).unwrap();
        }

        let kvs = Kvs::open(
            InstanceId::new(1),
            OpenNeed::Optional,
            OpenNeed::Required,
            dir.path(),
        )
        .unwrap();
        assert_eq!(kvs.get_value("o").unwrap(), value);
        kvs.set_flush_on_exit(false).unwrap();
    }

    #[test]
    fn snapshot_rotation_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let kvs = open_fresh(dir.path(), 2);
        kvs.set_flush_on_exit(false).unwrap();

        for round in 0..KVS_MAX_SNAPSHOTS + 2 {
            kvs.set_value("round", round as i64).unwrap();
            kvs.flush().unwrap();
        }

        for slot in 0..=KVS_MAX_SNAPSHOTS {
            assert!(
                dir.path().join(format!("kvs_2_{slot}.json")).exists(),
                "slot {slot} should exist"
            );
            assert!(dir.path().join(format!("kvs_2_{slot}.hash")).exists());
        }
        let overflow = KVS_MAX_SNAPSHOTS + 1;
        assert!(!dir.path().join(format!("kvs_2_{overflow}.json")).exists());
        assert_eq!(kvs.snapshot_count().unwrap(), KVS_MAX_SNAPSHOTS);
    }

    #[test]
    fn snapshot_count_tracks_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let kvs = open_fresh(dir.path(), 3);
        kvs.set_flush_on_exit(false).unwrap();

        assert_eq!(kvs.snapshot_count().unwrap(), 0);
        for flushes in 1..=KVS_MAX_SNAPSHOTS + 2 {
            kvs.flush().unwrap();
            assert_eq!(
                kvs.snapshot_count().unwrap(),
                (flushes - 1).min(KVS_MAX_SNAPSHOTS)
            );
        }
    }

    #[test]
    fn snapshot_restore_recovers_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let kvs = open_fresh(dir.path(), 4);
        kvs.set_flush_on_exit(false).unwrap();

        kvs.set_value("counter", 1i32).unwrap();
        kvs.flush().unwrap();
        kvs.set_value("counter", 2i32).unwrap();
        kvs.flush().unwrap();

        // Slot 1 holds the state at the first flush.
        kvs.snapshot_restore(SnapshotId::new(1)).unwrap();
        assert_eq!(kvs.get_value("counter").unwrap(), KvsValue::I32(1));
    }

    #[test]
    fn snapshot_restore_rejects_invalid_ids() {
        let dir = tempfile::tempdir().unwrap();
        let kvs = open_fresh(dir.path(), 5);
        kvs.set_flush_on_exit(false).unwrap();
        kvs.flush().unwrap();

        assert_eq!(
            kvs.snapshot_restore(SnapshotId::new(0)).unwrap_err(),
            KvsError::InvalidSnapshotId
        );
        assert_eq!(
            kvs.snapshot_restore(SnapshotId::new(1)).unwrap_err(),
            KvsError::InvalidSnapshotId
        );
        assert_eq!(
            kvs.snapshot_restore(SnapshotId::new(KVS_MAX_SNAPSHOTS + 1))
                .unwrap_err(),
            KvsError::InvalidSnapshotId
        );
    }

    #[test]
    fn restore_leaves_defaults_untouched() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(
            dir.path(),
            "kvs_6_default",
            r#"{"limit":{"t":"u32","v":10}}"#,
        );

        let kvs = Kvs::open(
            InstanceId::new(6),
            OpenNeed::Required,
            OpenNeed::Optional,
            dir.path(),
        )
        .unwrap();
        kvs.set_flush_on_exit(false).unwrap();

        kvs.flush().unwrap();
        kvs.set_value("limit", 99u32).unwrap();
        kvs.flush().unwrap();
        kvs.snapshot_restore(SnapshotId::new(1)).unwrap();

        assert_eq!(kvs.get_value("limit").unwrap(), KvsValue::U32(10));
        assert_eq!(kvs.get_default_value("limit").unwrap(), KvsValue::U32(10));
    }

    #[test]
    fn corrupt_hash_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "kvs_7_0", r#"{"k":{"t":"bool","v":true}}"#);

        let hash_path = dir.path().join("kvs_7_0.hash");
        let mut tag = fs::read(&hash_path).unwrap();
        tag[1] ^= 0x40;
        fs::write(&hash_path, tag).unwrap();

        let err = Kvs::open(
            InstanceId::new(7),
            OpenNeed::Optional,
            OpenNeed::Optional,
            dir.path(),
        )
        .unwrap_err();
        assert_eq!(err, KvsError::ValidationFailed);
    }

    #[test]
    fn missing_hash_fails_even_when_optional() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "kvs_8_0", "{}");
        fs::remove_file(dir.path().join("kvs_8_0.hash")).unwrap();

        let err = Kvs::open(
            InstanceId::new(8),
            OpenNeed::Optional,
            OpenNeed::Optional,
            dir.path(),
        )
        .unwrap_err();
        assert_eq!(err, KvsError::KvsHashFileReadError);
    }

    #[test]
    fn short_hash_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "kvs_9_0", "{}");
        fs::write(dir.path().join("kvs_9_0.hash"), [0x01, 0x02]).unwrap();

        let err = Kvs::open(
            InstanceId::new(9),
            OpenNeed::Optional,
            OpenNeed::Optional,
            dir.path(),
        )
        .unwrap_err();
        assert_eq!(err, KvsError::KvsHashFileReadError);
    }

    #[test]
    fn missing_document_required_vs_optional() {
        let dir = tempfile::tempdir().unwrap();

        let err = Kvs::open(
            InstanceId::new(10),
            OpenNeed::Optional,
            OpenNeed::Required,
            dir.path(),
        )
        .unwrap_err();
        assert_eq!(err, KvsError::KvsFileReadError);

        let kvs = open_fresh(dir.path(), 10);
        assert!(kvs.get_all_keys().unwrap().is_empty());
        kvs.set_flush_on_exit(false).unwrap();
    }

    #[test]
    fn empty_document_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "kvs_11_0", "{}");

        let kvs = Kvs::open(
            InstanceId::new(11),
            OpenNeed::Optional,
            OpenNeed::Required,
            dir.path(),
        )
        .unwrap();
        assert!(kvs.get_all_keys().unwrap().is_empty());
        kvs.set_flush_on_exit(false).unwrap();
    }

    #[test]
    fn non_object_root_is_a_parser_error() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "kvs_12_0", "[1, 2, 3]");

        let err = Kvs::open(
            InstanceId::new(12),
            OpenNeed::Optional,
            OpenNeed::Optional,
            dir.path(),
        )
        .unwrap_err();
        assert_eq!(err, KvsError::JsonParserError);
    }

    #[test]
    fn malformed_value_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "kvs_13_0", r#"{"k":{"t":"i32","v":5.5}}"#);

        let err = Kvs::open(
            InstanceId::new(13),
            OpenNeed::Optional,
            OpenNeed::Optional,
            dir.path(),
        )
        .unwrap_err();
        assert_eq!(err, KvsError::InvalidValueType);
    }

    #[test]
    fn set_get_remove_laws() {
        let dir = tempfile::tempdir().unwrap();
        let kvs = open_fresh(dir.path(), 14);
        kvs.set_flush_on_exit(false).unwrap();

        kvs.set_value("k", "value").unwrap();
        assert_eq!(
            kvs.get_value("k").unwrap(),
            KvsValue::String("value".into())
        );

        kvs.remove_key("k").unwrap();
        assert!(!kvs.key_exists("k").unwrap());
        assert_eq!(kvs.remove_key("k").unwrap_err(), KvsError::KeyNotFound);

        kvs.set_value("a", 1i32).unwrap();
        kvs.set_value("b", 2i32).unwrap();
        kvs.reset().unwrap();
        kvs.reset().unwrap();
        assert!(kvs.get_all_keys().unwrap().is_empty());
    }

    #[test]
    fn reset_key_requires_a_default() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(
            dir.path(),
            "kvs_15_default",
            r#"{"retries":{"t":"u32","v":3}}"#,
        );

        let kvs = Kvs::open(
            InstanceId::new(15),
            OpenNeed::Required,
            OpenNeed::Optional,
            dir.path(),
        )
        .unwrap();
        kvs.set_flush_on_exit(false).unwrap();

        kvs.set_value("retries", 7u32).unwrap();
        assert!(!kvs.is_value_default("retries").unwrap());

        kvs.reset_key("retries").unwrap();
        assert!(kvs.is_value_default("retries").unwrap());
        assert_eq!(kvs.get_value("retries").unwrap(), KvsValue::U32(3));

        // Idempotent when the key is already unwritten.
        kvs.reset_key("retries").unwrap();
        assert!(kvs.is_value_default("retries").unwrap());

        assert_eq!(
            kvs.reset_key("unknown").unwrap_err(),
            KvsError::KeyDefaultNotFound
        );
    }

    #[test]
    fn is_value_default_without_default_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let kvs = open_fresh(dir.path(), 16);
        kvs.set_flush_on_exit(false).unwrap();

        assert_eq!(
            kvs.is_value_default("absent").unwrap_err(),
            KvsError::KeyNotFound
        );
    }

    #[test]
    fn typed_reads() {
        let dir = tempfile::tempdir().unwrap();
        let kvs = open_fresh(dir.path(), 17);
        kvs.set_flush_on_exit(false).unwrap();

        kvs.set_value("n", 123i32).unwrap();
        kvs.set_value("s", "text").unwrap();

        let n: i32 = kvs.get_value_as("n").unwrap();
        assert_eq!(n, 123);
        let s: String = kvs.get_value_as("s").unwrap();
        assert_eq!(s, "text");

        assert_eq!(
            kvs.get_value_as::<bool>("n").unwrap_err(),
            KvsError::ConversionFailed
        );
        assert_eq!(
            kvs.get_value_as::<i32>("absent").unwrap_err(),
            KvsError::KeyNotFound
        );
    }

    #[test]
    fn quota_bounds_new_keys_only() {
        let dir = tempfile::tempdir().unwrap();
        let kvs = open_fresh(dir.path(), 18);
        kvs.set_flush_on_exit(false).unwrap();

        for i in 0..KVS_MAX_KEYS {
            kvs.set_value(format!("key{i}"), i as u64).unwrap();
        }
        assert_eq!(
            kvs.set_value("one-too-many", 0u64).unwrap_err(),
            KvsError::QuotaExceeded
        );

        // Overwriting stays legal at capacity.
        kvs.set_value("key0", 42u64).unwrap();
        assert_eq!(kvs.get_value("key0").unwrap(), KvsValue::U64(42));

        kvs.remove_key("key1").unwrap();
        kvs.set_value("replacement", 1u64).unwrap();
    }

    #[test]
    fn contended_lock_reports_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let kvs = open_fresh(dir.path(), 19);

        let guard = kvs.inner.try_lock().unwrap();
        assert_eq!(kvs.get_value("k").unwrap_err(), KvsError::MutexLockFailed);
        assert_eq!(
            kvs.set_value("k", 1i32).unwrap_err(),
            KvsError::MutexLockFailed
        );
        assert_eq!(kvs.flush().unwrap_err(), KvsError::MutexLockFailed);
        assert_eq!(
            kvs.snapshot_count().unwrap_err(),
            KvsError::MutexLockFailed
        );
        assert_eq!(
            kvs.set_flush_on_exit(false).unwrap_err(),
            KvsError::MutexLockFailed
        );
        drop(guard);

        // State unchanged and usable again.
        assert!(!kvs.key_exists("k").unwrap());
        kvs.set_flush_on_exit(false).unwrap();
    }

    #[test]
    fn flush_writes_matching_tag() {
        let dir = tempfile::tempdir().unwrap();
        let kvs = open_fresh(dir.path(), 20);
        kvs.set_flush_on_exit(false).unwrap();

        kvs.set_value("k", 1i64).unwrap();
        kvs.flush().unwrap();

        let data = fs::read(dir.path().join("kvs_20_0.json")).unwrap();
        let tag = fs::read(dir.path().join("kvs_20_0.hash")).unwrap();
        assert_eq!(tag, tag_bytes(&data));
    }

    #[test]
    fn flush_does_not_persist_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(
            dir.path(),
            "kvs_21_default",
            r#"{"mode":{"t":"str","v":"eco"}}"#,
        );

        let kvs = Kvs::open(
            InstanceId::new(21),
            OpenNeed::Required,
            OpenNeed::Optional,
            dir.path(),
        )
        .unwrap();
        kvs.set_flush_on_exit(false).unwrap();
        kvs.flush().unwrap();

        let data = fs::read(dir.path().join("kvs_21_0.json")).unwrap();
        let root: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert!(root.as_object().unwrap().is_empty());
    }

    #[test]
    fn terminal_flush_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let kvs = open_fresh(dir.path(), 22);
            kvs.set_value("persisted", true).unwrap();
        }
        let kvs = Kvs::open(
            InstanceId::new(22),
            OpenNeed::Optional,
            OpenNeed::Required,
            dir.path(),
        )
        .unwrap();
        assert_eq!(kvs.get_value("persisted").unwrap(), KvsValue::Boolean(true));
        kvs.set_flush_on_exit(false).unwrap();
    }

    #[test]
    fn terminal_flush_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        {
            let kvs = open_fresh(dir.path(), 23);
            kvs.set_value("ephemeral", true).unwrap();
            kvs.set_flush_on_exit(false).unwrap();
        }
        assert!(!dir.path().join("kvs_23_0.json").exists());
    }

    #[test]
    fn filename_queries_require_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let kvs = open_fresh(dir.path(), 24);
        kvs.set_flush_on_exit(false).unwrap();

        assert_eq!(
            kvs.get_kvs_filename(SnapshotId::new(0)).unwrap_err(),
            KvsError::FileNotFound
        );

        kvs.flush().unwrap();
        let path = kvs.get_kvs_filename(SnapshotId::new(0)).unwrap();
        assert_eq!(path, dir.path().join("kvs_24_0.json"));
        let path = kvs.get_hash_filename(SnapshotId::new(0)).unwrap();
        assert_eq!(path, dir.path().join("kvs_24_0.hash"));

        assert_eq!(
            kvs.get_kvs_filename(SnapshotId::new(1)).unwrap_err(),
            KvsError::FileNotFound
        );
    }

    #[test]
    fn instances_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let a = open_fresh(dir.path(), 25);
        let b = open_fresh(dir.path(), 26);
        a.set_flush_on_exit(false).unwrap();
        b.set_flush_on_exit(false).unwrap();

        a.set_value("shared-name", 1i32).unwrap();
        b.set_value("shared-name", 2i32).unwrap();
        a.flush().unwrap();
        b.flush().unwrap();

        assert_eq!(a.get_value("shared-name").unwrap(), KvsValue::I32(1));
        assert_eq!(b.get_value("shared-name").unwrap(), KvsValue::I32(2));
        assert!(dir.path().join("kvs_25_0.json").exists());
        assert!(dir.path().join("kvs_26_0.json").exists());
    }

    #[test]
    fn snapshot_max_count_is_fixed() {
        assert_eq!(Kvs::snapshot_max_count(), KVS_MAX_SNAPSHOTS);
    }
}
