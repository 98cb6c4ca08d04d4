//! Version catalog: what exists on disk, reconciled with stored attributes.
//!
//! Groups are keyed by flipbook name in order of first sighting; within a
//! group versions are kept in ascending order. Every refresh re-probes the
//! frame ranges of all visible versions and persists the metadata documents,
//! whether or not anything changed.

use indexmap::IndexMap;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use super::sequence::{self, INVALID_SEQUENCE, SequenceInfo};
use super::store::MetadataStore;
use crate::entities::{ShotLayout, VersionAttrs, VersionKey, VersionRecord, validate_name};
use crate::error::{FlipbookError, Result};

/// Result of one refresh: versions that appeared and disappeared on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogDelta {
    pub added: Vec<VersionRecord>,
    pub removed: Vec<VersionKey>,
    /// Sequence or store failures hit during the refresh; each is also logged.
    pub failures: Vec<String>,
}

impl CatalogDelta {
    /// True when no version appeared or disappeared.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub struct VersionCatalog {
    layout: ShotLayout,
    groups: IndexMap<String, Vec<VersionRecord>>,
    stores: HashMap<String, MetadataStore>,
    sequences: HashMap<VersionKey, SequenceInfo>,
}

impl VersionCatalog {
    pub fn new(layout: ShotLayout) -> Self {
        Self {
            layout,
            groups: IndexMap::new(),
            stores: HashMap::new(),
            sequences: HashMap::new(),
        }
    }

    pub fn layout(&self) -> &ShotLayout {
        &self.layout
    }

    /// Groups in display order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[VersionRecord])> {
        self.groups.iter().map(|(name, v)| (name.as_str(), v.as_slice()))
    }

    pub fn group(&self, name: &str) -> Option<&[VersionRecord]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    pub fn records(&self) -> impl Iterator<Item = &VersionRecord> {
        self.groups.values().flatten()
    }

    pub fn get(&self, key: &VersionKey) -> Option<&VersionRecord> {
        self.groups.get(&key.name)?.iter().find(|r| r.key == *key)
    }

    pub fn sequence(&self, key: &VersionKey) -> Option<&SequenceInfo> {
        self.sequences.get(key)
    }

    /// Range column text; the invalid-sequence sentinel when no frames exist.
    pub fn range_display(&self, key: &VersionKey) -> String {
        match self.sequences.get(key) {
            Some(seq) => seq.range_display(),
            None => INVALID_SEQUENCE.to_string(),
        }
    }

    /// `max(version) + 1` for `name`, or 1.
    pub fn next_version(&self, name: &str) -> u32 {
        self.groups
            .get(name)
            .and_then(|v| v.iter().map(|r| r.key.version).max())
            .map_or(1, |max| max + 1)
    }

    /// Version directories currently on disk, in path order.
    pub fn scan_disk(&self) -> Vec<VersionKey> {
        let root = glob::Pattern::escape(&self.layout.root().to_string_lossy());
        let pattern = format!("{}/*/*_v*", root.trim_end_matches('/'));
        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot scan {}: {}", pattern, e);
                return Vec::new();
            }
        };
        let mut dirs: Vec<PathBuf> = entries.filter_map(|e| e.ok()).filter(|p| p.is_dir()).collect();
        dirs.sort();
        dirs.iter()
            .filter_map(|d| self.layout.parse_version_dir(d))
            .collect()
    }

    /// Reconcile with disk and return what changed.
    ///
    /// A failure on one version or one document does not stop the rest;
    /// it is recorded in [`CatalogDelta::failures`].
    pub fn refresh(&mut self) -> Result<CatalogDelta> {
        let on_disk = self.scan_disk();
        let disk_set: HashSet<&VersionKey> = on_disk.iter().collect();

        let mut delta = CatalogDelta::default();

        for records in self.groups.values_mut() {
            records.retain(|r| {
                let keep = disk_set.contains(&r.key);
                if !keep {
                    delta.removed.push(r.key.clone());
                }
                keep
            });
        }
        self.groups.retain(|_, records| !records.is_empty());
        for key in &delta.removed {
            self.sequences.remove(key);
            debug!("Version gone from disk: {}", key);
        }

        for key in &on_disk {
            if self.get(key).is_some() {
                continue;
            }
            let dir = self.layout.version_dir(key);
            let store = store_for(&mut self.stores, &self.layout, &key.name);
            store.migrate_legacy_comment(key, &dir);
            let record = VersionRecord {
                key: key.clone(),
                path: self.layout.frame_pattern(key),
                dir,
                attrs: store.get(key),
            };
            insert_sorted(&mut self.groups, record.clone());
            delta.added.push(record);
        }

        delta.failures = self.reprobe_all();

        if !delta.is_empty() {
            info!(
                "Catalog refresh: +{} -{} ({} versions)",
                delta.added.len(),
                delta.removed.len(),
                self.records().count()
            );
        }
        Ok(delta)
    }

    fn reprobe_all(&mut self) -> Vec<String> {
        let Self {
            layout,
            groups,
            stores,
            sequences,
        } = self;

        let mut failures = Vec::new();
        for (name, records) in groups.iter_mut() {
            let store = store_for(stores, layout, name);
            for record in records.iter_mut() {
                match sequence::probe(layout, &record.path) {
                    Ok(seq) => {
                        seq.apply_to(&mut record.attrs);
                        sequences.insert(record.key.clone(), seq);
                    }
                    Err(FlipbookError::NotFound(_)) => {
                        record.attrs.range_display = None;
                        sequences.remove(&record.key);
                    }
                    Err(e) => {
                        warn!("Probe of {} failed: {}", record.key, e);
                        failures.push(format!("{}: {}", record.key, e));
                        sequences.remove(&record.key);
                    }
                }
                store.stage(&record.key, record.attrs.clone());
            }
            if let Err(e) = store.persist() {
                warn!("Cannot save metadata for {}: {}", name, e);
                failures.push(e.to_string());
            }
        }
        failures
    }

    /// Reserve the next version slot for `name`.
    ///
    /// The version directory must not exist yet: a concurrent create of the
    /// same slot fails with [`FlipbookError::VersionExists`].
    pub fn create(
        &mut self,
        name: &str,
        frame_range: (i64, i64),
        comment: Option<String>,
    ) -> Result<VersionRecord> {
        validate_name(name)?;
        let (first, last) = frame_range;
        if first < 1 || last < 1 || first > last {
            return Err(FlipbookError::UserInput("Incorrect flipbook ranges!".into()));
        }

        let key = VersionKey::new(name, self.next_version(name));
        let dir = self.layout.version_dir(&key);
        let name_dir = self.layout.name_dir(name);
        fs::create_dir_all(&name_dir).map_err(|e| FlipbookError::io("create", &name_dir, e))?;
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(FlipbookError::VersionExists(key.to_string()));
            }
            Err(e) => return Err(FlipbookError::io("create", &dir, e)),
        }

        let mut attrs = VersionAttrs::with_comment(comment);
        attrs.first_frame = Some(first);
        attrs.last_frame = Some(last);

        let store = store_for(&mut self.stores, &self.layout, name);
        store.put(&key, attrs.clone())?;

        let record = VersionRecord {
            path: self.layout.frame_pattern(&key),
            key,
            dir,
            attrs,
        };
        insert_sorted(&mut self.groups, record.clone());
        info!("Reserved {} ({}-{})", record.key, first, last);
        Ok(record)
    }

    /// Remove a version's directory and metadata. Published versions are refused.
    pub fn delete(&mut self, key: &VersionKey) -> Result<()> {
        let record = self
            .get(key)
            .ok_or_else(|| FlipbookError::UnknownVersion(key.to_string()))?;
        if record.is_published() {
            warn!("Refusing to delete published version {}", key);
            return Err(FlipbookError::PublishedVersion(key.to_string()));
        }

        let dir = record.dir.clone();
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(FlipbookError::io("remove", &dir, e)),
        }
        store_for(&mut self.stores, &self.layout, &key.name).remove(key)?;

        if let Some(records) = self.groups.get_mut(&key.name) {
            records.retain(|r| r.key != *key);
            if records.is_empty() {
                self.groups.shift_remove(&key.name);
            }
        }
        self.sequences.remove(key);
        info!("Deleted {}", key);
        Ok(())
    }

    /// Mutate a version's attributes and persist them.
    pub fn update_attrs(
        &mut self,
        key: &VersionKey,
        f: impl FnOnce(&mut VersionAttrs),
    ) -> Result<&VersionRecord> {
        let record = self
            .groups
            .get_mut(&key.name)
            .and_then(|v| v.iter_mut().find(|r| r.key == *key))
            .ok_or_else(|| FlipbookError::UnknownVersion(key.to_string()))?;
        f(&mut record.attrs);
        store_for(&mut self.stores, &self.layout, &key.name).put(key, record.attrs.clone())?;
        Ok(record)
    }

    pub fn set_comment(&mut self, key: &VersionKey, comment: &str) -> Result<()> {
        let comment = comment.trim();
        self.update_attrs(key, |a| {
            a.comment = (!comment.is_empty()).then(|| comment.to_string());
        })?;
        Ok(())
    }

    pub fn set_thumbnail(&mut self, key: &VersionKey, bytes: Vec<u8>) -> Result<()> {
        self.update_attrs(key, |a| a.thumbnail = Some(bytes))?;
        Ok(())
    }

    pub fn mark_published(&mut self, key: &VersionKey) -> Result<()> {
        self.update_attrs(key, |a| a.publish = true)?;
        Ok(())
    }
}

fn store_for<'a>(
    stores: &'a mut HashMap<String, MetadataStore>,
    layout: &ShotLayout,
    name: &str,
) -> &'a mut MetadataStore {
    stores
        .entry(name.to_string())
        .or_insert_with(|| MetadataStore::open(layout.data_file(name)))
}

fn insert_sorted(groups: &mut IndexMap<String, Vec<VersionRecord>>, record: VersionRecord) {
    let records = groups.entry(record.key.name.clone()).or_default();
    let pos = records.partition_point(|r| r.key.version < record.key.version);
    records.insert(pos, record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog(tmp: &TempDir) -> VersionCatalog {
        VersionCatalog::new(ShotLayout::new(tmp.path(), "$F4", "exr"))
    }

    fn write_frames(catalog: &VersionCatalog, key: &VersionKey, frames: std::ops::RangeInclusive<i64>) {
        let pattern = catalog.layout().frame_pattern(key);
        for f in frames {
            let path = catalog.layout().frame_path(&pattern, f);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"px").unwrap();
        }
    }

    #[test]
    fn test_versions_are_contiguous() {
        let tmp = TempDir::new().unwrap();
        let mut cat = catalog(&tmp);
        for n in 1..=4 {
            assert_eq!(cat.next_version("turnaround"), n);
            let rec = cat.create("turnaround", (1, 10), None).unwrap();
            assert_eq!(rec.version(), n);
        }
        assert_eq!(cat.next_version("other"), 1);
    }

    #[test]
    fn test_create_records_initial_attrs() {
        let tmp = TempDir::new().unwrap();
        let mut cat = catalog(&tmp);
        let rec = cat.create("anim", (1001, 1010), Some("blocking".into())).unwrap();
        assert!(rec.dir.is_dir());
        assert_eq!(rec.attrs.comment.as_deref(), Some("blocking"));
        assert!(!rec.attrs.publish);

        let store = MetadataStore::open(cat.layout().data_file("anim"));
        assert_eq!(store.get(&rec.key), rec.attrs);
    }

    #[test]
    fn test_create_rejects_existing_slot() {
        let tmp = TempDir::new().unwrap();
        let mut cat = catalog(&tmp);
        // another writer took v001 before we refreshed
        fs::create_dir_all(tmp.path().join("anim").join("anim_v001")).unwrap();
        let err = cat.create("anim", (1, 2), None).unwrap_err();
        assert!(matches!(err, FlipbookError::VersionExists(_)));
    }

    #[test]
    fn test_create_validates_input() {
        let tmp = TempDir::new().unwrap();
        let mut cat = catalog(&tmp);
        assert!(matches!(
            cat.create("bad name", (1, 2), None),
            Err(FlipbookError::UserInput(_))
        ));
        assert!(matches!(
            cat.create("anim", (10, 2), None),
            Err(FlipbookError::UserInput(_))
        ));
        assert!(matches!(
            cat.create("anim", (0, 2), None),
            Err(FlipbookError::UserInput(_))
        ));
        assert!(!tmp.path().join("anim").exists());
    }

    #[test]
    fn test_refresh_adds_and_removes() {
        let tmp = TempDir::new().unwrap();
        let mut writer = catalog(&tmp);
        let a1 = writer.create("a", (1, 3), None).unwrap().key;
        let b1 = writer.create("b", (1, 3), None).unwrap().key;
        let a2 = writer.create("a", (1, 3), None).unwrap().key;
        write_frames(&writer, &a1, 1..=3);

        let mut cat = catalog(&tmp);
        let delta = cat.refresh().unwrap();
        assert_eq!(delta.added.len(), 3);
        assert!(delta.removed.is_empty());

        let names: Vec<&str> = cat.groups().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        let a_versions: Vec<u32> = cat.group("a").unwrap().iter().map(|r| r.version()).collect();
        assert_eq!(a_versions, vec![1, 2]);
        assert_eq!(cat.range_display(&a1), "1-3");
        assert_eq!(cat.range_display(&a2), INVALID_SEQUENCE);

        // idempotent
        assert!(cat.refresh().unwrap().is_empty());

        fs::remove_dir_all(tmp.path().join("b").join("b_v001")).unwrap();
        let delta = cat.refresh().unwrap();
        assert_eq!(delta.removed, vec![b1]);
        assert!(cat.group("b").is_none());
    }

    #[test]
    fn test_non_canonical_version_dir_ignored() {
        let tmp = TempDir::new().unwrap();
        let mut cat = catalog(&tmp);
        fs::create_dir_all(tmp.path().join("anim").join("anim_v0001")).unwrap();

        assert!(cat.refresh().unwrap().added.is_empty());
        assert_eq!(cat.next_version("anim"), 1);

        // the real slot can still be created and deleted
        let key = cat.create("anim", (1, 2), None).unwrap().key;
        cat.delete(&key).unwrap();
        assert!(!cat.layout().version_dir(&key).exists());
        assert!(cat.refresh().unwrap().added.is_empty());
        assert!(tmp.path().join("anim").join("anim_v0001").is_dir());
    }

    #[test]
    fn test_store_failure_keeps_delta() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a").join("a_v001")).unwrap();
        fs::create_dir_all(tmp.path().join("b").join("b_v001")).unwrap();
        let mut cat = catalog(&tmp);
        assert!(cat.refresh().unwrap().failures.is_empty());

        // a directory where the document should be: every save of "a" fails
        let data = cat.layout().data_file("a");
        fs::remove_file(&data).unwrap();
        fs::create_dir(&data).unwrap();
        fs::remove_dir_all(tmp.path().join("b").join("b_v001")).unwrap();

        let delta = cat.refresh().unwrap();
        assert_eq!(delta.removed, vec![VersionKey::new("b", 1)]);
        assert_eq!(delta.failures.len(), 1);
        assert!(cat.get(&VersionKey::new("a", 1)).is_some());
    }

    #[test]
    fn test_refresh_persists_ranges_and_keeps_attrs() {
        let tmp = TempDir::new().unwrap();
        let mut cat = catalog(&tmp);
        let key = cat.create("a", (5, 8), Some("note".into())).unwrap().key;
        write_frames(&cat, &key, 5..=8);
        cat.refresh().unwrap();

        let store = MetadataStore::open(cat.layout().data_file("a"));
        let attrs = store.get(&key);
        assert_eq!(attrs.range_display.as_deref(), Some("5-8"));
        assert_eq!(attrs.comment.as_deref(), Some("note"));
    }

    #[test]
    fn test_delete_last_version_drops_group() {
        let tmp = TempDir::new().unwrap();
        let mut cat = catalog(&tmp);
        let k1 = cat.create("a", (1, 2), None).unwrap().key;
        let k2 = cat.create("a", (1, 2), None).unwrap().key;

        cat.delete(&k1).unwrap();
        assert!(!cat.layout().version_dir(&k1).exists());
        assert_eq!(cat.group("a").unwrap().len(), 1);

        cat.delete(&k2).unwrap();
        assert!(cat.group("a").is_none());
        assert!(MetadataStore::open(cat.layout().data_file("a")).is_empty());
    }

    #[test]
    fn test_delete_published_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut cat = catalog(&tmp);
        let key = cat.create("a", (1, 2), Some("c".into())).unwrap().key;
        write_frames(&cat, &key, 1..=2);
        cat.mark_published(&key).unwrap();

        let data_before = fs::read_to_string(cat.layout().data_file("a")).unwrap();
        let err = cat.delete(&key).unwrap_err();
        assert!(matches!(err, FlipbookError::PublishedVersion(_)));
        assert!(cat.layout().version_dir(&key).is_dir());
        assert!(cat.get(&key).is_some());
        assert_eq!(fs::read_to_string(cat.layout().data_file("a")).unwrap(), data_before);
    }

    #[test]
    fn test_comment_and_thumbnail_persist() {
        let tmp = TempDir::new().unwrap();
        let mut cat = catalog(&tmp);
        let key = cat.create("a", (1, 2), None).unwrap().key;
        cat.set_comment(&key, "  retime  ").unwrap();
        cat.set_thumbnail(&key, vec![1, 2, 3]).unwrap();

        let mut fresh = catalog(&tmp);
        fresh.refresh().unwrap();
        let rec = fresh.get(&key).unwrap();
        assert_eq!(rec.attrs.comment.as_deref(), Some("retime"));
        assert_eq!(rec.attrs.thumbnail.as_deref(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_unknown_version() {
        let tmp = TempDir::new().unwrap();
        let mut cat = catalog(&tmp);
        let err = cat.delete(&VersionKey::new("x", 1)).unwrap_err();
        assert!(matches!(err, FlipbookError::UnknownVersion(_)));
    }
}
