use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::GeoCandidate;
use crate::db;

/// Geocoder answers keyed by the exact city string that was looked up.
///
/// Entries are write-once: the first answer for a key is kept for good, no
/// matter which region it was later ranked against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LookupCache {
    entries: HashMap<String, Vec<GeoCandidate>>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, city: &str) -> Option<&[GeoCandidate]> {
        self.entries.get(city).map(Vec::as_slice)
    }

    pub fn contains(&self, city: &str) -> bool {
        self.entries.contains_key(city)
    }

    /// Returns false (and drops `candidates`) when `city` is already cached.
    pub fn insert_if_absent(&mut self, city: &str, candidates: Vec<GeoCandidate>) -> bool {
        if self.entries.contains_key(city) {
            return false;
        }
        self.entries.insert(city.to_string(), candidates);
        true
    }

    /// Add every entry of `other` whose key is not cached yet.
    pub fn merge(&mut self, other: LookupCache) -> usize {
        let mut added = 0;
        for (city, candidates) in other.entries {
            if self.insert_if_absent(&city, candidates) {
                added += 1;
            }
        }
        added
    }

    /// Forget lookups that found nothing so the next run asks again.
    pub fn prune_empty(&mut self) -> Vec<String> {
        let empty: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, candidates)| candidates.is_empty())
            .map(|(city, _)| city.clone())
            .collect();
        for city in &empty {
            self.entries.remove(city);
        }
        empty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[GeoCandidate])> {
        self.entries
            .iter()
            .map(|(city, candidates)| (city.as_str(), candidates.as_slice()))
    }
}

/// Somewhere a `LookupCache` outlives the process.
pub trait CacheStore {
    fn load(&self) -> Result<LookupCache>;
    fn save(&self, cache: &LookupCache) -> Result<()>;
}

/// Cache rows in the working database (`geo_cache` table).
pub struct SqliteCacheStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteCacheStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Delete the rows for lookups that found nothing. Returns the removed keys.
    pub fn prune_empty(&self) -> Result<Vec<String>> {
        let mut cache = self.load()?;
        let removed = cache.prune_empty();
        db::delete_geo_cache_keys(self.conn, &removed)?;
        Ok(removed)
    }
}

impl CacheStore for SqliteCacheStore<'_> {
    fn load(&self) -> Result<LookupCache> {
        let mut cache = LookupCache::new();
        for (city, payload) in db::load_geo_cache(self.conn)? {
            let candidates: Vec<GeoCandidate> = serde_json::from_str(&payload)
                .with_context(|| format!("Corrupt geo_cache entry for {:?}", city))?;
            cache.insert_if_absent(&city, candidates);
        }
        Ok(cache)
    }

    fn save(&self, cache: &LookupCache) -> Result<()> {
        let rows = cache
            .iter()
            .map(|(city, candidates)| -> Result<(String, String)> {
                Ok((city.to_string(), serde_json::to_string(candidates)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let inserted = db::save_geo_cache(self.conn, &rows)?;
        info!("Location cache size: {} ({} new)", cache.len(), inserted);
        Ok(())
    }
}

/// Whole cache as one JSON object, for moving it between databases.
pub struct JsonCacheFile {
    path: PathBuf,
}

impl JsonCacheFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CacheStore for JsonCacheFile {
    fn load(&self) -> Result<LookupCache> {
        if !self.path.exists() {
            return Ok(LookupCache::new());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {:?}", self.path))
    }

    fn save(&self, cache: &LookupCache) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string(cache)?)
            .with_context(|| format!("Failed to write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {:?}", self.path))?;
        info!("Location cache size: {}", cache.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::PlaceKind;

    fn phoenix() -> GeoCandidate {
        GeoCandidate {
            country_code: "us".into(),
            state: Some("Arizona".into()),
            kind: PlaceKind::City,
            longitude: -112.07,
            latitude: 33.45,
            display_name: Some("Phoenix, Maricopa County, Arizona, USA".into()),
        }
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn entries_are_write_once() {
        let mut cache = LookupCache::new();
        assert!(cache.insert_if_absent("Phoenix", vec![phoenix()]));
        assert!(!cache.insert_if_absent("Phoenix", vec![]));
        assert_eq!(cache.get("Phoenix"), Some(&[phoenix()][..]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn keys_are_exact_strings() {
        let mut cache = LookupCache::new();
        cache.insert_if_absent("Phoenix", vec![phoenix()]);
        assert!(cache.contains("Phoenix"));
        assert!(!cache.contains("phoenix"));
        assert!(!cache.contains("Phoenix "));
    }

    #[test]
    fn merge_keeps_existing_entries() {
        let mut cache = LookupCache::new();
        cache.insert_if_absent("Phoenix", vec![phoenix()]);
        let mut other = LookupCache::new();
        other.insert_if_absent("Phoenix", vec![]);
        other.insert_if_absent("Nowhere", vec![]);
        assert_eq!(cache.merge(other), 1);
        assert_eq!(cache.get("Phoenix").map(<[_]>::len), Some(1));
        assert!(cache.contains("Nowhere"));
    }

    #[test]
    fn prune_empty_removes_only_misses() {
        let mut cache = LookupCache::new();
        cache.insert_if_absent("Phoenix", vec![phoenix()]);
        cache.insert_if_absent("Nowhere", vec![]);
        assert_eq!(cache.prune_empty(), vec!["Nowhere".to_string()]);
        assert!(!cache.contains("Nowhere"));
        assert!(cache.contains("Phoenix"));
    }

    #[test]
    fn sqlite_store_roundtrip() {
        let conn = memory_db();
        let store = SqliteCacheStore::new(&conn);
        let mut cache = LookupCache::new();
        cache.insert_if_absent("Phoenix", vec![phoenix()]);
        cache.insert_if_absent("Nowhere", vec![]);
        store.save(&cache).unwrap();
        assert_eq!(store.load().unwrap(), cache);
    }

    #[test]
    fn sqlite_store_never_overwrites() {
        let conn = memory_db();
        let store = SqliteCacheStore::new(&conn);
        let mut first = LookupCache::new();
        first.insert_if_absent("Phoenix", vec![phoenix()]);
        store.save(&first).unwrap();

        let mut second = LookupCache::new();
        second.insert_if_absent("Phoenix", vec![]);
        store.save(&second).unwrap();

        assert_eq!(store.load().unwrap().get("Phoenix"), Some(&[phoenix()][..]));
    }

    #[test]
    fn sqlite_store_prune() {
        let conn = memory_db();
        let store = SqliteCacheStore::new(&conn);
        let mut cache = LookupCache::new();
        cache.insert_if_absent("Phoenix", vec![phoenix()]);
        cache.insert_if_absent("Nowhere", vec![]);
        store.save(&cache).unwrap();

        assert_eq!(store.prune_empty().unwrap(), vec!["Nowhere".to_string()]);
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains("Phoenix"));
    }

    #[test]
    fn json_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("nuforc_cache_{}.json", std::process::id()));
        let store = JsonCacheFile::new(&path);
        let mut cache = LookupCache::new();
        cache.insert_if_absent("Phoenix", vec![phoenix()]);
        store.save(&cache).unwrap();
        let loaded = store.load().unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(loaded, cache);
    }

    #[test]
    fn json_file_missing_is_empty() {
        let store = JsonCacheFile::new("tests/fixtures/does_not_exist.json");
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn json_fixture_loads() {
        let cache = JsonCacheFile::new("tests/fixtures/location_cache.json").load().unwrap();
        assert_eq!(cache.len(), 2);
        let phoenix = cache.get("Phoenix").unwrap();
        assert_eq!(phoenix[0].state.as_deref(), Some("Arizona"));
        assert_eq!(cache.get("Atlantis"), Some(&[][..]));
    }
}
