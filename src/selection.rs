//! The user's set of tracked chains and where it is persisted.
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use eyre::{Result, WrapErr};
use serde_json::{Map, Value};
use url::Url;

use crate::config::{DEFAULT_CHAINS, SELECTION_KEY};

/// String key-value persistence, one value per key.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// A JSON object on disk mapping keys to string values. A value that is not a
/// JSON string, e.g. a hand-edited array, is read back as its JSON text.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e).wrap_err_with(|| format!("reading {}", self.path.display())),
        };
        let map = serde_json::from_str(&text)
            .wrap_err_with(|| format!("parsing {}", self.path.display()))?;
        Ok(map)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.read_map()?;
        Ok(map.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut map = self.read_map().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "state file unreadable, starting a new one");
            Map::new()
        });
        map.insert(key.to_string(), Value::String(value.to_string()));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&map)?)
            .wrap_err_with(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).wrap_err_with(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: std::collections::HashMap<String, String>,
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Ordered, duplicate-free list of tracked chain ids, written through to a store
/// on every change.
#[derive(Debug)]
pub struct Selection<S> {
    ids: Vec<u64>,
    store: S,
}

impl<S: KeyValueStore> Selection<S> {
    /// Reads the persisted selection, falling back to the defaults when it is
    /// missing or cannot be parsed.
    pub fn load(store: S) -> Self {
        let ids = match store.get(SELECTION_KEY) {
            Ok(Some(text)) => match serde_json::from_str::<Vec<u64>>(&text) {
                Ok(ids) => dedup(ids),
                Err(e) => {
                    tracing::warn!(error = %e, "stored selection is malformed, using defaults");
                    DEFAULT_CHAINS.to_vec()
                }
            },
            Ok(None) => DEFAULT_CHAINS.to_vec(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read stored selection, using defaults");
                DEFAULT_CHAINS.to_vec()
            }
        };
        Self { ids, store }
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    /// Returns whether the selection changed.
    pub fn add(&mut self, id: u64) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.push(id);
        self.persist();
        true
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.ids.len();
        self.ids.retain(|&x| x != id);
        if self.ids.len() == before {
            return false;
        }
        self.persist();
        true
    }

    /// Flips membership of `id`. A chain toggled back on goes to the end, so
    /// two toggles restore the set of chains but not necessarily their order.
    pub fn toggle(&mut self, id: u64) {
        if !self.remove(id) {
            self.add(id);
        }
    }

    /// Adds the chain named by free-form "chain ID or RPC URL" text and returns
    /// its id if it was not tracked yet. Input that names no chain, or a chain
    /// already tracked, leaves the selection alone and returns `None`.
    pub fn add_input(&mut self, input: &str) -> Option<u64> {
        match parse_chain_input(input) {
            Some(id) => self.add(id).then_some(id),
            None => {
                tracing::debug!(input, "ignoring unparseable chain input");
                None
            }
        }
    }

    #[cfg(test)]
    pub fn into_store(self) -> S {
        self.store
    }

    fn persist(&mut self) {
        let encoded = match serde_json::to_string(&self.ids) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "could not encode selection");
                return;
            }
        };
        if let Err(e) = self.store.set(SELECTION_KEY, &encoded) {
            tracing::warn!(error = %e, "could not persist selection");
        }
    }
}

fn dedup(ids: Vec<u64>) -> Vec<u64> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Extracts a chain id from either a plain integer or a URL whose last path
/// segment is numeric, e.g. `https://rpc.example.org/v1/8453`.
pub fn parse_chain_input(input: &str) -> Option<u64> {
    let input = input.trim();
    let looks_like_url = ["http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|scheme| input.to_ascii_lowercase().starts_with(scheme));

    let id = if looks_like_url {
        let url = Url::parse(input).ok()?;
        let last = url.path_segments()?.rev().find(|s| !s.is_empty())?;
        last.parse::<u64>().ok()?
    } else {
        input.parse::<u64>().ok()?
    };

    (id != 0).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A store whose writes always fail.
    #[derive(Debug, Default)]
    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<()> {
            Err(eyre::eyre!("store is read-only"))
        }
    }

    fn temp_state_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chaingazer-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{}.json", name));
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn empty_store_loads_defaults() {
        let selection = Selection::load(MemoryStore::default());
        assert_eq!(selection.ids(), &[1, 10, 8453, 42161]);
    }

    #[test]
    fn malformed_store_loads_defaults() {
        let mut store = MemoryStore::default();
        store.set(SELECTION_KEY, "[1, 10,").unwrap();
        let selection = Selection::load(store);
        assert_eq!(selection.ids(), &DEFAULT_CHAINS);
    }

    #[test]
    fn stored_duplicates_are_dropped() {
        let mut store = MemoryStore::default();
        store.set(SELECTION_KEY, "[10, 1, 10, 137]").unwrap();
        let selection = Selection::load(store);
        assert_eq!(selection.ids(), &[10, 1, 137]);
    }

    #[test]
    fn add_persists_and_reloads() {
        let mut selection = Selection::load(MemoryStore::default());
        assert!(selection.add(137));
        let reloaded = Selection::load(selection.into_store());
        assert!(reloaded.contains(137));
        assert_eq!(reloaded.ids(), &[1, 10, 8453, 42161, 137]);
    }

    #[test]
    fn adding_twice_is_a_noop() {
        let mut selection = Selection::load(MemoryStore::default());
        assert!(!selection.add(10));
        assert_eq!(selection.ids(), &DEFAULT_CHAINS);
    }

    #[test]
    fn toggle_twice_restores_selection() {
        let mut selection = Selection::load(MemoryStore::default());
        selection.toggle(8453);
        assert!(!selection.contains(8453));
        selection.toggle(8453);
        assert!(selection.contains(8453));

        selection.toggle(56);
        selection.toggle(56);
        let mut ids = selection.ids().to_vec();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 10, 8453, 42161]);
    }

    #[test]
    fn failed_persist_keeps_in_memory_change() {
        let mut selection = Selection::load(ReadOnlyStore);
        assert_eq!(selection.ids(), &DEFAULT_CHAINS);
        assert!(selection.add(137));
        assert!(selection.contains(137));
        assert!(selection.remove(1));
        assert!(!selection.contains(1));
        selection.toggle(10);
        assert_eq!(selection.ids(), &[8453, 42161, 137]);
    }

    #[test]
    fn remove_persists() {
        let mut selection = Selection::load(MemoryStore::default());
        assert!(selection.remove(1));
        assert!(!selection.remove(1));
        let reloaded = Selection::load(selection.into_store());
        assert_eq!(reloaded.ids(), &[10, 8453, 42161]);
    }

    #[test]
    fn parses_plain_ids_and_urls() {
        assert_eq!(parse_chain_input("137"), Some(137));
        assert_eq!(parse_chain_input("  42220 "), Some(42220));
        assert_eq!(parse_chain_input("https://rpc.example.org/v1/8453"), Some(8453));
        assert_eq!(parse_chain_input("https://rpc.example.org/8453/"), Some(8453));
        assert_eq!(parse_chain_input("wss://node.example.org/ws/10"), Some(10));
    }

    #[test]
    fn ignores_garbage_input() {
        assert_eq!(parse_chain_input(""), None);
        assert_eq!(parse_chain_input("base"), None);
        assert_eq!(parse_chain_input("-5"), None);
        assert_eq!(parse_chain_input("0"), None);
        assert_eq!(parse_chain_input("https://mainnet.base.org"), None);
        assert_eq!(parse_chain_input("https://rpc.example.org/v1/abc"), None);
    }

    #[test]
    fn add_input_ignores_unparseable_text() {
        let mut selection = Selection::load(MemoryStore::default());
        assert_eq!(selection.add_input("not a chain"), None);
        assert_eq!(selection.ids(), &DEFAULT_CHAINS);
        assert_eq!(selection.add_input("https://rpc.example.org/999999"), Some(999999));
        assert!(selection.contains(999999));
    }

    #[test]
    fn add_input_of_tracked_chain_reports_nothing_added() {
        let mut selection = Selection::load(MemoryStore::default());
        assert_eq!(selection.add_input("10"), None);
        assert_eq!(selection.add_input("https://rpc.example.org/v1/8453"), None);
        assert_eq!(selection.ids(), &DEFAULT_CHAINS);
        assert_eq!(selection.add_input("137"), Some(137));
        assert_eq!(selection.add_input("137"), None);
    }

    #[test]
    fn hand_edited_array_in_state_file_loads() {
        let path = temp_state_file("array-value");
        fs::write(&path, r#"{"selectedChains": [1, 10]}"#).unwrap();

        let selection = Selection::load(JsonFileStore::new(&path));
        assert_eq!(selection.ids(), &[1, 10]);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn non_list_value_in_state_file_falls_back() {
        let path = temp_state_file("object-value");
        fs::write(&path, r#"{"selectedChains": {"ids": [1]}}"#).unwrap();

        let selection = Selection::load(JsonFileStore::new(&path));
        assert_eq!(selection.ids(), &DEFAULT_CHAINS);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn file_store_round_trips_selection() {
        let path = temp_state_file("round-trip");
        let mut selection = Selection::load(JsonFileStore::new(&path));
        assert_eq!(selection.ids(), &DEFAULT_CHAINS);
        selection.add(137);
        selection.remove(10);

        let reloaded = Selection::load(JsonFileStore::new(&path));
        assert_eq!(reloaded.ids(), &[1, 8453, 42161, 137]);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn corrupt_file_falls_back_and_is_overwritten() {
        let path = temp_state_file("corrupt");
        fs::write(&path, "{not json").unwrap();

        let mut selection = Selection::load(JsonFileStore::new(&path));
        assert_eq!(selection.ids(), &DEFAULT_CHAINS);
        selection.add(56);

        let store = JsonFileStore::new(&path);
        assert_eq!(store.get(SELECTION_KEY).unwrap().as_deref(), Some("[1,10,8453,42161,56]"));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn file_store_keeps_other_keys() {
        let path = temp_state_file("other-keys");
        let mut store = JsonFileStore::new(&path);
        store.set("theme", "dark").unwrap();
        store.set(SELECTION_KEY, "[1]").unwrap();
        assert_eq!(store.get("theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(store.get(SELECTION_KEY).unwrap().as_deref(), Some("[1]"));
        assert_eq!(store.path(), path.as_path());
        fs::remove_file(&path).unwrap();
    }
}
