//! JSON file persistence for the game record, history and price cache.
//!
//! Missing files load as defaults. Writes go through a temp file and
//! rename so a crash mid-write never leaves a torn record.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::price_cache::CacheEntry;
use crate::types::{GameHistoryEntry, GameRecord};

pub struct GameStore {
    data_dir: PathBuf,
}

impl GameStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn game_path(&self) -> PathBuf {
        self.data_dir.join("game_data.json")
    }

    fn history_path(&self) -> PathBuf {
        self.data_dir.join("game_history.json")
    }

    fn cache_path(&self) -> PathBuf {
        self.data_dir.join("stock_cache.json")
    }

    pub fn load_record(&self) -> Result<GameRecord> {
        match load_json::<GameRecord>(&self.game_path())? {
            Some(record) => Ok(record),
            None => {
                info!("no game record at {:?}, starting fresh", self.game_path());
                Ok(GameRecord::default())
            }
        }
    }

    pub fn save_record(&self, record: &GameRecord) -> Result<()> {
        save_json(&self.game_path(), record)
    }

    pub fn load_history(&self) -> Result<Vec<GameHistoryEntry>> {
        Ok(load_json(&self.history_path())?.unwrap_or_default())
    }

    pub fn save_history(&self, history: &[GameHistoryEntry]) -> Result<()> {
        save_json(&self.history_path(), &history)
    }

    pub fn load_cache(&self) -> Result<HashMap<String, CacheEntry>> {
        Ok(load_json(&self.cache_path())?.unwrap_or_default())
    }

    pub fn save_cache(&self, cache: &HashMap<String, CacheEntry>) -> Result<()> {
        save_json(&self.cache_path(), cache)
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;
    let value = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {:?}", path))?;
    Ok(Some(value))
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let contents = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {:?}", path))?;

    // Write to temp file first, then rename (atomic operation).
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, contents)
        .with_context(|| format!("Failed to write {:?}", temp_path))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?}", temp_path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Phase;
    use tempfile::tempdir;

    #[test]
    fn test_missing_files_load_defaults() {
        let dir = tempdir().unwrap();
        let store = GameStore::new(dir.path());
        assert_eq!(store.load_record().unwrap().phase, Phase::Setup);
        assert!(store.load_history().unwrap().is_empty());
        assert!(store.load_cache().unwrap().is_empty());
    }

    #[test]
    fn test_record_roundtrip() {
        let dir = tempdir().unwrap();
        let store = GameStore::new(dir.path());

        let mut record = GameRecord::default();
        record.phase = Phase::Done;
        record.all_picks.push("AAPL".to_string());
        store.save_record(&record).unwrap();

        let loaded = store.load_record().unwrap();
        assert_eq!(loaded.phase, Phase::Done);
        assert_eq!(loaded.all_picks, vec!["AAPL".to_string()]);
    }

    #[test]
    fn test_cache_roundtrip() {
        let dir = tempdir().unwrap();
        let store = GameStore::new(dir.path());

        let mut cache = HashMap::new();
        cache.insert(
            "AAPL".to_string(),
            CacheEntry {
                price: 187.44,
                fetched_at: 1_700_000_000,
            },
        );
        store.save_cache(&cache).unwrap();

        let loaded = store.load_cache().unwrap();
        assert_eq!(loaded["AAPL"].price, 187.44);
        assert_eq!(loaded["AAPL"].fetched_at, 1_700_000_000);
    }
}
