use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::entitlement::EntitlementRecord;

pub type EntitlementTable = HashMap<String, EntitlementRecord>;

const TEMP_FILE_SUFFIX: &str = "json.tmp";
const BACKUP_FILE_SUFFIX: &str = "backup.json";

/// Durable JSON persistence for the entitlement table. The previous primary
/// file is kept as a backup before every overwrite, so a crash mid-write
/// always leaves at least one readable copy on disk.
pub struct EntitlementStore {
    path: PathBuf,
    backup_path: PathBuf,
}

impl EntitlementStore {
    pub fn new(path: PathBuf) -> EntitlementStore {
        let backup_path = path.with_extension(BACKUP_FILE_SUFFIX);
        EntitlementStore { path, backup_path }
    }

    /// Loads the full table. A missing or corrupt primary file falls back to
    /// the backup copy; if that is also unusable the table starts empty.
    /// Never fails: storage trouble is logged, not propagated.
    pub fn load(&self) -> EntitlementTable {
        match Self::read_table(&self.path) {
            Ok(Some(table)) => return table,
            Ok(None) => {}
            Err(e) => warn!("entitlement file unreadable, trying backup: {:#}", e),
        }

        match Self::read_table(&self.backup_path) {
            Ok(Some(table)) => {
                info!("recovered {} entitlement records from backup", table.len());
                table
            }
            Ok(None) => EntitlementTable::new(),
            Err(e) => {
                warn!("backup also unreadable, starting with empty table: {:#}", e);
                EntitlementTable::new()
            }
        }
    }

    /// Writes the full table. The current primary is copied to the backup
    /// location first, then the new content replaces the primary via a
    /// temp-file rename. An error here is recoverable: the in-memory table
    /// stays the source of truth and the caller decides whether to retry.
    pub fn save(&self, table: &EntitlementTable) -> Result<()> {
        let content =
            serde_json::to_string_pretty(table).context("Failed to serialize entitlement table")?;

        if self.path.exists() {
            std::fs::copy(&self.path, &self.backup_path).with_context(|| {
                format!("Failed to write backup copy {}", self.backup_path.display())
            })?;
        }

        let temp_path = self.path.with_extension(TEMP_FILE_SUFFIX);
        std::fs::write(&temp_path, content)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }

    fn read_table(path: &Path) -> Result<Option<EntitlementTable>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let table = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(Some(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::EntitlementRecord;
    use chrono::NaiveDate;

    fn sample_table(name: &str) -> EntitlementTable {
        let mut record = EntitlementRecord::new(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        record.username = Some(name.to_string());
        let mut table = EntitlementTable::new();
        table.insert("42".to_string(), record);
        table
    }

    #[test]
    fn test_load_missing_files_gives_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntitlementStore::new(dir.path().join("entitlements.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntitlementStore::new(dir.path().join("entitlements.json"));

        store.save(&sample_table("alice")).unwrap();
        let loaded = store.load();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["42"].username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_corrupt_primary_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entitlements.json");
        let store = EntitlementStore::new(path.clone());

        // Two saves so the backup holds the first generation.
        store.save(&sample_table("alice")).unwrap();
        store.save(&sample_table("bob")).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let loaded = store.load();
        assert_eq!(loaded["42"].username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_corrupt_primary_and_backup_gives_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entitlements.json");
        let store = EntitlementStore::new(path.clone());

        store.save(&sample_table("alice")).unwrap();
        store.save(&sample_table("bob")).unwrap();
        std::fs::write(&path, "{").unwrap();
        std::fs::write(path.with_extension("backup.json"), "also broken").unwrap();

        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_keeps_previous_generation_as_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entitlements.json");
        let store = EntitlementStore::new(path.clone());

        store.save(&sample_table("alice")).unwrap();
        store.save(&sample_table("bob")).unwrap();

        let backup = std::fs::read_to_string(path.with_extension("backup.json")).unwrap();
        assert!(backup.contains("alice"));
        let primary = std::fs::read_to_string(&path).unwrap();
        assert!(primary.contains("bob"));
    }
}
