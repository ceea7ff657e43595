use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::{
    document::fields,
    error::{Error, Result},
};

const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Setting keys understood by [`IndexerConfig::load`].
pub mod keys {
    pub const FLUSH_THRESHOLD: &str = "flush_threshold";
    pub const WRITER_MEMORY_BUDGET: &str = "writer_memory_budget";
    pub const METADATA_PREFIX: &str = "metadata_prefix";
    pub const METADATA_TEXT_FIELD: &str = "metadata_text_field";

    pub const ALL: [&str; 4] = [
        FLUSH_THRESHOLD,
        WRITER_MEMORY_BUDGET,
        METADATA_PREFIX,
        METADATA_TEXT_FIELD,
    ];
}

pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(redb::Error::from)?;

        let txn = db.begin_write()?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Get a setting, returning the default if not set.
    pub fn get_setting_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}

/// Tunables for an indexing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Queued documents that trigger a submit to the store.
    pub flush_threshold: usize,
    /// Heap handed to the index writer, in bytes.
    pub writer_memory_budget: usize,
    /// Prepended to every flattened metadata path.
    pub metadata_prefix: String,
    /// Catch-all field receiving all metadata text.
    pub metadata_text_field: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 1000,
            writer_memory_budget: 50_000_000,
            metadata_prefix: "md.".to_string(),
            metadata_text_field: "md_text".to_string(),
        }
    }
}

impl IndexerConfig {
    /// Defaults overridden by whatever is stored in the settings table.
    pub fn load(db: &ConfigDb) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = db.get_setting(keys::FLUSH_THRESHOLD)? {
            config.flush_threshold = parse_positive(keys::FLUSH_THRESHOLD, &v)?;
        }
        if let Some(v) = db.get_setting(keys::WRITER_MEMORY_BUDGET)? {
            config.writer_memory_budget =
                parse_positive(keys::WRITER_MEMORY_BUDGET, &v)?;
        }
        if let Some(v) = db.get_setting(keys::METADATA_PREFIX)? {
            check_metadata_prefix(&v)?;
            config.metadata_prefix = v;
        }
        if let Some(v) = db.get_setting(keys::METADATA_TEXT_FIELD)? {
            check_metadata_text_field(&v)?;
            config.metadata_text_field = v;
        }
        Ok(config)
    }

    /// Effective value of one setting, as it would be stored.
    pub fn setting(&self, key: &str) -> Result<String> {
        match key {
            keys::FLUSH_THRESHOLD => Ok(self.flush_threshold.to_string()),
            keys::WRITER_MEMORY_BUDGET => {
                Ok(self.writer_memory_budget.to_string())
            }
            keys::METADATA_PREFIX => Ok(self.metadata_prefix.clone()),
            keys::METADATA_TEXT_FIELD => Ok(self.metadata_text_field.clone()),
            _ => Err(Error::NotFound {
                kind: "setting",
                name: key.to_string(),
            }),
        }
    }

    /// Check a value before it is stored under `key`.
    pub fn validate_setting(key: &str, value: &str) -> Result<()> {
        match key {
            keys::FLUSH_THRESHOLD | keys::WRITER_MEMORY_BUDGET => {
                parse_positive(key, value).map(|_| ())
            }
            keys::METADATA_PREFIX => check_metadata_prefix(value),
            keys::METADATA_TEXT_FIELD => check_metadata_text_field(value),
            _ => Err(Error::Config(format!("unknown setting '{key}'"))),
        }
    }
}

/// Flattened metadata names are `<prefix><path>`, so the prefix must not
/// begin any core field name or the per-type event date family.
fn check_metadata_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(Error::Config(format!(
            "{} must not be empty",
            keys::METADATA_PREFIX
        )));
    }
    let clash = fields::CORE
        .iter()
        .find(|name| name.starts_with(prefix))
        .copied()
        .or_else(|| {
            (prefix.starts_with(fields::EVENT_DATE_PREFIX)
                || fields::EVENT_DATE_PREFIX.starts_with(prefix))
            .then_some(fields::EVENT_DATE_PREFIX)
        });
    match clash {
        Some(name) => Err(Error::Config(format!(
            "{} '{prefix}' could produce the reserved field '{name}'",
            keys::METADATA_PREFIX
        ))),
        None => Ok(()),
    }
}

fn check_metadata_text_field(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Config(format!(
            "{} must not be empty",
            keys::METADATA_TEXT_FIELD
        )));
    }
    if fields::is_reserved(name) {
        return Err(Error::Config(format!(
            "{} '{name}' is a reserved field name",
            keys::METADATA_TEXT_FIELD
        )));
    }
    Ok(())
}

fn parse_positive(key: &str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Config(format!(
            "{key} must be a positive integer, got '{value}'"
        ))),
    }
}
