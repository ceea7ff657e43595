use std::{
    io::{Cursor, Read},
    path::Path,
};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::{error::Result, model::EntityId, store::ContentSource};

const OBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");

/// Raw file content keyed by file entity id.
pub struct ObjectStore {
    db: Database,
}

impl ObjectStore {
    /// Open or create an object store at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use archindex::ObjectStore;
    ///
    /// let store = ObjectStore::open(&tmp.path().join("objects.redb")).unwrap();
    /// assert!(store.list_ids().unwrap().is_empty());
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(redb::Error::from)?;

        let txn = db.begin_write()?;
        txn.open_table(OBJECTS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn put(&self, id: &EntityId, data: &[u8]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(OBJECTS)?;
            table.insert(id.as_str(), data)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get(&self, id: &EntityId) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(OBJECTS)?;
        Ok(table.get(id.as_str())?.map(|v| v.value().to_vec()))
    }

    pub fn remove(&self, id: &EntityId) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(OBJECTS)?;
            table.remove(id.as_str())?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Store multiple objects in a single transaction.
    pub fn batch_put(&self, entries: &[(EntityId, Vec<u8>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(OBJECTS)?;
            for (id, data) in entries {
                table.insert(id.as_str(), data.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn list_ids(&self) -> Result<Vec<EntityId>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(OBJECTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, _v) = entry?;
            result.push(EntityId::from(k.value()));
        }
        Ok(result)
    }
}

impl ContentSource for ObjectStore {
    fn fetch(&self, id: &EntityId) -> Result<Option<Box<dyn Read + '_>>> {
        Ok(self.get(id)?.map(|bytes| -> Box<dyn Read + '_> {
            Box::new(Cursor::new(bytes))
        }))
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, ObjectStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(&tmp.path().join("objects.redb")).unwrap();
        (tmp, store)
    }

    #[test]
    fn put_and_get() {
        let (_tmp, store) = test_store();
        store.put(&"f1".into(), b"<dc><title>A</title></dc>").unwrap();

        let data = store.get(&"f1".into()).unwrap().unwrap();
        assert_eq!(data, b"<dc><title>A</title></dc>");
    }

    #[test]
    fn get_missing_returns_none() {
        let (_tmp, store) = test_store();
        assert!(store.get(&"nope".into()).unwrap().is_none());
        assert!(store.fetch(&"nope".into()).unwrap().is_none());
    }

    #[test]
    fn fetch_streams_content() {
        let (_tmp, store) = test_store();
        store.put(&"f1".into(), b"hello").unwrap();

        let mut buf = Vec::new();
        store
            .fetch(&"f1".into())
            .unwrap()
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn remove_entry() {
        let (_tmp, store) = test_store();
        store.put(&"f1".into(), b"x").unwrap();
        assert!(store.remove(&"f1".into()).unwrap());
        assert!(!store.remove(&"f1".into()).unwrap());
    }

    #[test]
    fn batch_put_and_list() {
        let (_tmp, store) = test_store();
        store
            .batch_put(&[
                ("b".into(), b"2".to_vec()),
                ("a".into(), b"1".to_vec()),
            ])
            .unwrap();
        assert_eq!(
            store.list_ids().unwrap(),
            vec![EntityId::from("a"), EntityId::from("b")]
        );
    }

    #[test]
    fn overwrite_entry() {
        let (_tmp, store) = test_store();
        store.put(&"f1".into(), b"old").unwrap();
        store.put(&"f1".into(), b"new").unwrap();
        assert_eq!(store.get(&"f1".into()).unwrap().unwrap(), b"new");
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("objects.redb");
        {
            let store = ObjectStore::open(&path).unwrap();
            store.put(&"f1".into(), b"kept").unwrap();
        }
        {
            let store = ObjectStore::open(&path).unwrap();
            assert_eq!(store.get(&"f1".into()).unwrap().unwrap(), b"kept");
        }
    }
}
