//! Collaborator contracts consumed by the indexer.
//!
//! [`DocumentStore`] is the persistent search store: point lookups only see
//! committed documents, submissions are durable but invisible until the next
//! commit, and commit is store-wide. [`ContentSource`] supplies the raw bytes
//! of file entities.

use std::{
    collections::{BTreeMap, HashMap},
    io::{Cursor, Read},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{document::Document, error::Result, model::EntityId};

pub trait DocumentStore {
    /// Point lookup of a previously committed document.
    fn lookup(&self, id: &EntityId) -> Result<Option<Document>>;

    /// Stage documents for writing. Each replaces any document with the
    /// same id once committed.
    fn submit(&self, docs: Vec<Document>) -> Result<()>;

    /// Make every staged write visible, from every writer.
    fn commit(&self) -> Result<()>;

    /// Stage removal of one document.
    fn delete(&self, id: &EntityId) -> Result<()>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for &T {
    fn lookup(&self, id: &EntityId) -> Result<Option<Document>> {
        (**self).lookup(id)
    }

    fn submit(&self, docs: Vec<Document>) -> Result<()> {
        (**self).submit(docs)
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn delete(&self, id: &EntityId) -> Result<()> {
        (**self).delete(id)
    }
}

impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    fn lookup(&self, id: &EntityId) -> Result<Option<Document>> {
        (**self).lookup(id)
    }

    fn submit(&self, docs: Vec<Document>) -> Result<()> {
        (**self).submit(docs)
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn delete(&self, id: &EntityId) -> Result<()> {
        (**self).delete(id)
    }
}

pub trait ContentSource {
    /// Raw bytes of a file entity, or `None` if the archive has no content
    /// under that id.
    fn fetch(&self, id: &EntityId) -> Result<Option<Box<dyn Read + '_>>>;
}

impl<T: ContentSource + ?Sized> ContentSource for &T {
    fn fetch(&self, id: &EntityId) -> Result<Option<Box<dyn Read + '_>>> {
        (**self).fetch(id)
    }
}

impl ContentSource for HashMap<EntityId, Vec<u8>> {
    fn fetch(&self, id: &EntityId) -> Result<Option<Box<dyn Read + '_>>> {
        Ok(self.get(id).map(|bytes| -> Box<dyn Read + '_> {
            Box::new(Cursor::new(bytes.as_slice()))
        }))
    }
}

/// A content source with nothing in it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContent;

impl ContentSource for NoContent {
    fn fetch(&self, _id: &EntityId) -> Result<Option<Box<dyn Read + '_>>> {
        Ok(None)
    }
}

#[derive(Debug, Clone)]
enum Staged {
    Put(Document),
    Delete(EntityId),
}

#[derive(Debug, Default)]
struct MemoryState {
    committed: BTreeMap<EntityId, Document>,
    staged: Vec<Staged>,
    submissions: usize,
    commits: usize,
}

/// In-process [`DocumentStore`] with the same visibility rules as the
/// persistent store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another writer panicked mid-call; the
        // maps themselves are never left half-updated.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of committed documents.
    pub fn len(&self) -> usize {
        self.state().committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `submit` calls so far.
    pub fn submissions(&self) -> usize {
        self.state().submissions
    }

    pub fn commits(&self) -> usize {
        self.state().commits
    }

    /// Number of staged, uncommitted operations.
    pub fn pending(&self) -> usize {
        self.state().staged.len()
    }

    /// Snapshot of every committed document, ordered by id.
    pub fn snapshot(&self) -> BTreeMap<EntityId, Document> {
        self.state().committed.clone()
    }
}

impl DocumentStore for MemoryStore {
    fn lookup(&self, id: &EntityId) -> Result<Option<Document>> {
        Ok(self.state().committed.get(id).cloned())
    }

    fn submit(&self, docs: Vec<Document>) -> Result<()> {
        let mut state = self.state();
        state.submissions += 1;
        state.staged.extend(docs.into_iter().map(Staged::Put));
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.state();
        let staged = std::mem::take(&mut state.staged);
        for op in staged {
            match op {
                Staged::Put(doc) => {
                    let id = doc.entity_id()?;
                    state.committed.insert(id, doc);
                }
                Staged::Delete(id) => {
                    state.committed.remove(&id);
                }
            }
        }
        state.commits += 1;
        Ok(())
    }

    fn delete(&self, id: &EntityId) -> Result<()> {
        self.state().staged.push(Staged::Delete(id.clone()));
        Ok(())
    }
}
