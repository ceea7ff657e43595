use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    Term,
    collector::{DocSetCollector, TopDocs},
    query::TermQuery,
    schema::*,
};
use tracing::debug;

use crate::{
    document::Document,
    error::{Error, Result},
    model::EntityId,
    store::DocumentStore,
};

/// Field names used in the schema.
pub mod fields {
    pub const ID: &str = "id";
    pub const KIND: &str = "kind";
    pub const ANCESTRY: &str = "ancestry";
    /// The full document as JSON; the only field read back on lookup.
    pub const SOURCE: &str = "source";
}

/// Persistent document store on a Tantivy index.
///
/// Each document is indexed under its id, kind, and every ancestry entry,
/// and stored whole as JSON so a lookup returns exactly what was submitted.
pub struct TantivyStore {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    schema: Schema,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
pub struct SchemaFields {
    pub id: Field,
    pub kind: Field,
    pub ancestry: Field,
    pub source: Field,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let id = builder.add_text_field(fields::ID, STRING | STORED);
    let kind = builder.add_text_field(fields::KIND, STRING | STORED);
    let ancestry = builder.add_text_field(fields::ANCESTRY, STRING | STORED);
    let source = builder.add_text_field(fields::SOURCE, STORED);

    let schema = builder.build();
    let fields = SchemaFields {
        id,
        kind,
        ancestry,
        source,
    };

    (schema, fields)
}

impl TantivyStore {
    /// Open or create a store at the given directory.
    pub fn open(dir: &Path, memory_budget: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, _) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(
                mmap_dir,
                schema.clone(),
                tantivy::IndexSettings::default(),
            )?
        };

        Self::from_index(index, schema, memory_budget)
    }

    /// Create an in-memory store (for testing).
    pub fn open_in_ram() -> Result<Self> {
        let (schema, _) = build_schema();
        let index = Index::create_in_ram(schema.clone());
        Self::from_index(index, schema, 15_000_000)
    }

    fn from_index(
        index: Index,
        schema: Schema,
        memory_budget: usize,
    ) -> Result<Self> {
        let reader = index.reader()?;
        let writer = index.writer(memory_budget)?;
        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            schema,
        })
    }

    /// Get the resolved field handles.
    pub fn fields(&self) -> SchemaFields {
        let f = |name: &str| self.schema.get_field(name).unwrap();
        SchemaFields {
            id: f(fields::ID),
            kind: f(fields::KIND),
            ancestry: f(fields::ANCESTRY),
            source: f(fields::SOURCE),
        }
    }

    fn writer(&self) -> MutexGuard<'_, IndexWriter> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ids of every committed document whose ancestry contains `id`.
    pub fn descendants(&self, id: &EntityId) -> Result<Vec<EntityId>> {
        let f = self.fields();
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let query = TermQuery::new(
            Term::from_field_text(f.ancestry, id.as_str()),
            IndexRecordOption::Basic,
        );
        let addresses = searcher.search(&query, &DocSetCollector)?;

        let mut ids = Vec::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(found) = doc.get_first(f.id).and_then(|v| v.as_str()) {
                ids.push(EntityId::from(found));
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Number of committed documents.
    pub fn num_docs(&self) -> Result<u64> {
        self.reader.reload()?;
        Ok(self.reader.searcher().num_docs())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn index(&self) -> &Index {
        &self.index
    }
}

impl DocumentStore for TantivyStore {
    fn lookup(&self, id: &EntityId) -> Result<Option<Document>> {
        let f = self.fields();
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let query = TermQuery::new(
            Term::from_field_text(f.id, id.as_str()),
            IndexRecordOption::Basic,
        );
        let top_docs = searcher.search(&query, &TopDocs::with_limit(1))?;
        let Some((_, address)) = top_docs.into_iter().next() else {
            return Ok(None);
        };

        let stored: TantivyDocument = searcher.doc(address)?;
        let source = stored
            .get_first(f.source)
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Parse {
                id: id.to_string(),
                reason: "stored document has no source".to_string(),
            })?;
        let doc: Document = serde_json::from_str(source)?;
        // The discriminator is required on every stored document.
        doc.kind()?;
        Ok(Some(doc))
    }

    fn submit(&self, docs: Vec<Document>) -> Result<()> {
        let f = self.fields();
        let count = docs.len();
        let writer = self.writer();

        for doc in docs {
            let id = doc.entity_id()?;
            let kind = doc.kind()?;

            // Delete any existing document with this ID first.
            writer.delete_term(Term::from_field_text(f.id, id.as_str()));

            let mut indexed = TantivyDocument::default();
            indexed.add_text(f.id, id.as_str());
            indexed.add_text(f.kind, kind.as_str());
            for ancestor in doc.ancestry() {
                indexed.add_text(f.ancestry, ancestor.as_str());
            }
            indexed.add_text(f.source, serde_json::to_string(&doc)?);
            writer.add_document(indexed)?;
        }

        debug!(count, "submitted documents");
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let opstamp = self.writer().commit()?;
        self.reader.reload()?;
        debug!(opstamp, "committed index");
        Ok(())
    }

    fn delete(&self, id: &EntityId) -> Result<()> {
        let f = self.fields();
        self.writer()
            .delete_term(Term::from_field_text(f.id, id.as_str()));
        Ok(())
    }
}

impl std::fmt::Debug for TantivyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TantivyStore").finish_non_exhaustive()
    }
}
