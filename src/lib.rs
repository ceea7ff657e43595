//! archindex - ancestry-aware batch indexing of archival entities.
//!
//! Collections, units, manifestations, files, and preservation events arrive
//! in batches. Every indexed document carries its full ancestry (the ids of
//! everything above it in the archival hierarchy) so a single term query
//! finds all descendants of an entity. Entities that reach into earlier
//! batches are resolved against the store, and stored documents touched by
//! a new batch are retrofitted in place.
//!
//! # Quick start
//!
//! ```
//! use archindex::{Batch, DocumentStore, Session, TantivyStore};
//!
//! let store = TantivyStore::open_in_ram().unwrap();
//! let batch: Batch = serde_json::from_str(r#"{
//!     "collections": [{"id": "A"}, {"id": "B", "parent": "A"}],
//!     "units": [{"id": "U1", "collections": ["B"]}]
//! }"#).unwrap();
//!
//! let mut session = Session::open(&store);
//! session.add(&batch).unwrap();
//! session.close().unwrap();
//!
//! let u1 = store.lookup(&"U1".into()).unwrap().unwrap();
//! assert_eq!(u1.strings("ancestry"), vec!["B", "A"]);
//! assert_eq!(store.descendants(&"A".into()).unwrap().len(), 2);
//! ```

pub mod ancestry;
pub mod assembler;
pub mod batcher;
pub mod cli;
pub mod config_db;
pub mod data_dir;
pub mod document;
pub mod error;
pub mod extract;
pub mod ingestion;
pub mod model;
pub mod object_store;
pub mod retrofit;
pub mod session;
pub mod store;
pub mod tantivy_index;
pub mod walker;

pub use config_db::{ConfigDb, IndexerConfig};
pub use data_dir::DataDir;
pub use document::{Document, FieldValue};
pub use error::{Error, Result};
pub use extract::{FieldExtractor, XmlFlattener};
pub use model::{
    Batch, Collection, EntityId, EntityKind, Event, File, FileAggregation, Manifestation, Unit,
};
pub use object_store::ObjectStore;
pub use session::{AddReport, Session};
pub use store::{ContentSource, DocumentStore, MemoryStore, NoContent};
pub use tantivy_index::TantivyStore;
