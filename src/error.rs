use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("search index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("metadata extraction failed for {file}: {reason}")]
    Extraction { file: String, reason: String },

    #[error("malformed document {id}: {reason}")]
    Parse { id: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    /// Any failure inside an indexing session, tagged with the pipeline
    /// stage that was running.
    #[error("indexing failed during {stage}: {source}")]
    Indexing {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn indexing(stage: &'static str, source: Error) -> Self {
        // Already tagged errors keep their innermost stage.
        match source {
            err @ Error::Indexing { .. } => err,
            other => Error::Indexing {
                stage,
                source: Box::new(other),
            },
        }
    }
}
