//! Indexing sessions.
//!
//! A [`Session`] is bound to one store for its lifetime. Each call to
//! [`Session::add`] runs the whole pipeline over one batch: ancestry and
//! documents kind by kind, then retrofits of stored documents. Nothing is
//! committed until [`Session::close`].

use std::fmt;

use tracing::{debug, info};

use crate::{
    ancestry::Resolver,
    assembler::{Assembler, Contributions},
    batcher::WriteBatcher,
    config_db::IndexerConfig,
    error::{Error, Result},
    extract::{FieldExtractor, XmlFlattener},
    model::{Batch, BatchIndex, EntityId, EntityKind},
    retrofit::RetrofitPlan,
    store::{ContentSource, DocumentStore, NoContent},
};

/// One step of the per-batch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Collections,
    Units,
    Manifestations,
    Files,
    Events,
    Retrofit,
}

impl Stage {
    /// Each kind's ancestry only depends on kinds earlier in this list.
    pub const ORDER: [Stage; 6] = [
        Stage::Collections,
        Stage::Units,
        Stage::Manifestations,
        Stage::Files,
        Stage::Events,
        Stage::Retrofit,
    ];

    /// The entity kind indexed by this stage, if any.
    pub fn kind(self) -> Option<EntityKind> {
        match self {
            Stage::Collections => Some(EntityKind::Collection),
            Stage::Units => Some(EntityKind::Unit),
            Stage::Manifestations => Some(EntityKind::Manifestation),
            Stage::Files => Some(EntityKind::File),
            Stage::Events => Some(EntityKind::Event),
            Stage::Retrofit => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Collections => "collections",
            Stage::Units => "units",
            Stage::Manifestations => "manifestations",
            Stage::Files => "files",
            Stage::Events => "events",
            Stage::Retrofit => "retrofit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a single [`Session::add`] did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AddReport {
    /// Documents built for entities in the batch.
    pub indexed: usize,
    /// Stored documents outside the batch that were patched.
    pub retrofitted: usize,
    /// Submit calls made to the store.
    pub flushes: usize,
}

impl AddReport {
    pub fn merge(&mut self, other: AddReport) {
        self.indexed += other.indexed;
        self.retrofitted += other.retrofitted;
        self.flushes += other.flushes;
    }
}

pub struct Session<S, C = NoContent, X = XmlFlattener> {
    store: S,
    content: C,
    extractor: X,
    config: IndexerConfig,
    batcher: WriteBatcher,
}

impl<S: DocumentStore> Session<S> {
    /// Open a session with default settings and no file content.
    pub fn open(store: S) -> Self {
        Session::with_parts(
            store,
            NoContent,
            XmlFlattener,
            IndexerConfig::default(),
        )
    }
}

impl<S, C, X> Session<S, C, X>
where
    S: DocumentStore,
    C: ContentSource,
    X: FieldExtractor,
{
    pub fn with_parts(
        store: S,
        content: C,
        extractor: X,
        config: IndexerConfig,
    ) -> Self {
        let batcher = WriteBatcher::new(config.flush_threshold);
        Self {
            store,
            content,
            extractor,
            config,
            batcher,
        }
    }

    /// Swap the source metadata file content is fetched from.
    pub fn with_content<C2: ContentSource>(
        self,
        content: C2,
    ) -> Session<S, C2, X> {
        Session::with_parts(self.store, content, self.extractor, self.config)
    }

    pub fn with_extractor<X2: FieldExtractor>(
        self,
        extractor: X2,
    ) -> Session<S, C, X2> {
        Session::with_parts(self.store, self.content, extractor, self.config)
    }

    pub fn with_config(self, config: IndexerConfig) -> Self {
        Session::with_parts(self.store, self.content, self.extractor, config)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Index one batch.
    ///
    /// Every document built here is submitted before this returns, but none
    /// is committed. On error the unsubmitted remainder is dropped; chunks
    /// already submitted stay staged in the store.
    pub fn add(&mut self, batch: &Batch) -> Result<AddReport> {
        let result = self.run(batch);
        if result.is_err() {
            let dropped = self.batcher.discard();
            if dropped > 0 {
                debug!(dropped, "discarded queued documents after failure");
            }
        }
        result
    }

    fn run(&mut self, batch: &Batch) -> Result<AddReport> {
        if batch.is_empty() {
            debug!("empty batch");
            return Ok(AddReport::default());
        }

        let index = BatchIndex::new(batch);
        let contributions = Contributions::collect(batch);
        let assembler =
            Assembler::new(&self.content, &self.extractor, &self.config);
        let mut resolver = Resolver::new(batch, &self.store);
        let store = &self.store;
        let batcher = &mut self.batcher;
        let flushes_before = batcher.flushes();
        let mut report = AddReport::default();

        for stage in Stage::ORDER {
            let outcome = match stage.kind() {
                Some(kind) => resolver.run(kind).and_then(|()| {
                    for entity in batch.of_kind(kind) {
                        let doc = assembler.assemble(
                            entity,
                            resolver.ancestry(),
                            &contributions,
                        )?;
                        batcher.push(store, doc)?;
                        report.indexed += 1;
                    }
                    Ok(())
                }),
                None => {
                    let plan = RetrofitPlan::new(
                        &index,
                        &contributions,
                        resolver.ancestry(),
                    );
                    plan.apply(store, &assembler, resolver.ancestry(), |doc| {
                        batcher.push(store, doc)
                    })
                    .map(|written| report.retrofitted = written)
                }
            };
            outcome.map_err(|e| Error::indexing(stage.name(), e))?;
            debug!(%stage, queued = batcher.pending(), "stage complete");
        }

        batcher
            .flush(store)
            .map_err(|e| Error::indexing("flush", e))?;
        report.flushes = batcher.flushes() - flushes_before;

        info!(
            entities = batch.len(),
            indexed = report.indexed,
            retrofitted = report.retrofitted,
            flushes = report.flushes,
            "batch added"
        );
        Ok(report)
    }

    /// Delete one document and commit straight away.
    pub fn remove(&mut self, id: &EntityId) -> Result<()> {
        self.store
            .delete(id)
            .and_then(|()| self.store.commit())
            .map_err(|e| Error::indexing("remove", e))?;
        debug!(%id, "removed document");
        Ok(())
    }

    /// Submit anything still queued and commit.
    pub fn close(mut self) -> Result<()> {
        self.batcher
            .flush(&self.store)
            .and_then(|_| self.store.commit())
            .map_err(|e| Error::indexing("close", e))?;
        info!(submitted = self.batcher.submitted(), "session closed");
        Ok(())
    }
}

impl<S, C, X> fmt::Debug for Session<S, C, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("batcher", &self.batcher)
            .finish_non_exhaustive()
    }
}
