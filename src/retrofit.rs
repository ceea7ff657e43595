//! Updating already-indexed documents from a new batch.
//!
//! A batch may carry events, metadata files, or file aggregations that
//! point at entities indexed by an earlier batch. Those stored documents are
//! looked up, copied whole, patched, and resubmitted. Targets that are not
//! in the store yet are skipped.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::{
    ancestry::{Ancestry, extend_unique, push_unique},
    assembler::{Assembler, Contributions},
    document::Document,
    error::Result,
    extract::FieldExtractor,
    model::{BatchIndex, EntityId, Event},
    store::{ContentSource, DocumentStore},
};

#[derive(Debug, Default)]
struct Patch<'a> {
    events: Vec<&'a Event>,
    metadata: Vec<&'a EntityId>,
    manifestations: Vec<EntityId>,
}

/// Every stored document a batch touches, with what it contributes to each.
#[derive(Debug, Default)]
pub struct RetrofitPlan<'a> {
    targets: BTreeMap<EntityId, Patch<'a>>,
}

impl<'a> RetrofitPlan<'a> {
    /// Collect contributions whose target is outside the batch.
    pub fn new(
        index: &BatchIndex<'_>,
        contributions: &Contributions<'a>,
        ancestry: &Ancestry,
    ) -> Self {
        let mut plan = Self::default();

        for (target, events) in contributions.event_targets() {
            if !index.contains(target.as_str()) {
                plan.patch(target).events.extend_from_slice(events);
            }
        }
        for (target, files) in contributions.metadata_targets() {
            if !index.contains(target.as_str()) {
                plan.patch(target).metadata.extend_from_slice(files);
            }
        }
        for (file, manifestations) in ancestry.file_links() {
            if !index.contains(file.as_str()) {
                plan.patch(file)
                    .manifestations
                    .extend_from_slice(manifestations);
            }
        }

        plan
    }

    fn patch(&mut self, target: &EntityId) -> &mut Patch<'a> {
        self.targets.entry(target.clone()).or_default()
    }

    pub fn targets(&self) -> impl Iterator<Item = &EntityId> {
        self.targets.keys()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Patch each stored target and hand changed documents to `emit`.
    ///
    /// Targets are visited in id order with a single lookup each. Returns
    /// the number of documents emitted.
    pub fn apply<S, C, X>(
        &self,
        store: &S,
        assembler: &Assembler<'_, C, X>,
        ancestry: &Ancestry,
        mut emit: impl FnMut(Document) -> Result<()>,
    ) -> Result<usize>
    where
        S: DocumentStore,
        C: ContentSource,
        X: FieldExtractor,
    {
        let mut emitted = 0;
        for (target, patch) in &self.targets {
            let Some(stored) = store.lookup(target)? else {
                trace!(%target, "retrofit target not indexed, skipping");
                continue;
            };

            let mut doc = stored.clone();
            for event in &patch.events {
                doc.apply_event(event);
            }
            assembler.apply_metadata(&mut doc, &patch.metadata)?;
            if !patch.manifestations.is_empty() {
                link_manifestations(&mut doc, &patch.manifestations, ancestry);
            }

            if doc == stored {
                trace!(%target, "retrofit left document unchanged");
                continue;
            }
            emit(doc)?;
            emitted += 1;
        }

        if emitted > 0 {
            debug!(emitted, planned = self.len(), "retrofitted documents");
        }
        Ok(emitted)
    }
}

/// Prepend each aggregating manifestation and its ancestry to a stored
/// file's ancestry, skipping ids already present.
fn link_manifestations(
    doc: &mut Document,
    manifestations: &[EntityId],
    ancestry: &Ancestry,
) {
    let mut merged = Vec::new();
    for manifestation in manifestations {
        push_unique(&mut merged, manifestation);
        if let Some(chain) = ancestry.of(manifestation.as_str()) {
            extend_unique(&mut merged, chain);
        }
    }
    extend_unique(&mut merged, &doc.ancestry());
    doc.set_ancestry(&merged);
}
