//! Building store documents from batch entities.
//!
//! Each entity contributes its own typed fields and the ancestry resolved
//! for it. Events and metadata files in the same batch contribute fields to
//! the entities they point at.

use std::collections::BTreeMap;

use tracing::trace;

use crate::{
    ancestry::Ancestry,
    config_db::IndexerConfig,
    document::{Document, fields},
    error::Result,
    extract::FieldExtractor,
    model::{Batch, EntityId, EntityKind, EntityRef, Event, RelationKind},
    store::ContentSource,
};

/// Events and metadata files of one batch, grouped by the entity they
/// contribute to. Both lists keep batch order.
#[derive(Debug, Default)]
pub struct Contributions<'a> {
    events: BTreeMap<&'a EntityId, Vec<&'a Event>>,
    metadata: BTreeMap<&'a EntityId, Vec<&'a EntityId>>,
}

impl<'a> Contributions<'a> {
    pub fn collect(batch: &'a Batch) -> Self {
        let mut out = Self::default();

        for entity in batch.entities() {
            for relation in entity.relations() {
                match (relation.kind, entity) {
                    (RelationKind::EventTargets, EntityRef::Event(event)) => {
                        out.events.entry(relation.target).or_default().push(event);
                    }
                    (RelationKind::HasMetadataRef, _) => {
                        out.add_metadata(relation.source, relation.target);
                    }
                    (RelationKind::IsMetadataFor, _) => {
                        out.add_metadata(relation.target, relation.source);
                    }
                    _ => {}
                }
            }
        }

        out
    }

    fn add_metadata(&mut self, target: &'a EntityId, file: &'a EntityId) {
        let files = self.metadata.entry(target).or_default();
        if !files.contains(&file) {
            files.push(file);
        }
    }

    pub fn events_for(&self, id: &EntityId) -> &[&'a Event] {
        self.events.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn metadata_for(&self, id: &EntityId) -> &[&'a EntityId] {
        self.metadata.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entities that receive event fields, with their events.
    pub fn event_targets(
        &self,
    ) -> impl Iterator<Item = (&'a EntityId, &[&'a Event])> {
        self.events.iter().map(|(t, es)| (*t, es.as_slice()))
    }

    /// Entities that receive metadata fields, with their metadata files.
    pub fn metadata_targets(
        &self,
    ) -> impl Iterator<Item = (&'a EntityId, &[&'a EntityId])> {
        self.metadata.iter().map(|(t, fs)| (*t, fs.as_slice()))
    }
}

/// The entity's own fields, without ancestry or contributions.
pub fn entity_document(entity: EntityRef<'_>) -> Document {
    let mut doc = Document::new(entity.id(), entity.kind());
    match entity {
        EntityRef::Collection(c) => {
            doc.set_nullable(fields::TITLE, c.title.as_ref());
            doc.set_nullable(fields::DESCRIPTION, c.description.as_ref());
            doc.set_nullable(fields::PARENT_ID, c.parent.as_ref());
            doc.set_all(fields::METADATA_IDS, &c.metadata);
        }
        EntityRef::Unit(u) => {
            doc.set_nullable(fields::TITLE, u.title.as_ref());
            doc.set_nullable(fields::DESCRIPTION, u.description.as_ref());
            doc.set_nullable(fields::LEVEL, u.level.as_ref());
            doc.set_all(fields::COLLECTION_IDS, &u.collections);
            doc.set_all(fields::PREDECESSOR_IDS, &u.predecessors);
            doc.set_all(fields::METADATA_IDS, &u.metadata);
        }
        EntityRef::Manifestation(m) => {
            doc.set_nullable(fields::LABEL, m.label.as_ref());
            doc.set(fields::UNIT_ID, &m.unit);
            doc.set_all(fields::FILE_IDS, m.files.iter().map(|a| &a.file));
        }
        EntityRef::File(f) => {
            doc.set_nullable(fields::NAME, f.name.as_ref());
            doc.set_nullable(fields::MIME_TYPE, f.mime_type.as_ref());
            doc.set_nullable(fields::SIZE, f.size);
            doc.set_nullable(fields::CHECKSUM, f.checksum.as_ref());
            doc.set_all(fields::METADATA_IDS, &f.metadata);
        }
        EntityRef::Event(e) => {
            doc.set(fields::TYPE, &e.event_type);
            doc.set(fields::DATE, e.date);
            doc.set_nullable(fields::OUTCOME, e.outcome.as_ref());
            doc.set_nullable(fields::DETAIL, e.detail.as_ref());
            doc.set_all(fields::TARGET_IDS, &e.targets);
        }
    }
    doc
}

pub struct Assembler<'a, C, X> {
    content: &'a C,
    extractor: &'a X,
    config: &'a IndexerConfig,
}

impl<'a, C: ContentSource, X: FieldExtractor> Assembler<'a, C, X> {
    pub fn new(content: &'a C, extractor: &'a X, config: &'a IndexerConfig) -> Self {
        Self {
            content,
            extractor,
            config,
        }
    }

    /// Build the complete document for one batch entity.
    pub fn assemble(
        &self,
        entity: EntityRef<'_>,
        ancestry: &Ancestry,
        contributions: &Contributions<'_>,
    ) -> Result<Document> {
        let id = entity.id();
        let mut doc = entity_document(entity);

        if entity.kind() != EntityKind::Event {
            doc.set_ancestry(ancestry.of(id.as_str()).unwrap_or(&[]));
        }
        for event in contributions.events_for(id) {
            doc.apply_event(event);
        }
        self.apply_metadata(&mut doc, contributions.metadata_for(id))?;

        Ok(doc)
    }

    /// Fetch, flatten, and append each metadata file's content.
    ///
    /// Files with no content in the archive are skipped. Fetch or
    /// extraction failures are returned as-is. Returns how many files were
    /// applied.
    pub fn apply_metadata(
        &self,
        doc: &mut Document,
        files: &[&EntityId],
    ) -> Result<usize> {
        let mut applied = 0;
        for file in files {
            if doc.has_metadata_from(file) {
                continue;
            }
            let Some(mut content) = self.content.fetch(file)? else {
                trace!(%file, "metadata file has no content");
                continue;
            };
            let extracted = self.extractor.extract(
                file,
                &self.config.metadata_prefix,
                &self.config.metadata_text_field,
                &mut *content,
            )?;
            if doc.apply_metadata(file, &extracted) {
                applied += 1;
            }
        }
        Ok(applied)
    }
}
