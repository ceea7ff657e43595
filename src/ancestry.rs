//! Ancestry resolution for one batch.
//!
//! Kinds are resolved in pipeline order (collections, units,
//! manifestations, files) because each kind splices in the chains computed
//! for the kinds before it. A parent present in the batch is resolved
//! recursively and memoized; a parent outside the batch is looked up in the
//! store and its stored `ancestry` field is spliced in; a parent found in
//! neither place simply ends that chain.
//!
//! Metadata files count as containing what they describe, whether the
//! entity lists them itself or a manifestation declares the file to be
//! metadata for it. Only the file id is added, never the file's own chain.
//!
//! Insertion is add-if-absent per entity, which keeps each list free of
//! duplicates. There is no cycle check across entities: a parent chain that
//! loops back on itself recurses without bound.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::{
    error::Result,
    model::{
        Batch, BatchIndex, Collection, EntityId, EntityKind, EntityRef, Manifestation,
        RelationKind, Unit,
    },
    store::DocumentStore,
};

pub(crate) fn push_unique(list: &mut Vec<EntityId>, id: &EntityId) {
    if !list.contains(id) {
        list.push(id.clone());
    }
}

pub(crate) fn extend_unique(list: &mut Vec<EntityId>, ids: &[EntityId]) {
    for id in ids {
        push_unique(list, id);
    }
}

/// Resolved ancestry for one batch.
#[derive(Debug, Default, Clone)]
pub struct Ancestry {
    map: HashMap<EntityId, Vec<EntityId>>,
    /// File id -> manifestations in this batch that aggregate it.
    file_links: BTreeMap<EntityId, Vec<EntityId>>,
}

impl Ancestry {
    /// The ancestor list of an entity resolved in this batch.
    pub fn of(&self, id: &str) -> Option<&[EntityId]> {
        self.map.get(id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Manifestations in this batch that aggregate `file`, in batch order.
    pub fn manifestations_of(&self, file: &str) -> &[EntityId] {
        self.file_links.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every aggregated file id with its aggregating manifestations.
    pub fn file_links(&self) -> impl Iterator<Item = (&EntityId, &[EntityId])> {
        self.file_links.iter().map(|(f, ms)| (f, ms.as_slice()))
    }
}

pub struct Resolver<'a, S> {
    batch: &'a Batch,
    index: BatchIndex<'a>,
    store: &'a S,
    ancestry: Ancestry,
    /// Stored ancestry fetched during this batch, `None` when not found.
    stored: HashMap<EntityId, Option<Vec<EntityId>>>,
    /// Described entity -> files declared as its metadata by a manifestation.
    described: HashMap<&'a EntityId, Vec<&'a EntityId>>,
}

impl<'a, S: DocumentStore> Resolver<'a, S> {
    pub fn new(batch: &'a Batch, store: &'a S) -> Self {
        let mut described: HashMap<&'a EntityId, Vec<&'a EntityId>> = HashMap::new();
        for manifestation in &batch.manifestations {
            for relation in EntityRef::Manifestation(manifestation).relations() {
                if relation.kind == RelationKind::IsMetadataFor {
                    let files = described.entry(relation.target).or_default();
                    if !files.contains(&relation.source) {
                        files.push(relation.source);
                    }
                }
            }
        }

        Self {
            batch,
            index: BatchIndex::new(batch),
            store,
            ancestry: Ancestry::default(),
            stored: HashMap::new(),
            described,
        }
    }

    /// Resolve every kind in pipeline order.
    pub fn resolve(batch: &'a Batch, store: &'a S) -> Result<Ancestry> {
        let mut resolver = Self::new(batch, store);
        for kind in EntityKind::ALL {
            resolver.run(kind)?;
        }
        Ok(resolver.finish())
    }

    /// Run one stage. Events have no ancestry of their own.
    pub fn run(&mut self, kind: EntityKind) -> Result<()> {
        match kind {
            EntityKind::Collection => self.collections(),
            EntityKind::Unit => self.units(),
            EntityKind::Manifestation => self.manifestations(),
            EntityKind::File => self.files(),
            EntityKind::Event => Ok(()),
        }
    }

    /// The ancestry resolved so far.
    pub fn ancestry(&self) -> &Ancestry {
        &self.ancestry
    }

    pub fn finish(self) -> Ancestry {
        self.ancestry
    }

    fn collections(&mut self) -> Result<()> {
        let batch = self.batch;
        for collection in &batch.collections {
            self.resolve_collection(collection)?;
        }
        Ok(())
    }

    fn units(&mut self) -> Result<()> {
        let batch = self.batch;
        for unit in &batch.units {
            self.resolve_unit(unit)?;
        }
        Ok(())
    }

    fn manifestations(&mut self) -> Result<()> {
        let batch = self.batch;
        for manifestation in &batch.manifestations {
            self.resolve_manifestation(manifestation)?;
            for relation in EntityRef::Manifestation(manifestation).relations() {
                if relation.kind == RelationKind::AggregatesFile {
                    let links = self
                        .ancestry
                        .file_links
                        .entry(relation.target.clone())
                        .or_default();
                    push_unique(links, relation.source);
                }
            }
        }
        Ok(())
    }

    fn files(&mut self) -> Result<()> {
        let batch = self.batch;
        for file in &batch.files {
            let mut list = Vec::new();
            for manifestation in self.ancestry.manifestations_of(file.id.as_str())
            {
                push_unique(&mut list, manifestation);
                if let Some(chain) = self.ancestry.of(manifestation.as_str()) {
                    extend_unique(&mut list, chain);
                }
            }
            for relation in EntityRef::File(file).relations() {
                if relation.kind == RelationKind::HasMetadataRef {
                    push_unique(&mut list, relation.target);
                }
            }
            self.push_described(&mut list, &file.id);
            self.ancestry.map.insert(file.id.clone(), list);
        }
        Ok(())
    }

    fn resolve_collection(
        &mut self,
        collection: &'a Collection,
    ) -> Result<Vec<EntityId>> {
        if let Some(done) = self.ancestry.map.get(&collection.id) {
            return Ok(done.clone());
        }

        let mut list = Vec::new();
        for relation in EntityRef::Collection(collection).relations() {
            if relation.kind == RelationKind::ParentOf {
                push_unique(&mut list, relation.target);
                let chain = self.collection_chain(relation.target)?;
                extend_unique(&mut list, &chain);
            }
        }

        self.ancestry.map.insert(collection.id.clone(), list.clone());
        Ok(list)
    }

    fn resolve_unit(&mut self, unit: &'a Unit) -> Result<Vec<EntityId>> {
        if let Some(done) = self.ancestry.map.get(&unit.id) {
            return Ok(done.clone());
        }

        let mut list = Vec::new();
        for relation in EntityRef::Unit(unit).relations() {
            let chain = match relation.kind {
                RelationKind::MemberOf => self.collection_chain(relation.target)?,
                RelationKind::SuccessorParentOf => self.unit_chain(relation.target)?,
                RelationKind::HasMetadataRef => Vec::new(),
                _ => continue,
            };
            push_unique(&mut list, relation.target);
            extend_unique(&mut list, &chain);
        }
        self.push_described(&mut list, &unit.id);

        self.ancestry.map.insert(unit.id.clone(), list.clone());
        Ok(list)
    }

    fn resolve_manifestation(
        &mut self,
        manifestation: &'a Manifestation,
    ) -> Result<Vec<EntityId>> {
        if let Some(done) = self.ancestry.map.get(&manifestation.id) {
            return Ok(done.clone());
        }

        let mut list = Vec::new();
        for relation in EntityRef::Manifestation(manifestation).relations() {
            if relation.kind == RelationKind::ManifestationOfUnit {
                push_unique(&mut list, relation.target);
                let chain = self.unit_chain(relation.target)?;
                extend_unique(&mut list, &chain);
            }
        }

        self.ancestry
            .map
            .insert(manifestation.id.clone(), list.clone());
        Ok(list)
    }

    fn push_described(&self, list: &mut Vec<EntityId>, id: &EntityId) {
        for file in self.described.get(id).into_iter().flatten() {
            push_unique(list, file);
        }
    }

    fn collection_chain(&mut self, id: &EntityId) -> Result<Vec<EntityId>> {
        match self.index.collection(id.as_str()) {
            Some(collection) => self.resolve_collection(collection),
            None => self.stored_ancestry(id),
        }
    }

    fn unit_chain(&mut self, id: &EntityId) -> Result<Vec<EntityId>> {
        match self.index.unit(id.as_str()) {
            Some(unit) => self.resolve_unit(unit),
            None => self.stored_ancestry(id),
        }
    }

    fn stored_ancestry(&mut self, id: &EntityId) -> Result<Vec<EntityId>> {
        if let Some(cached) = self.stored.get(id) {
            return Ok(cached.clone().unwrap_or_default());
        }

        let found = self.store.lookup(id)?.map(|doc| doc.ancestry());
        if found.is_none() {
            trace!(%id, "dangling reference ends ancestry chain");
        }
        self.stored.insert(id.clone(), found.clone());
        Ok(found.unwrap_or_default())
    }
}
