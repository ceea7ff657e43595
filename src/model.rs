//! Archival entities, their relation edges, and the batch that carries them.
//!
//! Relations are owned by the entity that declares them: a unit lists the
//! collections it is a member of, a manifestation lists the files it
//! aggregates, an event lists its targets. Nothing here has behavior beyond
//! structural access.

use std::{borrow::Borrow, collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-assigned, globally unique entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The five archival entity kinds, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Collection,
    Unit,
    Manifestation,
    File,
    Event,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Collection,
        EntityKind::Unit,
        EntityKind::Manifestation,
        EntityKind::File,
        EntityKind::Event,
    ];

    /// Discriminator written to the `kind` field of stored documents.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Collection => "collection",
            EntityKind::Unit => "unit",
            EntityKind::Manifestation => "manifestation",
            EntityKind::File => "file",
            EntityKind::Event => "event",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: EntityId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Parent collection (ParentOf).
    #[serde(default)]
    pub parent: Option<EntityId>,
    /// Files whose content describes this collection (HasMetadataRef).
    #[serde(default)]
    pub metadata: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: EntityId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    /// Collections this unit is a member of (MemberOf).
    #[serde(default)]
    pub collections: Vec<EntityId>,
    /// Units this unit succeeds (SuccessorParentOf).
    #[serde(default)]
    pub predecessors: Vec<EntityId>,
    #[serde(default)]
    pub metadata: Vec<EntityId>,
}

/// One AggregatesFile edge, with its optional "is-metadata-for" targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAggregation {
    pub file: EntityId,
    #[serde(default)]
    pub metadata_for: Vec<EntityId>,
}

impl FileAggregation {
    pub fn new(file: impl Into<EntityId>) -> Self {
        Self {
            file: file.into(),
            metadata_for: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifestation {
    pub id: EntityId,
    #[serde(default)]
    pub label: Option<String>,
    /// Owning unit (ManifestationOfUnit).
    pub unit: EntityId,
    #[serde(default)]
    pub files: Vec<FileAggregation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: EntityId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub metadata: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EntityId,
    pub event_type: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    /// Entities this event happened to (EventTargets).
    #[serde(default)]
    pub targets: Vec<EntityId>,
}

/// Typed relation edges between entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    ParentOf,
    MemberOf,
    SuccessorParentOf,
    ManifestationOfUnit,
    AggregatesFile,
    /// Sub-relation of AggregatesFile: the file describes the target.
    IsMetadataFor,
    HasMetadataRef,
    EventTargets,
}

/// A directed edge from `source` to `target`.
///
/// `source` is the declaring entity for every kind except
/// [`RelationKind::IsMetadataFor`], whose source is the aggregated file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation<'a> {
    pub kind: RelationKind,
    pub source: &'a EntityId,
    pub target: &'a EntityId,
}

/// A borrowed view over any one entity of a batch.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Collection(&'a Collection),
    Unit(&'a Unit),
    Manifestation(&'a Manifestation),
    File(&'a File),
    Event(&'a Event),
}

impl<'a> EntityRef<'a> {
    pub fn id(&self) -> &'a EntityId {
        match *self {
            EntityRef::Collection(c) => &c.id,
            EntityRef::Unit(u) => &u.id,
            EntityRef::Manifestation(m) => &m.id,
            EntityRef::File(f) => &f.id,
            EntityRef::Event(e) => &e.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Collection(_) => EntityKind::Collection,
            EntityRef::Unit(_) => EntityKind::Unit,
            EntityRef::Manifestation(_) => EntityKind::Manifestation,
            EntityRef::File(_) => EntityKind::File,
            EntityRef::Event(_) => EntityKind::Event,
        }
    }

    /// Metadata files this entity declares for itself.
    pub fn metadata_refs(&self) -> &'a [EntityId] {
        match *self {
            EntityRef::Collection(c) => &c.metadata,
            EntityRef::Unit(u) => &u.metadata,
            EntityRef::File(f) => &f.metadata,
            EntityRef::Manifestation(_) | EntityRef::Event(_) => &[],
        }
    }

    /// Every outgoing relation edge, in declaration order.
    pub fn relations(&self) -> Vec<Relation<'a>> {
        let source = self.id();
        let edge = |kind, target| Relation {
            kind,
            source,
            target,
        };
        let mut out = Vec::new();
        match *self {
            EntityRef::Collection(c) => {
                out.extend(
                    c.parent.iter().map(|p| edge(RelationKind::ParentOf, p)),
                );
            }
            EntityRef::Unit(u) => {
                out.extend(
                    u.collections
                        .iter()
                        .map(|c| edge(RelationKind::MemberOf, c)),
                );
                out.extend(
                    u.predecessors
                        .iter()
                        .map(|p| edge(RelationKind::SuccessorParentOf, p)),
                );
            }
            EntityRef::Manifestation(m) => {
                out.push(edge(RelationKind::ManifestationOfUnit, &m.unit));
                for agg in &m.files {
                    out.push(edge(RelationKind::AggregatesFile, &agg.file));
                    out.extend(agg.metadata_for.iter().map(|target| Relation {
                        kind: RelationKind::IsMetadataFor,
                        source: &agg.file,
                        target,
                    }));
                }
            }
            EntityRef::File(_) => {}
            EntityRef::Event(e) => {
                out.extend(
                    e.targets.iter().map(|t| edge(RelationKind::EventTargets, t)),
                );
            }
        }
        out.extend(
            self.metadata_refs()
                .iter()
                .map(|f| edge(RelationKind::HasMetadataRef, f)),
        );
        out
    }
}

/// One call's worth of entities submitted together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub units: Vec<Unit>,
    #[serde(default)]
    pub manifestations: Vec<Manifestation>,
    #[serde(default)]
    pub files: Vec<File>,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.collections.len()
            + self.units.len()
            + self.manifestations.len()
            + self.files.len()
            + self.events.len()
    }

    /// Entities of one kind, in batch order.
    pub fn of_kind(&self, kind: EntityKind) -> Vec<EntityRef<'_>> {
        match kind {
            EntityKind::Collection => {
                self.collections.iter().map(EntityRef::Collection).collect()
            }
            EntityKind::Unit => self.units.iter().map(EntityRef::Unit).collect(),
            EntityKind::Manifestation => self
                .manifestations
                .iter()
                .map(EntityRef::Manifestation)
                .collect(),
            EntityKind::File => self.files.iter().map(EntityRef::File).collect(),
            EntityKind::Event => {
                self.events.iter().map(EntityRef::Event).collect()
            }
        }
    }

    /// All entities, kinds in pipeline order.
    pub fn entities(&self) -> impl Iterator<Item = EntityRef<'_>> {
        EntityKind::ALL
            .into_iter()
            .flat_map(move |kind| self.of_kind(kind))
    }
}

/// Id lookup restricted to one batch.
#[derive(Debug, Default)]
pub struct BatchIndex<'a> {
    by_id: HashMap<&'a str, EntityRef<'a>>,
}

impl<'a> BatchIndex<'a> {
    pub fn new(batch: &'a Batch) -> Self {
        let by_id = batch
            .entities()
            .map(|entity| (entity.id().as_str(), entity))
            .collect();
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Option<EntityRef<'a>> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn collection(&self, id: &str) -> Option<&'a Collection> {
        match self.get(id)? {
            EntityRef::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn unit(&self, id: &str) -> Option<&'a Unit> {
        match self.get(id)? {
            EntityRef::Unit(u) => Some(u),
            _ => None,
        }
    }

    pub fn manifestation(&self, id: &str) -> Option<&'a Manifestation> {
        match self.get(id)? {
            EntityRef::Manifestation(m) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch() -> Batch {
        Batch {
            collections: vec![Collection {
                id: "c1".into(),
                title: Some("Fonds".into()),
                description: None,
                parent: Some("c0".into()),
                metadata: vec!["f-md".into()],
            }],
            manifestations: vec![Manifestation {
                id: "m1".into(),
                label: None,
                unit: "u1".into(),
                files: vec![FileAggregation {
                    file: "f1".into(),
                    metadata_for: vec!["u1".into()],
                }],
            }],
            ..Batch::default()
        }
    }

    #[test]
    fn kind_roundtrips_through_discriminator() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("folder"), None);
    }

    #[test]
    fn collection_relations() {
        let batch = sample_batch();
        let rels = EntityRef::Collection(&batch.collections[0]).relations();
        let kinds: Vec<_> = rels.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![RelationKind::ParentOf, RelationKind::HasMetadataRef]
        );
        assert_eq!(rels[0].target.as_str(), "c0");
    }

    #[test]
    fn manifestation_relations_include_metadata_sub_relation() {
        let batch = sample_batch();
        let rels =
            EntityRef::Manifestation(&batch.manifestations[0]).relations();
        let kinds: Vec<_> = rels.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RelationKind::ManifestationOfUnit,
                RelationKind::AggregatesFile,
                RelationKind::IsMetadataFor,
            ]
        );
        assert_eq!(rels[1].source.as_str(), "m1");
        assert_eq!(rels[2].source.as_str(), "f1");
        assert_eq!(rels[2].target.as_str(), "u1");
    }

    #[test]
    fn batch_index_lookups_are_kind_checked() {
        let batch = sample_batch();
        let index = BatchIndex::new(&batch);
        assert!(index.contains("c1"));
        assert!(index.collection("c1").is_some());
        assert!(index.unit("c1").is_none());
        assert!(index.manifestation("m1").is_some());
        assert!(!index.contains("u1"));
    }

    #[test]
    fn entities_follow_pipeline_order() {
        let mut batch = sample_batch();
        batch.events.push(Event {
            id: "e1".into(),
            event_type: "ingest".into(),
            date: DateTime::from_timestamp(0, 0).unwrap(),
            outcome: None,
            detail: None,
            targets: vec!["c1".into()],
        });
        let kinds: Vec<_> = batch.entities().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                EntityKind::Collection,
                EntityKind::Manifestation,
                EntityKind::Event
            ]
        );
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn batch_deserializes_with_missing_lists() {
        let json = r#"{
            "units": [{"id": "u1", "collections": ["c1"]}],
            "events": [{
                "id": "e1",
                "event_type": "Fixity Check",
                "date": "2024-03-01T10:00:00Z",
                "targets": ["u1"]
            }]
        }"#;
        let batch: Batch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.units[0].collections, vec![EntityId::from("c1")]);
        assert!(batch.units[0].title.is_none());
        assert!(batch.collections.is_empty());
        assert_eq!(batch.events[0].event_type, "Fixity Check");
    }
}
