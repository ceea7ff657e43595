//! The flattened, store-resident form of one entity.
//!
//! A [`Document`] is a map from field name to an ordered list of values.
//! Stores replace documents wholesale, so every patch in this crate starts
//! from a full copy of the stored field set.

use std::{
    collections::{BTreeMap, btree_map},
    fmt,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{EntityId, EntityKind, Event},
};

/// Field names written by the indexer.
pub mod fields {
    pub const ID: &str = "id";
    pub const KIND: &str = "kind";
    pub const ANCESTRY: &str = "ancestry";

    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const LEVEL: &str = "level";
    pub const LABEL: &str = "label";
    pub const NAME: &str = "name";
    pub const MIME_TYPE: &str = "mime_type";
    pub const SIZE: &str = "size";
    pub const CHECKSUM: &str = "checksum";
    pub const TYPE: &str = "type";
    pub const DATE: &str = "date";
    pub const OUTCOME: &str = "outcome";
    pub const DETAIL: &str = "detail";

    pub const PARENT_ID: &str = "parent_id";
    pub const COLLECTION_IDS: &str = "collection_ids";
    pub const PREDECESSOR_IDS: &str = "predecessor_ids";
    pub const UNIT_ID: &str = "unit_id";
    pub const FILE_IDS: &str = "file_ids";
    pub const METADATA_IDS: &str = "metadata_ids";
    pub const TARGET_IDS: &str = "target_ids";

    pub const EVENT_ID: &str = "event_id";
    pub const EVENT_TYPE: &str = "event_type";
    pub const EVENT_DATE: &str = "event_date";
    pub const EVENT_OUTCOME: &str = "event_outcome";
    pub const EVENT_DETAIL: &str = "event_detail";
    /// Prefix of the per-type dynamic date field, e.g. `event_date_ingest`.
    pub const EVENT_DATE_PREFIX: &str = "event_date_";

    /// Files whose extracted content has been applied to the document.
    pub const METADATA_FILE_IDS: &str = "metadata_file_ids";

    /// Suffix of the companion boolean written for every nullable field.
    pub const NULL_SUFFIX: &str = "_is_null";

    /// Every fixed field name above.
    pub const CORE: [&str; 28] = [
        ID,
        KIND,
        ANCESTRY,
        TITLE,
        DESCRIPTION,
        LEVEL,
        LABEL,
        NAME,
        MIME_TYPE,
        SIZE,
        CHECKSUM,
        TYPE,
        DATE,
        OUTCOME,
        DETAIL,
        PARENT_ID,
        COLLECTION_IDS,
        PREDECESSOR_IDS,
        UNIT_ID,
        FILE_IDS,
        METADATA_IDS,
        TARGET_IDS,
        EVENT_ID,
        EVENT_TYPE,
        EVENT_DATE,
        EVENT_OUTCOME,
        EVENT_DETAIL,
        METADATA_FILE_IDS,
    ];

    /// Names only the indexer itself may write. Covers the core fields,
    /// per-type event dates and null companions.
    pub fn is_reserved(name: &str) -> bool {
        name.is_empty()
            || CORE.contains(&name)
            || name.starts_with(EVENT_DATE_PREFIX)
            || name.ends_with(NULL_SUFFIX)
    }
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Date(DateTime<Utc>),
    Bool(bool),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Date(d) => f.write_str(&d.to_rfc3339()),
            FieldValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<&String> for FieldValue {
    fn from(s: &String) -> Self {
        FieldValue::Str(s.clone())
    }
}

impl From<&EntityId> for FieldValue {
    fn from(id: &EntityId) -> Self {
        FieldValue::Str(id.as_str().to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<u64> for FieldValue {
    fn from(u: u64) -> Self {
        FieldValue::Int(i64::try_from(u).unwrap_or(i64::MAX))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(d: DateTime<Utc>) -> Self {
        FieldValue::Date(d)
    }
}

/// Name of the dynamic date field for an event type.
///
/// The type is lower-cased and anything outside `[a-z0-9]` becomes `_`.
///
/// # Examples
///
/// ```
/// use archindex::document::event_date_field;
///
/// assert_eq!(event_date_field("Fixity Check"), "event_date_fixity_check");
/// ```
pub fn event_date_field(event_type: &str) -> String {
    let normalized: String = event_type
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{normalized}", fields::EVENT_DATE_PREFIX)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, Vec<FieldValue>>,
}

impl Document {
    /// An empty document carrying only its identity fields.
    pub fn new(id: &EntityId, kind: EntityKind) -> Self {
        let mut doc = Self::default();
        doc.set(fields::ID, id);
        doc.set(fields::KIND, kind.as_str());
        doc
    }

    pub fn from_fields(fields: BTreeMap<String, Vec<FieldValue>>) -> Self {
        Self { fields }
    }

    /// The document id, or `None` if the field is missing.
    pub fn id(&self) -> Option<&str> {
        self.first_str(fields::ID)
    }

    /// The document id; a missing id is a parse error.
    pub fn entity_id(&self) -> Result<EntityId> {
        self.id().map(EntityId::from).ok_or_else(|| Error::Parse {
            id: "<unknown>".to_string(),
            reason: "missing id field".to_string(),
        })
    }

    /// The entity kind discriminator; missing or unknown is a parse error.
    pub fn kind(&self) -> Result<EntityKind> {
        let id = self.id().unwrap_or("<unknown>");
        let raw = self.first_str(fields::KIND).ok_or_else(|| Error::Parse {
            id: id.to_string(),
            reason: "missing kind field".to_string(),
        })?;
        EntityKind::parse(raw).ok_or_else(|| Error::Parse {
            id: id.to_string(),
            reason: format!("unknown kind '{raw}'"),
        })
    }

    pub fn get(&self, name: &str) -> &[FieldValue] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn first_str(&self, name: &str) -> Option<&str> {
        self.get(name).first().and_then(FieldValue::as_str)
    }

    /// All string values of a field, in order.
    pub fn strings(&self, name: &str) -> Vec<&str> {
        self.get(name).iter().filter_map(FieldValue::as_str).collect()
    }

    pub fn contains_str(&self, name: &str, value: &str) -> bool {
        self.get(name).iter().any(|v| v.as_str() == Some(value))
    }

    /// Replace every value of `name` with `value`.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), vec![value.into()]);
    }

    /// Append `value` to `name`.
    pub fn push(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields
            .entry(name.to_string())
            .or_default()
            .push(value.into());
    }

    /// Replace `name` with a list of values. An empty list keeps the key.
    pub fn set_all<V: Into<FieldValue>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) {
        let values = values.into_iter().map(Into::into).collect();
        self.fields.insert(name.to_string(), values);
    }

    pub fn clear(&mut self, name: &str) -> Option<Vec<FieldValue>> {
        self.fields.remove(name)
    }

    /// Write a nullable field together with its `<name>_is_null` companion.
    pub fn set_nullable<V: Into<FieldValue>>(
        &mut self,
        name: &str,
        value: Option<V>,
    ) {
        let null_field = format!("{name}{}", fields::NULL_SUFFIX);
        match value {
            Some(v) => {
                self.set(name, v);
                self.set(&null_field, false);
            }
            None => {
                self.clear(name);
                self.set(&null_field, true);
            }
        }
    }

    /// Append one entry to a multi-valued nullable field.
    ///
    /// The `<name>_is_null` companion gets one value per entry, so its
    /// positions line up with the other per-entry fields even where `name`
    /// itself was skipped.
    pub fn push_nullable<V: Into<FieldValue>>(&mut self, name: &str, value: Option<V>) {
        let null_field = format!("{name}{}", fields::NULL_SUFFIX);
        self.push(&null_field, value.is_none());
        if let Some(v) = value {
            self.push(name, v);
        }
    }

    /// Values of a field written with [`Document::push_nullable`], one per
    /// entry, with `None` where the entry was null.
    pub fn nullable_values(&self, name: &str) -> Vec<Option<&FieldValue>> {
        let mut values = self.get(name).iter();
        self.get(&format!("{name}{}", fields::NULL_SUFFIX))
            .iter()
            .map(|null| match null.as_bool() {
                Some(false) => values.next(),
                _ => None,
            })
            .collect()
    }

    /// `Some(true)` if the field was written as null, `None` if it was never
    /// written at all.
    pub fn is_null(&self, name: &str) -> Option<bool> {
        self.get(&format!("{name}{}", fields::NULL_SUFFIX))
            .first()
            .and_then(FieldValue::as_bool)
    }

    pub fn ancestry(&self) -> Vec<EntityId> {
        self.strings(fields::ANCESTRY)
            .into_iter()
            .map(EntityId::from)
            .collect()
    }

    pub fn set_ancestry(&mut self, ancestry: &[EntityId]) {
        self.set_all(fields::ANCESTRY, ancestry);
    }

    /// Append an event's fields and refresh its per-type date field.
    ///
    /// The dynamic field is cleared then set, so it holds at most one value.
    /// An event already recorded in `event_id` only refreshes that field.
    pub fn apply_event(&mut self, event: &Event) {
        if !self.contains_str(fields::EVENT_ID, event.id.as_str()) {
            self.push(fields::EVENT_ID, &event.id);
            self.push(fields::EVENT_TYPE, &event.event_type);
            self.push(fields::EVENT_DATE, event.date);
            self.push_nullable(fields::EVENT_OUTCOME, event.outcome.as_ref());
            self.push_nullable(fields::EVENT_DETAIL, event.detail.as_ref());
        }

        let dynamic = event_date_field(&event.event_type);
        self.clear(&dynamic);
        self.set(&dynamic, event.date);
    }

    pub fn has_metadata_from(&self, file: &EntityId) -> bool {
        self.contains_str(fields::METADATA_FILE_IDS, file.as_str())
    }

    /// Append fields extracted from a metadata file.
    ///
    /// Returns `false` without touching the document if `file` was already
    /// applied. Extracted names that are [reserved](fields::is_reserved) are
    /// dropped.
    pub fn apply_metadata(
        &mut self,
        file: &EntityId,
        extracted: &BTreeMap<String, String>,
    ) -> bool {
        if self.has_metadata_from(file) {
            return false;
        }
        for (name, value) in extracted {
            if !fields::is_reserved(name) {
                self.push(name, value);
            }
        }
        self.push(fields::METADATA_FILE_IDS, file);
        true
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<FieldValue>> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, event_type: &str, secs: i64) -> Event {
        Event {
            id: id.into(),
            event_type: event_type.to_string(),
            date: DateTime::from_timestamp(secs, 0).unwrap(),
            outcome: Some(format!("{id}-ok")),
            detail: None,
            targets: vec![],
        }
    }

    #[test]
    fn new_sets_identity() {
        let doc = Document::new(&"u1".into(), EntityKind::Unit);
        assert_eq!(doc.id(), Some("u1"));
        assert_eq!(doc.kind().unwrap(), EntityKind::Unit);
    }

    #[test]
    fn missing_kind_is_parse_error() {
        let mut doc = Document::default();
        doc.set(fields::ID, "x");
        let err = doc.kind().unwrap_err();
        assert!(matches!(err, Error::Parse { ref id, .. } if id == "x"));
    }

    #[test]
    fn nullable_fields_distinguish_null_from_absent() {
        let mut doc = Document::new(&"c1".into(), EntityKind::Collection);
        doc.set_nullable::<&str>(fields::TITLE, None);
        doc.set_nullable(fields::DESCRIPTION, Some("About"));

        assert_eq!(doc.is_null(fields::TITLE), Some(true));
        assert!(!doc.contains(fields::TITLE));
        assert_eq!(doc.is_null(fields::DESCRIPTION), Some(false));
        assert_eq!(doc.first_str(fields::DESCRIPTION), Some("About"));
        assert_eq!(doc.is_null(fields::LEVEL), None);
    }

    #[test]
    fn event_outcomes_stay_aligned_with_event_ids() {
        let mut doc = Document::new(&"u1".into(), EntityKind::Unit);
        let mut first = event("E1", "ingest", 10);
        first.outcome = None;
        let mut second = event("E2", "ingest", 20);
        second.detail = Some("checked".into());
        doc.apply_event(&first);
        doc.apply_event(&second);

        assert_eq!(doc.strings(fields::EVENT_ID), vec!["E1", "E2"]);
        assert_eq!(doc.strings(fields::EVENT_OUTCOME), vec!["E2-ok"]);
        let outcomes: Vec<_> = doc
            .nullable_values(fields::EVENT_OUTCOME)
            .into_iter()
            .map(|v| v.and_then(FieldValue::as_str))
            .collect();
        assert_eq!(outcomes, vec![None, Some("E2-ok")]);
        let details: Vec<_> = doc
            .nullable_values(fields::EVENT_DETAIL)
            .into_iter()
            .map(|v| v.and_then(FieldValue::as_str))
            .collect();
        assert_eq!(details, vec![None, Some("checked")]);
    }

    #[test]
    fn reapplied_event_adds_no_null_markers() {
        let mut doc = Document::new(&"u1".into(), EntityKind::Unit);
        doc.apply_event(&event("E1", "ingest", 10));
        doc.apply_event(&event("E1", "ingest", 10));
        assert_eq!(doc.get("event_outcome_is_null").len(), 1);
        assert_eq!(doc.get("event_detail_is_null").len(), 1);
    }

    #[test]
    fn metadata_cannot_overwrite_reserved_fields() {
        let mut doc = Document::new(&"u1".into(), EntityKind::Unit);
        doc.set_ancestry(&["C".into()]);
        let extracted: BTreeMap<String, String> = [
            ("ancestry", "EVIL"),
            ("kind", "collection"),
            ("event_date_ingest", "2020"),
            ("title_is_null", "false"),
            ("dc.title", "Letters"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert!(doc.apply_metadata(&"F-md".into(), &extracted));
        assert_eq!(doc.strings(fields::ANCESTRY), vec!["C"]);
        assert_eq!(doc.kind().unwrap(), EntityKind::Unit);
        assert!(!doc.contains("event_date_ingest"));
        assert!(!doc.contains("title_is_null"));
        assert_eq!(doc.strings("dc.title"), vec!["Letters"]);
        assert_eq!(doc.strings(fields::METADATA_FILE_IDS), vec!["F-md"]);
    }

    #[test]
    fn reserved_names() {
        for name in fields::CORE {
            assert!(fields::is_reserved(name), "{name}");
        }
        assert!(fields::is_reserved("event_date_fixity_check"));
        assert!(fields::is_reserved("md.title_is_null"));
        assert!(fields::is_reserved(""));
        assert!(!fields::is_reserved("md.title"));
        assert!(!fields::is_reserved("md_text"));
    }

    #[test]
    fn same_type_events_keep_one_dynamic_value() {
        let mut doc = Document::new(&"u1".into(), EntityKind::Unit);
        doc.apply_event(&event("e1", "Ingest", 100));
        doc.apply_event(&event("e2", "Ingest", 200));

        let dynamic = doc.get("event_date_ingest");
        assert_eq!(dynamic.len(), 1);
        assert_eq!(dynamic[0].as_date().unwrap().timestamp(), 200);
        assert_eq!(doc.strings(fields::EVENT_ID), vec!["e1", "e2"]);
        assert_eq!(doc.strings(fields::EVENT_OUTCOME), vec!["e1-ok", "e2-ok"]);
    }

    #[test]
    fn reapplying_event_does_not_duplicate() {
        let mut doc = Document::new(&"u1".into(), EntityKind::Unit);
        let e = event("e1", "ingest", 100);
        doc.apply_event(&e);
        let once = doc.clone();
        doc.apply_event(&e);
        assert_eq!(doc, once);
    }

    #[test]
    fn metadata_applied_once_per_file() {
        let mut doc = Document::new(&"u1".into(), EntityKind::Unit);
        let extracted = BTreeMap::from([(
            "md.record.title".to_string(),
            "Letters".to_string(),
        )]);
        assert!(doc.apply_metadata(&"f1".into(), &extracted));
        assert!(!doc.apply_metadata(&"f1".into(), &extracted));
        assert_eq!(doc.strings("md.record.title"), vec!["Letters"]);
        assert!(doc.has_metadata_from(&"f1".into()));
    }

    #[test]
    fn json_roundtrip_keeps_types() {
        let mut doc = Document::new(&"f1".into(), EntityKind::File);
        doc.set(fields::SIZE, 42u64);
        doc.set_nullable::<&str>(fields::CHECKSUM, None);
        doc.apply_event(&event("e1", "fixity", 5));
        doc.set_ancestry(&["m1".into(), "u1".into()]);

        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.get(fields::SIZE)[0].as_int(), Some(42));
        assert_eq!(back.ancestry(), vec![EntityId::from("m1"), "u1".into()]);
    }

    #[test]
    fn event_field_name_is_normalized() {
        assert_eq!(event_date_field("ingest"), "event_date_ingest");
        assert_eq!(event_date_field("Virus-Scan"), "event_date_virus_scan");
    }
}
