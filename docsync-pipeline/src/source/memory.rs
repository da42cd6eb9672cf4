//! In-memory record source.

use std::collections::BTreeSet;

use async_trait::async_trait;
use docsync_shared::{Lookup, LookupOp, ModelName, Record};
use serde_json::Value;

use super::{RecordOrder, RecordQuery, RecordSource, Window};
use crate::errors::SyncError;

/// Record source backed by a vector of records.
///
/// Lookups are validated against the model's fields: the declared fields if
/// any were given, otherwise every attribute and relation name seen on the
/// stored records.
pub struct MemorySource {
    model: ModelName,
    fields: BTreeSet<String>,
    records: Vec<Record>,
}

impl MemorySource {
    pub fn new(model: impl Into<ModelName>, records: Vec<Record>) -> Self {
        Self {
            model: model.into(),
            fields: BTreeSet::new(),
            records,
        }
    }

    /// Declare the fields lookups may reference.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    fn known_fields(&self) -> BTreeSet<String> {
        if !self.fields.is_empty() {
            return self.fields.clone();
        }
        self.records
            .iter()
            .flat_map(|record| record.attributes.keys().chain(record.related.keys()))
            .cloned()
            .collect()
    }

    fn validate(&self, query: &RecordQuery) -> Result<(), SyncError> {
        let fields = self.known_fields();
        // An empty model has nothing to validate against.
        if fields.is_empty() {
            return Ok(());
        }

        for lookup in query.lookups() {
            let Some(head) = lookup.path.first() else {
                continue;
            };
            if head != "pk" && !fields.contains(head) {
                let choices: Vec<&str> = fields.iter().map(String::as_str).collect();
                return Err(SyncError::lookup(format!(
                    "cannot resolve '{}' into a field of {}, choices are: pk, {}",
                    lookup.field(),
                    self.model,
                    choices.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn select(&self, query: &RecordQuery) -> Result<Vec<Record>, SyncError> {
        self.validate(query)?;

        let mut selected: Vec<Record> = self
            .records
            .iter()
            .filter(|record| !query.exclude_pks.contains(&record.pk))
            .filter(|record| query.after_pk.as_ref().map_or(true, |after| &record.pk > after))
            .filter(|record| query.filters.iter().all(|lookup| lookup_matches(record, lookup)))
            .filter(|record| !query.excludes.iter().any(|lookup| lookup_matches(record, lookup)))
            .cloned()
            .collect();

        if query.order == RecordOrder::PkAscending {
            selected.sort_by(|a, b| a.pk.cmp(&b.pk));
        }
        if let Some(limit) = query.limit {
            selected.truncate(limit);
        }
        Ok(selected)
    }
}

/// A lookup crossing a many-relation matches when any related value does.
fn lookup_matches(record: &Record, lookup: &Lookup) -> bool {
    let value = record.resolve(&lookup.path, None).unwrap_or(Value::Null);
    if lookup.matches(&value) {
        return true;
    }
    match (&value, lookup.op) {
        (Value::Array(_), LookupOp::IsNull | LookupOp::Contains | LookupOp::IContains) => false,
        (Value::Array(items), _) => items.iter().any(|item| lookup.matches(item)),
        _ => false,
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    fn model(&self) -> &ModelName {
        &self.model
    }

    async fn count(&self, query: &RecordQuery) -> Result<usize, SyncError> {
        Ok(self.select(query)?.len())
    }

    async fn fetch(&self, query: &RecordQuery, window: Window) -> Result<Vec<Record>, SyncError> {
        Ok(self
            .select(query)?
            .into_iter()
            .skip(window.offset)
            .take(window.limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use docsync_shared::PrimaryKey;
    use serde_json::json;

    fn source() -> MemorySource {
        let europe = Record::new("Continent", 1).with_attribute("name", "Europe");
        let asia = Record::new("Continent", 2).with_attribute("name", "Asia");
        MemorySource::new(
            "Country",
            vec![
                Record::new("Country", 3)
                    .with_attribute("name", "Japan")
                    .with_attribute("population", 125)
                    .with_one("continent", asia),
                Record::new("Country", 1)
                    .with_attribute("name", "France")
                    .with_attribute("population", 68)
                    .with_one("continent", europe.clone()),
                Record::new("Country", 2)
                    .with_attribute("name", "Spain")
                    .with_attribute("population", 48)
                    .with_one("continent", europe),
            ],
        )
    }

    fn lookup(expression: &str) -> Lookup {
        expression.parse().unwrap()
    }

    #[tokio::test]
    async fn test_filters_and_excludes() {
        let source = source();
        let query = RecordQuery::new()
            .filter(lookup("continent__name=Europe"))
            .exclude(lookup("population__lt=50"));

        let records = source.fetch(&query, Window::new(0, 10)).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attributes["name"], json!("France"));
        assert_eq!(source.count(&query).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ordered_windows() {
        let source = source();
        let query = RecordQuery::new().ordered_by_pk();

        let first = source.fetch(&query, Window::new(0, 2)).await.unwrap();
        let second = source.fetch(&query, Window::new(2, 2)).await.unwrap();

        let pks: Vec<PrimaryKey> = first.iter().chain(&second).map(|r| r.pk.clone()).collect();
        assert_eq!(pks, vec![PrimaryKey::Int(1), PrimaryKey::Int(2), PrimaryKey::Int(3)]);
    }

    #[tokio::test]
    async fn test_after_pk_and_limit() {
        let source = source();
        let query = RecordQuery::new()
            .ordered_by_pk()
            .after(Some(1.into()))
            .limit(Some(1));

        let records = source.fetch(&query, Window::new(0, 10)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pk, PrimaryKey::Int(2));
    }

    #[tokio::test]
    async fn test_unknown_field_is_lookup_mismatch() {
        let source = source();
        let query = RecordQuery::new().filter(lookup("capital=Paris"));

        let err = source.count(&query).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LookupMismatch);
    }

    #[tokio::test]
    async fn test_declared_fields_take_precedence() {
        let source = source().with_fields(["name"]);
        let query = RecordQuery::new().filter(lookup("population__gt=1"));
        assert!(source.count(&query).await.is_err());
    }

    #[tokio::test]
    async fn test_many_relation_lookup() {
        let source = MemorySource::new(
            "Continent",
            vec![Record::new("Continent", 1).with_many(
                "countries",
                vec![
                    Record::new("Country", 1).with_attribute("name", "France"),
                    Record::new("Country", 2).with_attribute("name", "Spain"),
                ],
            )],
        );
        let query = RecordQuery::new().filter(lookup("countries__name=Spain"));
        assert_eq!(source.count(&query).await.unwrap(), 1);
    }
}
