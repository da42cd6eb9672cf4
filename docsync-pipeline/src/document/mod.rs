//! Documents: how records of a model become indexed documents.
//!
//! A [`Document`] pairs a [`DocumentDefinition`] with a [`RecordSource`] and
//! exposes the hooks the pipeline calls while serializing records. Every
//! hook has a default, so most documents only need [`ModelDocument`].

mod definition;

pub use definition::{
    DocumentDefinition, FieldSpec, IndexSpec, RelatedModel, DEFAULT_QUERYSET_PAGINATION,
};

use std::sync::Arc;

use async_trait::async_trait;
use docsync_shared::{FilterValue, Lookup, LookupOp, PrimaryKey, Record};
use serde_json::{Map, Value};

use crate::errors::SyncError;
use crate::source::{RecordQuery, RecordSource, Window};

/// State shared by the hooks while one record is serialized.
#[derive(Debug, Clone, Default)]
pub struct PrepareContext {
    /// A related record being deleted; it is left out of the document.
    pub related_to_ignore: Option<Record>,
}

impl PrepareContext {
    pub fn ignoring(record: Record) -> Self {
        Self {
            related_to_ignore: Some(record),
        }
    }
}

/// Capability interface of an indexed document.
#[async_trait]
pub trait Document: Send + Sync {
    fn definition(&self) -> &DocumentDefinition;

    fn source(&self) -> &dyn RecordSource;

    /// Adjust the base query used for bulk runs.
    fn query(&self, query: RecordQuery) -> RecordQuery {
        query
    }

    /// Whether a record belongs in the index. Deletions bypass it.
    fn should_index(&self, _record: &Record) -> bool {
        true
    }

    fn generate_id(&self, record: &Record) -> String {
        record.pk.to_string()
    }

    /// Value of one field.
    ///
    /// # Returns
    ///
    /// * `Err(SyncError::Serialization)` - If a required field cannot be
    ///   resolved on the record
    fn prepare_field(
        &self,
        field: &FieldSpec,
        record: &Record,
        context: &PrepareContext,
    ) -> Result<Value, SyncError> {
        match record.resolve(&field.path(), context.related_to_ignore.as_ref()) {
            Some(value) => Ok(value),
            None if field.required => Err(SyncError::serialization(format!(
                "cannot resolve '{}' on {} {}",
                field.path().join("."),
                record.model,
                record.pk
            ))),
            None => Ok(Value::Null),
        }
    }

    /// Full document body of a record.
    fn prepare(&self, record: &Record, context: &PrepareContext) -> Result<Value, SyncError> {
        let mut body = Map::new();
        for field in &self.definition().fields {
            body.insert(field.name.clone(), self.prepare_field(field, record, context)?);
        }
        Ok(Value::Object(body))
    }

    /// Records of this document affected by a change of `related`.
    ///
    /// `None` means the related record does not affect this document.
    async fn instances_from_related(
        &self,
        _related: &Record,
    ) -> Result<Option<Vec<Record>>, SyncError> {
        Ok(None)
    }
}

/// Document driven entirely by its definition.
///
/// Related records are resolved through the relation each related model
/// declares.
pub struct ModelDocument {
    definition: DocumentDefinition,
    source: Arc<dyn RecordSource>,
}

impl ModelDocument {
    pub fn new(definition: DocumentDefinition, source: Arc<dyn RecordSource>) -> Self {
        Self { definition, source }
    }
}

pub(crate) fn pk_filter(pk: &PrimaryKey) -> FilterValue {
    match pk {
        PrimaryKey::Int(value) => FilterValue::Int(*value),
        PrimaryKey::Str(value) => FilterValue::Str(value.clone()),
    }
}

#[async_trait]
impl Document for ModelDocument {
    fn definition(&self) -> &DocumentDefinition {
        &self.definition
    }

    fn source(&self) -> &dyn RecordSource {
        self.source.as_ref()
    }

    async fn instances_from_related(
        &self,
        related: &Record,
    ) -> Result<Option<Vec<Record>>, SyncError> {
        let Some(relation) = self.definition.relation_to(&related.model) else {
            return Ok(None);
        };

        let query = RecordQuery::new()
            .filter(Lookup::new(
                &format!("{}__pk", relation),
                LookupOp::Exact,
                pk_filter(&related.pk),
            ))
            .ordered_by_pk();
        let total = self.source.count(&query).await?;
        let records = self.source.fetch(&query, Window::new(0, total)).await?;
        Ok(Some(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use serde_json::json;

    fn europe() -> Record {
        Record::new("Continent", 1).with_attribute("name", "Europe")
    }

    fn document() -> ModelDocument {
        let definition = DocumentDefinition::new("CountryDocument", "Country")
            .with_index(IndexSpec::new("country"))
            .with_field(FieldSpec::new("name", "text"))
            .with_field(FieldSpec::new("continent", "keyword").with_attr("continent.name"))
            .with_related("Continent", Some("continent"));
        let source = MemorySource::new(
            "Country",
            vec![
                Record::new("Country", 1)
                    .with_attribute("name", "France")
                    .with_one("continent", europe()),
                Record::new("Country", 2)
                    .with_attribute("name", "Japan")
                    .with_one("continent", Record::new("Continent", 2)),
            ],
        );
        ModelDocument::new(definition, Arc::new(source))
    }

    #[test]
    fn test_prepare() {
        let document = document();
        let france = Record::new("Country", 1)
            .with_attribute("name", "France")
            .with_one("continent", europe());

        let body = document.prepare(&france, &PrepareContext::default()).unwrap();
        assert_eq!(body, json!({"name": "France", "continent": "Europe"}));
        assert_eq!(document.generate_id(&france), "1");
    }

    #[test]
    fn test_prepare_ignores_deleted_related() {
        let document = document();
        let france = Record::new("Country", 1)
            .with_attribute("name", "France")
            .with_one("continent", europe());

        let body = document
            .prepare(&france, &PrepareContext::ignoring(europe()))
            .unwrap();
        assert_eq!(body["continent"], Value::Null);
    }

    #[test]
    fn test_missing_required_field() {
        let field = FieldSpec::new("capital", "keyword").required();
        let record = Record::new("Country", 1);

        let result = document().prepare_field(&field, &record, &PrepareContext::default());
        assert!(matches!(result, Err(SyncError::Serialization(_))));

        let optional = FieldSpec::new("capital", "keyword");
        let value = document()
            .prepare_field(&optional, &record, &PrepareContext::default())
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_instances_from_related() {
        let document = document();

        let affected = document.instances_from_related(&europe()).await.unwrap();
        let pks: Vec<PrimaryKey> = affected.unwrap().into_iter().map(|r| r.pk).collect();
        assert_eq!(pks, vec![PrimaryKey::Int(1)]);

        let unrelated = Record::new("Language", 1);
        assert!(document.instances_from_related(&unrelated).await.unwrap().is_none());
    }
}
