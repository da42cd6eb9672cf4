//! Declarative part of a document: which model it indexes, into which
//! indices, and with which fields.

use std::collections::BTreeSet;

use docsync_shared::ModelName;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::SyncError;

/// Default number of records per chunk.
pub const DEFAULT_QUERYSET_PAGINATION: usize = 4096;

/// One field of an indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Name of the field in the indexed document.
    pub name: String,
    /// Dotted attribute path on the record, the field name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    /// Mapping type, e.g. `text`, `keyword` or `long`.
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    /// Extra mapping parameters (analyzer, sub-fields, properties, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
    /// A required field that cannot be resolved fails the record instead of
    /// being indexed as null.
    #[serde(default)]
    pub required: bool,
}

fn default_field_type() -> String {
    "text".to_string()
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attr: None,
            field_type: field_type.into(),
            options: Map::new(),
            required: false,
        }
    }

    pub fn with_attr(mut self, attr: impl Into<String>) -> Self {
        self.attr = Some(attr.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attribute path segments.
    pub fn path(&self) -> Vec<String> {
        self.attr
            .as_deref()
            .unwrap_or(&self.name)
            .split('.')
            .map(str::to_string)
            .collect()
    }

    /// Mapping of this field.
    pub fn mapping(&self) -> Value {
        let mut mapping = Map::new();
        mapping.insert("type".to_string(), Value::String(self.field_type.clone()));
        mapping.extend(self.options.clone());
        Value::Object(mapping)
    }
}

/// An index a document is written to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    /// Settings overriding the process-wide defaults.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub settings: Value,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: Value::Null,
        }
    }
}

/// A model whose changes affect the documents of another model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedModel {
    pub model: ModelName,
    /// Relation on the indexed record holding the related record. Documents
    /// that declare it find their affected records without custom code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

/// Static description of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDefinition {
    /// Document name, used in logs and reports.
    pub name: String,
    /// Model whose records are indexed.
    pub model: ModelName,
    pub indices: Vec<IndexSpec>,
    pub fields: Vec<FieldSpec>,
    /// Records per chunk; the process default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queryset_pagination: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_models: Vec<RelatedModel>,
    /// Mutation events of the model are not synced.
    #[serde(default)]
    pub ignore_signals: bool,
    /// Refresh the indices after writes; the process default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_refresh: Option<bool>,
    /// Named connection; `default` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
}

impl DocumentDefinition {
    pub fn new(name: impl Into<String>, model: impl Into<ModelName>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            indices: Vec::new(),
            fields: Vec::new(),
            queryset_pagination: None,
            related_models: Vec::new(),
            ignore_signals: false,
            auto_refresh: None,
            connection: None,
        }
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indices.push(index);
        self
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_pagination(mut self, chunk_size: usize) -> Self {
        self.queryset_pagination = Some(chunk_size);
        self
    }

    pub fn with_related(mut self, model: impl Into<ModelName>, relation: Option<&str>) -> Self {
        self.related_models.push(RelatedModel {
            model: model.into(),
            relation: relation.map(str::to_string),
        });
        self
    }

    pub fn ignoring_signals(mut self) -> Self {
        self.ignore_signals = true;
        self
    }

    pub fn with_auto_refresh(mut self, auto_refresh: bool) -> Self {
        self.auto_refresh = Some(auto_refresh);
        self
    }

    pub fn using(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indices.iter().map(|index| index.name.clone()).collect()
    }

    pub fn index(&self, name: &str) -> Option<&IndexSpec> {
        self.indices.iter().find(|index| index.name == name)
    }

    /// Records per chunk, falling back to `default` when unset or zero.
    pub fn chunk_size(&self, default: usize) -> usize {
        match self.queryset_pagination {
            Some(size) if size > 0 => size,
            _ => default.max(1),
        }
    }

    pub fn is_related_to(&self, model: &ModelName) -> bool {
        self.related_models.iter().any(|related| &related.model == model)
    }

    pub fn relation_to(&self, model: &ModelName) -> Option<&str> {
        self.related_models
            .iter()
            .find(|related| &related.model == model)
            .and_then(|related| related.relation.as_deref())
    }

    /// Mappings generated from the fields.
    pub fn mappings(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.mapping()))
            .collect();
        json!({ "properties": properties })
    }

    /// Check the definition is usable.
    ///
    /// # Returns
    ///
    /// * `Err(SyncError::Configuration)` - If the model or an index name is
    ///   empty, no index is declared, or a field or index name is repeated
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.model.as_str().is_empty() {
            return Err(SyncError::configuration(format!(
                "document '{}' has no model",
                self.name
            )));
        }
        if self.indices.is_empty() {
            return Err(SyncError::configuration(format!(
                "document '{}' declares no index",
                self.name
            )));
        }

        let mut indices = BTreeSet::new();
        for index in &self.indices {
            if index.name.is_empty() {
                return Err(SyncError::configuration(format!(
                    "document '{}' declares an index without a name",
                    self.name
                )));
            }
            if !indices.insert(index.name.as_str()) {
                return Err(SyncError::configuration(format!(
                    "document '{}' declares index '{}' twice",
                    self.name, index.name
                )));
            }
        }

        let mut fields = BTreeSet::new();
        for field in &self.fields {
            if !fields.insert(field.name.as_str()) {
                return Err(SyncError::configuration(format!(
                    "document '{}' declares field '{}' twice",
                    self.name, field.name
                )));
            }
        }

        Ok(())
    }
}
