//! In-memory search backend for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docsync_repository::{
    AliasAction, BulkItemResult, BulkOperation, BulkResponse, Connections, ItemError,
    QueryValidation, SearchBackend, SearchError, SearchHit, SearchResponse,
};
use docsync_shared::{BulkAction, Record};
use serde_json::Value;

use crate::document::{DocumentDefinition, FieldSpec, IndexSpec, ModelDocument};
use crate::source::MemorySource;

#[derive(Default, Clone)]
pub(crate) struct MockState {
    pub indices: BTreeMap<String, BTreeMap<String, Value>>,
    pub aliases: BTreeMap<String, BTreeSet<String>>,
    pub bodies: BTreeMap<String, Value>,
    pub mappings: BTreeMap<String, Value>,
    pub bulk_calls: Vec<Vec<BulkOperation>>,
    pub refreshed: Vec<Vec<String>>,
    pub alias_calls: Vec<Vec<AliasAction>>,
    /// Ids always rejected, with status and error type.
    pub reject: BTreeMap<String, (u16, String)>,
    /// Ids answered with 429 this many more times.
    pub transient: BTreeMap<String, usize>,
    pub unavailable: bool,
    /// Hit order for searches, best first; stored order otherwise.
    pub ranking: Vec<String>,
    pub searches: Vec<(String, Value)>,
}

/// Query types the mock accepts as valid.
const KNOWN_QUERIES: &[&str] = &["match_all", "match", "term", "terms", "ids", "range", "bool"];

impl MockState {
    fn resolve(&self, name: &str) -> Option<String> {
        if self.indices.contains_key(name) {
            return Some(name.to_string());
        }
        self.aliases
            .get(name)
            .and_then(|targets| targets.iter().next().cloned())
    }

    fn exists(&self, name: &str) -> bool {
        self.indices.contains_key(name) || self.aliases.contains_key(name)
    }

    fn apply_alias(&mut self, action: &AliasAction) -> Result<(), SearchError> {
        match action {
            AliasAction::Add { index, alias } => {
                if !self.indices.contains_key(index) {
                    return Err(SearchError::IndexNotFound(index.clone()));
                }
                if self.indices.contains_key(alias) {
                    return Err(SearchError::request(400, "invalid_alias_name_exception"));
                }
                self.aliases
                    .entry(alias.clone())
                    .or_default()
                    .insert(index.clone());
            }
            AliasAction::Remove { index, alias } => {
                let removed = self
                    .aliases
                    .get_mut(alias)
                    .is_some_and(|targets| targets.remove(index));
                if !removed {
                    return Err(SearchError::request(404, "aliases_not_found_exception"));
                }
                self.aliases.retain(|_, targets| !targets.is_empty());
            }
            AliasAction::RemoveIndex { index } => {
                if self.indices.remove(index).is_none() {
                    return Err(SearchError::IndexNotFound(index.clone()));
                }
                for targets in self.aliases.values_mut() {
                    targets.remove(index);
                }
                self.aliases.retain(|_, targets| !targets.is_empty());
            }
        }
        Ok(())
    }

    fn apply_bulk(&mut self, op: &BulkOperation) -> BulkItemResult {
        let mut item = BulkItemResult {
            action: op.action,
            index: op.index.clone(),
            id: op.id.clone(),
            status: 200,
            result: None,
            error: None,
        };

        if let Some((status, kind)) = self.reject.get(&op.id) {
            item.status = *status;
            item.error = Some(ItemError {
                kind: kind.clone(),
                reason: format!("rejected {}", op.id),
            });
            return item;
        }
        if let Some(remaining) = self.transient.get_mut(&op.id) {
            if *remaining > 0 {
                *remaining -= 1;
                item.status = 429;
                item.error = Some(ItemError {
                    kind: "es_rejected_execution_exception".into(),
                    reason: "queue full".into(),
                });
                return item;
            }
        }

        let index = self.resolve(&op.index).unwrap_or_else(|| op.index.clone());
        item.index = index.clone();
        let docs = self.indices.entry(index).or_default();

        match op.action {
            BulkAction::Index => {
                let created = docs
                    .insert(op.id.clone(), op.source.clone().unwrap_or_default())
                    .is_none();
                item.status = if created { 201 } else { 200 };
                item.result = Some(if created { "created" } else { "updated" }.into());
            }
            BulkAction::Create => {
                if docs.contains_key(&op.id) {
                    item.status = 409;
                    item.error = Some(ItemError {
                        kind: "version_conflict_engine_exception".into(),
                        reason: "document already exists".into(),
                    });
                } else {
                    docs.insert(op.id.clone(), op.source.clone().unwrap_or_default());
                    item.status = 201;
                    item.result = Some("created".into());
                }
            }
            BulkAction::Update => match docs.get_mut(&op.id) {
                Some(Value::Object(existing)) => {
                    if let Some(Value::Object(partial)) = &op.source {
                        existing.extend(partial.clone());
                    }
                    item.result = Some("updated".into());
                }
                _ => {
                    item.status = 404;
                    item.error = Some(ItemError {
                        kind: "document_missing_exception".into(),
                        reason: "document missing".into(),
                    });
                }
            },
            BulkAction::Delete => {
                if docs.remove(&op.id).is_some() {
                    item.result = Some("deleted".into());
                } else {
                    item.status = 404;
                    item.result = Some("not_found".into());
                }
            }
        }
        item
    }
}

/// Search backend keeping indices, documents and aliases in memory.
#[derive(Default)]
pub(crate) struct MockBackend {
    pub state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_index(self: Arc<Self>, index: &str) -> Arc<Self> {
        self.state
            .lock()
            .unwrap()
            .indices
            .insert(index.to_string(), BTreeMap::new());
        self
    }

    pub fn reject(&self, id: &str, status: u16, kind: &str) {
        self.state
            .lock()
            .unwrap()
            .reject
            .insert(id.to_string(), (status, kind.to_string()));
    }

    pub fn fail_transiently(&self, id: &str, times: usize) {
        self.state
            .lock()
            .unwrap()
            .transient
            .insert(id.to_string(), times);
    }

    /// Rank hits in this order; ids left out follow in stored order.
    pub fn rank(&self, ids: &[&str]) {
        self.state.lock().unwrap().ranking = ids.iter().map(|id| id.to_string()).collect();
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn snapshot(&self) -> MockState {
        self.state.lock().unwrap().clone()
    }

    /// Ids stored in an index or alias, sorted.
    pub fn ids(&self, index: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .resolve(index)
            .and_then(|name| state.indices.get(&name))
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        let name = state.resolve(index)?;
        state.indices.get(&name)?.get(id).cloned()
    }

    /// Operations per bulk call.
    pub fn bulk_sizes(&self) -> Vec<usize> {
        self.state
            .lock()
            .unwrap()
            .bulk_calls
            .iter()
            .map(Vec::len)
            .collect()
    }

    fn check_available(&self) -> Result<(), SearchError> {
        if self.state.lock().unwrap().unavailable {
            return Err(SearchError::connection("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchBackend for MockBackend {
    async fn bulk(
        &self,
        operations: &[BulkOperation],
        _refresh: bool,
    ) -> Result<BulkResponse, SearchError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        state.bulk_calls.push(operations.to_vec());
        let items = operations.iter().map(|op| state.apply_bulk(op)).collect();
        Ok(BulkResponse { took: 1, items })
    }

    async fn refresh(&self, indices: &[String]) -> Result<(), SearchError> {
        self.check_available()?;
        self.state.lock().unwrap().refreshed.push(indices.to_vec());
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        self.check_available()?;
        Ok(self.state.lock().unwrap().exists(index))
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        if state.exists(index) {
            return Err(SearchError::IndexAlreadyExists(index.to_string()));
        }
        state.indices.insert(index.to_string(), BTreeMap::new());
        state.bodies.insert(index.to_string(), body.clone());
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        if state.indices.remove(index).is_none() {
            return Err(SearchError::IndexNotFound(index.to_string()));
        }
        for targets in state.aliases.values_mut() {
            targets.remove(index);
        }
        state.aliases.retain(|_, targets| !targets.is_empty());
        Ok(())
    }

    async fn put_mapping(&self, index: &str, mappings: &Value) -> Result<(), SearchError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        let name = state
            .resolve(index)
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))?;
        state.mappings.insert(name, mappings.clone());
        Ok(())
    }

    async fn count(&self, index: &str) -> Result<u64, SearchError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        state
            .resolve(index)
            .and_then(|name| state.indices.get(&name))
            .map(|docs| docs.len() as u64)
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))
    }

    async fn document_ids(&self, index: &str) -> Result<Vec<String>, SearchError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        state
            .resolve(index)
            .and_then(|name| state.indices.get(&name))
            .map(|docs| docs.keys().cloned().collect())
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))
    }

    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, SearchError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let matches = |name: &str| match pattern.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => name == pattern,
        };
        Ok(state
            .indices
            .keys()
            .filter(|name| matches(name))
            .cloned()
            .collect())
    }

    async fn alias_exists(&self, index: &str, alias: &str) -> Result<bool, SearchError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .aliases
            .get(alias)
            .is_some_and(|targets| targets.contains(index)))
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        state.alias_calls.push(actions.to_vec());

        let mut next = state.clone();
        for action in actions {
            next.apply_alias(action)?;
        }
        *state = next;
        Ok(())
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, SearchError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        state.searches.push((index.to_string(), body.clone()));

        let name = state
            .resolve(index)
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))?;
        let docs = state.indices.get(&name).cloned().unwrap_or_default();

        let mut ids: Vec<String> = state
            .ranking
            .iter()
            .filter(|id| docs.contains_key(*id))
            .cloned()
            .collect();
        ids.extend(docs.keys().filter(|id| !state.ranking.contains(id)).cloned());

        let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
        let with_source = body.get("_source") != Some(&Value::Bool(false));
        let hits = ids
            .iter()
            .take(size)
            .map(|id| SearchHit {
                index: name.clone(),
                id: id.clone(),
                score: Some(1.0),
                source: if with_source { docs.get(id).cloned() } else { None },
            })
            .collect();

        Ok(SearchResponse {
            took: 1,
            total: docs.len() as u64,
            hits,
        })
    }

    async fn validate_query(
        &self,
        index: &str,
        query: &Value,
    ) -> Result<QueryValidation, SearchError> {
        self.check_available()?;
        if !self.state.lock().unwrap().exists(index) {
            return Err(SearchError::IndexNotFound(index.to_string()));
        }

        let unknown: Vec<String> = query
            .as_object()
            .map(|obj| {
                obj.keys()
                    .filter(|key| !KNOWN_QUERIES.contains(&key.as_str()))
                    .map(|key| format!("no [query] registered for [{}]", key))
                    .collect()
            })
            .unwrap_or_else(|| vec!["query malformed, must start with start_object".to_string()]);

        Ok(QueryValidation {
            valid: unknown.is_empty(),
            errors: unknown,
        })
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        Ok(!self.state.lock().unwrap().unavailable)
    }
}

pub(crate) fn connections(backend: Arc<MockBackend>) -> Connections {
    Connections::single(backend)
}

/// Countries 1..=count, each with a name and a population.
pub(crate) fn countries(count: i64) -> Vec<Record> {
    (1..=count)
        .map(|pk| {
            Record::new("Country", pk)
                .with_attribute("name", format!("Country {}", pk))
                .with_attribute("population", pk * 10)
        })
        .collect()
}

pub(crate) fn country_definition() -> DocumentDefinition {
    DocumentDefinition::new("CountryDocument", "Country")
        .with_index(IndexSpec::new("country"))
        .with_field(FieldSpec::new("name", "text"))
        .with_field(FieldSpec::new("population", "long"))
}

pub(crate) fn country_document(records: Vec<Record>) -> ModelDocument {
    ModelDocument::new(
        country_definition(),
        Arc::new(MemorySource::new("Country", records)),
    )
}
