use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    repository::{
        document::{
            compare_for_sort, lookup, Collection, DocQuery, Direction, Document, Filter, SortKey,
            ID_FIELD,
        },
        errors::RepositoryError,
    },
    usecase::contracts::{DocumentStore, FieldStats},
};

/// Process-local store. Documents keep insertion order, which is the natural
/// order of an unsorted read.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<&'static str, Vec<Document>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare_docs(a: &Document, b: &Document, keys: &[SortKey]) -> Ordering {
    keys.iter()
        .map(|key| {
            let ordering = compare_for_sort(lookup(a, &key.field), lookup(b, &key.field));
            match key.direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn unique_key(doc: &Document, fields: &[&str]) -> Vec<Value> {
    fields
        .iter()
        .map(|field| lookup(doc, field).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Null keys never clash, the same as a unique expression index in postgres.
fn check_unique(
    collection: &Collection,
    docs: &[Document],
    candidate: &Document,
    own_id: Option<&Value>,
) -> Result<(), RepositoryError> {
    for fields in collection.unique {
        let key = unique_key(candidate, fields);
        if key.iter().any(Value::is_null) {
            continue;
        }

        let clash = docs
            .iter()
            .filter(|doc| own_id.is_none_or(|id| doc.get(ID_FIELD) != Some(id)))
            .any(|doc| unique_key(doc, fields) == key);

        if clash {
            return Err(RepositoryError::Duplicate {
                fields: fields.join(", "),
                value: key
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
    }
    Ok(())
}

fn position_of(docs: &[Document], id: Uuid) -> Option<usize> {
    let id = Value::String(id.to_string());
    docs.iter().position(|doc| doc.get(ID_FIELD) == Some(&id))
}

impl DocumentStore for InMemoryStore {
    #[tracing::instrument(skip(self, collection, query), fields(collection_name = collection.name))]
    async fn find(
        &self,
        collection: &'static Collection,
        query: &DocQuery,
    ) -> Result<Vec<Document>, RepositoryError> {
        let prepared = query.prepare(collection)?;
        let guard = self.collections.read().await;

        let mut matched = guard
            .get(collection.name)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| prepared.filter.matches(doc))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if !prepared.sort.is_empty() {
            matched.sort_by(|a, b| compare_docs(a, b, &prepared.sort));
        }

        let skip = usize::try_from(prepared.skip).unwrap_or(usize::MAX);
        let limit = prepared
            .limit
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        let docs = matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .cloned()
            .map(|doc| match &prepared.projection {
                Some(mode) => mode.apply(doc),
                None => doc,
            })
            .collect::<Vec<_>>();

        tracing::debug!(count = docs.len(), "documents found");
        Ok(docs)
    }

    #[tracing::instrument(skip(self, collection, doc), fields(collection_name = collection.name))]
    async fn insert(
        &self,
        collection: &'static Collection,
        doc: Document,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.name).or_default();

        check_unique(collection, docs, &doc, None)?;
        docs.push(doc);

        tracing::debug!("document inserted");
        Ok(())
    }

    #[tracing::instrument(skip(self, collection, changes), fields(collection_name = collection.name))]
    async fn set_fields(
        &self,
        collection: &'static Collection,
        id: Uuid,
        changes: Document,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.name).or_default();
        let index = position_of(docs, id).ok_or(RepositoryError::NotFound)?;

        let mut merged = docs[index].clone();
        merged.extend(changes);
        check_unique(collection, docs, &merged, docs[index].get(ID_FIELD))?;
        docs[index] = merged;

        tracing::debug!("document fields set");
        Ok(())
    }

    #[tracing::instrument(skip(self, collection), fields(collection_name = collection.name))]
    async fn delete(&self, collection: &'static Collection, id: Uuid) -> Result<(), RepositoryError> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.name).or_default();
        let index = position_of(docs, id).ok_or(RepositoryError::NotFound)?;
        docs.remove(index);

        tracing::debug!("document deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self, collection, filter), fields(collection_name = collection.name))]
    async fn stats(
        &self,
        collection: &'static Collection,
        filter: &Filter,
        field: &str,
    ) -> Result<FieldStats, RepositoryError> {
        let filter = filter.cast(collection)?;
        let guard = self.collections.read().await;

        let matched = guard
            .get(collection.name)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).collect::<Vec<_>>())
            .unwrap_or_default();

        let values = matched
            .iter()
            .filter_map(|doc| lookup(doc, field).and_then(Value::as_f64))
            .collect::<Vec<_>>();
        let average = if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        };

        Ok(FieldStats {
            count: matched.len() as u64,
            average,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::document::{everything, CmpOp, FieldKind, Projection};
    use serde_json::json;

    static ITEMS: Collection = Collection {
        name: "items",
        fields: &[
            ("name", FieldKind::Text),
            ("price", FieldKind::Number),
            ("position", FieldKind::Number),
        ],
        unique: &[&["name"]],
        hidden: &[],
        visibility: everything,
    };

    fn item(position: u64, price: f64) -> (Uuid, Document) {
        let id = Uuid::new_v4();
        let value = json!({
            "id": id.to_string(),
            "name": format!("item {position:02}"),
            "price": price,
            "position": position,
        });
        match value {
            Value::Object(doc) => (id, doc),
            _ => unreachable!(),
        }
    }

    async fn seeded(count: u64) -> (InMemoryStore, Vec<Uuid>) {
        let store = InMemoryStore::new();
        let mut ids = Vec::new();
        for position in 1..=count {
            let (id, doc) = item(position, (position * 100) as f64);
            store.insert(&ITEMS, doc).await.unwrap();
            ids.push(id);
        }
        (store, ids)
    }

    fn positions(docs: &[Document]) -> Vec<u64> {
        docs.iter()
            .map(|doc| doc["position"].as_u64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_skip_and_limit_return_second_page() {
        let (store, _) = seeded(25).await;

        let docs = store
            .find(&ITEMS, &DocQuery::new().with_skip(10).with_limit(10))
            .await
            .unwrap();

        assert_eq!(positions(&docs), (11..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_multi_key_sort() {
        let store = InMemoryStore::new();
        for (position, price) in [(1, 300.0), (2, 100.0), (3, 300.0), (4, 200.0)] {
            store.insert(&ITEMS, item(position, price).1).await.unwrap();
        }

        let query = DocQuery::new().sort_by(vec![SortKey::desc("price"), SortKey::asc("position")]);
        let docs = store.find(&ITEMS, &query).await.unwrap();

        assert_eq!(positions(&docs), vec![1, 3, 4, 2]);
    }

    #[tokio::test]
    async fn test_projection_keeps_only_requested_fields_and_id() {
        let (store, _) = seeded(2).await;

        let query = DocQuery::new().select(Projection::parse("name,price"));
        let docs = store.find(&ITEMS, &query).await.unwrap();

        for doc in docs {
            let mut keys = doc.keys().cloned().collect::<Vec<_>>();
            keys.sort();
            assert_eq!(keys, vec!["id", "name", "price"]);
        }
    }

    #[tokio::test]
    async fn test_filter_is_cast_before_matching() {
        let (store, _) = seeded(10).await;

        let query = DocQuery::new().and_filter(Filter::new().condition("price", CmpOp::Gte, "500"));
        let docs = store.find(&ITEMS, &query).await.unwrap();

        assert_eq!(positions(&docs), (5..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_unique_value() {
        let (store, _) = seeded(1).await;
        let (_, clash) = item(1, 5.0);

        let result = store.insert(&ITEMS, clash).await;

        match result {
            Err(RepositoryError::Duplicate { fields, value }) => {
                assert_eq!(fields, "name");
                assert_eq!(value, "\"item 01\"");
            }
            other => panic!("expected Duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_set_fields_may_keep_its_own_unique_value() {
        let (store, ids) = seeded(1).await;
        let (_, mut doc) = item(1, 999.0);
        doc.remove(ID_FIELD);

        store.set_fields(&ITEMS, ids[0], doc).await.unwrap();

        let docs = store.find(&ITEMS, &DocQuery::new()).await.unwrap();
        assert_eq!(docs[0]["price"], json!(999.0));
    }

    #[tokio::test]
    async fn test_mutations_on_missing_id_are_not_found() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();

        assert!(matches!(
            store.delete(&ITEMS, id).await,
            Err(RepositoryError::NotFound)
        ));
        assert!(matches!(
            store.set_fields(&ITEMS, id, Document::new()).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_stats_count_and_average() {
        let (store, _) = seeded(4).await;

        let stats = store
            .stats(
                &ITEMS,
                &Filter::new().condition("price", CmpOp::Lte, 300),
                "price",
            )
            .await
            .unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.average, Some(200.0));

        let empty = store
            .stats(&ITEMS, &Filter::new().eq("name", "nothing"), "price")
            .await
            .unwrap();
        assert_eq!(empty, FieldStats { count: 0, average: None });
    }
}
