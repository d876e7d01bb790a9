use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::{
    repository::{
        document::{
            strip_hidden, CmpOp, Collection, DocQuery, Document, Filter, Projection, ID_FIELD,
        },
        errors::RepositoryError,
    },
    usecase::contracts::DocumentStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateKind {
    /// `path` holds an id or a list of ids of documents in `from`.
    Ref,
    /// Documents in `from` whose `foreign_field` points back at this one.
    Virtual { foreign_field: &'static str },
}

/// Declarative expansion of related documents on read.
#[derive(Debug, Clone, Copy)]
pub struct Population {
    pub path: &'static str,
    pub from: &'static Collection,
    pub kind: PopulateKind,
    /// Empty selects every field.
    pub select: &'static [&'static str],
    /// Applied to the related documents; one level deep.
    pub nested: &'static [Population],
}

/// Expands every population onto `docs`. Related documents pass through the
/// visibility predicate of their own collection, so a reference to an invisible
/// document resolves to `null`.
#[tracing::instrument(skip(store, docs, specs), fields(doc_count = docs.len()))]
pub async fn populate<S: DocumentStore>(
    store: &S,
    docs: &mut [Document],
    specs: &[Population],
) -> Result<(), RepositoryError> {
    for spec in specs {
        let mut related = fetch_related(store, docs, spec).await?;
        for nested in spec.nested {
            let nested_related = fetch_related(store, &related, nested).await?;
            attach(&mut related, nested, &nested_related);
        }
        attach(docs, spec, &related);
    }
    Ok(())
}

fn referenced_ids(docs: &[Document], path: &str) -> Vec<Value> {
    let mut ids = Vec::new();
    for doc in docs {
        match doc.get(path) {
            Some(Value::String(id)) => ids.push(id.clone()),
            Some(Value::Array(items)) => {
                ids.extend(items.iter().filter_map(Value::as_str).map(str::to_string))
            }
            _ => {}
        }
    }
    ids.sort();
    ids.dedup();
    ids.into_iter()
        .filter(|id| Uuid::parse_str(id).is_ok())
        .map(Value::String)
        .collect()
}

async fn fetch_related<S: DocumentStore>(
    store: &S,
    docs: &[Document],
    spec: &Population,
) -> Result<Vec<Document>, RepositoryError> {
    let (field, ids) = match spec.kind {
        PopulateKind::Ref => (ID_FIELD, referenced_ids(docs, spec.path)),
        PopulateKind::Virtual { foreign_field } => (
            foreign_field,
            docs.iter()
                .filter_map(|doc| doc.get(ID_FIELD).cloned())
                .collect(),
        ),
    };
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query = DocQuery::new().and_filter(
        spec.from
            .visible_only()
            .and(Filter::new().condition(field, CmpOp::In, Value::Array(ids))),
    );
    if !spec.select.is_empty() {
        let mut fields = spec.select.to_vec();
        if !fields.contains(&field) && field != ID_FIELD {
            fields.push(field);
        }
        query = query.select(Projection::new(fields));
    }

    let mut related = store.find(spec.from, &query).await?;
    for doc in &mut related {
        strip_hidden(doc, spec.from, None);
    }

    tracing::debug!(path = spec.path, count = related.len(), "related documents fetched");
    Ok(related)
}

fn attach(docs: &mut [Document], spec: &Population, related: &[Document]) {
    match spec.kind {
        PopulateKind::Ref => {
            let by_id = related
                .iter()
                .filter_map(|doc| Some((doc.get(ID_FIELD)?.as_str()?, doc)))
                .collect::<HashMap<_, _>>();
            let resolve = |id: &str| by_id.get(id).map(|doc| Value::Object((*doc).clone()));

            for doc in docs.iter_mut() {
                let Some(current) = doc.get_mut(spec.path) else {
                    continue;
                };
                let resolved = match current {
                    Value::String(id) => resolve(id.as_str()).unwrap_or(Value::Null),
                    Value::Array(items) => Value::Array(
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .filter_map(&resolve)
                            .collect(),
                    ),
                    _ => continue,
                };
                *current = resolved;
            }
        }
        PopulateKind::Virtual { foreign_field } => {
            for doc in docs.iter_mut() {
                let Some(id) = doc.get(ID_FIELD).cloned() else {
                    continue;
                };
                let children = related
                    .iter()
                    .filter(|child| child.get(foreign_field) == Some(&id))
                    .cloned()
                    .map(Value::Object)
                    .collect();
                doc.insert(spec.path.to_string(), Value::Array(children));
            }
        }
    }
}
