use std::marker::PhantomData;

use serde_json::Value;
use uuid::Uuid;

use crate::{
    domain::{validation_message, Entity},
    repository::{
        document::{strip_hidden, DocQuery, Document, Projection, ProjectionMode, ID_FIELD},
        errors::RepositoryError,
        populate::{populate, Population},
    },
    usecase::contracts::{DocumentStore, Repository},
};

/// Typed repository over one collection. Every read ANDs in the collection's
/// visibility predicate; writes decode, normalize and validate the full entity.
pub struct EntityRepository<E, S> {
    store: S,
    entity: PhantomData<fn() -> E>,
}

impl<E, S: Clone> Clone for EntityRepository<E, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            entity: PhantomData,
        }
    }
}

fn payload_document(payload: Value, read_only: &[&str]) -> Result<Document, RepositoryError> {
    match payload {
        Value::Object(mut doc) => {
            for field in read_only {
                doc.remove(*field);
            }
            Ok(doc)
        }
        _ => Err(RepositoryError::Validation(
            "Request body must be a JSON object".to_string(),
        )),
    }
}

/// Fields of `updated` that differ from `stored`. Fields the update dropped come
/// back as null. Untouched fields are left out so that concurrent writers to
/// them, such as the ratings recompute, are never overwritten with a stale copy.
fn changed_fields(stored: &Document, updated: Document) -> Document {
    let mut changes = stored
        .keys()
        .filter(|key| !updated.contains_key(*key))
        .map(|key| (key.clone(), Value::Null))
        .collect::<Document>();
    changes.extend(
        updated
            .into_iter()
            .filter(|(key, value)| stored.get(key) != Some(value)),
    );
    changes
}

impl<E: Entity, S: DocumentStore> EntityRepository<E, S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            entity: PhantomData,
        }
    }

    /// Stored document as-is, hidden fields included, if it is visible.
    pub async fn find_raw(
        &self,
        id: Uuid,
        projection: Option<Projection>,
    ) -> Result<Option<Document>, RepositoryError> {
        let filter = E::collection()
            .visible_only()
            .eq(ID_FIELD, id.to_string());
        let mut query = DocQuery::new().and_filter(filter).with_limit(1);
        if let Some(projection) = projection {
            query = query.select(projection);
        }

        let docs = self.store.find(E::collection(), &query).await?;
        Ok(docs.into_iter().next())
    }

    /// Field-level write that skips entity validation. `Ok(false)` when the id is absent.
    #[tracing::instrument(skip(self, changes), fields(collection_name = E::collection().name))]
    pub async fn set_fields(&self, id: Uuid, changes: Document) -> Result<bool, RepositoryError> {
        match self.store.set_fields(E::collection(), id, changes).await {
            Ok(()) => Ok(true),
            Err(RepositoryError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn present(mut doc: Document, mode: Option<&ProjectionMode>) -> Document {
        strip_hidden(&mut doc, E::collection(), mode);
        E::decorate(&mut doc);
        doc
    }

    fn decode(doc: Document) -> Result<E, RepositoryError> {
        let mut entity: E = serde_json::from_value(Value::Object(doc))
            .map_err(|e| RepositoryError::Validation(e.to_string()))?;
        entity.prepare();

        if let Err(validation_errors) = entity.validate() {
            tracing::debug!(?validation_errors, "validation failed");
            return Err(RepositoryError::Validation(validation_message(
                &validation_errors,
            )));
        }
        Ok(entity)
    }

    fn encode(entity: &E) -> Result<Document, RepositoryError> {
        match serde_json::to_value(entity) {
            Ok(Value::Object(doc)) => Ok(doc),
            Ok(_) => Err(RepositoryError::DatabaseError(format!(
                "{} did not serialize to an object",
                E::NAME
            ))),
            Err(e) => Err(RepositoryError::DatabaseError(e.to_string())),
        }
    }
}

impl<E: Entity, S: DocumentStore> Repository for EntityRepository<E, S> {
    type Entity = E;

    #[tracing::instrument(skip(self, query, population), fields(collection_name = E::collection().name))]
    async fn find(
        &self,
        query: DocQuery,
        population: &[Population],
    ) -> Result<Vec<Document>, RepositoryError> {
        tracing::debug!("finding documents");

        let mode = query
            .projection
            .as_ref()
            .map(Projection::resolve)
            .transpose()?;
        let query = query.and_filter(E::collection().visible_only());

        let mut docs = self.store.find(E::collection(), &query).await?;
        populate(&self.store, &mut docs, population).await?;

        tracing::debug!(count = docs.len(), "documents found");
        Ok(docs
            .into_iter()
            .map(|doc| Self::present(doc, mode.as_ref()))
            .collect())
    }

    #[tracing::instrument(skip(self, population), fields(collection_name = E::collection().name))]
    async fn find_by_id(
        &self,
        id: Uuid,
        population: &[Population],
    ) -> Result<Option<Document>, RepositoryError> {
        tracing::debug!("finding document by id");

        let Some(doc) = self.find_raw(id, None).await? else {
            return Ok(None);
        };

        let mut docs = vec![doc];
        populate(&self.store, &mut docs, population).await?;
        Ok(docs.pop().map(|doc| Self::present(doc, None)))
    }

    #[tracing::instrument(skip(self, payload), fields(collection_name = E::collection().name))]
    async fn create(&self, payload: Value) -> Result<Document, RepositoryError> {
        tracing::debug!("creating document");

        let doc = payload_document(payload, E::READ_ONLY)?;
        let entity = Self::decode(doc)?;
        let doc = Self::encode(&entity)?;
        self.store.insert(E::collection(), doc.clone()).await?;

        tracing::debug!(id = ?doc.get(ID_FIELD), "document created");
        Ok(Self::present(doc, None))
    }

    #[tracing::instrument(skip(self, patch), fields(collection_name = E::collection().name))]
    async fn update_by_id(
        &self,
        id: Uuid,
        patch: Value,
    ) -> Result<Option<Document>, RepositoryError> {
        tracing::debug!("updating document");

        let patch = payload_document(patch, E::READ_ONLY)?;
        let Some(stored) = self.find_raw(id, None).await? else {
            return Ok(None);
        };
        let mut merged = stored.clone();
        merged.extend(patch);
        merged.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        let entity = Self::decode(merged)?;
        let changes = changed_fields(&stored, Self::encode(&entity)?);
        if !self.set_fields(id, changes).await? {
            return Ok(None);
        }

        tracing::debug!("document updated");
        Ok(self
            .find_raw(id, None)
            .await?
            .map(|doc| Self::present(doc, None)))
    }

    #[tracing::instrument(skip(self), fields(collection_name = E::collection().name))]
    async fn delete_by_id(&self, id: Uuid) -> Result<bool, RepositoryError> {
        tracing::debug!("deleting document");

        if self
            .find_raw(id, Some(Projection::new([ID_FIELD])))
            .await?
            .is_none()
        {
            return Ok(false);
        }

        match self.store.delete(E::collection(), id).await {
            Ok(()) => Ok(true),
            Err(RepositoryError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
