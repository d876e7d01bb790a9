use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    domain::Entity,
    repository::{
        document::{DocQuery, Document, Filter},
        populate::Population,
    },
    usecase::{contracts::Repository, error::UsecaseError, query_features::QueryFeatures},
};

/// Success body shared by every CRUD endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    pub data: Document,
}

impl Envelope {
    pub fn one(name: &str, doc: Document) -> Self {
        let mut data = Document::new();
        data.insert(name.to_string(), Value::Object(doc));
        Self {
            status: "success",
            results: None,
            data,
        }
    }

    pub fn many(plural: &str, docs: Vec<Document>) -> Self {
        let results = docs.len();
        let mut data = Document::new();
        data.insert(
            plural.to_string(),
            Value::Array(docs.into_iter().map(Value::Object).collect()),
        );
        Self {
            status: "success",
            results: Some(results),
            data,
        }
    }
}

/// The five CRUD operations for one entity, parameterized by its repository,
/// population and optional parent nesting.
pub struct HandlerFactory<R> {
    repository: R,
    populate: &'static [Population],
    read_populate: &'static [Population],
    foreign_key: Option<&'static str>,
}

impl<R: Repository> HandlerFactory<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            populate: &[],
            read_populate: &[],
            foreign_key: None,
        }
    }

    /// Applied to list and read-one.
    pub fn with_population(mut self, population: &'static [Population]) -> Self {
        self.populate = population;
        self
    }

    /// Applied to read-one only, after the shared population.
    pub fn with_read_population(mut self, population: &'static [Population]) -> Self {
        self.read_populate = population;
        self
    }

    /// Lists under a parent route filter on `foreign_key == parent id`.
    pub fn nested_under(mut self, foreign_key: &'static str) -> Self {
        self.foreign_key = Some(foreign_key);
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    fn not_found(id: Uuid) -> UsecaseError {
        UsecaseError::NotFound {
            entity: R::Entity::NAME,
            id,
        }
    }

    #[tracing::instrument(skip(self, params), fields(entity = R::Entity::NAME, parent_id = ?parent_id))]
    pub async fn list(
        &self,
        parent_id: Option<Uuid>,
        params: &[(String, String)],
    ) -> Result<Envelope, UsecaseError> {
        tracing::debug!("listing documents");

        let mut base = DocQuery::new();
        if let (Some(foreign_key), Some(parent_id)) = (self.foreign_key, parent_id) {
            base = base.and_filter(Filter::new().eq(foreign_key, parent_id.to_string()));
        }

        let query = QueryFeatures::new(base, params)
            .filter()
            .sort()
            .select_fields()
            .paginate()
            .into_query();

        let docs = self.repository.find(query, self.populate).await?;

        tracing::debug!(results = docs.len(), "documents listed");
        Ok(Envelope::many(R::Entity::PLURAL, docs))
    }

    #[tracing::instrument(skip(self), fields(entity = R::Entity::NAME, id = %id))]
    pub async fn get_one(&self, id: Uuid) -> Result<Envelope, UsecaseError> {
        tracing::debug!("getting document");

        let population = self
            .populate
            .iter()
            .chain(self.read_populate)
            .copied()
            .collect::<Vec<_>>();

        let doc = self
            .repository
            .find_by_id(id, &population)
            .await?
            .ok_or_else(|| Self::not_found(id))?;

        Ok(Envelope::one(R::Entity::NAME, doc))
    }

    #[tracing::instrument(skip(self, payload), fields(entity = R::Entity::NAME))]
    pub async fn create_one(&self, payload: Value) -> Result<Envelope, UsecaseError> {
        tracing::debug!("creating document");

        let doc = self.repository.create(payload).await?;

        tracing::info!(id = ?doc.get("id"), "document created");
        Ok(Envelope::one(R::Entity::NAME, doc))
    }

    #[tracing::instrument(skip(self, patch), fields(entity = R::Entity::NAME, id = %id))]
    pub async fn update_one(&self, id: Uuid, patch: Value) -> Result<Envelope, UsecaseError> {
        tracing::debug!("updating document");

        let doc = self
            .repository
            .update_by_id(id, patch)
            .await?
            .ok_or_else(|| Self::not_found(id))?;

        tracing::info!("document updated");
        Ok(Envelope::one(R::Entity::NAME, doc))
    }

    #[tracing::instrument(skip(self), fields(entity = R::Entity::NAME, id = %id))]
    pub async fn delete_one(&self, id: Uuid) -> Result<(), UsecaseError> {
        tracing::debug!("deleting document");

        if !self.repository.delete_by_id(id).await? {
            return Err(Self::not_found(id));
        }

        tracing::info!("document deleted");
        Ok(())
    }
}
