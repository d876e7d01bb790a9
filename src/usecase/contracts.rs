use std::future::Future;

use serde_json::Value;
use uuid::Uuid;

use crate::{
    domain::Entity,
    repository::{
        document::{Collection, DocQuery, Document, Filter},
        errors::RepositoryError,
        populate::Population,
    },
    usecase::jwt::{Claims, JwtError},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStats {
    pub count: u64,
    pub average: Option<f64>,
}

/// Raw document access. Stores apply no visibility rules of their own; `set_fields`
/// and `delete` answer `RepositoryError::NotFound` when the id is absent.
pub trait DocumentStore: Clone + Send + Sync + 'static {
    fn find(
        &self,
        collection: &'static Collection,
        query: &DocQuery,
    ) -> impl Future<Output = Result<Vec<Document>, RepositoryError>> + Send;

    fn insert(
        &self,
        collection: &'static Collection,
        doc: Document,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn set_fields(
        &self,
        collection: &'static Collection,
        id: Uuid,
        changes: Document,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn delete(
        &self,
        collection: &'static Collection,
        id: Uuid,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Count of documents matching `filter` and mean of the numeric `field`.
    fn stats(
        &self,
        collection: &'static Collection,
        filter: &Filter,
        field: &str,
    ) -> impl Future<Output = Result<FieldStats, RepositoryError>> + Send;
}

/// Collection accessor for one entity type, with visibility applied.
pub trait Repository: Send + Sync {
    type Entity: Entity;

    fn find(
        &self,
        query: DocQuery,
        population: &[Population],
    ) -> impl Future<Output = Result<Vec<Document>, RepositoryError>> + Send;

    fn find_by_id(
        &self,
        id: Uuid,
        population: &[Population],
    ) -> impl Future<Output = Result<Option<Document>, RepositoryError>> + Send;

    fn create(&self, payload: Value)
    -> impl Future<Output = Result<Document, RepositoryError>> + Send;

    fn update_by_id(
        &self,
        id: Uuid,
        patch: Value,
    ) -> impl Future<Output = Result<Option<Document>, RepositoryError>> + Send;

    fn delete_by_id(&self, id: Uuid) -> impl Future<Output = Result<bool, RepositoryError>> + Send;
}

#[cfg_attr(test, mockall::automock)]
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Claims, JwtError>;
}
