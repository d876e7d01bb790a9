use std::future::Future;

use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    domain::review::Review,
    repository::{
        document::{DocQuery, Document, Projection},
        entity::EntityRepository,
        errors::RepositoryError,
        populate::Population,
    },
    usecase::{
        contracts::{DocumentStore, Repository},
        ratings::RatingsAggregator,
    },
};

/// Review collection accessor whose write path keeps the parent tour's rating
/// fields in step with its reviews.
#[derive(Clone)]
pub struct ReviewRepository<S> {
    reviews: EntityRepository<Review, S>,
    aggregator: RatingsAggregator<S>,
}

fn tour_ref(doc: &Document) -> Option<Uuid> {
    doc.get("tour")
        .and_then(Value::as_str)
        .and_then(|id| Uuid::parse_str(id).ok())
}

/// Runs a mutation and its recompute on their own task so that a dropped
/// request cannot cancel the pair halfway.
async fn run_detached<T, F>(task: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(task.instrument(tracing::Span::current()))
        .await
        .map_err(|e| RepositoryError::DatabaseError(format!("review write task failed: {e}")))?
}

impl<S: DocumentStore> ReviewRepository<S> {
    pub fn new(store: S) -> Self {
        Self {
            reviews: EntityRepository::new(store.clone()),
            aggregator: RatingsAggregator::new(store),
        }
    }

    /// Reads the review's tour reference before a mutation changes or removes it.
    async fn capture_tour_ref(&self, id: Uuid) -> Result<Option<Uuid>, RepositoryError> {
        let doc = self
            .reviews
            .find_raw(id, Some(Projection::new(["tour"])))
            .await?;
        Ok(doc.as_ref().and_then(tour_ref))
    }

    /// Recompute failures are logged and counted, never returned.
    async fn refresh_tour(&self, tour_id: Uuid) {
        if let Err(e) = self.aggregator.recompute_tour_ratings(tour_id).await {
            tracing::error!(%tour_id, error = %e, "failed to recompute tour ratings");
        }
    }
}

impl<S: DocumentStore> Repository for ReviewRepository<S> {
    type Entity = Review;

    async fn find(
        &self,
        query: DocQuery,
        population: &[Population],
    ) -> Result<Vec<Document>, RepositoryError> {
        self.reviews.find(query, population).await
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        population: &[Population],
    ) -> Result<Option<Document>, RepositoryError> {
        self.reviews.find_by_id(id, population).await
    }

    #[tracing::instrument(skip(self, payload))]
    async fn create(&self, payload: Value) -> Result<Document, RepositoryError> {
        let this = self.clone();
        run_detached(async move {
            let doc = this.reviews.create(payload).await?;
            if let Some(tour_id) = tour_ref(&doc) {
                this.refresh_tour(tour_id).await;
            }
            Ok(doc)
        })
        .await
    }

    #[tracing::instrument(skip(self, patch))]
    async fn update_by_id(
        &self,
        id: Uuid,
        patch: Value,
    ) -> Result<Option<Document>, RepositoryError> {
        let this = self.clone();
        run_detached(async move {
            let Some(before) = this.capture_tour_ref(id).await? else {
                return Ok(None);
            };

            let updated = this.reviews.update_by_id(id, patch).await?;
            if let Some(doc) = &updated {
                this.refresh_tour(before).await;
                match tour_ref(doc) {
                    Some(after) if after != before => {
                        tracing::debug!(%before, %after, "review moved to another tour");
                        this.refresh_tour(after).await;
                    }
                    _ => {}
                }
            }
            Ok(updated)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_by_id(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let this = self.clone();
        run_detached(async move {
            let Some(tour_id) = this.capture_tour_ref(id).await? else {
                return Ok(false);
            };

            let deleted = this.reviews.delete_by_id(id).await?;
            if deleted {
                this.refresh_tour(tour_id).await;
            }
            Ok(deleted)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::{
        domain::tour::{Tour, TOURS},
        repository::{
            document::{Collection, Filter},
            memory::InMemoryStore,
        },
        usecase::contracts::FieldStats,
    };
    use serde_json::json;
    use tokio::sync::oneshot;

    async fn create_tour(store: &InMemoryStore, name: &str) -> Uuid {
        let tours: EntityRepository<Tour, _> = EntityRepository::new(store.clone());
        let doc = tours
            .create(json!({
                "name": name,
                "duration": 3,
                "maxGroupSize": 12,
                "difficulty": "easy",
                "price": 297,
                "imageCover": "tour-4-cover.jpg"
            }))
            .await
            .unwrap();
        Uuid::parse_str(doc["id"].as_str().unwrap()).unwrap()
    }

    async fn ratings_of<S: DocumentStore>(store: &S, tour: Uuid) -> (Value, Value) {
        let tours: EntityRepository<Tour, S> = EntityRepository::new(store.clone());
        let doc = tours.find_by_id(tour, &[]).await.unwrap().unwrap();
        (doc["ratingsQuantity"].clone(), doc["ratingsAverage"].clone())
    }

    fn review(tour: Uuid, rating: f64) -> Value {
        json!({
            "review": "Would go again",
            "rating": rating,
            "tour": tour,
            "user": Uuid::new_v4()
        })
    }

    fn id_of(doc: &Document) -> Uuid {
        Uuid::parse_str(doc["id"].as_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_ratings_follow_creates_and_deletes() {
        let store = InMemoryStore::new();
        let tour = create_tour(&store, "The Northern Lights").await;
        let reviews = ReviewRepository::new(store.clone());

        let mut ids = Vec::new();
        for rating in [3.0, 4.0, 5.0] {
            ids.push(id_of(&reviews.create(review(tour, rating)).await.unwrap()));
        }
        assert_eq!(ratings_of(&store, tour).await, (json!(3), json!(4.0)));

        assert!(reviews.delete_by_id(ids[2]).await.unwrap());
        assert_eq!(ratings_of(&store, tour).await, (json!(2), json!(3.5)));

        for id in &ids[..2] {
            assert!(reviews.delete_by_id(*id).await.unwrap());
        }
        assert_eq!(ratings_of(&store, tour).await, (json!(0), json!(4.5)));
    }

    #[tokio::test]
    async fn test_update_rating_recomputes() {
        let store = InMemoryStore::new();
        let tour = create_tour(&store, "The City Wanderer").await;
        let reviews = ReviewRepository::new(store.clone());
        let id = id_of(&reviews.create(review(tour, 2.0)).await.unwrap());

        let updated = reviews
            .update_by_id(id, json!({"rating": 5}))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated["rating"], json!(5.0));
        assert_eq!(ratings_of(&store, tour).await, (json!(1), json!(5.0)));
    }

    #[tokio::test]
    async fn test_moving_review_recomputes_both_tours() {
        let store = InMemoryStore::new();
        let from = create_tour(&store, "The Star Gazer").await;
        let to = create_tour(&store, "The Sports Lover").await;
        let reviews = ReviewRepository::new(store.clone());
        reviews.create(review(from, 5.0)).await.unwrap();
        let moving = id_of(&reviews.create(review(from, 1.0)).await.unwrap());

        reviews
            .update_by_id(moving, json!({"tour": to}))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(ratings_of(&store, from).await, (json!(1), json!(5.0)));
        assert_eq!(ratings_of(&store, to).await, (json!(1), json!(1.0)));
    }

    #[tokio::test]
    async fn test_duplicate_review_is_rejected_and_ratings_unchanged() {
        let store = InMemoryStore::new();
        let tour = create_tour(&store, "The Snow Adventurer").await;
        let reviews = ReviewRepository::new(store.clone());
        let author = Uuid::new_v4();

        let first = json!({"review": "Great", "rating": 5, "tour": tour, "user": author});
        let second = json!({"review": "Again", "rating": 1, "tour": tour, "user": author});
        reviews.create(first).await.unwrap();

        let result = reviews.create(second).await;

        assert!(matches!(result, Err(RepositoryError::Duplicate { .. })));
        assert_eq!(ratings_of(&store, tour).await, (json!(1), json!(5.0)));
    }

    #[tokio::test]
    async fn test_missing_review_is_not_found() {
        let store = InMemoryStore::new();
        let reviews = ReviewRepository::new(store);

        assert!(reviews
            .update_by_id(Uuid::new_v4(), json!({"rating": 3}))
            .await
            .unwrap()
            .is_none());
        assert!(!reviews.delete_by_id(Uuid::new_v4()).await.unwrap());
    }

    /// Delegates to memory but fails every aggregation.
    #[derive(Clone, Default)]
    struct BrokenStats(InMemoryStore);

    impl DocumentStore for BrokenStats {
        async fn find(
            &self,
            collection: &'static Collection,
            query: &DocQuery,
        ) -> Result<Vec<Document>, RepositoryError> {
            self.0.find(collection, query).await
        }

        async fn insert(
            &self,
            collection: &'static Collection,
            doc: Document,
        ) -> Result<(), RepositoryError> {
            self.0.insert(collection, doc).await
        }

        async fn set_fields(
            &self,
            collection: &'static Collection,
            id: Uuid,
            changes: Document,
        ) -> Result<(), RepositoryError> {
            self.0.set_fields(collection, id, changes).await
        }

        async fn delete(&self, collection: &'static Collection, id: Uuid) -> Result<(), RepositoryError> {
            self.0.delete(collection, id).await
        }

        async fn stats(
            &self,
            _collection: &'static Collection,
            _filter: &Filter,
            _field: &str,
        ) -> Result<FieldStats, RepositoryError> {
            Err(RepositoryError::Unavailable("aggregation offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_recompute_failure_does_not_fail_the_write() {
        let store = BrokenStats::default();
        let tour = create_tour(&store.0, "The Forest Hiker").await;
        let reviews = ReviewRepository::new(store.clone());

        let created = reviews.create(review(tour, 1.0)).await.unwrap();
        assert!(reviews.find_by_id(id_of(&created), &[]).await.unwrap().is_some());
        assert_eq!(ratings_of(&store, tour).await, (json!(0), json!(4.5)));

        assert!(reviews.delete_by_id(id_of(&created)).await.unwrap());
    }

    type Gate = (oneshot::Sender<()>, oneshot::Receiver<()>);

    /// Delegates to memory but holds the first tour field write until released.
    #[derive(Clone, Default)]
    struct PausedTourWrite {
        inner: InMemoryStore,
        gate: Arc<Mutex<Option<Gate>>>,
    }

    impl PausedTourWrite {
        /// Returns a receiver that fires once the write is held and a sender that lets it go.
        fn arm(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
            let (reached_tx, reached_rx) = oneshot::channel();
            let (release_tx, release_rx) = oneshot::channel();
            *self.gate.lock().unwrap() = Some((reached_tx, release_rx));
            (reached_rx, release_tx)
        }

        fn take_gate(&self, collection: &Collection) -> Option<Gate> {
            if collection.name != TOURS.name {
                return None;
            }
            self.gate.lock().unwrap().take()
        }
    }

    impl DocumentStore for PausedTourWrite {
        async fn find(
            &self,
            collection: &'static Collection,
            query: &DocQuery,
        ) -> Result<Vec<Document>, RepositoryError> {
            self.inner.find(collection, query).await
        }

        async fn insert(
            &self,
            collection: &'static Collection,
            doc: Document,
        ) -> Result<(), RepositoryError> {
            self.inner.insert(collection, doc).await
        }

        async fn set_fields(
            &self,
            collection: &'static Collection,
            id: Uuid,
            changes: Document,
        ) -> Result<(), RepositoryError> {
            if let Some((reached, release)) = self.take_gate(collection) {
                let _ = reached.send(());
                let _ = release.await;
            }
            self.inner.set_fields(collection, id, changes).await
        }

        async fn delete(&self, collection: &'static Collection, id: Uuid) -> Result<(), RepositoryError> {
            self.inner.delete(collection, id).await
        }

        async fn stats(
            &self,
            collection: &'static Collection,
            filter: &Filter,
            field: &str,
        ) -> Result<FieldStats, RepositoryError> {
            self.inner.stats(collection, filter, field).await
        }
    }

    #[tokio::test]
    async fn test_tour_update_keeps_ratings_recomputed_meanwhile() {
        let store = PausedTourWrite::default();
        let tour = create_tour(&store.inner, "The Wine Taster").await;
        let (reached, release) = store.arm();

        let tours: EntityRepository<Tour, _> = EntityRepository::new(store.clone());
        let update = tokio::spawn(async move { tours.update_by_id(tour, json!({"price": 450})).await });
        reached.await.unwrap();

        ReviewRepository::new(store.clone())
            .create(review(tour, 2.0))
            .await
            .unwrap();
        release.send(()).unwrap();

        let updated = update.await.unwrap().unwrap().unwrap();
        assert_eq!(updated["price"], json!(450.0));
        assert_eq!(updated["ratingsQuantity"], json!(1));
        assert_eq!(ratings_of(&store, tour).await, (json!(1), json!(2.0)));
    }
}
