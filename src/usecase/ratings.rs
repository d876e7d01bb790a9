use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    domain::{
        review::REVIEWS,
        tour::{round_to_tenth, DEFAULT_RATINGS_AVERAGE, TOURS},
    },
    repository::{
        document::{Document, Filter},
        errors::RepositoryError,
    },
    usecase::contracts::DocumentStore,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingStats {
    pub quantity: u64,
    pub average: f64,
}

impl RatingStats {
    fn into_document(self) -> Document {
        let mut doc = Document::new();
        doc.insert("ratingsQuantity".to_string(), json!(self.quantity));
        doc.insert("ratingsAverage".to_string(), json!(self.average));
        doc
    }
}

/// Derives a tour's rating fields from its live reviews. Each call recomputes
/// from scratch, so repeated or concurrent calls converge.
#[derive(Clone)]
pub struct RatingsAggregator<S> {
    store: S,
}

impl<S: DocumentStore> RatingsAggregator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self), fields(tour_id = %tour_id))]
    pub async fn recompute_tour_ratings(&self, tour_id: Uuid) -> Result<RatingStats, RepositoryError> {
        let result = self.recompute(tour_id).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!("tours_rating_recomputations_total", "outcome" => outcome).increment(1);
        result
    }

    async fn recompute(&self, tour_id: Uuid) -> Result<RatingStats, RepositoryError> {
        tracing::debug!("recomputing tour ratings");

        let filter = Filter::new().eq("tour", Value::String(tour_id.to_string()));
        let stats = self.store.stats(&REVIEWS, &filter, "rating").await?;

        let computed = match stats.average {
            Some(average) if stats.count > 0 => RatingStats {
                quantity: stats.count,
                average: round_to_tenth(average),
            },
            _ => RatingStats {
                quantity: 0,
                average: DEFAULT_RATINGS_AVERAGE,
            },
        };

        match self
            .store
            .set_fields(&TOURS, tour_id, computed.into_document())
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    quantity = computed.quantity,
                    average = computed.average,
                    "tour ratings updated"
                );
            }
            Err(RepositoryError::NotFound) => {
                tracing::warn!("reviews point at a tour that no longer exists");
            }
            Err(e) => return Err(e),
        }

        Ok(computed)
    }
}
