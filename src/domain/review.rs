use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::{tour::DEFAULT_RATINGS_AVERAGE, user::USERS, Entity},
    repository::{
        document::{everything, Collection, FieldKind},
        populate::{PopulateKind, Population},
    },
};

fn default_rating() -> f64 {
    DEFAULT_RATINGS_AVERAGE
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[validate(length(min = 1, message = "Review can not be empty!"))]
    pub review: String,
    #[serde(default = "default_rating")]
    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1 and 5"))]
    pub rating: f64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    pub tour: Uuid,
    pub user: Uuid,
}

pub static REVIEWS: Collection = Collection {
    name: "reviews",
    fields: &[
        ("review", FieldKind::Text),
        ("rating", FieldKind::Number),
        ("createdAt", FieldKind::Date),
        ("tour", FieldKind::Id),
        ("user", FieldKind::Id),
    ],
    unique: &[&["tour", "user"]],
    hidden: &["createdAt"],
    visibility: everything,
};

pub static REVIEW_AUTHOR: [Population; 1] = [Population {
    path: "user",
    from: &USERS,
    kind: PopulateKind::Ref,
    select: &["name", "photo"],
    nested: &[],
}];

impl Entity for Review {
    const NAME: &'static str = "review";
    const PLURAL: &'static str = "reviews";
    const READ_ONLY: &'static [&'static str] = &["id", "createdAt"];

    fn collection() -> &'static Collection {
        &REVIEWS
    }

    fn prepare(&mut self) {
        self.review = self.review.trim().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_review_defaults_rating() {
        let review: Review = serde_json::from_value(json!({
            "review": "Lovely walk",
            "tour": Uuid::new_v4(),
            "user": Uuid::new_v4()
        }))
        .unwrap();

        assert_eq!(review.rating, 4.5);
    }

    #[test]
    fn test_blank_review_fails_after_prepare() {
        let mut review: Review = serde_json::from_value(json!({
            "review": "   ",
            "rating": 3,
            "tour": Uuid::new_v4(),
            "user": Uuid::new_v4()
        }))
        .unwrap();
        review.prepare();

        assert!(review.validate().is_err());
    }

    #[test]
    fn test_rating_out_of_range() {
        let review: Review = serde_json::from_value(json!({
            "review": "Too good",
            "rating": 6,
            "tour": Uuid::new_v4(),
            "user": Uuid::new_v4()
        }))
        .unwrap();

        assert!(review.validate().is_err());
    }
}
