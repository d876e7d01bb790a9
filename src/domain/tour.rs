use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    domain::{review::REVIEWS, review::REVIEW_AUTHOR, user::USERS, Entity},
    repository::{
        document::{Collection, Document, FieldKind, Filter},
        populate::{PopulateKind, Population},
    },
};

pub const DEFAULT_RATINGS_AVERAGE: f64 = 4.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type", default = "point_type")]
    pub kind: String,
    pub coordinates: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn point_type() -> String {
    "Point".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(flatten)]
    pub point: GeoPoint,
    #[serde(default)]
    pub day: u32,
}

fn default_ratings_average() -> f64 {
    DEFAULT_RATINGS_AVERAGE
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_price_discount"))]
pub struct Tour {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[validate(length(
        min = 10,
        max = 40,
        message = "A tour name must have between 10 and 40 characters"
    ))]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[validate(range(min = 0.0, message = "A tour duration can not be negative"))]
    pub duration: f64,
    #[validate(range(min = 1, message = "A tour group must allow at least one person"))]
    pub max_group_size: u32,
    pub difficulty: Difficulty,
    #[serde(default = "default_ratings_average")]
    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1.0 and 5.0"))]
    pub ratings_average: f64,
    #[serde(default)]
    pub ratings_quantity: u64,
    #[validate(range(min = 0.0, message = "A tour price can not be negative"))]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[validate(length(min = 1, message = "A tour must have a cover image"))]
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub start_dates: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub secret_tour: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_location: Option<GeoPoint>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub guides: Vec<Uuid>,
}

fn validate_price_discount(tour: &Tour) -> Result<(), ValidationError> {
    match tour.price_discount {
        Some(discount) if discount >= tour.price => {
            let mut error = ValidationError::new("price_discount");
            error.message = Some(
                format!("Discount price ({discount}) should be below regular price").into(),
            );
            Err(error)
        }
        _ => Ok(()),
    }
}

pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn visible_tours() -> Filter {
    Filter::new().ne("secretTour", true)
}

pub static TOURS: Collection = Collection {
    name: "tours",
    fields: &[
        ("name", FieldKind::Text),
        ("slug", FieldKind::Text),
        ("duration", FieldKind::Number),
        ("maxGroupSize", FieldKind::Number),
        ("difficulty", FieldKind::Text),
        ("ratingsAverage", FieldKind::Number),
        ("ratingsQuantity", FieldKind::Number),
        ("price", FieldKind::Number),
        ("priceDiscount", FieldKind::Number),
        ("summary", FieldKind::Text),
        ("description", FieldKind::Text),
        ("imageCover", FieldKind::Text),
        ("images", FieldKind::List(&FieldKind::Text)),
        ("createdAt", FieldKind::Date),
        ("startDates", FieldKind::List(&FieldKind::Date)),
        ("secretTour", FieldKind::Bool),
        ("startLocation", FieldKind::Object),
        ("locations", FieldKind::Object),
        ("guides", FieldKind::List(&FieldKind::Id)),
    ],
    unique: &[&["name"]],
    hidden: &["createdAt"],
    visibility: visible_tours,
};

/// Guides on every tour read.
pub static TOUR_LIST_POPULATION: [Population; 1] = [Population {
    path: "guides",
    from: &USERS,
    kind: PopulateKind::Ref,
    select: &["name", "email", "photo", "role"],
    nested: &[],
}];

/// A single tour also carries its reviews and their authors.
pub static TOUR_DETAIL_POPULATION: [Population; 1] = [Population {
    path: "reviews",
    from: &REVIEWS,
    kind: PopulateKind::Virtual {
        foreign_field: "tour",
    },
    select: &[],
    nested: &REVIEW_AUTHOR,
}];

impl Entity for Tour {
    const NAME: &'static str = "tour";
    const PLURAL: &'static str = "tours";
    const READ_ONLY: &'static [&'static str] = &[
        "id",
        "slug",
        "createdAt",
        "ratingsAverage",
        "ratingsQuantity",
    ];

    fn collection() -> &'static Collection {
        &TOURS
    }

    fn prepare(&mut self) {
        self.name = self.name.trim().to_string();
        self.slug = slugify(&self.name);
        self.ratings_average = round_to_tenth(self.ratings_average);
    }

    fn decorate(doc: &mut Document) {
        let weeks = doc
            .get("duration")
            .and_then(Value::as_f64)
            .and_then(|duration| serde_json::Number::from_f64(duration / 7.0));
        if let Some(weeks) = weeks {
            doc.insert("durationWeeks".to_string(), Value::Number(weeks));
        }
    }
}
