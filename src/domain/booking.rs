use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::{tour::TOURS, user::USERS, Entity},
    repository::{
        document::{everything, Collection, FieldKind},
        populate::{PopulateKind, Population},
    },
};

fn paid_by_default() -> bool {
    true
}

/// Read-only once created.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub tour: Uuid,
    pub user: Uuid,
    #[validate(range(min = 0.0, message = "Booking price can not be negative"))]
    pub price: f64,
    #[serde(default = "paid_by_default")]
    pub paid: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

pub static BOOKINGS: Collection = Collection {
    name: "bookings",
    fields: &[
        ("tour", FieldKind::Id),
        ("user", FieldKind::Id),
        ("price", FieldKind::Number),
        ("paid", FieldKind::Bool),
        ("createdAt", FieldKind::Date),
    ],
    unique: &[],
    hidden: &["createdAt"],
    visibility: everything,
};

pub static BOOKING_POPULATION: [Population; 2] = [
    Population {
        path: "tour",
        from: &TOURS,
        kind: PopulateKind::Ref,
        select: &["name"],
        nested: &[],
    },
    Population {
        path: "user",
        from: &USERS,
        kind: PopulateKind::Ref,
        select: &["name", "email", "photo"],
        nested: &[],
    },
];

impl Entity for Booking {
    const NAME: &'static str = "booking";
    const PLURAL: &'static str = "bookings";
    const READ_ONLY: &'static [&'static str] = &["id", "createdAt"];

    fn collection() -> &'static Collection {
        &BOOKINGS
    }
}
