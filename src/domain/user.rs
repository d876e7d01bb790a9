use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::Entity,
    repository::document::{Collection, FieldKind, Filter},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Self::User),
            "guide" => Some(Self::Guide),
            "lead-guide" => Some(Self::LeadGuide),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

fn default_photo() -> String {
    "default.jpg".to_string()
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// May be supplied on create so the profile shares the auth service's user id.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[validate(length(min = 1, message = "Please tell us your name!"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[serde(default = "default_photo")]
    pub photo: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_users() -> Filter {
    Filter::new().ne("active", false)
}

pub static USERS: Collection = Collection {
    name: "users",
    fields: &[
        ("name", FieldKind::Text),
        ("email", FieldKind::Text),
        ("photo", FieldKind::Text),
        ("role", FieldKind::Text),
        ("active", FieldKind::Bool),
    ],
    unique: &[&["email"]],
    hidden: &["active"],
    visibility: active_users,
};

impl Entity for User {
    const NAME: &'static str = "user";
    const PLURAL: &'static str = "users";
    const READ_ONLY: &'static [&'static str] = &["active"];

    fn collection() -> &'static Collection {
        &USERS
    }

    fn prepare(&mut self) {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_lowercase();
    }
}
