use serde_json::Value;
use uuid::Uuid;

use crate::{
    domain::user::User,
    repository::{document::Document, entity::EntityRepository},
    usecase::{
        contracts::{DocumentStore, Repository},
        error::UsecaseError,
        handler_factory::Envelope,
    },
};

const SELF_EDITABLE: [&str; 2] = ["name", "email"];
const PASSWORD_FIELDS: [&str; 2] = ["password", "passwordConfirm"];

/// Operations a signed-in user runs against their own profile.
pub struct ProfileUseCase<S> {
    users: EntityRepository<User, S>,
}

impl<S: DocumentStore> ProfileUseCase<S> {
    pub fn new(store: S) -> Self {
        Self {
            users: EntityRepository::new(store),
        }
    }

    fn not_found(user_id: Uuid) -> UsecaseError {
        UsecaseError::NotFound {
            entity: "user",
            id: user_id,
        }
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn me(&self, user_id: Uuid) -> Result<Envelope, UsecaseError> {
        tracing::debug!("getting own profile");

        let doc = self
            .users
            .find_by_id(user_id, &[])
            .await?
            .ok_or_else(|| Self::not_found(user_id))?;

        Ok(Envelope::one("user", doc))
    }

    #[tracing::instrument(skip(self, payload), fields(user_id = %user_id))]
    pub async fn update_me(&self, user_id: Uuid, payload: Value) -> Result<Envelope, UsecaseError> {
        tracing::debug!("updating own profile");

        let Value::Object(payload) = payload else {
            return Err(UsecaseError::ValidationFailed(
                "Request body must be a JSON object".to_string(),
            ));
        };

        if PASSWORD_FIELDS.iter().any(|field| payload.contains_key(*field)) {
            tracing::warn!("password change attempted through profile update");
            return Err(UsecaseError::ValidationFailed(
                "This route is not for password updates. Please use /updateMyPassword instead."
                    .to_string(),
            ));
        }

        let patch = payload
            .into_iter()
            .filter(|(key, _)| SELF_EDITABLE.contains(&key.as_str()))
            .collect::<Document>();

        let doc = self
            .users
            .update_by_id(user_id, Value::Object(patch))
            .await?
            .ok_or_else(|| Self::not_found(user_id))?;

        tracing::info!("profile updated");
        Ok(Envelope::one("user", doc))
    }

    /// Soft delete: the document stays but drops out of every read.
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn delete_me(&self, user_id: Uuid) -> Result<(), UsecaseError> {
        tracing::debug!("deactivating own profile");

        let mut changes = Document::new();
        changes.insert("active".to_string(), Value::Bool(false));
        if !self.users.set_fields(user_id, changes).await? {
            return Err(Self::not_found(user_id));
        }

        tracing::info!("profile deactivated");
        Ok(())
    }
}
