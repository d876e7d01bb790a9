use std::{fmt, sync::Arc};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    app::AppState,
    domain::user::Role,
    usecase::{contracts::DocumentStore, error::UsecaseError, jwt::TokenType},
};

#[derive(Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

// Spans and logs get the id and role only.
impl fmt::Debug for AuthenticatedUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedUser")
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

pub async fn auth_middleware<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, UsecaseError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or_else(|| {
            tracing::warn!("missing or invalid authorization header");
            UsecaseError::Unauthorized
        })?;

    let claims = state.token_verifier.verify(token).map_err(|e| {
        tracing::warn!(?e, "invalid token");
        UsecaseError::Unauthorized
    })?;

    if claims.token_type != TokenType::Access {
        tracing::warn!("attempted to use non-access token for authentication");
        return Err(UsecaseError::Unauthorized);
    }

    let user_id = Uuid::parse_str(&claims.sub).map_err(|e| {
        tracing::warn!(?e, "failed to parse user_id from token");
        UsecaseError::Unauthorized
    })?;

    let role = Role::parse(&claims.role).unwrap_or_else(|| {
        if !claims.role.is_empty() {
            tracing::warn!(role = %claims.role, "unknown role in token, treating as user");
        }
        Role::User
    });

    let authenticated_user = AuthenticatedUser {
        user_id,
        email: claims.email,
        role,
    };

    tracing::debug!(?authenticated_user, "user authenticated successfully");
    request.extensions_mut().insert(authenticated_user);

    Ok(next.run(request).await)
}

pub(crate) fn restrict_to(user: &AuthenticatedUser, roles: &[Role]) -> Result<(), UsecaseError> {
    if !roles.contains(&user.role) {
        tracing::warn!(user_id = %user.user_id, role = ?user.role, "insufficient role for endpoint");
        return Err(UsecaseError::Forbidden);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "lourdes@example.io".to_string(),
            role,
        }
    }

    #[test]
    fn test_restrict_to() {
        let staff = [Role::Admin, Role::LeadGuide];

        assert!(restrict_to(&user(Role::LeadGuide), &staff).is_ok());
        assert!(matches!(
            restrict_to(&user(Role::Guide), &staff),
            Err(UsecaseError::Forbidden)
        ));
    }

    #[test]
    fn test_debug_leaves_out_email() {
        let user = user(Role::User);

        let printed = format!("{user:?}");

        assert!(printed.contains(&user.user_id.to_string()));
        assert!(!printed.contains("lourdes@example.io"));
    }
}
