//! Authentication middleware
//!
//! JWT authentication and role-based access control middleware

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::AuthService;
use crate::AppState;
use shared::{Caller, Role};

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    /// None for owners and admins, who act on every branch
    pub branch_id: Option<Uuid>,
    pub role: Role,
}

impl AuthUser {
    /// Fail with `Forbidden` unless the user holds one of `roles`
    pub fn require_role(&self, roles: &[Role]) -> AppResult<()> {
        if self.has_role(roles) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "This action is not available to a {}",
                self.role
            )))
        }
    }

    /// The branch a request operates on. Branch staff always get their own
    /// branch; owners and admins must name one.
    pub fn resolve_branch(&self, requested: Option<Uuid>) -> AppResult<Uuid> {
        match (self.branch_id, requested) {
            (Some(own), Some(other)) if own != other && !self.role.is_global() => Err(
                AppError::Forbidden("Cannot act on another branch".to_string()),
            ),
            (_, Some(branch)) => Ok(branch),
            (Some(own), None) => Ok(own),
            (None, None) => Err(AppError::validation(
                "branch_id",
                "branch_id is required for users without a home branch",
            )),
        }
    }

    /// Fail with `Forbidden` unless the user may see records of `branch_id`
    pub fn require_branch(&self, branch_id: Uuid) -> AppResult<()> {
        if self.in_branch(branch_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Record belongs to another branch".to_string(),
            ))
        }
    }
}

impl Caller for AuthUser {
    fn caller_id(&self) -> Uuid {
        self.user_id
    }

    fn caller_role(&self) -> Role {
        self.role
    }

    fn caller_branch(&self) -> Option<Uuid> {
        self.branch_id
    }
}

/// Authentication middleware that validates JWT tokens from the
/// Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or_else(|| {
        AppError::Unauthorized("Missing or invalid Authorization header".to_string())
    })?;

    let auth_user = AuthService::authenticate(bearer.token(), &state.config.jwt.secret)?;
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}
