use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    http::StatusCode,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;

pub const ADMIN_ROLE: &str = "ADMIN";

// ============================================================================
// JWT Claims
// ============================================================================

/// Issued by the user-management service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Internal user id
    pub sub: String,
    #[serde(default)]
    pub open_id: Option<String>,
    #[serde(default)]
    pub role: String,
    pub exp: usize,
}

/// Caller identity injected into request extensions
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub open_id: Option<String>,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Validate a bearer token and resolve the caller
pub fn authenticate(secret: &str, token: &str) -> Result<AuthUser, StatusCode> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    ).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let claims = token_data.claims;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| StatusCode::UNAUTHORIZED)?;
    Ok(AuthUser { user_id, open_id: claims.open_id, role: claims.role })
}

fn bearer(req: &Request) -> Result<&str, StatusCode> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)
}

// ============================================================================
// Middleware
// ============================================================================

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let user = authenticate(&state.auth.secret, bearer(&req)?)?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let user = authenticate(&state.auth.secret, bearer(&req)?)?;
    if !user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, sub: &str, role: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            open_id: Some("open-1".to_string()),
            role: role.to_string(),
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn test_authenticate_valid_token() {
        let id = Uuid::new_v4();
        let user = authenticate("s3cret", &token("s3cret", &id.to_string(), "USER")).unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.open_id.as_deref(), Some("open-1"));
        assert!(!user.is_admin());
    }

    #[test]
    fn test_authenticate_rejects_bad_tokens() {
        let id = Uuid::new_v4().to_string();
        assert_eq!(authenticate("s3cret", &token("other", &id, "USER")).unwrap_err(), StatusCode::UNAUTHORIZED);
        assert_eq!(authenticate("s3cret", &token("s3cret", "not-a-uuid", "USER")).unwrap_err(), StatusCode::UNAUTHORIZED);
        assert_eq!(authenticate("s3cret", "garbage").unwrap_err(), StatusCode::UNAUTHORIZED);
    }
}
