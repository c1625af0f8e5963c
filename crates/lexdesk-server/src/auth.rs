use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use lexdesk_core::{
    store::Store,
    types::{Principal, UserRole},
    ApiError,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Resolves the bearer token to a tenant-scoped principal. Token issuance
/// is external; the core contract is only "authenticated principal resolves
/// to a tenant id" via the user index.
pub fn authenticate(
    store: &Store,
    auth_secret: &str,
    headers: &HeaderMap,
) -> Result<Principal, ApiError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthenticated)?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(auth_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| ApiError::Unauthenticated)?;
    let uid = data.claims.sub;

    let tenant_id = store
        .tenant_for_uid(&uid)?
        .ok_or(ApiError::NotFound("Perfil de usuário"))?;
    let profile = store
        .get_user(&tenant_id, &uid)?
        .ok_or(ApiError::NotFound("Perfil de usuário"))?;
    if !profile.active {
        return Err(ApiError::PermissionDenied("Usuário desativado.".into()));
    }

    Ok(Principal {
        uid,
        tenant_id,
        role: profile.role,
    })
}

pub fn require_admin(principal: &Principal) -> Result<(), ApiError> {
    if principal.role != UserRole::Admin {
        return Err(ApiError::PermissionDenied(
            "Apenas administradores podem executar esta operação.".into(),
        ));
    }
    Ok(())
}
