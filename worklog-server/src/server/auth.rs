use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use tracing::{error, warn};
use worklog_shared::jwt::{self, JwtClaims};

use super::{AppError, AppState};
use crate::storage::models::User;

/// How many days of inactivity before a session is considered expired.
const SESSION_IDLE_DAYS: i64 = 14;
/// How many days before mandatory re-login.
const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub claims: JwtClaims,
}

pub async fn require_bearer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let unauthorized = || Err(AppError::unauthorized());
    let header_val = match req.headers().get(header::AUTHORIZATION) {
        Some(v) => v,
        None => return unauthorized(),
    };
    let header_str = header_val.to_str().map_err(|_| AppError::unauthorized())?;
    let Some(token) = header_str.strip_prefix("Bearer ") else {
        return unauthorized();
    };

    let claims = match jwt::decode_and_verify(token, state.config.jwt_secret.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            warn!(error=%e, "auth: jwt decode failed");
            return unauthorized();
        }
    };

    // Deactivated users lose access on their next request
    let user = state
        .store
        .get_user(&claims.user_id)
        .await
        .map_err(AppError::internal)?;
    let Some(user) = user else {
        warn!(user_id = %claims.user_id, "auth: token for unknown user");
        return unauthorized();
    };
    if let Err(e) = validate_claims(&user, &claims) {
        warn!(error=?e, username=%claims.sub, "auth: validate_claims failed");
        return unauthorized();
    }

    let jti = claims.jti.clone();
    let cutoff = Utc::now() - Duration::days(SESSION_IDLE_DAYS);
    match state.store.touch_session_with_cutoff(&jti, cutoff).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(
                jti = %jti,
                username = %claims.sub,
                cutoff = %cutoff,
                idle_days = SESSION_IDLE_DAYS,
                "auth: session missing or expired (last_used_at < cutoff)"
            );
            return unauthorized();
        }
        Err(e) => {
            error!(jti = %jti, error=%e, "auth: touch_session_with_cutoff failed");
            return Err(AppError::internal(e));
        }
    }
    req.extensions_mut().insert(AuthCtx { claims });
    Ok(next.run(req).await)
}

pub async fn issue_jwt_for_user(state: &AppState, user: &User) -> Result<String, AppError> {
    let jti = uuid::Uuid::new_v4().to_string();
    let exp = (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp();
    let claims = JwtClaims {
        sub: user.username.clone(),
        jti: jti.clone(),
        exp,
        role: user.role(),
        user_id: user.id.clone(),
        company_id: user.company_id.clone(),
    };

    validate_claims(user, &claims)?;

    state
        .store
        .create_session(&jti, &user.username)
        .await
        .map_err(|e| {
            error!(username = %user.username, error=%e, "login: create_session failed");
            AppError::internal(e)
        })?;
    let token = jwt::encode(&claims, state.config.jwt_secret.as_bytes()).map_err(|e| {
        error!(username = %user.username, error=%e, "login: jwt encode failed");
        AppError::internal(e)
    })?;
    Ok(token)
}

fn validate_claims(user: &User, claims: &JwtClaims) -> Result<(), AppError> {
    if !user.active {
        warn!(username = %claims.sub, "auth: user is deactivated");
        return Err(AppError::forbidden());
    }
    if user.username != claims.sub || user.company_id != claims.company_id {
        warn!(
            username = %claims.sub,
            token_company = %claims.company_id,
            user_company = %user.company_id,
            "auth: identity mismatch"
        );
        return Err(AppError::forbidden());
    }
    if user.role() != claims.role {
        warn!(
            username = %claims.sub,
            requested_role = ?claims.role,
            actual_role = ?user.role(),
            "auth: role mismatch"
        );
        return Err(AppError::forbidden());
    }
    Ok(())
}
