use super::{AppError, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::OriginalUri,
    http::{Method, Request},
    middleware::Next,
};
use percent_encoding::percent_decode_str;
use worklog_shared::auth::Role;
use worklog_shared::jwt::JwtClaims;

pub async fn enforce_acl(req: Request<axum::body::Body>, next: Next) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };

    if let Err(err) = check(&method, &path, &auth.claims) {
        tracing::warn!(
            method = %method,
            path = %path,
            username = %auth.claims.sub,
            role = ?auth.claims.role,
            company_id = %auth.claims.company_id,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

/// Tenant prefix check followed by the per-role route rules.
fn check(method: &Method, path: &str, claims: &JwtClaims) -> Result<(), AppError> {
    let segs = segmented(path);
    let tenant_prefix = ["api", "v1", "companies"];
    let rest = match segs.as_slice() {
        [a, b, c, company, rest @ ..] if [*a, *b, *c] == tenant_prefix => {
            if decode(company) != claims.company_id {
                return Err(AppError::forbidden());
            }
            rest
        }
        _ => return Err(AppError::forbidden()),
    };

    match claims.role {
        Role::Admin => allow_admin(method, rest).or_else(|_| allow_employee(method, rest, claims)),
        Role::Employee => allow_employee(method, rest, claims),
    }
}

fn allow_admin(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    match rest {
        ["users", _, "attendance" | "rewards" | "monthly-report"] if *method == Method::GET => {
            Ok(())
        }
        ["users"] if *method == Method::GET || *method == Method::POST => Ok(()),
        ["users", _, "deactivate"] if *method == Method::POST => Ok(()),
        ["leaves"] if *method == Method::GET => Ok(()),
        ["leaves", id, "approve" | "reject"] if *method == Method::POST && is_id(id) => Ok(()),
        ["holidays"] if *method == Method::POST => Ok(()),
        ["corrections"] if *method == Method::GET => Ok(()),
        ["corrections", id, "approve" | "reject"] if *method == Method::POST && is_id(id) => {
            Ok(())
        }
        ["stats"] if *method == Method::GET => Ok(()),
        ["jobs"] if *method == Method::GET => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn allow_employee(method: &Method, rest: &[&str], claims: &JwtClaims) -> Result<(), AppError> {
    match rest {
        ["attendance", "login" | "logout"] if *method == Method::POST => Ok(()),
        ["attendance", "today"] if *method == Method::GET => Ok(()),
        ["users", user, "attendance" | "rewards" | "monthly-report"] if *method == Method::GET => {
            ensure_self(claims, user)
        }
        ["reports"] if *method == Method::POST => Ok(()),
        ["leaves"] if *method == Method::POST => Ok(()),
        ["corrections"] if *method == Method::POST => Ok(()),
        ["holidays"] if *method == Method::GET => Ok(()),
        ["badges"] if *method == Method::GET => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode(seg: &str) -> String {
    percent_decode_str(seg).decode_utf8_lossy().to_string()
}

fn is_id(seg: &str) -> bool {
    seg.parse::<i32>().is_ok()
}

fn ensure_self(claims: &JwtClaims, seg: &str) -> Result<(), AppError> {
    if decode(seg) == claims.user_id {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role) -> JwtClaims {
        JwtClaims {
            sub: "ada".into(),
            jti: "j".into(),
            exp: 0,
            role,
            user_id: "u 1".into(),
            company_id: "acme".into(),
        }
    }

    fn allowed(role: Role, method: Method, path: &str) -> bool {
        check(&method, path, &claims(role)).is_ok()
    }

    #[test]
    fn other_company_is_forbidden() {
        assert!(!allowed(Role::Admin, Method::GET, "/api/v1/companies/beta/stats"));
        assert!(!allowed(Role::Employee, Method::GET, "/api/v1/companies"));
        assert!(allowed(Role::Admin, Method::GET, "/api/v1/companies/acme/stats"));
    }

    #[test]
    fn employee_sees_only_own_records() {
        assert!(allowed(Role::Employee, Method::GET, "/api/v1/companies/acme/users/u%201/rewards"));
        assert!(!allowed(Role::Employee, Method::GET, "/api/v1/companies/acme/users/u2/rewards"));
        assert!(allowed(Role::Admin, Method::GET, "/api/v1/companies/acme/users/u2/attendance"));
    }

    #[test]
    fn admin_only_routes() {
        for (method, path) in [
            (Method::GET, "leaves"),
            (Method::POST, "leaves/3/approve"),
            (Method::POST, "holidays"),
            (Method::GET, "corrections"),
            (Method::POST, "corrections/9/reject"),
            (Method::GET, "users"),
            (Method::POST, "users/u2/deactivate"),
            (Method::GET, "jobs"),
        ] {
            let full = format!("/api/v1/companies/acme/{path}");
            assert!(allowed(Role::Admin, method.clone(), &full), "{full}");
            assert!(!allowed(Role::Employee, method, &full), "{full}");
        }
        assert!(!allowed(Role::Admin, Method::POST, "/api/v1/companies/acme/leaves/x/approve"));
    }

    #[test]
    fn self_service_routes_are_open_to_both_roles() {
        for role in [Role::Admin, Role::Employee] {
            assert!(allowed(role, Method::POST, "/api/v1/companies/acme/attendance/login"));
            assert!(allowed(role, Method::GET, "/api/v1/companies/acme/attendance/today"));
            assert!(allowed(role, Method::POST, "/api/v1/companies/acme/leaves"));
            assert!(allowed(role, Method::GET, "/api/v1/companies/acme/badges"));
            assert!(!allowed(role, Method::DELETE, "/api/v1/companies/acme/badges"));
        }
    }
}
