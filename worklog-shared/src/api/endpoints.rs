use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::{API_V1_PREFIX, tenant_scope};

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

fn scoped(base: &str, company_id: &str, rest: &str) -> String {
    base_join(base, &format!("{}/{}", tenant_scope(company_id), rest))
}

pub fn auth_login(base: &str) -> String {
    base_join(base, &format!("{}/auth/login", API_V1_PREFIX))
}
pub fn attendance_login(base: &str, company_id: &str) -> String {
    scoped(base, company_id, "attendance/login")
}
pub fn attendance_logout(base: &str, company_id: &str) -> String {
    scoped(base, company_id, "attendance/logout")
}
pub fn attendance_today(base: &str, company_id: &str) -> String {
    scoped(base, company_id, "attendance/today")
}
pub fn user_attendance(base: &str, company_id: &str, user_id: &str) -> String {
    scoped(base, company_id, &format!("users/{}/attendance", enc(user_id)))
}
pub fn user_rewards(base: &str, company_id: &str, user_id: &str) -> String {
    scoped(base, company_id, &format!("users/{}/rewards", enc(user_id)))
}
pub fn user_monthly_report(base: &str, company_id: &str, user_id: &str, month: &str) -> String {
    scoped(
        base,
        company_id,
        &format!("users/{}/monthly-report?month={}", enc(user_id), enc(month)),
    )
}
pub fn reports(base: &str, company_id: &str) -> String {
    scoped(base, company_id, "reports")
}
pub fn leaves(base: &str, company_id: &str) -> String {
    scoped(base, company_id, "leaves")
}
pub fn leave_decision(base: &str, company_id: &str, leave_id: i32, approve: bool) -> String {
    let action = if approve { "approve" } else { "reject" };
    scoped(base, company_id, &format!("leaves/{}/{}", leave_id, action))
}
pub fn holidays(base: &str, company_id: &str) -> String {
    scoped(base, company_id, "holidays")
}
pub fn corrections(base: &str, company_id: &str) -> String {
    scoped(base, company_id, "corrections")
}
pub fn correction_decision(
    base: &str,
    company_id: &str,
    correction_id: i32,
    approve: bool,
) -> String {
    let action = if approve { "approve" } else { "reject" };
    scoped(
        base,
        company_id,
        &format!("corrections/{}/{}", correction_id, action),
    )
}
pub fn users(base: &str, company_id: &str) -> String {
    scoped(base, company_id, "users")
}
pub fn user_deactivate(base: &str, company_id: &str, user_id: &str) -> String {
    scoped(base, company_id, &format!("users/{}/deactivate", enc(user_id)))
}
pub fn stats(base: &str, company_id: &str) -> String {
    scoped(base, company_id, "stats")
}
pub fn jobs(base: &str, company_id: &str) -> String {
    scoped(base, company_id, "jobs")
}
pub fn badges(base: &str, company_id: &str) -> String {
    scoped(base, company_id, "badges")
}
