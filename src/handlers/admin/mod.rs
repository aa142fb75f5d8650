//! Authenticated back-office surface under `/admin`.
//!
//! Three auth tiers, enforced per route group:
//! - viewer: any active key; read endpoints plus self-service (2FA, own API
//!   keys)
//! - manager: mutations on business data
//! - admin: admin user management
//!
//! API-key routes sit in the viewer group because ownership decides access
//! there, not role; the handlers check `same_admin_or_admin_role` themselves.

mod audit_logs;
mod companies;
mod courses;
mod credentials;
mod enrollments;
mod kpis;
mod persons;
mod product_licenses;
mod twofactor;
mod users;

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, patch, post};
use axum::Router;

use crate::db::AppState;
use crate::middleware::{admin_auth, require_admin_role, require_manager_role};

pub fn router(state: AppState) -> Router<AppState> {
    let admin_routes = Router::new()
        .route("/admin/users", post(users::create_admin_user))
        .route("/admin/users", get(users::list_admin_users))
        .route("/admin/users/{id}", get(users::get_admin_user))
        .route("/admin/users/{id}", patch(users::update_admin_user))
        .layer(from_fn_with_state(state.clone(), require_admin_role));

    let manager_routes = Router::new()
        .route("/admin/companies", post(companies::create_company))
        .route("/admin/companies/{id}", patch(companies::update_company))
        .route("/admin/companies/{id}/suspend", post(companies::suspend_company))
        .route("/admin/companies/{id}/resume", post(companies::resume_company))
        .route("/admin/companies/{id}/licenses", post(companies::create_company_license))
        .route("/admin/persons", post(persons::create_person))
        .route("/admin/persons/{id}", patch(persons::update_person))
        .route("/admin/persons/{id}", delete(persons::delete_person))
        .route("/admin/persons/{id}/documents", post(persons::create_document))
        .route("/admin/persons/{id}/access-cards", post(persons::create_access_card))
        .route(
            "/admin/persons/{id}/policy-acknowledgments",
            post(persons::create_policy_acknowledgment),
        )
        .route("/admin/courses", post(courses::create_course))
        .route("/admin/courses/{id}", patch(courses::update_course))
        .route("/admin/courses/{id}/sessions", post(courses::create_session))
        .route("/admin/enrollments", post(enrollments::create_enrollment))
        .route("/admin/enrollments/{id}/assessment", post(enrollments::record_assessment))
        .route("/admin/credentials", post(credentials::issue_credential))
        .route("/admin/product-licenses", post(product_licenses::create_product_license))
        .route("/admin/product-licenses/{id}", patch(product_licenses::update_product_license))
        .route("/admin/kpis", post(kpis::create_kpi))
        .route("/admin/kpis/recalculate", post(kpis::recalculate_kpis))
        .layer(from_fn_with_state(state.clone(), require_manager_role));

    let viewer_routes = Router::new()
        .route("/admin/companies", get(companies::list_companies))
        .route("/admin/companies/{id}", get(companies::get_company))
        .route("/admin/companies/{id}/license", get(companies::check_company_license))
        .route("/admin/companies/{id}/activity", get(companies::list_company_activity))
        .route("/admin/persons", get(persons::list_persons))
        .route("/admin/persons/{id}", get(persons::get_person))
        .route("/admin/persons/{id}/export", get(persons::export_person_data))
        .route("/admin/persons/{id}/documents", get(persons::list_documents))
        .route("/admin/persons/{id}/access-cards", get(persons::list_access_cards))
        .route(
            "/admin/persons/{id}/policy-acknowledgments",
            get(persons::list_policy_acknowledgments),
        )
        .route("/admin/courses", get(courses::list_courses))
        .route("/admin/courses/{id}", get(courses::get_course))
        .route("/admin/courses/{id}/sessions", get(courses::list_sessions))
        .route("/admin/sessions/{id}/enrollments", get(enrollments::list_session_enrollments))
        .route("/admin/enrollments/{id}", get(enrollments::get_enrollment))
        .route("/admin/credentials", get(credentials::list_credentials))
        .route("/admin/credentials/{id}", get(credentials::get_credential))
        .route("/admin/product-licenses", get(product_licenses::list_product_licenses))
        .route("/admin/product-licenses/{id}", get(product_licenses::get_product_license))
        .route(
            "/admin/product-licenses/{id}/validations",
            get(product_licenses::list_license_validations),
        )
        .route("/admin/kpis", get(kpis::list_kpis))
        .route("/admin/kpis/latest", get(kpis::latest_kpis))
        .route("/admin/audit-logs", get(audit_logs::list_audit_logs))
        .route("/admin/2fa/enroll", post(twofactor::enroll))
        .route("/admin/2fa/activate", post(twofactor::activate))
        .route("/admin/2fa/verify", post(twofactor::verify))
        .route("/admin/2fa/disable", post(twofactor::disable))
        .route("/admin/users/{id}/api-keys", post(users::create_api_key))
        .route("/admin/users/{id}/api-keys", get(users::list_api_keys))
        .route("/admin/users/{id}/api-keys/{key_id}", delete(users::revoke_api_key))
        .layer(from_fn_with_state(state.clone(), admin_auth));

    admin_routes.merge(manager_routes).merge(viewer_routes)
}
