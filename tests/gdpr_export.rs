//! Tests for the GDPR person-data export and erasure endpoints.
//!
//! The export bundles everything stored about a person into one JSON
//! document served as an attachment named persondata_{email}_{date}.json,
//! and each pull is audit logged. Erasure is a hard delete that cascades to
//! enrollments, credentials, documents and access cards.

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::*;

/// Person with one of everything attached. Returns (person, enrollment_id).
fn seed_person_with_history(state: &AppState, email: Option<&str>) -> (Person, String) {
    let conn = state.db.get().unwrap();
    let person = queries::create_person(
        &conn,
        &CreatePerson {
            first_name: "Ola".to_string(),
            last_name: "Nordmann".to_string(),
            email: email.map(|e| e.to_string()),
            birth_date: Some("1990-04-12".to_string()),
            phone: None,
        },
    )
    .unwrap();

    let course = queries::create_course(
        &conn,
        &CreateCourse {
            code: "HMS-100".to_string(),
            name: "HMS Grunnkurs".to_string(),
            description: None,
            validity_months: Some(24),
            grace_days: Some(14),
        },
    )
    .unwrap();
    let session = queries::create_session(
        &conn,
        &course.id,
        &CreateSession {
            kind: SessionKind::Classroom,
            starts_at: past_timestamp(10),
            ends_at: None,
            location: Some("Oslo".to_string()),
        },
    )
    .unwrap();
    let enrollment = queries::create_enrollment(&conn, &person.id, &session.id, "manual").unwrap();
    queries::complete_enrollment(&conn, &enrollment.id, past_timestamp(9)).unwrap();
    queries::insert_assessment(&conn, &enrollment.id, true, Some(92.0), past_timestamp(9)).unwrap();
    queries::insert_credential(
        &conn,
        &person.id,
        &course.id,
        Some(&enrollment.id),
        &generate_verification_code(),
        past_timestamp(9),
        Some(future_timestamp(720)),
        14,
    )
    .unwrap();
    queries::create_document(
        &conn,
        &person.id,
        &CreateDocument {
            title: "Kursbevis HMS-100".to_string(),
            category: "certificate".to_string(),
        },
    )
    .unwrap();
    queries::create_access_card(
        &conn,
        &person.id,
        &CreateAccessCard {
            card_number: "KORT-0042".to_string(),
            expires_at: None,
        },
    )
    .unwrap();
    queries::create_policy_acknowledgment(
        &conn,
        &person.id,
        &CreatePolicyAcknowledgment {
            policy_name: "Personvernerklæring 2025".to_string(),
        },
    )
    .unwrap();

    (person, enrollment.id)
}

#[tokio::test]
async fn test_export_returns_full_bundle_as_attachment() {
    let state = create_test_app_state();
    let (_viewer, key) = create_test_admin(&state, "viewer@kks.no", AdminRole::Viewer);
    let (person, enrollment_id) = seed_person_with_history(&state, Some("ola@example.no"));
    let app = test_app(state);

    let response = app
        .oneshot(get_request(
            &format!("/admin/persons/{}/export", person.id),
            Some(&key),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let expected_filename = format!("persondata_ola@example.no_{}.json", today);
    let disposition = response
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert_eq!(
        disposition,
        format!("attachment; filename=\"{}\"", expected_filename)
    );

    let json = body_json(response).await;
    assert_eq!(json["filename"], expected_filename);
    assert_eq!(json["person"]["email"], "ola@example.no");
    assert_eq!(json["enrollments"].as_array().unwrap().len(), 1);
    assert_eq!(json["enrollments"][0]["id"], enrollment_id.as_str());
    assert_eq!(json["assessments"].as_array().unwrap().len(), 1);
    assert_eq!(json["assessments"][0]["passed"], true);
    assert_eq!(json["credentials"].as_array().unwrap().len(), 1);
    assert_eq!(json["documents"].as_array().unwrap().len(), 1);
    assert_eq!(json["documents"][0]["title"], "Kursbevis HMS-100");
    assert_eq!(json["access_cards"].as_array().unwrap().len(), 1);
    assert_eq!(json["policy_acknowledgment_count"], 1);
}

#[tokio::test]
async fn test_export_filename_falls_back_to_person_id() {
    let state = create_test_app_state();
    let (_viewer, key) = create_test_admin(&state, "viewer@kks.no", AdminRole::Viewer);
    let (person, _) = seed_person_with_history(&state, None);
    let app = test_app(state);

    let response = app
        .oneshot(get_request(
            &format!("/admin/persons/{}/export", person.id),
            Some(&key),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let filename = json["filename"].as_str().unwrap();
    assert!(filename.starts_with(&format!("persondata_{}_", person.id)));
    assert!(filename.ends_with(".json"));
}

#[tokio::test]
async fn test_export_writes_audit_entry() {
    let state = create_test_app_state();
    let (admin, key) = create_test_admin(&state, "viewer@kks.no", AdminRole::Viewer);
    let (person, _) = seed_person_with_history(&state, Some("ola@example.no"));
    let app = test_app(state.clone());

    let response = app
        .oneshot(get_request(
            &format!("/admin/persons/{}/export", person.id),
            Some(&key),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let audit_conn = state.audit.get().unwrap();
    let (actor_id, details): (String, String) = audit_conn
        .query_row(
            "SELECT actor_id, details FROM audit_logs WHERE action = 'export_person_data'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(actor_id, admin.id);
    let details: serde_json::Value = serde_json::from_str(&details).unwrap();
    assert_eq!(details["policy_acknowledgment_count"], 1);
    assert_eq!(details["enrollment_ids"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_export_unknown_person_returns_404() {
    let state = create_test_app_state();
    let (_viewer, key) = create_test_admin(&state, "viewer@kks.no", AdminRole::Viewer);
    let app = test_app(state);

    let response = app
        .oneshot(get_request("/admin/persons/no-such-id/export", Some(&key)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["details"], "Person not found");
}

#[tokio::test]
async fn test_delete_person_cascades_to_all_records() {
    let state = create_test_app_state();
    let (_manager, key) = create_test_admin(&state, "manager@kks.no", AdminRole::Manager);
    let (person, _) = seed_person_with_history(&state, Some("ola@example.no"));
    let app = test_app(state.clone());

    let response = app
        .oneshot(json_request(
            "DELETE",
            &format!("/admin/persons/{}", person.id),
            Some(&key),
            &json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["deleted"], true);

    let conn = state.db.get().unwrap();
    for table in [
        "persons",
        "enrollments",
        "credentials",
        "documents",
        "access_cards",
        "policy_acknowledgments",
    ] {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 0, "{} should be empty after erasure", table);
    }
}

#[tokio::test]
async fn test_delete_person_requires_manager_role() {
    let state = create_test_app_state();
    let (_viewer, key) = create_test_admin(&state, "viewer@kks.no", AdminRole::Viewer);
    let (person, _) = seed_person_with_history(&state, Some("ola@example.no"));
    let app = test_app(state);

    let response = app
        .oneshot(json_request(
            "DELETE",
            &format!("/admin/persons/{}", person.id),
            Some(&key),
            &json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
