//! Case visibility and mutation rules through the HTTP surface.

mod common;

use authz_service::models::{Confidentiality, TypeRef};
use axum::http::{Method, StatusCode};
use common::{sorted_ids, spawn_app, Grant};
use serde_json::json;

#[tokio::test]
async fn unrestricted_application_sees_every_case() {
    let app = spawn_app();
    let (_, token) = app.register_client("all-seeing", true, &[]).await;
    let (x, _) = app.case_type("X").await;
    let mut seeded = Vec::new();
    for level in [
        Confidentiality::Public,
        Confidentiality::Confidential,
        Confidentiality::TopSecret,
    ] {
        seeded.push(app.seed_case(TypeRef::Local(x), level).await);
    }

    let response = app.get("/cases", &token).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["count"], 3);
    assert_eq!(
        response.result_ids("case_id"),
        sorted_ids(&seeded.iter().collect::<Vec<_>>())
    );
}

#[tokio::test]
async fn list_is_limited_by_type_and_ceiling() {
    let app = spawn_app();
    let (x, x_url) = app.case_type("X").await;
    let (y, _) = app.case_type("Y").await;
    let (_, token) = app
        .register_client(
            "b",
            false,
            &[Grant::cases(&["cases.read"], &x_url, Confidentiality::Confidential)],
        )
        .await;

    let x_public = app.seed_case(TypeRef::Local(x), Confidentiality::Public).await;
    let _x_secret = app.seed_case(TypeRef::Local(x), Confidentiality::Secret).await;
    let x_confidential = app
        .seed_case(TypeRef::Local(x), Confidentiality::Confidential)
        .await;
    app.seed_case(TypeRef::Local(y), Confidentiality::Public).await;
    app.seed_case(TypeRef::Local(y), Confidentiality::Confidential).await;

    let response = app.get("/cases", &token).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["count"], 2);
    assert_eq!(
        response.result_ids("case_id"),
        sorted_ids(&[&x_public, &x_confidential])
    );
    assert_eq!(response.body["results"][0]["case_type"], x_url);
}

#[tokio::test]
async fn detail_of_a_hidden_case_is_permission_denied() {
    let app = spawn_app();
    let (x, x_url) = app.case_type("X").await;
    let (_, token) = app
        .register_client(
            "b",
            false,
            &[Grant::cases(&["cases.read"], &x_url, Confidentiality::Confidential)],
        )
        .await;
    let secret = app.seed_case(TypeRef::Local(x), Confidentiality::Secret).await;
    let visible = app.seed_case(TypeRef::Local(x), Confidentiality::Internal).await;

    let response = app.get(&format!("/cases/{}", secret.case_id), &token).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.code(), "permission_denied");

    let response = app.get(&format!("/cases/{}", visible.case_id), &token).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["case_id"], visible.case_id.to_string());

    let response = app
        .get(&format!("/cases/{}", uuid::Uuid::new_v4()), &token)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn closed_case_needs_force_update() {
    let app = spawn_app();
    let (x, x_url) = app.case_type("X").await;
    let (_, updater) = app
        .register_client(
            "updater",
            false,
            &[Grant::cases(
                &["cases.read", "cases.update"],
                &x_url,
                Confidentiality::TopSecret,
            )],
        )
        .await;
    let (_, forcer) = app
        .register_client(
            "forcer",
            false,
            &[Grant::cases(
                &["cases.read", "cases.update", "cases.force_update"],
                &x_url,
                Confidentiality::TopSecret,
            )],
        )
        .await;
    let case = app.seed_case(TypeRef::Local(x), Confidentiality::Internal).await;
    app.close_case(case.case_id).await;
    let uri = format!("/cases/{}", case.case_id);

    let response = app
        .send(Method::PATCH, &uri, Some(&updater), Some(json!({"identification": "ZAAK-9"})))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.code(), "resource_closed");

    let response = app
        .send(Method::PATCH, &uri, Some(&forcer), Some(json!({"identification": "ZAAK-9"})))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["identification"], "ZAAK-9");

    // an open case only needs cases.update
    let open = app.seed_case(TypeRef::Local(x), Confidentiality::Internal).await;
    let response = app
        .send(
            Method::PUT,
            &format!("/cases/{}", open.case_id),
            Some(&updater),
            Some(json!({"identification": "ZAAK-10", "confidentiality": "intern"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn update_cannot_raise_a_case_above_the_ceiling() {
    let app = spawn_app();
    let (x, x_url) = app.case_type("X").await;
    let (_, token) = app
        .register_client(
            "capped",
            false,
            &[Grant::cases(
                &["cases.read", "cases.update"],
                &x_url,
                Confidentiality::Internal,
            )],
        )
        .await;
    let case = app.seed_case(TypeRef::Local(x), Confidentiality::Public).await;

    let response = app
        .send(
            Method::PATCH,
            &format!("/cases/{}", case.case_id),
            Some(&token),
            Some(json!({"confidentiality": "geheim"})),
        )
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.code(), "permission_denied");
}

#[tokio::test]
async fn external_type_urls_match_by_string() {
    let app = spawn_app();
    let external = "https://catalogue.elsewhere.example/case-types/permit";
    let (_, token) = app
        .register_client(
            "ext",
            false,
            &[Grant::cases(&["cases.read"], external, Confidentiality::TopSecret)],
        )
        .await;
    let matching = app
        .seed_case(TypeRef::External(external.into()), Confidentiality::Public)
        .await;
    app.seed_case(
        TypeRef::External("https://catalogue.elsewhere.example/case-types/other".into()),
        Confidentiality::Public,
    )
    .await;

    let response = app.get("/cases", &token).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.result_ids("case_id"), sorted_ids(&[&matching]));
    assert_eq!(response.body["results"][0]["case_type"], external);
}

#[tokio::test]
async fn create_is_limited_to_authorized_types_and_levels() {
    let app = spawn_app();
    let (_, x_url) = app.case_type("X").await;
    let (_, y_url) = app.case_type("Y").await;
    let (_, token) = app
        .register_client(
            "creator",
            false,
            &[Grant::cases(
                &["cases.read", "cases.create"],
                &x_url,
                Confidentiality::Internal,
            )],
        )
        .await;

    let create = |case_type: &str, level: &str| {
        json!({"identification": "ZAAK-NEW", "case_type": case_type, "confidentiality": level})
    };

    let response = app
        .send(Method::POST, "/cases", Some(&token), Some(create(&x_url, "intern")))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["case_type"], x_url);
    assert!(response.body["end_date"].is_null());

    let response = app
        .send(Method::POST, "/cases", Some(&token), Some(create(&x_url, "geheim")))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app
        .send(Method::POST, "/cases", Some(&token), Some(create(&y_url, "openbaar")))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let unknown = format!("{}/case-types/{}", common::LOCAL_BASE, uuid::Uuid::new_v4());
    let response = app
        .send(Method::POST, "/cases", Some(&token), Some(create(&unknown, "openbaar")))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), "invalid");
}

#[tokio::test]
async fn delete_requires_scope_and_respects_closure() {
    let app = spawn_app();
    let (x, x_url) = app.case_type("X").await;
    let (_, token) = app
        .register_client(
            "deleter",
            false,
            &[Grant::cases(
                &["cases.read", "cases.delete"],
                &x_url,
                Confidentiality::TopSecret,
            )],
        )
        .await;
    let open = app.seed_case(TypeRef::Local(x), Confidentiality::Public).await;
    let closed = app.seed_case(TypeRef::Local(x), Confidentiality::Public).await;
    app.close_case(closed.case_id).await;

    let response = app
        .send(Method::DELETE, &format!("/cases/{}", open.case_id), Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = app
        .send(Method::DELETE, &format!("/cases/{}", closed.case_id), Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.code(), "resource_closed");

    let (_, forcer) = app
        .register_client(
            "forced-deleter",
            false,
            &[Grant::cases(
                &["cases.read", "cases.delete", "cases.force_update"],
                &x_url,
                Confidentiality::TopSecret,
            )],
        )
        .await;
    let response = app
        .send(Method::DELETE, &format!("/cases/{}", closed.case_id), Some(&forcer), None)
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn list_filters_by_case_type_and_paginates() {
    let app = spawn_app();
    let (_, token) = app.register_client("all", true, &[]).await;
    let (x, x_url) = app.case_type("X").await;
    let (y, _) = app.case_type("Y").await;
    for _ in 0..3 {
        app.seed_case(TypeRef::Local(x), Confidentiality::Public).await;
    }
    app.seed_case(TypeRef::Local(y), Confidentiality::Public).await;

    let response = app
        .get(&format!("/cases?case_type={}&page_size=2", x_url), &token)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["count"], 3);
    assert_eq!(response.body["results"].as_array().unwrap().len(), 2);

    let response = app
        .get(&format!("/cases?case_type={}&page=2&page_size=2", x_url), &token)
        .await;
    assert_eq!(response.body["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn status_rules_follow_scopes() {
    let app = spawn_app();
    let (x, x_url) = app.case_type("X").await;
    let (_, creator) = app
        .register_client(
            "creator",
            false,
            &[Grant::cases(
                &["cases.read", "cases.create"],
                &x_url,
                Confidentiality::TopSecret,
            )],
        )
        .await;
    let (_, adder) = app
        .register_client(
            "adder",
            false,
            &[Grant::cases(
                &["cases.read", "cases.add_status"],
                &x_url,
                Confidentiality::TopSecret,
            )],
        )
        .await;
    let (_, reopener) = app
        .register_client(
            "reopener",
            false,
            &[Grant::cases(
                &["cases.read", "cases.reopen"],
                &x_url,
                Confidentiality::TopSecret,
            )],
        )
        .await;
    let case = app.seed_case(TypeRef::Local(x), Confidentiality::Public).await;
    let status = |is_final: bool| {
        json!({
            "case": case.case_id,
            "status_type": "https://catalogue.example/status-types/1",
            "is_final": is_final,
        })
    };

    // the initial status needs only cases.create
    let response = app
        .send(Method::POST, "/statuses", Some(&creator), Some(status(false)))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let response = app
        .send(Method::POST, "/statuses", Some(&creator), Some(status(false)))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(response.body["detail"]
        .as_str()
        .unwrap()
        .contains("initial status"));

    // a final status closes the case
    let response = app
        .send(Method::POST, "/statuses", Some(&adder), Some(status(true)))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let detail = app.get(&format!("/cases/{}", case.case_id), &adder).await;
    assert!(detail.body["end_date"].is_string());

    let response = app
        .send(Method::POST, "/statuses", Some(&adder), Some(status(false)))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(response.body["detail"]
        .as_str()
        .unwrap()
        .contains("cases.reopen"));

    // re-opening clears the end date
    let response = app
        .send(Method::POST, "/statuses", Some(&reopener), Some(status(false)))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let detail = app.get(&format!("/cases/{}", case.case_id), &adder).await;
    assert!(detail.body["end_date"].is_null());
}

#[tokio::test]
async fn statuses_inherit_case_visibility() {
    let app = spawn_app();
    let (x, x_url) = app.case_type("X").await;
    let (_, token) = app
        .register_client(
            "reader",
            false,
            &[Grant::cases(&["cases.read"], &x_url, Confidentiality::Internal)],
        )
        .await;
    let visible = app.seed_case(TypeRef::Local(x), Confidentiality::Public).await;
    let hidden = app.seed_case(TypeRef::Local(x), Confidentiality::Secret).await;
    app.close_case(visible.case_id).await;
    app.close_case(hidden.case_id).await;

    let response = app.get("/statuses", &token).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["count"], 1);
    assert_eq!(
        response.body["results"][0]["case_id"],
        visible.case_id.to_string()
    );

    let (_, all) = app.register_client("all", true, &[]).await;
    let everything = app.get("/statuses", &all).await;
    assert_eq!(everything.body["count"], 2);
    for result in everything.body["results"].as_array().unwrap() {
        let status_id = result["status_id"].as_str().unwrap();
        let response = app.get(&format!("/statuses/{}", status_id), &token).await;
        let expected = if result["case_id"] == visible.case_id.to_string() {
            StatusCode::OK
        } else {
            StatusCode::FORBIDDEN
        };
        assert_eq!(response.status, expected);
    }
}

#[tokio::test]
async fn detail_agrees_with_list() {
    let app = spawn_app();
    let (x, x_url) = app.case_type("X").await;
    let (y, _) = app.case_type("Y").await;
    let (_, token) = app
        .register_client(
            "b",
            false,
            &[Grant::cases(&["cases.read"], &x_url, Confidentiality::CaseConfidential)],
        )
        .await;
    let mut all = Vec::new();
    for type_id in [x, y] {
        for level in Confidentiality::LADDER {
            all.push(app.seed_case(TypeRef::Local(type_id), level).await);
        }
    }

    let listed = app.get("/cases", &token).await.result_ids("case_id");
    for case in &all {
        let response = app.get(&format!("/cases/{}", case.case_id), &token).await;
        let in_list = listed.contains(&case.case_id.to_string());
        assert_eq!(response.status == StatusCode::OK, in_list, "{:?}", case);
    }
    assert_eq!(listed.len(), 4);
}
