//! Request shapes of the REST gateway against a mock backend.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use httpmock::MockServer;
use serde_json::json;
use time::macros::datetime;
use url::Url;
use uuid::Uuid;

use happylife::{
    gateway::{
        BackendClient, Bucket, FetchSpec, Filter, GatewayError, Records, RestGateway,
        StoredObject,
    },
    session::{RestAuth, SessionContext, SessionManager},
    types::{ContactInput, Donation, MarkRead},
};

const ANON_KEY: &str = "anon-key";

fn client(server: &MockServer) -> BackendClient {
    let base = Url::parse(&server.base_url()).expect("base url");
    BackendClient::new(base, ANON_KEY, Duration::from_secs(5)).expect("client")
}

fn records(server: &MockServer, session: SessionContext) -> Records {
    Records::new(Arc::new(RestGateway::new(client(server), session)))
}

fn donation_row(id: u128, title: &str) -> serde_json::Value {
    json!({
        "id": Uuid::from_u128(id),
        "title": title,
        "description": "Support",
        "target_amount": 1000,
        "current_amount": 250,
        "image_url": null,
        "is_active": true,
        "created_at": "2024-03-01T10:00:00Z",
        "updated_at": "2024-03-01T10:00:00Z"
    })
}

#[tokio::test]
async fn list_sends_filters_order_and_limit() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET")
            .path("/rest/v1/donations")
            .query_param("select", "*")
            .query_param("is_active", "eq.true")
            .query_param("order", "created_at.desc")
            .query_param("limit", "6")
            .header("apikey", ANON_KEY)
            .header("authorization", format!("Bearer {ANON_KEY}"));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!([donation_row(1, "Clean Water"), donation_row(2, "Books")]));
    });

    let spec = FetchSpec::new()
        .filter(Filter::eq("is_active", true))
        .order_desc("created_at")
        .limit(6);
    let rows: Vec<Donation> = records(&server, SessionContext::new())
        .list(&spec)
        .await
        .expect("rows");

    mock.assert();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].title, "Clean Water");
    assert_eq!(rows[0].progress_percent(), 25);
    assert_eq!(rows[1].created_at, datetime!(2024-03-01 10:00 UTC));
}

#[tokio::test]
async fn missing_single_row_is_none() {
    let server = MockServer::start();
    let id = Uuid::from_u128(9);
    let mock = server.mock(|when, then| {
        when.method("GET")
            .path("/rest/v1/donations")
            .query_param("id", format!("eq.{id}"))
            .header("accept", "application/vnd.pgrst.object+json");
        then.status(406)
            .header("content-type", "application/json")
            .body(
                r#"{"code":"PGRST116","details":"The result contains 0 rows","message":"JSON object requested, multiple (or no) rows returned"}"#,
            );
    });

    let found = records(&server, SessionContext::new())
        .get::<Donation>(id)
        .await
        .expect("lookup");

    mock.assert();
    assert!(found.is_none());
}

#[tokio::test]
async fn count_reads_the_exact_total() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("HEAD")
            .path("/rest/v1/contact_messages")
            .query_param("is_read", "eq.false")
            .header("prefer", "count=exact");
        then.status(200).header("content-range", "0-2/3");
    });

    let unread = records(&server, SessionContext::new())
        .count(happylife::types::Collection::Messages, &[Filter::eq("is_read", false)])
        .await
        .expect("count");

    mock.assert();
    assert_eq!(unread, 3);
}

#[tokio::test]
async fn contact_submission_does_not_read_the_row_back() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST")
            .path("/rest/v1/contact_messages")
            .header("prefer", "return=minimal")
            .json_body(json!([{
                "name": "Sita",
                "email": "sita@example.org",
                "subject": null,
                "message": "Namaste"
            }]));
        then.status(201);
    });

    records(&server, SessionContext::new())
        .submit(&ContactInput {
            name: "Sita".to_string(),
            email: "sita@example.org".to_string(),
            subject: None,
            message: "Namaste".to_string(),
        })
        .await
        .expect("submitted");

    mock.assert();
}

#[tokio::test]
async fn signed_in_writes_carry_the_access_token() {
    let server = MockServer::start();
    let token = server.mock(|when, then| {
        when.method("POST")
            .path("/auth/v1/token")
            .query_param("grant_type", "password");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "access_token": "jwt-admin",
                "token_type": "bearer",
                "expires_in": 3600,
                "refresh_token": "refresh",
                "user": {"id": "u1", "email": "admin@example.org"}
            }));
    });
    let id = Uuid::from_u128(7);
    let patch = server.mock(|when, then| {
        when.method("PATCH")
            .path("/rest/v1/contact_messages")
            .query_param("id", format!("eq.{id}"))
            .header("authorization", "Bearer jwt-admin")
            .header("prefer", "return=representation")
            .json_body(json!({"is_read": true}));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!([{
                "id": id,
                "name": "Ram",
                "email": "ram@example.org",
                "subject": null,
                "message": "Hello",
                "is_read": true,
                "created_at": "2024-03-01T10:00:00Z"
            }]));
    });

    let session = SessionContext::new();
    let manager = SessionManager::new(session.clone(), Arc::new(RestAuth::new(client(&server))));
    manager
        .sign_in("admin@example.org", "secret")
        .await
        .expect("signed in");

    let message: happylife::types::ContactMessage = records(&server, session)
        .update(id, &MarkRead { is_read: true })
        .await
        .expect("updated");

    token.assert();
    patch.assert();
    assert!(message.is_read);
}

#[tokio::test]
async fn upload_returns_the_public_url() {
    let server = MockServer::start();
    let at = datetime!(2024-03-01 10:00 UTC);
    let object = StoredObject::new(Bucket::Blogs, "Cover.JPG", Bytes::from_static(b"jpeg"), at);
    let name = object.name.clone();
    let mock = server.mock(|when, then| {
        when.method("POST")
            .path(format!("/storage/v1/object/blog-images/{name}"))
            .header("content-type", "image/jpeg");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"Key": format!("blog-images/{name}")}));
    });

    let url = records(&server, SessionContext::new())
        .upload(object)
        .await
        .expect("uploaded");

    mock.assert();
    assert!(name.starts_with("blog-") && name.ends_with(".jpg"));
    assert_eq!(
        url,
        format!(
            "{}/storage/v1/object/public/blog-images/{name}",
            server.base_url()
        )
    );
}

#[tokio::test]
async fn row_level_security_maps_to_authorization() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("DELETE").path("/rest/v1/donations");
        then.status(403)
            .header("content-type", "application/json")
            .json_body(json!({
                "code": "42501",
                "message": "permission denied for table donations"
            }));
    });

    let err = records(&server, SessionContext::new())
        .delete::<Donation>(Uuid::from_u128(1))
        .await
        .expect_err("denied");

    mock.assert();
    assert!(matches!(err, GatewayError::Authorization { .. }));
    assert!(!err.is_retryable());
}
