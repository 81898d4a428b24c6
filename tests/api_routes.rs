//! Integration tests for the HTTP surface
//!
//! Each test builds the full router over an in-memory database and drives it
//! with `oneshot` requests, so rate limiting, authentication and persistence
//! run exactly as they do in the server.

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use clap::Parser;
use folio_backend::{
    api::{create_router, AppState},
    auth::{JwtHandler, User, UserRole},
    config::AppConfig,
    db::Database,
    mailer::{Email, MailTransport, MailWorker, Mailer},
    middleware::RateLimiter,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret-0123456789abcdef";

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Email>>,
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, email: &Email) -> Result<()> {
        self.sent.lock().push(email.clone());
        Ok(())
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    mail: Arc<RecordingTransport>,
    worker: MailWorker,
}

impl TestApp {
    fn new(extra_args: &[&str]) -> Self {
        let mut args = vec!["folio", "--jwt-secret", SECRET, "--bcrypt-cost", "4"];
        args.extend_from_slice(extra_args);
        let config = AppConfig::try_parse_from(args).unwrap();

        let db = Arc::new(Database::open_in_memory().unwrap());
        let jwt = Arc::new(JwtHandler::with_ttl(&config.jwt_secret, config.token_ttl()));
        let mail = Arc::new(RecordingTransport::default());
        let (mailer, worker) = Mailer::spawn(mail.clone(), 16);

        let state = AppState::new(db, jwt, RateLimiter::new(), mailer, Arc::new(config));
        Self {
            router: create_router(state.clone()),
            state,
            mail,
            worker,
        }
    }

    /// Create an account directly in the store and sign a credential for it.
    fn user(&self, email: &str, role: UserRole) -> (User, String) {
        let user = self
            .state
            .users
            .create_user("Test User", email, "password123", role)
            .unwrap();
        let (token, _) = self.state.jwt.issue(&user).unwrap();
        (user, token)
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        self.send_from("203.0.113.7", method, uri, token, body).await
    }

    async fn send_from(
        &self,
        client_ip: &str,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", client_ip);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, json)
    }
}

fn contact_body() -> Value {
    json!({
        "name": "Visitor",
        "email": "visitor@example.com",
        "subject": "Hello",
        "message": "I would like to hear more about your work."
    })
}

fn post_body(title: &str, published: bool) -> Value {
    json!({
        "title": title,
        "content": "A short article about building things in Rust.",
        "published": published
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new(&[]);
    let (status, _, body) = app.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_contact_form_is_limited_to_three_per_hour() {
    let app = TestApp::new(&[]);

    for expected_remaining in ["2", "1", "0"] {
        let (status, headers, body) = app
            .send("POST", "/api/contact", None, Some(contact_body()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Message sent successfully");
        assert_eq!(headers["x-ratelimit-limit"], "3");
        assert_eq!(headers["x-ratelimit-remaining"], expected_remaining);
    }

    let (status, headers, body) = app
        .send("POST", "/api/contact", None, Some(contact_body()))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Too many requests. Please try again later.");
    assert!(headers.contains_key("retry-after"));
    assert_eq!(headers["x-ratelimit-remaining"], "0");

    // Another client has its own budget.
    let (status, _, _) = app
        .send_from("198.51.100.1", "POST", "/api/contact", None, Some(contact_body()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_rejected_contact_submission_still_counts() {
    let app = TestApp::new(&[]);
    let invalid = json!({ "name": "", "email": "nope", "message": "short" });

    let (status, _, body) = app
        .send("POST", "/api/contact", None, Some(invalid.clone()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation failed");
    assert!(body["errors"]["name"].is_string());
    assert!(body["errors"]["email"].is_string());
    assert_eq!(
        body["errors"]["message"],
        "Message must be at least 10 characters"
    );

    app.send("POST", "/api/contact", None, Some(invalid.clone())).await;
    app.send("POST", "/api/contact", None, Some(invalid)).await;

    let (status, _, _) = app
        .send("POST", "/api/contact", None, Some(contact_body()))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_contact_submission_sends_notifications() {
    let app = TestApp::new(&["--contact-notify-email", "owner@example.com"]);

    let (status, _, _) = app
        .send("POST", "/api/contact", None, Some(contact_body()))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let TestApp { mail, worker, .. } = app;
    worker.shutdown().await;

    let sent = mail.sent.lock();
    let recipients: Vec<_> = sent.iter().map(|e| e.to.as_str()).collect();
    assert_eq!(recipients, vec!["owner@example.com", "visitor@example.com"]);
}

#[tokio::test]
async fn test_contact_inbox_requires_admin() {
    let app = TestApp::new(&[]);
    let (_, editor) = app.user("editor@example.com", UserRole::Editor);
    let (_, admin) = app.user("admin@example.com", UserRole::Admin);

    let (_, _, created) = app
        .send("POST", "/api/contact", None, Some(contact_body()))
        .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, _, _) = app.send("GET", "/api/contact", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = app.send("GET", "/api/contact", Some(&editor), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden - Insufficient permissions");

    let (status, _, body) = app
        .send("GET", "/api/contact?status=new", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);

    let (_, _, body) = app
        .send("GET", "/api/contact?status=archived", Some(&admin), None)
        .await;
    assert_eq!(body["pagination"]["total"], 0);

    let (status, _, _) = app
        .send("GET", "/api/contact?status=spam", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Opening a new message marks it read.
    let uri = format!("/api/contact/{id}");
    let (status, _, body) = app.send("GET", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "read");

    let (status, _, body) = app
        .send("PATCH", &uri, Some(&admin), Some(json!({ "status": "replied" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "replied");

    let (status, _, _) = app.send("DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = app.send("GET", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_content_writes_require_roles() {
    let app = TestApp::new(&[]);
    let (_, viewer) = app.user("viewer@example.com", UserRole::Viewer);
    let (_, editor) = app.user("editor@example.com", UserRole::Editor);
    let (_, admin) = app.user("admin@example.com", UserRole::Admin);

    let (status, _, body) = app
        .send("POST", "/api/blog", None, Some(post_body("Hello", true)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _, _) = app
        .send("POST", "/api/blog", Some("not-a-token"), Some(post_body("Hello", true)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app
        .send("POST", "/api/blog", Some(&viewer), Some(post_body("Hello", true)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = app
        .send("POST", "/api/blog", Some(&editor), Some(post_body("Hello", true)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["slug"], "hello");
    assert_eq!(body["data"]["readTime"], 1);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let uri = format!("/api/blog/{id}");
    let (status, _, _) = app.send("DELETE", &uri, Some(&editor), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = app.send("DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Blog post deleted successfully");
}

#[tokio::test]
async fn test_content_listing_and_visibility() {
    let app = TestApp::new(&[]);
    let (_, editor) = app.user("editor@example.com", UserRole::Editor);

    for title in ["First", "Second", "Third"] {
        let (status, _, _) = app
            .send("POST", "/api/blog", Some(&editor), Some(post_body(title, true)))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (_, _, draft) = app
        .send("POST", "/api/blog", Some(&editor), Some(post_body("Draft", false)))
        .await;
    let draft_id = draft["data"]["id"].as_str().unwrap().to_string();

    let (status, _, body) = app.send("GET", "/api/blog?limit=2", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(
        body["pagination"],
        json!({ "page": 1, "limit": 2, "total": 3, "totalPages": 2 })
    );

    // Status filtering belongs to the contact inbox; content listings ignore it.
    let (status, _, body) = app.send("GET", "/api/blog?status=new", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 3);

    let (status, _, _) = app.send("GET", "/api/blog?all=true", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, _, body) = app
        .send("GET", "/api/blog?all=true", Some(&editor), None)
        .await;
    assert_eq!(body["pagination"]["total"], 4);

    let (status, _, _) = app.send("GET", "/api/blog/draft", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, body) = app.send("GET", "/api/blog/draft", Some(&editor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Draft");

    // Publishing through a partial update keeps the other fields.
    let (status, _, body) = app
        .send(
            "PATCH",
            &format!("/api/blog/{draft_id}"),
            Some(&editor),
            Some(json!({ "published": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Draft");
    assert!(body["data"]["publishedAt"].is_string());

    let (status, _, _) = app.send("GET", "/api/blog/draft", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = app.send("GET", "/api/blog?page=abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_duplicate_slug_is_a_field_error() {
    let app = TestApp::new(&[]);
    let (_, editor) = app.user("editor@example.com", UserRole::Editor);

    let (status, _, _) = app
        .send("POST", "/api/blog", Some(&editor), Some(post_body("Same Title", true)))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = app
        .send("POST", "/api/blog", Some(&editor), Some(post_body("Same Title", true)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"]["slug"], "Slug is already in use");
}

#[tokio::test]
async fn test_other_collections_are_served() {
    let app = TestApp::new(&[]);
    let (_, editor) = app.user("editor@example.com", UserRole::Editor);

    let (status, _, _) = app
        .send(
            "POST",
            "/api/services",
            Some(&editor),
            Some(json!({ "title": "Consulting", "description": "Architecture reviews" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    for uri in [
        "/api/services",
        "/api/portfolio",
        "/api/testimonials",
        "/api/experience",
    ] {
        let (status, _, body) = app.send("GET", uri, None, None).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body["success"], true);
    }

    let (_, _, body) = app.send("GET", "/api/services", None, None).await;
    assert_eq!(body["data"][0]["title"], "Consulting");
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = TestApp::new(&[]);

    let (status, _, body) = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "Owner", "email": "Owner@Example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["user"]["role"], "super_admin");
    assert_eq!(body["data"]["user"]["email"], "owner@example.com");

    // Registration closes once an account exists.
    let (status, _, _) = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "Other", "email": "other@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "owner@example.com", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email or password");

    let (status, _, body) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "owner@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["expiresIn"], 7 * 24 * 3600);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, _, body) = app.send("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Owner");
    assert!(body["data"]["lastLoginAt"].is_string());
    assert!(body["data"].get("passwordHash").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_registrations_yield_one_super_admin() {
    let app = Arc::new(TestApp::new(&["--allow-registration"]));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let body = json!({
                    "name": format!("User {i}"),
                    "email": format!("user{i}@example.com"),
                    "password": "password123"
                });
                app.send_from(
                    &format!("198.51.100.{i}"),
                    "POST",
                    "/api/auth/register",
                    None,
                    Some(body),
                )
                .await
            })
        })
        .collect();

    let mut super_admins = 0;
    for handle in handles {
        let (status, _, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        if body["data"]["user"]["role"] == "super_admin" {
            super_admins += 1;
        }
    }

    assert_eq!(super_admins, 1);
    assert_eq!(app.state.users.count().unwrap(), 4);
}

#[tokio::test]
async fn test_login_attempts_are_rate_limited() {
    let app = TestApp::new(&[]);
    let attempt = json!({ "email": "nobody@example.com", "password": "password123" });

    for _ in 0..5 {
        let (status, _, _) = app
            .send("POST", "/api/auth/login", None, Some(attempt.clone()))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, _, _) = app
        .send("POST", "/api/auth/login", None, Some(attempt))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_deactivated_account_loses_access_immediately() {
    let app = TestApp::new(&[]);
    let (_, owner) = app.user("owner@example.com", UserRole::SuperAdmin);
    let (editor, editor_token) = app.user("editor@example.com", UserRole::Editor);

    let (status, _, _) = app.send("GET", "/api/auth/me", Some(&editor_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = app
        .send(
            "PATCH",
            &format!("/api/admin/users/{}", editor.id),
            Some(&owner),
            Some(json!({ "isActive": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isActive"], false);

    let (status, _, _) = app.send("GET", "/api/auth/me", Some(&editor_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app
        .send("POST", "/api/blog", Some(&editor_token), Some(post_body("Late", true)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_change_applies_to_existing_credentials() {
    let app = TestApp::new(&[]);
    let (_, owner) = app.user("owner@example.com", UserRole::SuperAdmin);
    let (viewer, viewer_token) = app.user("viewer@example.com", UserRole::Viewer);

    let (status, _, _) = app
        .send("POST", "/api/blog", Some(&viewer_token), Some(post_body("Promoted", true)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.send(
        "PATCH",
        &format!("/api/admin/users/{}", viewer.id),
        Some(&owner),
        Some(json!({ "role": "editor" })),
    )
    .await;

    let (status, _, _) = app
        .send("POST", "/api/blog", Some(&viewer_token), Some(post_body("Promoted", true)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_account_management() {
    let app = TestApp::new(&[]);
    let (owner, owner_token) = app.user("owner@example.com", UserRole::SuperAdmin);
    let (_, admin_token) = app.user("admin@example.com", UserRole::Admin);

    let (status, _, _) = app
        .send("GET", "/api/admin/users", Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = app
        .send("GET", "/api/admin/users", Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, _, body) = app
        .send(
            "PATCH",
            &format!("/api/admin/users/{}", owner.id),
            Some(&owner_token),
            Some(json!({ "role": "viewer" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "You cannot demote or deactivate your own account");
}

#[tokio::test]
async fn test_change_password() {
    let app = TestApp::new(&[]);
    let (_, token) = app.user("editor@example.com", UserRole::Editor);

    let (status, _, body) = app
        .send(
            "PUT",
            "/api/auth/password",
            Some(&token),
            Some(json!({ "currentPassword": "incorrect", "newPassword": "new-password-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"]["currentPassword"], "Current password is incorrect");

    let (status, _, _) = app
        .send(
            "PUT",
            "/api/auth/password",
            Some(&token),
            Some(json!({ "currentPassword": "password123", "newPassword": "new-password-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "editor@example.com", "password": "new-password-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}
