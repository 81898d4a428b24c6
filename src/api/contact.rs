//! Contact form and the admin inbox behind it.

use super::{
    content::query_or_400,
    parse_json,
    response::{created, ok},
    ApiError, ApiResponse, AppState, Pagination,
};
use crate::auth::models::ADMIN_ROLES;
use crate::config::AppConfig;
use crate::content::{ContactMessage, ContactStatus, Document, ListFilter};
use crate::mailer::Email;
use crate::middleware::{client_identifier, rate_limit_middleware, RateLimitPolicy};
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::HeaderMap,
    middleware,
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Public submission body. Status and sender id are set server side.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: ContactStatus,
}

/// Inbox query string. Only the contact inbox filters by status.
#[derive(Debug, Default, Deserialize)]
pub struct InboxQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<ContactStatus>,
}

impl InboxQuery {
    pub fn into_filter(self) -> ListFilter {
        let defaults = ListFilter::default();
        ListFilter {
            include_hidden: true,
            category: self.status.map(|status| status.as_str().to_string()),
            featured: None,
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
        }
        .normalized()
    }
}

pub fn router(state: &AppState) -> Router<AppState> {
    let submit = Router::new()
        .route("/api/contact", post(submit))
        .route_layer(middleware::from_fn_with_state(
            state.gate(RateLimitPolicy::CONTACT),
            rate_limit_middleware,
        ));

    let inbox = Router::new()
        .route("/api/contact", get(list))
        .route(
            "/api/contact/:id",
            get(detail).patch(update_status).delete(remove),
        )
        .route_layer(middleware::from_fn_with_state(
            state.gate(RateLimitPolicy::API),
            rate_limit_middleware,
        ));

    submit.merge(inbox)
}

/// POST /api/contact
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload: ContactRequest = parse_json(&body)?;

    let message = ContactMessage {
        name: payload.name.trim().to_string(),
        email: payload.email.trim().to_lowercase(),
        subject: payload
            .subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        message: payload.message.trim().to_string(),
        status: ContactStatus::New,
        client_id: Some(client_identifier(&headers)),
    };

    let errors = message.validate();
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let stored = state.collection::<ContactMessage>().insert(message)?;
    info!(id = %stored.id, "Contact message received");

    for email in notification_emails(&state.config, &stored.doc) {
        state.mailer.enqueue(email);
    }

    Ok(created(
        ApiResponse::data(json!({ "id": stored.id })).with_message("Message sent successfully"),
    ))
}

/// GET /api/contact?status=&page=&limit=
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<InboxQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    state.auth.authorize(&headers, ADMIN_ROLES)?;
    let filter = query_or_400(query)?.into_filter();
    let page = state.collection::<ContactMessage>().list(&filter)?;

    Ok(ok(ApiResponse::paginated(
        page.items,
        Pagination::new(filter.page, filter.limit, page.total),
    )))
}

/// GET /api/contact/:id. Opening a new message marks it read.
pub async fn detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    state.auth.authorize(&headers, ADMIN_ROLES)?;
    let id = parse_id(&id)?;

    let messages = state.collection::<ContactMessage>();
    let mut stored = messages
        .get(&id)?
        .ok_or_else(|| ApiError::not_found(ContactMessage::LABEL))?;

    if stored.doc.status == ContactStatus::New {
        let mut doc = stored.doc.clone();
        doc.status = ContactStatus::Read;
        if let Some(updated) = messages.replace(&id, doc)? {
            stored = updated;
        }
    }

    Ok(ok(ApiResponse::data(stored)))
}

/// PATCH /api/contact/:id with `{ "status": ... }`
pub async fn update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    state.auth.authorize(&headers, ADMIN_ROLES)?;
    let id = parse_id(&id)?;
    let update: StatusUpdate = parse_json(&body)?;

    let messages = state.collection::<ContactMessage>();
    let mut doc = messages
        .get(&id)?
        .ok_or_else(|| ApiError::not_found(ContactMessage::LABEL))?
        .doc;
    doc.status = update.status;

    let stored = messages
        .replace(&id, doc)?
        .ok_or_else(|| ApiError::not_found(ContactMessage::LABEL))?;

    Ok(ok(ApiResponse::data(stored).with_message("Message updated successfully")))
}

/// DELETE /api/contact/:id
pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    state.auth.authorize(&headers, ADMIN_ROLES)?;
    let id = parse_id(&id)?;

    if !state.collection::<ContactMessage>().delete(&id)? {
        return Err(ApiError::not_found(ContactMessage::LABEL));
    }
    Ok(ok(ApiResponse::message("Message deleted successfully")))
}

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::not_found(ContactMessage::LABEL))
}

/// Owner notification (when configured) plus an acknowledgement to the sender.
pub fn notification_emails(config: &AppConfig, message: &ContactMessage) -> Vec<Email> {
    let subject = message.subject.as_deref().unwrap_or("(no subject)");
    let mut emails = Vec::with_capacity(2);

    if let Some(owner) = &config.contact_notify_email {
        emails.push(Email {
            to: owner.clone(),
            subject: format!("[{}] New contact message: {}", config.site_name, subject),
            text: format!(
                "From: {} <{}>\nSubject: {}\n\n{}",
                message.name, message.email, subject, message.message
            ),
            reply_to: Some(message.email.clone()),
        });
    }

    emails.push(Email {
        to: message.email.clone(),
        subject: format!("Thanks for getting in touch with {}", config.site_name),
        text: format!(
            "Hi {},\n\nThanks for your message. I will get back to you as soon as possible.\n\n{}",
            message.name, config.site_name
        ),
        reply_to: config.contact_notify_email.clone(),
    });

    emails
}
