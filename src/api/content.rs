//! CRUD routes shared by every content collection.

use super::{
    parse_json,
    response::{created, ok},
    ApiError, ApiResponse, AppState, Pagination,
};
use crate::auth::models::{ADMIN_ROLES, CONTENT_ROLES};
use crate::content::{Document, ListFilter};
use crate::middleware::{rate_limit_middleware, RateLimitPolicy};
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::HeaderMap,
    middleware,
    response::Response,
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

/// Query string of listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub featured: Option<bool>,
    /// Include unpublished documents (content roles only).
    pub all: Option<bool>,
}

impl ListQuery {
    pub fn into_filter(self, include_hidden: bool) -> ListFilter {
        let defaults = ListFilter::default();
        ListFilter {
            include_hidden,
            category: self.category.filter(|c| !c.is_empty()),
            featured: self.featured,
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
        }
        .normalized()
    }
}

pub fn query_or_400<Q>(query: Result<Query<Q>, QueryRejection>) -> Result<Q, ApiError> {
    query
        .map(|Query(q)| q)
        .map_err(|e| ApiError::validation(e.body_text()))
}

/// Routes for one collection under `/api/{collection}`.
///
/// Reads use the public budget, writes the authenticated API budget.
pub fn resource_router<T: Document>(state: &AppState) -> Router<AppState> {
    let base = format!("/api/{}", T::COLLECTION);
    let item = format!("{base}/:key");

    let reads = Router::new()
        .route(&base, get(list::<T>))
        .route(&item, get(detail::<T>))
        .route_layer(middleware::from_fn_with_state(
            state.gate(RateLimitPolicy::PUBLIC),
            rate_limit_middleware,
        ));

    let writes = Router::new()
        .route(&base, post(create::<T>))
        .route(&item, patch(update::<T>).delete(remove::<T>))
        .route_layer(middleware::from_fn_with_state(
            state.gate(RateLimitPolicy::API),
            rate_limit_middleware,
        ));

    reads.merge(writes)
}

pub async fn list<T: Document>(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let query = query_or_400(query)?;
    let include_hidden = query.all.unwrap_or(false);
    if include_hidden {
        state.auth.authorize(&headers, CONTENT_ROLES)?;
    }

    let filter = query.into_filter(include_hidden);
    let page = state.collection::<T>().list(&filter)?;

    Ok(ok(ApiResponse::paginated(
        page.items,
        Pagination::new(filter.page, filter.limit, page.total),
    )))
}

/// Fetch by id or slug. Hidden documents only resolve for content roles.
pub async fn detail<T: Document>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let stored = state
        .collection::<T>()
        .find(&key)?
        .ok_or_else(|| ApiError::not_found(T::LABEL))?;

    if !stored.doc.is_visible() && state.auth.authorize(&headers, CONTENT_ROLES).is_err() {
        return Err(ApiError::not_found(T::LABEL));
    }

    Ok(ok(ApiResponse::data(stored)))
}

pub async fn create<T: Document>(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let user = state.auth.authorize(&headers, CONTENT_ROLES)?;
    let mut doc: T = parse_json(&body)?;
    doc.prepare();
    check_document(&state, &doc, None)?;

    let stored = state.collection::<T>().insert(doc)?;
    info!(collection = T::COLLECTION, id = %stored.id, user_id = %user.id, "Content created");

    Ok(created(
        ApiResponse::data(stored).with_message(format!("{} created successfully", T::LABEL)),
    ))
}

/// Partial update: the body is merged over the stored document, then the
/// result is validated as a whole.
pub async fn update<T: Document>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let user = state.auth.authorize(&headers, CONTENT_ROLES)?;
    let id = Uuid::parse_str(&key).map_err(|_| ApiError::not_found(T::LABEL))?;
    let changes: Value = parse_json(&body)?;
    if !changes.is_object() {
        return Err(ApiError::validation("Request body must be a JSON object"));
    }

    let collection = state.collection::<T>();
    let existing = collection
        .get(&id)?
        .ok_or_else(|| ApiError::not_found(T::LABEL))?;

    let mut doc: T = merge_patch(&existing.doc, changes)?;
    doc.prepare();
    check_document(&state, &doc, Some(&id))?;

    let stored = collection
        .replace(&id, doc)?
        .ok_or_else(|| ApiError::not_found(T::LABEL))?;
    info!(collection = T::COLLECTION, id = %id, user_id = %user.id, "Content updated");

    Ok(ok(
        ApiResponse::data(stored).with_message(format!("{} updated successfully", T::LABEL))
    ))
}

pub async fn remove<T: Document>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let user = state.auth.authorize(&headers, ADMIN_ROLES)?;
    let id = Uuid::parse_str(&key).map_err(|_| ApiError::not_found(T::LABEL))?;

    if !state.collection::<T>().delete(&id)? {
        return Err(ApiError::not_found(T::LABEL));
    }
    info!(collection = T::COLLECTION, id = %id, user_id = %user.id, "Content deleted");

    Ok(ok(ApiResponse::message(format!(
        "{} deleted successfully",
        T::LABEL
    ))))
}

/// Field validation plus slug uniqueness within the collection.
fn check_document<T: Document>(
    state: &AppState,
    doc: &T,
    except: Option<&Uuid>,
) -> Result<(), ApiError> {
    let mut errors = doc.validate();
    if let Some(slug) = doc.slug().filter(|s| !s.is_empty()) {
        if errors.get("slug").is_none() && state.collection::<T>().slug_taken(slug, except)? {
            errors.add("slug", "Slug is already in use");
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}

/// Overlay the top-level fields of `patch` on `current`.
pub fn merge_patch<T: Document>(current: &T, patch: Value) -> Result<T, ApiError> {
    let mut merged = serde_json::to_value(current).map_err(anyhow::Error::from)?;
    if let (Value::Object(target), Value::Object(fields)) = (&mut merged, patch) {
        for (key, value) in fields {
            target.insert(key, value);
        }
    }
    serde_json::from_value(merged)
        .map_err(|e| ApiError::validation(format!("Invalid request body: {e}")))
}
