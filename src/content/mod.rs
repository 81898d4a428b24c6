//! Portfolio content documents
//!
//! Every resource served by the site (blog posts, projects, services,
//! testimonials, experience entries, contact messages) is a JSON document
//! stored in its own collection.

pub mod models;
pub mod store;

use crate::validation::FieldErrors;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

pub use models::{BlogPost, ContactMessage, ContactStatus, Experience, Project, Service, Testimonial};
pub use store::{Collection, ListFilter, Page};

/// A document type that lives in a collection.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection name; also the URL segment under `/api/`.
    const COLLECTION: &'static str;
    /// Human readable name used in messages ("Blog post not found").
    const LABEL: &'static str;

    fn slug(&self) -> Option<&str> {
        None
    }

    /// Value of the list filter column (category, or status for messages).
    fn category(&self) -> Option<&str> {
        None
    }

    /// Whether anonymous visitors may see the document.
    fn is_visible(&self) -> bool {
        true
    }

    fn is_featured(&self) -> bool {
        false
    }

    fn sort_order(&self) -> i64 {
        0
    }

    /// Fill derived fields before validation.
    fn prepare(&mut self) {}

    fn validate(&self) -> FieldErrors;
}

/// A document together with its storage metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stored<T> {
    pub id: Uuid,
    #[serde(flatten)]
    pub doc: T,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
