//! Content document types

use super::Document;
use crate::validation::{is_valid_email, is_valid_slug, slugify, FieldErrors};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const WORDS_PER_MINUTE: usize = 200;
const EXCERPT_CHARS: usize = 160;

/// Blog article
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlogPost {
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub cover_image: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub published: bool,
    pub featured: bool,
    /// Minutes, derived from `content`
    pub read_time: u32,
    pub published_at: Option<DateTime<Utc>>,
}

impl Document for BlogPost {
    const COLLECTION: &'static str = "blog";
    const LABEL: &'static str = "Blog post";

    fn slug(&self) -> Option<&str> {
        Some(&self.slug)
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn is_visible(&self) -> bool {
        self.published
    }

    fn is_featured(&self) -> bool {
        self.featured
    }

    fn prepare(&mut self) {
        if self.slug.trim().is_empty() {
            self.slug = slugify(&self.title);
        }
        if self.excerpt.trim().is_empty() {
            self.excerpt = excerpt_of(&self.content);
        }
        self.read_time = read_time_minutes(&self.content);
        if self.published && self.published_at.is_none() {
            self.published_at = Some(Utc::now());
        }
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.require_text("title", "Title", &self.title, 200);
        errors.require_text("content", "Content", &self.content, 100_000);
        errors.limit_text("excerpt", "Excerpt", Some(&self.excerpt), 500);
        check_slug(&mut errors, &self.slug);
        errors.check_url("coverImage", self.cover_image.as_deref());
        if self.tags.len() > 20 {
            errors.add("tags", "At most 20 tags are allowed");
        }
        errors
    }
}

/// Portfolio project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub title: String,
    pub slug: String,
    pub description: String,
    pub long_description: Option<String>,
    pub image: Option<String>,
    pub images: Vec<String>,
    pub technologies: Vec<String>,
    pub category: Option<String>,
    pub live_url: Option<String>,
    pub github_url: Option<String>,
    pub featured: bool,
    pub published: bool,
    pub order: i64,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            title: String::new(),
            slug: String::new(),
            description: String::new(),
            long_description: None,
            image: None,
            images: Vec::new(),
            technologies: Vec::new(),
            category: None,
            live_url: None,
            github_url: None,
            featured: false,
            published: true,
            order: 0,
        }
    }
}

impl Document for Project {
    const COLLECTION: &'static str = "portfolio";
    const LABEL: &'static str = "Project";

    fn slug(&self) -> Option<&str> {
        Some(&self.slug)
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn is_visible(&self) -> bool {
        self.published
    }

    fn is_featured(&self) -> bool {
        self.featured
    }

    fn sort_order(&self) -> i64 {
        self.order
    }

    fn prepare(&mut self) {
        if self.slug.trim().is_empty() {
            self.slug = slugify(&self.title);
        }
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.require_text("title", "Title", &self.title, 200);
        errors.require_text("description", "Description", &self.description, 1_000);
        errors.limit_text(
            "longDescription",
            "Long description",
            self.long_description.as_deref(),
            20_000,
        );
        check_slug(&mut errors, &self.slug);
        errors.check_url("image", self.image.as_deref());
        errors.check_url("liveUrl", self.live_url.as_deref());
        errors.check_url("githubUrl", self.github_url.as_deref());
        for image in &self.images {
            errors.check_url("images", Some(image));
        }
        if self.technologies.len() > 30 {
            errors.add("technologies", "At most 30 technologies are allowed");
        }
        errors
    }
}

/// Offered service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Service {
    pub title: String,
    pub description: String,
    pub icon: Option<String>,
    pub features: Vec<String>,
    pub price: Option<String>,
    pub is_active: bool,
    pub order: i64,
}

impl Default for Service {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            icon: None,
            features: Vec::new(),
            price: None,
            is_active: true,
            order: 0,
        }
    }
}

impl Document for Service {
    const COLLECTION: &'static str = "services";
    const LABEL: &'static str = "Service";

    fn is_visible(&self) -> bool {
        self.is_active
    }

    fn sort_order(&self) -> i64 {
        self.order
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.require_text("title", "Title", &self.title, 100);
        errors.require_text("description", "Description", &self.description, 2_000);
        errors.limit_text("price", "Price", self.price.as_deref(), 50);
        if self.features.len() > 20 {
            errors.add("features", "At most 20 features are allowed");
        }
        errors
    }
}

/// Client testimonial
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Testimonial {
    pub name: String,
    pub role: Option<String>,
    pub company: Option<String>,
    pub content: String,
    pub rating: u8,
    pub avatar: Option<String>,
    pub featured: bool,
    pub approved: bool,
}

impl Default for Testimonial {
    fn default() -> Self {
        Self {
            name: String::new(),
            role: None,
            company: None,
            content: String::new(),
            rating: 5,
            avatar: None,
            featured: false,
            approved: true,
        }
    }
}

impl Document for Testimonial {
    const COLLECTION: &'static str = "testimonials";
    const LABEL: &'static str = "Testimonial";

    fn is_visible(&self) -> bool {
        self.approved
    }

    fn is_featured(&self) -> bool {
        self.featured
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.require_text("name", "Name", &self.name, 100);
        errors.require_text("content", "Content", &self.content, 2_000);
        errors.limit_text("role", "Role", self.role.as_deref(), 100);
        errors.limit_text("company", "Company", self.company.as_deref(), 100);
        if !(1..=5).contains(&self.rating) {
            errors.add("rating", "Rating must be between 1 and 5");
        }
        errors.check_url("avatar", self.avatar.as_deref());
        errors
    }
}

/// Work history entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Experience {
    pub company: String,
    pub position: String,
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub current: bool,
    pub description: String,
    pub technologies: Vec<String>,
    pub order: i64,
}

impl Document for Experience {
    const COLLECTION: &'static str = "experience";
    const LABEL: &'static str = "Experience";

    fn sort_order(&self) -> i64 {
        self.order
    }

    fn prepare(&mut self) {
        if self.current {
            self.end_date = None;
        }
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.require_text("company", "Company", &self.company, 100);
        errors.require_text("position", "Position", &self.position, 100);
        errors.limit_text("description", "Description", Some(&self.description), 5_000);

        match (self.start_date, self.end_date) {
            (None, _) => errors.add("startDate", "Start date is required"),
            (Some(start), Some(end)) if end < start => {
                errors.add("endDate", "End date must not be before start date")
            }
            (Some(_), None) if !self.current => {
                errors.add("endDate", "End date is required unless this is the current position")
            }
            _ => {}
        }
        errors
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    #[default]
    New,
    Read,
    Replied,
    Archived,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::New => "new",
            ContactStatus::Read => "read",
            ContactStatus::Replied => "replied",
            ContactStatus::Archived => "archived",
        }
    }
}

/// Message left through the contact form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub status: ContactStatus,
    /// Rate-limit client identifier of the sender
    pub client_id: Option<String>,
}

impl Document for ContactMessage {
    const COLLECTION: &'static str = "contact";
    const LABEL: &'static str = "Message";

    /// Messages are filtered by status.
    fn category(&self) -> Option<&str> {
        Some(self.status.as_str())
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.require_text("name", "Name", &self.name, 100);
        if self.email.trim().is_empty() {
            errors.add("email", "Email is required");
        } else if !is_valid_email(&self.email) {
            errors.add("email", "Email is invalid");
        }
        errors.limit_text("subject", "Subject", self.subject.as_deref(), 200);

        let length = self.message.trim().chars().count();
        if length == 0 {
            errors.add("message", "Message is required");
        } else if length < 10 {
            errors.add("message", "Message must be at least 10 characters");
        } else if length > 5_000 {
            errors.add("message", "Message must be at most 5000 characters");
        }
        errors
    }
}

fn check_slug(errors: &mut FieldErrors, slug: &str) {
    if slug.is_empty() {
        errors.add("slug", "Slug is required");
    } else if !is_valid_slug(slug) {
        errors.add(
            "slug",
            "Slug may only contain lowercase letters, digits and hyphens",
        );
    }
}

/// Reading time at 200 words per minute, at least one minute.
pub fn read_time_minutes(content: &str) -> u32 {
    let words = content.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as u32
}

fn excerpt_of(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    let cut = match cut.rfind(' ') {
        Some(idx) => &cut[..idx],
        None => cut.as_str(),
    };
    format!("{}...", cut.trim_end())
}
