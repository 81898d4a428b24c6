//! Typed access to one document collection.

use super::{Document, Stored};
use crate::db::Database;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, params_from_iter, types::Value as SqlValue, OptionalExtension, Row};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Listing filter. `page` is 1-based.
#[derive(Debug, Clone)]
pub struct ListFilter {
    pub include_hidden: bool,
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub page: u32,
    pub limit: u32,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            include_hidden: false,
            category: None,
            featured: None,
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListFilter {
    /// Clamp page to >= 1 and limit to `1..=MAX_PAGE_SIZE`.
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.limit = self.limit.clamp(1, MAX_PAGE_SIZE);
        self
    }

    fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// One page of a listing plus the total match count.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<Stored<T>>,
    pub total: u64,
}

pub struct Collection<T> {
    db: Arc<Database>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> Collection<T> {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            _marker: PhantomData,
        }
    }

    pub fn list(&self, filter: &ListFilter) -> Result<Page<T>> {
        let mut clauses = vec!["collection = ?".to_string()];
        let mut args: Vec<SqlValue> = vec![SqlValue::Text(T::COLLECTION.to_string())];

        if !filter.include_hidden {
            clauses.push("visible = 1".to_string());
        }
        if let Some(category) = &filter.category {
            clauses.push("category = ?".to_string());
            args.push(SqlValue::Text(category.clone()));
        }
        if let Some(featured) = filter.featured {
            clauses.push("featured = ?".to_string());
            args.push(SqlValue::Integer(i64::from(featured)));
        }
        let where_sql = clauses.join(" AND ");

        self.db.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM documents WHERE {where_sql}"),
                params_from_iter(args.iter()),
                |row| row.get(0),
            )?;

            let mut page_args = args.clone();
            page_args.push(SqlValue::Integer(i64::from(filter.limit)));
            page_args.push(SqlValue::Integer(filter.offset() as i64));

            let mut stmt = conn.prepare(&format!(
                "SELECT id, body, created_at, updated_at FROM documents
                 WHERE {where_sql}
                 ORDER BY sort_order ASC, created_at DESC
                 LIMIT ? OFFSET ?"
            ))?;
            let rows = stmt
                .query_map(params_from_iter(page_args.iter()), raw_row)?
                .collect::<Result<Vec<_>, _>>()?;

            let items = rows
                .into_iter()
                .map(decode::<T>)
                .collect::<Result<Vec<_>>>()?;

            Ok(Page {
                items,
                total: total.max(0) as u64,
            })
        })
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<Stored<T>>> {
        let raw = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, body, created_at, updated_at FROM documents
                     WHERE collection = ?1 AND id = ?2",
                    params![T::COLLECTION, id.to_string()],
                    raw_row,
                )
                .optional()?)
        })?;
        raw.map(decode::<T>).transpose()
    }

    pub fn get_by_slug(&self, slug: &str) -> Result<Option<Stored<T>>> {
        let raw = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, body, created_at, updated_at FROM documents
                     WHERE collection = ?1 AND slug = ?2",
                    params![T::COLLECTION, slug],
                    raw_row,
                )
                .optional()?)
        })?;
        raw.map(decode::<T>).transpose()
    }

    /// Look up by id when `key` parses as a UUID, by slug otherwise.
    pub fn find(&self, key: &str) -> Result<Option<Stored<T>>> {
        match Uuid::parse_str(key) {
            Ok(id) => self.get(&id),
            Err(_) => self.get_by_slug(key),
        }
    }

    /// Whether another document in this collection already uses `slug`.
    pub fn slug_taken(&self, slug: &str, except: Option<&Uuid>) -> Result<bool> {
        let except = except.map(Uuid::to_string).unwrap_or_default();
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1 AND slug = ?2 AND id != ?3",
                params![T::COLLECTION, slug, except],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn insert(&self, doc: T) -> Result<Stored<T>> {
        let now = Utc::now();
        let stored = Stored {
            id: Uuid::new_v4(),
            doc,
            created_at: now,
            updated_at: now,
        };
        let body = serde_json::to_string(&stored.doc).context("Failed to encode document")?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO documents
                    (collection, id, slug, category, visible, featured, sort_order, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    T::COLLECTION,
                    stored.id.to_string(),
                    stored.doc.slug(),
                    stored.doc.category(),
                    stored.doc.is_visible(),
                    stored.doc.is_featured(),
                    stored.doc.sort_order(),
                    body,
                    stored.created_at,
                    stored.updated_at,
                ],
            )
            .with_context(|| format!("Failed to insert into {}", T::COLLECTION))?;
            Ok(())
        })?;

        debug!(collection = T::COLLECTION, id = %stored.id, "Document created");
        Ok(stored)
    }

    /// Overwrite the body of an existing document. `None` if it does not exist.
    pub fn replace(&self, id: &Uuid, doc: T) -> Result<Option<Stored<T>>> {
        let body = serde_json::to_string(&doc).context("Failed to encode document")?;
        let now = Utc::now();

        let rows = self.db.with_conn(|conn| {
            Ok(conn
                .execute(
                    "UPDATE documents SET
                        slug = ?1, category = ?2, visible = ?3, featured = ?4,
                        sort_order = ?5, body = ?6, updated_at = ?7
                     WHERE collection = ?8 AND id = ?9",
                    params![
                        doc.slug(),
                        doc.category(),
                        doc.is_visible(),
                        doc.is_featured(),
                        doc.sort_order(),
                        body,
                        now,
                        T::COLLECTION,
                        id.to_string(),
                    ],
                )
                .with_context(|| format!("Failed to update {} {}", T::COLLECTION, id))?)
        })?;

        if rows == 0 {
            return Ok(None);
        }
        self.get(id)
    }

    pub fn delete(&self, id: &Uuid) -> Result<bool> {
        let rows = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![T::COLLECTION, id.to_string()],
            )?)
        })?;

        if rows > 0 {
            debug!(collection = T::COLLECTION, id = %id, "Document deleted");
        }
        Ok(rows > 0)
    }
}

type RawRow = (String, String, chrono::DateTime<Utc>, chrono::DateTime<Utc>);

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode<T: Document>((id, body, created_at, updated_at): RawRow) -> Result<Stored<T>> {
    let id = Uuid::parse_str(&id).with_context(|| format!("Corrupt document id {id}"))?;
    let doc = serde_json::from_str(&body)
        .with_context(|| format!("Corrupt {} document {}", T::COLLECTION, id))?;
    Ok(Stored {
        id,
        doc,
        created_at,
        updated_at,
    })
}
