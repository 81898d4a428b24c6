//! User Storage
//! Accounts in SQLite, passwords hashed with bcrypt

use crate::auth::models::{User, UserRole};
use crate::db::Database;
use anyhow::{Context, Result};
use bcrypt::{hash, verify};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const PUBLIC_COLUMNS: &str =
    "id, name, email, role, is_active, avatar, last_login_at, created_at, updated_at";

/// User storage with SQLite backend
pub struct UserStore {
    db: Arc<Database>,
    bcrypt_cost: u32,
}

impl UserStore {
    pub fn new(db: Arc<Database>, bcrypt_cost: u32) -> Self {
        Self { db, bcrypt_cost }
    }

    pub fn count(&self) -> Result<i64> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
        })
    }

    /// Create the first super admin when the table is empty.
    /// Returns whether an account was created.
    pub fn ensure_bootstrap_admin(&self, name: &str, email: &str, password: &str) -> Result<bool> {
        if self.count()? > 0 {
            return Ok(false);
        }

        self.create_user(name, email, password, UserRole::SuperAdmin)
            .context("Failed to create bootstrap admin")?;

        info!(email = %email, "Bootstrap super admin created");
        Ok(true)
    }

    /// Load a user by id. The password hash is not read and is left empty.
    pub fn find_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {PUBLIC_COLUMNS} FROM users WHERE id = ?1");
            Ok(conn
                .query_row(&sql, params![id.to_string()], |row| user_from_row(row, None))
                .optional()?)
        })
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {PUBLIC_COLUMNS}, password_hash FROM users WHERE email = ?1");
            Ok(conn
                .query_row(&sql, params![email], |row| {
                    let hash: String = row.get(9)?;
                    user_from_row(row, Some(hash))
                })
                .optional()?)
        })
    }

    /// Check an email/password pair. Returns the account on a match.
    pub fn verify_password(&self, email: &str, password: &str) -> Result<Option<User>> {
        match self.find_by_email(email)? {
            Some(user) => {
                let valid =
                    verify(password, &user.password_hash).context("Failed to verify password")?;
                Ok(valid.then_some(user))
            }
            None => Ok(None),
        }
    }

    /// Create a new user
    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User> {
        let password_hash = hash(password, self.bcrypt_cost).context("Failed to hash password")?;
        let user = new_user(name, email, password_hash, role);

        self.db.with_conn(|conn| insert_user(conn, &user))?;

        info!(user_id = %user.id, role = user.role.as_str(), "Created user");
        Ok(user)
    }

    /// Self-registration. The first account becomes the super admin, later
    /// ones are viewers and only accepted when `allow_open` is set.
    ///
    /// Count, duplicate check and insert run in one transaction so concurrent
    /// registrations on an empty table yield exactly one super admin.
    pub fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        allow_open: bool,
    ) -> Result<Registration> {
        let password_hash = hash(password, self.bcrypt_cost).context("Failed to hash password")?;
        let email = normalize_email(email);

        let outcome = self.db.with_conn(|conn| {
            let tx = conn.transaction()?;

            let existing: i64 = tx.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            if existing > 0 && !allow_open {
                return Ok(Registration::Closed);
            }

            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                params![email],
                |row| row.get(0),
            )?;
            if taken {
                return Ok(Registration::EmailTaken);
            }

            let role = if existing == 0 {
                UserRole::SuperAdmin
            } else {
                UserRole::Viewer
            };
            let user = new_user(name, &email, password_hash, role);
            insert_user(&tx, &user)?;
            tx.commit().context("Failed to commit registration")?;

            Ok(Registration::Created(user))
        })?;

        if let Registration::Created(user) = &outcome {
            info!(user_id = %user.id, role = user.role.as_str(), "Registered user");
        }
        Ok(outcome)
    }

    pub fn update_password(&self, id: &Uuid, new_password: &str) -> Result<bool> {
        let password_hash =
            hash(new_password, self.bcrypt_cost).context("Failed to hash password")?;

        let rows = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
                params![password_hash, Utc::now(), id.to_string()],
            )?)
        })?;

        Ok(rows > 0)
    }

    /// Change role and/or active flag. `None` when the user does not exist.
    pub fn update_account(
        &self,
        id: &Uuid,
        role: Option<UserRole>,
        is_active: Option<bool>,
    ) -> Result<Option<User>> {
        let rows = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE users SET
                    role = COALESCE(?1, role),
                    is_active = COALESCE(?2, is_active),
                    updated_at = ?3
                 WHERE id = ?4",
                params![
                    role.map(|r| r.as_str()),
                    is_active,
                    Utc::now(),
                    id.to_string()
                ],
            )?)
        })?;

        if rows == 0 {
            return Ok(None);
        }

        if is_active == Some(false) {
            warn!(user_id = %id, "User deactivated");
        }

        self.find_by_id(id)
    }

    pub fn record_login(&self, id: &Uuid) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_login_at = ?1 WHERE id = ?2",
                params![Utc::now(), id.to_string()],
            )?;
            Ok(())
        })
    }

    /// List all users, oldest first
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {PUBLIC_COLUMNS} FROM users ORDER BY created_at ASC");
            let mut stmt = conn.prepare(&sql)?;
            let users = stmt
                .query_map([], |row| user_from_row(row, None))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }

    #[cfg(test)]
    pub(crate) fn delete_user(&self, id: &Uuid) -> Result<bool> {
        self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])? > 0)
        })
    }
}

/// Outcome of [`UserStore::register`].
#[derive(Debug)]
pub enum Registration {
    Created(User),
    /// Accounts exist and open registration is off.
    Closed,
    EmailTaken,
}

fn new_user(name: &str, email: &str, password_hash: String, role: UserRole) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        name: name.trim().to_string(),
        email: normalize_email(email),
        password_hash,
        role,
        is_active: true,
        avatar: None,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, role, is_active, avatar, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            user.id.to_string(),
            user.name,
            user.email,
            user.password_hash,
            user.role.as_str(),
            user.is_active,
            user.avatar,
            user.created_at,
            user.updated_at,
        ],
    )
    .context("Failed to insert user")?;
    Ok(())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn user_from_row(row: &Row<'_>, password_hash: Option<String>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let role: String = row.get(3)?;

    Ok(User {
        id,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: password_hash.unwrap_or_default(),
        // Unknown roles fall back to the least privileged one.
        role: role.parse().unwrap_or(UserRole::Viewer),
        is_active: row.get(4)?,
        avatar: row.get(5)?,
        last_login_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
