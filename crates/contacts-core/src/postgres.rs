//! PostgreSQL credential store
//!
//! Implements the user and contact repositories using SQLx and PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

use crate::{
    Contact, ContactDraft, ContactQuery, ContactRepository, ContactsError, NewUser, Result, Role,
    User, UserRepository,
};

const SCHEMA: &str = include_str!("../schema.sql");

const USER_COLUMNS: &str = "id, username, email, password_hash, confirmed, refresh_token, avatar, role, created_at, updated_at";

const CONTACT_COLUMNS: &str = "id, user_id, name, lastname, email, phone, birthdate, others_info, completed, created_at, updated_at";

/// PostgreSQL store backing both repositories
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store connection
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| ContactsError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `users` and `contacts` tables if they are missing
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| ContactsError::DatabaseError(format!("Failed to apply schema: {e}")))?;
        tracing::debug!("Database schema is up to date");
        Ok(())
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    confirmed: bool,
    refresh_token: Option<String>,
    avatar: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = ContactsError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            confirmed: row.confirmed,
            refresh_token: row.refresh_token,
            avatar: row.avatar,
            role: row.role.parse::<Role>()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Contact row from database
#[derive(Debug, FromRow)]
struct ContactRow {
    id: i64,
    user_id: i64,
    name: String,
    lastname: String,
    email: String,
    phone: String,
    birthdate: NaiveDate,
    others_info: Option<String>,
    completed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Contact {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            lastname: row.lastname,
            email: row.email,
            phone: row.phone,
            birthdate: row.birthdate,
            others_info: row.others_info,
            completed: row.completed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn db_error(context: &str) -> impl Fn(sqlx::Error) -> ContactsError + '_ {
    move |e| ContactsError::DatabaseError(format!("{context}: {e}"))
}

/// ILIKE pattern for a substring search, with wildcards in the term escaped
fn like_pattern(query: &ContactQuery) -> Option<String> {
    query.search.as_ref().map(|term| {
        let escaped = term
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        format!("%{escaped}%")
    })
}

#[async_trait]
impl UserRepository for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to fetch user"))?;

        row.map(User::try_from).transpose()
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, avatar, confirmed, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, false, 'user', NOW(), NOW())
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.avatar)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                ContactsError::Conflict(format!("email {} already registered", user.email))
            }
            other => ContactsError::DatabaseError(format!("Failed to create user: {other}")),
        })?;

        User::try_from(row)
    }

    async fn update_refresh_token(&self, user_id: i64, token: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to update refresh token"))?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        user_id: i64,
        presented: &str,
        replacement: &str,
    ) -> Result<bool> {
        // Single conditional UPDATE: concurrent rotations of the same token
        // serialize on the row lock and only the first one matches.
        let result = sqlx::query(
            "UPDATE users SET refresh_token = $3, updated_at = NOW() WHERE id = $1 AND refresh_token = $2",
        )
        .bind(user_id)
        .bind(presented)
        .bind(replacement)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to rotate refresh token"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn confirm_email(&self, email: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET confirmed = true, updated_at = NOW() WHERE email = $1",
        )
        .bind(email)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to confirm email"))?;

        if result.rows_affected() == 0 {
            return Err(ContactsError::NotFound(format!("user {email}")));
        }
        Ok(())
    }

    async fn update_avatar(&self, email: &str, url: Option<&str>) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET avatar = $2, updated_at = NOW() WHERE email = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to update avatar"))?
        .ok_or_else(|| ContactsError::NotFound(format!("user {email}")))?;

        User::try_from(row)
    }

    async fn set_role(&self, email: &str, role: Role) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE email = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to update role"))?
        .ok_or_else(|| ContactsError::NotFound(format!("user {email}")))?;

        User::try_from(row)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error("Database ping failed"))?;
        Ok(())
    }
}

#[async_trait]
impl ContactRepository for PgStore {
    async fn list_contacts(&self, owner_id: i64, query: &ContactQuery) -> Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS} FROM contacts
            WHERE user_id = $1
              AND ($2::text IS NULL OR name ILIKE $2 OR lastname ILIKE $2 OR email ILIKE $2)
            ORDER BY id
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(owner_id)
        .bind(like_pattern(query))
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list contacts"))?;

        Ok(rows.into_iter().map(Contact::from).collect())
    }

    async fn list_all(&self, query: &ContactQuery) -> Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS} FROM contacts
            WHERE ($1::text IS NULL OR name ILIKE $1 OR lastname ILIKE $1 OR email ILIKE $1)
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(like_pattern(query))
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list all contacts"))?;

        Ok(rows.into_iter().map(Contact::from).collect())
    }

    async fn get_contact(&self, owner_id: i64, contact_id: i64) -> Result<Option<Contact>> {
        let row = sqlx::query_as::<_, ContactRow>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1 AND user_id = $2"
        ))
        .bind(contact_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to fetch contact"))?;

        Ok(row.map(Contact::from))
    }

    async fn create_contact(&self, owner_id: i64, draft: ContactDraft) -> Result<Contact> {
        let row = sqlx::query_as::<_, ContactRow>(&format!(
            r#"
            INSERT INTO contacts (user_id, name, lastname, email, phone, birthdate, others_info, completed, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(owner_id)
        .bind(&draft.name)
        .bind(&draft.lastname)
        .bind(&draft.email)
        .bind(&draft.phone)
        .bind(draft.birthdate)
        .bind(&draft.others_info)
        .bind(draft.completed)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to create contact"))?;

        Ok(Contact::from(row))
    }

    async fn update_contact(
        &self,
        owner_id: i64,
        contact_id: i64,
        draft: ContactDraft,
    ) -> Result<Option<Contact>> {
        let row = sqlx::query_as::<_, ContactRow>(&format!(
            r#"
            UPDATE contacts
            SET name = $3, lastname = $4, email = $5, phone = $6, birthdate = $7,
                others_info = $8, completed = $9, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(contact_id)
        .bind(owner_id)
        .bind(&draft.name)
        .bind(&draft.lastname)
        .bind(&draft.email)
        .bind(&draft.phone)
        .bind(draft.birthdate)
        .bind(&draft.others_info)
        .bind(draft.completed)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to update contact"))?;

        Ok(row.map(Contact::from))
    }

    async fn delete_contact(&self, owner_id: i64, contact_id: i64) -> Result<Option<Contact>> {
        let row = sqlx::query_as::<_, ContactRow>(&format!(
            "DELETE FROM contacts WHERE id = $1 AND user_id = $2 RETURNING {CONTACT_COLUMNS}"
        ))
        .bind(contact_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to delete contact"))?;

        Ok(row.map(Contact::from))
    }
}
