use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::credentials::{NewUser, UserDirectory, UserRecord};
use crate::refresh::StoreError;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Member {
    pub id: i64,
    pub uuid: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: String,
}

/// Fields needed to insert a member.
#[derive(Debug, Clone, Copy)]
pub struct NewMember<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub name: &'a str,
    pub role: UserRole,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: i64,
    uuid: String,
    email: String,
    password_hash: String,
    name: String,
    role: String,
    created_at: String,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            role: UserRole::from_str(&row.role),
            created_at: row.created_at,
        }
    }
}

const MEMBER_COLUMNS: &str = "id, uuid, email, password_hash, name, role, created_at";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a member with a fresh UUID. Returns `None` if the email is taken.
    pub async fn create(&self, member: NewMember<'_>) -> Result<Option<String>, sqlx::Error> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let result = sqlx::query(
            "INSERT INTO users (uuid, email, password_hash, name, role) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&uuid)
        .bind(member.email)
        .bind(member.password_hash)
        .bind(member.name)
        .bind(member.role.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(Some(uuid)),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Get a member by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Member>, sqlx::Error> {
        let row: Option<MemberRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE email = ?",
            MEMBER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Member::from))
    }

    /// Get a member by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Member>, sqlx::Error> {
        let row: Option<MemberRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE uuid = ?",
            MEMBER_COLUMNS
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Member::from))
    }

    /// Set the role for a member.
    pub async fn set_role(&self, uuid: &str, role: UserRole) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE uuid = ?")
            .bind(role.as_str())
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a member by UUID.
    pub async fn delete(&self, uuid: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserDirectory for UserStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.get_by_email(identifier).await?.map(|m| UserRecord {
            subject: m.uuid,
            password_hash: m.password_hash,
            role: m.role,
        }))
    }

    async fn create(&self, user: NewUser<'_>) -> Result<Option<String>, StoreError> {
        Ok(UserStore::create(
            self,
            NewMember {
                email: user.identifier,
                password_hash: user.password_hash,
                name: user.name,
                role: user.role,
            },
        )
        .await?)
    }
}
