//! Persistence behind the API.
//!
//! The store never sees plaintext user fields: usernames, note titles and
//! bodies and todo titles arrive already encrypted, and emails arrive as the
//! deterministic blob so they can be matched exactly.

mod memory;
mod pg;

pub use self::{memory::MemoryStore, pg::PgStore};

use {
    crate::config::MEMORY_DATABASE,
    anyhow::Result,
    async_trait::async_trait,
    std::sync::Arc,
    thiserror::Error,
    toolbelt_protocol::{Calculation, DateTimeUtc, Message, MessageId, NoteId, TodoId, UserId},
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A user with the same encrypted email already exists.
    #[error("duplicate record")]
    Duplicate,
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    #[inline]
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Self::Duplicate;
            }
        }
        Self::Database(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: UserId,
    /// Opaque ciphertext.
    pub username: String,
    /// Deterministic ciphertext.
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTimeUtc,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NoteRecord {
    pub id: NoteId,
    pub owner: UserId,
    pub title: String,
    pub content: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Debug, Clone)]
pub struct TodoRecord {
    pub id: TodoId,
    pub owner: UserId,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

/// Owner-scoped operations return `None`/`false` both when the row does not
/// exist and when it belongs to someone else.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;
    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>>;
    /// Fails with [`StoreError::Duplicate`] if the email is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<UserId>;
    async fn count_users(&self) -> StoreResult<u64>;

    /// Newest first.
    async fn list_notes(&self, owner: UserId) -> StoreResult<Vec<NoteRecord>>;
    async fn create_note(
        &self,
        owner: UserId,
        title: String,
        content: String,
    ) -> StoreResult<NoteRecord>;
    async fn update_note(
        &self,
        owner: UserId,
        id: NoteId,
        title: String,
        content: String,
    ) -> StoreResult<Option<NoteRecord>>;
    async fn delete_note(&self, owner: UserId, id: NoteId) -> StoreResult<bool>;

    /// Newest first.
    async fn list_todos(&self, owner: UserId) -> StoreResult<Vec<TodoRecord>>;
    async fn create_todo(&self, owner: UserId, title: String) -> StoreResult<TodoRecord>;
    /// `None` fields are left unchanged.
    async fn update_todo(
        &self,
        owner: UserId,
        id: TodoId,
        title: Option<String>,
        completed: Option<bool>,
    ) -> StoreResult<Option<TodoRecord>>;
    async fn delete_todo(&self, owner: UserId, id: TodoId) -> StoreResult<bool>;

    /// Newest first.
    async fn list_calculations(&self) -> StoreResult<Vec<Calculation>>;
    async fn add_calculation(&self, expression: String, result: f64) -> StoreResult<Calculation>;
    async fn clear_calculations(&self) -> StoreResult<u64>;

    /// Oldest first.
    async fn list_messages(&self) -> StoreResult<Vec<Message>>;
    async fn add_message(&self, title: String, body: String) -> StoreResult<Message>;
    async fn delete_message(&self, id: MessageId) -> StoreResult<bool>;
    async fn clear_messages(&self) -> StoreResult<u64>;
}

/// Opens the store named by `database_url`: [`MEMORY_DATABASE`] for an
/// in-process store, anything else is a Postgres connection string.
#[inline]
pub async fn open(database_url: &str) -> Result<Arc<dyn Store>> {
    if database_url == MEMORY_DATABASE {
        Ok(Arc::new(MemoryStore::new()))
    } else {
        Ok(Arc::new(PgStore::connect(database_url).await?))
    }
}
