use {
    super::{NewUser, NoteRecord, Store, StoreResult, TodoRecord, UserRecord},
    anyhow::{Context as _, Result},
    async_trait::async_trait,
    sqlx::{FromRow, PgPool, query, query_as, query_scalar},
    toolbelt_protocol::{
        Calculation, CalculationId, DateTimeUtc, Message, MessageId, NoteId, TodoId, UserId,
    },
};

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password: String,
    created_at: DateTimeUtc,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id.into(),
            username: row.username,
            email: row.email,
            password_hash: row.password,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct NoteRow {
    id: i64,
    user_id: i64,
    title: String,
    content: String,
    created_at: DateTimeUtc,
    updated_at: DateTimeUtc,
}

impl From<NoteRow> for NoteRecord {
    fn from(row: NoteRow) -> Self {
        Self {
            id: row.id.into(),
            owner: row.user_id.into(),
            title: row.title,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct TodoRow {
    id: i64,
    user_id: i64,
    title: String,
    completed: bool,
    created_at: DateTimeUtc,
    updated_at: DateTimeUtc,
}

impl From<TodoRow> for TodoRecord {
    fn from(row: TodoRow) -> Self {
        Self {
            id: row.id.into(),
            owner: row.user_id.into(),
            title: row.title,
            completed: row.completed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct CalculationRow {
    id: i64,
    expression: String,
    result: f64,
    created_at: DateTimeUtc,
}

impl From<CalculationRow> for Calculation {
    fn from(row: CalculationRow) -> Self {
        Self {
            id: CalculationId(row.id),
            expression: row.expression,
            result: row.result,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: i64,
    title: String,
    body: String,
    created_at: DateTimeUtc,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: MessageId(row.id),
            title: row.title,
            body: row.body,
            created_at: row.created_at,
        }
    }
}

const USER_COLUMNS: &str = "id, username, email, password, created_at";
const NOTE_COLUMNS: &str = "id, user_id, title, content, created_at, updated_at";
const TODO_COLUMNS: &str = "id, user_id, title, completed, created_at, updated_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[inline]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("failed to connect to database")?;
        Ok(Self { pool })
    }

    #[inline]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let row: Option<UserRow> =
            query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        let row: Option<UserRow> =
            query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<UserId> {
        let id: i64 = query_scalar(
            "INSERT INTO users (username, email, password) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(user.username)
        .bind(user.email)
        .bind(user.password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(id.into())
    }

    async fn count_users(&self) -> StoreResult<u64> {
        let total: i64 = query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.try_into().unwrap_or_default())
    }

    async fn list_notes(&self, owner: UserId) -> StoreResult<Vec<NoteRecord>> {
        let rows: Vec<NoteRow> = query_as(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_note(
        &self,
        owner: UserId,
        title: String,
        content: String,
    ) -> StoreResult<NoteRecord> {
        let row: NoteRow = query_as(&format!(
            "INSERT INTO notes (user_id, title, content) VALUES ($1, $2, $3) \
             RETURNING {NOTE_COLUMNS}"
        ))
        .bind(owner.0)
        .bind(title)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update_note(
        &self,
        owner: UserId,
        id: NoteId,
        title: String,
        content: String,
    ) -> StoreResult<Option<NoteRecord>> {
        let row: Option<NoteRow> = query_as(&format!(
            "UPDATE notes SET title = $1, content = $2, updated_at = now() \
             WHERE id = $3 AND user_id = $4 RETURNING {NOTE_COLUMNS}"
        ))
        .bind(title)
        .bind(content)
        .bind(id.0)
        .bind(owner.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn delete_note(&self, owner: UserId, id: NoteId) -> StoreResult<bool> {
        let rows = query("DELETE FROM notes WHERE id = $1 AND user_id = $2")
            .bind(id.0)
            .bind(owner.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    async fn list_todos(&self, owner: UserId) -> StoreResult<Vec<TodoRecord>> {
        let rows: Vec<TodoRow> = query_as(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_todo(&self, owner: UserId, title: String) -> StoreResult<TodoRecord> {
        let row: TodoRow = query_as(&format!(
            "INSERT INTO todos (user_id, title) VALUES ($1, $2) RETURNING {TODO_COLUMNS}"
        ))
        .bind(owner.0)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update_todo(
        &self,
        owner: UserId,
        id: TodoId,
        title: Option<String>,
        completed: Option<bool>,
    ) -> StoreResult<Option<TodoRecord>> {
        let row: Option<TodoRow> = query_as(&format!(
            "UPDATE todos SET title = COALESCE($1, title), \
             completed = COALESCE($2, completed), updated_at = now() \
             WHERE id = $3 AND user_id = $4 RETURNING {TODO_COLUMNS}"
        ))
        .bind(title)
        .bind(completed)
        .bind(id.0)
        .bind(owner.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn delete_todo(&self, owner: UserId, id: TodoId) -> StoreResult<bool> {
        let rows = query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
            .bind(id.0)
            .bind(owner.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    async fn list_calculations(&self) -> StoreResult<Vec<Calculation>> {
        let rows: Vec<CalculationRow> = query_as(
            "SELECT id, expression, result, created_at FROM calculations \
             ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn add_calculation(&self, expression: String, result: f64) -> StoreResult<Calculation> {
        let row: CalculationRow = query_as(
            "INSERT INTO calculations (expression, result) VALUES ($1, $2) \
             RETURNING id, expression, result, created_at",
        )
        .bind(expression)
        .bind(result)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn clear_calculations(&self) -> StoreResult<u64> {
        let rows = query("DELETE FROM calculations")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows)
    }

    async fn list_messages(&self) -> StoreResult<Vec<Message>> {
        let rows: Vec<MessageRow> =
            query_as("SELECT id, title, body, created_at FROM messages ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn add_message(&self, title: String, body: String) -> StoreResult<Message> {
        let row: MessageRow = query_as(
            "INSERT INTO messages (title, body) VALUES ($1, $2) \
             RETURNING id, title, body, created_at",
        )
        .bind(title)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn delete_message(&self, id: MessageId) -> StoreResult<bool> {
        let rows = query("DELETE FROM messages WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    async fn clear_messages(&self) -> StoreResult<u64> {
        let rows = query("DELETE FROM messages")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows)
    }
}
