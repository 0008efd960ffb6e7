use {
    super::{NewUser, NoteRecord, Store, StoreError, StoreResult, TodoRecord, UserRecord},
    async_trait::async_trait,
    chrono::Utc,
    parking_lot::Mutex,
    std::{cmp::Reverse, collections::BTreeMap},
    toolbelt_protocol::{Calculation, CalculationId, Message, MessageId, NoteId, TodoId, UserId},
};

#[derive(Default)]
struct Tables {
    last_id: i64,
    users: BTreeMap<UserId, UserRecord>,
    notes: BTreeMap<NoteId, NoteRecord>,
    todos: BTreeMap<TodoId, TodoRecord>,
    calculations: BTreeMap<CalculationId, Calculation>,
    messages: BTreeMap<MessageId, Message>,
}

impl Tables {
    /// Ids are unique across tables and strictly increasing.
    fn next_id(&mut self) -> i64 {
        self.last_id = self.last_id.saturating_add(1);
        self.last_id
    }
}

/// Keeps everything in process memory. Contents are lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, K: Ord>(rows: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut rows: Vec<T> = rows.collect();
    rows.sort_by_key(|row| Reverse(key(row)));
    rows
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self
            .tables
            .lock()
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.tables.lock().users.get(&id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<UserId> {
        let mut tables = self.tables.lock();
        if tables.users.values().any(|other| other.email == user.email) {
            return Err(StoreError::Duplicate);
        }
        let id = UserId(tables.next_id());
        tables.users.insert(
            id,
            UserRecord {
                id,
                username: user.username,
                email: user.email,
                password_hash: user.password_hash,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn count_users(&self) -> StoreResult<u64> {
        Ok(self.tables.lock().users.len().try_into().unwrap_or(u64::MAX))
    }

    async fn list_notes(&self, owner: UserId) -> StoreResult<Vec<NoteRecord>> {
        let tables = self.tables.lock();
        Ok(newest_first(
            tables
                .notes
                .values()
                .filter(|note| note.owner == owner)
                .cloned(),
            |note| (note.created_at, note.id),
        ))
    }

    async fn create_note(
        &self,
        owner: UserId,
        title: String,
        content: String,
    ) -> StoreResult<NoteRecord> {
        let mut tables = self.tables.lock();
        let now = Utc::now();
        let note = NoteRecord {
            id: NoteId(tables.next_id()),
            owner,
            title,
            content,
            created_at: now,
            updated_at: now,
        };
        tables.notes.insert(note.id, note.clone());
        Ok(note)
    }

    async fn update_note(
        &self,
        owner: UserId,
        id: NoteId,
        title: String,
        content: String,
    ) -> StoreResult<Option<NoteRecord>> {
        let mut tables = self.tables.lock();
        let Some(note) = tables.notes.get_mut(&id).filter(|note| note.owner == owner) else {
            return Ok(None);
        };
        note.title = title;
        note.content = content;
        note.updated_at = Utc::now();
        Ok(Some(note.clone()))
    }

    async fn delete_note(&self, owner: UserId, id: NoteId) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        if tables.notes.get(&id).is_some_and(|note| note.owner == owner) {
            tables.notes.remove(&id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn list_todos(&self, owner: UserId) -> StoreResult<Vec<TodoRecord>> {
        let tables = self.tables.lock();
        Ok(newest_first(
            tables
                .todos
                .values()
                .filter(|todo| todo.owner == owner)
                .cloned(),
            |todo| (todo.created_at, todo.id),
        ))
    }

    async fn create_todo(&self, owner: UserId, title: String) -> StoreResult<TodoRecord> {
        let mut tables = self.tables.lock();
        let now = Utc::now();
        let todo = TodoRecord {
            id: TodoId(tables.next_id()),
            owner,
            title,
            completed: false,
            created_at: now,
            updated_at: now,
        };
        tables.todos.insert(todo.id, todo.clone());
        Ok(todo)
    }

    async fn update_todo(
        &self,
        owner: UserId,
        id: TodoId,
        title: Option<String>,
        completed: Option<bool>,
    ) -> StoreResult<Option<TodoRecord>> {
        let mut tables = self.tables.lock();
        let Some(todo) = tables.todos.get_mut(&id).filter(|todo| todo.owner == owner) else {
            return Ok(None);
        };
        if let Some(title) = title {
            todo.title = title;
        }
        if let Some(completed) = completed {
            todo.completed = completed;
        }
        todo.updated_at = Utc::now();
        Ok(Some(todo.clone()))
    }

    async fn delete_todo(&self, owner: UserId, id: TodoId) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        if tables.todos.get(&id).is_some_and(|todo| todo.owner == owner) {
            tables.todos.remove(&id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn list_calculations(&self) -> StoreResult<Vec<Calculation>> {
        let tables = self.tables.lock();
        Ok(newest_first(
            tables.calculations.values().cloned(),
            |calculation| (calculation.created_at, calculation.id),
        ))
    }

    async fn add_calculation(&self, expression: String, result: f64) -> StoreResult<Calculation> {
        let mut tables = self.tables.lock();
        let calculation = Calculation {
            id: CalculationId(tables.next_id()),
            expression,
            result,
            created_at: Utc::now(),
        };
        tables
            .calculations
            .insert(calculation.id, calculation.clone());
        Ok(calculation)
    }

    async fn clear_calculations(&self) -> StoreResult<u64> {
        let mut tables = self.tables.lock();
        let count = tables.calculations.len();
        tables.calculations.clear();
        Ok(count.try_into().unwrap_or(u64::MAX))
    }

    async fn list_messages(&self) -> StoreResult<Vec<Message>> {
        Ok(self.tables.lock().messages.values().cloned().collect())
    }

    async fn add_message(&self, title: String, body: String) -> StoreResult<Message> {
        let mut tables = self.tables.lock();
        let message = Message {
            id: MessageId(tables.next_id()),
            title,
            body,
            created_at: Utc::now(),
        };
        tables.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn delete_message(&self, id: MessageId) -> StoreResult<bool> {
        Ok(self.tables.lock().messages.remove(&id).is_some())
    }

    async fn clear_messages(&self) -> StoreResult<u64> {
        let mut tables = self.tables.lock();
        let count = tables.messages.len();
        tables.messages.clear();
        Ok(count.try_into().unwrap_or(u64::MAX))
    }
}
