use {
    crate::{
        Context,
        auth::UNAUTHORIZED,
        store::{NoteRecord, TodoRecord},
        util::{ApiError, ResponseBody, created, ok},
        validate,
    },
    hyper::Response,
    toolbelt_protocol::{
        Note, NoteId, Todo, TodoId, UserId,
        endpoints::{
            CalculationResponse, CreateTodo, DeleteMessages, MessageResponse, NewCalculation,
            NewMessage, NoteInput, NoteResponse, NotesResponse, SuccessResponse, TodoResponse,
            TodosResponse, UpdateTodo,
        },
    },
    toolbelt_sdk::crypto::FieldPolicy,
    tracing::{debug, info, warn},
};

type HandlerResult = Result<Response<ResponseBody>, ApiError>;

pub const INVALID_DATA: &str = "Invalid data";

fn success(message: Option<&str>) -> SuccessResponse {
    SuccessResponse {
        success: true,
        message: message.map(str::to_owned),
    }
}

fn seal(ctx: &Context, plaintext: &str) -> Result<String, ApiError> {
    ctx.cipher
        .encrypt(FieldPolicy::Opaque, plaintext)
        .map_err(|err| {
            debug!(%err, "field does not encrypt");
            ApiError::bad_request(INVALID_DATA)
        })
}

/// A stored field that doesn't decrypt (tampered row or another key) is
/// reported like an invalid session, without saying which one it was.
fn open(ctx: &Context, stored: &str, what: &'static str) -> Result<String, ApiError> {
    ctx.cipher
        .decrypt(FieldPolicy::Opaque, stored)
        .map_err(|err| {
            warn!(%err, what, "stored field does not decrypt");
            ApiError::unauthorized(UNAUTHORIZED)
        })
}

fn note(ctx: &Context, record: NoteRecord) -> Result<Note, ApiError> {
    Ok(Note {
        id: record.id,
        title: open(ctx, &record.title, "note title")?,
        content: open(ctx, &record.content, "note content")?,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

fn todo(ctx: &Context, record: TodoRecord) -> Result<Todo, ApiError> {
    Ok(Todo {
        id: record.id,
        title: open(ctx, &record.title, "todo title")?,
        completed: record.completed,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

pub async fn list_notes(ctx: &Context, user: UserId) -> HandlerResult {
    let notes = ctx
        .store
        .list_notes(user)
        .await?
        .into_iter()
        .map(|record| note(ctx, record))
        .collect::<Result<Vec<_>, _>>()?;
    ok(&NotesResponse { notes })
}

pub async fn create_note(ctx: &Context, user: UserId, request: NoteInput) -> HandlerResult {
    validate::note(&request)?;
    let record = ctx
        .store
        .create_note(
            user,
            seal(ctx, &request.title)?,
            seal(ctx, &request.content)?,
        )
        .await?;
    info!(%user, id = %record.id, "note created");
    ok(&NoteResponse {
        note: note(ctx, record)?,
    })
}

pub async fn update_note(
    ctx: &Context,
    user: UserId,
    id: NoteId,
    request: NoteInput,
) -> HandlerResult {
    validate::note(&request)?;
    let record = ctx
        .store
        .update_note(
            user,
            id,
            seal(ctx, &request.title)?,
            seal(ctx, &request.content)?,
        )
        .await?
        .ok_or_else(ApiError::not_found)?;
    ok(&NoteResponse {
        note: note(ctx, record)?,
    })
}

pub async fn delete_note(ctx: &Context, user: UserId, id: NoteId) -> HandlerResult {
    if !ctx.store.delete_note(user, id).await? {
        return Err(ApiError::not_found());
    }
    info!(%user, %id, "note deleted");
    ok(&success(None))
}

pub async fn list_todos(ctx: &Context, user: UserId) -> HandlerResult {
    let todos = ctx
        .store
        .list_todos(user)
        .await?
        .into_iter()
        .map(|record| todo(ctx, record))
        .collect::<Result<Vec<_>, _>>()?;
    ok(&TodosResponse { todos })
}

pub async fn create_todo(ctx: &Context, user: UserId, request: CreateTodo) -> HandlerResult {
    validate::todo_title(&request.title)?;
    let record = ctx
        .store
        .create_todo(user, seal(ctx, &request.title)?)
        .await?;
    created(&TodoResponse {
        todo: todo(ctx, record)?,
    })
}

pub async fn update_todo(
    ctx: &Context,
    user: UserId,
    id: TodoId,
    request: UpdateTodo,
) -> HandlerResult {
    let title = match &request.title {
        Some(title) => {
            validate::todo_title(title)?;
            Some(seal(ctx, title)?)
        }
        None => None,
    };
    let record = ctx
        .store
        .update_todo(user, id, title, request.completed)
        .await?
        .ok_or_else(ApiError::not_found)?;
    ok(&TodoResponse {
        todo: todo(ctx, record)?,
    })
}

pub async fn delete_todo(ctx: &Context, user: UserId, id: TodoId) -> HandlerResult {
    if !ctx.store.delete_todo(user, id).await? {
        return Err(ApiError::not_found());
    }
    ok(&success(None))
}

pub async fn list_history(ctx: &Context) -> HandlerResult {
    ok(&ctx.store.list_calculations().await?)
}

pub async fn add_calculation(ctx: &Context, request: NewCalculation) -> HandlerResult {
    if request.expression.trim().is_empty() {
        return Err(ApiError::bad_request("Expression is required"));
    }
    if !request.result.is_finite() {
        return Err(ApiError::bad_request("Result must be a finite number"));
    }
    let data = ctx
        .store
        .add_calculation(request.expression, request.result)
        .await?;
    ok(&CalculationResponse {
        success: true,
        data,
    })
}

pub async fn clear_history(ctx: &Context) -> HandlerResult {
    let removed = ctx.store.clear_calculations().await?;
    info!(removed, "history cleared");
    ok(&success(Some("History cleared")))
}

pub async fn list_messages(ctx: &Context) -> HandlerResult {
    ok(&ctx.store.list_messages().await?)
}

pub async fn post_message(ctx: &Context, request: NewMessage) -> HandlerResult {
    if request.title.is_empty() || request.body.is_empty() {
        return Err(ApiError::bad_request("Title and body are required"));
    }
    let data = ctx.store.add_message(request.title, request.body).await?;
    created(&MessageResponse {
        message: "Message created".into(),
        data,
    })
}

pub async fn delete_messages(ctx: &Context, request: DeleteMessages) -> HandlerResult {
    if request.delete_all {
        let removed = ctx.store.clear_messages().await?;
        info!(removed, "messages cleared");
        ok(&success(Some("All messages deleted")))
    } else if let Some(id) = request.id {
        if !ctx.store.delete_message(id).await? {
            return Err(ApiError::not_found());
        }
        ok(&success(Some("Message deleted")))
    } else {
        Err(ApiError::bad_request("Either id or deleteAll is required"))
    }
}
