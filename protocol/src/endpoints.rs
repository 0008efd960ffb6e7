use {
    crate::{Calculation, Message, MessageId, Note, Todo, UserId},
    derivative::Derivative,
    serde::{Deserialize, Serialize},
};

pub const SIGNUP_PATH: &str = "/api/auth/signup";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const NOTES_PATH: &str = "/api/notes";
pub const TODO_PATH: &str = "/api/todo";
pub const HISTORY_PATH: &str = "/api/history";
pub const MESSAGES_PATH: &str = "/api/messages";

/// Name of the `HttpOnly` cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";

/// A request that is sent as a JSON body to a fixed path.
pub trait RequestToResponse {
    type Response;
    const METHOD: &'static str;
    const PATH: &'static str;
}
macro_rules! response_type {
    ($request:ty, $response:ty, $method:literal, $path:expr) => {
        impl RequestToResponse for $request {
            type Response = $response;
            const METHOD: &'static str = $method;
            const PATH: &'static str = $path;
        }
    };
}

#[must_use]
#[inline]
pub fn note_path(id: crate::NoteId) -> String {
    format!("{NOTES_PATH}/{id}")
}

#[must_use]
#[inline]
pub fn todo_path(id: crate::TodoId) -> String {
    format!("{TODO_PATH}/{id}")
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Registers a new account. The email must not be registered yet.
#[derive(Derivative, Clone, Serialize, Deserialize)]
#[derivative(Debug)]
pub struct Signup {
    pub username: String,
    pub email: String,
    #[derivative(Debug = "ignore")]
    pub password: String,
}
response_type!(Signup, SignupResponse, "POST", SIGNUP_PATH);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupResponse {
    pub user: CreatedUser,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreatedUser {
    pub id: UserId,
}

/// Exchanges credentials for an access token. The refresh token is
/// delivered separately as an `HttpOnly` cookie.
#[derive(Derivative, Clone, Serialize, Deserialize)]
#[derivative(Debug)]
pub struct Login {
    pub email: String,
    #[derivative(Debug = "ignore")]
    pub password: String,
}
response_type!(Login, AccessTokenResponse, "POST", LOGIN_PATH);

#[derive(Derivative, Clone, Serialize, Deserialize)]
#[derivative(Debug)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    #[derivative(Debug = "ignore")]
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub message: String,
}

/// Creates a note, or replaces title and content of an existing one.
/// Both fields are required and must not be empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteInput {
    pub title: String,
    pub content: String,
}
response_type!(NoteInput, NoteResponse, "POST", NOTES_PATH);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteResponse {
    pub note: Note,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesResponse {
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTodo {
    pub title: String,
}
response_type!(CreateTodo, TodoResponse, "POST", TODO_PATH);

/// Partial update: absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTodo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoResponse {
    pub todo: Todo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodosResponse {
    pub todos: Vec<Todo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCalculation {
    pub expression: String,
    pub result: f64,
}
response_type!(NewCalculation, CalculationResponse, "POST", HISTORY_PATH);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationResponse {
    pub success: bool,
    pub data: Calculation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub title: String,
    pub body: String,
}
response_type!(NewMessage, MessageResponse, "POST", MESSAGES_PATH);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    pub data: Message,
}

/// Removes one message by id, or all of them when `delete_all` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default)]
    pub delete_all: bool,
}
response_type!(DeleteMessages, SuccessResponse, "DELETE", MESSAGES_PATH);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
