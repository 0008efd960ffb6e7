use {
    anyhow::{Result, format_err},
    parking_lot::Mutex,
    reqwest::Method,
    serde::{Serialize, de::DeserializeOwned},
    std::{future::Future, sync::Arc, time::Duration},
    thiserror::Error,
    tokio::time::sleep,
    toolbelt_protocol::{
        Calculation, Message, Note, NoteId, Todo, TodoId,
        endpoints::{
            self, AccessTokenResponse, CalculationResponse, CreateTodo, DeleteMessages,
            ErrorResponse, Login, LogoutResponse, MessageResponse, NewCalculation, NewMessage,
            NoteInput, NoteResponse, NotesResponse, RequestToResponse, Signup, SignupResponse,
            SuccessResponse, TodoResponse, TodosResponse, UpdateTodo,
        },
    },
    tracing::{instrument, warn},
    url::Url,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const GET_ATTEMPTS: usize = 3;
const RETRY_PERIOD: Duration = Duration::from_secs(1);

/// Non-2xx response from the API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("server responded with {status}: {message}")]
pub struct ApiFailure {
    pub status: u16,
    pub message: String,
}

/// Typed client for the toolbelt HTTP API.
///
/// Holds a cookie store, so the refresh cookie set by [`Client::login`] is
/// sent back by [`Client::refresh`]. Clones share the access token and the
/// connection pool.
#[derive(Clone)]
pub struct Client {
    reqwest: reqwest::Client,
    server_url: Url,
    access_token: Arc<Mutex<Option<String>>>,
}

impl Client {
    #[inline]
    pub fn new(server_url: Url) -> Result<Self> {
        Ok(Self {
            server_url,
            access_token: Arc::default(),
            reqwest: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .cookie_store(true)
                .build()?,
        })
    }

    #[must_use]
    #[inline]
    pub fn access_token(&self) -> Option<String> {
        self.access_token.lock().clone()
    }

    #[inline]
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.lock() = token;
    }

    /// Sends a request whose method and path are fixed by its type.
    #[inline]
    pub async fn request<R>(&self, request: &R) -> Result<R::Response>
    where
        R: RequestToResponse + Serialize + Sync,
        R::Response: DeserializeOwned,
    {
        let method = Method::from_bytes(R::METHOD.as_bytes())?;
        self.execute(method, R::PATH, Some(request)).await
    }

    #[inline]
    pub async fn signup(&self, request: &Signup) -> Result<SignupResponse> {
        self.request(request).await
    }

    /// Stores the returned access token for subsequent calls.
    #[inline]
    pub async fn login(&self, request: &Login) -> Result<AccessTokenResponse> {
        let response = self.request(request).await?;
        self.set_access_token(Some(response.access_token.clone()));
        Ok(response)
    }

    /// Exchanges the refresh cookie for a new access token.
    #[inline]
    pub async fn refresh(&self) -> Result<AccessTokenResponse> {
        let response: AccessTokenResponse = self
            .execute(Method::GET, endpoints::REFRESH_PATH, None::<&()>)
            .await?;
        self.set_access_token(Some(response.access_token.clone()));
        Ok(response)
    }

    #[inline]
    pub async fn logout(&self) -> Result<LogoutResponse> {
        let response = self
            .execute(Method::POST, endpoints::LOGOUT_PATH, None::<&()>)
            .await?;
        self.set_access_token(None);
        Ok(response)
    }

    #[inline]
    pub async fn notes(&self) -> Result<Vec<Note>> {
        let response: NotesResponse = self
            .execute(Method::GET, endpoints::NOTES_PATH, None::<&()>)
            .await?;
        Ok(response.notes)
    }

    #[inline]
    pub async fn create_note(&self, note: &NoteInput) -> Result<Note> {
        Ok(self.request(note).await?.note)
    }

    #[inline]
    pub async fn update_note(&self, id: NoteId, note: &NoteInput) -> Result<Note> {
        let response: NoteResponse = self
            .execute(Method::PUT, &endpoints::note_path(id), Some(note))
            .await?;
        Ok(response.note)
    }

    #[inline]
    pub async fn delete_note(&self, id: NoteId) -> Result<()> {
        let _: SuccessResponse = self
            .execute(Method::DELETE, &endpoints::note_path(id), None::<&()>)
            .await?;
        Ok(())
    }

    #[inline]
    pub async fn todos(&self) -> Result<Vec<Todo>> {
        let response: TodosResponse = self
            .execute(Method::GET, endpoints::TODO_PATH, None::<&()>)
            .await?;
        Ok(response.todos)
    }

    #[inline]
    pub async fn create_todo(&self, todo: &CreateTodo) -> Result<Todo> {
        Ok(self.request(todo).await?.todo)
    }

    #[inline]
    pub async fn update_todo(&self, id: TodoId, update: &UpdateTodo) -> Result<Todo> {
        let response: TodoResponse = self
            .execute(Method::PUT, &endpoints::todo_path(id), Some(update))
            .await?;
        Ok(response.todo)
    }

    #[inline]
    pub async fn delete_todo(&self, id: TodoId) -> Result<()> {
        let _: SuccessResponse = self
            .execute(Method::DELETE, &endpoints::todo_path(id), None::<&()>)
            .await?;
        Ok(())
    }

    #[inline]
    pub async fn history(&self) -> Result<Vec<Calculation>> {
        self.execute(Method::GET, endpoints::HISTORY_PATH, None::<&()>)
            .await
    }

    #[inline]
    pub async fn add_calculation(&self, calculation: &NewCalculation) -> Result<Calculation> {
        let response: CalculationResponse = self.request(calculation).await?;
        Ok(response.data)
    }

    #[inline]
    pub async fn clear_history(&self) -> Result<SuccessResponse> {
        self.execute(Method::DELETE, endpoints::HISTORY_PATH, None::<&()>)
            .await
    }

    #[inline]
    pub async fn messages(&self) -> Result<Vec<Message>> {
        self.execute(Method::GET, endpoints::MESSAGES_PATH, None::<&()>)
            .await
    }

    #[inline]
    pub async fn post_message(&self, message: &NewMessage) -> Result<Message> {
        let response: MessageResponse = self.request(message).await?;
        Ok(response.data)
    }

    #[inline]
    pub async fn delete_messages(&self, request: &DeleteMessages) -> Result<SuccessResponse> {
        self.request(request).await
    }

    #[instrument(skip_all, fields(%method, %path))]
    #[inline(never)]
    async fn execute<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.server_url.join(path)?;
        let attempts = if method == Method::GET {
            GET_ATTEMPTS
        } else {
            1
        };
        let response = ok_or_retry(attempts, || async {
            let token = self.access_token();
            let mut request = self.reqwest.request(method.clone(), url.clone());
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            request.send().await
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error,
                Err(err) => {
                    warn!(?err, "error response without a JSON body");
                    status.to_string()
                }
            };
            return Err(ApiFailure {
                status: status.as_u16(),
                message,
            }
            .into());
        }
        response
            .json()
            .await
            .map_err(|err| format_err!("invalid response body: {err}"))
    }
}

/// Retries the request if an error arises due to the transport.
async fn ok_or_retry<T, F, Fut>(attempts: usize, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1_usize;
    loop {
        let transport_err = match f().await {
            Ok(x) => break Ok(x),
            Err(err) => err,
        };
        if attempt >= attempts {
            break Err(transport_err.into());
        }
        warn!(error = %transport_err, attempt, "transport failed, will retry");
        attempt = attempt.saturating_add(1);
        sleep(RETRY_PERIOD).await;
    }
}
