pub mod auth;
pub mod config;
pub mod cookie;
mod handler;
pub mod store;
pub mod util;
pub mod validate;

use {
    crate::{
        config::{Config, Secrets},
        store::Store,
        util::{ApiError, ResponseBody, created, json_response, ok, parse_json},
    },
    anyhow::Result,
    hyper::{
        Method, Request, Response, StatusCode,
        body::Incoming,
        header::{HeaderValue, SET_COOKIE},
    },
    std::{
        convert::Infallible,
        future::{self, Future},
        pin::pin,
        sync::Arc,
    },
    tokio::{net::TcpListener, sync::watch, task::JoinSet},
    toolbelt_protocol::{
        NoteId, TodoId, UserId,
        endpoints::{
            AccessTokenResponse, CreatedUser, HISTORY_PATH, LOGIN_PATH, LOGOUT_PATH,
            LogoutResponse, MESSAGES_PATH, NOTES_PATH, REFRESH_PATH, SIGNUP_PATH, SignupResponse,
            TODO_PATH,
        },
    },
    toolbelt_sdk::{
        crypto::FieldCipher,
        server::serve_connection,
        signal::shutdown_signal,
        token::TokenIssuer,
    },
    tracing::{debug, info, warn},
};

/// Everything a request needs, validated once at startup.
#[derive(Clone)]
pub struct Context {
    store: Arc<dyn Store>,
    cipher: Arc<FieldCipher>,
    tokens: Arc<TokenIssuer>,
    production: bool,
}

impl Context {
    #[inline]
    pub fn new(
        store: Arc<dyn Store>,
        secrets: &Secrets,
        production: bool,
    ) -> Result<Self, toolbelt_sdk::Error> {
        Ok(Self {
            store,
            cipher: Arc::new(FieldCipher::new(&secrets.field_key)),
            tokens: Arc::new(TokenIssuer::new(&secrets.tokens)?),
            production,
        })
    }
}

#[inline]
pub async fn run(config: Config, secrets: Secrets) -> Result<()> {
    let shutdown = shutdown_signal()?;
    let store = store::open(&config.database_url).await?;
    let ctx = Context::new(store, &secrets, config.production)?;

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on: {}", config.bind_addr);

    serve(listener, ctx, async move {
        match shutdown.await {
            Ok(signal) => info!(%signal, "received shutdown signal"),
            Err(err) => {
                warn!(?err, "failed to wait for shutdown signal");
                future::pending::<()>().await;
            }
        }
    })
    .await
}

/// Accepts connections on `listener` until `shutdown` resolves, then lets the
/// open connections finish their current request.
#[inline]
pub async fn serve(
    listener: TcpListener,
    ctx: Context,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let (closing_tx, closing_rx) = watch::channel(false);
    let mut connections = JoinSet::new();
    let mut shutdown = pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let ctx = ctx.clone();
                    let closing = closing_rx.clone();
                    connections.spawn(async move {
                        serve_connection(
                            stream,
                            peer,
                            move |request| handle_request(ctx.clone(), request),
                            closing,
                        )
                        .await;
                    });
                }
                Err(err) => warn!(?err, "failed to accept"),
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(err) = joined {
                    warn!(?err, "connection task failed");
                }
            }
        }
    }

    closing_tx.send_replace(true);
    info!(open = connections.len(), "stopped accepting connections");
    while let Some(joined) = connections.join_next().await {
        if let Err(err) = joined {
            warn!(?err, "connection task failed");
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Signup,
    Login,
    Refresh,
    Logout,
    Notes,
    Note(NoteId),
    Todos,
    Todo(TodoId),
    History,
    Messages,
}

impl Route {
    fn parse(path: &str) -> Option<Self> {
        let path = match path.strip_suffix('/') {
            Some(trimmed) if !trimmed.is_empty() => trimmed,
            _ => path,
        };
        let route = match path {
            SIGNUP_PATH => Self::Signup,
            LOGIN_PATH => Self::Login,
            REFRESH_PATH => Self::Refresh,
            LOGOUT_PATH => Self::Logout,
            NOTES_PATH => Self::Notes,
            TODO_PATH => Self::Todos,
            HISTORY_PATH => Self::History,
            MESSAGES_PATH => Self::Messages,
            _ => {
                if let Some(id) = item_id(path, NOTES_PATH) {
                    Self::Note(NoteId(id))
                } else if let Some(id) = item_id(path, TODO_PATH) {
                    Self::Todo(TodoId(id))
                } else {
                    return None;
                }
            }
        };
        Some(route)
    }
}

fn item_id(path: &str, collection: &str) -> Option<i64> {
    path.strip_prefix(collection)?
        .strip_prefix('/')?
        .parse()
        .ok()
}

async fn handle_request(
    ctx: Context,
    request: Request<Incoming>,
) -> Result<Response<ResponseBody>, Infallible> {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let response = try_handle_request(&ctx, request)
        .await
        .unwrap_or_else(|err| {
            if err.status.is_server_error() {
                warn!(%method, %path, ?err, "request failed");
            } else {
                debug!(%method, %path, ?err, "request rejected");
            }
            err.into_response()
        });
    debug!(%method, %path, status = %response.status(), "request handled");
    Ok(response)
}

async fn try_handle_request(
    ctx: &Context,
    request: Request<Incoming>,
) -> Result<Response<ResponseBody>, ApiError> {
    let (parts, body) = request.into_parts();
    let route = Route::parse(parts.uri.path()).ok_or_else(ApiError::not_found)?;
    let method = &parts.method;
    let user = || -> Result<UserId, ApiError> { Ok(auth::authenticate(ctx, &parts.headers)?.id) };

    match route {
        Route::Signup if *method == Method::POST => {
            let id = auth::signup(ctx, parse_json(body).await?).await?;
            created(&SignupResponse {
                user: CreatedUser { id },
            })
        }
        Route::Login if *method == Method::POST => {
            let session = auth::login(ctx, parse_json(body).await?).await?;
            let cookie = cookie::refresh_cookie(
                &session.refresh_token,
                ctx.tokens.refresh_expiry(),
                ctx.production,
            );
            let response = json_response(
                StatusCode::OK,
                &AccessTokenResponse {
                    access_token: session.access_token,
                },
            );
            with_cookie(response, &cookie)
        }
        Route::Refresh if *method == Method::GET => {
            let refresh_token = cookie::refresh_token(&parts.headers);
            let access_token = auth::refresh_cycle(ctx, refresh_token.as_deref()).await?;
            ok(&AccessTokenResponse { access_token })
        }
        Route::Logout if *method == Method::POST => {
            let response = json_response(
                StatusCode::OK,
                &LogoutResponse {
                    message: "Logged out successfully".into(),
                },
            );
            with_cookie(response, &cookie::clear_refresh_cookie(ctx.production))
        }
        Route::Notes if *method == Method::GET => handler::list_notes(ctx, user()?).await,
        Route::Notes if *method == Method::POST => {
            let user = user()?;
            handler::create_note(ctx, user, parse_json(body).await?).await
        }
        Route::Note(id) if *method == Method::PUT => {
            let user = user()?;
            handler::update_note(ctx, user, id, parse_json(body).await?).await
        }
        Route::Note(id) if *method == Method::DELETE => {
            handler::delete_note(ctx, user()?, id).await
        }
        Route::Todos if *method == Method::GET => handler::list_todos(ctx, user()?).await,
        Route::Todos if *method == Method::POST => {
            let user = user()?;
            handler::create_todo(ctx, user, parse_json(body).await?).await
        }
        Route::Todo(id) if *method == Method::PUT => {
            let user = user()?;
            handler::update_todo(ctx, user, id, parse_json(body).await?).await
        }
        Route::Todo(id) if *method == Method::DELETE => {
            handler::delete_todo(ctx, user()?, id).await
        }
        Route::History if *method == Method::GET => handler::list_history(ctx).await,
        Route::History if *method == Method::POST => {
            handler::add_calculation(ctx, parse_json(body).await?).await
        }
        Route::History if *method == Method::DELETE => handler::clear_history(ctx).await,
        Route::Messages if *method == Method::GET => handler::list_messages(ctx).await,
        Route::Messages if *method == Method::POST => {
            handler::post_message(ctx, parse_json(body).await?).await
        }
        Route::Messages if *method == Method::DELETE => {
            handler::delete_messages(ctx, parse_json(body).await?).await
        }
        _ => Err(ApiError::method_not_allowed()),
    }
}

fn with_cookie(
    mut response: Response<ResponseBody>,
    cookie: &str,
) -> Result<Response<ResponseBody>, ApiError> {
    let value = HeaderValue::from_str(cookie).map_err(|err| {
        warn!(?err, "invalid cookie header");
        ApiError::internal()
    })?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(response)
}
