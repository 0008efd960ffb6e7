use {
    portpicker::pick_unused_port,
    reqwest::{
        StatusCode,
        header::{COOKIE, SET_COOKIE},
    },
    std::{net::SocketAddr, sync::Arc},
    tokio::{net::TcpListener, sync::oneshot, task::JoinHandle},
    toolbelt_protocol::{
        ExpiresIn, FieldKey, JwtSecret, UserId,
        endpoints::{
            CreateTodo, DeleteMessages, ErrorResponse, LOGIN_PATH, LOGOUT_PATH, Login,
            NewCalculation, NewMessage, NoteInput, REFRESH_PATH, Signup, UpdateTodo,
        },
    },
    toolbelt_sdk::{
        client::{ApiFailure, Client},
        crypto::FieldCipher,
        token::{TokenConfig, TokenIssuer},
    },
    toolbelt_server::{
        Context,
        config::Secrets,
        serve,
        store::{MemoryStore, NewUser, Store},
    },
    url::Url,
};

struct TestServer {
    url: Url,
    store: Arc<MemoryStore>,
    secrets: Secrets,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with("15m", false).await
    }

    async fn start_with(access_expiry: &str, production: bool) -> Self {
        let secrets = Secrets {
            field_key: FieldKey::generate(),
            tokens: TokenConfig {
                access_secret: JwtSecret::generate(),
                refresh_secret: JwtSecret::generate(),
                access_expiry: access_expiry.parse().unwrap(),
                refresh_expiry: ExpiresIn::from_seconds(7 * 24 * 3600),
            },
        };
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn Store> = Arc::<MemoryStore>::clone(&store);
        let ctx = Context::new(dyn_store, &secrets, production).unwrap();

        let port = pick_unused_port().unwrap();
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr).await.unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(serve(listener, ctx, async move {
            let _ = stopped.await;
        }));
        Self {
            url: format!("http://{addr}/").parse().unwrap(),
            store,
            secrets,
            stop: Some(stop),
            task,
        }
    }

    fn client(&self) -> Client {
        Client::new(self.url.clone()).unwrap()
    }

    fn cipher(&self) -> FieldCipher {
        FieldCipher::new(&self.secrets.field_key)
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            stop.send(()).unwrap();
        }
        self.task.await.unwrap().unwrap();
    }
}

fn signup_request(username: &str, email: &str) -> Signup {
    Signup {
        username: username.into(),
        email: email.into(),
        password: "password123".into(),
    }
}

fn login_request(email: &str) -> Login {
    Login {
        email: email.into(),
        password: "password123".into(),
    }
}

fn failure(err: &anyhow::Error) -> &ApiFailure {
    err.downcast_ref::<ApiFailure>()
        .unwrap_or_else(|| panic!("not an API failure: {err:?}"))
}

/// Calls the refresh endpoint with `token` in the cookie, bypassing the
/// client's cookie jar.
async fn refresh_with_cookie(server: &TestServer, token: &str) -> (StatusCode, String) {
    let response = reqwest::Client::new()
        .get(server.url.join(REFRESH_PATH).unwrap())
        .header(COOKIE, format!("refreshToken={token}"))
        .send()
        .await
        .unwrap();
    let status = response.status();
    let body: ErrorResponse = response.json().await.unwrap();
    (status, body.error)
}

async fn login_cookie(server: &TestServer) -> String {
    server
        .client()
        .signup(&signup_request("alice", "alice@example.com"))
        .await
        .unwrap();
    let response = reqwest::Client::new()
        .post(server.url.join(LOGIN_PATH).unwrap())
        .json(&login_request("alice@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    response
        .headers()
        .get(SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned()
}

async fn logged_in(server: &TestServer, username: &str, email: &str) -> Client {
    let client = server.client();
    client.signup(&signup_request(username, email)).await.unwrap();
    client.login(&login_request(email)).await.unwrap();
    client
}

#[tokio::test]
async fn signup_stores_encrypted_fields() {
    let server = TestServer::start().await;
    let client = server.client();

    let created = client
        .signup(&signup_request("alice", "alice@example.com"))
        .await
        .unwrap();

    let cipher = server.cipher();
    let stored = server
        .store
        .find_user_by_email(&cipher.encrypt_deterministic("alice@example.com"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, created.user.id);
    assert_ne!(stored.email, "alice@example.com");
    assert_ne!(stored.username, "alice");
    assert_eq!(cipher.decrypt_opaque(&stored.username).unwrap(), "alice");
    assert!(stored.password_hash.starts_with("$2"));

    let err = client
        .signup(&signup_request("alice2", "alice@example.com"))
        .await
        .unwrap_err();
    let failure = failure(&err);
    assert_eq!(failure.status, 400);
    assert_eq!(failure.message, "User with this email already exists");
    assert_eq!(server.store.count_users().await.unwrap(), 1);

    server.stop().await;
}

#[tokio::test]
async fn signup_validation() {
    let server = TestServer::start().await;
    let client = server.client();

    for request in [
        signup_request("al", "al@example.com"),
        signup_request("alice", "not-an-email"),
        Signup {
            password: "12345".into(),
            ..signup_request("alice", "alice@example.com")
        },
    ] {
        let err = client.signup(&request).await.unwrap_err();
        assert_eq!(failure(&err).status, 400);
    }
    assert_eq!(server.store.count_users().await.unwrap(), 0);

    server.stop().await;
}

#[tokio::test]
async fn login_token_carries_username() {
    let server = TestServer::start().await;
    let client = server.client();
    client
        .signup(&signup_request("alice", "alice@example.com"))
        .await
        .unwrap();

    let response = client
        .login(&login_request("alice@example.com"))
        .await
        .unwrap();
    let issuer = TokenIssuer::new(&server.secrets.tokens).unwrap();
    let claims = issuer.verify_access_token(&response.access_token).unwrap();
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
    // Access tokens are not valid refresh tokens.
    issuer.verify_refresh_token(&response.access_token).unwrap_err();

    server.stop().await;
}

#[tokio::test]
async fn login_failures_look_the_same() {
    let server = TestServer::start().await;
    let client = server.client();
    client
        .signup(&signup_request("alice", "alice@example.com"))
        .await
        .unwrap();

    let wrong_password = client
        .login(&Login {
            email: "alice@example.com".into(),
            password: "wrong-password".into(),
        })
        .await
        .unwrap_err();
    let unknown_email = client
        .login(&login_request("bob@example.com"))
        .await
        .unwrap_err();
    assert_eq!(failure(&wrong_password), failure(&unknown_email));
    assert_eq!(failure(&unknown_email).status, 401);
    assert_eq!(failure(&unknown_email).message, "Invalid credentials");
    assert_eq!(client.access_token(), None);

    server.stop().await;
}

#[tokio::test]
async fn refresh_without_cookie_is_rejected() {
    let server = TestServer::start().await;
    let client = server.client();

    let err = client.refresh().await.unwrap_err();
    let failure = failure(&err);
    assert_eq!(failure.status, 401);
    assert_eq!(failure.message, "Refresh token is missing");

    server.stop().await;
}

#[tokio::test]
async fn refresh_cycle() {
    let server = TestServer::start().await;
    let client = logged_in(&server, "alice", "alice@example.com").await;
    client.set_access_token(None);

    let response = client.refresh().await.unwrap();
    let issuer = TokenIssuer::new(&server.secrets.tokens).unwrap();
    let claims = issuer.verify_access_token(&response.access_token).unwrap();
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
    client.notes().await.unwrap();

    client.logout().await.unwrap();
    assert_eq!(client.access_token(), None);
    let err = client.refresh().await.unwrap_err();
    assert_eq!(failure(&err).status, 401);

    server.stop().await;
}

#[tokio::test]
async fn refresh_rejects_foreign_tokens() {
    let server = TestServer::start().await;
    let client = logged_in(&server, "alice", "alice@example.com").await;
    let access_token = client.access_token().unwrap();

    // Signed with the access secret.
    let (status, error) = refresh_with_cookie(&server, &access_token).await;
    assert_eq!(status, 401);
    assert_eq!(error, "Invalid refresh token");

    let (status, error) = refresh_with_cookie(&server, "garbage").await;
    assert_eq!(status, 401);
    assert_eq!(error, "Invalid refresh token");

    let other_secrets = TokenConfig {
        refresh_secret: JwtSecret::generate(),
        ..server.secrets.tokens.clone()
    };
    let forged = TokenIssuer::new(&other_secrets)
        .unwrap()
        .issue_refresh_token(UserId(1))
        .unwrap();
    let (status, error) = refresh_with_cookie(&server, &forged).await;
    assert_eq!(status, 401);
    assert_eq!(error, "Invalid refresh token");

    server.stop().await;
}

#[tokio::test]
async fn refresh_for_missing_user() {
    let server = TestServer::start().await;
    let token = TokenIssuer::new(&server.secrets.tokens)
        .unwrap()
        .issue_refresh_token(UserId(999_999))
        .unwrap();

    let (status, error) = refresh_with_cookie(&server, &token).await;
    assert_eq!(status, 401);
    assert_eq!(error, "User not found");

    server.stop().await;
}

#[tokio::test]
async fn refresh_with_undecryptable_username() {
    let server = TestServer::start().await;
    let id = server
        .store
        .create_user(NewUser {
            username: "AAAAAAAAAAAAAAAA.AAAA.AAAAAAAAAAAAAAAAAAAAAA==".into(),
            email: server.cipher().encrypt_deterministic("mallory@example.com"),
            password_hash: "x".into(),
        })
        .await
        .unwrap();
    let token = TokenIssuer::new(&server.secrets.tokens)
        .unwrap()
        .issue_refresh_token(id)
        .unwrap();

    let (status, error) = refresh_with_cookie(&server, &token).await;
    assert_eq!(status, 401);
    assert_eq!(error, "Invalid refresh token");

    server.stop().await;
}

#[tokio::test]
async fn refresh_cookie_is_secure_in_production() {
    let server = TestServer::start_with("15m", true).await;
    let cookie = login_cookie(&server).await;
    assert!(cookie.starts_with("refreshToken="), "{cookie}");
    assert!(cookie.contains("Secure"), "{cookie}");
    assert!(cookie.contains("HttpOnly"), "{cookie}");
    server.stop().await;

    let server = TestServer::start().await;
    let cookie = login_cookie(&server).await;
    assert!(!cookie.contains("Secure"), "{cookie}");
    server.stop().await;
}

#[tokio::test]
async fn logout_clears_cookie() {
    let server = TestServer::start().await;
    let response = reqwest::Client::new()
        .post(server.url.join(LOGOUT_PATH).unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert!(cookie.starts_with("refreshToken=;"), "{cookie}");
    assert!(cookie.contains("Max-Age=0"), "{cookie}");
    assert!(cookie.contains("HttpOnly"), "{cookie}");
    assert!(cookie.contains("Path=/api/auth/refresh"), "{cookie}");

    server.stop().await;
}

#[tokio::test]
async fn expired_access_token_is_rejected() {
    let server = TestServer::start_with("-1s", false).await;
    let client = logged_in(&server, "alice", "alice@example.com").await;

    let err = client.notes().await.unwrap_err();
    assert_eq!(failure(&err).status, 401);

    server.stop().await;
}

#[tokio::test]
async fn notes_are_private() {
    let server = TestServer::start().await;
    let alice = logged_in(&server, "alice", "alice@example.com").await;
    let bob = logged_in(&server, "bob", "bob@example.com").await;

    let first = alice
        .create_note(&NoteInput {
            title: "groceries".into(),
            content: "milk".into(),
        })
        .await
        .unwrap();
    let second = alice
        .create_note(&NoteInput {
            title: "ideas".into(),
            content: "more sleep".into(),
        })
        .await
        .unwrap();
    assert_eq!(first.title, "groceries");

    let notes = alice.notes().await.unwrap();
    assert_eq!(
        notes.iter().map(|note| note.id).collect::<Vec<_>>(),
        [second.id, first.id]
    );
    assert!(bob.notes().await.unwrap().is_empty());

    let err = bob
        .update_note(
            first.id,
            &NoteInput {
                title: "mine".into(),
                content: "now".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(failure(&err).status, 404);
    let err = bob.delete_note(first.id).await.unwrap_err();
    assert_eq!(failure(&err).status, 404);

    let updated = alice
        .update_note(
            first.id,
            &NoteInput {
                title: "groceries".into(),
                content: "milk, eggs".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.content, "milk, eggs");

    let err = alice
        .create_note(&NoteInput {
            title: String::new(),
            content: "x".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(failure(&err).status, 400);

    alice.delete_note(first.id).await.unwrap();
    assert_eq!(alice.notes().await.unwrap().len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn todos() {
    let server = TestServer::start().await;
    let alice = logged_in(&server, "alice", "alice@example.com").await;
    let bob = logged_in(&server, "bob", "bob@example.com").await;

    let todo = alice
        .create_todo(&CreateTodo {
            title: "write tests".into(),
        })
        .await
        .unwrap();
    assert!(!todo.completed);

    let done = alice
        .update_todo(
            todo.id,
            &UpdateTodo {
                completed: Some(true),
                ..UpdateTodo::default()
            },
        )
        .await
        .unwrap();
    assert!(done.completed);
    assert_eq!(done.title, "write tests");

    let err = alice
        .update_todo(
            todo.id,
            &UpdateTodo {
                title: Some(String::new()),
                ..UpdateTodo::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(failure(&err).status, 400);

    let err = bob.delete_todo(todo.id).await.unwrap_err();
    assert_eq!(failure(&err).status, 404);
    assert!(bob.todos().await.unwrap().is_empty());

    alice.delete_todo(todo.id).await.unwrap();
    assert!(alice.todos().await.unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn undecryptable_rows_are_rejected() {
    let server = TestServer::start().await;
    let client = server.client();
    let created = client
        .signup(&signup_request("alice", "alice@example.com"))
        .await
        .unwrap();
    client
        .login(&login_request("alice@example.com"))
        .await
        .unwrap();
    let owner = created.user.id;
    let corrupt = "AAAAAAAAAAAAAAAA.AAAA.AAAAAAAAAAAAAAAAAAAAAA==";

    server
        .store
        .create_note(owner, corrupt.into(), corrupt.into())
        .await
        .unwrap();
    let err = client.notes().await.unwrap_err();
    let failure_body = failure(&err);
    assert_eq!(failure_body.status, 401);
    assert_eq!(failure_body.message, "Unauthorized");

    // Sealed under a different key.
    let foreign = FieldCipher::new(&FieldKey::generate())
        .encrypt_opaque("someone else's")
        .unwrap();
    server.store.create_todo(owner, foreign).await.unwrap();
    let err = client.todos().await.unwrap_err();
    let failure_body = failure(&err);
    assert_eq!(failure_body.status, 401);
    assert_eq!(failure_body.message, "Unauthorized");

    server.stop().await;
}

#[tokio::test]
async fn data_routes_require_bearer() {
    let server = TestServer::start().await;
    let client = server.client();

    let err = client.notes().await.unwrap_err();
    assert_eq!(failure(&err).status, 401);
    let err = client
        .create_todo(&CreateTodo { title: "x".into() })
        .await
        .unwrap_err();
    assert_eq!(failure(&err).status, 401);

    client.set_access_token(Some("not.a.token".into()));
    let err = client.todos().await.unwrap_err();
    assert_eq!(failure(&err).status, 401);

    server.stop().await;
}

#[tokio::test]
async fn unknown_routes() {
    let server = TestServer::start().await;
    let http = reqwest::Client::new();

    let response = http
        .get(server.url.join("/api/unknown").unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = http
        .put(server.url.join("/api/auth/login").unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);

    server.stop().await;
}

#[tokio::test]
async fn history() {
    let server = TestServer::start().await;
    let client = server.client();

    client
        .add_calculation(&NewCalculation {
            expression: "1 + 1".into(),
            result: 2.0,
        })
        .await
        .unwrap();
    client
        .add_calculation(&NewCalculation {
            expression: "2 * 3".into(),
            result: 6.0,
        })
        .await
        .unwrap();

    let history = client.history().await.unwrap();
    assert_eq!(
        history
            .iter()
            .map(|entry| entry.expression.as_str())
            .collect::<Vec<_>>(),
        ["2 * 3", "1 + 1"]
    );

    assert!(client.clear_history().await.unwrap().success);
    assert!(client.history().await.unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn messages() {
    let server = TestServer::start().await;
    let client = server.client();

    let first = client
        .post_message(&NewMessage {
            title: "hello".into(),
            body: "world".into(),
        })
        .await
        .unwrap();
    client
        .post_message(&NewMessage {
            title: "second".into(),
            body: "post".into(),
        })
        .await
        .unwrap();

    client
        .delete_messages(&DeleteMessages {
            id: Some(first.id),
            delete_all: false,
        })
        .await
        .unwrap();
    let messages = client.messages().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].title, "second");

    let err = client
        .delete_messages(&DeleteMessages::default())
        .await
        .unwrap_err();
    assert_eq!(failure(&err).status, 400);

    client
        .delete_messages(&DeleteMessages {
            id: None,
            delete_all: true,
        })
        .await
        .unwrap();
    assert!(client.messages().await.unwrap().is_empty());

    server.stop().await;
}
