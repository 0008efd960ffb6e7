//! Signup, login and the refresh cycle.
//!
//! This is where the field cipher and the token issuer meet: login and
//! refresh decrypt the stored username before signing it into a new access
//! token.

use {
    crate::{
        Context,
        store::{NewUser, StoreError, UserRecord},
        util::ApiError,
        validate,
    },
    hyper::{HeaderMap, header::AUTHORIZATION},
    std::fmt::Display,
    tokio::task::spawn_blocking,
    toolbelt_protocol::{
        UserId,
        endpoints::{Login, Signup},
    },
    toolbelt_sdk::{crypto::FieldPolicy, token::AccessClaims},
    tracing::{debug, info, warn},
};

pub const BCRYPT_COST: u32 = 10;

pub const DUPLICATE_EMAIL: &str = "User with this email already exists";
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const UNAUTHORIZED: &str = "Unauthorized";
pub const MISSING_REFRESH_TOKEN: &str = "Refresh token is missing";
pub const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

/// Tokens handed out by a successful login. The refresh token goes into the
/// cookie, never into the response body.
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
}

#[inline]
pub async fn signup(ctx: &Context, request: Signup) -> Result<UserId, ApiError> {
    validate::signup(&request)?;
    let email = ctx
        .cipher
        .encrypt(FieldPolicy::Deterministic, &request.email)
        .map_err(internal)?;
    if ctx.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::bad_request(DUPLICATE_EMAIL));
    }
    let username = ctx
        .cipher
        .encrypt(FieldPolicy::Opaque, &request.username)
        .map_err(internal)?;
    let password_hash = hash_password(request.password).await?;

    let created = ctx
        .store
        .create_user(NewUser {
            username,
            email,
            password_hash,
        })
        .await;
    match created {
        Ok(id) => {
            info!(%id, "user signed up");
            Ok(id)
        }
        // Lost a race with a concurrent signup for the same email.
        Err(StoreError::Duplicate) => Err(ApiError::bad_request(DUPLICATE_EMAIL)),
        Err(err) => Err(err.into()),
    }
}

/// Unknown email and wrong password produce the same response.
#[inline]
pub async fn login(ctx: &Context, request: Login) -> Result<Session, ApiError> {
    validate::login(&request)?;
    let email = ctx
        .cipher
        .encrypt(FieldPolicy::Deterministic, &request.email)
        .map_err(internal)?;
    let Some(user) = ctx.store.find_user_by_email(&email).await? else {
        debug!("login for unknown email");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };
    if !verify_password(request.password, user.password_hash.clone()).await? {
        debug!(id = %user.id, "login with wrong password");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }
    let username = stored_username(ctx, &user, INVALID_CREDENTIALS)?;

    let access_token = ctx
        .tokens
        .issue_access_token(user.id, &username, Some(&request.email))
        .map_err(internal)?;
    let refresh_token = ctx.tokens.issue_refresh_token(user.id).map_err(internal)?;
    info!(id = %user.id, "user logged in");
    Ok(Session {
        access_token,
        refresh_token,
    })
}

/// Verifies the refresh token, reloads the user and issues a fresh access
/// token. Every failure is a 401.
#[inline]
pub async fn refresh_cycle(ctx: &Context, refresh_token: Option<&str>) -> Result<String, ApiError> {
    let token = refresh_token.ok_or_else(|| ApiError::unauthorized(MISSING_REFRESH_TOKEN))?;
    let claims = ctx.tokens.verify_refresh_token(token).map_err(|err| {
        debug!(%err, "refresh token rejected");
        ApiError::unauthorized(INVALID_REFRESH_TOKEN)
    })?;
    let Some(user) = ctx.store.find_user_by_id(claims.id).await? else {
        debug!(id = %claims.id, "refresh for a missing user");
        return Err(ApiError::unauthorized("User not found"));
    };
    let username = stored_username(ctx, &user, INVALID_REFRESH_TOKEN)?;
    let email = ctx
        .cipher
        .decrypt(FieldPolicy::Deterministic, &user.email)
        .inspect_err(|err| warn!(id = %user.id, %err, "stored email does not decrypt"))
        .ok();
    ctx.tokens
        .issue_access_token(user.id, &username, email.as_deref())
        .map_err(internal)
}

/// Identity of the caller, from `Authorization: Bearer <token>`.
///
/// A missing header, another scheme, and an invalid or expired token all
/// look the same to the caller.
#[inline]
pub fn authenticate(ctx: &Context, headers: &HeaderMap) -> Result<AccessClaims, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthorized(UNAUTHORIZED))?;
    ctx.tokens.verify_access_token(token).map_err(|err| {
        debug!(%err, "access token rejected");
        ApiError::unauthorized(UNAUTHORIZED)
    })
}

fn stored_username(
    ctx: &Context,
    user: &UserRecord,
    public_message: &'static str,
) -> Result<String, ApiError> {
    ctx.cipher
        .decrypt(FieldPolicy::Opaque, &user.username)
        .map_err(|err| {
            warn!(id = %user.id, %err, "stored username does not decrypt");
            ApiError::unauthorized(public_message)
        })
}

async fn hash_password(password: String) -> Result<String, ApiError> {
    spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(internal)?
        .map_err(internal)
}

async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    let verified = spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(internal)?;
    Ok(verified.unwrap_or_else(|err| {
        warn!(%err, "stored password hash is unusable");
        false
    }))
}

fn internal(err: impl Display) -> ApiError {
    warn!(%err, "auth failure");
    ApiError::internal()
}
