//! Access and refresh tokens.
//!
//! Both are HS256 JWTs, signed with two different secrets. The access token
//! carries `{id, username, email?}` and lives for minutes. The refresh token
//! carries only `{id}`, lives for days, and is only ever sent in an
//! `HttpOnly` cookie. Nothing is stored on the server side, so issuing a
//! token is a pure function of its inputs and the current time.

use {
    crate::{Error, Result},
    chrono::Utc,
    jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation},
    serde::{de::DeserializeOwned, Deserialize, Serialize},
    toolbelt_protocol::{ExpiresIn, JwtSecret, UserId},
    tracing::debug,
};

pub const DEFAULT_ACCESS_EXPIRY: &str = "15m";
pub const DEFAULT_REFRESH_EXPIRY: &str = "7d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub id: UserId,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: JwtSecret,
    pub refresh_secret: JwtSecret,
    pub access_expiry: ExpiresIn,
    pub refresh_expiry: ExpiresIn,
}

struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn new(secret: &JwtSecret) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_unmasked_bytes()),
            decoding: DecodingKey::from_secret(secret.as_unmasked_bytes()),
        }
    }
}

pub struct TokenIssuer {
    access: SigningKey,
    refresh: SigningKey,
    access_expiry: ExpiresIn,
    refresh_expiry: ExpiresIn,
    validation: Validation,
}

impl TokenIssuer {
    /// Fails if the access and refresh secrets are the same: a refresh token
    /// must never pass as an access token.
    #[inline]
    pub fn new(config: &TokenConfig) -> Result<Self> {
        if config.access_secret == config.refresh_secret {
            return Err(Error::Configuration(
                "access and refresh token secrets must differ".into(),
            ));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Ok(Self {
            access: SigningKey::new(&config.access_secret),
            refresh: SigningKey::new(&config.refresh_secret),
            access_expiry: config.access_expiry,
            refresh_expiry: config.refresh_expiry,
            validation,
        })
    }

    #[must_use]
    #[inline]
    pub fn access_expiry(&self) -> ExpiresIn {
        self.access_expiry
    }

    #[must_use]
    #[inline]
    pub fn refresh_expiry(&self) -> ExpiresIn {
        self.refresh_expiry
    }

    #[inline]
    pub fn issue_access_token(
        &self,
        id: UserId,
        username: &str,
        email: Option<&str>,
    ) -> Result<String> {
        let (iat, exp) = lifetime(self.access_expiry);
        sign(
            &self.access,
            &AccessClaims {
                id,
                username: username.to_owned(),
                email: email.map(ToOwned::to_owned),
                iat,
                exp,
            },
        )
    }

    #[inline]
    pub fn issue_refresh_token(&self, id: UserId) -> Result<String> {
        let (iat, exp) = lifetime(self.refresh_expiry);
        sign(&self.refresh, &RefreshClaims { id, iat, exp })
    }

    /// Any failure (bad signature, expired, malformed) is reported as
    /// [`Error::AuthenticationFailure`].
    #[inline]
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims> {
        self.verify(&self.access, token)
    }

    #[inline]
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims> {
        self.verify(&self.refresh, token)
    }

    fn verify<T: DeserializeOwned>(&self, key: &SigningKey, token: &str) -> Result<T> {
        decode::<T>(token, &key.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                debug!(kind = ?err.kind(), "token rejected");
                Error::AuthenticationFailure
            })
    }
}

fn lifetime(expiry: ExpiresIn) -> (i64, i64) {
    let now = Utc::now();
    let exp = now
        .checked_add_signed(expiry.get())
        .unwrap_or(now)
        .timestamp();
    (now.timestamp(), exp)
}

fn sign<T: Serialize>(key: &SigningKey, claims: &T) -> Result<String> {
    encode(&Header::new(Algorithm::HS256), claims, &key.encoding)
        .map_err(|err| Error::Configuration(format!("failed to sign token: {err}")))
}

#[cfg(test)]
mod tests {
    use {super::*, std::str::FromStr};

    fn config() -> TokenConfig {
        TokenConfig {
            access_secret: JwtSecret::from_str("access-secret").unwrap(),
            refresh_secret: JwtSecret::from_str("refresh-secret").unwrap(),
            access_expiry: DEFAULT_ACCESS_EXPIRY.parse().unwrap(),
            refresh_expiry: DEFAULT_REFRESH_EXPIRY.parse().unwrap(),
        }
    }

    #[test]
    fn access_roundtrip() {
        let issuer = TokenIssuer::new(&config()).unwrap();
        let token = issuer
            .issue_access_token(UserId(7), "alice", Some("a@example.com"))
            .unwrap();
        let claims = issuer.verify_access_token(&token).unwrap();
        assert_eq!(claims.id, UserId(7));
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.email.as_deref(), Some("a@example.com"));
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn refresh_roundtrip() {
        let issuer = TokenIssuer::new(&config()).unwrap();
        let token = issuer.issue_refresh_token(UserId(7)).unwrap();
        let claims = issuer.verify_refresh_token(&token).unwrap();
        assert_eq!(claims.id, UserId(7));
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn email_is_optional() {
        let issuer = TokenIssuer::new(&config()).unwrap();
        let token = issuer.issue_access_token(UserId(1), "bob", None).unwrap();
        assert_eq!(issuer.verify_access_token(&token).unwrap().email, None);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let mut config = config();
        config.access_expiry = "-1s".parse().unwrap();
        config.refresh_expiry = "-1s".parse().unwrap();
        let issuer = TokenIssuer::new(&config).unwrap();

        let access = issuer.issue_access_token(UserId(1), "alice", None).unwrap();
        assert!(matches!(
            issuer.verify_access_token(&access),
            Err(Error::AuthenticationFailure)
        ));
        let refresh = issuer.issue_refresh_token(UserId(1)).unwrap();
        assert!(matches!(
            issuer.verify_refresh_token(&refresh),
            Err(Error::AuthenticationFailure)
        ));
    }

    #[test]
    fn secrets_are_not_interchangeable() {
        let issuer = TokenIssuer::new(&config()).unwrap();
        let access = issuer.issue_access_token(UserId(1), "alice", None).unwrap();
        let refresh = issuer.issue_refresh_token(UserId(1)).unwrap();

        assert!(matches!(
            issuer.verify_access_token(&refresh),
            Err(Error::AuthenticationFailure)
        ));
        assert!(matches!(
            issuer.verify_refresh_token(&access),
            Err(Error::AuthenticationFailure)
        ));
    }

    #[test]
    fn same_secrets_are_refused() {
        let mut config = config();
        config.refresh_secret = config.access_secret.clone();
        assert!(matches!(
            TokenIssuer::new(&config),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let issuer = TokenIssuer::new(&config()).unwrap();
        for token in ["", "abc", "a.b.c", "Bearer x"] {
            assert!(matches!(
                issuer.verify_access_token(token),
                Err(Error::AuthenticationFailure)
            ));
        }
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let issuer = TokenIssuer::new(&config()).unwrap();
        let mut other = config();
        other.access_secret = JwtSecret::from_str("another-secret").unwrap();
        let token = TokenIssuer::new(&other)
            .unwrap()
            .issue_access_token(UserId(1), "mallory", None)
            .unwrap();
        assert!(issuer.verify_access_token(&token).is_err());
    }
}
