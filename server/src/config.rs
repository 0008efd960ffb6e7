use {
    anyhow::{Context as _, Result},
    serde::{Deserialize, Serialize},
    std::{
        env,
        net::SocketAddr,
        path::{Path, PathBuf},
        str::FromStr,
    },
    toolbelt_protocol::{ExpiresIn, FieldKey, JwtSecret},
    toolbelt_sdk::{
        Error,
        token::{DEFAULT_ACCESS_EXPIRY, DEFAULT_REFRESH_EXPIRY, TokenConfig},
    },
};

/// `database_url` value that selects the in-process store.
pub const MEMORY_DATABASE: &str = "memory";

pub const NOTE_ENC_KEY: &str = "NOTE_ENC_KEY";
pub const EMAIL_ENC_KEY: &str = "EMAIL_ENC_KEY";
pub const JWT_SECRET: &str = "JWT_SECRET";
pub const JWT_REFRESH_SECRET: &str = "JWT_REFRESH_SECRET";
pub const ACCESS_TOKEN_EXPIRY: &str = "ACCESS_TOKEN_EXPIRY";
pub const REFRESH_TOKEN_EXPIRY: &str = "REFRESH_TOKEN_EXPIRY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    /// Marks the refresh cookie `Secure`.
    #[serde(default)]
    pub production: bool,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "info".into()
}

impl Config {
    #[inline]
    pub fn parse(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs_err::read_to_string(path)?;
        json5::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Key material and token lifetimes, read from the environment once at
/// startup.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub field_key: FieldKey,
    pub tokens: TokenConfig,
}

impl Secrets {
    #[inline]
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// `NOTE_ENC_KEY` takes precedence; `EMAIL_ENC_KEY` is accepted for
    /// deployments that only set the email key. Both policies use the same
    /// key.
    #[inline]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let (key_name, key) = match get(NOTE_ENC_KEY) {
            Some(key) => (NOTE_ENC_KEY, key),
            None => (
                EMAIL_ENC_KEY,
                get(EMAIL_ENC_KEY).ok_or_else(|| {
                    Error::Configuration(format!("{NOTE_ENC_KEY} is not set"))
                })?,
            ),
        };
        let field_key = parse_value(key_name, &key)?;

        let required = |name: &str| {
            get(name).ok_or_else(|| Error::Configuration(format!("{name} is not set")))
        };
        let access_secret: JwtSecret = parse_value(JWT_SECRET, &required(JWT_SECRET)?)?;
        let refresh_secret: JwtSecret =
            parse_value(JWT_REFRESH_SECRET, &required(JWT_REFRESH_SECRET)?)?;

        let expiry = |name: &str, default: &str| -> Result<ExpiresIn, Error> {
            parse_value(name, &get(name).unwrap_or_else(|| default.to_owned()))
        };
        let tokens = TokenConfig {
            access_secret,
            refresh_secret,
            access_expiry: expiry(ACCESS_TOKEN_EXPIRY, DEFAULT_ACCESS_EXPIRY)?,
            refresh_expiry: expiry(REFRESH_TOKEN_EXPIRY, DEFAULT_REFRESH_EXPIRY)?,
        };
        Ok(Self { field_key, tokens })
    }
}

fn parse_value<T>(name: &str, value: &str) -> Result<T, Error>
where
    T: FromStr<Err = anyhow::Error>,
{
    value
        .parse()
        .map_err(|err| Error::Configuration(format!("invalid {name}: {err:#}")))
}
