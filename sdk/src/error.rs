use thiserror::Error;

/// Failures of the field cipher and the token issuer.
///
/// Callers turn `MalformedPayload` and `AuthenticationFailure` into a generic
/// "unauthorized" or "bad request" response. The messages never contain key
/// material or plaintext.
#[derive(Debug, Error)]
pub enum Error {
    /// The encrypted string is structurally invalid.
    #[error("malformed encrypted payload: {0}")]
    MalformedPayload(&'static str),

    /// Bad auth tag, bad signature, or an expired or otherwise invalid token.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// Key or secret is unusable. Fatal at startup.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
