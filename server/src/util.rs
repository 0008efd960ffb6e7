use {
    crate::store::StoreError,
    anyhow::Result,
    http_body_util::{BodyExt, Full, LengthLimitError, Limited, combinators::BoxBody},
    hyper::{
        Response, StatusCode,
        body::{Body, Bytes},
        header::{CONTENT_TYPE, HeaderValue},
    },
    serde::{Serialize, de::DeserializeOwned},
    std::{
        borrow::Cow,
        convert::Infallible,
        error::Error as StdError,
        io::{self, Write},
        path::Path,
        sync::Mutex,
    },
    thiserror::Error,
    toolbelt_protocol::endpoints::ErrorResponse,
    tracing::{debug, warn},
    tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt},
};

pub type ResponseBody = BoxBody<Bytes, Infallible>;

pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// An error that is shown to the caller as `{"error": message}`.
///
/// The message is public: it never carries internal error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: Cow<'static, str>,
}

impl ApiError {
    #[inline]
    pub fn new(status: StatusCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    #[inline]
    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    #[inline]
    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    #[must_use]
    #[inline]
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found")
    }

    #[must_use]
    #[inline]
    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }

    #[must_use]
    #[inline]
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    #[must_use]
    #[inline]
    pub fn into_response(self) -> Response<ResponseBody> {
        json_response(
            self.status,
            &ErrorResponse {
                error: self.message.into_owned(),
            },
        )
    }
}

impl From<StoreError> for ApiError {
    #[inline]
    fn from(err: StoreError) -> Self {
        warn!(?err, "store error");
        Self::internal()
    }
}

#[inline]
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    let (status, bytes) = match serde_json::to_vec(value) {
        Ok(bytes) => (status, bytes),
        Err(err) => {
            warn!(?err, "failed to serialize response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":"Internal server error"}"#.to_vec(),
            )
        }
    };
    let mut response = Response::new(Full::new(Bytes::from(bytes)).boxed());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[inline]
pub fn ok<T: Serialize>(value: &T) -> Result<Response<ResponseBody>, ApiError> {
    Ok(json_response(StatusCode::OK, value))
}

#[inline]
pub fn created<T: Serialize>(value: &T) -> Result<Response<ResponseBody>, ApiError> {
    Ok(json_response(StatusCode::CREATED, value))
}

/// Reads the whole body, up to [`MAX_BODY_SIZE`], and parses it as JSON.
#[inline]
pub async fn parse_json<T, B>(body: B) -> Result<T, ApiError>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let bytes = Limited::new(body, MAX_BODY_SIZE)
        .collect()
        .await
        .map_err(|err| {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body is too large")
            } else {
                warn!(%err, "failed to read request body");
                ApiError::bad_request("Failed to read request body")
            }
        })?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|err| {
        debug!(%err, "invalid request body");
        ApiError::bad_request("Invalid JSON body")
    })
}

/// Logs to `log_file` if set, stdout otherwise.
#[inline]
pub fn setup_logger(log_file: Option<&Path>, log_filter: &str) -> Result<()> {
    let writer: Box<dyn Write + Send> = match log_file {
        Some(path) => Box::new(
            fs_err::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        ),
        None => Box::new(io::stdout()),
    };
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(log_file.is_none())
        .with_writer(Mutex::new(writer));
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::try_new(log_filter)?)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, serde::Deserialize};

    #[derive(Debug, Deserialize)]
    struct Payload {
        name: String,
    }

    #[tokio::test]
    async fn error_body() {
        let response = ApiError::unauthorized("Invalid credentials").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], br#"{"error":"Invalid credentials"}"#);
    }

    #[tokio::test]
    async fn body_parsing() {
        let parsed: Payload = parse_json(Full::new(Bytes::from_static(br#"{"name":"x"}"#)))
            .await
            .unwrap();
        assert_eq!(parsed.name, "x");

        let err = parse_json::<Payload, _>(Full::new(Bytes::from_static(b"{")))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = parse_json::<Payload, _>(Full::new(Bytes::from(vec![b' '; MAX_BODY_SIZE + 1])))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::PAYLOAD_TOO_LARGE);
    }
}
