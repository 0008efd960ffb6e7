//! Serving HTTP/1 connections accepted by the API server.

use {
    hyper::{
        Request, Response,
        body::{Body, Incoming},
        server::conn::http1,
        service::service_fn,
    },
    hyper_util::rt::TokioIo,
    std::{convert::Infallible, error::Error, future::Future, io, net::SocketAddr, pin::pin},
    tokio::{
        io::{AsyncRead, AsyncWrite},
        sync::watch,
    },
    tracing::{debug, warn},
};

/// Serves requests on `io` until the peer disconnects.
///
/// Once `shutdown` changes, the connection finishes the in-flight request
/// and closes instead of waiting for the next keep-alive request.
#[inline]
pub async fn serve_connection<C, H, Fut, B>(
    io: C,
    peer: SocketAddr,
    handler: H,
    mut shutdown: watch::Receiver<bool>,
) where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    H: Fn(Request<Incoming>) -> Fut,
    Fut: Future<Output = Result<Response<B>, Infallible>>,
    B: Body + 'static,
    <B as Body>::Error: Error + Send + Sync,
{
    let connection = http1::Builder::new()
        .keep_alive(true)
        .serve_connection(TokioIo::new(io), service_fn(handler));
    let mut connection = pin!(connection);
    let mut closing = *shutdown.borrow();
    if closing {
        connection.as_mut().graceful_shutdown();
    }
    let serving = loop {
        tokio::select! {
            result = connection.as_mut() => break result,
            _ = shutdown.changed(), if !closing => {
                closing = true;
                connection.as_mut().graceful_shutdown();
            }
        }
    };
    if let Err(err) = serving {
        if let Some(err) = err.source().and_then(|err| err.downcast_ref::<io::Error>()) {
            match err.kind() {
                io::ErrorKind::NotConnected | io::ErrorKind::ConnectionReset => {
                    debug!(%peer, error = ?err, "canceled request");
                }
                _ => warn!(%peer, error = ?err, "error while serving"),
            }
        } else if err.is_incomplete_message() {
            debug!(%peer, error = ?err, "interrupted request");
        } else {
            warn!(%peer, error = ?err, "failed to serve HTTP");
        }
    }
}
