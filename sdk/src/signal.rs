use {
    anyhow::{Context, Result},
    derive_more::Display,
    std::future::Future,
    tokio::signal::ctrl_c,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ShutdownSignal {
    #[display("SIGINT")]
    Sigint,
    #[display("SIGTERM")]
    Sigterm,
}

/// Resolves with the first termination signal delivered to the process.
///
/// Handlers are installed before the returned future is first polled, so an
/// installation failure is reported immediately.
#[inline]
pub fn shutdown_signal() -> Result<impl Future<Output = Result<ShutdownSignal>>> {
    let sigterm = sigterm().context("failed to install sigterm signal handler")?;
    Ok(async move {
        tokio::select! {
            signal = ctrl_c() => {
                signal.context("failed to install sigint signal handler")?;
                Ok(ShutdownSignal::Sigint)
            }
            () = sigterm => Ok(ShutdownSignal::Sigterm),
        }
    })
}

fn sigterm() -> Result<impl Future<Output = ()>> {
    #[cfg(target_family = "unix")]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        Ok(async move {
            sigterm.recv().await;
        })
    }

    #[cfg(not(target_family = "unix"))]
    Ok(std::future::pending())
}
