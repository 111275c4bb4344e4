mod filters;
mod handlers;
mod reply;

pub mod routes;

use std::net::SocketAddr;

use tracing::{info, warn};

use crate::authz::Authorizer;
use crate::client::IdentityClient;
use crate::config::Config;

/// Returns a future that runs a server until it receives a SIGINT, SIGTERM or SIGQUIT (ctrl-c on
/// platforms without unix signals) to stop. In-flight requests are allowed to finish first
pub async fn server<A>(authorizer: A, client: IdentityClient, config: &Config) -> anyhow::Result<()>
where
    A: Authorizer + Clone + Send + Sync + 'static,
{
    let api = routes::api(authorizer, client, config);
    let addr = SocketAddr::new(config.bind_address, config.port);

    let (addr, running) = warp::serve(api).try_bind_with_graceful_shutdown(addr, shutdown_signal())?;
    info!(
        %addr,
        base_path = %config.base_path,
        scheme = %config.authorization_scheme,
        "Server listening"
    );
    running.await;
    info!("Server stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut signals = Vec::new();
    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::quit(), "SIGQUIT"),
    ] {
        match signal(kind) {
            Ok(s) => signals.push((s, name)),
            Err(e) => warn!(error = %e, signal = name, "Unable to install signal handler"),
        }
    }
    if signals.is_empty() {
        return ctrl_c().await;
    }

    let received = signals
        .iter_mut()
        .map(|(s, name)| Box::pin(async move {
            s.recv().await;
            *name
        }));
    let (name, _, _) = futures::future::select_all(received).await;
    info!(signal = name, "Received signal, shutting down");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a handler the server just runs until it is killed
        warn!(error = %e, "Unable to install ctrl-c handler");
        futures::future::pending::<()>().await;
    }
    info!("Received ctrl-c, shutting down");
}
