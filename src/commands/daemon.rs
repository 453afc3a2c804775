use crate::output::UserOutput;
use mcp_manager::{Daemon, Supervisor};
use tokio_util::sync::CancellationToken;

pub async fn run_daemon(supervisor: Supervisor, out: &dyn UserOutput) -> anyhow::Result<()> {
    let mut daemon = Daemon::new(supervisor);
    daemon.acquire()?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    out.status(&format!(
        "Supervising {} server(s); press Ctrl+C to stop supervising (servers keep running)",
        daemon.supervisor().store().enabled().count()
    ));
    daemon.run(cancel).await?;
    Ok(())
}

/// First SIGINT/SIGTERM cancels the loop after the current sweep; a second
/// one exits immediately.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Failed to create SIGTERM handler: {}", e);
                    None
                }
            };

            let mut signal_count = 0;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = async {
                        match sigterm.as_mut() {
                            Some(s) => s.recv().await,
                            None => std::future::pending::<Option<()>>().await,
                        }
                    } => {}
                }
                signal_count += 1;
                if signal_count == 1 {
                    tracing::info!("Shutdown requested; finishing current sweep");
                    cancel.cancel();
                } else {
                    tracing::warn!("Second signal received; exiting now");
                    std::process::exit(130);
                }
            }
        }

        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });
}
