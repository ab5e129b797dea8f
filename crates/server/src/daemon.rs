//! The server daemon: renewal timer plus queue-drain loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use certdeploy_config::ServerConfig;

use crate::error::Result;
use crate::push::{LineageSync, PushEngine};
use crate::queue::Queue;
use crate::renew::renew_certs;
use crate::schedule::Schedule;

/// Poll interval while the queue is empty.
const IDLE_SLEEP: Duration = Duration::from_secs(30);
/// Poll interval right after work was found.
const BUSY_SLEEP: Duration = Duration::from_millis(100);

/// Run the daemon until cancelled: a renewal scheduler task plus the drain
/// loop. Under `fail_fast` the first fatal error tears the whole daemon
/// down.
pub async fn serve<S: LineageSync + ?Sized + 'static>(
    config: Arc<ServerConfig>,
    queue: Queue,
    engine: PushEngine<S>,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!("Starting daemon.");
    let schedule = Schedule::from_config(&config.renew);
    tracing::info!(
        "Attempting to renew certs every {} {:?} at {:?}",
        config.renew.every,
        config.renew.unit,
        config.renew.at,
    );

    let renew_task = tokio::spawn(renew_loop(
        Arc::clone(&config),
        schedule,
        cancel.clone(),
    ));

    let drain_result = drain_loop(&queue, &engine, &cancel).await;
    cancel.cancel();

    match renew_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            drain_result?;
            return Err(e);
        }
        Err(e) => tracing::warn!("renew task ended abnormally: {e}"),
    }
    drain_result
}

async fn renew_loop(
    config: Arc<ServerConfig>,
    schedule: Schedule,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let now = chrono::Local::now().naive_local();
        let next = schedule.next_fire(now);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!("next renewal attempt at {next}");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.cancelled() => return Ok(()),
        }

        if let Err(e) = renew_certs(&config).await {
            if config.fail_fast {
                cancel.cancel();
                return Err(e);
            }
            tracing::error!("{e}");
        }
    }
}

async fn drain_loop<S: LineageSync + ?Sized + 'static>(
    queue: &Queue,
    engine: &PushEngine<S>,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        let sleep = match queue.is_empty() {
            Ok(true) => IDLE_SLEEP,
            Ok(false) => {
                engine.drain().await?;
                BUSY_SLEEP
            }
            Err(e) => return Err(e),
        };
        tokio::select! {
            _ = tokio::time::sleep(sleep) => {}
            _ = cancel.cancelled() => return Ok(()),
        }
    }
}

/// Resolve on SIGTERM or SIGINT.
pub async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(term) => term,
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
