//! The client daemon: sftpd listener plus the promote/update loop.
//!
//! States: idle → uploading (sftpd) → promoting → updating → idle. A deploy
//! event after an upload session triggers promotion; a successful promotion
//! arms the update timer, and another upload before it expires re-arms it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use certdeploy_config::ClientConfig;

use crate::deploy;
use crate::error::{ClientError, Result};
use crate::sftpd::{DeployEvent, SftpServer};
use crate::update::Updater;

pub async fn serve(config: Arc<ClientConfig>, cancel: CancellationToken) -> Result<()> {
    let (events_tx, events_rx) = mpsc::channel::<DeployEvent>(16);
    let sftpd = SftpServer::new(Arc::clone(&config), events_tx);
    let mut sftpd_task = tokio::spawn(sftpd.run(cancel.clone()));

    let mut update_due: Option<Instant> = None;
    let mut events_rx = events_rx;

    loop {
        let update_timer = async {
            match update_due {
                Some(due) => tokio::time::sleep_until(due).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,

            joined = &mut sftpd_task => {
                return match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(ClientError::Sftpd(format!("listener task died: {e}"))),
                };
            }

            event = events_rx.recv() => {
                if event.is_none() {
                    // Sender side is gone with the listener; the join arm
                    // above will report why.
                    continue;
                }
                tracing::info!("Deploying new certs");
                match deploy::promote(&config) {
                    Ok(true) => {
                        tracing::info!("Queueing updates for services");
                        update_due = Some(Instant::now() + config.update_delay);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        if config.fail_fast {
                            cancel.cancel();
                            return Err(e);
                        }
                        tracing::error!("{e}");
                    }
                }
            }

            _ = update_timer, if update_due.is_some() => {
                update_due = None;
                if let Err(e) = Updater::new(&config).run_all().await {
                    // run_all only errors under fail_fast.
                    cancel.cancel();
                    return Err(e);
                }
            }
        }
    }
    Ok(())
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
