use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use certdeploy_config::{LogLevel, logging};
use certdeploy_server::args::Cli;
use certdeploy_server::push::PushEngine;
use certdeploy_server::queue::Queue;
use certdeploy_server::{ServerError, daemon, hook, renew};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        if logging::is_initialized() {
            tracing::error!("{e}");
        } else {
            // Config errors can hit before the logger exists; write the
            // stable prefix by hand so the line shape is the same.
            eprintln!("ERROR:certdeploy-server:{e}");
        }
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    let mut config = certdeploy_config::load_server(&cli.config)?;

    if let Some(filename) = cli.log_filename {
        config.log.filename = filename;
    }
    if let Some(level) = &cli.log_level {
        config.log.level = level.parse::<LogLevel>()?;
    }
    if let Some(filename) = cli.sftp_log_filename {
        config.sftp_log.filename = filename;
    }
    if let Some(level) = &cli.sftp_log_level {
        config.sftp_log.level = level.parse::<LogLevel>()?;
    }
    logging::init("certdeploy-server", &config.log, &config.sftp_log)?;

    let config = Arc::new(config);
    let queue = Queue::open(&config.queue_dir);

    // Seed the queue first so --push in the same invocation drains it.
    match (&cli.lineage, &cli.domains) {
        (Some(lineage), Some(domains)) => {
            hook::enqueue(&queue, lineage, domains)?;
        }
        (None, None) => {}
        _ => {
            return Err(ServerError::Other(format!(
                "could not find lineage or domains. lineage: {:?}, domains: {:?}",
                cli.lineage, cli.domains
            )));
        }
    }

    if cli.renew {
        if let Err(e) = renew::renew_certs(&config).await {
            if config.fail_fast {
                return Err(e);
            }
            tracing::error!("{e}");
        }
    }

    if cli.push {
        let engine = PushEngine::new(Arc::clone(&config), queue.clone());
        engine.drain().await?;
    }

    if cli.daemon {
        let engine = PushEngine::new(Arc::clone(&config), queue.clone());
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            daemon::wait_for_signal().await;
            shutdown.cancel();
        });
        daemon::serve(config, queue, engine, cancel).await?;
    } else if !cli.renew && !cli.push && cli.lineage.is_none() {
        return Err(ServerError::Other(
            "nothing to do: pass --daemon, --renew, --push, or --lineage/--domains".to_string(),
        ));
    }

    Ok(())
}
