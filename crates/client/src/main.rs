use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use certdeploy_client::args::Cli;
use certdeploy_client::update::Updater;
use certdeploy_client::{ClientError, daemon, deploy};
use certdeploy_config::{LogLevel, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        if logging::is_initialized() {
            tracing::error!("{e}");
        } else {
            // Config errors can hit before the logger exists; write the
            // stable prefix by hand so the line shape is the same.
            eprintln!("ERROR:certdeploy-client:{e}");
        }
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), ClientError> {
    let mut config = certdeploy_config::load_client(&cli.config)?;

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
    logging::init("certdeploy-client", &config.log, &config.sftp_log)?;

    let config = Arc::new(config);
    if cli.daemon {
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            daemon::wait_for_signal().await;
            shutdown.cancel();
        });
        daemon::serve(config, cancel).await
    } else {
        // One-shot: promote whatever is staged and run updates if anything
        // changed.
        if deploy::promote(&config)? {
            Updater::new(&config).run_all().await?;
        }
        Ok(())
    }
}
