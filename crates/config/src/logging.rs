//! Split logging: one sink for the application, one for SFTP traffic.
//!
//! Every line is `LEVEL:<logger-name>: <message>`. Error messages that start
//! with an error-kind tag therefore come out as, e.g.,
//! `ERROR:certdeploy-client:ContainerNotFound: ...` — these prefixes are
//! stable and grepped by the integration tests of downstream deployments.

use std::fs::{File, OpenOptions};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{ConfigError, Result};
use crate::types::SinkConfig;

/// Target for events that belong on the SFTP sink.
pub const SFTP_TARGET: &str = "certdeploy-sftp";

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// True once `init` has installed the subscriber for this process.
pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::SeqCst)
}

/// Events on this target (or from the ssh library itself) route to the SFTP
/// sink; everything else goes to the application sink.
fn is_sftp_event(target: &str) -> bool {
    target == SFTP_TARGET || target.starts_with("russh")
}

struct LinePrefix {
    name: &'static str,
}

impl<S, N> FormatEvent<S, N> for LinePrefix
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let level = match *event.metadata().level() {
            Level::ERROR => "ERROR",
            Level::WARN => "WARNING",
            Level::INFO => "INFO",
            Level::DEBUG | Level::TRACE => "DEBUG",
        };
        write!(writer, "{level}:{}:", self.name)?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn open_sink(field: &'static str, sink: &SinkConfig) -> Result<Mutex<File>> {
    let file = OpenOptions::new().create(true).append(true).open(&sink.filename).map_err(|_| {
        ConfigError::InvalidPath {
            field: field.to_string(),
            kind: "a writable file",
            path: sink.filename.display().to_string(),
        }
    })?;
    Ok(Mutex::new(file))
}

/// Install the two-sink subscriber for this process.
///
/// `name` is the logger name baked into every line (`certdeploy-server` or
/// `certdeploy-client`).
pub fn init(name: &'static str, app: &SinkConfig, sftp: &SinkConfig) -> Result<()> {
    let app_writer = open_sink("log_filename", app)?;
    let sftp_writer = open_sink("sftp_log_filename", sftp)?;

    let app_level = app.level.as_tracing_level();
    let sftp_level = sftp.level.as_tracing_level();

    let app_layer = tracing_subscriber::fmt::layer()
        .event_format(LinePrefix { name })
        .with_writer(app_writer)
        .with_filter(filter_fn(move |meta| {
            !is_sftp_event(meta.target()) && *meta.level() <= app_level
        }));
    let sftp_layer = tracing_subscriber::fmt::layer()
        .event_format(LinePrefix { name })
        .with_writer(sftp_writer)
        .with_filter(filter_fn(move |meta| {
            is_sftp_event(meta.target()) && *meta.level() <= sftp_level
        }));

    tracing_subscriber::registry()
        .with(app_layer)
        .with(sftp_layer)
        .try_init()
        .map_err(|e| ConfigError::Parse(format!("failed to install logger: {e}")))?;
    INITIALIZED.store(true, Ordering::SeqCst);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sftp_routing() {
        assert!(is_sftp_event(SFTP_TARGET));
        assert!(is_sftp_event("russh::server"));
        assert!(!is_sftp_event("certdeploy_server::push"));
    }
}
