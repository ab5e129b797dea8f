//! The embedded ssh/SFTP server.
//!
//! One pinned peer, one username, publickey auth only. Each accepted session
//! gets a sandboxed SFTP subsystem rooted at the staging directory; when the
//! session ends a deploy event is emitted so the daemon can promote whatever
//! landed.

mod handler;

pub use handler::SftpHandler;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::server::{Auth, Config, Msg, Server, Session};
use russh::{Channel, ChannelId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use certdeploy_config::ClientConfig;
use certdeploy_config::logging::SFTP_TARGET;

use crate::error::{ClientError, Result};

/// Emitted when an upload session finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployEvent;

pub struct SftpServer {
    config: Arc<ClientConfig>,
    events: mpsc::Sender<DeployEvent>,
}

impl SftpServer {
    pub fn new(config: Arc<ClientConfig>, events: mpsc::Sender<DeployEvent>) -> Self {
        Self { config, events }
    }

    /// Bind and serve until cancelled. A bind failure is fatal; per-session
    /// failures are logged on the SFTP sink and the listener keeps going.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let sftpd = &self.config.sftpd;
        let ssh_config = Arc::new(Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            auth_rejection_time: Duration::from_secs(3),
            auth_rejection_time_initial: Some(Duration::ZERO),
            keys: vec![russh::keys::key::KeyPair::try_from(&sftpd.private_key).map_err(|e| {
                ClientError::Sftpd(format!("invalid host key: {e}"))
            })?],
            ..Default::default()
        });
        let address = (sftpd.listen_address.clone(), sftpd.listen_port);
        let listen_desc = format!("{}:{}", sftpd.listen_address, sftpd.listen_port);
        tracing::info!("Listening for incoming connections at {listen_desc}");

        tokio::select! {
            result = self.run_on_address(ssh_config, address) => {
                result.map_err(|e| ClientError::Sftpd(format!(
                    "failed to listen on {listen_desc}: {e}"
                )))
            }
            _ = cancel.cancelled() => Ok(()),
        }
    }
}

impl Server for SftpServer {
    type Handler = SshSession;

    fn new_client(&mut self, peer_addr: Option<std::net::SocketAddr>) -> SshSession {
        tracing::info!(target: SFTP_TARGET, "Got connection from {peer_addr:?}");
        SshSession {
            config: Arc::clone(&self.config),
            events: self.events.clone(),
            channel: None,
        }
    }
}

pub struct SshSession {
    config: Arc<ClientConfig>,
    events: mpsc::Sender<DeployEvent>,
    channel: Option<Channel<Msg>>,
}

#[async_trait]
impl russh::server::Handler for SshSession {
    type Error = russh::Error;

    async fn auth_password(
        &mut self,
        user: &str,
        _password: &str,
    ) -> std::result::Result<Auth, Self::Error> {
        tracing::warn!(target: SFTP_TARGET, "rejected password auth attempt for {user}");
        Ok(Auth::Reject { proceed_with_methods: None })
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &russh::keys::key::PublicKey,
    ) -> std::result::Result<Auth, Self::Error> {
        use russh::keys::PublicKeyBase64;
        let sftpd = &self.config.sftpd;
        let presented = ssh_key::PublicKey::from_bytes(&public_key.public_key_bytes()).ok();
        if user == sftpd.username
            && presented.is_some_and(|presented| sftpd.server_pubkey.matches(&presented))
        {
            return Ok(Auth::Accept);
        }
        tracing::warn!(target: SFTP_TARGET, "rejected publickey auth for {user}");
        Ok(Auth::Reject { proceed_with_methods: None })
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        self.channel = Some(channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        if name != "sftp" {
            tracing::warn!(target: SFTP_TARGET, "refused subsystem {name}");
            session.channel_failure(channel_id);
            return Ok(());
        }
        let Some(channel) = self.channel.take() else {
            session.channel_failure(channel_id);
            return Ok(());
        };
        session.channel_success(channel_id);

        let handler = SftpHandler::new(self.config.source.clone());
        let uploads = handler.upload_counter();
        let events = self.events.clone();
        tokio::spawn(async move {
            russh_sftp::server::run(channel.into_stream(), handler).await;
            // Only a session that actually wrote something warrants a
            // promotion pass.
            if uploads.load(std::sync::atomic::Ordering::SeqCst) > 0 {
                tracing::debug!(target: SFTP_TARGET, "sftp session closed after upload");
                let _ = events.send(DeployEvent).await;
            } else {
                tracing::debug!(target: SFTP_TARGET, "sftp session closed without uploads");
            }
        });
        Ok(())
    }
}
