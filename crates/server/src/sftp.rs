//! SFTP upload of one lineage to one client.
//!
//! The transport is ssh with publickey auth only. The remote host key must
//! equal the pinned key from the client descriptor; anything else aborts
//! before a byte of certificate material leaves the machine. Files land under
//! a temp name and are renamed into place so the remote lineage is never
//! half-written.

use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, UNIX_EPOCH};

use rand::Rng;
use rand::distributions::Alphanumeric;
use russh::keys::{PrivateKeyWithHashAlg, ssh_key};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags, StatusCode};
use tokio::io::AsyncWriteExt;

use certdeploy_config::keys::PinnedKey;
use certdeploy_config::{ClientConnection, ServerConfig};

use crate::error::SyncError;
use crate::queue::PushJob;

const LINEAGE_FILES: [(&str, NeedsFlag); 4] = [
    ("chain.pem", NeedsFlag::Chain),
    ("fullchain.pem", NeedsFlag::Fullchain),
    ("privkey.pem", NeedsFlag::Privkey),
    ("cert.pem", NeedsFlag::Cert),
];

#[derive(Clone, Copy)]
enum NeedsFlag {
    Chain,
    Fullchain,
    Privkey,
    Cert,
}

impl NeedsFlag {
    fn enabled(self, client: &ClientConnection) -> bool {
        match self {
            NeedsFlag::Chain => client.needs_chain,
            NeedsFlag::Fullchain => client.needs_fullchain,
            NeedsFlag::Privkey => client.needs_privkey,
            NeedsFlag::Cert => client.needs_cert,
        }
    }
}

/// One PEM file read from the source lineage, with the attributes that must
/// survive the transfer.
struct SourceFile {
    name: &'static str,
    data: Vec<u8>,
    mode: u32,
    mtime: Option<u32>,
    uid: u32,
    gid: u32,
}

/// ssh client handler that pins the remote host key.
struct PinnedHost {
    pinned: PinnedKey,
    mismatch: Arc<AtomicBool>,
}

impl russh::client::Handler for PinnedHost {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let ok = self.pinned.matches(server_public_key);
        if !ok {
            self.mismatch.store(true, Ordering::SeqCst);
        }
        Ok(ok)
    }
}

/// The production uploader: russh transport, russh-sftp subsystem.
pub struct SftpUploader {
    private_key: Arc<ssh_key::PrivateKey>,
    banner_timeout: Duration,
}

impl SftpUploader {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            private_key: Arc::new(config.private_key.clone()),
            banner_timeout: config.sftp_banner_timeout,
        }
    }

    pub async fn sync(&self, job: &PushJob, client: &ClientConnection) -> Result<(), SyncError> {
        let files = read_source_files(&job.lineage_path, client)?;
        if files.is_empty() {
            // All needs_* flags off for this client; nothing to transfer.
            return Ok(());
        }

        let mismatch = Arc::new(AtomicBool::new(false));
        let handler =
            PinnedHost { pinned: client.pubkey.clone(), mismatch: Arc::clone(&mismatch) };
        let config = Arc::new(russh::client::Config::default());

        let connect =
            russh::client::connect(config, (client.address.as_str(), client.port), handler);
        let mut session = match tokio::time::timeout(self.banner_timeout, connect).await {
            Err(_) => {
                return Err(SyncError::Transient(format!(
                    "timed out connecting to {}:{}",
                    client.address, client.port
                )));
            }
            Ok(Err(e)) => {
                if mismatch.load(Ordering::SeqCst) {
                    return Err(SyncError::HostKeyMismatch {
                        address: client.address.clone(),
                        port: client.port,
                    });
                }
                return Err(SyncError::Transient(format!("ssh connect failed: {e}")));
            }
            Ok(Ok(session)) => session,
        };

        let key = PrivateKeyWithHashAlg::new(Arc::clone(&self.private_key), None)
            .map_err(|e| SyncError::Fatal(format!("unusable private key: {e}")))?;
        let auth = tokio::time::timeout(
            self.banner_timeout,
            session.authenticate_publickey(&client.username, key),
        )
        .await
        .map_err(|_| SyncError::Transient("timed out waiting for auth".to_string()))?
        .map_err(|e| SyncError::Transient(format!("ssh auth failed: {e}")))?;
        if !auth {
            return Err(SyncError::Transient(format!(
                "publickey auth rejected for {}",
                client.username
            )));
        }

        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| SyncError::Transient(format!("channel open failed: {e}")))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SyncError::Transient(format!("sftp subsystem refused: {e}")))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SyncError::Transient(format!("sftp init failed: {e}")))?;

        let remote_dir = join_remote(&client.remote_path.to_string_lossy(), &job.lineage_name);
        ensure_remote_dir(&sftp, &remote_dir).await?;

        for file in &files {
            upload_file(&sftp, &remote_dir, file).await?;
        }

        let _ = session
            .disconnect(russh::Disconnect::ByApplication, "certdeploy push complete", "en")
            .await;
        Ok(())
    }
}

/// Read the enabled subset of lineage files. A missing file is fatal for
/// this client: the lineage on disk does not match what it was promised.
fn read_source_files(
    lineage: &Path,
    client: &ClientConnection,
) -> Result<Vec<SourceFile>, SyncError> {
    let mut files = Vec::new();
    for (name, flag) in LINEAGE_FILES {
        if !flag.enabled(client) {
            continue;
        }
        let path = lineage.join(name);
        let data = std::fs::read(&path).map_err(|e| {
            SyncError::Fatal(format!("unknown lineage file {}: {e}", path.display()))
        })?;
        let meta = std::fs::metadata(&path).map_err(|e| {
            SyncError::Fatal(format!("failed to stat {}: {e}", path.display()))
        })?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .and_then(|d| u32::try_from(d.as_secs()).ok());
        files.push(SourceFile {
            name,
            data,
            mode: meta.permissions().mode() & 0o7777,
            mtime,
            uid: meta.uid(),
            gid: meta.gid(),
        });
    }
    Ok(files)
}

/// Recursively create `path` on the remote, mode 0700 for anything new.
async fn ensure_remote_dir(sftp: &SftpSession, path: &str) -> Result<(), SyncError> {
    if path.is_empty() || path == "/" {
        return Ok(());
    }
    if sftp.metadata(path).await.is_ok() {
        return Ok(());
    }
    if let Some((parent, _)) = path.rsplit_once('/') {
        Box::pin(ensure_remote_dir(sftp, parent)).await?;
    }
    sftp.create_dir(path).await.map_err(map_sftp_err)?;
    let attrs = FileAttributes { permissions: Some(0o700), ..Default::default() };
    sftp.set_metadata(path, attrs).await.map_err(map_sftp_err)?;
    Ok(())
}

async fn upload_file(
    sftp: &SftpSession,
    remote_dir: &str,
    file: &SourceFile,
) -> Result<(), SyncError> {
    let suffix: String =
        rand::thread_rng().sample_iter(&Alphanumeric).take(8).map(char::from).collect();
    let temp = format!("{remote_dir}/{}.part-{suffix}", file.name);
    let dest = format!("{remote_dir}/{}", file.name);

    tracing::debug!(target: "certdeploy-sftp", "uploading {dest} via {temp}");

    let mut handle = sftp
        .open_with_flags(&temp, OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE)
        .await
        .map_err(map_sftp_err)?;
    handle.write_all(&file.data).await.map_err(|e| {
        SyncError::Transient(format!("write to {temp} failed: {e}"))
    })?;
    handle.shutdown().await.map_err(|e| {
        SyncError::Transient(format!("close of {temp} failed: {e}"))
    })?;

    let attrs = FileAttributes {
        permissions: Some(file.mode),
        mtime: file.mtime,
        atime: file.mtime,
        uid: Some(file.uid),
        gid: Some(file.gid),
        ..Default::default()
    };
    sftp.set_metadata(&temp, attrs).await.map_err(map_sftp_err)?;

    // Some servers refuse to rename over an existing file.
    let _ = sftp.remove_file(&dest).await;
    sftp.rename(&temp, &dest).await.map_err(map_sftp_err)?;
    Ok(())
}

fn join_remote(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    format!("{base}/{name}")
}

fn map_sftp_err(e: russh_sftp::client::error::Error) -> SyncError {
    use russh_sftp::client::error::Error;
    match &e {
        Error::Status(status) if status.status_code == StatusCode::PermissionDenied => {
            SyncError::Fatal(format!("remote permission denied: {}", status.error_message))
        }
        _ => SyncError::Transient(e.to_string()),
    }
}
